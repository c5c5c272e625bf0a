//! Daemon wiring: build the services from [`Config`], serve, tear down.
//!
//! Teardown order is fixed: stop accepting requests, stop every bucket
//! task, then close the rule store.

use crate::application::permit::PermitChecker;
use crate::application::ports::RuleStore;
use crate::application::registry::WindowRegistry;
use crate::application::rules::RuleMatcher;
use crate::config::{Config, StorageKind};
use crate::infrastructure::memory_store::MemoryRuleStore;
use crate::infrastructure::server::ApiServer;
use anyhow::{Context, Result};
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[cfg(feature = "pgsql-storage")]
use crate::infrastructure::pg_store::PgRuleStore;

/// Store backend kept for teardown.
#[derive(Debug)]
enum Backend {
    Memory,
    #[cfg(feature = "pgsql-storage")]
    Pgsql(PgRuleStore),
}

impl Backend {
    async fn close(self) {
        match self {
            Backend::Memory => {}
            #[cfg(feature = "pgsql-storage")]
            Backend::Pgsql(store) => {
                store.close().await;
                tracing::info!("database pool closed");
            }
        }
    }
}

/// The assembled daemon.
#[derive(Debug)]
pub struct App {
    config: Config,
    registry: Arc<WindowRegistry>,
    checker: Arc<PermitChecker>,
    backend: Backend,
}

impl App {
    /// Build every service described by `config`.
    ///
    /// Connects to and migrates the database when PostgreSQL storage is
    /// selected. Must run inside a tokio runtime.
    pub async fn build(config: Config) -> Result<Self> {
        let (store, backend) = open_store(&config).await?;
        let registry = Arc::new(WindowRegistry::new());
        let checker = PermitChecker::new(
            RuleMatcher::new(store),
            registry.clone(),
            config.base_window(),
            config.permit_limits(),
        )
        .context("cannot create permit checker")?;

        let limits = checker.limits();
        tracing::info!(
            service_id = %config.service_id,
            storage = ?config.storage.kind,
            login_per_window = limits.login,
            password_per_window = limits.password,
            ip_per_window = limits.ip,
            base_window_ms = checker.base_window().as_millis() as u64,
            "services initialized"
        );

        Ok(Self {
            config,
            registry,
            checker: Arc::new(checker),
            backend,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn checker(&self) -> &Arc<PermitChecker> {
        &self.checker
    }

    pub fn registry(&self) -> &Arc<WindowRegistry> {
        &self.registry
    }

    /// Bind the API listener from `config.api`.
    pub async fn bind(&self) -> Result<ApiServer> {
        let addr = self.config.api.address();
        ApiServer::bind(&addr, self.checker.clone())
            .await
            .with_context(|| format!("cannot bind API server to {addr}"))
    }

    /// Bind, serve until `shutdown` resolves, then tear down.
    pub async fn run<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let server = self.bind().await?;
        self.serve(server, shutdown).await
    }

    /// Serve on an already bound listener until `shutdown` resolves.
    pub async fn serve<F>(self, server: ApiServer, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let token = CancellationToken::new();
        let mut server_task = tokio::spawn(server.serve(token.clone()));

        let server_result = tokio::select! {
            _ = shutdown => {
                tracing::info!("shutdown requested");
                token.cancel();
                (&mut server_task).await
            }
            result = &mut server_task => {
                tracing::error!("API server stopped unexpectedly");
                result
            }
        };

        self.registry.shutdown().await;
        tracing::info!("rate limit buckets stopped");
        self.backend.close().await;

        match server_result {
            Ok(result) => result.context("API server failed"),
            Err(e) => Err(anyhow::Error::new(e).context("API server task panicked")),
        }
    }
}

async fn open_store(config: &Config) -> Result<(Arc<dyn RuleStore>, Backend)> {
    match config.storage.kind {
        StorageKind::Memory => Ok((Arc::new(MemoryRuleStore::new()), Backend::Memory)),
        #[cfg(feature = "pgsql-storage")]
        StorageKind::Pgsql => {
            let store = PgRuleStore::connect(&config.storage.dsn, config.storage.max_connections)
                .await
                .context("cannot connect to PostgreSQL")?;
            store
                .migrate()
                .await
                .context("cannot prepare ip_rules table")?;
            Ok((Arc::new(store.clone()), Backend::Pgsql(store)))
        }
        #[cfg(not(feature = "pgsql-storage"))]
        StorageKind::Pgsql => {
            anyhow::bail!("pgsql storage requested but built without the pgsql-storage feature")
        }
    }
}
