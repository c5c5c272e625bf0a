//! TCP front-end speaking the JSON-lines protocol.
//!
//! Every connection is served by its own task and may send any number of
//! requests. Requests on one connection are answered in order.

use crate::application::permit::{PermitChecker, PermitError};
use crate::application::rules::RuleError;
use crate::domain::attempt::ResetRequest;
use crate::domain::error::{ErrorKind, InputError};
use crate::domain::rule::{RuleFilter, RuleInput, RuleVerdict};
use crate::infrastructure::protocol::{Request, Response};
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// Upper bound on one request line.
const MAX_LINE_BYTES: usize = 64 * 1024;

/// Maps decoded requests onto the permit checker and rule matcher.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    checker: Arc<PermitChecker>,
}

impl Dispatcher {
    pub fn new(checker: Arc<PermitChecker>) -> Self {
        Self { checker }
    }

    /// Decode one request line and produce its response.
    pub async fn handle_line(&self, line: &str) -> Response {
        match serde_json::from_str::<Request>(line) {
            Ok(request) => self.handle(request).await,
            Err(e) => Response::error(
                ErrorKind::Validation,
                None,
                format!("malformed request: {e}"),
            ),
        }
    }

    pub async fn handle(&self, request: Request) -> Response {
        let op = request.op();
        let response = match request {
            Request::Check {
                login,
                password,
                address,
            } => self
                .checker
                .check_raw(&login, &password, &address)
                .await
                .map(Response::verdict)
                .unwrap_or_else(permit_failure),
            Request::Reset { parameter, value } => self
                .checker
                .reset_bucket(&ResetRequest::new(parameter, value))
                .await
                .map(Response::found)
                .unwrap_or_else(permit_failure),
            Request::AddRule { verdict, network } => match RuleInput::parse(&verdict, &network) {
                Ok(input) => self
                    .checker
                    .rules()
                    .add_rule(input.verdict, input.network)
                    .await
                    .map(Response::rule)
                    .unwrap_or_else(rule_failure),
                Err(e) => input_failure(e),
            },
            Request::DeleteRule { verdict, network } => {
                match RuleInput::parse(&verdict, &network) {
                    Ok(input) => self
                        .checker
                        .rules()
                        .delete_rule(input.verdict, input.network)
                        .await
                        .map(|()| Response::done())
                        .unwrap_or_else(rule_failure),
                    Err(e) => input_failure(e),
                }
            }
            Request::ListRules { verdict } => {
                match verdict.as_deref().map(str::parse::<RuleVerdict>).transpose() {
                    Ok(verdict) => {
                        let filter = match verdict {
                            Some(verdict) => RuleFilter::all().with_verdict(verdict),
                            None => RuleFilter::all(),
                        };
                        self.checker
                            .rules()
                            .list_rules(&filter)
                            .await
                            .map(Response::rules)
                            .unwrap_or_else(rule_failure)
                    }
                    Err(e) => input_failure(e),
                }
            }
        };

        if !response.ok {
            tracing::warn!(
                op,
                error = response.message.as_deref().unwrap_or(""),
                "request failed"
            );
        }
        response
    }
}

fn input_failure(e: InputError) -> Response {
    Response::error(e.kind(), e.code(), e.to_string())
}

fn permit_failure(e: PermitError) -> Response {
    Response::error(e.kind(), e.code(), e.to_string())
}

fn rule_failure(e: RuleError) -> Response {
    match e.kind() {
        ErrorKind::Internal => {
            tracing::error!(error = %e, "rule store failure");
            Response::error(ErrorKind::Internal, e.code(), "internal error")
        }
        kind => Response::error(kind, e.code(), e.to_string()),
    }
}

/// Accept loop bound to a TCP address.
#[derive(Debug)]
pub struct ApiServer {
    listener: TcpListener,
    dispatcher: Dispatcher,
}

impl ApiServer {
    /// Bind to `addr`.
    pub async fn bind(addr: &str, checker: Arc<PermitChecker>) -> io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self {
            listener,
            dispatcher: Dispatcher::new(checker),
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Serve connections until `shutdown` is cancelled.
    ///
    /// Open connections are closed before this returns.
    pub async fn serve(self, shutdown: CancellationToken) -> io::Result<()> {
        let local_addr = self.listener.local_addr()?;
        tracing::info!(%local_addr, "API server listening");

        let mut connections = JoinSet::new();
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        tracing::debug!(%peer, "connection accepted");
                        let dispatcher = self.dispatcher.clone();
                        let shutdown = shutdown.clone();
                        connections.spawn(async move {
                            if let Err(e) = serve_connection(stream, dispatcher, shutdown).await {
                                tracing::debug!(%peer, error = %e, "connection closed with error");
                            }
                        });
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "failed to accept connection");
                        tokio::time::sleep(Duration::from_millis(100)).await;
                    }
                },
                Some(_) = connections.join_next(), if !connections.is_empty() => {}
            }
        }

        connections.shutdown().await;
        tracing::info!(%local_addr, "API server stopped");
        Ok(())
    }
}

async fn serve_connection(
    stream: TcpStream,
    dispatcher: Dispatcher,
    shutdown: CancellationToken,
) -> io::Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut line = String::new();

    loop {
        line.clear();
        let mut limited = (&mut reader).take(MAX_LINE_BYTES as u64 + 1);
        let read = tokio::select! {
            _ = shutdown.cancelled() => return Ok(()),
            read = limited.read_line(&mut line) => read?,
        };
        if read == 0 {
            return Ok(());
        }
        if line.len() > MAX_LINE_BYTES {
            let response = Response::error(ErrorKind::Validation, None, "request line too long");
            write_response(&mut writer, &response).await?;
            return Ok(());
        }
        if line.trim().is_empty() {
            continue;
        }

        let response = dispatcher.handle_line(line.trim()).await;
        write_response(&mut writer, &response).await?;
    }
}

async fn write_response<W>(writer: &mut W, response: &Response) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut payload = serde_json::to_vec(response)?;
    payload.push(b'\n');
    writer.write_all(&payload).await?;
    writer.flush().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::permit::PermitLimits;
    use crate::application::registry::WindowRegistry;
    use crate::application::rules::RuleMatcher;
    use crate::infrastructure::memory_store::MemoryRuleStore;

    fn dispatcher() -> (Dispatcher, Arc<WindowRegistry>) {
        let registry = Arc::new(WindowRegistry::new());
        let rules = RuleMatcher::new(Arc::new(MemoryRuleStore::new()));
        let checker = PermitChecker::new(
            rules,
            registry.clone(),
            Duration::from_secs(60),
            PermitLimits::default(),
        )
        .unwrap();
        (Dispatcher::new(Arc::new(checker)), registry)
    }

    #[tokio::test]
    async fn test_malformed_json() {
        let (d, _registry) = dispatcher();
        let resp = d.handle_line("{not json").await;
        assert!(!resp.ok);
        assert_eq!(resp.kind.as_deref(), Some("invalid_argument"));
    }

    #[tokio::test]
    async fn test_malformed_address() {
        let (d, registry) = dispatcher();
        let resp = d
            .handle_line(r#"{"op":"check","login":"a","password":"b","address":"nope"}"#)
            .await;
        assert!(!resp.ok);
        assert_eq!(resp.kind.as_deref(), Some("invalid_argument"));
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_rule_errors_map_to_kinds() {
        let (d, _registry) = dispatcher();

        let add = r#"{"op":"add_rule","verdict":"deny","network":"10.0.0.0/8"}"#;
        assert!(d.handle_line(add).await.ok);

        let dup = d.handle_line(add).await;
        assert_eq!(dup.kind.as_deref(), Some("invalid_argument"));
        assert_eq!(dup.code, Some(2001));

        let missing = d
            .handle_line(r#"{"op":"delete_rule","verdict":"allow","network":"10.0.0.0/8"}"#)
            .await;
        assert_eq!(missing.kind.as_deref(), Some("not_found"));

        let bad_net = d
            .handle_line(r#"{"op":"add_rule","verdict":"deny","network":"10.0.0.0"}"#)
            .await;
        assert_eq!(bad_net.kind.as_deref(), Some("invalid_argument"));

        let bad_verdict = d
            .handle_line(r#"{"op":"list_rules","verdict":"grey"}"#)
            .await;
        assert_eq!(bad_verdict.kind.as_deref(), Some("invalid_argument"));
    }

    #[tokio::test]
    async fn test_reset_password_rejected() {
        let (d, _registry) = dispatcher();
        let resp = d
            .handle_line(r#"{"op":"reset","parameter":"password","value":"x"}"#)
            .await;
        assert!(!resp.ok);
        assert_eq!(resp.code, Some(3006));
    }
}
