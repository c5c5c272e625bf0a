//! # brute-guard
//!
//! Brute-force protection for authentication endpoints.
//!
//! Every login attempt is judged on two things:
//!
//! - **Network rules**: CIDR ranges on an allow list are always admitted,
//!   ranges on a deny list are always refused. An allow rule wins when both
//!   lists cover an address.
//! - **Rate limits**: independent fixed-window limits on the login, the
//!   password and the source address. Counters live in a [`WindowRegistry`]
//!   and expire on their own after two idle windows.
//!
//! ## Quick Start
//!
//! ```rust
//! use brute_guard::{
//!     MemoryRuleStore, PermitChecker, PermitLimits, RuleMatcher, RuleVerdict, WindowRegistry,
//! };
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let rules = RuleMatcher::new(Arc::new(MemoryRuleStore::new()));
//! rules
//!     .add_rule(RuleVerdict::Deny, "203.0.113.0/24".parse()?)
//!     .await?;
//!
//! let registry = Arc::new(WindowRegistry::new());
//! let checker = PermitChecker::new(
//!     rules,
//!     registry.clone(),
//!     Duration::from_secs(60),
//!     PermitLimits { login: 10, password: 100, ip: 1000 },
//! )?;
//!
//! let verdict = checker.check_raw("alice", "secret", "198.51.100.7").await?;
//! assert!(verdict.admitted);
//!
//! let verdict = checker.check_raw("alice", "secret", "203.0.113.9").await?;
//! assert!(!verdict.admitted);
//!
//! registry.shutdown().await;
//! # Ok(())
//! # }
//! ```
//!
//! ## Storage
//!
//! Rules are kept behind the [`RuleStore`] port. [`MemoryRuleStore`] is
//! always available; `PgRuleStore` is enabled by the default
//! `pgsql-storage` feature.
//!
//! ## Binaries
//!
//! - `brute-guard`: the daemon, serving a JSON-lines API over TCP
//! - `brute-guard-cli`: interactive client for list management and bucket
//!   resets

// Domain layer - pure business logic
pub mod domain;

// Application layer - orchestration
pub mod application;

// Infrastructure layer - external adapters
pub mod infrastructure;

pub mod app;
pub mod cli;
pub mod config;

// Re-export commonly used types for convenience
pub use domain::{
    attempt::{AttemptQuery, DenyReason, LimitParam, ResetRequest, VerdictResult},
    error::{ErrorKind, InputError},
    limits::{Limits, LimitsError},
    rule::{NetworkRule, RuleFilter, RuleInput, RuleVerdict},
};

pub use application::{
    metrics::{Metrics, MetricsSnapshot},
    permit::{PermitChecker, PermitError, PermitLimits},
    ports::{Clock, RuleStore, StoreError, WindowLimiter},
    registry::WindowRegistry,
    rules::{RuleError, RuleMatcher},
};

pub use infrastructure::{clock::SystemClock, memory_store::MemoryRuleStore};

#[cfg(feature = "pgsql-storage")]
pub use infrastructure::pg_store::PgRuleStore;
