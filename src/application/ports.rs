//! Ports (interfaces) for the application layer.
//!
//! In hexagonal architecture, ports define the interfaces that the application
//! layer needs. Infrastructure adapters implement these ports.

use crate::domain::error::ErrorKind;
use crate::domain::limits::{Limits, LimitsError};
use crate::domain::rule::{NetworkRule, RuleFilter, RuleInput};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::fmt::Debug;
use thiserror::Error;

/// Port for obtaining the current wall-clock time.
///
/// Used to stamp rules when they are stored. Infrastructure provides
/// concrete implementations (SystemClock, MockClock).
pub trait Clock: Send + Sync + Debug {
    /// Get the current time.
    fn now(&self) -> DateTime<Utc>;
}

/// Error raised by a rule store backend.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Database driver failure
    #[cfg(feature = "pgsql-storage")]
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),
    /// A stored row could not be turned into a rule
    #[error("invalid stored rule: {0}")]
    InvalidRow(String),
    /// Any other backend failure
    #[error("rule store unavailable: {0}")]
    Backend(String),
}

impl StoreError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::Internal
    }
}

/// Port for durable storage of network rules.
///
/// Every backend must support both exact and containment matching as
/// described by [`RuleFilter`].
#[async_trait]
pub trait RuleStore: Send + Sync + Debug {
    /// Persist a new rule.
    ///
    /// The store assigns the id and the update timestamp.
    ///
    /// # Errors
    /// Returns `StoreError` if the backend rejects the write.
    async fn add(&self, input: &RuleInput) -> Result<NetworkRule, StoreError>;

    /// Remove every rule with the given verdict and exact network.
    ///
    /// Removing a rule that does not exist is not an error.
    async fn delete(&self, input: &RuleInput) -> Result<(), StoreError>;

    /// Return all rules matching `filter`.
    async fn search(&self, filter: &RuleFilter) -> Result<Vec<NetworkRule>, StoreError>;
}

/// Port for the fixed-window counter used by the permit checker.
#[async_trait]
pub trait WindowLimiter: Send + Sync {
    /// Count one event for `key` and report whether the window limit is
    /// now exceeded.
    ///
    /// # Arguments
    /// * `key` - Bucket key
    /// * `limits` - Window applied if the bucket has to be created
    ///
    /// # Returns
    /// `true` once the count inside the current window is past `limits.limit`
    ///
    /// # Errors
    /// Returns `LimitsError` if `limits` is not strictly positive.
    fn test_and_count(&self, key: &str, limits: Limits) -> Result<bool, LimitsError>;

    /// Drop the bucket for `key`, waiting for its task to stop.
    ///
    /// # Returns
    /// `false` if no bucket existed
    async fn reset_bucket(&self, key: &str) -> bool;
}
