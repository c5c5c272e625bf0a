//! Rule store that fails every call.

use crate::application::ports::{RuleStore, StoreError};
use crate::domain::rule::{NetworkRule, RuleFilter, RuleInput};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Rule store whose every operation returns `StoreError::Backend`.
///
/// Counts the calls it received so tests can assert that a failing lookup
/// stopped the pipeline.
#[derive(Debug, Default)]
pub struct FailingRuleStore {
    calls: AtomicUsize,
}

impl FailingRuleStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of store calls made so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }

    fn fail<T>(&self) -> Result<T, StoreError> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        Err(StoreError::Backend("store is offline".to_string()))
    }
}

#[async_trait]
impl RuleStore for FailingRuleStore {
    async fn add(&self, _input: &RuleInput) -> Result<NetworkRule, StoreError> {
        self.fail()
    }

    async fn delete(&self, _input: &RuleInput) -> Result<(), StoreError> {
        self.fail()
    }

    async fn search(&self, _filter: &RuleFilter) -> Result<Vec<NetworkRule>, StoreError> {
        self.fail()
    }
}
