//! In-process rule store backed by DashMap.
//!
//! Rules live only as long as the process. Suitable for tests, single-node
//! deployments and as the default backend.

use crate::application::ports::{Clock, RuleStore, StoreError};
use crate::domain::rule::{NetworkRule, RuleFilter, RuleInput};
use crate::infrastructure::clock::SystemClock;
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use uuid::Uuid;

/// Thread-safe rule store keyed by rule id.
#[derive(Debug)]
pub struct MemoryRuleStore {
    rules: DashMap<Uuid, NetworkRule>,
    clock: Arc<dyn Clock>,
}

impl MemoryRuleStore {
    /// Create an empty store stamping rules with the system clock.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock::new()))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            rules: DashMap::new(),
            clock,
        }
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl Default for MemoryRuleStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RuleStore for MemoryRuleStore {
    async fn add(&self, input: &RuleInput) -> Result<NetworkRule, StoreError> {
        let rule = NetworkRule {
            id: Uuid::new_v4(),
            verdict: input.verdict,
            network: input.network,
            updated_at: self.clock.now(),
        };
        self.rules.insert(rule.id, rule.clone());
        Ok(rule)
    }

    async fn delete(&self, input: &RuleInput) -> Result<(), StoreError> {
        let filter = RuleFilter::exact(input.network).with_verdict(input.verdict);
        self.rules.retain(|_, rule| !filter.matches(rule));
        Ok(())
    }

    async fn search(&self, filter: &RuleFilter) -> Result<Vec<NetworkRule>, StoreError> {
        let mut found: Vec<NetworkRule> = match filter.id {
            Some(id) => self
                .rules
                .get(&id)
                .filter(|rule| filter.matches(rule))
                .map(|rule| vec![rule.clone()])
                .unwrap_or_default(),
            None => self
                .rules
                .iter()
                .filter(|entry| filter.matches(entry.value()))
                .map(|entry| entry.value().clone())
                .collect(),
        };
        found.sort_by(|a, b| {
            a.verdict
                .cmp(&b.verdict)
                .then(a.updated_at.cmp(&b.updated_at))
        });
        Ok(found)
    }
}
