//! Allow/deny list management and address classification.

use crate::application::ports::{RuleStore, StoreError};
use crate::domain::error::{codes, ErrorKind, InputError};
use crate::domain::rule::{NetworkRule, RuleFilter, RuleInput, RuleVerdict};
use ipnetwork::IpNetwork;
use std::net::IpAddr;
use std::sync::Arc;
use thiserror::Error;

/// Error returned by [`RuleMatcher`] operations.
#[derive(Debug, Error)]
pub enum RuleError {
    #[error(transparent)]
    Input(#[from] InputError),
    #[error("network {network} is already listed")]
    DuplicateNetwork { network: IpNetwork },
    #[error("no {verdict} rule for network {network}")]
    RuleNotFound {
        verdict: RuleVerdict,
        network: IpNetwork,
    },
    #[error(transparent)]
    Storage(#[from] StoreError),
}

impl RuleError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RuleError::Input(e) => e.kind(),
            RuleError::DuplicateNetwork { .. } => ErrorKind::Conflict,
            RuleError::RuleNotFound { .. } => ErrorKind::NotFound,
            RuleError::Storage(e) => e.kind(),
        }
    }

    pub fn code(&self) -> Option<u16> {
        match self {
            RuleError::Input(e) => e.code(),
            RuleError::DuplicateNetwork { .. } => Some(codes::DUPLICATE_NETWORK),
            RuleError::RuleNotFound { .. } => None,
            RuleError::Storage(_) => Some(codes::INTERNAL),
        }
    }
}

/// Validates rule changes and classifies addresses against the stored lists.
///
/// Holds no lock between the duplicate check and the write, so two
/// concurrent adds of the same range can both pass the check. Backends with
/// a unique constraint on the range reject the second write.
#[derive(Debug, Clone)]
pub struct RuleMatcher {
    store: Arc<dyn RuleStore>,
}

impl RuleMatcher {
    pub fn new(store: Arc<dyn RuleStore>) -> Self {
        Self { store }
    }

    /// Add a rule for `network`.
    ///
    /// # Errors
    /// * `InvalidRuleType` if `verdict` is not Allow or Deny
    /// * `DuplicateNetwork` if any rule, whatever its verdict, already covers
    ///   exactly this range
    /// * `Storage` on backend failure
    pub async fn add_rule(
        &self,
        verdict: RuleVerdict,
        network: IpNetwork,
    ) -> Result<NetworkRule, RuleError> {
        ensure_rule_verdict(verdict)?;

        let existing = self.store.search(&RuleFilter::exact(network)).await?;
        if !existing.is_empty() {
            return Err(RuleError::DuplicateNetwork { network });
        }

        let rule = self.store.add(&RuleInput::new(verdict, network)).await?;
        tracing::info!(id = %rule.id, verdict = %verdict, network = %network, "rule added");
        Ok(rule)
    }

    /// Delete the rule with this verdict and exact range.
    ///
    /// # Errors
    /// `RuleNotFound` if there is no such rule.
    pub async fn delete_rule(
        &self,
        verdict: RuleVerdict,
        network: IpNetwork,
    ) -> Result<(), RuleError> {
        let rule = self.find_exact(verdict, network).await?;
        self.store
            .delete(&RuleInput::new(rule.verdict, rule.network))
            .await?;
        tracing::info!(id = %rule.id, verdict = %verdict, network = %network, "rule deleted");
        Ok(())
    }

    /// Look up the rule with this verdict and exact range.
    pub async fn find_exact(
        &self,
        verdict: RuleVerdict,
        network: IpNetwork,
    ) -> Result<NetworkRule, RuleError> {
        ensure_rule_verdict(verdict)?;
        let filter = RuleFilter::exact(network).with_verdict(verdict);
        self.store
            .search(&filter)
            .await?
            .into_iter()
            .next()
            .ok_or(RuleError::RuleNotFound { verdict, network })
    }

    /// Verdict of the lists for `address`.
    ///
    /// An allow rule wins over any deny rule covering the same address.
    /// `RuleVerdict::None` means no rule covers it.
    pub async fn verdict_for_address(&self, address: IpAddr) -> Result<RuleVerdict, RuleError> {
        let rules = self.store.search(&RuleFilter::containing(address)).await?;

        let verdict = rules
            .iter()
            .fold(RuleVerdict::None, |acc, rule| match (acc, rule.verdict) {
                (RuleVerdict::Allow, _) | (_, RuleVerdict::Allow) => RuleVerdict::Allow,
                (_, RuleVerdict::Deny) => RuleVerdict::Deny,
                (acc, RuleVerdict::None) => acc,
            });
        Ok(verdict)
    }

    /// Rules matching `filter`.
    pub async fn list_rules(&self, filter: &RuleFilter) -> Result<Vec<NetworkRule>, RuleError> {
        Ok(self.store.search(filter).await?)
    }
}

fn ensure_rule_verdict(verdict: RuleVerdict) -> Result<(), InputError> {
    if verdict.is_rule_verdict() {
        Ok(())
    } else {
        Err(InputError::InvalidRuleType(verdict.as_str().to_string()))
    }
}
