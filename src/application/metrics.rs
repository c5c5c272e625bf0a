//! Verdict counters for the permit checker.

use crate::domain::attempt::{DenyReason, VerdictResult};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Counters of permit check outcomes.
///
/// Cloning shares the underlying counters.
#[derive(Debug, Clone)]
pub struct Metrics {
    inner: Arc<MetricsInner>,
}

#[derive(Debug, Default)]
struct MetricsInner {
    admitted: AtomicU64,
    denied_by_rule: AtomicU64,
    denied_by_limit: AtomicU64,
    internal_errors: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(MetricsInner::default()),
        }
    }

    /// Count one verdict.
    pub(crate) fn record(&self, verdict: &VerdictResult) {
        let counter = match verdict.reason {
            None => &self.inner.admitted,
            Some(DenyReason::DeniedByRule) => &self.inner.denied_by_rule,
            Some(DenyReason::Internal) => &self.inner.internal_errors,
            Some(
                DenyReason::DeniedByLoginLimit
                | DenyReason::DeniedByPasswordLimit
                | DenyReason::DeniedByAddressLimit,
            ) => &self.inner.denied_by_limit,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn admitted(&self) -> u64 {
        self.inner.admitted.load(Ordering::Relaxed)
    }

    pub fn denied_by_rule(&self) -> u64 {
        self.inner.denied_by_rule.load(Ordering::Relaxed)
    }

    pub fn denied_by_limit(&self) -> u64 {
        self.inner.denied_by_limit.load(Ordering::Relaxed)
    }

    pub fn internal_errors(&self) -> u64 {
        self.inner.internal_errors.load(Ordering::Relaxed)
    }

    /// Get a snapshot of all counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            admitted: self.admitted(),
            denied_by_rule: self.denied_by_rule(),
            denied_by_limit: self.denied_by_limit(),
            internal_errors: self.internal_errors(),
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// A point-in-time snapshot of the counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub admitted: u64,
    pub denied_by_rule: u64,
    pub denied_by_limit: u64,
    pub internal_errors: u64,
}

impl MetricsSnapshot {
    /// Total number of checks.
    pub fn total(&self) -> u64 {
        self.admitted
            .saturating_add(self.denied_by_rule)
            .saturating_add(self.denied_by_limit)
            .saturating_add(self.internal_errors)
    }

    /// Share of checks that were refused (0.0 to 1.0).
    ///
    /// Returns 0.0 if nothing has been checked.
    pub fn denial_rate(&self) -> f64 {
        let total = self.total();
        if total == 0 {
            0.0
        } else {
            (total - self.admitted) as f64 / total as f64
        }
    }
}
