//! Permit checking: one admit/deny verdict per authentication attempt.
//!
//! The address is first classified against the allow/deny lists. Only when
//! no rule covers it are the three rate limits consulted, always in the
//! order login, password, address. The first exceeded limit decides.

use crate::application::metrics::Metrics;
use crate::application::ports::WindowLimiter;
use crate::application::rules::RuleMatcher;
use crate::domain::attempt::{
    parse_address, AttemptQuery, DenyReason, LimitParam, ResetRequest, VerdictResult,
};
use crate::domain::error::{ErrorKind, InputError};
use crate::domain::limits::Limits;
use crate::domain::rule::RuleVerdict;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

const INTERNAL_MESSAGE: &str = "service unavailable";

/// Error returned by [`PermitChecker`] operations.
///
/// Policy denials are not errors; they come back as a [`VerdictResult`].
#[derive(Debug, Error)]
pub enum PermitError {
    #[error(transparent)]
    Input(#[from] InputError),
    #[error("base window must be greater than 0")]
    ZeroWindow,
}

impl PermitError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PermitError::Input(e) => e.kind(),
            PermitError::ZeroWindow => ErrorKind::Validation,
        }
    }

    pub fn code(&self) -> Option<u16> {
        match self {
            PermitError::Input(e) => e.code(),
            PermitError::ZeroWindow => None,
        }
    }
}

/// Per-window limits for each attempt attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PermitLimits {
    pub login: u64,
    pub password: u64,
    pub ip: u64,
}

impl PermitLimits {
    pub fn for_param(&self, param: LimitParam) -> u64 {
        match param {
            LimitParam::Login => self.login,
            LimitParam::Password => self.password,
            LimitParam::Ip => self.ip,
        }
    }
}

impl Default for PermitLimits {
    fn default() -> Self {
        Self {
            login: 10,
            password: 100,
            ip: 1000,
        }
    }
}

/// Combines the rule lists and the rate limits into one verdict.
pub struct PermitChecker {
    rules: RuleMatcher,
    limiter: Arc<dyn WindowLimiter>,
    base_window_nanos: AtomicU64,
    limits: PermitLimits,
    metrics: Metrics,
}

impl PermitChecker {
    /// Create a checker.
    ///
    /// # Arguments
    /// * `rules` - Allow/deny list matcher
    /// * `limiter` - Fixed-window counter shared by all three limits
    /// * `base_window` - Window length for buckets created from now on
    /// * `limits` - Per-window limit for login, password and address
    ///
    /// # Errors
    /// Returns `PermitError::ZeroWindow` if `base_window` is zero.
    pub fn new(
        rules: RuleMatcher,
        limiter: Arc<dyn WindowLimiter>,
        base_window: Duration,
        limits: PermitLimits,
    ) -> Result<Self, PermitError> {
        Ok(Self {
            rules,
            limiter,
            base_window_nanos: AtomicU64::new(window_nanos(base_window)?),
            limits,
            metrics: Metrics::new(),
        })
    }

    /// Decide whether `query` may proceed.
    ///
    /// Never fails: storage and limiter problems are reported as a denial
    /// with reason `Internal`.
    pub async fn check(&self, query: &AttemptQuery) -> VerdictResult {
        let verdict = self.decide(query).await;
        self.metrics.record(&verdict);

        match verdict.reason {
            None => tracing::info!(
                login = %query.login,
                address = %query.address,
                "attempt admitted"
            ),
            Some(reason) => tracing::info!(
                login = %query.login,
                address = %query.address,
                reason = ?reason,
                code = reason.code(),
                "attempt denied"
            ),
        }
        verdict
    }

    /// Parse `address` and run [`PermitChecker::check`].
    ///
    /// # Errors
    /// Returns `MalformedAddress` before touching any rule or bucket if
    /// `address` is not an IP literal.
    pub async fn check_raw(
        &self,
        login: &str,
        password: &str,
        address: &str,
    ) -> Result<VerdictResult, PermitError> {
        let address = parse_address(address)?;
        Ok(self
            .check(&AttemptQuery::new(login, password, address))
            .await)
    }

    /// Clear the bucket named by `request`.
    ///
    /// # Returns
    /// Whether a bucket existed
    ///
    /// # Errors
    /// Returns `InvalidResetParameter` unless the parameter is `login` or `ip`.
    pub async fn reset_bucket(&self, request: &ResetRequest) -> Result<bool, PermitError> {
        let key = request.bucket_key()?;
        let found = self.limiter.reset_bucket(&key).await;
        tracing::info!(parameter = %request.parameter, value = %request.value, found, "limit reset");
        Ok(found)
    }

    /// Change the window used for buckets created from now on.
    ///
    /// Existing buckets keep their window until they expire.
    pub fn set_base_window(&self, window: Duration) -> Result<(), PermitError> {
        let nanos = window_nanos(window)?;
        self.base_window_nanos.store(nanos, Ordering::Relaxed);
        tracing::info!(window_ms = window.as_millis() as u64, "base window changed");
        Ok(())
    }

    pub fn base_window(&self) -> Duration {
        Duration::from_nanos(self.base_window_nanos.load(Ordering::Relaxed))
    }

    pub fn limits(&self) -> PermitLimits {
        self.limits
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    pub fn rules(&self) -> &RuleMatcher {
        &self.rules
    }

    async fn decide(&self, query: &AttemptQuery) -> VerdictResult {
        match self.rules.verdict_for_address(query.address).await {
            Ok(RuleVerdict::Allow) => return VerdictResult::admit(),
            Ok(RuleVerdict::Deny) => {
                return VerdictResult::deny(
                    DenyReason::DeniedByRule,
                    format!("address {} is on the deny list", query.address),
                )
            }
            Ok(RuleVerdict::None) => {}
            Err(e) => {
                tracing::error!(address = %query.address, error = %e, "rule lookup failed");
                return VerdictResult::deny(DenyReason::Internal, INTERNAL_MESSAGE);
            }
        }

        let address = query.address.to_string();
        let period = self.base_window();
        let checks = [
            (LimitParam::Login, query.login.as_str()),
            (LimitParam::Password, query.password.as_str()),
            (LimitParam::Ip, address.as_str()),
        ];

        for (param, value) in checks {
            let limits = Limits {
                period,
                limit: self.limits.for_param(param),
            };
            match self.limiter.test_and_count(&param.bucket_key(value), limits) {
                Ok(false) => {}
                Ok(true) => {
                    return VerdictResult::deny(
                        DenyReason::limit_exceeded(param),
                        limit_message(param, value),
                    )
                }
                Err(e) => {
                    tracing::error!(parameter = %param, error = %e, "rate limit check failed");
                    return VerdictResult::deny(DenyReason::Internal, INTERNAL_MESSAGE);
                }
            }
        }

        VerdictResult::admit()
    }
}

impl std::fmt::Debug for PermitChecker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PermitChecker")
            .field("base_window", &self.base_window())
            .field("limits", &self.limits)
            .finish_non_exhaustive()
    }
}

fn window_nanos(window: Duration) -> Result<u64, PermitError> {
    if window.is_zero() {
        return Err(PermitError::ZeroWindow);
    }
    Ok(u64::try_from(window.as_nanos()).unwrap_or(u64::MAX))
}

fn limit_message(param: LimitParam, value: &str) -> String {
    format!("request limit reached for {param} {value}")
}
