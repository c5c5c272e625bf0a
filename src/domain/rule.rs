//! Network rules and the filters used to look them up.
//!
//! A rule binds a CIDR range to an allow or deny verdict. Rules are matched
//! either by exact range (management operations) or by containment of an
//! address (permit checks).

use crate::domain::error::InputError;
use chrono::{DateTime, Utc};
use ipnetwork::IpNetwork;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;
use uuid::Uuid;

/// Verdict attached to a network range.
///
/// `None` is only ever a lookup result; stored rules are `Allow` or `Deny`.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum RuleVerdict {
    #[default]
    None,
    Allow,
    Deny,
}

impl RuleVerdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            RuleVerdict::None => "none",
            RuleVerdict::Allow => "allow",
            RuleVerdict::Deny => "deny",
        }
    }

    /// Whether this verdict may be attached to a stored rule.
    pub fn is_rule_verdict(&self) -> bool {
        matches!(self, RuleVerdict::Allow | RuleVerdict::Deny)
    }

    /// Map a list name (`white` / `black`) to its verdict.
    ///
    /// The canonical forms `allow` / `deny` are accepted as well.
    pub fn from_list_name(name: &str) -> Result<Self, InputError> {
        match name {
            "white" => Ok(RuleVerdict::Allow),
            "black" => Ok(RuleVerdict::Deny),
            other => other.parse(),
        }
    }
}

impl fmt::Display for RuleVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RuleVerdict {
    type Err = InputError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "allow" => Ok(RuleVerdict::Allow),
            "deny" => Ok(RuleVerdict::Deny),
            other => Err(InputError::InvalidRuleType(other.to_string())),
        }
    }
}

/// Parse a CIDR network and normalize it to its network address.
///
/// The prefix length is mandatory: `10.0.0.1` is rejected while
/// `10.0.0.1/32` is accepted. `192.168.1.77/24` becomes `192.168.1.0/24`.
///
/// # Errors
/// Returns `InputError::MalformedNetwork` if the text is not a CIDR network.
pub fn parse_network(text: &str) -> Result<IpNetwork, InputError> {
    let text = text.trim();
    let malformed = |reason: String| InputError::MalformedNetwork {
        input: text.to_string(),
        reason,
    };

    if !text.contains('/') {
        return Err(malformed("missing prefix length".to_string()));
    }
    let parsed = IpNetwork::from_str(text).map_err(|e| malformed(e.to_string()))?;
    IpNetwork::new(parsed.network(), parsed.prefix()).map_err(|e| malformed(e.to_string()))
}

/// A stored allow/deny rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkRule {
    pub id: Uuid,
    pub verdict: RuleVerdict,
    pub network: IpNetwork,
    pub updated_at: DateTime<Utc>,
}

/// Verdict and range of a rule to add or delete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleInput {
    pub verdict: RuleVerdict,
    pub network: IpNetwork,
}

impl RuleInput {
    pub fn new(verdict: RuleVerdict, network: IpNetwork) -> Self {
        Self { verdict, network }
    }

    /// Parse textual verdict and network.
    ///
    /// # Errors
    /// `InvalidRuleType` for an unknown verdict, `MalformedNetwork` for a bad
    /// range.
    pub fn parse(verdict: &str, network: &str) -> Result<Self, InputError> {
        Ok(Self {
            verdict: verdict.parse()?,
            network: parse_network(network)?,
        })
    }
}

/// Search criteria for rules.
///
/// Every set field must match. With `exact_match` the rule range must equal
/// `network`; without it the rule range must contain the address of
/// `network`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RuleFilter {
    pub id: Option<Uuid>,
    pub verdict: Option<RuleVerdict>,
    pub network: Option<IpNetwork>,
    pub exact_match: bool,
}

impl RuleFilter {
    /// Filter matching every rule.
    pub fn all() -> Self {
        Self::default()
    }

    /// Rules whose range equals `network`.
    pub fn exact(network: IpNetwork) -> Self {
        Self {
            network: Some(network),
            exact_match: true,
            ..Self::default()
        }
    }

    /// Rules whose range contains `address`.
    pub fn containing(address: IpAddr) -> Self {
        Self {
            network: Some(IpNetwork::from(address)),
            exact_match: false,
            ..Self::default()
        }
    }

    pub fn by_id(id: Uuid) -> Self {
        Self {
            id: Some(id),
            ..Self::default()
        }
    }

    pub fn with_verdict(mut self, verdict: RuleVerdict) -> Self {
        self.verdict = Some(verdict);
        self
    }

    /// Evaluate the filter against one rule.
    pub fn matches(&self, rule: &NetworkRule) -> bool {
        if self.id.is_some_and(|id| id != rule.id) {
            return false;
        }
        if self.verdict.is_some_and(|v| v != rule.verdict) {
            return false;
        }
        match self.network {
            None => true,
            Some(net) if self.exact_match => rule.network == net,
            Some(net) => rule.network.contains(net.ip()),
        }
    }
}
