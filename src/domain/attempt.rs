//! Authentication attempts and the verdicts returned for them.

use crate::domain::error::{codes, InputError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;

/// Attribute of an attempt that carries its own rate limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LimitParam {
    Login,
    Password,
    Ip,
}

impl LimitParam {
    pub fn as_str(&self) -> &'static str {
        match self {
            LimitParam::Login => "login",
            LimitParam::Password => "password",
            LimitParam::Ip => "ip",
        }
    }

    /// Registry key for `value` under this parameter: `"<name>_<value>"`.
    ///
    /// ```
    /// use brute_guard::domain::attempt::LimitParam;
    ///
    /// assert_eq!(LimitParam::Login.bucket_key("bob"), "login_bob");
    /// assert_eq!(LimitParam::Ip.bucket_key("10.0.0.1"), "ip_10.0.0.1");
    /// ```
    pub fn bucket_key(&self, value: &str) -> String {
        format!("{}_{}", self.as_str(), value)
    }
}

impl fmt::Display for LimitParam {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parse an IP address literal.
///
/// IPv4-mapped IPv6 addresses (`::ffff:a.b.c.d`) come back as IPv4 so they
/// match IPv4 rules and share the IPv4 bucket. Surrounding whitespace is
/// rejected.
///
/// # Errors
/// Returns `InputError::MalformedAddress` for anything that is not a plain
/// IPv4 or IPv6 address.
pub fn parse_address(text: &str) -> Result<IpAddr, InputError> {
    text.parse::<IpAddr>()
        .map(|address| address.to_canonical())
        .map_err(|e| InputError::MalformedAddress {
            input: text.to_string(),
            reason: e.to_string(),
        })
}

/// One authentication attempt.
///
/// `Debug` never prints the password.
#[derive(Clone, PartialEq, Eq)]
pub struct AttemptQuery {
    pub login: String,
    pub password: String,
    pub address: IpAddr,
}

impl AttemptQuery {
    pub fn new(login: impl Into<String>, password: impl Into<String>, address: IpAddr) -> Self {
        Self {
            login: login.into(),
            password: password.into(),
            address,
        }
    }
}

impl fmt::Debug for AttemptQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AttemptQuery")
            .field("login", &self.login)
            .field("password", &"<redacted>")
            .field("address", &self.address)
            .finish()
    }
}

/// Why an attempt was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DenyReason {
    DeniedByRule,
    DeniedByLoginLimit,
    DeniedByPasswordLimit,
    DeniedByAddressLimit,
    Internal,
}

impl DenyReason {
    pub fn code(&self) -> u16 {
        match self {
            DenyReason::DeniedByRule => codes::DENIED_BY_RULE,
            DenyReason::DeniedByLoginLimit => codes::LOGIN_LIMIT,
            DenyReason::DeniedByPasswordLimit => codes::PASSWORD_LIMIT,
            DenyReason::DeniedByAddressLimit => codes::ADDRESS_LIMIT,
            DenyReason::Internal => codes::INTERNAL,
        }
    }

    /// Rate-limit denial for `param`.
    pub fn limit_exceeded(param: LimitParam) -> Self {
        match param {
            LimitParam::Login => DenyReason::DeniedByLoginLimit,
            LimitParam::Password => DenyReason::DeniedByPasswordLimit,
            LimitParam::Ip => DenyReason::DeniedByAddressLimit,
        }
    }
}

/// Outcome of a permit check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerdictResult {
    pub admitted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<DenyReason>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl VerdictResult {
    pub fn admit() -> Self {
        Self {
            admitted: true,
            reason: None,
            error_code: None,
            message: None,
        }
    }

    pub fn deny(reason: DenyReason, message: impl Into<String>) -> Self {
        Self {
            admitted: false,
            reason: Some(reason),
            error_code: Some(reason.code()),
            message: Some(message.into()),
        }
    }
}

/// Operator request to clear one bucket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResetRequest {
    pub parameter: String,
    pub value: String,
}

impl ResetRequest {
    pub fn new(parameter: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            parameter: parameter.into(),
            value: value.into(),
        }
    }

    /// Resolve the parameter; password buckets cannot be reset.
    pub fn param(&self) -> Result<LimitParam, InputError> {
        match self.parameter.as_str() {
            "login" => Ok(LimitParam::Login),
            "ip" => Ok(LimitParam::Ip),
            other => Err(InputError::InvalidResetParameter(other.to_string())),
        }
    }

    /// Registry key of the bucket to clear.
    ///
    /// `ip` values must be address literals and are keyed in canonical form,
    /// the same way permit checks key them.
    pub fn bucket_key(&self) -> Result<String, InputError> {
        match self.param()? {
            LimitParam::Ip => {
                let address = parse_address(&self.value)?;
                Ok(LimitParam::Ip.bucket_key(&address.to_string()))
            }
            param => Ok(param.bucket_key(&self.value)),
        }
    }
}
