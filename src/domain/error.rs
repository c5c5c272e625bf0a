//! Error taxonomy shared by every component.
//!
//! Each component keeps its own error enum; they all map onto [`ErrorKind`]
//! and, where the failure has a stable number, expose it through `code()`.

use thiserror::Error;

/// Stable numeric codes surfaced to callers.
pub mod codes {
    /// A rule with the same network range already exists.
    pub const DUPLICATE_NETWORK: u16 = 2001;
    /// Storage or limiter failure while deciding.
    pub const INTERNAL: u16 = 3001;
    /// Address matched a deny rule.
    pub const DENIED_BY_RULE: u16 = 3002;
    /// Login exceeded its per-window limit.
    pub const LOGIN_LIMIT: u16 = 3003;
    /// Password exceeded its per-window limit.
    pub const PASSWORD_LIMIT: u16 = 3004;
    /// Source address exceeded its per-window limit.
    pub const ADDRESS_LIMIT: u16 = 3005;
    /// Reset parameter other than `login` or `ip`.
    pub const INVALID_RESET_PARAMETER: u16 = 3006;
}

/// Category of a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed or unsupported input
    Validation,
    /// Request collides with existing state
    Conflict,
    /// Requested entity does not exist
    NotFound,
    /// Storage or runtime failure
    Internal,
}

impl ErrorKind {
    /// Name used on the wire.
    ///
    /// Validation and conflict both surface as `invalid_argument`.
    pub fn wire_name(&self) -> &'static str {
        match self {
            ErrorKind::Validation | ErrorKind::Conflict => "invalid_argument",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Internal => "internal",
        }
    }
}

/// Rejected caller input.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InputError {
    /// Verdict text other than `allow` or `deny`
    #[error("invalid rule type: {0:?}")]
    InvalidRuleType(String),
    /// Text that does not parse as a CIDR network
    #[error("malformed network {input:?}: {reason}")]
    MalformedNetwork { input: String, reason: String },
    /// Text that does not parse as an IP address
    #[error("malformed address {input:?}: {reason}")]
    MalformedAddress { input: String, reason: String },
    /// Reset parameter other than `login` or `ip`
    #[error("wrong reset parameter {0:?}: expected login or ip")]
    InvalidResetParameter(String),
}

impl InputError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::Validation
    }

    pub fn code(&self) -> Option<u16> {
        match self {
            InputError::InvalidResetParameter(_) => Some(codes::INVALID_RESET_PARAMETER),
            _ => None,
        }
    }
}
