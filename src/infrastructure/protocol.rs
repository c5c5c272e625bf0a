//! JSON-lines wire format.
//!
//! Each request and each response is one JSON object on its own line.
//! Requests carry their operation in the `op` field:
//!
//! ```json
//! {"op":"check","login":"bob","password":"x","address":"10.0.0.1"}
//! {"op":"reset","parameter":"login","value":"bob"}
//! {"op":"add_rule","verdict":"deny","network":"10.0.0.0/8"}
//! {"op":"delete_rule","verdict":"deny","network":"10.0.0.0/8"}
//! {"op":"list_rules","verdict":"allow"}
//! ```
//!
//! Successful responses have `"ok":true` plus the payload of the operation;
//! failures have `"ok":false` with `kind`, an optional `code` and `message`.

use crate::domain::attempt::{DenyReason, VerdictResult};
use crate::domain::error::ErrorKind;
use crate::domain::rule::NetworkRule;
use serde::{Deserialize, Serialize};

/// One client request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Request {
    Check {
        login: String,
        password: String,
        address: String,
    },
    Reset {
        parameter: String,
        value: String,
    },
    AddRule {
        verdict: String,
        network: String,
    },
    DeleteRule {
        verdict: String,
        network: String,
    },
    ListRules {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        verdict: Option<String>,
    },
}

impl Request {
    /// Operation name as it appears on the wire.
    pub fn op(&self) -> &'static str {
        match self {
            Request::Check { .. } => "check",
            Request::Reset { .. } => "reset",
            Request::AddRule { .. } => "add_rule",
            Request::DeleteRule { .. } => "delete_rule",
            Request::ListRules { .. } => "list_rules",
        }
    }
}

/// One server response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub admitted: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<DenyReason>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub found: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule: Option<NetworkRule>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rules: Option<Vec<NetworkRule>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl Response {
    /// Success without payload.
    pub fn done() -> Self {
        Self {
            ok: true,
            ..Self::default()
        }
    }

    pub fn verdict(verdict: VerdictResult) -> Self {
        Self {
            ok: true,
            admitted: Some(verdict.admitted),
            reason: verdict.reason,
            code: verdict.error_code,
            message: verdict.message,
            ..Self::default()
        }
    }

    pub fn found(found: bool) -> Self {
        Self {
            ok: true,
            found: Some(found),
            ..Self::default()
        }
    }

    pub fn rule(rule: NetworkRule) -> Self {
        Self {
            ok: true,
            rule: Some(rule),
            ..Self::default()
        }
    }

    pub fn rules(rules: Vec<NetworkRule>) -> Self {
        Self {
            ok: true,
            rules: Some(rules),
            ..Self::default()
        }
    }

    pub fn error(kind: ErrorKind, code: Option<u16>, message: impl Into<String>) -> Self {
        Self {
            ok: false,
            kind: Some(kind.wire_name().to_string()),
            code,
            message: Some(message.into()),
            ..Self::default()
        }
    }

    /// Error text of a failed response.
    pub fn error_message(&self) -> Option<String> {
        if self.ok {
            return None;
        }
        let kind = self.kind.as_deref().unwrap_or("error");
        let message = self.message.as_deref().unwrap_or("");
        Some(match self.code {
            Some(code) => format!("{kind} ({code}): {message}"),
            None => format!("{kind}: {message}"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_tagging() {
        let req: Request =
            serde_json::from_str(r#"{"op":"reset","parameter":"ip","value":"10.0.0.1"}"#)
                .unwrap();
        assert_eq!(
            req,
            Request::Reset {
                parameter: "ip".into(),
                value: "10.0.0.1".into()
            }
        );

        let req: Request = serde_json::from_str(r#"{"op":"list_rules"}"#).unwrap();
        assert_eq!(req, Request::ListRules { verdict: None });
        assert_eq!(req.op(), "list_rules");

        assert!(serde_json::from_str::<Request>(r#"{"op":"explode"}"#).is_err());
        assert!(serde_json::from_str::<Request>(r#"{"op":"check","login":"a"}"#).is_err());
    }

    #[test]
    fn test_error_response_shape() {
        let resp = Response::error(ErrorKind::Conflict, Some(2001), "network already listed");
        let value: serde_json::Value = serde_json::to_value(&resp).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "ok": false,
                "kind": "invalid_argument",
                "code": 2001,
                "message": "network already listed"
            })
        );
        assert_eq!(
            resp.error_message().unwrap(),
            "invalid_argument (2001): network already listed"
        );
    }

    #[test]
    fn test_verdict_response_shape() {
        let resp = Response::verdict(VerdictResult::deny(DenyReason::DeniedByRule, "denied"));
        let value: serde_json::Value = serde_json::to_value(&resp).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "ok": true,
                "admitted": false,
                "reason": "denied_by_rule",
                "code": 3002,
                "message": "denied"
            })
        );

        let value = serde_json::to_value(Response::verdict(VerdictResult::admit())).unwrap();
        assert_eq!(value, serde_json::json!({"ok": true, "admitted": true}));
    }
}
