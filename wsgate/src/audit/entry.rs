//! Audit entry types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Result of the audited action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Success,
    Error,
    PermissionDenied,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Error => "error",
            Self::PermissionDenied => "permission_denied",
        }
    }

    /// Derive an outcome from an HTTP status code
    pub fn from_status(status: u16) -> Self {
        match status {
            403 => Self::PermissionDenied,
            s if s >= 400 => Self::Error,
            _ => Self::Success,
        }
    }
}

/// One recorded user action.
///
/// Created ephemerally, sanitized on enqueue, persisted in batches.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub timestamp: DateTime<Utc>,
    pub user_id: String,
    pub username: String,
    /// Role set snapshot at the time of the action
    pub user_roles: Vec<String>,
    /// "GET", "POST", "WS:<pkg>", "WS:ERROR", ...
    pub action_type: String,
    /// URL path or entity identifier
    pub resource: String,
    pub outcome: Outcome,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    /// Correlation identifier
    pub request_id: Option<String>,
    /// Sanitized request payload
    pub request_data: Option<serde_json::Value>,
    pub response_status: Option<i32>,
    pub error_message: Option<String>,
    pub duration_ms: Option<i64>,
}

impl AuditEntry {
    pub fn new(
        user_id: impl Into<String>,
        username: impl Into<String>,
        user_roles: Vec<String>,
        action_type: impl Into<String>,
        resource: impl Into<String>,
        outcome: Outcome,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            user_id: user_id.into(),
            username: username.into(),
            user_roles,
            action_type: action_type.into(),
            resource: resource.into(),
            outcome,
            ip_address: None,
            user_agent: None,
            request_id: None,
            request_data: None,
            response_status: None,
            error_message: None,
            duration_ms: None,
        }
    }

    pub fn with_source(
        mut self,
        ip_address: Option<String>,
        user_agent: Option<String>,
        request_id: Option<String>,
    ) -> Self {
        self.ip_address = ip_address;
        self.user_agent = user_agent;
        self.request_id = request_id;
        self
    }

    pub fn with_request_data(mut self, data: serde_json::Value) -> Self {
        self.request_data = Some(data);
        self
    }

    pub fn with_response(mut self, status: i32, duration_ms: i64) -> Self {
        self.response_status = Some(status);
        self.duration_ms = Some(duration_ms);
        self
    }

    pub fn with_error(mut self, message: impl Into<String>) -> Self {
        self.error_message = Some(message.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_from_status() {
        assert_eq!(Outcome::from_status(200), Outcome::Success);
        assert_eq!(Outcome::from_status(301), Outcome::Success);
        assert_eq!(Outcome::from_status(400), Outcome::Error);
        assert_eq!(Outcome::from_status(403), Outcome::PermissionDenied);
        assert_eq!(Outcome::from_status(500), Outcome::Error);
    }

    #[test]
    fn test_builder_chain() {
        let entry = AuditEntry::new(
            "u-1",
            "alice",
            vec!["reader".into()],
            "WS:1",
            "WebSocket:1",
            Outcome::Success,
        )
        .with_source(Some("10.0.0.1".into()), None, Some("abcd1234".into()))
        .with_response(0, 12);

        assert_eq!(entry.action_type, "WS:1");
        assert_eq!(entry.ip_address.as_deref(), Some("10.0.0.1"));
        assert_eq!(entry.request_id.as_deref(), Some("abcd1234"));
        assert_eq!(entry.response_status, Some(0));
        assert_eq!(entry.duration_ms, Some(12));
        assert!(entry.error_message.is_none());
    }
}
