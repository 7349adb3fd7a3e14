// Structured security-audit events, one per successful directory mutation.
//
// Event layout follows the OWASP logging vocabulary used by the identity
// platform: ISO-8601 timestamp, fixed application id, an event name of
// the form `authz_admin:<kind>_<action>:<identifier>`, a severity, a
// human-readable description and flattened contextual labels. Events are
// emitted as single JSON objects on the `security` tracing target.

use std::collections::BTreeMap;

use chrono::{SecondsFormat, Utc};
use serde::Serialize;

use crate::mappings::AUDIT_APP_ID;

/// Tracing target carrying the audit stream, so subscribers can route it
/// separately from diagnostic logs.
pub const SECURITY_TARGET: &str = "security";

#[derive(Debug, Clone, Serialize)]
pub struct AuditEvent {
    pub event_id: String,
    pub datetime: String,
    pub appid: String,
    pub event: String,
    pub level: String,
    pub description: String,
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(flatten)]
    pub labels: BTreeMap<String, String>,
}

impl AuditEvent {
    pub fn new(event: &str, description: &str, labels: BTreeMap<String, String>) -> Self {
        AuditEvent {
            event_id: uuid::Uuid::new_v4().to_string(),
            datetime: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            appid: AUDIT_APP_ID.to_string(),
            event: event.to_string(),
            level: "WARN".to_string(),
            description: description.to_string(),
            event_type: "security".to_string(),
            labels,
        }
    }

    pub fn to_json(&self) -> String {
        // Serialization of string maps cannot fail
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// Emitter for the audit stream.
#[derive(Debug, Clone, Copy, Default)]
pub struct AuditLogger;

impl AuditLogger {
    pub fn new() -> Self {
        AuditLogger
    }

    /// Emit one audit event at WARN on the security target.
    pub fn log_event(&self, event: &str, description: &str, labels: &[(&str, String)]) {
        let labels = labels
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect();
        let event = AuditEvent::new(event, description, labels);
        tracing::warn!(target: "security", "{}", event.to_json());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_json_shape() {
        let mut labels = BTreeMap::new();
        labels.insert("group".to_string(), "superheros".to_string());
        labels.insert("user".to_string(), "johndoe".to_string());

        let event = AuditEvent::new(
            "authz_admin:user_moved:johndoe",
            "User `johndoe` was moved to a different group",
            labels,
        );
        let json: serde_json::Value = serde_json::from_str(&event.to_json()).unwrap();

        assert_eq!(json["appid"], AUDIT_APP_ID);
        assert_eq!(json["event"], "authz_admin:user_moved:johndoe");
        assert_eq!(json["level"], "WARN");
        assert_eq!(json["type"], "security");
        // Labels are flattened into the top-level object
        assert_eq!(json["group"], "superheros");
        assert_eq!(json["user"], "johndoe");
        assert!(json.get("labels").is_none());
    }

    #[test]
    fn test_log_event_emits_at_warn() {
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::WARN)
            .with_test_writer()
            .finish();

        tracing::subscriber::with_default(subscriber, || {
            AuditLogger::new().log_event(
                "authz_admin:user_created:johndoe",
                "User `johndoe` was created",
                &[("user", "johndoe".to_string())],
            );
        });
    }
}
