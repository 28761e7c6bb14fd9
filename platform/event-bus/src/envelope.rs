//! The platform event envelope and its structural validation.
//!
//! Every event on the bus is JSON of this shape. Consumers validate the
//! envelope before touching the payload so malformed producers are caught
//! at the boundary, not deep inside a handler.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Envelope wrapped around every cross-module event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope<T> {
    /// Unique event identifier; doubles as the consumer idempotency key.
    pub event_id: Uuid,

    /// When the event was generated.
    pub occurred_at: DateTime<Utc>,

    /// Tenant the event belongs to. Never empty.
    pub tenant_id: String,

    /// Module that produced the event ("payments", "orders", ...).
    pub source_module: String,

    /// Semantic version of the producer.
    pub source_version: String,

    /// Links events belonging to one business transaction.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,

    /// The event or command that caused this one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub causation_id: Option<String>,

    /// Event-specific payload.
    pub payload: T,
}

impl<T> EventEnvelope<T> {
    pub fn new(
        source_module: &str,
        source_version: &str,
        tenant_id: String,
        correlation_id: Option<String>,
        causation_id: Option<String>,
        payload: T,
    ) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            occurred_at: Utc::now(),
            tenant_id,
            source_module: source_module.to_string(),
            source_version: source_version.to_string(),
            correlation_id,
            causation_id,
            payload,
        }
    }
}

/// Validate the structural envelope contract on a raw JSON event.
///
/// Checks: `event_id` is a UUID, `occurred_at` parses as RFC 3339,
/// `tenant_id`/`source_module`/`source_version` are non-empty strings,
/// `correlation_id`/`causation_id` are strings or null when present, and
/// `payload` is an object.
pub fn validate_envelope_fields(envelope: &Value) -> Result<(), String> {
    let event_id = envelope
        .get("event_id")
        .and_then(|v| v.as_str())
        .ok_or("missing required field: event_id")?;
    Uuid::parse_str(event_id)
        .map_err(|_| format!("invalid event_id: expected a UUID, got '{event_id}'"))?;

    let occurred_at = envelope
        .get("occurred_at")
        .and_then(|v| v.as_str())
        .ok_or("missing required field: occurred_at")?;
    DateTime::parse_from_rfc3339(occurred_at)
        .map_err(|_| format!("invalid occurred_at: expected RFC 3339, got '{occurred_at}'"))?;

    for field in ["tenant_id", "source_module", "source_version"] {
        let value = envelope
            .get(field)
            .and_then(|v| v.as_str())
            .ok_or_else(|| format!("missing required field: {field}"))?;
        if value.trim().is_empty() {
            return Err(format!("invalid {field}: must be non-empty"));
        }
    }

    for field in ["correlation_id", "causation_id"] {
        if let Some(value) = envelope.get(field) {
            if !value.is_string() && !value.is_null() {
                return Err(format!("invalid {field}: must be a string or null"));
            }
        }
    }

    let payload = envelope
        .get("payload")
        .ok_or("missing required field: payload")?;
    if !payload.is_object() {
        return Err("invalid payload: must be an object".to_string());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn valid() -> Value {
        json!({
            "event_id": "4f2a6c1e-9d3b-4a8f-b1c2-0e5d7f6a8b9c",
            "occurred_at": "2026-08-01T09:30:00Z",
            "tenant_id": "ten_042",
            "source_module": "payments",
            "source_version": "0.3.0",
            "payload": { "payment_request_id": 17 }
        })
    }

    #[test]
    fn accepts_minimal_envelope() {
        assert!(validate_envelope_fields(&valid()).is_ok());
    }

    #[test]
    fn accepts_optional_ids() {
        let mut env = valid();
        env["correlation_id"] = json!("corr-9");
        env["causation_id"] = json!(null);
        assert!(validate_envelope_fields(&env).is_ok());
    }

    #[test]
    fn rejects_missing_event_id() {
        let mut env = valid();
        env.as_object_mut().unwrap().remove("event_id");
        assert_eq!(
            validate_envelope_fields(&env).unwrap_err(),
            "missing required field: event_id"
        );
    }

    #[test]
    fn rejects_non_uuid_event_id() {
        let mut env = valid();
        env["event_id"] = json!("evt-123");
        assert!(validate_envelope_fields(&env)
            .unwrap_err()
            .contains("invalid event_id"));
    }

    #[test]
    fn rejects_bad_timestamp() {
        let mut env = valid();
        env["occurred_at"] = json!("yesterday");
        assert!(validate_envelope_fields(&env)
            .unwrap_err()
            .contains("invalid occurred_at"));
    }

    #[test]
    fn rejects_blank_tenant() {
        let mut env = valid();
        env["tenant_id"] = json!("  ");
        assert_eq!(
            validate_envelope_fields(&env).unwrap_err(),
            "invalid tenant_id: must be non-empty"
        );
    }

    #[test]
    fn rejects_scalar_payload() {
        let mut env = valid();
        env["payload"] = json!(42);
        assert_eq!(
            validate_envelope_fields(&env).unwrap_err(),
            "invalid payload: must be an object"
        );
    }

    #[test]
    fn envelope_serializes_without_empty_options() {
        let env = EventEnvelope::new(
            "orders",
            "0.1.0",
            "ten_7".to_string(),
            None,
            None,
            json!({"order_id": 3}),
        );
        let value = serde_json::to_value(&env).unwrap();
        assert!(value.get("correlation_id").is_none());
        assert!(validate_envelope_fields(&value).is_ok());
    }
}
