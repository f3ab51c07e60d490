//! The event envelope: the canonical message shape carried on every queue.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::ControlError;

/// Immutable-in-transit message wrapper. `payload` is an opaque JSON object;
/// handlers and middleware only ever see it through the envelope, never
/// directly off the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default = "default_version")]
    pub version: u32,
    pub correlation_id: String,
    pub timestamp: DateTime<Utc>,
    pub payload: Value,
    #[serde(default)]
    pub is_rate_limited: bool,
}

fn default_version() -> u32 {
    1
}

impl Envelope {
    /// Build a fresh envelope, generating a correlation id and timestamp if
    /// the caller doesn't supply one. `version` defaults to 1 and
    /// `is_rate_limited` defaults to `false`.
    pub fn create(event_type: impl Into<String>, payload: Value) -> Result<Self, ControlError> {
        Self::create_with(event_type, payload, 1, None, false)
    }

    /// Full constructor used when a derived event must carry forward a
    /// parent's correlation id (see the correlation-propagation invariant).
    pub fn create_with(
        event_type: impl Into<String>,
        payload: Value,
        version: u32,
        correlation_id: Option<String>,
        is_rate_limited: bool,
    ) -> Result<Self, ControlError> {
        let event_type = event_type.into();
        let correlation_id = correlation_id.unwrap_or_else(|| Uuid::new_v4().to_string());
        let envelope = Envelope {
            event_type,
            version,
            correlation_id,
            timestamp: Utc::now(),
            payload,
            is_rate_limited,
        };
        envelope.validate()?;
        Ok(envelope)
    }

    fn validate(&self) -> Result<(), ControlError> {
        if self.event_type.is_empty() {
            return Err(ControlError::MalformedEnvelope("type is empty".into()));
        }
        if self.version < 1 {
            return Err(ControlError::MalformedEnvelope(
                "version must be >= 1".into(),
            ));
        }
        if self.correlation_id.is_empty() {
            return Err(ControlError::MalformedEnvelope(
                "correlation_id is empty".into(),
            ));
        }
        Ok(())
    }

    /// Parse a wire-format JSON object into an envelope, tolerating the two
    /// optional fields and rejecting anything that isn't a well-formed
    /// object with a non-empty `type` and `correlation_id`.
    pub fn from_wire(bytes: &[u8]) -> Result<Self, ControlError> {
        let value: Value = serde_json::from_slice(bytes)
            .map_err(|e| ControlError::MalformedEnvelope(e.to_string()))?;
        if !value.is_object() {
            return Err(ControlError::MalformedEnvelope(
                "top-level value is not a JSON object".into(),
            ));
        }
        let envelope: Envelope = serde_json::from_value(value)
            .map_err(|e| ControlError::MalformedEnvelope(e.to_string()))?;
        envelope.validate()?;
        Ok(envelope)
    }

    /// Canonical JSON encoding for publishing onto the broker.
    pub fn to_wire(&self) -> Result<Vec<u8>, ControlError> {
        serde_json::to_vec(self).map_err(|e| ControlError::MalformedEnvelope(e.to_string()))
    }

    /// Produce a derived envelope for the same causal chain: same
    /// `correlation_id`, fresh `timestamp`, new `type`/`payload`.
    pub fn derive(&self, event_type: impl Into<String>, payload: Value) -> Result<Self, ControlError> {
        Self::create_with(
            event_type,
            payload,
            1,
            Some(self.correlation_id.clone()),
            false,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn create_defaults() {
        let e = Envelope::create("events.telegram.raw", json!({"a": 1})).unwrap();
        assert_eq!(e.version, 1);
        assert!(!e.correlation_id.is_empty());
        assert!(!e.is_rate_limited);
    }

    #[test]
    fn rejects_empty_type() {
        let err = Envelope::create_with("", json!({}), 1, None, false).unwrap_err();
        assert!(matches!(err, ControlError::MalformedEnvelope(_)));
    }

    #[test]
    fn from_wire_defaults_version_and_rate_limited() {
        let bytes = br#"{"type":"events.telegram.raw","correlation_id":"abc","timestamp":"2024-01-01T00:00:00Z","payload":{}}"#;
        let e = Envelope::from_wire(bytes).unwrap();
        assert_eq!(e.version, 1);
        assert!(!e.is_rate_limited);
    }

    #[test]
    fn from_wire_rejects_non_object() {
        let err = Envelope::from_wire(b"[1,2,3]").unwrap_err();
        assert!(matches!(err, ControlError::MalformedEnvelope(_)));
    }

    #[test]
    fn from_wire_rejects_empty_correlation_id() {
        let bytes = br#"{"type":"events.telegram.raw","correlation_id":"","timestamp":"2024-01-01T00:00:00Z","payload":{}}"#;
        let err = Envelope::from_wire(bytes).unwrap_err();
        assert!(matches!(err, ControlError::MalformedEnvelope(_)));
    }

    #[test]
    fn derive_preserves_correlation_id() {
        let parent = Envelope::create("events.telegram.raw", json!({})).unwrap();
        let child = parent.derive("commands.media.video_download", json!({"x": 1})).unwrap();
        assert_eq!(child.correlation_id, parent.correlation_id);
        assert_ne!(child.event_type, parent.event_type);
    }

    proptest! {
        #[test]
        fn round_trip(event_type in "[a-z]{1,10}\\.[a-z]{1,10}\\.[a-z]{1,10}", correlation_id in "[a-zA-Z0-9-]{1,20}") {
            let envelope = Envelope::create_with(
                event_type,
                json!({"k": "v"}),
                1,
                Some(correlation_id),
                false,
            ).unwrap();
            let wire = envelope.to_wire().unwrap();
            let round_tripped = Envelope::from_wire(&wire).unwrap();
            prop_assert_eq!(envelope, round_tripped);
        }
    }
}
