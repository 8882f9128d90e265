//! incident.raw_event.v1 schema definition
//!
//! The wire shape monitoring devices emit for a single detected incident. The
//! incident identifier is kept in whatever shape the device sent it, and the
//! timestamp stays an unparsed string until ingestion so that one malformed
//! event can be rejected without failing the whole batch.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::RawIncidentIdentifier;

/// Current schema version
pub const SCHEMA_VERSION: &str = "incident.raw_event.v1";

/// Naive layouts accepted in addition to RFC 3339, interpreted as UTC
const NAIVE_TIMESTAMP_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"];

fn default_schema_version() -> String {
    SCHEMA_VERSION.to_string()
}

/// The main incident.raw_event.v1 schema
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawIncidentEvent {
    /// Schema version identifier
    #[serde(default = "default_schema_version")]
    pub schema_version: String,
    /// Unique event identifier
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_id: Option<String>,
    #[serde(default)]
    pub driver_id: String,
    #[serde(default)]
    pub vehicle_id: String,
    /// Incident code or label, any shape
    #[serde(default)]
    pub incident: RawIncidentIdentifier,
    /// Detection time; RFC 3339 or `YYYY-MM-DD HH:MM:SS` (UTC)
    #[serde(default)]
    pub timestamp: String,
    /// Human-readable alert text
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl RawIncidentEvent {
    /// Create a new event stamped with a fresh id
    pub fn new(
        driver_id: impl Into<String>,
        vehicle_id: impl Into<String>,
        incident: impl Into<RawIncidentIdentifier>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        RawIncidentEvent {
            schema_version: SCHEMA_VERSION.to_string(),
            event_id: Some(uuid::Uuid::new_v4().to_string()),
            driver_id: driver_id.into(),
            vehicle_id: vehicle_id.into(),
            incident: incident.into(),
            timestamp: timestamp.to_rfc3339(),
            message: None,
        }
    }

    /// Add an alert message
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_event_id(mut self, event_id: impl Into<String>) -> Self {
        self.event_id = Some(event_id.into());
        self
    }

    /// Replace the timestamp with a raw string (as received from a device)
    pub fn with_raw_timestamp(mut self, timestamp: impl Into<String>) -> Self {
        self.timestamp = timestamp.into();
        self
    }

    /// Parse the timestamp into UTC
    pub fn parse_timestamp(&self) -> Result<DateTime<Utc>, ValidationError> {
        parse_timestamp(&self.timestamp)
    }

    /// Validate the event schema
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.schema_version != SCHEMA_VERSION {
            return Err(ValidationError::InvalidSchemaVersion {
                expected: SCHEMA_VERSION.to_string(),
                actual: self.schema_version.clone(),
            });
        }

        self.parse_timestamp().map(|_| ())
    }
}

/// Parse an RFC 3339 or naive UTC timestamp
pub fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, ValidationError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::InvalidTimestamp {
            value: value.to_string(),
            reason: "timestamp is empty".to_string(),
        });
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(dt.with_timezone(&Utc));
    }

    for format in NAIVE_TIMESTAMP_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Ok(naive.and_utc());
        }
    }

    Err(ValidationError::InvalidTimestamp {
        value: value.to_string(),
        reason: "expected RFC 3339 or YYYY-MM-DD HH:MM:SS".to_string(),
    })
}

/// Validation errors for raw events
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("Invalid schema version: expected {expected}, got {actual}")]
    InvalidSchemaVersion { expected: String, actual: String },

    #[error("Invalid timestamp '{value}': {reason}")]
    InvalidTimestamp { value: String, reason: String },

    #[error("Incident could not be resolved: {0}")]
    Unresolvable(String),

    #[error("Malformed event: {0}")]
    MalformedEvent(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serialize_event() {
        let event = RawIncidentEvent::new("driver-7", "truck-12", 1i64, Utc::now())
            .with_message("Phone usage detected");
        let json = serde_json::to_string_pretty(&event).unwrap();

        assert!(json.contains("incident.raw_event.v1"));
        assert!(json.contains("driver-7"));
        assert!(json.contains("Phone usage detected"));
        assert!(event.validate().is_ok());
    }

    #[test]
    fn test_deserialize_minimal_event() {
        let json = r#"{
            "driver_id": "d1",
            "vehicle_id": "v1",
            "incident": "Drowsiness",
            "timestamp": "2024-01-15T08:30:00Z"
        }"#;

        let event: RawIncidentEvent = serde_json::from_str(json).unwrap();
        assert_eq!(event.schema_version, SCHEMA_VERSION);
        assert_eq!(
            event.incident,
            RawIncidentIdentifier::Text("Drowsiness".to_string())
        );
        assert!(event.event_id.is_none());
        assert!(event.validate().is_ok());
    }

    #[test]
    fn test_missing_incident_is_missing_identifier() {
        let event: RawIncidentEvent =
            serde_json::from_str(r#"{"timestamp": "2024-01-15 08:30:00"}"#).unwrap();
        assert_eq!(event.incident, RawIncidentIdentifier::Missing);
    }

    #[test]
    fn test_timestamp_formats() {
        let rfc = parse_timestamp("2024-01-15T08:30:00+02:00").unwrap();
        assert_eq!(rfc.to_rfc3339(), "2024-01-15T06:30:00+00:00");

        let naive = parse_timestamp("2024-01-15 08:30:00").unwrap();
        assert_eq!(naive.to_rfc3339(), "2024-01-15T08:30:00+00:00");

        assert!(parse_timestamp("yesterday").is_err());
        assert!(parse_timestamp("").is_err());
        assert!(parse_timestamp("2024-13-45 99:00:00").is_err());
    }

    #[test]
    fn test_validation_errors() {
        let mut event = RawIncidentEvent::new("d", "v", "phone", Utc::now());
        event.schema_version = "incident.raw_event.v0".to_string();
        assert!(matches!(
            event.validate(),
            Err(ValidationError::InvalidSchemaVersion { .. })
        ));

        let event = RawIncidentEvent::new("d", "v", "phone", Utc::now())
            .with_raw_timestamp("not-a-time");
        assert!(matches!(
            event.validate(),
            Err(ValidationError::InvalidTimestamp { .. })
        ));
    }
}
