//! Adapter for converting incident.raw_event.v1 into `IncidentRecord`s
//!
//! Each event is validated and resolved independently. Events that cannot be
//! turned into a record are reported back with their position and reason,
//! never dropped silently, and never abort the rest of the batch.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::error::EngineError;
use crate::resolver::TaxonomyResolver;
use crate::schema::raw_event::*;
use crate::types::IncidentRecord;

/// Adapter for turning raw incident events into normalized records
#[derive(Debug, Clone)]
pub struct IncidentIngestor {
    resolver: TaxonomyResolver,
}

impl IncidentIngestor {
    pub fn new(resolver: TaxonomyResolver) -> Self {
        Self { resolver }
    }

    /// Parse a JSON string containing an array of events
    pub fn parse_array(json: &str) -> Result<Vec<RawIncidentEvent>, EngineError> {
        let events: Vec<RawIncidentEvent> = serde_json::from_str(json)?;
        Ok(events)
    }

    /// Parse NDJSON (newline-delimited JSON) containing events
    pub fn parse_ndjson(ndjson: &str) -> Result<Vec<RawIncidentEvent>, EngineError> {
        let mut events = Vec::new();
        for (line_num, line) in ndjson.lines().enumerate() {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            match serde_json::from_str::<RawIncidentEvent>(trimmed) {
                Ok(event) => events.push(event),
                Err(e) => {
                    return Err(EngineError::ParseError(format!(
                        "Failed to parse line {}: {}",
                        line_num + 1,
                        e
                    )));
                }
            }
        }
        Ok(events)
    }

    /// Normalize a batch of events, splitting it into records and rejects
    pub fn ingest(&self, events: &[RawIncidentEvent]) -> IngestReport {
        let mut report = IngestReport::default();

        for (index, event) in events.iter().enumerate() {
            let outcome = self.ingest_one(event);
            report.push(index, event.event_id.clone(), outcome);
        }

        report
    }

    /// Normalize untyped JSON elements.
    ///
    /// Each element is decoded on its own, so an element of the wrong shape
    /// (a numeric timestamp, a `null` driver id, a bare string) is rejected
    /// without affecting its neighbours.
    pub fn ingest_values(&self, values: &[Value]) -> IngestReport {
        let mut report = IngestReport::default();

        for (index, value) in values.iter().enumerate() {
            let outcome = decode_event(value).and_then(|event| self.ingest_one(&event));
            report.push(index, event_id_of(value), outcome);
        }

        report
    }

    /// Normalize NDJSON, rejecting lines that are not JSON instead of failing
    /// the whole batch. `index` counts non-empty lines.
    pub fn ingest_ndjson(&self, ndjson: &str) -> IngestReport {
        let mut report = IngestReport::default();

        let lines = ndjson.lines().enumerate().filter(|(_, l)| !l.trim().is_empty());
        for (index, (line_num, line)) in lines.enumerate() {
            match serde_json::from_str::<Value>(line.trim()) {
                Ok(value) => {
                    let outcome = decode_event(&value).and_then(|event| self.ingest_one(&event));
                    report.push(index, event_id_of(&value), outcome);
                }
                Err(e) => report.push(
                    index,
                    None,
                    Err(ValidationError::MalformedEvent(format!(
                        "line {}: {}",
                        line_num + 1,
                        e
                    ))),
                ),
            }
        }

        report
    }

    /// Normalize a single event
    pub fn ingest_one(&self, event: &RawIncidentEvent) -> Result<IncidentRecord, ValidationError> {
        if event.schema_version != SCHEMA_VERSION {
            return Err(ValidationError::InvalidSchemaVersion {
                expected: SCHEMA_VERSION.to_string(),
                actual: event.schema_version.clone(),
            });
        }

        let timestamp = event.parse_timestamp()?;

        let normalized = self.resolver.resolve(&event.incident);
        let incident_type = normalized.incident_type.ok_or_else(|| {
            ValidationError::Unresolvable(format!("{:?}", normalized.original_input))
        })?;

        let message = event
            .message
            .as_deref()
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| incident_type.title.clone());

        Ok(IncidentRecord {
            id: event
                .event_id
                .clone()
                .unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
            driver_id: event.driver_id.clone(),
            vehicle_id: event.vehicle_id.clone(),
            incident_type,
            timestamp,
            message,
            matched: normalized.matched,
        })
    }

    /// Validate a batch of events
    pub fn validate_events(events: &[RawIncidentEvent]) -> Vec<ValidationResult> {
        events
            .iter()
            .enumerate()
            .map(|(idx, event)| ValidationResult {
                index: idx,
                event_id: event.event_id.clone(),
                result: event.validate().err(),
            })
            .filter(|r| r.result.is_some())
            .collect()
    }
}

fn decode_event(value: &Value) -> Result<RawIncidentEvent, ValidationError> {
    RawIncidentEvent::deserialize(value).map_err(|e| ValidationError::MalformedEvent(e.to_string()))
}

fn event_id_of(value: &Value) -> Option<String> {
    value
        .get("event_id")
        .and_then(Value::as_str)
        .map(str::to_string)
}

/// Result of event validation
#[derive(Debug)]
pub struct ValidationResult {
    pub index: usize,
    pub event_id: Option<String>,
    pub result: Option<ValidationError>,
}

/// An event that could not become a record
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RejectedEvent {
    /// Position in the input batch
    pub index: usize,
    pub event_id: Option<String>,
    pub reason: String,
}

/// Outcome of ingesting a batch
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct IngestReport {
    pub records: Vec<IncidentRecord>,
    pub rejected: Vec<RejectedEvent>,
}

impl IngestReport {
    fn push(
        &mut self,
        index: usize,
        event_id: Option<String>,
        outcome: Result<IncidentRecord, ValidationError>,
    ) {
        match outcome {
            Ok(record) => self.records.push(record),
            Err(e) => {
                warn!(
                    index,
                    event_id = event_id.as_deref().unwrap_or("unknown"),
                    error = %e,
                    "incident event rejected"
                );
                self.rejected.push(RejectedEvent {
                    index,
                    event_id,
                    reason: e.to_string(),
                });
            }
        }
    }

    pub fn rejected_count(&self) -> usize {
        self.rejected.len()
    }

    /// Records that only resolved through the default type
    pub fn low_confidence_count(&self) -> usize {
        self.records.iter().filter(|r| !r.matched).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::IncidentCatalog;
    use crate::types::IncidentKind;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    fn ingestor() -> IncidentIngestor {
        IncidentIngestor::new(TaxonomyResolver::new(Arc::new(IncidentCatalog::v1())))
    }

    fn create_test_events() -> Vec<RawIncidentEvent> {
        let json = r#"[
            {"event_id": "e1", "driver_id": "d1", "vehicle_id": "v1", "incident": 1,
             "timestamp": "2024-01-15T08:00:00Z", "message": "Phone usage detected"},
            {"event_id": "e2", "driver_id": "d1", "vehicle_id": "v1", "incident": "smoking",
             "timestamp": "2024-01-15 09:00:00"},
            {"event_id": "e3", "driver_id": "d2", "vehicle_id": "v2", "incident": "drowsy",
             "timestamp": "15/01/2024 10:00"},
            {"event_id": "e4", "driver_id": "d2", "vehicle_id": "v2", "incident": "mystery",
             "timestamp": "2024-01-15T11:00:00Z"}
        ]"#;
        IncidentIngestor::parse_array(json).unwrap()
    }

    #[test]
    fn test_ingest_splits_records_and_rejects() {
        let report = ingestor().ingest(&create_test_events());

        assert_eq!(report.records.len(), 3);
        assert_eq!(report.rejected_count(), 1);
        assert_eq!(report.rejected[0].index, 2);
        assert_eq!(report.rejected[0].event_id.as_deref(), Some("e3"));
        assert!(report.rejected[0].reason.contains("Invalid timestamp"));
    }

    #[test]
    fn test_ingest_resolves_and_fills_messages() {
        let report = ingestor().ingest(&create_test_events());

        let phone = &report.records[0];
        assert_eq!(phone.id, "e1");
        assert_eq!(phone.incident_type.kind, IncidentKind::PhoneUsage);
        assert_eq!(phone.message, "Phone usage detected");

        let smoking = &report.records[1];
        assert_eq!(smoking.incident_type.kind, IncidentKind::Cigarette);
        assert_eq!(smoking.message, "Smoking while driving");
        assert_eq!(smoking.timestamp.to_rfc3339(), "2024-01-15T09:00:00+00:00");

        let unknown = &report.records[2];
        assert_eq!(unknown.incident_type.kind, IncidentKind::Seatbelt);
        assert!(!unknown.matched);
        assert_eq!(report.low_confidence_count(), 1);
    }

    #[test]
    fn test_missing_event_id_gets_generated() {
        let events = IncidentIngestor::parse_ndjson(
            r#"{"incident": 4, "timestamp": "2024-01-15T08:00:00Z"}"#,
        )
        .unwrap();
        let report = ingestor().ingest(&events);
        assert_eq!(report.records.len(), 1);
        assert!(uuid::Uuid::parse_str(&report.records[0].id).is_ok());
    }

    #[test]
    fn test_wrong_schema_version_rejected() {
        let events = IncidentIngestor::parse_ndjson(
            r#"{"schema_version": "other.v9", "incident": 1, "timestamp": "2024-01-15T08:00:00Z"}"#,
        )
        .unwrap();
        let report = ingestor().ingest(&events);
        assert!(report.records.is_empty());
        assert_eq!(report.rejected_count(), 1);
    }

    #[test]
    fn test_parse_ndjson() {
        let ndjson = "{\"incident\": 1, \"timestamp\": \"2024-01-15T08:00:00Z\"}\n\n{\"incident\": \"belt\", \"timestamp\": \"2024-01-15T09:00:00Z\"}\n";
        let events = IncidentIngestor::parse_ndjson(ndjson).unwrap();
        assert_eq!(events.len(), 2);

        let err = IncidentIngestor::parse_ndjson("{\"incident\": 1}\nnot json").unwrap_err();
        assert!(err.to_string().contains("line 2"));
    }

    #[test]
    fn test_ingest_values_rejects_badly_shaped_elements() {
        let values: Vec<Value> = serde_json::from_str(
            r#"[
                {"event_id": "ok-1", "incident": 1, "timestamp": "2024-01-15T08:00:00Z"},
                {"event_id": "num-ts", "incident": 4, "timestamp": 1705307400},
                {"event_id": "null-ts", "incident": 4, "timestamp": null},
                {"event_id": "num-driver", "driver_id": 7, "incident": 2, "timestamp": "2024-01-15T09:00:00Z"},
                "not an object",
                {"event_id": "ok-2", "incident": "drowsy", "timestamp": "2024-01-15T10:00:00Z"}
            ]"#,
        )
        .unwrap();

        let report = ingestor().ingest_values(&values);

        let ids: Vec<&str> = report.records.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["ok-1", "ok-2"]);
        assert_eq!(report.rejected_count(), 4);

        let rejected_ids: Vec<Option<&str>> = report
            .rejected
            .iter()
            .map(|r| r.event_id.as_deref())
            .collect();
        assert_eq!(
            rejected_ids,
            vec![Some("num-ts"), Some("null-ts"), Some("num-driver"), None]
        );
        assert_eq!(report.rejected[3].index, 4);
        assert!(report.rejected[0].reason.contains("Malformed event"));
    }

    #[test]
    fn test_ingest_ndjson_tallies_unparseable_lines() {
        let ndjson = "{\"incident\": 1, \"timestamp\": \"2024-01-15T08:00:00Z\"}\n\n{ truncated\n{\"incident\": \"belt\", \"timestamp\": \"2024-01-15T09:00:00Z\"}\n";
        let report = ingestor().ingest_ndjson(ndjson);

        assert_eq!(report.records.len(), 2);
        assert_eq!(report.rejected_count(), 1);
        assert_eq!(report.rejected[0].index, 1);
        assert!(report.rejected[0].reason.contains("line 3"));
    }

    #[test]
    fn test_validate_events() {
        let results = IncidentIngestor::validate_events(&create_test_events());
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].index, 2);
    }
}
