//! Pipeline orchestration
//!
//! This module provides the public API for DriveGuard. It wires one shared
//! catalog into the resolver, the ingestor and the aggregation engine, and
//! turns every upstream failure into a fallback snapshot so callers always get
//! a well-formed dashboard.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::aggregator::{AggregationEngine, AggregationOutcome, DataFeed, TripData};
use crate::catalog::IncidentCatalog;
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::fallback::{FallbackPolicy, UnavailableReason};
use crate::resolver::TaxonomyResolver;
use crate::schema::{IncidentIngestor, IngestReport, RawIncidentEvent};
use crate::types::{DashboardSnapshot, IncidentRecord, NormalizationResult, RawIncidentIdentifier};

/// Resolve one raw identifier (any JSON shape) against the v1 catalog.
///
/// # Arguments
/// * `raw_json` - The identifier as JSON, e.g. `3`, `"Phone usage"` or `null`
///
/// # Returns
/// `NormalizationResult` JSON
///
/// # Example
/// ```ignore
/// let result = resolve_incident("\"driver is drowsy\"".to_string())?;
/// ```
pub fn resolve_incident(raw_json: String) -> Result<String, EngineError> {
    let value: serde_json::Value = serde_json::from_str(&raw_json)?;
    let result = DashboardEngine::default().resolve_value(&value);
    Ok(serde_json::to_string(&result)?)
}

/// Build a dashboard snapshot from a request body using the v1 catalog.
///
/// A body that cannot be parsed yields the fallback snapshot.
///
/// # Example
/// ```ignore
/// let snapshot = dashboard_snapshot(r#"{"tripCount": 10, "incidents": []}"#.to_string())?;
/// ```
pub fn dashboard_snapshot(request_json: String) -> Result<String, EngineError> {
    let snapshot = DashboardEngine::default().snapshot_from_json(&request_json);
    Ok(serde_json::to_string(&snapshot)?)
}

/// Request body accepted by `snapshot_from_json`
///
/// Incidents stay untyped here so that one badly shaped element is rejected
/// on its own during ingestion instead of failing the whole body.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardRequest {
    pub trip_count: u64,
    #[serde(default)]
    pub incidents: Vec<serde_json::Value>,
    #[serde(default)]
    pub scores: Option<Vec<f64>>,
}

/// External data-fetch boundary.
///
/// Implementations own I/O, retries and timeouts. An `Err` means the data is
/// unavailable and the engine serves the fallback snapshot.
pub trait TelemetrySource {
    fn fetch(&self) -> Result<TripData, EngineError>;
}

/// Resolver, ingestor and aggregator over one shared catalog
#[derive(Debug, Clone)]
pub struct DashboardEngine {
    catalog: Arc<IncidentCatalog>,
    ingestor: IncidentIngestor,
    resolver: TaxonomyResolver,
    aggregator: AggregationEngine,
}

impl Default for DashboardEngine {
    fn default() -> Self {
        Self::with_catalog(Arc::new(IncidentCatalog::v1()))
    }
}

impl DashboardEngine {
    /// Build an engine from configuration, appending catalog extensions and
    /// their keyword rules.
    pub fn from_config(config: &EngineConfig) -> Result<Self, EngineError> {
        config.validate()?;
        let catalog = Arc::new(config.build_catalog()?);

        let mut resolver = TaxonomyResolver::new(Arc::clone(&catalog));
        for extension in &config.catalog_extensions {
            resolver.push_keywords(&extension.incident_type.kind, &extension.keywords);
        }

        Ok(Self {
            ingestor: IncidentIngestor::new(resolver.clone()),
            aggregator: AggregationEngine::from_config(Arc::clone(&catalog), config),
            resolver,
            catalog,
        })
    }

    /// Engine over an explicit catalog with default rules and weights
    pub fn with_catalog(catalog: Arc<IncidentCatalog>) -> Self {
        let resolver = TaxonomyResolver::new(Arc::clone(&catalog));
        Self {
            ingestor: IncidentIngestor::new(resolver.clone()),
            aggregator: AggregationEngine::new(Arc::clone(&catalog)),
            resolver,
            catalog,
        }
    }

    pub fn catalog(&self) -> &Arc<IncidentCatalog> {
        &self.catalog
    }

    pub fn resolver(&self) -> &TaxonomyResolver {
        &self.resolver
    }

    pub fn resolve(&self, raw: &RawIncidentIdentifier) -> NormalizationResult {
        self.resolver.resolve(raw)
    }

    pub fn resolve_value(&self, value: &serde_json::Value) -> NormalizationResult {
        self.resolver.resolve_value(value)
    }

    pub fn ingest(&self, events: &[RawIncidentEvent]) -> IngestReport {
        self.ingestor.ingest(events)
    }

    pub fn aggregate(
        &self,
        trip_count: u64,
        incidents: &[IncidentRecord],
        scores: Option<&[f64]>,
    ) -> DashboardSnapshot {
        self.aggregator.aggregate(trip_count, incidents, scores)
    }

    pub fn aggregate_feed(&self, feed: DataFeed) -> AggregationOutcome {
        self.aggregator.aggregate_feed(feed)
    }

    /// Ingest raw events, then aggregate the records that survived.
    ///
    /// Events rejected at ingestion count toward `rejected_count`.
    pub fn snapshot_from_events(
        &self,
        trip_count: u64,
        events: &[RawIncidentEvent],
        scores: Option<&[f64]>,
    ) -> DashboardSnapshot {
        self.snapshot_from_report(trip_count, self.ingest(events), scores)
    }

    /// Like `snapshot_from_events`, for untyped JSON elements
    pub fn snapshot_from_values(
        &self,
        trip_count: u64,
        values: &[serde_json::Value],
        scores: Option<&[f64]>,
    ) -> DashboardSnapshot {
        let report = self.ingestor.ingest_values(values);
        self.snapshot_from_report(trip_count, report, scores)
    }

    /// Like `snapshot_from_events`, for NDJSON text; lines that are not JSON
    /// are counted as rejected
    pub fn snapshot_from_ndjson(
        &self,
        trip_count: u64,
        ndjson: &str,
        scores: Option<&[f64]>,
    ) -> DashboardSnapshot {
        let report = self.ingestor.ingest_ndjson(ndjson);
        self.snapshot_from_report(trip_count, report, scores)
    }

    fn snapshot_from_report(
        &self,
        trip_count: u64,
        report: IngestReport,
        scores: Option<&[f64]>,
    ) -> DashboardSnapshot {
        let rejected = report.rejected_count();

        self.aggregate_feed(DataFeed::Available(TripData {
            trip_count,
            incidents: report.records,
            scores: scores.map(<[f64]>::to_vec),
            rejected,
        }))
        .into_snapshot()
    }

    /// Fetch from an external source; a fetch error yields the fallback snapshot
    pub fn snapshot_from_source(&self, source: &dyn TelemetrySource) -> DashboardSnapshot {
        let feed = match source.fetch() {
            Ok(data) => DataFeed::Available(data),
            Err(e) => {
                warn!(error = %e, "telemetry fetch failed");
                DataFeed::Unavailable(unavailable_reason(&e))
            }
        };
        self.aggregate_feed(feed).into_snapshot()
    }

    /// Build a snapshot from a `DashboardRequest` body.
    ///
    /// A malformed body yields the fallback snapshot tagged `malformed`.
    pub fn snapshot_from_json(&self, request_json: &str) -> DashboardSnapshot {
        match serde_json::from_str::<DashboardRequest>(request_json) {
            Ok(request) => self.snapshot_from_values(
                request.trip_count,
                &request.incidents,
                request.scores.as_deref(),
            ),
            Err(e) => {
                warn!(error = %e, "malformed dashboard request");
                FallbackPolicy::snapshot(UnavailableReason::Malformed)
            }
        }
    }
}

fn unavailable_reason(error: &EngineError) -> UnavailableReason {
    match error {
        EngineError::ParseError(_)
        | EngineError::JsonError(_)
        | EngineError::InvalidTimestamp(_) => UnavailableReason::Malformed,
        EngineError::Io(e) if e.kind() == std::io::ErrorKind::TimedOut => {
            UnavailableReason::Timeout
        }
        _ => UnavailableReason::Transport,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{IncidentKind, SnapshotSource};
    use pretty_assertions::assert_eq;

    fn sample_request_json() -> &'static str {
        r#"{
            "tripCount": 142,
            "incidents": [
                {"event_id": "e1", "driver_id": "d1", "vehicle_id": "v1", "incident": 1,
                 "timestamp": "2024-01-15T08:00:00Z", "message": "Phone usage detected"},
                {"event_id": "e2", "driver_id": "d1", "vehicle_id": "v1", "incident": "phone",
                 "timestamp": "sometime"},
                {"event_id": "e3", "driver_id": "d2", "vehicle_id": "v2", "incident": "Drowsiness",
                 "timestamp": "2024-01-15T09:30:00Z", "message": "Driver drowsy"}
            ]
        }"#
    }

    struct FixedSource(Result<u64, std::io::ErrorKind>);

    impl TelemetrySource for FixedSource {
        fn fetch(&self) -> Result<TripData, EngineError> {
            match self.0 {
                Ok(trips) => Ok(TripData {
                    trip_count: trips,
                    ..TripData::default()
                }),
                Err(kind) => Err(EngineError::Io(std::io::Error::new(kind, "fetch failed"))),
            }
        }
    }

    #[test]
    fn test_malformed_record_excluded_and_counted() {
        let engine = DashboardEngine::default();
        let snapshot = engine.snapshot_from_json(sample_request_json());

        assert_eq!(snapshot.source, SnapshotSource::Live);
        assert_eq!(snapshot.total_incidents, 2);
        assert_eq!(snapshot.rejected_count, 1);
        assert_eq!(snapshot.alerts.len(), 2);
        assert_eq!(snapshot.alerts[0].message, "Driver drowsy");
        assert!(snapshot.safe_driving_percentage < 100.0);
    }

    #[test]
    fn test_badly_shaped_record_is_rejected_not_fatal() {
        let engine = DashboardEngine::default();
        let bad_records = [
            r#"{"event_id": "bad", "incident": 4, "timestamp": 1705307400}"#,
            r#"{"event_id": "bad", "incident": 4, "timestamp": null}"#,
            r#"{"event_id": "bad", "driver_id": 7, "incident": 4, "timestamp": "2024-01-15T10:00:00Z"}"#,
        ];

        for bad in bad_records {
            let body = format!(
                r#"{{
                    "tripCount": 50,
                    "incidents": [
                        {{"event_id": "e1", "incident": 1, "timestamp": "2024-01-15T08:00:00Z"}},
                        {bad},
                        {{"event_id": "e3", "incident": "smoking", "timestamp": "2024-01-15T09:00:00Z"}}
                    ]
                }}"#
            );
            let snapshot = engine.snapshot_from_json(&body);

            assert_eq!(snapshot.source, SnapshotSource::Live, "{}", bad);
            assert_eq!(snapshot.total_trips, 50);
            assert_eq!(snapshot.total_incidents, 2);
            assert_eq!(snapshot.rejected_count, 1);
        }
    }

    #[test]
    fn test_snapshot_from_ndjson_counts_broken_lines() {
        let engine = DashboardEngine::default();
        let ndjson = "{\"incident\": 1, \"timestamp\": \"2024-01-15T08:00:00Z\"}\nnot json at all\n{\"incident\": 2, \"timestamp\": \"2024-01-15T09:00:00Z\"}\n";
        let snapshot = engine.snapshot_from_ndjson(10, ndjson, None);

        assert!(!snapshot.is_fallback());
        assert_eq!(snapshot.total_incidents, 2);
        assert_eq!(snapshot.rejected_count, 1);
    }

    #[test]
    fn test_malformed_request_falls_back() {
        let engine = DashboardEngine::default();
        for body in ["not json", r#"{"tripCount": -5}"#, r#"{"incidents": []}"#] {
            let snapshot = engine.snapshot_from_json(body);
            assert!(snapshot.is_fallback(), "{} should fall back", body);
            assert_eq!(snapshot.fallback_reason.as_deref(), Some("malformed"));
            assert!(!snapshot.alerts.is_empty());
        }
    }

    #[test]
    fn test_source_errors_map_to_fallback_reason() {
        let engine = DashboardEngine::default();

        let live = engine.snapshot_from_source(&FixedSource(Ok(12)));
        assert!(!live.is_fallback());
        assert_eq!(live.total_trips, 12);

        let timed_out = engine.snapshot_from_source(&FixedSource(Err(std::io::ErrorKind::TimedOut)));
        assert_eq!(timed_out.fallback_reason.as_deref(), Some("timeout"));

        let refused =
            engine.snapshot_from_source(&FixedSource(Err(std::io::ErrorKind::ConnectionRefused)));
        assert_eq!(refused.fallback_reason.as_deref(), Some("transport"));
    }

    #[test]
    fn test_from_config_extends_catalog_and_rules() {
        let config = EngineConfig::from_json(
            r#"{
                "alert_limit": 5,
                "catalog_extensions": [{
                    "code": 5,
                    "kind": "HARSH_BRAKING",
                    "severity": "low",
                    "displayName": "Harsh Braking",
                    "title": "Harsh braking event",
                    "description": "Deceleration exceeded threshold.",
                    "recommendedAction": "Keep a safe distance.",
                    "keywords": ["brake"]
                }]
            }"#,
        )
        .unwrap();
        let engine = DashboardEngine::from_config(&config).unwrap();

        let result = engine.resolve(&"hard brake".into());
        assert!(result.matched);
        assert_eq!(
            result.incident_type.unwrap().kind,
            IncidentKind::Other("HARSH_BRAKING".to_string())
        );

        let event = RawIncidentEvent::new("d", "v", 5i64, chrono::Utc::now());
        let snapshot = engine.snapshot_from_events(10, &[event], None);
        assert_eq!(snapshot.catalog_version, 2);
        assert_eq!(snapshot.incident_counts.get("HARSH_BRAKING"), Some(&1));
        assert!((snapshot.safe_driving_percentage - 97.0).abs() < 1e-9);
    }

    #[test]
    fn test_catalog_shared_between_components() {
        let engine = DashboardEngine::default();
        assert!(Arc::ptr_eq(engine.catalog(), engine.resolver().catalog()));
    }

    #[test]
    fn test_one_shot_functions() {
        let resolved = resolve_incident("\"PHONE\"".to_string()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&resolved).unwrap();
        assert_eq!(value["matched"], true);
        assert_eq!(value["incidentType"]["kind"], "PHONE_USAGE");

        let snapshot = dashboard_snapshot(r#"{"tripCount": 0}"#.to_string()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&snapshot).unwrap();
        assert_eq!(value["safeDrivingPercentage"], 100.0);
        assert_eq!(value["noData"], true);

        assert!(resolve_incident("{oops".to_string()).is_err());
    }

    #[test]
    fn test_engine_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<DashboardEngine>();
    }
}
