//! Core types for the DriveGuard engine
//!
//! This module defines the data structures that flow through the engine:
//! taxonomy entries, raw identifiers, normalization results, incident records
//! and the dashboard snapshot handed to the presentation layer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Incident severity, ordered `Low < Medium < High`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
        }
    }
}

/// Symbolic incident tag
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IncidentKind {
    PhoneUsage,
    Cigarette,
    Seatbelt,
    Drowsiness,
    /// Kinds appended to the catalog after v1
    #[serde(untagged)]
    Other(String),
}

impl IncidentKind {
    pub fn as_str(&self) -> &str {
        match self {
            IncidentKind::PhoneUsage => "PHONE_USAGE",
            IncidentKind::Cigarette => "CIGARETTE",
            IncidentKind::Seatbelt => "SEATBELT",
            IncidentKind::Drowsiness => "DROWSINESS",
            IncidentKind::Other(tag) => tag.as_str(),
        }
    }
}

impl fmt::Display for IncidentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A published taxonomy entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncidentType {
    /// Stable numeric identifier, never reassigned
    pub code: u32,
    pub kind: IncidentKind,
    pub severity: Severity,
    pub display_name: String,
    pub title: String,
    pub description: String,
    pub recommended_action: String,
}

/// Incident identifier as received from upstream, shape unknown
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawIncidentIdentifier {
    /// Integer code
    Code(i64),
    /// Free text or an integer-valued string
    Text(String),
    /// `null` or absent
    #[default]
    Missing,
    /// Any other JSON shape (floats, booleans, arrays, objects)
    Other(serde_json::Value),
}

impl From<serde_json::Value> for RawIncidentIdentifier {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => RawIncidentIdentifier::Missing,
            serde_json::Value::String(s) => RawIncidentIdentifier::Text(s),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(code) => RawIncidentIdentifier::Code(code),
                None => RawIncidentIdentifier::Other(serde_json::Value::Number(n)),
            },
            other => RawIncidentIdentifier::Other(other),
        }
    }
}

impl From<i64> for RawIncidentIdentifier {
    fn from(code: i64) -> Self {
        RawIncidentIdentifier::Code(code)
    }
}

impl From<&str> for RawIncidentIdentifier {
    fn from(text: &str) -> Self {
        RawIncidentIdentifier::Text(text.to_string())
    }
}

impl From<String> for RawIncidentIdentifier {
    fn from(text: String) -> Self {
        RawIncidentIdentifier::Text(text)
    }
}

impl<T: Into<RawIncidentIdentifier>> From<Option<T>> for RawIncidentIdentifier {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or_default()
    }
}

/// Outcome of resolving a raw identifier against the catalog
///
/// `matched == false` with a type present is a low-confidence fallback guess;
/// a missing type is a total resolution failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizationResult {
    pub incident_type: Option<IncidentType>,
    pub matched: bool,
    pub original_input: RawIncidentIdentifier,
}

impl NormalizationResult {
    pub fn is_fallback(&self) -> bool {
        self.incident_type.is_some() && !self.matched
    }
}

/// A normalized, immutable incident
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncidentRecord {
    pub id: String,
    pub driver_id: String,
    pub vehicle_id: String,
    pub incident_type: IncidentType,
    pub timestamp: DateTime<Utc>,
    pub message: String,
    /// Whether the type came from a genuine match rather than the default
    #[serde(default = "default_matched")]
    pub matched: bool,
}

fn default_matched() -> bool {
    true
}

/// One entry of the dashboard alert feed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub message: String,
    pub severity: Severity,
    pub timestamp: DateTime<Utc>,
}

/// Provenance of a snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SnapshotSource {
    /// Derived from real upstream data
    Live,
    /// Constant placeholder used when upstream data is unavailable
    Fallback,
}

/// Point-in-time dashboard result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardSnapshot {
    pub total_trips: u64,
    /// Share of trips without weighted incidents (0-100)
    pub safe_driving_percentage: f64,
    pub average_score: f64,
    /// Most recent first
    pub alerts: Vec<Alert>,
    pub source: SnapshotSource,
    /// Set when there were no trips to divide by
    pub no_data: bool,
    pub total_incidents: usize,
    /// Incident count per kind tag
    pub incident_counts: BTreeMap<String, usize>,
    /// Aggregated incidents that only resolved through the default type
    pub low_confidence_count: usize,
    /// Records excluded from aggregation
    pub rejected_count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_reason: Option<String>,
    pub catalog_version: u32,
}

impl DashboardSnapshot {
    pub fn is_fallback(&self) -> bool {
        self.source == SnapshotSource::Fallback
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Low < Severity::Medium);
        assert!(Severity::Medium < Severity::High);
    }

    #[test]
    fn test_kind_serialization() {
        assert_eq!(
            serde_json::to_value(IncidentKind::PhoneUsage).unwrap(),
            json!("PHONE_USAGE")
        );
        let other: IncidentKind = serde_json::from_value(json!("HARSH_BRAKING")).unwrap();
        assert_eq!(other, IncidentKind::Other("HARSH_BRAKING".to_string()));
        let known: IncidentKind = serde_json::from_value(json!("SEATBELT")).unwrap();
        assert_eq!(known, IncidentKind::Seatbelt);
    }

    #[test]
    fn test_raw_identifier_from_value() {
        assert_eq!(
            RawIncidentIdentifier::from(json!(2)),
            RawIncidentIdentifier::Code(2)
        );
        assert_eq!(
            RawIncidentIdentifier::from(json!("phone")),
            RawIncidentIdentifier::Text("phone".to_string())
        );
        assert_eq!(
            RawIncidentIdentifier::from(json!(null)),
            RawIncidentIdentifier::Missing
        );
        assert!(matches!(
            RawIncidentIdentifier::from(json!(2.5)),
            RawIncidentIdentifier::Other(_)
        ));
        assert!(matches!(
            RawIncidentIdentifier::from(json!(true)),
            RawIncidentIdentifier::Other(_)
        ));
    }

    #[test]
    fn test_raw_identifier_deserialize() {
        let ids: Vec<RawIncidentIdentifier> =
            serde_json::from_str(r#"[1, "smoking", null, {"a": 1}]"#).unwrap();
        assert_eq!(ids[0], RawIncidentIdentifier::Code(1));
        assert_eq!(ids[1], RawIncidentIdentifier::Text("smoking".to_string()));
        assert_eq!(ids[2], RawIncidentIdentifier::Missing);
        assert!(matches!(ids[3], RawIncidentIdentifier::Other(_)));
    }
}
