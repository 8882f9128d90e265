//! Fallback snapshot policy
//!
//! When upstream trip or incident data cannot be obtained, the dashboard still
//! receives a well-formed snapshot. Its values are the constants below and are
//! never derived from partial data.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::catalog::CATALOG_VERSION;
use crate::types::{Alert, DashboardSnapshot, Severity, SnapshotSource};

pub const FALLBACK_TOTAL_TRIPS: u64 = 142;
pub const FALLBACK_SAFE_DRIVING_PERCENTAGE: f64 = 94.0;
pub const FALLBACK_AVERAGE_SCORE: f64 = 88.0;

/// 2024-01-15T08:30:00Z
const FALLBACK_PHONE_ALERT_SECS: i64 = 1_705_307_400;
/// 2024-01-15T07:45:00Z
const FALLBACK_DROWSY_ALERT_SECS: i64 = 1_705_304_700;

/// Why upstream data could not be used
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnavailableReason {
    /// Network or storage failure
    Transport,
    /// Payload could not be parsed
    Malformed,
    Timeout,
    /// Caller cancelled the fetch
    Cancelled,
}

impl UnavailableReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            UnavailableReason::Transport => "transport",
            UnavailableReason::Malformed => "malformed",
            UnavailableReason::Timeout => "timeout",
            UnavailableReason::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for UnavailableReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The single definition of degraded-mode dashboard output
pub struct FallbackPolicy;

impl FallbackPolicy {
    /// Constant placeholder snapshot tagged `Fallback`
    pub fn snapshot(reason: UnavailableReason) -> DashboardSnapshot {
        let alerts = vec![
            Alert {
                message: "Phone usage detected while driving".to_string(),
                severity: Severity::High,
                timestamp: fixed_time(FALLBACK_PHONE_ALERT_SECS),
            },
            Alert {
                message: "Driver drowsiness detected".to_string(),
                severity: Severity::High,
                timestamp: fixed_time(FALLBACK_DROWSY_ALERT_SECS),
            },
        ];

        let mut incident_counts = BTreeMap::new();
        incident_counts.insert("PHONE_USAGE".to_string(), 1);
        incident_counts.insert("DROWSINESS".to_string(), 1);

        DashboardSnapshot {
            total_trips: FALLBACK_TOTAL_TRIPS,
            safe_driving_percentage: FALLBACK_SAFE_DRIVING_PERCENTAGE,
            average_score: FALLBACK_AVERAGE_SCORE,
            total_incidents: alerts.len(),
            alerts,
            source: SnapshotSource::Fallback,
            no_data: false,
            incident_counts,
            low_confidence_count: 0,
            rejected_count: 0,
            fallback_reason: Some(reason.as_str().to_string()),
            catalog_version: CATALOG_VERSION,
        }
    }
}

fn fixed_time(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(secs, 0).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_fallback_snapshot_is_populated() {
        let snapshot = FallbackPolicy::snapshot(UnavailableReason::Transport);

        assert!(snapshot.is_fallback());
        assert!(!snapshot.alerts.is_empty());
        assert!(snapshot.total_trips > 0);
        assert!(snapshot.safe_driving_percentage.is_finite());
        assert!(snapshot.average_score.is_finite());
        assert_eq!(snapshot.fallback_reason.as_deref(), Some("transport"));
    }

    #[test]
    fn test_fallback_alerts_are_most_recent_first() {
        let snapshot = FallbackPolicy::snapshot(UnavailableReason::Timeout);
        assert!(snapshot.alerts[0].timestamp > snapshot.alerts[1].timestamp);
        assert_eq!(
            snapshot.alerts[0].timestamp.to_rfc3339(),
            "2024-01-15T08:30:00+00:00"
        );
    }

    #[test]
    fn test_fallback_is_constant() {
        let a = FallbackPolicy::snapshot(UnavailableReason::Malformed);
        let b = FallbackPolicy::snapshot(UnavailableReason::Malformed);
        assert_eq!(a, b);
    }

    #[test]
    fn test_fallback_json_shape() {
        let snapshot = FallbackPolicy::snapshot(UnavailableReason::Cancelled);
        let value = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(value["totalTrips"], 142);
        assert_eq!(value["safeDrivingPercentage"], 94.0);
        assert_eq!(value["averageScore"], 88.0);
        assert_eq!(value["source"], "fallback");
        assert!(value["alerts"][0]["message"].is_string());
    }
}
