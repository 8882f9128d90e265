//! Dashboard aggregation
//!
//! Folds a trip count, normalized incidents and optional per-trip scores into a
//! `DashboardSnapshot`. Aggregation is a pure function of its inputs plus the
//! shared catalog; when the caller reports that data is unavailable it returns
//! the fallback snapshot instead.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::catalog::IncidentCatalog;
use crate::config::{EngineConfig, SeverityWeights};
use crate::fallback::{FallbackPolicy, UnavailableReason};
use crate::types::{Alert, DashboardSnapshot, IncidentRecord, SnapshotSource};

/// Percentage reported when there are no trips
pub const NEUTRAL_SAFE_DRIVING_PERCENTAGE: f64 = 100.0;

/// Data handed over by the external fetch boundary
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TripData {
    pub trip_count: u64,
    #[serde(default)]
    pub incidents: Vec<IncidentRecord>,
    #[serde(default)]
    pub scores: Option<Vec<f64>>,
    /// Records already rejected before aggregation (e.g. at ingestion)
    #[serde(default)]
    pub rejected: usize,
}

/// Input to one aggregation request
#[derive(Debug, Clone, PartialEq)]
pub enum DataFeed {
    Available(TripData),
    Unavailable(UnavailableReason),
}

/// Terminal state of one aggregation request
#[derive(Debug, Clone, PartialEq)]
pub enum AggregationOutcome {
    /// Live snapshot from real data
    Succeeded(DashboardSnapshot),
    /// Fallback snapshot because data was unavailable
    Failed {
        reason: UnavailableReason,
        snapshot: DashboardSnapshot,
    },
}

impl AggregationOutcome {
    pub fn snapshot(&self) -> &DashboardSnapshot {
        match self {
            AggregationOutcome::Succeeded(snapshot) => snapshot,
            AggregationOutcome::Failed { snapshot, .. } => snapshot,
        }
    }

    pub fn into_snapshot(self) -> DashboardSnapshot {
        match self {
            AggregationOutcome::Succeeded(snapshot) => snapshot,
            AggregationOutcome::Failed { snapshot, .. } => snapshot,
        }
    }

    pub fn is_live(&self) -> bool {
        matches!(self, AggregationOutcome::Succeeded(_))
    }
}

/// Stateless aggregation over a shared catalog
#[derive(Debug, Clone)]
pub struct AggregationEngine {
    catalog: Arc<IncidentCatalog>,
    weights: SeverityWeights,
    score_proxy_factor: f64,
    alert_limit: Option<usize>,
}

impl AggregationEngine {
    /// Engine with default weights and no alert limit
    pub fn new(catalog: Arc<IncidentCatalog>) -> Self {
        Self::from_config(catalog, &EngineConfig::default())
    }

    pub fn from_config(catalog: Arc<IncidentCatalog>, config: &EngineConfig) -> Self {
        Self {
            catalog,
            weights: config.severity_weights,
            score_proxy_factor: config.score_proxy_factor,
            alert_limit: config.alert_limit,
        }
    }

    /// Aggregate live data into a snapshot.
    ///
    /// Records whose incident type is not an entry of this engine's catalog are
    /// excluded and counted in `rejected_count`.
    pub fn aggregate(
        &self,
        trip_count: u64,
        incidents: &[IncidentRecord],
        scores: Option<&[f64]>,
    ) -> DashboardSnapshot {
        let mut valid: Vec<&IncidentRecord> = Vec::with_capacity(incidents.len());
        let mut rejected_count = 0usize;

        for record in incidents {
            if self.catalog.contains(&record.incident_type) {
                valid.push(record);
            } else {
                rejected_count += 1;
                warn!(
                    record_id = %record.id,
                    code = record.incident_type.code,
                    "incident type not in catalog, excluded from aggregation"
                );
            }
        }

        let weighted_incidents: f64 = valid
            .iter()
            .map(|r| self.weights.weight(r.incident_type.severity))
            .sum();

        let no_data = trip_count == 0;
        let safe_driving_percentage = if no_data {
            NEUTRAL_SAFE_DRIVING_PERCENTAGE
        } else {
            let trips = trip_count as f64;
            (100.0 * (trips - weighted_incidents) / trips).clamp(0.0, 100.0)
        };

        let average_score = match finite_mean(scores) {
            Some(mean) => mean,
            None => (safe_driving_percentage * self.score_proxy_factor).round(),
        };

        let mut incident_counts: BTreeMap<String, usize> = BTreeMap::new();
        for record in &valid {
            *incident_counts
                .entry(record.incident_type.kind.as_str().to_string())
                .or_insert(0) += 1;
        }
        let low_confidence_count = valid.iter().filter(|r| !r.matched).count();

        // Vec::sort_by is stable: equal timestamps keep ingestion order
        let mut alerts: Vec<Alert> = valid.iter().map(|r| to_alert(r)).collect();
        alerts.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        if let Some(limit) = self.alert_limit {
            alerts.truncate(limit);
        }

        info!(
            trips = trip_count,
            incidents = valid.len(),
            rejected = rejected_count,
            safe_driving_percentage,
            "live snapshot computed"
        );

        DashboardSnapshot {
            total_trips: trip_count,
            safe_driving_percentage,
            average_score,
            alerts,
            source: SnapshotSource::Live,
            no_data,
            total_incidents: valid.len(),
            incident_counts,
            low_confidence_count,
            rejected_count,
            fallback_reason: None,
            catalog_version: self.catalog.version(),
        }
    }

    /// Run one request through `Requesting -> Succeeded | Failed`
    pub fn aggregate_feed(&self, feed: DataFeed) -> AggregationOutcome {
        match feed {
            DataFeed::Available(data) => {
                let mut snapshot =
                    self.aggregate(data.trip_count, &data.incidents, data.scores.as_deref());
                snapshot.rejected_count += data.rejected;
                AggregationOutcome::Succeeded(snapshot)
            }
            DataFeed::Unavailable(reason) => {
                warn!(%reason, "upstream data unavailable, serving fallback snapshot");
                AggregationOutcome::Failed {
                    reason,
                    snapshot: FallbackPolicy::snapshot(reason),
                }
            }
        }
    }
}

fn to_alert(record: &IncidentRecord) -> Alert {
    let message = if record.message.trim().is_empty() {
        record.incident_type.title.clone()
    } else {
        record.message.clone()
    };

    Alert {
        message,
        severity: record.incident_type.severity,
        timestamp: record.timestamp,
    }
}

/// Mean of the finite values, or `None` if there are none.
///
/// Accumulated as a running mean of `v / n` terms so that large inputs never
/// overflow to infinity.
fn finite_mean(scores: Option<&[f64]>) -> Option<f64> {
    let mut mean = 0.0;
    let mut n = 0.0;
    for v in scores?.iter().copied().filter(|v| v.is_finite()) {
        n += 1.0;
        mean += v / n - mean / n;
    }
    (n > 0.0 && mean.is_finite()).then_some(mean)
}
