//! DriveGuard - Incident normalization and dashboard aggregation engine
//!
//! DriveGuard turns heterogeneous driver-safety incident reports (phone usage,
//! smoking, seatbelt violations, drowsiness) into a canonical taxonomy and folds
//! them into dashboard snapshots: raw event → taxonomy resolution → incident
//! record → aggregation → snapshot.
//!
//! ## Modules
//!
//! - **Taxonomy**: versioned incident catalog and the ordered-rule resolver
//! - **Aggregation**: live snapshots, plus the fallback policy for missing data

pub mod aggregator;
pub mod catalog;
pub mod config;
pub mod error;
pub mod fallback;
#[cfg(feature = "logging")]
pub mod logging;
pub mod pipeline;
pub mod resolver;
pub mod schema;
pub mod types;

// FFI bindings for C interop (always available for cdylib/staticlib builds)
pub mod ffi;

pub use aggregator::{AggregationEngine, AggregationOutcome, DataFeed, TripData};
pub use catalog::{IncidentCatalog, CATALOG_VERSION};
pub use config::EngineConfig;
pub use error::EngineError;
pub use fallback::{FallbackPolicy, UnavailableReason};
pub use pipeline::{dashboard_snapshot, resolve_incident, DashboardEngine, TelemetrySource};
pub use resolver::TaxonomyResolver;

// Schema exports
pub use schema::{IncidentIngestor, RawIncidentEvent, SCHEMA_VERSION};

pub use types::{
    DashboardSnapshot, IncidentKind, IncidentRecord, IncidentType, NormalizationResult,
    RawIncidentIdentifier, Severity, SnapshotSource,
};

/// DriveGuard version
pub const ENGINE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Producer name reported by the CLI and FFI
pub const PRODUCER_NAME: &str = "driveguard";
