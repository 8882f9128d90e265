//! Error types for DriveGuard

use thiserror::Error;

/// Errors that can occur at the engine boundary.
///
/// None of these reach a dashboard caller: resolution and aggregation are total,
/// and the pipeline turns upstream failures into a fallback snapshot.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Failed to parse payload: {0}")]
    ParseError(String),

    #[error("Invalid JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(String),

    #[error("Catalog conflict: {0}")]
    CatalogConflict(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Upstream data unavailable: {0}")]
    Unavailable(String),
}
