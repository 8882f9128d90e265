//! Engine configuration
//!
//! Configuration is plain JSON. Every field has a default, so an empty object
//! (or no file at all) yields the stock v1 behavior.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::catalog::IncidentCatalog;
use crate::error::EngineError;
use crate::types::{IncidentType, Severity};

/// Environment variable naming a config file
pub const CONFIG_ENV_VAR: &str = "DRIVEGUARD_CONFIG";

/// Trip-equivalents consumed by one incident of each severity
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SeverityWeights {
    pub high: f64,
    pub medium: f64,
    pub low: f64,
}

impl Default for SeverityWeights {
    fn default() -> Self {
        Self {
            high: 1.0,
            medium: 0.6,
            low: 0.3,
        }
    }
}

impl SeverityWeights {
    pub fn weight(&self, severity: Severity) -> f64 {
        match severity {
            Severity::High => self.high,
            Severity::Medium => self.medium,
            Severity::Low => self.low,
        }
    }
}

/// A catalog entry to append at startup, plus the text it should match
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogExtension {
    #[serde(flatten)]
    pub incident_type: IncidentType,
    #[serde(default)]
    pub keywords: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub severity_weights: SeverityWeights,
    /// Multiplier applied to the safe-driving percentage when no scores are supplied
    pub score_proxy_factor: f64,
    /// Maximum number of alerts in a snapshot (unbounded if absent)
    pub alert_limit: Option<usize>,
    pub catalog_extensions: Vec<CatalogExtension>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            severity_weights: SeverityWeights::default(),
            score_proxy_factor: 0.95,
            alert_limit: None,
            catalog_extensions: Vec::new(),
        }
    }
}

impl EngineConfig {
    /// Parse and validate a JSON config
    pub fn from_json(json: &str) -> Result<Self, EngineError> {
        let config: EngineConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a JSON config file
    pub fn from_path(path: &Path) -> Result<Self, EngineError> {
        let content = fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    /// Load from the file named by `DRIVEGUARD_CONFIG`, if set
    pub fn from_env() -> Result<Option<Self>, EngineError> {
        match std::env::var_os(CONFIG_ENV_VAR) {
            Some(path) if !path.is_empty() => Self::from_path(Path::new(&path)).map(Some),
            _ => Ok(None),
        }
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        let weights = [
            ("high", self.severity_weights.high),
            ("medium", self.severity_weights.medium),
            ("low", self.severity_weights.low),
        ];
        for (name, weight) in weights {
            if !weight.is_finite() || weight < 0.0 {
                return Err(EngineError::InvalidConfig(format!(
                    "severity weight '{}' must be a non-negative number, got {}",
                    name, weight
                )));
            }
        }

        if !self.score_proxy_factor.is_finite()
            || self.score_proxy_factor <= 0.0
            || self.score_proxy_factor > 1.0
        {
            return Err(EngineError::InvalidConfig(format!(
                "score_proxy_factor must be in (0, 1], got {}",
                self.score_proxy_factor
            )));
        }

        Ok(())
    }

    /// The v1 catalog with configured extensions appended
    pub fn build_catalog(&self) -> Result<IncidentCatalog, EngineError> {
        IncidentCatalog::v1().extend(
            self.catalog_extensions
                .iter()
                .map(|ext| ext.incident_type.clone()),
        )
    }
}
