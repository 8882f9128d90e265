//! Taxonomy resolution
//!
//! Maps any raw incident identifier onto a catalog entry. Resolution order:
//! - integer codes (or integer-valued strings) present in the catalog
//! - the ordered text rule table, first match wins
//! - the catalog default, flagged `matched = false`
//!
//! Resolution never fails for malformed input.

use std::sync::Arc;

use serde::Serialize;
use tracing::debug;

use crate::catalog::IncidentCatalog;
use crate::types::{IncidentKind, IncidentType, NormalizationResult, RawIncidentIdentifier};

/// How a rule term is compared against normalized text
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "mode", content = "term", rename_all = "snake_case")]
pub enum MatchPredicate {
    /// Term appears anywhere in the text
    Contains(String),
    /// Text equals the term
    Exact(String),
}

impl MatchPredicate {
    pub fn contains(term: &str) -> Self {
        MatchPredicate::Contains(term.trim().to_lowercase())
    }

    pub fn exact(term: &str) -> Self {
        MatchPredicate::Exact(term.trim().to_lowercase())
    }

    /// `text` must already be trimmed and lowercased
    pub fn matches(&self, text: &str) -> bool {
        match self {
            MatchPredicate::Contains(term) => !term.is_empty() && text.contains(term.as_str()),
            MatchPredicate::Exact(term) => text == term,
        }
    }
}

/// One `(predicate, kind)` row of the rule table
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MatchRule {
    pub predicate: MatchPredicate,
    pub kind: IncidentKind,
}

impl MatchRule {
    pub fn new(predicate: MatchPredicate, kind: IncidentKind) -> Self {
        Self { predicate, kind }
    }
}

/// Built-in rule table. Order is priority: phone, cigarette, seatbelt, drowsiness.
pub fn default_rules() -> Vec<MatchRule> {
    use IncidentKind::*;

    vec![
        MatchRule::new(MatchPredicate::contains("phone"), PhoneUsage),
        MatchRule::new(MatchPredicate::contains("cigarette"), Cigarette),
        MatchRule::new(MatchPredicate::contains("smoking"), Cigarette),
        MatchRule::new(MatchPredicate::contains("smoke"), Cigarette),
        MatchRule::new(MatchPredicate::exact("no seatbelt"), Seatbelt),
        MatchRule::new(MatchPredicate::contains("seatbelt"), Seatbelt),
        MatchRule::new(MatchPredicate::contains("belt"), Seatbelt),
        MatchRule::new(MatchPredicate::contains("sleepy"), Drowsiness),
        MatchRule::new(MatchPredicate::contains("sleep"), Drowsiness),
        MatchRule::new(MatchPredicate::contains("drowsy"), Drowsiness),
        MatchRule::new(MatchPredicate::contains("drowsiness"), Drowsiness),
    ]
}

/// Resolver over a shared catalog and an explicit rule table
#[derive(Debug, Clone)]
pub struct TaxonomyResolver {
    catalog: Arc<IncidentCatalog>,
    rules: Vec<MatchRule>,
}

impl TaxonomyResolver {
    /// Resolver with the built-in rule table
    pub fn new(catalog: Arc<IncidentCatalog>) -> Self {
        Self::with_rules(catalog, default_rules())
    }

    pub fn with_rules(catalog: Arc<IncidentCatalog>, rules: Vec<MatchRule>) -> Self {
        Self { catalog, rules }
    }

    /// Append substring rules for `kind` after all existing rules
    pub fn push_keywords<S: AsRef<str>>(&mut self, kind: &IncidentKind, keywords: &[S]) {
        for keyword in keywords {
            let predicate = MatchPredicate::contains(keyword.as_ref());
            if matches!(&predicate, MatchPredicate::Contains(t) if t.is_empty()) {
                continue;
            }
            self.rules.push(MatchRule::new(predicate, kind.clone()));
        }
    }

    pub fn rules(&self) -> &[MatchRule] {
        &self.rules
    }

    pub fn catalog(&self) -> &Arc<IncidentCatalog> {
        &self.catalog
    }

    /// Resolve a raw identifier to a catalog entry
    pub fn resolve(&self, raw: &RawIncidentIdentifier) -> NormalizationResult {
        let resolved = match raw {
            RawIncidentIdentifier::Code(code) => self.by_code(*code),
            RawIncidentIdentifier::Text(text) => self.resolve_text(text),
            RawIncidentIdentifier::Missing | RawIncidentIdentifier::Other(_) => None,
        };

        match resolved {
            Some(incident_type) => NormalizationResult {
                incident_type: Some(incident_type.clone()),
                matched: true,
                original_input: raw.clone(),
            },
            None => {
                debug!(input = ?raw, "no taxonomy match, using default type");
                NormalizationResult {
                    incident_type: self.catalog.default_type().cloned(),
                    matched: false,
                    original_input: raw.clone(),
                }
            }
        }
    }

    /// Resolve a JSON value of any shape
    pub fn resolve_value(&self, value: &serde_json::Value) -> NormalizationResult {
        self.resolve(&RawIncidentIdentifier::from(value.clone()))
    }

    fn by_code(&self, code: i64) -> Option<&IncidentType> {
        u32::try_from(code).ok().and_then(|c| self.catalog.get(c))
    }

    fn resolve_text(&self, text: &str) -> Option<&IncidentType> {
        let normalized = text.trim().to_lowercase();
        if normalized.is_empty() {
            return None;
        }

        if let Ok(code) = normalized.parse::<i64>() {
            if let Some(found) = self.by_code(code) {
                return Some(found);
            }
        }

        self.rules
            .iter()
            .filter(|rule| rule.predicate.matches(&normalized))
            .find_map(|rule| self.catalog.by_kind(&rule.kind))
    }
}
