//! Incident taxonomy catalog
//!
//! The catalog is versioned and append-only: new codes and kinds may be added,
//! but an existing code is never reassigned to another kind (or the reverse),
//! so historical reports keep their meaning. A catalog is built once at
//! startup and shared as `Arc<IncidentCatalog>` between the resolver and the
//! aggregation engine.

use serde::Serialize;

use crate::error::EngineError;
use crate::types::{IncidentKind, IncidentType, Severity};

/// Version of the built-in catalog
pub const CATALOG_VERSION: u32 = 1;

/// Code returned for input that matches nothing (SEATBELT)
pub const DEFAULT_FALLBACK_CODE: u32 = 3;

/// Immutable, versioned incident taxonomy
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IncidentCatalog {
    version: u32,
    default_code: u32,
    entries: Vec<IncidentType>,
}

impl Default for IncidentCatalog {
    fn default() -> Self {
        Self::v1()
    }
}

impl IncidentCatalog {
    /// Build a catalog from explicit entries, checking the one-to-one code/kind
    /// mapping and that the default code exists.
    pub fn new(
        version: u32,
        default_code: u32,
        entries: Vec<IncidentType>,
    ) -> Result<Self, EngineError> {
        let mut catalog = Self {
            version,
            default_code,
            entries: Vec::with_capacity(entries.len()),
        };

        for entry in entries {
            if !catalog.check_append(&entry)? {
                catalog.entries.push(entry);
            }
        }

        if catalog.get(default_code).is_none() {
            return Err(EngineError::CatalogConflict(format!(
                "default code {} is not in the catalog",
                default_code
            )));
        }

        Ok(catalog)
    }

    /// The built-in v1 catalog
    pub fn v1() -> Self {
        Self {
            version: CATALOG_VERSION,
            default_code: DEFAULT_FALLBACK_CODE,
            entries: vec![
                entry(
                    1,
                    IncidentKind::PhoneUsage,
                    Severity::High,
                    "Phone Usage",
                    "Phone usage while driving",
                    "The driver was detected holding or operating a mobile phone while the vehicle was moving.",
                    "Pull over safely before using the phone, or use a hands-free system.",
                ),
                entry(
                    2,
                    IncidentKind::Cigarette,
                    Severity::Low,
                    "Smoking",
                    "Smoking while driving",
                    "The driver was detected smoking inside the vehicle cabin.",
                    "Avoid smoking while driving; take a scheduled break instead.",
                ),
                entry(
                    3,
                    IncidentKind::Seatbelt,
                    Severity::Medium,
                    "No Seatbelt",
                    "Seatbelt not fastened",
                    "The driver was detected driving without a fastened seatbelt.",
                    "Fasten the seatbelt before starting every trip.",
                ),
                entry(
                    4,
                    IncidentKind::Drowsiness,
                    Severity::High,
                    "Drowsiness",
                    "Driver drowsiness detected",
                    "Signs of fatigue such as prolonged eye closure or yawning were detected.",
                    "Stop at the next safe location and rest before continuing.",
                ),
            ],
        }
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn entries(&self) -> &[IncidentType] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Look up an entry by numeric code
    pub fn get(&self, code: u32) -> Option<&IncidentType> {
        self.entries.iter().find(|e| e.code == code)
    }

    /// Look up an entry by kind tag.
    ///
    /// Compared on the tag string, so `Other("SEATBELT")` and `Seatbelt` are
    /// the same kind.
    pub fn by_kind(&self, kind: &IncidentKind) -> Option<&IncidentType> {
        self.entries.iter().find(|e| e.kind.as_str() == kind.as_str())
    }

    /// The entry unresolvable input falls back to
    pub fn default_type(&self) -> Option<&IncidentType> {
        self.get(self.default_code)
    }

    pub fn default_code(&self) -> u32 {
        self.default_code
    }

    /// True if `incident_type` is exactly one of this catalog's entries
    pub fn contains(&self, incident_type: &IncidentType) -> bool {
        self.get(incident_type.code)
            .is_some_and(|e| e == incident_type)
    }

    /// Return a new catalog with `additions` appended.
    ///
    /// Re-publishing an identical entry is a no-op; the version only moves
    /// forward when at least one new entry lands.
    pub fn extend<I>(&self, additions: I) -> Result<Self, EngineError>
    where
        I: IntoIterator<Item = IncidentType>,
    {
        let mut next = self.clone();
        let mut added = 0usize;

        for addition in additions {
            if !next.check_append(&addition)? {
                next.entries.push(addition);
                added += 1;
            }
        }

        if added > 0 {
            next.version = self.version + 1;
        }

        Ok(next)
    }

    /// Returns `Ok(true)` if the entry is already published unchanged,
    /// `Ok(false)` if it may be appended.
    fn check_append(&self, candidate: &IncidentType) -> Result<bool, EngineError> {
        if let Some(existing) = self.get(candidate.code) {
            if existing == candidate {
                return Ok(true);
            }
            return Err(EngineError::CatalogConflict(format!(
                "code {} is already assigned to {}",
                candidate.code, existing.kind
            )));
        }

        if let Some(existing) = self.by_kind(&candidate.kind) {
            return Err(EngineError::CatalogConflict(format!(
                "kind {} is already assigned to code {}",
                candidate.kind, existing.code
            )));
        }

        Ok(false)
    }
}

fn entry(
    code: u32,
    kind: IncidentKind,
    severity: Severity,
    display_name: &str,
    title: &str,
    description: &str,
    recommended_action: &str,
) -> IncidentType {
    IncidentType {
        code,
        kind,
        severity,
        display_name: display_name.to_string(),
        title: title.to_string(),
        description: description.to_string(),
        recommended_action: recommended_action.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn harsh_braking(code: u32) -> IncidentType {
        entry(
            code,
            IncidentKind::Other("HARSH_BRAKING".to_string()),
            Severity::Medium,
            "Harsh Braking",
            "Harsh braking event",
            "Deceleration exceeded the configured threshold.",
            "Keep a safe following distance.",
        )
    }

    #[test]
    fn test_v1_catalog_is_one_to_one() {
        let catalog = IncidentCatalog::v1();
        assert_eq!(catalog.len(), 4);
        assert_eq!(catalog.version(), 1);

        for code in 1..=4 {
            let entry = catalog.get(code).unwrap();
            assert_eq!(catalog.by_kind(&entry.kind).unwrap().code, code);
        }
        assert_eq!(catalog.default_type().unwrap().kind, IncidentKind::Seatbelt);
    }

    #[test]
    fn test_extend_appends_and_bumps_version() {
        let catalog = IncidentCatalog::v1();
        let extended = catalog.extend(vec![harsh_braking(5)]).unwrap();

        assert_eq!(extended.len(), 5);
        assert_eq!(extended.version(), 2);
        assert_eq!(
            extended.get(5).unwrap().kind,
            IncidentKind::Other("HARSH_BRAKING".to_string())
        );
        // Original untouched
        assert_eq!(catalog.len(), 4);
    }

    #[test]
    fn test_extend_with_identical_entry_is_noop() {
        let catalog = IncidentCatalog::v1();
        let same = catalog.get(1).cloned().unwrap();
        let extended = catalog.extend(vec![same]).unwrap();
        assert_eq!(extended, catalog);
    }

    #[test]
    fn test_extend_rejects_code_reassignment() {
        let catalog = IncidentCatalog::v1();
        let result = catalog.extend(vec![harsh_braking(2)]);
        assert!(matches!(result, Err(EngineError::CatalogConflict(_))));
    }

    #[test]
    fn test_extend_rejects_kind_reassignment() {
        let catalog = IncidentCatalog::v1();
        let mut moved = catalog.get(4).cloned().unwrap();
        moved.code = 9;
        let result = catalog.extend(vec![moved]);
        assert!(matches!(result, Err(EngineError::CatalogConflict(_))));
    }

    #[test]
    fn test_extend_rejects_builtin_tag_spelled_as_other() {
        let catalog = IncidentCatalog::v1();
        let mut alias = harsh_braking(9);
        alias.kind = IncidentKind::Other("SEATBELT".to_string());

        let result = catalog.extend(vec![alias]);
        assert!(matches!(result, Err(EngineError::CatalogConflict(_))));

        let found = catalog
            .by_kind(&IncidentKind::Other("DROWSINESS".to_string()))
            .unwrap();
        assert_eq!(found.code, 4);
    }

    #[test]
    fn test_new_requires_default_code() {
        let result = IncidentCatalog::new(1, 7, IncidentCatalog::v1().entries().to_vec());
        assert!(result.is_err());
    }

    #[test]
    fn test_contains_checks_full_entry() {
        let catalog = IncidentCatalog::v1();
        let mut entry = catalog.get(1).cloned().unwrap();
        assert!(catalog.contains(&entry));
        entry.severity = Severity::Low;
        assert!(!catalog.contains(&entry));
    }
}
