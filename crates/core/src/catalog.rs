//! Obligation type catalog - immutable reference data
//!
//! Obligation types (`tva`, `urssaf`, …) are reference data: entities store
//! only the type code, and the catalog resolves codes to labels and
//! periodicity. The builtin catalog covers the standard French fiscal
//! calendar; a custom catalog can be loaded from a JSON file.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use strum_macros::{Display, EnumString};
use thiserror::Error;

/// Errors from catalog loading and lookups
#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("Failed to read catalog file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid catalog file: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Empty type code")]
    EmptyCode,

    #[error("Duplicate type code: {0}")]
    DuplicateCode(String),
}

/// Recurrence of an obligation type
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString, Display,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Periodicity {
    OneTime,
    Monthly,
    Quarterly,
    Annual,
}

/// A fiscal obligation type (reference data, immutable once registered)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObligationType {
    /// Unique lowercase code, e.g. `tva`
    pub code: String,
    /// Human-readable label
    pub label: String,
    /// Declaration/payment recurrence
    pub periodicity: Periodicity,
}

impl ObligationType {
    pub fn new(
        code: impl Into<String>,
        label: impl Into<String>,
        periodicity: Periodicity,
    ) -> Self {
        Self {
            code: code.into().trim().to_lowercase(),
            label: label.into(),
            periodicity,
        }
    }
}

/// Lookup collaborator for obligation types
///
/// Core entities reference types by code only; every code written to
/// storage must resolve against the catalog in use.
#[derive(Debug, Clone, Default)]
pub struct TypeCatalog {
    types: BTreeMap<String, ObligationType>,
}

impl TypeCatalog {
    /// Empty catalog
    pub fn new() -> Self {
        Self::default()
    }

    /// Catalog preloaded with standard French fiscal obligation types
    pub fn builtin() -> Self {
        let mut catalog = Self::new();
        let entries = [
            ObligationType::new("tva", "TVA", Periodicity::Monthly),
            ObligationType::new("urssaf", "Cotisations URSSAF", Periodicity::Monthly),
            ObligationType::new("is", "Impôt sur les sociétés", Periodicity::Quarterly),
            ObligationType::new(
                "cfe",
                "Cotisation foncière des entreprises",
                Periodicity::Annual,
            ),
            ObligationType::new(
                "cvae",
                "Cotisation sur la valeur ajoutée des entreprises",
                Periodicity::Annual,
            ),
            ObligationType::new("taxe_apprentissage", "Taxe d'apprentissage", Periodicity::Annual),
        ];
        for t in entries {
            // Builtin codes are unique by construction
            let _ = catalog.register(t);
        }
        catalog
    }

    /// Load a catalog from a JSON file (array of `ObligationType`)
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, CatalogError> {
        let content = std::fs::read_to_string(path)?;
        let entries: Vec<ObligationType> = serde_json::from_str(&content)?;

        let mut catalog = Self::new();
        for t in entries {
            catalog.register(t)?;
        }
        Ok(catalog)
    }

    /// Register a type; rejects empty and duplicate codes
    pub fn register(&mut self, obligation_type: ObligationType) -> Result<(), CatalogError> {
        if obligation_type.code.is_empty() {
            return Err(CatalogError::EmptyCode);
        }
        if self.types.contains_key(&obligation_type.code) {
            return Err(CatalogError::DuplicateCode(obligation_type.code));
        }
        self.types
            .insert(obligation_type.code.clone(), obligation_type);
        Ok(())
    }

    /// Resolve a type code
    pub fn get(&self, code: &str) -> Option<&ObligationType> {
        self.types.get(code)
    }

    /// True if the code is registered
    pub fn contains(&self, code: &str) -> bool {
        self.types.contains_key(code)
    }

    /// All codes with the given periodicity (for filtered listings)
    pub fn codes_with_periodicity(&self, periodicity: Periodicity) -> Vec<String> {
        self.types
            .values()
            .filter(|t| t.periodicity == periodicity)
            .map(|t| t.code.clone())
            .collect()
    }

    /// Iterate all registered types in code order
    pub fn iter(&self) -> impl Iterator<Item = &ObligationType> {
        self.types.values()
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_catalog() {
        let catalog = TypeCatalog::builtin();

        assert!(catalog.contains("tva"));
        assert!(catalog.contains("urssaf"));
        assert!(!catalog.contains("unknown"));

        let tva = catalog.get("tva").unwrap();
        assert_eq!(tva.label, "TVA");
        assert_eq!(tva.periodicity, Periodicity::Monthly);
    }

    #[test]
    fn test_codes_normalized_lowercase() {
        let t = ObligationType::new("  TVA ", "TVA", Periodicity::Monthly);
        assert_eq!(t.code, "tva");
    }

    #[test]
    fn test_register_duplicate_rejected() {
        let mut catalog = TypeCatalog::new();
        catalog
            .register(ObligationType::new("tva", "TVA", Periodicity::Monthly))
            .unwrap();

        let result = catalog.register(ObligationType::new("tva", "TVA bis", Periodicity::Annual));
        assert!(matches!(result, Err(CatalogError::DuplicateCode(_))));
    }

    #[test]
    fn test_register_empty_code_rejected() {
        let mut catalog = TypeCatalog::new();
        let result = catalog.register(ObligationType::new("  ", "Blank", Periodicity::OneTime));
        assert!(matches!(result, Err(CatalogError::EmptyCode)));
    }

    #[test]
    fn test_codes_with_periodicity() {
        let catalog = TypeCatalog::builtin();
        let monthly = catalog.codes_with_periodicity(Periodicity::Monthly);

        assert!(monthly.contains(&"tva".to_string()));
        assert!(monthly.contains(&"urssaf".to_string()));
        assert!(!monthly.contains(&"cfe".to_string()));
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("types.json");
        std::fs::write(
            &path,
            r#"[
                {"code": "tva", "label": "TVA", "periodicity": "monthly"},
                {"code": "dsn", "label": "Déclaration sociale nominative", "periodicity": "monthly"}
            ]"#,
        )
        .unwrap();

        let catalog = TypeCatalog::from_file(&path).unwrap();
        assert_eq!(catalog.len(), 2);
        assert!(catalog.contains("dsn"));
    }

    #[test]
    fn test_from_file_duplicate_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("types.json");
        std::fs::write(
            &path,
            r#"[
                {"code": "tva", "label": "TVA", "periodicity": "monthly"},
                {"code": "tva", "label": "TVA bis", "periodicity": "annual"}
            ]"#,
        )
        .unwrap();

        assert!(matches!(
            TypeCatalog::from_file(&path),
            Err(CatalogError::DuplicateCode(_))
        ));
    }

    #[test]
    fn test_periodicity_codes() {
        assert_eq!(Periodicity::OneTime.to_string(), "one_time");
        assert_eq!(
            "quarterly".parse::<Periodicity>().unwrap(),
            Periodicity::Quarterly
        );
    }
}
