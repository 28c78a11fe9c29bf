//! Predicate catalog
//!
//! A closed, versioned vocabulary of claim predicates. The active catalog
//! lives in a [`PredicateRegistry`] handle that is created explicitly and
//! shared between the Canon API and its readers.

use crate::canonical::hash_serializable;
use crate::error::{CanonError, CanonErrorCode, CanonResult};
use crate::types::PredicateId;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::{Arc, RwLock, RwLockReadGuard};

/// Supersession is structural and may never be asserted as a predicate
pub const SUPERSEDES_PREDICATE: &str = "SUPERSEDES";

/// Version of the built-in catalog
pub const BUILTIN_CATALOG_VERSION: &str = "1.0.0";

/// Type expected on either side of a predicate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TermType {
    Entity,
    String,
    Number,
    Boolean,
    Any,
}

/// One catalog entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PredicateDefinition {
    pub id: PredicateId,
    pub subject_type: TermType,
    pub object_type: TermType,
    pub symmetric: bool,
    pub transitive: bool,
    pub introduced_version: String,
}

impl PredicateDefinition {
    fn builtin(id: &str, object_type: TermType, symmetric: bool, transitive: bool) -> Option<Self> {
        Some(Self {
            id: PredicateId::new(id).ok()?,
            subject_type: TermType::Entity,
            object_type,
            symmetric,
            transitive,
            introduced_version: BUILTIN_CATALOG_VERSION.to_string(),
        })
    }
}

/// Versioned predicate table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PredicateCatalog {
    pub version: String,
    pub predicates: Vec<PredicateDefinition>,
}

impl Default for PredicateCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

impl PredicateCatalog {
    /// The catalog every registry starts with
    pub fn builtin() -> Self {
        use TermType as T;
        let entries = [
            ("HAS_NAME", T::String, false, false),
            ("HAS_AGE", T::Number, false, false),
            ("HAS_ATTRIBUTE", T::Any, false, false),
            ("HAS_ROLE", T::String, false, false),
            ("HAS_TRAIT", T::String, false, false),
            ("HAS_STATUS", T::String, false, false),
            ("IS_A", T::String, false, true),
            ("KNOWS", T::Entity, true, false),
            ("SIBLING_OF", T::Entity, true, false),
            ("PARENT_OF", T::Entity, false, false),
            ("CHILD_OF", T::Entity, false, false),
            ("MEMBER_OF", T::Entity, false, false),
            ("OWNS", T::Any, false, false),
            ("LOCATED_IN", T::Entity, false, true),
            ("BORN_IN", T::Entity, false, false),
            ("DIED_IN", T::Entity, false, false),
        ];
        Self {
            version: BUILTIN_CATALOG_VERSION.to_string(),
            predicates: entries
                .iter()
                .filter_map(|(id, object, sym, trans)| {
                    PredicateDefinition::builtin(id, *object, *sym, *trans)
                })
                .collect(),
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.predicates.iter().any(|p| p.id.as_str() == id)
    }

    pub fn get(&self, id: &str) -> Option<&PredicateDefinition> {
        self.predicates.iter().find(|p| p.id.as_str() == id)
    }

    /// Reject tables that could not serve as a catalog
    pub fn validate(&self) -> CanonResult<()> {
        if self.version.trim().is_empty() {
            return Err(CanonError::new(
                CanonErrorCode::InvalidPredicate,
                "catalog version is empty",
            ));
        }
        let mut seen = HashSet::new();
        for def in &self.predicates {
            if def.id.as_str() == SUPERSEDES_PREDICATE {
                return Err(CanonError::new(
                    CanonErrorCode::InvalidPredicate,
                    "SUPERSEDES is structural and cannot be a catalog predicate",
                ));
            }
            if !seen.insert(def.id.as_str()) {
                return Err(CanonError::new(
                    CanonErrorCode::DuplicateId,
                    format!("predicate {} defined twice", def.id),
                ));
            }
        }
        Ok(())
    }

    /// Deterministic hash of the whole table
    pub fn hash(&self) -> CanonResult<String> {
        Ok(hash_serializable(self)?)
    }
}

/// Shared handle to the active catalog
#[derive(Debug, Clone, Default)]
pub struct PredicateRegistry {
    active: Arc<RwLock<PredicateCatalog>>,
}

impl PredicateRegistry {
    /// Registry holding the built-in catalog
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding a custom catalog
    pub fn with_catalog(catalog: PredicateCatalog) -> CanonResult<Self> {
        catalog.validate()?;
        Ok(Self {
            active: Arc::new(RwLock::new(catalog)),
        })
    }

    fn read(&self) -> RwLockReadGuard<'_, PredicateCatalog> {
        self.active.read().unwrap_or_else(|e| e.into_inner())
    }

    /// Replace the active catalog for every holder of this handle
    pub fn load_catalog(&self, catalog: PredicateCatalog) -> CanonResult<()> {
        catalog.validate()?;
        tracing::info!(
            version = %catalog.version,
            predicates = catalog.predicates.len(),
            "Loaded predicate catalog"
        );
        *self.active.write().unwrap_or_else(|e| e.into_inner()) = catalog;
        Ok(())
    }

    /// Restore the built-in catalog
    pub fn reset(&self) {
        *self.active.write().unwrap_or_else(|e| e.into_inner()) = PredicateCatalog::builtin();
    }

    pub fn validate_predicate(&self, id: &str) -> bool {
        self.read().contains(id)
    }

    pub fn get_definition(&self, id: &str) -> Option<PredicateDefinition> {
        self.read().get(id).cloned()
    }

    pub fn list_predicates(&self) -> Vec<PredicateDefinition> {
        self.read().predicates.clone()
    }

    pub fn catalog_version(&self) -> String {
        self.read().version.clone()
    }

    pub fn catalog_hash(&self) -> CanonResult<String> {
        self.read().hash()
    }

    pub fn snapshot(&self) -> PredicateCatalog {
        self.read().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn custom_catalog(ids: &[&str]) -> PredicateCatalog {
        PredicateCatalog {
            version: "2.0.0".to_string(),
            predicates: ids
                .iter()
                .map(|id| PredicateDefinition {
                    id: PredicateId::new(*id).unwrap(),
                    subject_type: TermType::Entity,
                    object_type: TermType::Any,
                    symmetric: false,
                    transitive: false,
                    introduced_version: "2.0.0".to_string(),
                })
                .collect(),
        }
    }

    #[test]
    fn test_builtin_catalog() {
        let registry = PredicateRegistry::new();
        for id in ["HAS_NAME", "HAS_AGE", "IS_A", "KNOWS"] {
            assert!(registry.validate_predicate(id), "{} missing", id);
        }
        assert!(!registry.validate_predicate(SUPERSEDES_PREDICATE));
        assert!(!registry.validate_predicate("RANDOM"));
        assert_eq!(registry.catalog_version(), BUILTIN_CATALOG_VERSION);
        assert!(registry.get_definition("KNOWS").unwrap().symmetric);
    }

    #[test]
    fn test_catalog_hash_is_deterministic() {
        let a = PredicateRegistry::new();
        let b = PredicateRegistry::new();
        assert_eq!(a.catalog_hash().unwrap(), b.catalog_hash().unwrap());

        let c = PredicateRegistry::with_catalog(custom_catalog(&["LIKES"])).unwrap();
        assert_ne!(a.catalog_hash().unwrap(), c.catalog_hash().unwrap());
    }

    #[test]
    fn test_load_rejects_supersedes() {
        let registry = PredicateRegistry::new();
        let err = registry
            .load_catalog(custom_catalog(&["LIKES", SUPERSEDES_PREDICATE]))
            .unwrap_err();
        assert_eq!(err.code, CanonErrorCode::InvalidPredicate);
        assert!(registry.validate_predicate("HAS_NAME"));
        assert!(!registry.validate_predicate("LIKES"));
    }

    #[test]
    fn test_load_rejects_duplicates() {
        let err = PredicateRegistry::with_catalog(custom_catalog(&["LIKES", "LIKES"])).unwrap_err();
        assert_eq!(err.code, CanonErrorCode::DuplicateId);
    }

    #[test]
    fn test_load_and_reset_are_shared() {
        let registry = PredicateRegistry::new();
        let handle = registry.clone();

        registry.load_catalog(custom_catalog(&["LIKES"])).unwrap();
        assert!(handle.validate_predicate("LIKES"));
        assert!(!handle.validate_predicate("HAS_NAME"));
        assert_eq!(handle.catalog_version(), "2.0.0");

        handle.reset();
        assert!(registry.validate_predicate("HAS_NAME"));
        assert!(!registry.validate_predicate("LIKES"));
    }
}
