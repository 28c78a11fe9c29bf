//! Canon guard
//!
//! Structural validation and conflict detection run before any write.
//! The guard only reads from a [`ClaimStore`]; it never mutates state.

use crate::error::{CanonError, CanonErrorCode};
use crate::predicates::{PredicateRegistry, SUPERSEDES_PREDICATE};
use crate::types::{Claim, ClaimId, ClaimStatus, CreateClaimParams, EntityId, PredicateId};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Read access the guard needs from whatever holds the claims
pub trait ClaimStore {
    fn get_by_id(&self, id: &ClaimId) -> Option<Claim>;

    /// Every claim with this subject and predicate, in append order
    fn get_by_subject_and_predicate(&self, subject: &str, predicate: &str) -> Vec<Claim>;

    /// Distinct claim subjects
    fn all_entity_ids(&self) -> Vec<EntityId>;
}

impl ClaimStore for [Claim] {
    fn get_by_id(&self, id: &ClaimId) -> Option<Claim> {
        self.iter().find(|c| &c.id == id).cloned()
    }

    fn get_by_subject_and_predicate(&self, subject: &str, predicate: &str) -> Vec<Claim> {
        self.iter()
            .filter(|c| c.subject.as_str() == subject && c.predicate.as_str() == predicate)
            .cloned()
            .collect()
    }

    fn all_entity_ids(&self) -> Vec<EntityId> {
        let mut seen = HashSet::new();
        self.iter()
            .filter(|c| seen.insert(c.subject.clone()))
            .map(|c| c.subject.clone())
            .collect()
    }
}

/// Kind of conflict found
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConflictType {
    Direct,
    EntityMissing,
    SupersessionLoop,
}

impl ConflictType {
    pub fn error_code(&self) -> CanonErrorCode {
        match self {
            ConflictType::Direct => CanonErrorCode::ContradictionDirect,
            ConflictType::EntityMissing => CanonErrorCode::EntityNotFound,
            ConflictType::SupersessionLoop => CanonErrorCode::SupersessionLoop,
        }
    }
}

/// Result of a conflict check
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConflictResult {
    pub has_conflict: bool,

    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub conflict_type: Option<ConflictType>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conflicting_claim_ids: Vec<ClaimId>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ConflictResult {
    pub fn none() -> Self {
        Self {
            has_conflict: false,
            conflict_type: None,
            conflicting_claim_ids: Vec::new(),
            message: None,
        }
    }

    pub fn conflict(
        conflict_type: ConflictType,
        conflicting_claim_ids: Vec<ClaimId>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            has_conflict: true,
            conflict_type: Some(conflict_type),
            conflicting_claim_ids,
            message: Some(message.into()),
        }
    }

    /// Error to return when this conflict blocks a write
    pub fn to_error(&self) -> Option<CanonError> {
        let conflict_type = self.conflict_type.filter(|_| self.has_conflict)?;
        Some(CanonError::new(
            conflict_type.error_code(),
            self.message.clone().unwrap_or_else(|| "Conflict detected".to_string()),
        ))
    }
}

/// Outcome of parameter validation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub valid: bool,
    pub errors: Vec<CanonError>,
}

impl ValidationReport {
    fn from_errors(errors: Vec<CanonError>) -> Self {
        Self {
            valid: errors.is_empty(),
            errors,
        }
    }

    pub fn first_error(&self) -> Option<&CanonError> {
        self.errors.first()
    }
}

/// Gatekeeper for claim writes
#[derive(Debug, Clone, Default)]
pub struct CanonGuard {
    catalog: PredicateRegistry,
}

impl CanonGuard {
    pub fn new(catalog: PredicateRegistry) -> Self {
        Self { catalog }
    }

    pub fn catalog(&self) -> &PredicateRegistry {
        &self.catalog
    }

    /// Structural checks on caller input, collecting every failure
    pub fn validate_claim_params(&self, params: &CreateClaimParams) -> ValidationReport {
        let mut errors = Vec::new();

        if let Err(e) = EntityId::new(params.subject.as_str()) {
            errors.push(e);
        }

        if params.predicate == SUPERSEDES_PREDICATE {
            errors.push(CanonError::new(
                CanonErrorCode::InvalidPredicate,
                "SUPERSEDES is structural; use the supersedes field",
            ));
        } else if let Err(e) = PredicateId::new(params.predicate.as_str()) {
            errors.push(e);
        } else if !self.catalog.validate_predicate(&params.predicate) {
            errors.push(CanonError::new(
                CanonErrorCode::InvalidPredicate,
                format!("predicate {} is not in catalog {}", params.predicate, self.catalog.catalog_version()),
            ));
        }

        if let Some(path) = params.value.find_nan() {
            errors.push(CanonError::new(
                CanonErrorCode::InvalidValueNan,
                format!("NaN at {}", path),
            ));
        } else if let Some(path) = params.value.find_non_finite() {
            errors.push(CanonError::new(
                CanonErrorCode::InvalidValue,
                format!("non-finite number at {}", path),
            ));
        }

        if let Err(e) = params.lineage.validate() {
            errors.push(e);
        }
        errors.extend(params.evidence.iter().filter_map(|ev| ev.validate().err()));

        ValidationReport::from_errors(errors)
    }

    /// Flag existing claims for the same subject and predicate whose value differs
    ///
    /// A candidate that supersedes one of those claims skips the check
    /// entirely. Claims already superseded are not considered.
    pub fn check_direct_conflict<S: ClaimStore + ?Sized>(
        &self,
        candidate: &CreateClaimParams,
        store: &S,
    ) -> ConflictResult {
        let existing = store.get_by_subject_and_predicate(&candidate.subject, &candidate.predicate);

        if let Some(target) = &candidate.supersedes {
            if existing.iter().any(|c| &c.id == target) {
                return ConflictResult::none();
            }
        }

        let conflicting: Vec<ClaimId> = existing
            .iter()
            .filter(|c| c.status != ClaimStatus::Superseded)
            .filter(|c| !c.value.semantic_equals(&candidate.value))
            .map(|c| c.id.clone())
            .collect();

        if conflicting.is_empty() {
            return ConflictResult::none();
        }

        ConflictResult::conflict(
            ConflictType::Direct,
            conflicting,
            format!(
                "{} {} already holds a different value",
                candidate.subject, candidate.predicate
            ),
        )
    }

    /// Flag a subject that no stored claim uses
    pub fn check_entity_exists<S: ClaimStore + ?Sized>(&self, subject: &str, store: &S) -> ConflictResult {
        if store.all_entity_ids().iter().any(|e| e.as_str() == subject) {
            ConflictResult::none()
        } else {
            ConflictResult::conflict(
                ConflictType::EntityMissing,
                Vec::new(),
                format!("entity {} has no claims", subject),
            )
        }
    }

    /// Walk the supersedes chain from `supersedes_id` looking for a cycle
    pub fn check_supersession_loop<S: ClaimStore + ?Sized>(
        &self,
        new_id: Option<&ClaimId>,
        supersedes_id: &ClaimId,
        store: &S,
    ) -> ConflictResult {
        let mut visited: HashSet<ClaimId> = new_id.into_iter().cloned().collect();
        let mut path = Vec::new();
        let mut current = supersedes_id.clone();

        loop {
            if !visited.insert(current.clone()) {
                path.push(current.clone());
                return ConflictResult::conflict(
                    ConflictType::SupersessionLoop,
                    path,
                    format!("supersession chain from {} revisits {}", supersedes_id, current),
                );
            }
            path.push(current.clone());

            match store.get_by_id(&current).and_then(|c| c.supersedes) {
                Some(next) => current = next,
                None => return ConflictResult::none(),
            }
        }
    }

    /// Direct conflict, then entity existence, then supersession loop
    pub fn check_all_conflicts<S: ClaimStore + ?Sized>(
        &self,
        candidate: &CreateClaimParams,
        new_id: Option<&ClaimId>,
        store: &S,
    ) -> ConflictResult {
        let direct = self.check_direct_conflict(candidate, store);
        if direct.has_conflict {
            return direct;
        }

        let entity = self.check_entity_exists(&candidate.subject, store);
        if entity.has_conflict {
            return entity;
        }

        match &candidate.supersedes {
            Some(target) => self.check_supersession_loop(new_id, target, store),
            None => ConflictResult::none(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lineage::genesis_hash;
    use crate::types::Lineage;
    use crate::value::CanonValue;
    use serde_json::json;

    fn claim(id: &str, subject: &str, predicate: &str, value: CanonValue, supersedes: Option<&str>) -> Claim {
        Claim {
            id: ClaimId::new(id).unwrap(),
            hash: genesis_hash(),
            prev_hash: genesis_hash(),
            subject: EntityId::new(subject).unwrap(),
            predicate: PredicateId::new(predicate).unwrap(),
            value,
            mono_ns: 0,
            version: 1,
            lineage: Lineage::default(),
            evidence: vec![],
            supersedes: supersedes.map(|s| ClaimId::new(s).unwrap()),
            status: ClaimStatus::Active,
        }
    }

    #[test]
    fn test_validate_accepts_well_formed() {
        let guard = CanonGuard::default();
        let report = guard.validate_claim_params(&CreateClaimParams::new("ENT-alice", "HAS_NAME", "Alice"));
        assert!(report.valid, "{:?}", report.errors);
    }

    #[test]
    fn test_validate_collects_errors() {
        let guard = CanonGuard::default();
        let params = CreateClaimParams::new("", "NOT_IN_CATALOG", CanonValue::Number(f64::NAN));
        let report = guard.validate_claim_params(&params);
        assert!(!report.valid);
        let codes: Vec<_> = report.errors.iter().map(|e| e.code).collect();
        assert_eq!(
            codes,
            vec![
                CanonErrorCode::InvalidSubject,
                CanonErrorCode::InvalidPredicate,
                CanonErrorCode::InvalidValueNan
            ]
        );
    }

    #[test]
    fn test_validate_rejects_supersedes_predicate() {
        let guard = CanonGuard::default();
        let report = guard.validate_claim_params(&CreateClaimParams::new("ENT-a", "SUPERSEDES", "CLM-1"));
        assert_eq!(report.first_error().unwrap().code, CanonErrorCode::InvalidPredicate);
    }

    #[test]
    fn test_validate_nested_nan_and_infinity() {
        let guard = CanonGuard::default();
        let value = CanonValue::object([(
            "stats",
            CanonValue::Array(vec![CanonValue::Number(1.0), CanonValue::Number(f64::NAN)]),
        )]);
        let report = guard.validate_claim_params(&CreateClaimParams::new("ENT-a", "HAS_ATTRIBUTE", value));
        assert_eq!(report.first_error().unwrap().code, CanonErrorCode::InvalidValueNan);

        let report = guard.validate_claim_params(&CreateClaimParams::new(
            "ENT-a",
            "HAS_AGE",
            CanonValue::Number(f64::INFINITY),
        ));
        assert_eq!(report.first_error().unwrap().code, CanonErrorCode::InvalidValue);
    }

    #[test]
    fn test_key_order_is_not_a_conflict() {
        let guard = CanonGuard::default();
        let store = vec![claim("CLM-1", "ENT-a", "HAS_ATTRIBUTE", CanonValue::from(json!({"b": 2, "a": 1})), None)];
        let candidate = CreateClaimParams::new("ENT-a", "HAS_ATTRIBUTE", CanonValue::from(json!({"a": 1, "b": 2})));
        assert!(!guard.check_direct_conflict(&candidate, store.as_slice()).has_conflict);
    }

    #[test]
    fn test_different_value_is_direct_conflict() {
        let guard = CanonGuard::default();
        let store = vec![claim("CLM-1", "ENT-a", "HAS_ATTRIBUTE", CanonValue::from(json!({"a": 2})), None)];
        let candidate = CreateClaimParams::new("ENT-a", "HAS_ATTRIBUTE", CanonValue::from(json!({"a": 1})));
        let result = guard.check_direct_conflict(&candidate, store.as_slice());
        assert!(result.has_conflict);
        assert_eq!(result.conflict_type, Some(ConflictType::Direct));
        assert_eq!(result.conflicting_claim_ids, vec![ClaimId::new("CLM-1").unwrap()]);
        assert_eq!(result.to_error().unwrap().code, CanonErrorCode::ContradictionDirect);
    }

    #[test]
    fn test_supersedes_skips_conflict() {
        let guard = CanonGuard::default();
        let store = vec![claim("CLM-1", "ENT-a", "HAS_AGE", 30.into(), None)];
        let candidate = CreateClaimParams::new("ENT-a", "HAS_AGE", 31)
            .with_supersedes(&ClaimId::new("CLM-1").unwrap());
        assert!(!guard.check_direct_conflict(&candidate, store.as_slice()).has_conflict);
    }

    #[test]
    fn test_superseded_claims_do_not_conflict() {
        let guard = CanonGuard::default();
        let mut old = claim("CLM-1", "ENT-a", "HAS_AGE", 30.into(), None);
        old.status = ClaimStatus::Superseded;
        let store = vec![old, claim("CLM-2", "ENT-a", "HAS_AGE", 31.into(), Some("CLM-1"))];
        let candidate = CreateClaimParams::new("ENT-a", "HAS_AGE", 31);
        assert!(!guard.check_direct_conflict(&candidate, store.as_slice()).has_conflict);
    }

    #[test]
    fn test_entity_missing() {
        let guard = CanonGuard::default();
        let empty: Vec<Claim> = Vec::new();
        let result = guard.check_entity_exists("ENT-nobody", empty.as_slice());
        assert_eq!(result.conflict_type, Some(ConflictType::EntityMissing));

        let store = vec![claim("CLM-1", "ENT-a", "HAS_AGE", 30.into(), None)];
        assert!(!guard.check_entity_exists("ENT-a", store.as_slice()).has_conflict);
    }

    #[test]
    fn test_supersession_loop_detected() {
        let guard = CanonGuard::default();
        let store = vec![
            claim("A", "ENT-a", "HAS_AGE", 1.into(), Some("B")),
            claim("B", "ENT-a", "HAS_AGE", 2.into(), Some("A")),
        ];
        let result = guard.check_supersession_loop(
            Some(&ClaimId::new("C").unwrap()),
            &ClaimId::new("A").unwrap(),
            store.as_slice(),
        );
        assert_eq!(result.conflict_type, Some(ConflictType::SupersessionLoop));
    }

    #[test]
    fn test_supersession_chain_without_loop() {
        let guard = CanonGuard::default();
        let store = vec![
            claim("A", "ENT-a", "HAS_AGE", 1.into(), Some("B")),
            claim("B", "ENT-a", "HAS_AGE", 2.into(), None),
        ];
        let result = guard.check_supersession_loop(
            Some(&ClaimId::new("C").unwrap()),
            &ClaimId::new("A").unwrap(),
            store.as_slice(),
        );
        assert!(!result.has_conflict);
    }

    #[test]
    fn test_loop_through_new_id() {
        let guard = CanonGuard::default();
        let store = vec![claim("A", "ENT-a", "HAS_AGE", 1.into(), Some("C"))];
        let result = guard.check_supersession_loop(
            Some(&ClaimId::new("C").unwrap()),
            &ClaimId::new("A").unwrap(),
            store.as_slice(),
        );
        assert!(result.has_conflict);
    }

    #[test]
    fn test_check_all_short_circuits() {
        let guard = CanonGuard::default();
        let store = vec![claim("CLM-1", "ENT-a", "HAS_AGE", 30.into(), None)];

        let differing = CreateClaimParams::new("ENT-a", "HAS_AGE", 31);
        let result = guard.check_all_conflicts(&differing, None, store.as_slice());
        assert_eq!(result.conflict_type, Some(ConflictType::Direct));

        let unknown = CreateClaimParams::new("ENT-b", "HAS_AGE", 31);
        let result = guard.check_all_conflicts(&unknown, None, store.as_slice());
        assert_eq!(result.conflict_type, Some(ConflictType::EntityMissing));

        let same = CreateClaimParams::new("ENT-a", "HAS_AGE", 30);
        assert!(!guard.check_all_conflicts(&same, None, store.as_slice()).has_conflict);
    }
}
