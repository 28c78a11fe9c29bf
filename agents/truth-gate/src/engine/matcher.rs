//! F4: read-only matching of strict facts against the canon
//!
//! Subjects are matched approximately: a fact subject matches a claim subject
//! when its case-folded slug is contained in the claim's slug, so `alice`
//! matches `ENT-alice-12345678`. Overlapping names can therefore match the
//! wrong entity.

use crate::contracts::{CanonViolation, ClassifiedFact, ViolationCode};
use async_trait::async_trait;
use canon_core::{CanonApi, CanonValue, Claim, ClaimStatus, PredicateRegistry};
use std::collections::BTreeSet;
use std::sync::Arc;

/// Read surface of the canon used by the gate
///
/// Nothing here can write.
#[async_trait]
pub trait CanonReader: Send + Sync {
    async fn get_claims_for_subject(&self, subject: &str) -> Vec<Claim>;

    async fn get_active_claims_by_subject_and_predicate(&self, subject: &str, predicate: &str) -> Vec<Claim>;

    async fn get_all_claims(&self) -> Vec<Claim>;
}

#[async_trait]
impl CanonReader for CanonApi {
    async fn get_claims_for_subject(&self, subject: &str) -> Vec<Claim> {
        CanonApi::get_claims_for_subject(self, subject)
    }

    async fn get_active_claims_by_subject_and_predicate(&self, subject: &str, predicate: &str) -> Vec<Claim> {
        CanonApi::get_active_claims_by_subject_and_predicate(self, subject, predicate)
    }

    async fn get_all_claims(&self) -> Vec<Claim> {
        CanonApi::get_all_claims(self)
    }
}

/// Fixed in-memory set of claims
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClaimSnapshot {
    claims: Vec<Claim>,
}

impl ClaimSnapshot {
    pub fn new(claims: Vec<Claim>) -> Self {
        Self { claims }
    }

    pub fn claims(&self) -> &[Claim] {
        &self.claims
    }
}

impl FromIterator<Claim> for ClaimSnapshot {
    fn from_iter<I: IntoIterator<Item = Claim>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

#[async_trait]
impl CanonReader for ClaimSnapshot {
    async fn get_claims_for_subject(&self, subject: &str) -> Vec<Claim> {
        self.claims
            .iter()
            .filter(|c| c.subject.as_str() == subject)
            .cloned()
            .collect()
    }

    async fn get_active_claims_by_subject_and_predicate(&self, subject: &str, predicate: &str) -> Vec<Claim> {
        self.claims
            .iter()
            .filter(|c| c.subject.as_str() == subject && c.predicate.as_str() == predicate && c.is_active())
            .cloned()
            .collect()
    }

    async fn get_all_claims(&self) -> Vec<Claim> {
        self.claims.clone()
    }
}

fn slug(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if c.is_alphanumeric() {
            out.extend(c.to_lowercase());
        } else if !out.ends_with('-') {
            out.push('-');
        }
    }
    out.trim_matches('-').to_string()
}

/// Case and punctuation insensitive containment of the fact subject
pub fn subject_matches(fact_subject: &str, claim_subject: &str) -> bool {
    let needle = slug(fact_subject);
    !needle.is_empty() && slug(claim_subject).contains(&needle)
}

fn predicate_matches(fact_predicate: &str, claim_predicate: &str) -> bool {
    slug(fact_predicate) == slug(claim_predicate)
}

fn render(value: &CanonValue) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| value.type_name().to_string())
}

/// Build a violation record
pub fn create_violation(
    code: ViolationCode,
    fact: &ClassifiedFact,
    message: impl Into<String>,
    related_claim_id: Option<String>,
    expected_value: Option<CanonValue>,
    actual_value: Option<CanonValue>,
) -> CanonViolation {
    CanonViolation {
        code,
        fact: fact.clone(),
        message: message.into(),
        related_claim_id,
        expected_value,
        actual_value,
    }
}

/// C-02 when the predicate is not in the catalog
pub fn check_predicate_valid(fact: &ClassifiedFact, catalog: &PredicateRegistry) -> Option<CanonViolation> {
    if catalog.validate_predicate(&fact.predicate) {
        return None;
    }
    Some(create_violation(
        ViolationCode::ForbiddenPredicate,
        fact,
        format!("Predicate {} is not in the canon catalog", fact.predicate),
        None,
        None,
        None,
    ))
}

fn candidates<'a>(fact: &ClassifiedFact, claims: &'a [Claim]) -> impl Iterator<Item = &'a Claim> {
    let subject = fact.subject.clone();
    let predicate = fact.predicate.clone();
    claims.iter().filter(move |c| {
        subject_matches(&subject, c.subject.as_str()) && predicate_matches(&predicate, c.predicate.as_str())
    })
}

fn contradiction(fact: &ClassifiedFact, claim: &Claim) -> CanonViolation {
    create_violation(
        ViolationCode::ContradictoryValue,
        fact,
        format!(
            "{} {} is {} in the canon, text states {}",
            claim.subject,
            claim.predicate,
            render(&claim.value),
            render(&fact.object)
        ),
        Some(claim.id.to_string()),
        Some(claim.value.clone()),
        Some(fact.object.clone()),
    )
}

fn first_contradiction(fact: &ClassifiedFact, claims: &[Claim]) -> Option<CanonViolation> {
    candidates(fact, claims)
        .filter(|c| c.is_active())
        .find(|c| !c.value.semantic_equals(&fact.object))
        .map(|c| contradiction(fact, c))
}

/// C-03 for the first active claim whose value disagrees with the fact
pub async fn check_value_contradiction(fact: &ClassifiedFact, reader: &dyn CanonReader) -> Option<CanonViolation> {
    let claims = reader.get_all_claims().await;
    first_contradiction(fact, &claims)
}

/// Matcher bound to one reader and catalog
#[derive(Clone)]
pub struct CanonMatcher {
    reader: Arc<dyn CanonReader>,
    catalog: PredicateRegistry,
}

impl std::fmt::Debug for CanonMatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CanonMatcher").field("catalog", &self.catalog).finish_non_exhaustive()
    }
}

impl CanonMatcher {
    pub fn new(reader: Arc<dyn CanonReader>, catalog: PredicateRegistry) -> Self {
        Self { reader, catalog }
    }

    /// First violation for a strict fact; `None` for any other class
    pub async fn match_single_fact(&self, fact: &ClassifiedFact) -> Option<CanonViolation> {
        if !fact.is_strict() {
            return None;
        }
        let claims = self.reader.get_all_claims().await;
        self.single(fact, &claims)
    }

    /// Every violation a strict fact raises, including C-01, C-05 and C-06
    pub async fn match_fact_comprehensive(&self, fact: &ClassifiedFact) -> Vec<CanonViolation> {
        if !fact.is_strict() {
            return Vec::new();
        }
        let claims = self.reader.get_all_claims().await;
        self.comprehensive(fact, &claims)
    }

    /// Main path: at most one violation per strict fact, in fact order
    pub async fn match_against_canon(&self, facts: &[ClassifiedFact]) -> Vec<CanonViolation> {
        self.match_all(facts, false).await
    }

    pub async fn match_against_canon_comprehensive(&self, facts: &[ClassifiedFact]) -> Vec<CanonViolation> {
        self.match_all(facts, true).await
    }

    async fn match_all(&self, facts: &[ClassifiedFact], comprehensive: bool) -> Vec<CanonViolation> {
        let strict: Vec<&ClassifiedFact> = facts.iter().filter(|f| f.is_strict()).collect();
        if strict.is_empty() {
            return Vec::new();
        }
        let claims = self.reader.get_all_claims().await;

        let mut violations = Vec::new();
        for fact in strict {
            if comprehensive {
                violations.extend(self.comprehensive(fact, &claims));
            } else if let Some(v) = self.single(fact, &claims) {
                violations.push(v);
            }
        }
        tracing::debug!(
            facts = facts.len(),
            violations = violations.len(),
            comprehensive,
            "Matched facts against canon"
        );
        violations
    }

    fn single(&self, fact: &ClassifiedFact, claims: &[Claim]) -> Option<CanonViolation> {
        check_predicate_valid(fact, &self.catalog).or_else(|| first_contradiction(fact, claims))
    }

    fn comprehensive(&self, fact: &ClassifiedFact, claims: &[Claim]) -> Vec<CanonViolation> {
        if let Some(v) = check_predicate_valid(fact, &self.catalog) {
            return vec![v];
        }

        let mut violations = Vec::new();
        let known = claims.iter().any(|c| subject_matches(&fact.subject, c.subject.as_str()));
        if !known {
            violations.push(create_violation(
                ViolationCode::UnknownEntity,
                fact,
                "Subject does not match any canon entity",
                None,
                None,
                None,
            ));
            return violations;
        }

        let matching: Vec<&Claim> = candidates(fact, claims).collect();
        let active: Vec<&Claim> = matching.iter().copied().filter(|c| c.is_active()).collect();

        let entities: BTreeSet<&str> = active.iter().map(|c| c.subject.as_str()).collect();
        if entities.len() > 1 {
            violations.push(create_violation(
                ViolationCode::AmbiguityDetected,
                fact,
                format!("Subject matches {} canon entities", entities.len()),
                None,
                None,
                None,
            ));
        }

        for claim in active {
            if claim.value.semantic_equals(&fact.object) {
                continue;
            }
            let regressed = claim.supersedes.as_ref().and_then(|old_id| {
                matching
                    .iter()
                    .find(|c| &c.id == old_id && c.status == ClaimStatus::Superseded)
                    .filter(|old| old.value.semantic_equals(&fact.object))
            });
            match regressed {
                Some(old) => violations.push(create_violation(
                    ViolationCode::CanonicalRegression,
                    fact,
                    format!(
                        "{} {} restates superseded claim {}",
                        claim.subject, claim.predicate, old.id
                    ),
                    Some(claim.id.to_string()),
                    Some(claim.value.clone()),
                    Some(fact.object.clone()),
                )),
                None => violations.push(contradiction(fact, claim)),
            }
        }
        violations
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{classify_fact, create_fact};
    use canon_core::{CreateClaimParams, ManualClock};

    fn strict(subject: &str, predicate: &str, object: impl Into<CanonValue>) -> ClassifiedFact {
        classify_fact(create_fact(subject, predicate, object, "text", 0, None).unwrap())
    }

    fn canon(claims: &[(&str, &str, CanonValue)]) -> (tempfile::TempDir, Arc<CanonApi>) {
        let dir = tempfile::tempdir().unwrap();
        let api = CanonApi::new(canon_core::CanonConfig::new(dir.path()))
            .with_clock(Arc::new(ManualClock::new(1_000, 10)));
        api.init().unwrap();
        for (subject, predicate, value) in claims {
            api.create_claim(CreateClaimParams::new(*subject, *predicate, value.clone()))
                .unwrap();
        }
        (dir, Arc::new(api))
    }

    fn matcher(api: Arc<CanonApi>) -> CanonMatcher {
        let catalog = api.catalog().clone();
        CanonMatcher::new(api, catalog)
    }

    #[test]
    fn test_subject_matching_is_approximate() {
        assert!(subject_matches("alice", "ENT-alice-12345678"));
        assert!(subject_matches("Alice", "ENT-alice"));
        assert!(subject_matches("Alice Smith", "ENT-alice-smith-01"));
        assert!(!subject_matches("bob", "ENT-alice"));
        assert!(!subject_matches("  ", "ENT-alice"));
    }

    #[test]
    fn test_predicate_validity() {
        let catalog = PredicateRegistry::new();
        let forbidden = check_predicate_valid(&strict("Alice", "HAS_COLOR", "red"), &catalog).unwrap();
        assert_eq!(forbidden.code, ViolationCode::ForbiddenPredicate);
        assert!(check_predicate_valid(&strict("Alice", "HAS_NAME", "A"), &catalog).is_none());
    }

    #[tokio::test]
    async fn test_value_contradiction() {
        let (_dir, api) = canon(&[("ENT-bob-12345678", "HAS_NAME", "Robert".into())]);
        let violation = check_value_contradiction(&strict("bob", "HAS_NAME", "Bobby"), api.as_ref())
            .await
            .unwrap();
        assert_eq!(violation.code, ViolationCode::ContradictoryValue);
        assert_eq!(violation.expected_value, Some(CanonValue::from("Robert")));
        assert_eq!(violation.actual_value, Some(CanonValue::from("Bobby")));
        assert!(violation.related_claim_id.unwrap().starts_with("CLM-"));

        assert!(check_value_contradiction(&strict("bob", "HAS_NAME", "Robert"), api.as_ref())
            .await
            .is_none());
    }

    #[tokio::test]
    async fn test_non_strict_facts_are_skipped() {
        let (_dir, api) = canon(&[("ENT-alice", "HAS_NAME", "Alice".into())]);
        let m = matcher(api);
        let hedged = classify_fact(create_fact("alice", "HAS_NAME", "Zed", "maybe Zed", 0, None).unwrap());
        assert!(m.match_single_fact(&hedged).await.is_none());
        assert!(m.match_against_canon(&[hedged]).await.is_empty());
        assert!(m.match_against_canon(&[]).await.is_empty());
    }

    #[tokio::test]
    async fn test_match_against_canon_reports_in_order() {
        let (_dir, api) = canon(&[
            ("ENT-alice", "HAS_NAME", "Alice Smith".into()),
            ("ENT-alice", "HAS_AGE", 30.into()),
        ]);
        let m = matcher(api.clone());
        let facts = vec![
            strict("alice", "HAS_AGE", 31),
            strict("alice", "HAS_NAME", "Alice Smith"),
            strict("alice", "HAS_COLOR", "red"),
        ];
        let before = api.get_all_claims().len();
        let violations = m.match_against_canon(&facts).await;
        assert_eq!(
            violations.iter().map(|v| v.code).collect::<Vec<_>>(),
            vec![ViolationCode::ContradictoryValue, ViolationCode::ForbiddenPredicate]
        );
        assert_eq!(api.get_all_claims().len(), before);
    }

    #[tokio::test]
    async fn test_comprehensive_unknown_entity_and_ambiguity() {
        let (_dir, api) = canon(&[
            ("ENT-ann-1", "HAS_ROLE", "pilot".into()),
            ("ENT-ann-2", "HAS_ROLE", "pilot".into()),
        ]);
        let m = matcher(api);

        let unknown = m.match_fact_comprehensive(&strict("zed", "HAS_ROLE", "pilot")).await;
        assert_eq!(unknown[0].code, ViolationCode::UnknownEntity);

        let ambiguous = m.match_fact_comprehensive(&strict("ann", "HAS_ROLE", "pilot")).await;
        assert_eq!(ambiguous.len(), 1);
        assert_eq!(ambiguous[0].code, ViolationCode::AmbiguityDetected);
    }

    #[tokio::test]
    async fn test_comprehensive_regression() {
        let (_dir, api) = canon(&[]);
        let old = api
            .create_claim(CreateClaimParams::new("ENT-carol", "HAS_ROLE", "intern"))
            .unwrap();
        let new = api
            .create_claim(CreateClaimParams::new("ENT-carol", "HAS_ROLE", "lead").with_supersedes(&old.id))
            .unwrap();
        let m = matcher(api);

        let found = m.match_fact_comprehensive(&strict("carol", "HAS_ROLE", "intern")).await;
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].code, ViolationCode::CanonicalRegression);
        assert_eq!(found[0].related_claim_id.as_deref(), Some(new.id.as_str()));

        // the main path only sees a contradiction with the active claim
        let single = m.match_single_fact(&strict("carol", "HAS_ROLE", "intern")).await.unwrap();
        assert_eq!(single.code, ViolationCode::ContradictoryValue);
    }

    #[tokio::test]
    async fn test_snapshot_reader() {
        let (_dir, api) = canon(&[("ENT-a", "HAS_AGE", 1.into()), ("ENT-b", "HAS_AGE", 2.into())]);
        let snapshot: ClaimSnapshot = api.get_all_claims().into_iter().collect();
        assert_eq!(snapshot.get_claims_for_subject("ENT-a").await.len(), 1);
        assert_eq!(
            snapshot
                .get_active_claims_by_subject_and_predicate("ENT-b", "HAS_AGE")
                .await
                .len(),
            1
        );
        assert_eq!(snapshot.get_all_claims().await, api.get_all_claims());
    }

    #[test]
    fn test_empty_snapshot_matches_nothing() {
        let m = CanonMatcher::new(Arc::new(ClaimSnapshot::default()), PredicateRegistry::new());
        let found = tokio_test::block_on(m.match_against_canon(&[strict("alice", "HAS_NAME", "Alice")]));
        assert!(found.is_empty());
    }
}
