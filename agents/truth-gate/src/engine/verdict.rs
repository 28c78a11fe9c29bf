//! F5: verdict computation

use crate::contracts::{CanonViolation, ClassifiedFact, Verdict, VerdictResult};

/// PASS exactly when there are no violations
pub fn compute_verdict(violations: Vec<CanonViolation>, facts: &[ClassifiedFact]) -> VerdictResult {
    VerdictResult::new(violations, facts)
}

pub fn validate_verdict(result: &VerdictResult) -> bool {
    result.is_consistent()
}

pub fn is_pass(result: &VerdictResult) -> bool {
    result.verdict() == Verdict::Pass
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{classify_fact, create_fact, create_violation};
    use crate::contracts::ViolationCode;
    use crate::error::GateError;

    fn facts() -> Vec<ClassifiedFact> {
        vec![
            classify_fact(create_fact("A", "HAS_NAME", "x", "a", 0, None).unwrap()),
            classify_fact(create_fact("B", "IMPLIES", "y", "b", 2, None).unwrap()),
        ]
    }

    #[test]
    fn test_verdict_follows_violations() {
        let facts = facts();
        let pass = compute_verdict(Vec::new(), &facts);
        assert!(is_pass(&pass));
        assert_eq!(pass.facts_processed(), 2);
        assert_eq!(pass.strict_facts_checked(), 1);

        let v = create_violation(ViolationCode::ContradictoryValue, &facts[0], "m", None, None, None);
        let fail = compute_verdict(vec![v], &facts);
        assert_eq!(fail.verdict(), Verdict::Fail);
        assert!(validate_verdict(&fail));
    }

    #[test]
    fn test_pass_with_violations_is_rejected() {
        let facts = facts();
        let v = create_violation(ViolationCode::ForbiddenPredicate, &facts[0], "m", None, None, None);
        let err = VerdictResult::from_parts(Verdict::Pass, vec![v], 2, 1).unwrap_err();
        assert!(matches!(err, GateError::InvalidVerdict(_)));

        assert!(VerdictResult::from_parts(Verdict::Fail, Vec::new(), 2, 1).is_err());
        assert!(VerdictResult::from_parts(Verdict::Pass, Vec::new(), 1, 2).is_err());
    }

    #[test]
    fn test_deserialization_revalidates() {
        let facts = facts();
        let v = create_violation(ViolationCode::ContradictoryValue, &facts[0], "m", None, None, None);
        let mut json = serde_json::to_value(compute_verdict(vec![v], &facts)).unwrap();
        assert!(serde_json::from_value::<VerdictResult>(json.clone()).is_ok());

        json["verdict"] = serde_json::json!("PASS");
        assert!(serde_json::from_value::<VerdictResult>(json).is_err());
    }
}
