//! Verdicts, proofs and quarantine records

use super::facts::{CanonViolation, ClassifiedFact, ViolationCode};
use crate::error::GateError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Binary gate outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Verdict {
    Pass,
    Fail,
}

impl Verdict {
    pub const ALL: [Verdict; 2] = [Verdict::Pass, Verdict::Fail];

    pub fn as_str(&self) -> &'static str {
        match self {
            Verdict::Pass => "PASS",
            Verdict::Fail => "FAIL",
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Verdict with the violations it was derived from
///
/// `verdict == PASS` exactly when `violations` is empty. Both constructors
/// and deserialization enforce this, and the fields are read-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "VerdictRecord")]
pub struct VerdictResult {
    verdict: Verdict,
    violations: Vec<CanonViolation>,
    facts_processed: usize,
    strict_facts_checked: usize,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct VerdictRecord {
    verdict: Verdict,
    violations: Vec<CanonViolation>,
    facts_processed: usize,
    strict_facts_checked: usize,
}

impl TryFrom<VerdictRecord> for VerdictResult {
    type Error = GateError;

    fn try_from(record: VerdictRecord) -> Result<Self, GateError> {
        VerdictResult::from_parts(
            record.verdict,
            record.violations,
            record.facts_processed,
            record.strict_facts_checked,
        )
    }
}

impl VerdictResult {
    /// Derive the verdict from the violations found over `facts`
    pub fn new(violations: Vec<CanonViolation>, facts: &[ClassifiedFact]) -> Self {
        let verdict = if violations.is_empty() {
            Verdict::Pass
        } else {
            Verdict::Fail
        };
        Self {
            verdict,
            violations,
            facts_processed: facts.len(),
            strict_facts_checked: facts.iter().filter(|f| f.is_strict()).count(),
        }
    }

    /// Assemble a result from stored parts, rejecting inconsistent ones
    pub fn from_parts(
        verdict: Verdict,
        violations: Vec<CanonViolation>,
        facts_processed: usize,
        strict_facts_checked: usize,
    ) -> Result<Self, GateError> {
        match (verdict, violations.is_empty()) {
            (Verdict::Pass, false) => {
                return Err(GateError::InvalidVerdict(format!(
                    "PASS with {} violation(s)",
                    violations.len()
                )))
            }
            (Verdict::Fail, true) => {
                return Err(GateError::InvalidVerdict("FAIL without violations".to_string()))
            }
            _ => {}
        }
        if strict_facts_checked > facts_processed {
            return Err(GateError::InvalidVerdict(format!(
                "{} strict facts out of {} processed",
                strict_facts_checked, facts_processed
            )));
        }
        Ok(Self {
            verdict,
            violations,
            facts_processed,
            strict_facts_checked,
        })
    }

    pub fn verdict(&self) -> Verdict {
        self.verdict
    }

    pub fn violations(&self) -> &[CanonViolation] {
        &self.violations
    }

    pub fn facts_processed(&self) -> usize {
        self.facts_processed
    }

    pub fn strict_facts_checked(&self) -> usize {
        self.strict_facts_checked
    }

    pub fn is_pass(&self) -> bool {
        self.verdict == Verdict::Pass
    }

    /// Re-check the verdict/violations equivalence
    pub fn is_consistent(&self) -> bool {
        (self.verdict == Verdict::Pass) == self.violations.is_empty()
            && self.strict_facts_checked <= self.facts_processed
    }

    /// Same result with every violation passed through `f`
    pub(crate) fn map_violations<F>(&self, f: F) -> Self
    where
        F: Fn(&CanonViolation) -> CanonViolation,
    {
        Self {
            verdict: self.verdict,
            violations: self.violations.iter().map(f).collect(),
            facts_processed: self.facts_processed,
            strict_facts_checked: self.strict_facts_checked,
        }
    }
}

/// Reproducible audit record of one gate run
///
/// `proof_hash` covers the input hash, verdict, facts and canon state hash.
/// `timestamp` is for display and is not part of the hash.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProofManifest {
    pub proof_hash: String,
    pub input_hash: String,
    pub verdict: VerdictResult,
    pub facts: Vec<ClassifiedFact>,
    pub canon_state_hash: String,
    pub timestamp: String,
    pub gate_version: String,
}

/// Redacted, permanent record of a failed run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuarantineResult {
    /// `QTN-` followed by the hash of proof hash and input hash
    pub quarantine_id: String,

    /// Proof with all input-derived text replaced
    pub proof: ProofManifest,

    pub input_hash: String,

    /// Distinct violation codes, sorted
    pub violation_codes: Vec<ViolationCode>,

    pub reason: String,
    pub timestamp: String,
}
