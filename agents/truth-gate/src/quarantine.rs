//! F7: quarantine of failed runs
//!
//! The stored proof keeps hashes, predicates, codes and claim ids. Every
//! field that could carry input text is replaced with [`REDACTION_MARKER`].

use crate::contracts::{CanonViolation, ClassifiedFact, ProofManifest, QuarantineResult, Verdict, ViolationCode};
use crate::error::{GateError, GateResult};
use canon_core::canonical::hash_serializable;
use canon_core::CanonValue;
use chrono::{SecondsFormat, Utc};

pub const REDACTION_MARKER: &str = "[REDACTED]";
pub const QUARANTINE_PREFIX: &str = "QTN-";

fn redacted() -> CanonValue {
    CanonValue::from(REDACTION_MARKER)
}

/// Fact with span text, subject, object and reason redacted
pub fn redact_fact(fact: &ClassifiedFact) -> ClassifiedFact {
    let mut out = fact.clone();
    out.fact.subject = REDACTION_MARKER.to_string();
    out.fact.object = redacted();
    out.fact.source_span.text = REDACTION_MARKER.to_string();
    out.classification_reason = REDACTION_MARKER.to_string();
    out
}

pub fn redact_violation(violation: &CanonViolation) -> CanonViolation {
    CanonViolation {
        code: violation.code,
        fact: redact_fact(&violation.fact),
        message: REDACTION_MARKER.to_string(),
        related_claim_id: violation.related_claim_id.clone(),
        expected_value: violation.expected_value.as_ref().map(|_| redacted()),
        actual_value: violation.actual_value.as_ref().map(|_| redacted()),
    }
}

/// Copy of a manifest safe to store next to nothing but hashes
///
/// The original proof hash is kept, so the copy no longer verifies against
/// the input on its own.
pub fn redact_manifest(manifest: &ProofManifest) -> ProofManifest {
    ProofManifest {
        proof_hash: manifest.proof_hash.clone(),
        input_hash: manifest.input_hash.clone(),
        verdict: manifest.verdict.map_violations(redact_violation),
        facts: manifest.facts.iter().map(redact_fact).collect(),
        canon_state_hash: manifest.canon_state_hash.clone(),
        timestamp: manifest.timestamp.clone(),
        gate_version: manifest.gate_version.clone(),
    }
}

/// `QTN-` + hash of proof hash and input hash
pub fn compute_quarantine_id(proof_hash: &str, input_hash: &str) -> GateResult<String> {
    Ok(format!("{}{}", QUARANTINE_PREFIX, hash_serializable(&[proof_hash, input_hash])?))
}

fn summarize_codes(manifest: &ProofManifest, codes: &[ViolationCode]) -> String {
    let listed: Vec<String> = codes.iter().map(|c| format!("{} {}", c.code(), c.name())).collect();
    format!(
        "Truth gate failed with {} violation(s): {}",
        manifest.verdict.violations().len(),
        listed.join(", ")
    )
}

/// Quarantine record for a failed run
pub fn create_quarantine(manifest: &ProofManifest) -> GateResult<QuarantineResult> {
    if manifest.verdict.verdict() != Verdict::Fail {
        return Err(GateError::quarantine_on_pass("verdict is PASS"));
    }
    if manifest.verdict.violations().is_empty() {
        return Err(GateError::quarantine_on_pass("no violations recorded"));
    }
    if manifest.proof_hash.is_empty() || manifest.input_hash.is_empty() {
        return Err(GateError::quarantine_on_pass("proof is incomplete"));
    }

    let mut codes: Vec<ViolationCode> = manifest.verdict.violations().iter().map(|v| v.code).collect();
    codes.sort();
    codes.dedup();

    let quarantine_id = compute_quarantine_id(&manifest.proof_hash, &manifest.input_hash)?;
    tracing::warn!(
        quarantine_id = %quarantine_id,
        violations = manifest.verdict.violations().len(),
        "Input quarantined"
    );

    Ok(QuarantineResult {
        quarantine_id,
        proof: redact_manifest(manifest),
        input_hash: manifest.input_hash.clone(),
        reason: summarize_codes(manifest, &codes),
        violation_codes: codes,
        timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
    })
}
