//! F6: proof manifests
//!
//! The proof hash is computed over the canonical JSON of input hash,
//! verdict, facts and canon state hash. The timestamp is stored next to it
//! and never hashed, so identical runs produce identical proofs whenever
//! they happen.

use crate::contracts::{ClassifiedFact, ProofManifest, VerdictResult};
use crate::engine::CanonReader;
use crate::error::{GateError, GateResult};
use canon_core::canonical::hash_serializable;
use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};

/// Version stamped into every manifest
pub const GATE_VERSION: &str = "1.0.0";

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ProofBody<'a> {
    input_hash: &'a str,
    verdict: &'a VerdictResult,
    facts: &'a [ClassifiedFact],
    canon_state_hash: &'a str,
}

#[derive(Serialize)]
struct ClaimState<'a> {
    id: &'a str,
    hash: &'a str,
    status: &'a str,
}

/// SHA-256 of the raw input bytes
pub fn compute_input_hash(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    hex::encode(hasher.finalize())
}

/// Hash of every claim id, hash and effective status visible to the reader
pub async fn compute_canon_state_hash(reader: &dyn CanonReader) -> GateResult<String> {
    let claims = reader.get_all_claims().await;
    let state: Vec<ClaimState<'_>> = claims
        .iter()
        .map(|c| ClaimState {
            id: c.id.as_str(),
            hash: c.hash.as_str(),
            status: c.status.as_str(),
        })
        .collect();
    Ok(hash_serializable(&state)?)
}

pub fn compute_proof_hash(
    input_hash: &str,
    verdict: &VerdictResult,
    facts: &[ClassifiedFact],
    canon_state_hash: &str,
) -> GateResult<String> {
    Ok(hash_serializable(&ProofBody {
        input_hash,
        verdict,
        facts,
        canon_state_hash,
    })?)
}

/// Build the manifest for one run over `input`
pub fn create_proof_manifest(
    input: &str,
    verdict: VerdictResult,
    facts: Vec<ClassifiedFact>,
    canon_state_hash: impl Into<String>,
) -> GateResult<ProofManifest> {
    if !verdict.is_consistent() {
        return Err(GateError::invalid_verdict("verdict does not match its violations"));
    }
    let input_hash = compute_input_hash(input);
    let canon_state_hash = canon_state_hash.into();
    let proof_hash = compute_proof_hash(&input_hash, &verdict, &facts, &canon_state_hash)?;

    Ok(ProofManifest {
        proof_hash,
        input_hash,
        verdict,
        facts,
        canon_state_hash,
        timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Nanos, true),
        gate_version: GATE_VERSION.to_string(),
    })
}

/// The manifest belongs to `input` and its proof hash is intact
pub fn verify_proof_manifest(manifest: &ProofManifest, input: &str) -> bool {
    if manifest.input_hash != compute_input_hash(input) || !manifest.verdict.is_consistent() {
        return false;
    }
    compute_proof_hash(
        &manifest.input_hash,
        &manifest.verdict,
        &manifest.facts,
        &manifest.canon_state_hash,
    )
    .map(|hash| hash == manifest.proof_hash)
    .unwrap_or(false)
}

/// Equal in everything but the timestamp
pub fn manifests_match(a: &ProofManifest, b: &ProofManifest) -> bool {
    a.proof_hash == b.proof_hash
        && a.input_hash == b.input_hash
        && a.canon_state_hash == b.canon_state_hash
        && a.gate_version == b.gate_version
}

pub fn serialize_manifest(manifest: &ProofManifest) -> GateResult<String> {
    Ok(serde_json::to_string(manifest)?)
}

/// Parse a manifest; the embedded verdict is re-validated
pub fn deserialize_manifest(json: &str) -> GateResult<ProofManifest> {
    Ok(serde_json::from_str(json)?)
}

pub fn has_violations(manifest: &ProofManifest) -> bool {
    !manifest.verdict.violations().is_empty()
}

pub fn violation_count(manifest: &ProofManifest) -> usize {
    manifest.verdict.violations().len()
}

/// Multi-line human-readable summary
pub fn summarize_manifest(manifest: &ProofManifest) -> String {
    [
        format!("Proof Hash: {}", manifest.proof_hash),
        format!("Input Hash: {}", manifest.input_hash),
        format!("Verdict: {}", manifest.verdict.verdict()),
        format!("Facts: {}", manifest.facts.len()),
        format!("Strict Facts Checked: {}", manifest.verdict.strict_facts_checked()),
        format!("Violations: {}", violation_count(manifest)),
        format!("Canon State: {}", manifest.canon_state_hash),
        format!("Gate Version: {}", manifest.gate_version),
        format!("Timestamp: {}", manifest.timestamp),
    ]
    .join("\n")
}
