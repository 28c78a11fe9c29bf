//! Hash-chain lineage
//!
//! Every claim records the hash of the claim appended before it. The first
//! claim links to [`genesis_hash`].

use crate::canonical::sha256_hex;
use crate::types::{ChainHash, Claim};
use serde::{Deserialize, Serialize};

/// Seed hashed to produce the genesis link
pub const GENESIS_SEED: &str = "GENESIS";

/// `SHA256("GENESIS")`
pub fn genesis_hash() -> ChainHash {
    ChainHash::from_digest(sha256_hex(GENESIS_SEED.as_bytes()))
}

/// Link for a claim appended after `parent`
pub fn compute_prev_hash(parent: Option<&Claim>) -> ChainHash {
    parent.map(|c| c.hash.clone()).unwrap_or_else(genesis_hash)
}

/// Outcome of walking a claim chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainVerification {
    pub valid: bool,

    /// Index of the first claim whose link is wrong
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub broken_at: Option<usize>,

    /// Link the broken claim should have carried
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_hash: Option<ChainHash>,
}

impl ChainVerification {
    pub fn ok() -> Self {
        Self {
            valid: true,
            broken_at: None,
            expected_hash: None,
        }
    }

    pub fn broken(index: usize, expected: ChainHash) -> Self {
        Self {
            valid: false,
            broken_at: Some(index),
            expected_hash: Some(expected),
        }
    }
}

/// Check `prev_hash` links in append order, stopping at the first break
pub fn verify_lineage_chain(claims: &[Claim]) -> ChainVerification {
    let mut expected = genesis_hash();
    for (i, claim) in claims.iter().enumerate() {
        if claim.prev_hash != expected {
            return ChainVerification::broken(i, expected);
        }
        expected = claim.hash.clone();
    }
    ChainVerification::ok()
}

/// Whether the stored hash matches the recomputed content hash
pub fn verify_claim_hash(claim: &Claim) -> bool {
    claim
        .compute_hash()
        .map(|h| h == claim.hash)
        .unwrap_or(false)
}

/// Index of the first claim whose stored hash is wrong
pub fn verify_all_claim_hashes(claims: &[Claim]) -> Option<usize> {
    claims.iter().position(|c| !verify_claim_hash(c))
}
