//! Core Canon types
//!
//! Identifier newtypes are validated when constructed (including on
//! deserialization), so a `Claim` read back from disk carries only
//! well-formed ids and hashes.

use crate::canonical::hash_canonical;
use crate::error::{CanonError, CanonErrorCode, CanonResult, CanonicalizeError};
use crate::value::CanonValue;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident, $code:expr, $check:expr) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            /// Validate and wrap a raw string
            pub fn new(value: impl Into<String>) -> CanonResult<Self> {
                let value = value.into();
                let check: fn(&str) -> Result<(), String> = $check;
                check(&value).map_err(|msg| CanonError::new($code, msg))?;
                Ok(Self(value))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl TryFrom<String> for $name {
            type Error = CanonError;

            fn try_from(value: String) -> CanonResult<Self> {
                Self::new(value)
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> String {
                id.0
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

string_id!(
    /// Claim identifier (`CLM-{mono_ns hex}-{8 hex}` when generated)
    ClaimId,
    CanonErrorCode::InvalidId,
    |s| {
        if s.is_empty() {
            Err("claim id is empty".to_string())
        } else if s.chars().any(|c| c.is_whitespace() || c.is_control()) {
            Err(format!("claim id contains whitespace: {:?}", s))
        } else {
            Ok(())
        }
    }
);

string_id!(
    /// Entity identifier used as a claim subject
    EntityId,
    CanonErrorCode::InvalidSubject,
    |s| {
        if s.trim().is_empty() {
            Err("subject is empty".to_string())
        } else if s.chars().any(char::is_control) {
            Err(format!("subject contains control characters: {:?}", s))
        } else {
            Ok(())
        }
    }
);

string_id!(
    /// Predicate identifier (upper snake case)
    PredicateId,
    CanonErrorCode::InvalidPredicate,
    |s| {
        let well_formed = s.starts_with(|c: char| c.is_ascii_uppercase())
            && s.chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_');
        if s.is_empty() {
            Err("predicate is empty".to_string())
        } else if well_formed {
            Ok(())
        } else {
            Err(format!("predicate is not UPPER_SNAKE_CASE: {:?}", s))
        }
    }
);

string_id!(
    /// Lowercase hex SHA-256 digest
    ChainHash,
    CanonErrorCode::HashMismatch,
    |s| {
        if s.len() == 64 && s.chars().all(|c| matches!(c, '0'..='9' | 'a'..='f')) {
            Ok(())
        } else {
            Err(format!("not a sha256 hex digest: {:?}", s))
        }
    }
);

impl ClaimId {
    /// Generate a fresh id ordered by creation time
    pub fn generate(mono_ns: u64) -> Self {
        let suffix = Uuid::new_v4().simple().to_string();
        Self(format!("CLM-{:x}-{}", mono_ns, &suffix[..8]))
    }
}

impl ChainHash {
    /// Wrap a digest produced by [`crate::canonical::sha256_hex`]
    pub(crate) fn from_digest(hex: String) -> Self {
        debug_assert_eq!(hex.len(), 64);
        Self(hex)
    }
}

/// Claim lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClaimStatus {
    Active,
    Superseded,
    Conditional,
}

impl ClaimStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClaimStatus::Active => "ACTIVE",
            ClaimStatus::Superseded => "SUPERSEDED",
            ClaimStatus::Conditional => "CONDITIONAL",
        }
    }
}

impl fmt::Display for ClaimStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a claim came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LineageSource {
    System,
    User,
    Import,
    Derived,
    External,
}

/// Provenance attached to every claim
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lineage {
    pub source: LineageSource,

    /// Confidence in `[0, 1]`
    pub confidence: f64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl Default for Lineage {
    fn default() -> Self {
        Self {
            source: LineageSource::System,
            confidence: 1.0,
            note: None,
        }
    }
}

impl Lineage {
    pub fn new(source: LineageSource, confidence: f64) -> Self {
        Self {
            source,
            confidence,
            note: None,
        }
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    pub fn validate(&self) -> CanonResult<()> {
        if !self.confidence.is_finite() || !(0.0..=1.0).contains(&self.confidence) {
            return Err(CanonError::new(
                CanonErrorCode::InvalidLineage,
                format!("confidence must be within [0, 1], got {}", self.confidence),
            ));
        }
        Ok(())
    }
}

/// Supporting evidence reference
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Evidence {
    pub source_id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub excerpt: Option<String>,
}

impl Evidence {
    pub fn new(source_id: impl Into<String>) -> Self {
        Self {
            source_id: source_id.into(),
            excerpt: None,
        }
    }

    pub fn with_excerpt(mut self, excerpt: impl Into<String>) -> Self {
        self.excerpt = Some(excerpt.into());
        self
    }

    pub fn validate(&self) -> CanonResult<()> {
        if self.source_id.trim().is_empty() {
            return Err(CanonError::new(
                CanonErrorCode::InvalidEvidence,
                "evidence source id is empty",
            ));
        }
        Ok(())
    }
}

mod mono_ns_string {
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &u64, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(value)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(de::Error::custom)
    }
}

/// A single immutable assertion in the hash chain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Claim {
    pub id: ClaimId,

    /// Hash of the canonical claim without this field
    pub hash: ChainHash,

    /// Hash of the previous claim, or the genesis hash
    pub prev_hash: ChainHash,

    pub subject: EntityId,
    pub predicate: PredicateId,
    pub value: CanonValue,

    /// Monotonic creation time in nanoseconds, persisted as a decimal string
    #[serde(rename = "mono_ns", with = "mono_ns_string")]
    pub mono_ns: u64,

    pub version: u64,
    pub lineage: Lineage,

    #[serde(default)]
    pub evidence: Vec<Evidence>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub supersedes: Option<ClaimId>,

    pub status: ClaimStatus,
}

impl Claim {
    /// Canonical body covered by the claim hash
    pub fn hash_body(&self) -> Result<CanonValue, CanonicalizeError> {
        let mut body = CanonValue::from_serializable(self)?;
        if let CanonValue::Object(map) = &mut body {
            map.remove("hash");
            // the serde path maps NaN to null; hash the real tree
            map.insert("value".to_string(), self.value.clone());
        }
        Ok(body)
    }

    /// Recompute the content hash over every field except `hash`
    pub fn compute_hash(&self) -> Result<ChainHash, CanonicalizeError> {
        Ok(ChainHash::from_digest(hash_canonical(&self.hash_body()?)?))
    }

    /// Entity referenced by the value, if any
    pub fn object_entity(&self) -> Option<&str> {
        self.value.object_entity()
    }

    pub fn is_active(&self) -> bool {
        self.status == ClaimStatus::Active
    }
}

/// Caller input for creating a claim
#[derive(Debug, Clone, PartialEq)]
pub struct CreateClaimParams {
    pub subject: String,
    pub predicate: String,
    pub value: CanonValue,
    pub lineage: Lineage,
    pub evidence: Vec<Evidence>,
    pub supersedes: Option<ClaimId>,

    /// Defaults to `ACTIVE`
    pub status: Option<ClaimStatus>,
}

impl CreateClaimParams {
    pub fn new(
        subject: impl Into<String>,
        predicate: impl Into<String>,
        value: impl Into<CanonValue>,
    ) -> Self {
        Self {
            subject: subject.into(),
            predicate: predicate.into(),
            value: value.into(),
            lineage: Lineage::default(),
            evidence: Vec::new(),
            supersedes: None,
            status: None,
        }
    }

    pub fn with_lineage(mut self, lineage: Lineage) -> Self {
        self.lineage = lineage;
        self
    }

    pub fn with_evidence(mut self, evidence: Evidence) -> Self {
        self.evidence.push(evidence);
        self
    }

    pub fn with_supersedes(mut self, id: &ClaimId) -> Self {
        self.supersedes = Some(id.clone());
        self
    }

    pub fn with_status(mut self, status: ClaimStatus) -> Self {
        self.status = Some(status);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canonical::sha256_hex;

    fn sample_claim() -> Claim {
        let mut claim = Claim {
            id: ClaimId::new("CLM-1-abcdef01").unwrap(),
            hash: ChainHash::from_digest(sha256_hex(b"placeholder")),
            prev_hash: ChainHash::from_digest(sha256_hex(b"GENESIS")),
            subject: EntityId::new("ENT-alice").unwrap(),
            predicate: PredicateId::new("HAS_NAME").unwrap(),
            value: CanonValue::from("Alice Smith"),
            mono_ns: 1_700_000_000_123_456_789,
            version: 1,
            lineage: Lineage::default(),
            evidence: vec![],
            supersedes: None,
            status: ClaimStatus::Active,
        };
        claim.hash = claim.compute_hash().unwrap();
        claim
    }

    #[test]
    fn test_id_validation() {
        assert!(ClaimId::new("CLM-1").is_ok());
        assert_eq!(ClaimId::new("").unwrap_err().code, CanonErrorCode::InvalidId);
        assert_eq!(EntityId::new("  ").unwrap_err().code, CanonErrorCode::InvalidSubject);
        assert_eq!(
            PredicateId::new("has_name").unwrap_err().code,
            CanonErrorCode::InvalidPredicate
        );
        assert!(PredicateId::new("HAS_AGE").is_ok());
        assert!(ChainHash::new("abc").is_err());
        assert!(ChainHash::new(sha256_hex(b"x")).is_ok());
    }

    #[test]
    fn test_generated_id_shape() {
        let id = ClaimId::generate(255);
        assert!(id.as_str().starts_with("CLM-ff-"));
        assert_eq!(id.as_str().len(), "CLM-ff-".len() + 8);
    }

    #[test]
    fn test_claim_serde_shape() {
        let claim = sample_claim();
        let json = serde_json::to_value(&claim).unwrap();
        assert_eq!(json["prevHash"], serde_json::json!(claim.prev_hash.as_str()));
        assert_eq!(json["mono_ns"], serde_json::json!("1700000000123456789"));
        assert_eq!(json["status"], serde_json::json!("ACTIVE"));
        assert!(json.get("supersedes").is_none());

        let back: Claim = serde_json::from_value(json).unwrap();
        assert_eq!(back, claim);
    }

    #[test]
    fn test_deserialize_rejects_bad_ids() {
        let mut json = serde_json::to_value(sample_claim()).unwrap();
        json["hash"] = serde_json::json!("not-a-hash");
        assert!(serde_json::from_value::<Claim>(json).is_err());
    }

    #[test]
    fn test_hash_covers_fields() {
        let claim = sample_claim();
        assert_eq!(claim.compute_hash().unwrap(), claim.hash);

        let mut tampered = claim.clone();
        tampered.value = CanonValue::from("Alice Jones");
        assert_ne!(tampered.compute_hash().unwrap(), claim.hash);

        let mut tampered = claim.clone();
        tampered.mono_ns += 1;
        assert_ne!(tampered.compute_hash().unwrap(), claim.hash);
    }

    #[test]
    fn test_hash_rejects_nan_value() {
        let mut claim = sample_claim();
        claim.value = CanonValue::object([("score", CanonValue::Number(f64::NAN))]);
        assert!(claim.compute_hash().is_err());
    }

    #[test]
    fn test_lineage_and_evidence_validation() {
        assert!(Lineage::default().validate().is_ok());
        let err = Lineage::new(LineageSource::User, 1.5).validate().unwrap_err();
        assert_eq!(err.code, CanonErrorCode::InvalidLineage);
        assert!(Lineage::new(LineageSource::User, f64::NAN).validate().is_err());

        assert!(Evidence::new("doc-1").validate().is_ok());
        assert_eq!(
            Evidence::new(" ").validate().unwrap_err().code,
            CanonErrorCode::InvalidEvidence
        );
    }
}
