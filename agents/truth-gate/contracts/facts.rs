//! Facts and their classification

use canon_core::CanonValue;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Deref;

/// Location of a fact in the input text, in byte offsets
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceSpan {
    pub start: usize,
    pub end: usize,
    pub text: String,
}

/// A subject/predicate/object triple lifted from text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanonicalFact {
    /// Hash of span, subject, predicate, object and scope
    pub id: String,
    pub subject: String,
    pub predicate: String,
    pub object: CanonValue,
    pub source_span: SourceSpan,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

/// Epistemic class of a fact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FactClass {
    /// Checked against the canon
    FactStrict,
    /// Inferred from other facts, never checked
    FactDerived,
    /// Hedged or unrecognized, never checked
    NonFactual,
}

impl FactClass {
    pub const ALL: [FactClass; 3] = [FactClass::FactStrict, FactClass::FactDerived, FactClass::NonFactual];

    pub fn as_str(&self) -> &'static str {
        match self {
            FactClass::FactStrict => "FACT_STRICT",
            FactClass::FactDerived => "FACT_DERIVED",
            FactClass::NonFactual => "NON_FACTUAL",
        }
    }
}

impl fmt::Display for FactClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A fact with exactly one class attached
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassifiedFact {
    #[serde(flatten)]
    pub fact: CanonicalFact,
    pub classification: FactClass,
    pub classification_reason: String,
}

impl ClassifiedFact {
    pub fn is_strict(&self) -> bool {
        self.classification == FactClass::FactStrict
    }
}

impl Deref for ClassifiedFact {
    type Target = CanonicalFact;

    fn deref(&self) -> &CanonicalFact {
        &self.fact
    }
}

/// Closed set of canon violation codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ViolationCode {
    #[serde(rename = "C-01")]
    UnknownEntity,
    #[serde(rename = "C-02")]
    ForbiddenPredicate,
    #[serde(rename = "C-03")]
    ContradictoryValue,
    #[serde(rename = "C-04")]
    TemporalViolation,
    #[serde(rename = "C-05")]
    CanonicalRegression,
    #[serde(rename = "C-06")]
    AmbiguityDetected,
}

impl ViolationCode {
    pub const ALL: [ViolationCode; 6] = [
        ViolationCode::UnknownEntity,
        ViolationCode::ForbiddenPredicate,
        ViolationCode::ContradictoryValue,
        ViolationCode::TemporalViolation,
        ViolationCode::CanonicalRegression,
        ViolationCode::AmbiguityDetected,
    ];

    /// Short code, `C-01` .. `C-06`
    pub fn code(&self) -> &'static str {
        match self {
            ViolationCode::UnknownEntity => "C-01",
            ViolationCode::ForbiddenPredicate => "C-02",
            ViolationCode::ContradictoryValue => "C-03",
            ViolationCode::TemporalViolation => "C-04",
            ViolationCode::CanonicalRegression => "C-05",
            ViolationCode::AmbiguityDetected => "C-06",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ViolationCode::UnknownEntity => "UNKNOWN_ENTITY",
            ViolationCode::ForbiddenPredicate => "FORBIDDEN_PREDICATE",
            ViolationCode::ContradictoryValue => "CONTRADICTORY_VALUE",
            ViolationCode::TemporalViolation => "TEMPORAL_VIOLATION",
            ViolationCode::CanonicalRegression => "CANONICAL_REGRESSION",
            ViolationCode::AmbiguityDetected => "AMBIGUITY_DETECTED",
        }
    }
}

impl fmt::Display for ViolationCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// A strict fact that disagrees with the canon
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanonViolation {
    pub code: ViolationCode,
    pub fact: ClassifiedFact,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub related_claim_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_value: Option<CanonValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actual_value: Option<CanonValue>,
}
