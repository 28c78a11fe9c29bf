//! Error types for the Truth Gate

use canon_core::CanonicalizeError;
use thiserror::Error;

/// Failures of the gate itself, as opposed to canon violations
#[derive(Error, Debug)]
pub enum GateError {
    /// A verdict whose PASS/FAIL does not match its violations
    #[error("Invalid verdict: {0}")]
    InvalidVerdict(String),

    /// Quarantine requested for a run that did not fail
    #[error("Cannot quarantine: {0}")]
    QuarantineOnPass(String),

    /// Fact or proof content could not be canonicalized
    #[error("Canonicalization error: {0}")]
    Canonicalize(#[from] CanonicalizeError),

    /// Manifest (de)serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl GateError {
    pub fn invalid_verdict(msg: impl Into<String>) -> Self {
        GateError::InvalidVerdict(msg.into())
    }

    pub fn quarantine_on_pass(msg: impl Into<String>) -> Self {
        GateError::QuarantineOnPass(msg.into())
    }
}

pub type GateResult<T> = std::result::Result<T, GateError>;
