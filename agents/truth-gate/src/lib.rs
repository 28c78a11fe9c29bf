//! Truth Gate
//!
//! Deterministic validation of free text against the Canon. Facts are
//! extracted by fixed patterns, classified, matched read-only against canon
//! claims and turned into a verdict with a reproducible proof. Failed runs
//! produce a redacted quarantine record instead of the text.
//!
//! # Design Principles
//! - Deterministic: the proof hash depends only on input, facts, verdict and canon state
//! - Read-only: the gate never writes to the canon
//! - Fail-closed: a failing run never returns the original text

pub mod cli;
pub mod engine;
pub mod error;
pub mod proof;
pub mod quarantine;
pub mod telemetry;

// Re-export contracts
#[path = "../contracts/mod.rs"]
pub mod contracts;

pub use contracts::*;
pub use engine::{
    execute_pipeline_with_steps, execute_truth_gate, get_violations, has_strict_facts, quick_validate,
    CanonReader, ClaimSnapshot, TruthGate, TruthGateConfig,
};
pub use error::{GateError, GateResult};
pub use proof::GATE_VERSION;
