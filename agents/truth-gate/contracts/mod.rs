//! Truth Gate Contracts
//!
//! Records passed between the gate stages: extracted and classified facts,
//! canon violations, verdicts, proof manifests and quarantine records.

mod facts;
mod verdict;

pub use facts::*;
pub use verdict::*;

use serde::{Deserialize, Serialize};

/// Input for a truth gate run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateInput {
    /// Free text to validate
    pub text: String,

    /// Optional scope folded into every extracted fact id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

impl GateInput {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            context: None,
        }
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }
}

/// Outcome of a truth gate run
///
/// A passing run hands the text back with its proof. A failing run never
/// carries the text, only the redacted quarantine record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GateOutput {
    Passed { output: String, proof: ProofManifest },
    Failed { quarantine: QuarantineResult },
}

impl GateOutput {
    pub fn passed(&self) -> bool {
        matches!(self, GateOutput::Passed { .. })
    }

    pub fn is_fail(&self) -> bool {
        !self.passed()
    }

    /// Proof hash of the run, taken from the quarantine record on failure
    pub fn proof_hash(&self) -> &str {
        match self {
            GateOutput::Passed { proof, .. } => &proof.proof_hash,
            GateOutput::Failed { quarantine } => &quarantine.proof.proof_hash,
        }
    }

    pub fn verdict(&self) -> Verdict {
        match self {
            GateOutput::Passed { proof, .. } => proof.verdict.verdict(),
            GateOutput::Failed { quarantine } => quarantine.proof.verdict.verdict(),
        }
    }
}

/// Every intermediate product of one run
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineSteps {
    pub input: GateInput,
    pub extracted_facts: Vec<CanonicalFact>,
    pub classified_facts: Vec<ClassifiedFact>,
    pub strict_facts: Vec<ClassifiedFact>,
    pub violations: Vec<CanonViolation>,
    pub verdict: VerdictResult,
    pub proof: ProofManifest,
    pub output: GateOutput,
}
