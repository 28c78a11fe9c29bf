//! Truth gate engine
//!
//! Runs extraction, classification, canon matching, verdict, proof and
//! quarantine strictly in sequence. A run is a pure function of the input
//! text, its context and the canon snapshot; the only output that depends
//! on the clock is the display timestamp.

mod classify;
mod extract;
mod matcher;
mod verdict;

pub use classify::*;
pub use extract::*;
pub use matcher::*;
pub use verdict::*;

use crate::contracts::*;
use crate::error::GateResult;
use crate::proof::{compute_canon_state_hash, create_proof_manifest};
use crate::quarantine::create_quarantine;
use crate::telemetry::GateMetrics;
use canon_core::{CanonApi, PredicateRegistry};
use std::sync::Arc;

/// What a gate run reads from
#[derive(Clone)]
pub struct TruthGateConfig {
    pub reader: Arc<dyn CanonReader>,
    pub catalog: PredicateRegistry,

    /// Also report C-01, C-05 and C-06, and every violation per fact
    pub comprehensive: bool,
}

impl std::fmt::Debug for TruthGateConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TruthGateConfig")
            .field("catalog", &self.catalog)
            .field("comprehensive", &self.comprehensive)
            .finish_non_exhaustive()
    }
}

impl TruthGateConfig {
    /// Reader with the built-in catalog
    pub fn new(reader: Arc<dyn CanonReader>) -> Self {
        Self {
            reader,
            catalog: PredicateRegistry::new(),
            comprehensive: false,
        }
    }

    /// Read from a Canon API, sharing its catalog
    pub fn for_canon(api: Arc<CanonApi>) -> Self {
        let catalog = api.catalog().clone();
        Self {
            reader: api,
            catalog,
            comprehensive: false,
        }
    }

    pub fn with_catalog(mut self, catalog: PredicateRegistry) -> Self {
        self.catalog = catalog;
        self
    }

    pub fn with_comprehensive(mut self, comprehensive: bool) -> Self {
        self.comprehensive = comprehensive;
        self
    }
}

/// Gate bound to one configuration
#[derive(Clone)]
pub struct TruthGate {
    config: TruthGateConfig,
    classifier: FactClassifier,
    matcher: CanonMatcher,
    metrics: Option<Arc<GateMetrics>>,
}

impl std::fmt::Debug for TruthGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TruthGate")
            .field("config", &self.config)
            .field("metrics", &self.metrics.is_some())
            .finish()
    }
}

impl TruthGate {
    pub fn new(config: TruthGateConfig) -> Self {
        Self {
            classifier: FactClassifier::new(config.catalog.clone()),
            matcher: CanonMatcher::new(Arc::clone(&config.reader), config.catalog.clone()),
            config,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<GateMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn config(&self) -> &TruthGateConfig {
        &self.config
    }

    /// Run every stage and return the final output
    pub async fn execute(&self, input: &GateInput) -> GateResult<GateOutput> {
        Ok(self.execute_with_steps(input).await?.output)
    }

    /// Run every stage and keep all intermediate products
    pub async fn execute_with_steps(&self, input: &GateInput) -> GateResult<PipelineSteps> {
        let _timer = self.metrics.as_ref().map(|m| m.start_timer());

        let extracted = extract_facts(&input.text, input.context.as_deref())?;
        let classified = self.classifier.classify_all(extracted.clone());
        let strict = strict_facts(&classified);

        let violations = if self.config.comprehensive {
            self.matcher.match_against_canon_comprehensive(&classified).await
        } else {
            self.matcher.match_against_canon(&classified).await
        };

        let verdict = compute_verdict(violations.clone(), &classified);
        let canon_state_hash = compute_canon_state_hash(self.config.reader.as_ref()).await?;
        let proof = create_proof_manifest(&input.text, verdict.clone(), classified.clone(), canon_state_hash)?;

        let output = if verdict.is_pass() {
            GateOutput::Passed {
                output: input.text.clone(),
                proof: proof.clone(),
            }
        } else {
            GateOutput::Failed {
                quarantine: create_quarantine(&proof)?,
            }
        };

        tracing::info!(
            verdict = %verdict.verdict(),
            facts = classified.len(),
            strict = strict.len(),
            violations = violations.len(),
            proof_hash = %proof.proof_hash,
            "Truth gate run complete"
        );
        if let Some(metrics) = &self.metrics {
            metrics.record_facts(&classified);
            metrics.record_outcome(verdict.verdict(), &violations);
        }

        Ok(PipelineSteps {
            input: input.clone(),
            extracted_facts: extracted,
            classified_facts: classified,
            strict_facts: strict,
            violations,
            verdict,
            proof,
            output,
        })
    }
}

/// Run the gate once
pub async fn execute_truth_gate(input: &GateInput, config: &TruthGateConfig) -> GateResult<GateOutput> {
    TruthGate::new(config.clone()).execute(input).await
}

pub async fn execute_pipeline_with_steps(input: &GateInput, config: &TruthGateConfig) -> GateResult<PipelineSteps> {
    TruthGate::new(config.clone()).execute_with_steps(input).await
}

/// Whether `text` passes
pub async fn quick_validate(text: &str, config: &TruthGateConfig) -> GateResult<bool> {
    Ok(execute_truth_gate(&GateInput::new(text), config).await?.passed())
}

/// Unredacted violations for `text`
pub async fn get_violations(text: &str, config: &TruthGateConfig) -> GateResult<Vec<CanonViolation>> {
    Ok(execute_pipeline_with_steps(&GateInput::new(text), config)
        .await?
        .violations)
}

/// Whether `text` yields any strict fact under the built-in catalog
pub fn has_strict_facts(text: &str) -> bool {
    extract_facts(text, None)
        .map(|facts| facts.into_iter().map(classify_fact).any(|f| f.is_strict()))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn empty_config() -> TruthGateConfig {
        TruthGateConfig::new(Arc::new(ClaimSnapshot::default()))
    }

    #[tokio::test]
    async fn test_plain_text_passes() {
        let output = execute_truth_gate(&GateInput::new("Hello world!"), &empty_config())
            .await
            .unwrap();
        match output {
            GateOutput::Passed { output, proof } => {
                assert_eq!(output, "Hello world!");
                assert_eq!(proof.verdict.verdict(), Verdict::Pass);
            }
            GateOutput::Failed { .. } => panic!("expected pass"),
        }
    }

    #[tokio::test]
    async fn test_steps_are_consistent() {
        let input = GateInput::new("Alice is smart. Bob has a car. Carol probably is tall.");
        let steps = execute_pipeline_with_steps(&input, &empty_config()).await.unwrap();
        assert_eq!(steps.input, input);
        assert_eq!(steps.extracted_facts.len(), steps.classified_facts.len());
        assert!(steps.strict_facts.len() <= steps.classified_facts.len());
        assert!(steps.strict_facts.iter().all(|f| f.classification == FactClass::FactStrict));
        assert!(steps.output.passed());
    }

    #[tokio::test]
    async fn test_forbidden_predicate_fails() {
        let violations = get_violations("The colour of Alice is red.", &empty_config()).await.unwrap();
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].code, ViolationCode::ForbiddenPredicate);
        assert!(!quick_validate("The colour of Alice is red.", &empty_config()).await.unwrap());
    }

    #[tokio::test]
    async fn test_context_scope_reaches_facts() {
        let input = GateInput::new("Alice is smart.").with_context("chapter-1");
        let steps = execute_pipeline_with_steps(&input, &empty_config()).await.unwrap();
        assert_eq!(steps.classified_facts[0].scope.as_deref(), Some("chapter-1"));
    }

    #[test]
    fn test_has_strict_facts() {
        assert!(has_strict_facts("Alice is smart."));
        assert!(!has_strict_facts("Hello world!"));
        assert!(!has_strict_facts("Alice is probably smart."));
    }

    #[tokio::test]
    async fn test_metrics_are_recorded() {
        let registry = crate::telemetry::GateMetricsRegistry::new().unwrap();
        let gate = TruthGate::new(empty_config()).with_metrics(registry.gate());
        gate.execute(&GateInput::new("Alice is smart.")).await.unwrap();

        let text = registry.encode_text().unwrap();
        assert!(text.contains("truth_gate_runs_total{verdict=\"PASS\"} 1"));
        assert!(text.contains("classification=\"FACT_STRICT\""));
    }
}
