//! Prometheus metrics for the Truth Gate
//!
//! - `truth_gate_runs_total` (counter) - runs by verdict
//! - `truth_gate_violations_total` (counter) - violations by code
//! - `truth_gate_facts_total` (counter) - extracted facts by class
//! - `truth_gate_quarantines_total` (counter) - quarantine records created
//! - `truth_gate_run_duration_seconds` (histogram) - run duration
//!
//! # Example
//!
//! ```rust,no_run
//! use truth_gate::telemetry::GateMetricsRegistry;
//!
//! let registry = GateMetricsRegistry::new().unwrap();
//! registry.gate().record_run("PASS");
//! println!("{}", registry.encode_text().unwrap());
//! ```

use prometheus::{Counter, CounterVec, Histogram, HistogramOpts, Opts, Registry};
use std::sync::Arc;
use std::time::Instant;

use super::{Result, TelemetryError};
use crate::contracts::{CanonViolation, ClassifiedFact, Verdict};

/// Gate metrics for Prometheus
pub struct GateMetrics {
    /// Runs by verdict
    runs_total: CounterVec,

    /// Violations by code
    violations_total: CounterVec,

    /// Extracted facts by classification
    facts_total: CounterVec,

    quarantines_total: Counter,

    duration_seconds: Histogram,
}

impl GateMetrics {
    /// Create the metrics and register them with `registry`
    pub fn new(registry: Arc<Registry>) -> Result<Self> {
        let runs_total = CounterVec::new(
            Opts::new("runs_total", "Total number of truth gate runs by verdict").namespace("truth_gate"),
            &["verdict"],
        )?;

        let violations_total = CounterVec::new(
            Opts::new("violations_total", "Total number of canon violations by code").namespace("truth_gate"),
            &["code"],
        )?;

        let facts_total = CounterVec::new(
            Opts::new("facts_total", "Total number of extracted facts by classification").namespace("truth_gate"),
            &["classification"],
        )?;

        let quarantines_total = Counter::with_opts(
            Opts::new("quarantines_total", "Total number of quarantine records created").namespace("truth_gate"),
        )?;

        let duration_seconds = Histogram::with_opts(
            HistogramOpts::new("run_duration_seconds", "Truth gate run duration in seconds")
                .namespace("truth_gate")
                .buckets(vec![0.0005, 0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0]),
        )?;

        registry.register(Box::new(runs_total.clone()))?;
        registry.register(Box::new(violations_total.clone()))?;
        registry.register(Box::new(facts_total.clone()))?;
        registry.register(Box::new(quarantines_total.clone()))?;
        registry.register(Box::new(duration_seconds.clone()))?;

        Ok(Self {
            runs_total,
            violations_total,
            facts_total,
            quarantines_total,
            duration_seconds,
        })
    }

    pub fn record_run(&self, verdict: &str) {
        self.runs_total.with_label_values(&[verdict]).inc();
    }

    pub fn record_violation(&self, code: &str) {
        self.violations_total.with_label_values(&[code]).inc();
    }

    pub fn record_facts(&self, facts: &[ClassifiedFact]) {
        for fact in facts {
            self.facts_total
                .with_label_values(&[fact.classification.as_str()])
                .inc();
        }
    }

    pub fn record_quarantine(&self) {
        self.quarantines_total.inc();
    }

    pub fn observe_duration(&self, duration_secs: f64) {
        self.duration_seconds.observe(duration_secs);
    }

    /// Record the outcome of one run
    pub fn record_outcome(&self, verdict: Verdict, violations: &[CanonViolation]) {
        self.record_run(verdict.as_str());
        for violation in violations {
            self.record_violation(violation.code.code());
        }
        if verdict == Verdict::Fail {
            self.record_quarantine();
        }
    }

    /// Start a run timer (records the duration on drop)
    pub fn start_timer(&self) -> RunTimer<'_> {
        RunTimer {
            start: Instant::now(),
            metrics: self,
        }
    }
}

/// RAII guard for timing gate runs
pub struct RunTimer<'a> {
    start: Instant,
    metrics: &'a GateMetrics,
}

impl RunTimer<'_> {
    pub fn elapsed_secs(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }
}

impl Drop for RunTimer<'_> {
    fn drop(&mut self) {
        self.metrics.observe_duration(self.start.elapsed().as_secs_f64());
    }
}

/// Registry owning the gate metrics
pub struct GateMetricsRegistry {
    registry: Arc<Registry>,
    gate: Arc<GateMetrics>,
}

impl GateMetricsRegistry {
    pub fn new() -> Result<Self> {
        Self::with_registry(Arc::new(Registry::new()))
    }

    /// Create with an existing Prometheus registry
    pub fn with_registry(registry: Arc<Registry>) -> Result<Self> {
        let gate = Arc::new(GateMetrics::new(Arc::clone(&registry))?);
        Ok(Self { registry, gate })
    }

    pub fn registry(&self) -> Arc<Registry> {
        Arc::clone(&self.registry)
    }

    /// Shared handle for a [`crate::engine::TruthGate`]
    pub fn gate(&self) -> Arc<GateMetrics> {
        Arc::clone(&self.gate)
    }

    pub fn gather(&self) -> Vec<prometheus::proto::MetricFamily> {
        self.registry.gather()
    }

    /// Encode metrics as text for scraping
    pub fn encode_text(&self) -> Result<String> {
        use prometheus::Encoder;
        let encoder = prometheus::TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| TelemetryError::EncodingError(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_run_and_violations() {
        let registry = GateMetricsRegistry::new().unwrap();
        let metrics = registry.gate();

        metrics.record_run("PASS");
        metrics.record_run("FAIL");
        metrics.record_violation("C-03");
        metrics.record_quarantine();

        let text = registry.encode_text().unwrap();
        assert!(text.contains("truth_gate_runs_total"));
        assert!(text.contains("verdict=\"FAIL\""));
        assert!(text.contains("truth_gate_violations_total{code=\"C-03\"} 1"));
        assert!(text.contains("truth_gate_quarantines_total 1"));
    }

    #[test]
    fn test_timer_observes_on_drop() {
        let registry = GateMetricsRegistry::new().unwrap();
        let metrics = registry.gate();
        {
            let timer = metrics.start_timer();
            assert!(timer.elapsed_secs() >= 0.0);
        }
        let families = registry.gather();
        let duration = families
            .iter()
            .find(|f| f.get_name() == "truth_gate_run_duration_seconds")
            .unwrap();
        assert_eq!(duration.get_metric()[0].get_histogram().get_sample_count(), 1);
    }

    #[test]
    fn test_double_registration_fails() {
        let registry = Arc::new(Registry::new());
        assert!(GateMetrics::new(Arc::clone(&registry)).is_ok());
        assert!(GateMetrics::new(registry).is_err());
    }
}
