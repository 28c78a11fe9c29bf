//! Rendering of gate results and canon records
//!
//! JSON and YAML print the records as they serialize; the table format is
//! a colored summary for terminals.

use crate::contracts::GateOutput;
use canon_core::{CanonStats, CanonValue, Claim, IntegrityReport, PredicateDefinition};
use clap::ValueEnum;
use colored::Colorize;
use serde::Serialize;
use std::fmt::Write;

/// Output format options for CLI results
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum, Debug, Default)]
pub enum OutputFormat {
    /// Human-readable summary with colors
    #[default]
    Table,
    /// JSON for machine processing
    Json,
    /// YAML
    Yaml,
}

/// Something the CLI can print
pub trait Render: Serialize {
    fn render_table(&self) -> String;

    fn render(&self, format: OutputFormat) -> anyhow::Result<String> {
        Ok(match format {
            OutputFormat::Table => self.render_table(),
            OutputFormat::Json => serde_json::to_string_pretty(self)?,
            OutputFormat::Yaml => serde_yaml::to_string(self)?,
        })
    }
}

/// Claim values are given as JSON; anything that does not parse is a string
pub fn parse_value(raw: &str) -> CanonValue {
    serde_json::from_str::<serde_json::Value>(raw)
        .map(CanonValue::from)
        .unwrap_or_else(|_| CanonValue::from(raw))
}

fn value_text(value: &CanonValue) -> String {
    match value {
        CanonValue::String(s) => s.clone(),
        other => serde_json::to_string(other).unwrap_or_default(),
    }
}

impl Render for GateOutput {
    fn render_table(&self) -> String {
        let mut out = String::new();
        match self {
            GateOutput::Passed { proof, .. } => {
                let _ = writeln!(out, "{} {}", "+".green(), "PASS".green().bold());
                let _ = writeln!(out, "  Facts:      {}", proof.facts.len());
                let _ = writeln!(out, "  Strict:     {}", proof.verdict.strict_facts_checked());
                let _ = writeln!(out, "  Proof hash: {}", proof.proof_hash);
            }
            GateOutput::Failed { quarantine } => {
                let _ = writeln!(out, "{} {}", "x".red(), "FAIL".red().bold());
                let _ = writeln!(out, "  Quarantine: {}", quarantine.quarantine_id);
                let _ = writeln!(out, "  Reason:     {}", quarantine.reason);
                for violation in quarantine.proof.verdict.violations() {
                    let _ = writeln!(
                        out,
                        "  {} {} {}{}",
                        violation.code.code().red(),
                        violation.code.name(),
                        violation.fact.predicate,
                        violation
                            .related_claim_id
                            .as_ref()
                            .map(|id| format!(" (claim {})", id))
                            .unwrap_or_default()
                    );
                }
                let _ = writeln!(out, "  Proof hash: {}", quarantine.proof.proof_hash);
            }
        }
        out
    }
}

impl Render for Vec<Claim> {
    fn render_table(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "{}", format!("{} claim(s)", self.len()).cyan().bold());
        for claim in self {
            let status = match claim.status {
                canon_core::ClaimStatus::Active => claim.status.as_str().green(),
                canon_core::ClaimStatus::Superseded => claim.status.as_str().yellow(),
                canon_core::ClaimStatus::Conditional => claim.status.as_str().blue(),
            };
            let _ = writeln!(
                out,
                "  {} {} {} = {} [{}]",
                claim.id,
                claim.subject,
                claim.predicate,
                value_text(&claim.value),
                status
            );
        }
        out
    }
}

/// Integrity report with storage statistics
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyOutput {
    pub integrity: IntegrityReport,
    pub stats: CanonStats,
}

impl Render for VerifyOutput {
    fn render_table(&self) -> String {
        let mut out = String::new();
        let status = if self.integrity.valid {
            "VALID".green().bold()
        } else {
            "INVALID".red().bold()
        };
        let _ = writeln!(out, "Canon integrity: {}", status);
        let _ = writeln!(out, "  Claims:   {}", self.stats.claim_count);
        let _ = writeln!(out, "  Segments: {}", self.stats.segment_count);
        let _ = writeln!(out, "  Bytes:    {}", self.stats.total_bytes);
        let _ = writeln!(out, "  Chain:    {}", if self.integrity.chain.valid { "ok" } else { "broken" });
        if let Some(at) = self.integrity.chain.broken_at {
            let _ = writeln!(out, "    broken at claim {}", at);
        }
        if let Some(at) = self.integrity.hash_mismatch_at {
            let _ = writeln!(out, "  {} hash mismatch at claim {}", "x".red(), at);
        }
        for segment in &self.integrity.manifest.mismatched_segments {
            let _ = writeln!(out, "  {} segment {} does not match manifest", "x".red(), segment);
        }
        let _ = writeln!(out, "  Index:    {}", if self.integrity.index_valid { "ok" } else { "stale" });
        out
    }
}

/// Active predicate catalog
#[derive(Debug, Clone, Serialize)]
pub struct CatalogOutput {
    pub version: String,
    pub predicates: Vec<PredicateDefinition>,
}

impl Render for CatalogOutput {
    fn render_table(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "{}", format!("Catalog {}", self.version).cyan().bold());
        for p in &self.predicates {
            let mut flags = Vec::new();
            if p.symmetric {
                flags.push("symmetric");
            }
            if p.transitive {
                flags.push("transitive");
            }
            let _ = writeln!(
                out,
                "  {:<16} {:?} -> {:?} {}",
                p.id.as_str(),
                p.subject_type,
                p.object_type,
                flags.join(",")
            );
        }
        out
    }
}
