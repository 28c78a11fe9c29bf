//! F3: fact classification
//!
//! Total and deterministic. Checked in priority order: hedging words in the
//! source span, derived predicates, strict predicates, then the fallback.
//! The hedge lexicon holds words of uncertainty only; modal verbs and
//! conditionals leave a statement strict.

use crate::contracts::{CanonicalFact, ClassifiedFact, FactClass};
use canon_core::PredicateRegistry;
use regex::Regex;
use serde::Serialize;
use std::sync::OnceLock;

/// Words and phrases that mark a statement as uncertain
pub const NON_FACTUAL_INDICATORS: &[&str] = &[
    "maybe",
    "perhaps",
    "probably",
    "possibly",
    "might",
    "think",
    "believe",
    "suppose",
    "guess",
    "seems",
    "appears",
    "likely",
    "unlikely",
    "allegedly",
    "reportedly",
    "rumored",
    "supposedly",
];

/// Predicates that only hold by inference
pub const DERIVED_PREDICATES: &[&str] = &[
    "IMPLIES",
    "INFERRED",
    "DERIVED",
    "SUGGESTS",
    "INDICATES",
    "CONCLUDES",
    "DEDUCED",
];

/// Predicates always checked against the canon
pub const STRICT_PREDICATES: &[&str] = &[
    "HAS_NAME",
    "HAS_AGE",
    "HAS_ATTRIBUTE",
    "HAS_ROLE",
    "HAS_TRAIT",
    "HAS_STATUS",
    "IS_A",
    "KNOWS",
    "SIBLING_OF",
    "PARENT_OF",
    "CHILD_OF",
    "MEMBER_OF",
    "OWNS",
    "LOCATED_IN",
    "BORN_IN",
    "DIED_IN",
];

fn hedge_pattern() -> &'static Regex {
    static HEDGE: OnceLock<Regex> = OnceLock::new();
    HEDGE.get_or_init(|| {
        let words: Vec<String> = NON_FACTUAL_INDICATORS.iter().map(|w| regex::escape(w)).collect();
        let src = format!(r"(?i)\b(?:{})\b", words.join("|"));
        Regex::new(&src).unwrap_or_else(|e| panic!("bad hedge pattern: {}", e))
    })
}

/// Whether the text carries an uncertainty indicator
pub fn has_non_factual_indicator(text: &str) -> bool {
    hedge_pattern().is_match(text)
}

pub fn is_derived_predicate(predicate: &str) -> bool {
    DERIVED_PREDICATES.iter().any(|p| p.eq_ignore_ascii_case(predicate))
}

/// Fixed strict set or any `HAS_*` predicate
pub fn is_strict_predicate(predicate: &str) -> bool {
    STRICT_PREDICATES.contains(&predicate) || (predicate.starts_with("HAS_") && predicate.len() > 4)
}

/// Class counts over a fact list
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassificationStats {
    pub total: usize,
    pub strict: usize,
    pub derived: usize,
    pub non_factual: usize,
}

/// Classifier bound to a predicate catalog
#[derive(Debug, Clone, Default)]
pub struct FactClassifier {
    catalog: PredicateRegistry,
}

impl FactClassifier {
    pub fn new(catalog: PredicateRegistry) -> Self {
        Self { catalog }
    }

    /// Assign exactly one class to a fact
    pub fn classify(&self, fact: CanonicalFact) -> ClassifiedFact {
        let (classification, reason) = if has_non_factual_indicator(&fact.source_span.text) {
            (
                FactClass::NonFactual,
                "Source text contains an uncertainty indicator".to_string(),
            )
        } else if is_derived_predicate(&fact.predicate) {
            (
                FactClass::FactDerived,
                format!("Predicate {} is derived by inference", fact.predicate),
            )
        } else if is_strict_predicate(&fact.predicate) || self.catalog.validate_predicate(&fact.predicate) {
            (
                FactClass::FactStrict,
                format!("Predicate {} is a strict canon predicate", fact.predicate),
            )
        } else {
            (
                FactClass::NonFactual,
                format!("Predicate {} is not recognized", fact.predicate),
            )
        };

        ClassifiedFact {
            fact,
            classification,
            classification_reason: reason,
        }
    }

    pub fn classify_all(&self, facts: Vec<CanonicalFact>) -> Vec<ClassifiedFact> {
        facts.into_iter().map(|f| self.classify(f)).collect()
    }
}

/// Classify against the built-in catalog
pub fn classify_fact(fact: CanonicalFact) -> ClassifiedFact {
    FactClassifier::default().classify(fact)
}

pub fn classification_stats(facts: &[ClassifiedFact]) -> ClassificationStats {
    facts.iter().fold(
        ClassificationStats {
            total: facts.len(),
            ..Default::default()
        },
        |mut stats, f| {
            match f.classification {
                FactClass::FactStrict => stats.strict += 1,
                FactClass::FactDerived => stats.derived += 1,
                FactClass::NonFactual => stats.non_factual += 1,
            }
            stats
        },
    )
}

fn of_class(facts: &[ClassifiedFact], class: FactClass) -> Vec<ClassifiedFact> {
    facts.iter().filter(|f| f.classification == class).cloned().collect()
}

pub fn strict_facts(facts: &[ClassifiedFact]) -> Vec<ClassifiedFact> {
    of_class(facts, FactClass::FactStrict)
}

pub fn derived_facts(facts: &[ClassifiedFact]) -> Vec<ClassifiedFact> {
    of_class(facts, FactClass::FactDerived)
}

pub fn non_factual_facts(facts: &[ClassifiedFact]) -> Vec<ClassifiedFact> {
    of_class(facts, FactClass::NonFactual)
}

/// Every input fact appears in the output with a class
pub fn all_facts_classified(input: &[CanonicalFact], output: &[ClassifiedFact]) -> bool {
    input.len() == output.len() && input.iter().zip(output).all(|(a, b)| a.id == b.fact.id)
}
