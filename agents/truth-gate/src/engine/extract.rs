//! F2: pattern-based fact extraction
//!
//! Facts come only from fixed regular expressions applied sentence by
//! sentence, plus explicit `[SUBJECT:x] PRED [OBJECT:y]` markers. The same
//! text always yields the same facts in the same order.

use crate::contracts::{CanonicalFact, SourceSpan};
use crate::error::GateResult;
use canon_core::canonical::hash_canonical;
use canon_core::CanonValue;
use regex::Regex;
use std::collections::HashSet;
use std::sync::OnceLock;

/// Natural-language shapes, tried in order; the first match wins
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Shape {
    /// "The age of Bob is 25"
    AttributeOf,
    /// "Alice's age is 30"
    Possessive,
    /// "Person named John", "Alice is called Al"
    Named,
    /// "Alice knows Bob"
    Knows,
    /// "Bob has a car"
    Has,
    /// "Alice is a developer"
    IsA,
}

const NAME: &str = r"[A-Z][\w-]*(?:\s+[A-Z][\w-]*){0,3}";

struct Patterns {
    sentence: Regex,
    marked: Regex,
    number: Regex,
    shapes: Vec<(Shape, Regex)>,
}

fn patterns() -> &'static Patterns {
    static PATTERNS: OnceLock<Patterns> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        let compile = |src: String| Regex::new(&src).unwrap_or_else(|e| panic!("bad pattern {}: {}", src, e));
        Patterns {
            // a terminator followed by a non-space (30.5, e.g.x) stays inside the sentence
            sentence: compile(r"(?:[^.!?\n]|[.!?][^\s.!?])+".to_string()),
            marked: compile(r"\[SUBJECT:([^\]]+)\]\s*([A-Za-z][A-Za-z0-9_]*)\s*\[OBJECT:([^\]]+)\]".to_string()),
            number: compile(r"^-?\d+(?:\.\d+)?$".to_string()),
            shapes: vec![
                (
                    Shape::AttributeOf,
                    compile(r"^[Tt]he\s+(\w+)\s+of\s+(.+?)\s+(?:is|was)\s+(.+)$".to_string()),
                ),
                (
                    Shape::Possessive,
                    compile(format!(r"^({})'s\s+(\w+)\s+(?:is|was)\s+(.+)$", NAME)),
                ),
                (
                    Shape::Named,
                    compile(
                        r"^(?:(?:[Aa]n?|[Tt]he)\s+)?([\w-]+(?:\s+[\w-]+){0,3}?)\s+(?:is\s+|was\s+)?(?:named|called)\s+(.+)$"
                            .to_string(),
                    ),
                ),
                (Shape::Knows, compile(format!(r"^({})\s+knows\s+(.+)$", NAME))),
                (
                    Shape::Has,
                    compile(format!(r"^({})\s+(?:has|had)\s+(?:(?:an?|the)\s+)?(.+)$", NAME)),
                ),
                (
                    Shape::IsA,
                    compile(format!(r"^({})\s+(?:is|was)\s+(?:(?:an?|the)\s+)?(.+)$", NAME)),
                ),
            ],
        }
    })
}

/// Build a fact whose span starts at `start` and covers `text`
pub fn create_fact(
    subject: impl Into<String>,
    predicate: impl Into<String>,
    object: impl Into<CanonValue>,
    text: impl Into<String>,
    start: usize,
    scope: Option<&str>,
) -> GateResult<CanonicalFact> {
    let text = text.into();
    let source_span = SourceSpan {
        start,
        end: start + text.len(),
        text,
    };
    let mut fact = CanonicalFact {
        id: String::new(),
        subject: subject.into(),
        predicate: predicate.into(),
        object: object.into(),
        source_span,
        scope: scope.map(str::to_string),
    };
    fact.id = compute_fact_id(&fact)?;
    Ok(fact)
}

/// Hash of span, subject, predicate, object and scope
pub fn compute_fact_id(fact: &CanonicalFact) -> GateResult<String> {
    let span = &fact.source_span;
    let body = CanonValue::object([
        (
            "sourceSpan",
            CanonValue::object([
                ("start", CanonValue::Number(span.start as f64)),
                ("end", CanonValue::Number(span.end as f64)),
                ("text", CanonValue::from(span.text.as_str())),
            ]),
        ),
        ("subject", CanonValue::from(fact.subject.as_str())),
        ("predicate", CanonValue::from(fact.predicate.as_str())),
        ("object", fact.object.clone()),
        ("scope", CanonValue::from(fact.scope.clone())),
    ]);
    Ok(hash_canonical(&body)?)
}

/// Extract every fact from `text`, sorted by span and deduplicated
pub fn extract_facts(text: &str, context: Option<&str>) -> GateResult<Vec<CanonicalFact>> {
    let p = patterns();
    let mut facts = Vec::new();
    let mut marked_spans = Vec::new();

    for caps in p.marked.captures_iter(text) {
        let (Some(whole), Some(subject), Some(predicate), Some(object)) =
            (caps.get(0), caps.get(1), caps.get(2), caps.get(3))
        else {
            continue;
        };
        marked_spans.push((whole.start(), whole.end()));
        facts.push(create_fact(
            subject.as_str().trim(),
            predicate.as_str().to_uppercase(),
            infer_object(object.as_str()),
            whole.as_str(),
            whole.start(),
            context,
        )?);
    }

    for sentence in p.sentence.find_iter(text) {
        let raw = sentence.as_str();
        let body = raw.trim();
        if body.is_empty() {
            continue;
        }
        let start = sentence.start() + (raw.len() - raw.trim_start().len());
        let end = start + body.len();
        if marked_spans.iter().any(|&(s, e)| s < end && start < e) {
            continue;
        }
        if let Some((subject, predicate, object)) = match_sentence(body) {
            facts.push(create_fact(subject, predicate, object, body, start, context)?);
        }
    }

    Ok(deduplicate_facts(sort_facts(facts)))
}

fn match_sentence(body: &str) -> Option<(String, String, CanonValue)> {
    for (shape, regex) in &patterns().shapes {
        let Some(caps) = regex.captures(body) else {
            continue;
        };
        let group = |i: usize| caps.get(i).map(|m| m.as_str().trim()).unwrap_or_default();
        let triple = match shape {
            Shape::AttributeOf => (group(2), attribute_predicate(group(1)), group(3)),
            Shape::Possessive => (group(1), attribute_predicate(group(2)), group(3)),
            Shape::Named => (group(1), "HAS_NAME".to_string(), group(2)),
            Shape::Knows => (group(1), "KNOWS".to_string(), group(2)),
            Shape::Has => (group(1), "HAS_ATTRIBUTE".to_string(), group(2)),
            Shape::IsA => (group(1), "IS_A".to_string(), group(2)),
        };
        let (subject, predicate, object) = triple;
        if subject.is_empty() || object.is_empty() {
            continue;
        }
        return Some((subject.to_string(), predicate, infer_object(object)));
    }
    None
}

/// `age` -> `HAS_AGE`
fn attribute_predicate(word: &str) -> String {
    let slug: String = word
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_uppercase() } else { '_' })
        .collect();
    format!("HAS_{}", slug)
}

/// Numeric object text becomes a number, anything else stays a string
fn infer_object(text: &str) -> CanonValue {
    let text = text.trim();
    if patterns().number.is_match(text) {
        if let Ok(n) = text.parse::<f64>() {
            if n.is_finite() {
                return CanonValue::Number(n);
            }
        }
    }
    CanonValue::from(text)
}

/// Stable sort by `(start, end)`
pub fn sort_facts(mut facts: Vec<CanonicalFact>) -> Vec<CanonicalFact> {
    facts.sort_by_key(|f| (f.source_span.start, f.source_span.end));
    facts
}

/// Drop repeated ids, keeping the first occurrence
pub fn deduplicate_facts(facts: Vec<CanonicalFact>) -> Vec<CanonicalFact> {
    let mut seen = HashSet::new();
    facts.into_iter().filter(|f| seen.insert(f.id.clone())).collect()
}

/// Structural check of a fact record
pub fn is_valid_fact(fact: &CanonicalFact) -> bool {
    let span = &fact.source_span;
    fact.id.len() == 64
        && fact.id.chars().all(|c| c.is_ascii_hexdigit())
        && !fact.subject.trim().is_empty()
        && !fact.predicate.trim().is_empty()
        && span.start <= span.end
        && span.end - span.start == span.text.len()
        && compute_fact_id(fact).map(|id| id == fact.id).unwrap_or(false)
}
