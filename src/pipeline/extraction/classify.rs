//! Per-line event-type classification with contextual flags.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;

use super::types::{ClassificationResult, ContextFlags, EventType};

/// Bonus per extra keyword matched from the winning family.
const EXTRA_KEYWORD_BONUS: f32 = 0.1;
const MAX_EXTRA_KEYWORD_BONUS: f32 = 0.2;
/// Bonus per contextual signal (due phrasing, weight, numbering).
const FLAG_BONUS: f32 = 0.1;
/// Lines shorter than this (in chars) carry little context.
const SHORT_LINE_CHARS: usize = 15;
const SHORT_LINE_PENALTY: f32 = 0.8;
const NEGATION_PENALTY: f32 = 0.5;

struct Keyword {
    /// Canonical lowercase term reported in `ClassificationResult::keywords`.
    term: &'static str,
    weight: f32,
    regex: Regex,
}

struct Family {
    event_type: EventType,
    keywords: Vec<Keyword>,
}

fn keyword(term: &'static str, pattern: &str, weight: f32) -> Keyword {
    Keyword {
        term,
        weight,
        regex: Regex::new(&format!(r"(?i)\b(?:{pattern})\b")).unwrap(),
    }
}

/// Families in tie-break order. Specific terms weigh more than generic ones,
/// so "midterm" outranks "test".
static FAMILIES: LazyLock<Vec<Family>> = LazyLock::new(|| {
    vec![
        Family {
            event_type: EventType::Final,
            keywords: vec![
                keyword("final exam", r"final\s+exam(?:ination)?s?", 0.75),
                keyword("final", r"finals?", 0.6),
            ],
        },
        Family {
            event_type: EventType::Midterm,
            keywords: vec![
                keyword("midterm", r"mid-?terms?", 0.75),
                keyword("exam", r"exams?|examinations?", 0.45),
                keyword("test", r"tests?", 0.45),
            ],
        },
        Family {
            event_type: EventType::Quiz,
            keywords: vec![keyword("quiz", r"quiz(?:zes)?|pop\s+quiz", 0.7)],
        },
        Family {
            event_type: EventType::Assignment,
            keywords: vec![
                keyword("assignment", r"assignments?", 0.7),
                keyword("homework", r"homeworks?", 0.7),
                keyword("hw", r"hw\s*\d*", 0.65),
                keyword("problem set", r"problem\s+sets?|psets?", 0.7),
                keyword("project", r"projects?", 0.65),
                keyword("essay", r"essays?", 0.65),
                keyword("paper", r"papers?", 0.55),
            ],
        },
        Family {
            event_type: EventType::Lab,
            keywords: vec![
                keyword("lab", r"labs?|laborator(?:y|ies)", 0.7),
                keyword("practical", r"practicals?", 0.5),
            ],
        },
        Family {
            event_type: EventType::Lecture,
            keywords: vec![
                keyword("lecture", r"lectures?", 0.7),
                keyword("seminar", r"seminars?", 0.65),
                keyword("tutorial", r"tutorials?", 0.6),
                keyword("class", r"class(?:es)?", 0.45),
            ],
        },
    ]
});

static DUE_PHRASE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:due|submit(?:ted|ssion)?|deadline|turn(?:ed)?\s+in|hand(?:ed)?\s+in)\b")
        .unwrap()
});

static WEIGHT_PHRASE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:\b\d+(?:\.\d+)?\s*%|\b(?:points?|pts|marks|worth|weight(?:ed|ing)?)\b)")
        .unwrap()
});

const NUMBERED_TERMS: &str =
    "assignment|homework|hw|quiz|lab|lecture|project|exam|midterm|test|essay|paper|problem set|pset|unit|chapter|module|week|part";

static NUMBERED_ITEM: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"(?i)\b(?:{NUMBERED_TERMS})s?(?:\s*#?\s*\d+\b|\s+#?\s*(?:[ivx]+|[a-z]|one|two|three|four|five|six|seven|eight|nine|ten)\b)"
    ))
    .unwrap()
});

static ORDINAL_ITEM: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"(?i)\b(?:first|second|third|fourth|fifth|sixth|seventh|eighth|ninth|tenth|\d+(?:st|nd|rd|th))\s+(?:{NUMBERED_TERMS})\b"
    ))
    .unwrap()
});

static NEGATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:no\s+class(?:es)?|no\s+lecture|no\s+lab|cancell?ed|postponed|class\s+will\s+not\s+meet)\b",
    )
    .unwrap()
});

/// True when `word` is, on its own, a keyword of any event family
/// ("Tutorial", "Labs", "Quizzes").
pub fn is_event_keyword(word: &str) -> bool {
    FAMILIES
        .iter()
        .flat_map(|family| &family.keywords)
        .any(|kw| kw.regex.is_match(word))
}

/// Detect contextual signals in a line independently of its type.
pub fn detect_flags(line: &str) -> ContextFlags {
    ContextFlags {
        has_due_date: DUE_PHRASE.is_match(line),
        has_weight: WEIGHT_PHRASE.is_match(line),
        has_numbering: NUMBERED_ITEM.is_match(line) || ORDINAL_ITEM.is_match(line),
        has_negation: NEGATION.is_match(line),
    }
}

/// Keyword-family scorer for syllabus lines.
#[derive(Debug, Clone, Copy, Default)]
pub struct LineClassifier;

impl LineClassifier {
    pub fn new() -> Self {
        Self
    }

    pub fn classify(&self, line: &str) -> ClassificationResult {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return ClassificationResult::other();
        }

        let mut best: Option<(EventType, f32, BTreeSet<String>)> = None;
        for family in FAMILIES.iter() {
            let mut matched = BTreeSet::new();
            let mut top_weight = 0.0_f32;
            for kw in &family.keywords {
                if kw.regex.is_match(trimmed) {
                    matched.insert(kw.term.to_string());
                    top_weight = top_weight.max(kw.weight);
                }
            }
            if matched.is_empty() {
                continue;
            }
            let extra = (matched.len() as f32 - 1.0) * EXTRA_KEYWORD_BONUS;
            let score = top_weight + extra.min(MAX_EXTRA_KEYWORD_BONUS);
            // Strictly greater: earlier families win ties.
            if best.as_ref().map_or(true, |(_, s, _)| score > *s) {
                best = Some((family.event_type, score, matched));
            }
        }

        let flags = detect_flags(trimmed);
        let Some((event_type, base, keywords)) = best else {
            return ClassificationResult {
                flags,
                ..ClassificationResult::other()
            };
        };

        let mut confidence = base;
        for present in [flags.has_due_date, flags.has_weight, flags.has_numbering] {
            if present {
                confidence += FLAG_BONUS;
            }
        }
        if trimmed.chars().count() < SHORT_LINE_CHARS {
            confidence *= SHORT_LINE_PENALTY;
        }
        if flags.has_negation && !(flags.has_numbering || flags.has_weight) {
            confidence *= NEGATION_PENALTY;
        }

        ClassificationResult {
            event_type,
            confidence: confidence.clamp(0.0, 1.0),
            keywords,
            flags,
        }
    }

    /// Classify every line of a normalized document, index-aligned.
    pub fn classify_lines<'a, I>(&self, lines: I) -> Vec<ClassificationResult>
    where
        I: IntoIterator<Item = &'a str>,
    {
        lines.into_iter().map(|l| self.classify(l)).collect()
    }
}
