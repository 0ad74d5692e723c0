use std::collections::BTreeSet;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Academic event categories recognised by the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    Assignment,
    Quiz,
    Midterm,
    Final,
    Lab,
    Lecture,
    Other,
}

impl EventType {
    pub const ALL: [EventType; 7] = [
        EventType::Assignment,
        EventType::Quiz,
        EventType::Midterm,
        EventType::Final,
        EventType::Lab,
        EventType::Lecture,
        EventType::Other,
    ];

    /// Wire name, e.g. `"ASSIGNMENT"`.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Assignment => "ASSIGNMENT",
            EventType::Quiz => "QUIZ",
            EventType::Midterm => "MIDTERM",
            EventType::Final => "FINAL",
            EventType::Lab => "LAB",
            EventType::Lecture => "LECTURE",
            EventType::Other => "OTHER",
        }
    }

    /// Parse a type name leniently (case-insensitive, a few common aliases).
    /// Returns `None` for anything unrecognised.
    pub fn parse(raw: &str) -> Option<EventType> {
        match raw.trim().to_lowercase().replace(['-', ' '], "_").as_str() {
            "assignment" | "homework" | "project" | "essay" => Some(EventType::Assignment),
            "quiz" => Some(EventType::Quiz),
            "midterm" | "mid_term" | "midterm_exam" | "exam" | "test" => Some(EventType::Midterm),
            "final" | "final_exam" => Some(EventType::Final),
            "lab" | "laboratory" => Some(EventType::Lab),
            "lecture" | "class" => Some(EventType::Lecture),
            "other" => Some(EventType::Other),
            _ => None,
        }
    }

    /// Human label used when a title cannot be derived from the source line.
    pub fn default_label(&self) -> &'static str {
        match self {
            EventType::Assignment => "Assignment",
            EventType::Quiz => "Quiz",
            EventType::Midterm => "Midterm",
            EventType::Final => "Final Exam",
            EventType::Lab => "Lab",
            EventType::Lecture => "Lecture",
            EventType::Other => "Event",
        }
    }

    /// Types that get a default 90-minute duration when no end is known.
    pub fn has_default_duration(&self) -> bool {
        matches!(self, EventType::Lab | EventType::Lecture)
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which date rule produced a match. Each rule declares its base confidence;
/// overlap adjudication compares confidences only, and declaration order
/// (`DatePattern::ORDERED`) decides ties.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DatePattern {
    FullDate,
    AbbrevDate,
    NumericDate,
    IsoDate,
    WeekdayDate,
    MonthDay,
    WeekOf,
    Range,
}

impl DatePattern {
    /// Evaluation order. Earlier rules win confidence ties.
    pub const ORDERED: [DatePattern; 8] = [
        DatePattern::FullDate,
        DatePattern::AbbrevDate,
        DatePattern::NumericDate,
        DatePattern::IsoDate,
        DatePattern::WeekdayDate,
        DatePattern::MonthDay,
        DatePattern::WeekOf,
        DatePattern::Range,
    ];

    pub fn base_confidence(&self) -> f32 {
        match self {
            DatePattern::FullDate => 0.95,
            DatePattern::AbbrevDate => 0.90,
            DatePattern::NumericDate => 0.85,
            DatePattern::IsoDate => 0.92,
            DatePattern::WeekdayDate => 0.88,
            DatePattern::MonthDay => 0.75,
            DatePattern::WeekOf => 0.63,
            DatePattern::Range => 0.80,
        }
    }

    pub fn priority(&self) -> usize {
        Self::ORDERED
            .iter()
            .position(|p| p == self)
            .unwrap_or(Self::ORDERED.len())
    }
}

/// A date reference found in the normalized text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DateMatch {
    /// Byte offset of the first character, inclusive.
    pub start: usize,
    /// Byte offset one past the last character.
    pub end: usize,
    pub text: String,
    /// Resolved calendar date. Matches that fail calendar construction are
    /// rejected by the extractor, so this is always concrete.
    pub date: NaiveDate,
    /// Inclusive last day for ranges.
    pub end_date: Option<NaiveDate>,
    pub confidence: f32,
    pub pattern: DatePattern,
    pub is_range: bool,
}

impl DateMatch {
    pub fn overlaps(&self, other: &DateMatch) -> bool {
        self.start < other.end && other.start < self.end
    }
}

/// Contextual signals detected on a line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextFlags {
    pub has_due_date: bool,
    pub has_weight: bool,
    pub has_numbering: bool,
    pub has_negation: bool,
}

/// Per-line event-type guess.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub event_type: EventType,
    pub confidence: f32,
    pub keywords: BTreeSet<String>,
    pub flags: ContextFlags,
}

impl ClassificationResult {
    pub fn other() -> Self {
        Self {
            event_type: EventType::Other,
            confidence: 0.0,
            keywords: BTreeSet::new(),
            flags: ContextFlags::default(),
        }
    }
}
