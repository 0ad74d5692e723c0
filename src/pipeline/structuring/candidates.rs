//! Fuse per-line classifications with date matches into event candidates.

use std::collections::HashSet;
use std::ops::RangeInclusive;
use std::sync::LazyLock;

use chrono::{Duration, NaiveTime};
use regex::Regex;
use uuid::Uuid;

use super::dedup::deduplicate;
use super::types::EventCandidate;
use crate::pipeline::extraction::{
    is_event_keyword, ClassificationResult, DateMatch, EventType, LineClassifier,
};

pub const DEFAULT_MIN_CONFIDENCE: f32 = 0.3;
pub const DEFAULT_CONTEXT_WINDOW: usize = 2;

const MAX_TITLE_CHARS: usize = 100;
const MIN_TITLE_CHARS: usize = 3;
const MAX_LOCATION_CHARS: usize = 50;
const NOTE_CHARS: RangeInclusive<usize> = 3..=200;
const DEFAULT_DURATION_MINUTES: i64 = 90;
const SHORT_LINE_CHARS: usize = 20;

/// Words that never start a location. Event keywords are checked
/// separately through the classifier's families.
const EXCLUDED_LOCATION_WORDS: &[&str] = &[
    "january", "february", "march", "april", "may", "june", "july", "august", "september",
    "october", "november", "december", "jan", "feb", "mar", "apr", "jun", "jul", "aug", "sep",
    "sept", "oct", "nov", "dec", "monday", "tuesday", "wednesday", "thursday", "friday",
    "saturday", "sunday", "mon", "tue", "tues", "wed", "thu", "thur", "thurs", "fri", "sat", "sun",
    "week", "unit", "chapter", "module", "part", "section", "problem", "set", "pset", "due",
    "page", "question", "day", "term", "fall", "spring", "summer", "winter", "midnight", "noon",
    "tonight", "today", "tomorrow",
];

static LEAD_IN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?:due|submit|turn\s+in|hand\s+in)\b[\s:,;-]*").unwrap()
});

static DUE_TAIL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)[\s,;:–—-]*\bdue\b.*$").unwrap());

/// A date text plus the preposition that introduced it.
fn date_phrase_regex(date_text: &str) -> Option<Regex> {
    Regex::new(&format!(r"(?i)(?:\b(?:on|by|at)\s+)?{}", regex::escape(date_text))).ok()
}

static DUE_WORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bdue\b(?:\s+(?:on|by))?").unwrap());

static PARENTHETICAL: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s*\([^)]*\)").unwrap());

static PARENTHETICAL_CONTENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\(([^)]*)\)").unwrap());

static TRAILING_CONNECTORS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(?:[\s,;:–—-]|\b(?:on|by|at|for|and)\b)*$").unwrap());

static IDENTIFIER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:assignments?|homework|hw|quiz(?:zes)?|labs?|lectures?|projects?|exams?|midterms?|tests?|essays?|papers?|psets?|problem\s+sets?)(?:\s*#?\s*(\d+)\b|\s+#?\s*([ivx]+|[a-z])\b)",
    )
    .unwrap()
});

static TIME_12H: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(\d{1,2})(?::(\d{2}))?\s*([ap])\.?m\b").unwrap());

static TIME_24H: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b([01]?\d|2[0-3]):([0-5]\d)\b").unwrap());

static ROOM: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(room|rm|hall|lab|building|bldg)\.?\s+#?([A-Za-z]*\d[A-Za-z0-9-]*)\b")
        .unwrap()
});

static CAPITALIZED_NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b([A-Z][a-z]+)\s+(\d{1,4}[A-Za-z]?)\b").unwrap());

static IN_AT_PLACE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:in|at)\s+([A-Z][A-Za-z0-9-]*(?:\s+[A-Z0-9][A-Za-z0-9-]*){0,3})").unwrap()
});

static LOCATION_LABEL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\blocation:\s*([A-Za-z0-9][A-Za-z0-9 -]*)").unwrap());

static NOTE_SEPARATOR: LazyLock<Regex> = LazyLock::new(|| Regex::new(r": | [-–—] ").unwrap());

static NOTE_CLAUSE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:includes?|including|covers?|with|on|about)\s+(.+)$").unwrap()
});

#[derive(Debug, Clone, PartialEq)]
pub struct CandidateConfig {
    /// Lines and candidates below this confidence are discarded.
    pub min_confidence: f32,
    pub deduplicate: bool,
    pub course_code: Option<String>,
    /// Lines searched on each side when a line carries no date of its own.
    pub context_window: usize,
}

impl Default for CandidateConfig {
    fn default() -> Self {
        Self {
            min_confidence: DEFAULT_MIN_CONFIDENCE,
            deduplicate: true,
            course_code: None,
            context_window: DEFAULT_CONTEXT_WINDOW,
        }
    }
}

/// Candidates plus per-stage counts for diagnostics.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CandidateBatch {
    pub candidates: Vec<EventCandidate>,
    pub lines_total: usize,
    pub lines_classified: usize,
    pub generated: usize,
    pub duplicates_removed: usize,
}

pub struct EventCandidateBuilder {
    config: CandidateConfig,
    classifier: LineClassifier,
}

impl EventCandidateBuilder {
    pub fn new(config: CandidateConfig) -> Self {
        Self {
            config,
            classifier: LineClassifier::new(),
        }
    }

    /// Build candidates from normalized `text` and the date matches found in it.
    pub fn build(&self, text: &str, dates: &[DateMatch]) -> CandidateBatch {
        let lines: Vec<&str> = text.split('\n').collect();
        let mut candidates = Vec::new();
        let mut lines_classified = 0usize;

        for (index, line) in lines.iter().enumerate() {
            let class = self.classifier.classify(line);
            if class.event_type == EventType::Other || class.confidence < self.config.min_confidence {
                continue;
            }
            lines_classified += 1;

            let on_line = dates_in(line, dates);
            for date in self.dates_for_line(&lines, index, dates) {
                if let Some(candidate) = self.candidate_for(index, line, &class, date, &on_line) {
                    candidates.push(candidate);
                }
            }
        }

        let generated = candidates.len();
        let (candidates, duplicates_removed) = if self.config.deduplicate {
            deduplicate(candidates)
        } else {
            (candidates, 0)
        };

        tracing::debug!(
            lines = lines.len(),
            classified = lines_classified,
            generated,
            kept = candidates.len(),
            duplicates_removed,
            "Candidate build complete"
        );

        CandidateBatch {
            candidates,
            lines_total: lines.len(),
            lines_classified,
            generated,
            duplicates_removed,
        }
    }

    /// Dates written on the line itself, otherwise distinct dates from the
    /// surrounding window.
    fn dates_for_line<'d>(
        &self,
        lines: &[&str],
        index: usize,
        dates: &'d [DateMatch],
    ) -> Vec<&'d DateMatch> {
        let on_line = dates_in(lines[index], dates);
        if !on_line.is_empty() {
            return on_line;
        }

        let lo = index.saturating_sub(self.config.context_window);
        let hi = (index + self.config.context_window).min(lines.len().saturating_sub(1));
        let mut seen = HashSet::new();
        let mut found = Vec::new();
        for (offset, neighbor) in lines[lo..=hi].iter().enumerate() {
            if lo + offset == index {
                continue;
            }
            let lowered = neighbor.to_lowercase();
            for date in dates {
                let key = date.text.to_lowercase();
                if lowered.contains(&key) && seen.insert(key) {
                    found.push(date);
                }
            }
        }
        found
    }

    fn candidate_for(
        &self,
        index: usize,
        line: &str,
        class: &ClassificationResult,
        date: &DateMatch,
        on_line: &[&DateMatch],
    ) -> Option<EventCandidate> {
        let date_texts: Vec<&str> = on_line.iter().map(|d| d.text.as_str()).collect();

        let time = find_clock_time(&date.text).or_else(|| find_clock_time(line));
        let start = date.date.and_time(time.unwrap_or(NaiveTime::MIN));
        let end = match date.end_date {
            Some(end_date) => Some(end_date.and_time(start.time())),
            None if class.event_type.has_default_duration() => {
                Some(start + Duration::minutes(DEFAULT_DURATION_MINUTES))
            }
            None => None,
        };

        let confidence = score_candidate(line, class, date);
        if confidence < self.config.min_confidence {
            return None;
        }

        let id_key = format!("{index}|{}|{}", date.text.to_lowercase(), class.event_type);
        Some(EventCandidate {
            id: Uuid::new_v5(&Uuid::NAMESPACE_OID, id_key.as_bytes()).to_string(),
            course_code: self.config.course_code.clone(),
            event_type: class.event_type,
            title: build_title(line, class, &date_texts),
            start,
            end,
            all_day: time.is_none(),
            location: find_location(line),
            notes: find_notes(line, &date_texts),
            confidence,
            source_line_index: index,
            source_text: line.to_string(),
            keywords: class.keywords.clone(),
            date_matches: vec![date.clone()],
        })
    }
}

/// Distinct date matches whose text appears on `line` (case-insensitive).
fn dates_in<'d>(line: &str, dates: &'d [DateMatch]) -> Vec<&'d DateMatch> {
    let lowered = line.to_lowercase();
    let mut seen = HashSet::new();
    dates
        .iter()
        .filter(|d| {
            let key = d.text.to_lowercase();
            lowered.contains(&key) && seen.insert(key)
        })
        .collect()
}

pub fn score_candidate(line: &str, class: &ClassificationResult, date: &DateMatch) -> f32 {
    let line_conf = class.confidence;
    let date_conf = date.confidence;
    let mut score = 0.6 * line_conf + 0.3 * date_conf;
    if line_conf > 0.7 && date_conf > 0.7 {
        score += 0.1;
    }
    for present in [class.flags.has_due_date, class.flags.has_weight, class.flags.has_numbering] {
        if present {
            score += 0.05;
        }
    }
    if line.trim().chars().count() < SHORT_LINE_CHARS {
        score *= 0.9;
    }
    if class.flags.has_negation {
        score *= 0.5;
    }
    score.clamp(0.0, 1.0)
}

/// Remove every case-insensitive occurrence of `phrase`.
fn strip_phrase(haystack: &str, phrase: &str) -> String {
    match Regex::new(&format!("(?i){}", regex::escape(phrase))) {
        Ok(re) => re.replace_all(haystack, "").into_owned(),
        Err(_) => haystack.to_string(),
    }
}

fn tidy(text: &str) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    let trimmed = TRAILING_CONNECTORS.replace(&collapsed, "");
    trimmed
        .trim_matches(|c: char| c.is_whitespace() || ",;:–—-".contains(c))
        .to_string()
}

pub fn build_title(line: &str, class: &ClassificationResult, date_texts: &[&str]) -> String {
    let mut title = LEAD_IN.replace(line.trim(), "").into_owned();
    title = DUE_TAIL.replace(&title, "").into_owned();
    title = PARENTHETICAL.replace_all(&title, "").into_owned();
    for text in date_texts {
        if let Some(re) = date_phrase_regex(text) {
            title = re.replace_all(&title, "").into_owned();
        }
    }
    let title = tidy(&title);

    let lowered = title.to_lowercase();
    let keeps_keyword = class.keywords.iter().any(|k| lowered.contains(k.as_str()));
    let title = if title.chars().count() < MIN_TITLE_CHARS || !keeps_keyword {
        fallback_title(line, class.event_type)
    } else {
        title
    };
    truncate_title(&title)
}

/// Type label plus any identifier written next to a type keyword.
fn fallback_title(line: &str, event_type: EventType) -> String {
    let label = event_type.default_label();
    let identifier = IDENTIFIER.captures(line).and_then(|caps| {
        caps.get(1)
            .map(|m| m.as_str().to_string())
            .or_else(|| caps.get(2).map(|m| m.as_str().to_uppercase()))
    });
    match identifier {
        Some(id) => format!("{label} {id}"),
        None => label.to_string(),
    }
}

fn truncate_title(title: &str) -> String {
    if title.chars().count() <= MAX_TITLE_CHARS {
        return title.to_string();
    }
    let head: String = title.chars().take(MAX_TITLE_CHARS - 3).collect();
    format!("{}...", head.trim_end())
}

pub fn find_clock_time(text: &str) -> Option<NaiveTime> {
    for caps in TIME_12H.captures_iter(text) {
        let hour: u32 = caps[1].parse().ok()?;
        let minute: u32 = caps.get(2).map_or(Some(0), |m| m.as_str().parse().ok())?;
        if !(1..=12).contains(&hour) {
            continue;
        }
        let pm = caps[3].eq_ignore_ascii_case("p");
        let hour24 = hour % 12 + if pm { 12 } else { 0 };
        if let Some(t) = NaiveTime::from_hms_opt(hour24, minute, 0) {
            return Some(t);
        }
    }
    let caps = TIME_24H.captures(text)?;
    NaiveTime::from_hms_opt(caps[1].parse().ok()?, caps[2].parse().ok()?, 0)
}

fn is_excluded_word(word: &str) -> bool {
    let lower = word.to_lowercase();
    let singular = lower.strip_suffix('s').unwrap_or(&lower);
    EXCLUDED_LOCATION_WORDS.contains(&lower.as_str())
        || EXCLUDED_LOCATION_WORDS.contains(&singular)
        || is_event_keyword(&lower)
}

fn valid_location(raw: &str) -> Option<String> {
    let location = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    let ok = !location.is_empty()
        && location.chars().count() <= MAX_LOCATION_CHARS
        && location
            .chars()
            .all(|c| c.is_alphanumeric() || c == ' ' || c == '-');
    ok.then_some(location)
}

pub fn find_location(line: &str) -> Option<String> {
    let trimmed = line.trim();
    // "Problem Set 2", "Quiz 3": the event's own name.
    let identifiers: Vec<_> = IDENTIFIER.find_iter(trimmed).map(|m| m.range()).collect();
    let names_event = |start: usize, end: usize| identifiers.iter().any(|r| start < r.end && r.start < end);

    for caps in ROOM.captures_iter(trimmed) {
        let (Some(whole), Some(kind)) = (caps.get(0), caps.get(1)) else { continue };
        // "Lab 3: ..." names the event, not the place.
        if whole.start() == 0 && kind.as_str().eq_ignore_ascii_case("lab") {
            continue;
        }
        if let Some(loc) = valid_location(&format!("{} {}", kind.as_str(), &caps[2])) {
            return Some(loc);
        }
    }

    for caps in CAPITALIZED_NUMBER.captures_iter(trimmed) {
        let Some(whole) = caps.get(0) else { continue };
        if is_excluded_word(&caps[1]) || names_event(whole.start(), whole.end()) {
            continue;
        }
        if let Some(loc) = valid_location(&caps[0]) {
            return Some(loc);
        }
    }

    for caps in IN_AT_PLACE.captures_iter(trimmed) {
        let Some(place_match) = caps.get(1) else { continue };
        let place = place_match.as_str();
        let first = place.split_whitespace().next().unwrap_or_default();
        if is_excluded_word(first) || names_event(place_match.start(), place_match.end()) {
            continue;
        }
        if let Some(loc) = valid_location(place) {
            return Some(loc);
        }
    }

    LOCATION_LABEL
        .captures(trimmed)
        .and_then(|caps| valid_location(&caps[1]))
}

fn clean_note(raw: &str, date_texts: &[&str]) -> Option<String> {
    let mut note = raw.to_string();
    for text in date_texts {
        note = strip_phrase(&note, text);
    }
    let note = tidy(&DUE_WORD.replace_all(&note, ""));
    NOTE_CHARS.contains(&note.chars().count()).then_some(note)
}

pub fn find_notes(line: &str, date_texts: &[&str]) -> Option<String> {
    let trimmed = line.trim();

    if let Some(sep) = NOTE_SEPARATOR.find(trimmed) {
        if let Some(note) = clean_note(&trimmed[sep.end()..], date_texts) {
            return Some(note);
        }
    }

    for caps in PARENTHETICAL_CONTENT.captures_iter(trimmed) {
        if let Some(note) = clean_note(&caps[1], date_texts) {
            return Some(note);
        }
    }

    NOTE_CLAUSE
        .captures(trimmed)
        .and_then(|caps| clean_note(&caps[1], date_texts))
}
