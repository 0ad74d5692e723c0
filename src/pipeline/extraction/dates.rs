//! Date and date-range recognition over normalized syllabus text.
//!
//! Each rule in [`DatePattern::ORDERED`] scans the whole text independently.
//! Every match must resolve to a real calendar date or it is dropped.
//! Overlapping matches are then adjudicated strictly by confidence; when two
//! confidences tie, the rule evaluated first wins.

use std::sync::LazyLock;

use chrono::{Datelike, Local, NaiveDate, Weekday};
use regex::{Captures, Regex};

use super::types::{DateMatch, DatePattern};

/// Confidence multiplier for numeric dates readable as both M/D and D/M.
const AMBIGUOUS_NUMERIC_PENALTY: f32 = 0.9;

/// Confidence multiplier when the written weekday disagrees with the date.
const WEEKDAY_MISMATCH_PENALTY: f32 = 0.7;

const MONTHS_FULL: &str =
    "january|february|march|april|may|june|july|august|september|october|november|december";
const MONTHS_ABBR: &str = "jan|feb|mar|apr|jun|jul|aug|sept|sep|oct|nov|dec";
const MONTHS_ANY: &str = "january|february|march|april|may|june|july|august|september|october|november|december|jan|feb|mar|apr|jun|jul|aug|sept|sep|oct|nov|dec";
const WEEKDAYS: &str =
    "monday|mon|tuesday|tues|tue|wednesday|wed|thursday|thurs|thur|thu|friday|fri|saturday|sat|sunday|sun";
const ORDINAL: &str = "(?:st|nd|rd|th)?";

/// Words that turn a range's end number into a quantity: "Oct 3 - 10 points".
const QUANTITY_UNITS: &[&str] = &[
    "point", "points", "pt", "pts", "percent", "question", "questions", "minute", "minutes",
    "min", "mins", "mark", "marks", "page", "pages", "word", "words", "hour", "hours",
];

static FULL_DATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"(?i)\b({MONTHS_FULL})\s+(\d{{1,2}}){ORDINAL},?\s+(\d{{4}})\b")).unwrap()
});

static ABBREV_DATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"(?i)\b({MONTHS_ABBR})\.?\s+(\d{{1,2}}){ORDINAL},?\s+(\d{{4}})\b")).unwrap()
});

static NUMERIC_DATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(\d{1,2})/(\d{1,2})/(\d{4}|\d{2})\b").unwrap());

static ISO_DATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(\d{4})-(\d{1,2})-(\d{1,2})\b").unwrap());

static WEEKDAY_DATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"(?i)\b({WEEKDAYS})\.?,?\s+({MONTHS_ANY})\.?\s+(\d{{1,2}}){ORDINAL}(?:,?\s+(\d{{4}}))?\b"
    ))
    .unwrap()
});

static MONTH_DAY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"(?i)\b({MONTHS_ANY})\.?\s+(\d{{1,2}}){ORDINAL}\b")).unwrap()
});

static WEEK_OF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"(?i)\bweek\s+of\s+({MONTHS_ANY})\.?\s+(\d{{1,2}}){ORDINAL}(?:,?\s+(\d{{4}}))?\b"
    ))
    .unwrap()
});

static DATE_RANGE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"(?i)\b({MONTHS_ANY})\.?\s+(\d{{1,2}}){ORDINAL}\s*(?:-|–|—|to|through|thru)\s*(?:({MONTHS_ANY})\.?\s+)?(\d{{1,2}}){ORDINAL}(?:,?\s+(\d{{4}}))?\b"
    ))
    .unwrap()
});

fn regex_for(pattern: DatePattern) -> &'static Regex {
    match pattern {
        DatePattern::FullDate => &FULL_DATE,
        DatePattern::AbbrevDate => &ABBREV_DATE,
        DatePattern::NumericDate => &NUMERIC_DATE,
        DatePattern::IsoDate => &ISO_DATE,
        DatePattern::WeekdayDate => &WEEKDAY_DATE,
        DatePattern::MonthDay => &MONTH_DAY,
        DatePattern::WeekOf => &WEEK_OF,
        DatePattern::Range => &DATE_RANGE,
    }
}

/// A resolved match before it is positioned in the text.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Resolved {
    date: NaiveDate,
    end_date: Option<NaiveDate>,
    multiplier: f32,
}

impl Resolved {
    fn single(date: NaiveDate) -> Self {
        Self {
            date,
            end_date: None,
            multiplier: 1.0,
        }
    }
}

/// Scans text for date references.
#[derive(Debug, Clone)]
pub struct DateExtractor {
    default_year: i32,
}

impl DateExtractor {
    /// Year-less dates resolve against `default_year`.
    pub fn new(default_year: i32) -> Self {
        Self { default_year }
    }

    /// Use `default_year` when given, otherwise the current local year.
    pub fn with_default_year(default_year: Option<i32>) -> Self {
        Self::new(default_year.unwrap_or_else(|| Local::now().year()))
    }

    pub fn default_year(&self) -> i32 {
        self.default_year
    }

    /// All surviving date matches, sorted by source offset.
    pub fn extract(&self, text: &str) -> Vec<DateMatch> {
        let mut found = Vec::new();
        for pattern in DatePattern::ORDERED {
            for caps in regex_for(pattern).captures_iter(text) {
                let Some(whole) = caps.get(0) else { continue };
                let Some(resolved) = self.resolve(pattern, &caps, text) else {
                    continue;
                };
                found.push(DateMatch {
                    start: whole.start(),
                    end: whole.end(),
                    text: whole.as_str().to_string(),
                    date: resolved.date,
                    end_date: resolved.end_date,
                    confidence: (pattern.base_confidence() * resolved.multiplier).clamp(0.0, 1.0),
                    pattern,
                    is_range: pattern == DatePattern::Range,
                });
            }
        }

        let survivors = resolve_overlaps(found);
        tracing::debug!(matches = survivors.len(), "Date extraction complete");
        survivors
    }

    fn resolve(&self, pattern: DatePattern, caps: &Captures<'_>, text: &str) -> Option<Resolved> {
        match pattern {
            DatePattern::FullDate | DatePattern::AbbrevDate => {
                let month = month_number(caps.get(1)?.as_str())?;
                let day = caps.get(2)?.as_str().parse().ok()?;
                let year = expand_year(caps.get(3)?.as_str())?;
                NaiveDate::from_ymd_opt(year, month, day).map(Resolved::single)
            }
            DatePattern::NumericDate => {
                let first: u32 = caps.get(1)?.as_str().parse().ok()?;
                let second: u32 = caps.get(2)?.as_str().parse().ok()?;
                let year = expand_year(caps.get(3)?.as_str())?;
                resolve_numeric(year, first, second)
            }
            DatePattern::IsoDate => {
                let year = caps.get(1)?.as_str().parse().ok()?;
                let month = caps.get(2)?.as_str().parse().ok()?;
                let day = caps.get(3)?.as_str().parse().ok()?;
                NaiveDate::from_ymd_opt(year, month, day).map(Resolved::single)
            }
            DatePattern::WeekdayDate => {
                let written = weekday_from_name(caps.get(1)?.as_str())?;
                let month = month_number(caps.get(2)?.as_str())?;
                let day = caps.get(3)?.as_str().parse().ok()?;
                let year = self.year_or_default(caps.get(4).map(|m| m.as_str()))?;
                let date = NaiveDate::from_ymd_opt(year, month, day)?;
                let multiplier = if date.weekday() == written {
                    1.0
                } else {
                    WEEKDAY_MISMATCH_PENALTY
                };
                Some(Resolved {
                    date,
                    end_date: None,
                    multiplier,
                })
            }
            DatePattern::MonthDay => {
                let month = month_number(caps.get(1)?.as_str())?;
                let day = caps.get(2)?.as_str().parse().ok()?;
                NaiveDate::from_ymd_opt(self.default_year, month, day).map(Resolved::single)
            }
            DatePattern::WeekOf => {
                let month = month_number(caps.get(1)?.as_str())?;
                let day = caps.get(2)?.as_str().parse().ok()?;
                let year = self.year_or_default(caps.get(3).map(|m| m.as_str()))?;
                NaiveDate::from_ymd_opt(year, month, day).map(Resolved::single)
            }
            DatePattern::Range => {
                if followed_by_quantity_unit(text.get(caps.get(0)?.end()..)?) {
                    return None;
                }
                let start_month = month_number(caps.get(1)?.as_str())?;
                let start_day = caps.get(2)?.as_str().parse().ok()?;
                let end_month = match caps.get(3) {
                    Some(m) => month_number(m.as_str())?,
                    None => start_month,
                };
                let end_day = caps.get(4)?.as_str().parse().ok()?;
                // Both ends share one year, even when the range crosses New Year.
                let year = self.year_or_default(caps.get(5).map(|m| m.as_str()))?;
                let date = NaiveDate::from_ymd_opt(year, start_month, start_day)?;
                let end_date = NaiveDate::from_ymd_opt(year, end_month, end_day)?;
                Some(Resolved {
                    date,
                    end_date: Some(end_date),
                    multiplier: 1.0,
                })
            }
        }
    }

    fn year_or_default(&self, raw: Option<&str>) -> Option<i32> {
        match raw {
            Some(y) => expand_year(y),
            None => Some(self.default_year),
        }
    }
}

/// Month/day first. Falls back to day/month only when month/day is not a
/// real date; a reading that works both ways is penalized.
fn resolve_numeric(year: i32, first: u32, second: u32) -> Option<Resolved> {
    if let Some(date) = NaiveDate::from_ymd_opt(year, first, second) {
        let ambiguous = first <= 12 && second <= 12 && first != second;
        return Some(Resolved {
            date,
            end_date: None,
            multiplier: if ambiguous { AMBIGUOUS_NUMERIC_PENALTY } else { 1.0 },
        });
    }
    NaiveDate::from_ymd_opt(year, second, first).map(Resolved::single)
}

/// True when the next token is `%` or a unit word.
fn followed_by_quantity_unit(rest: &str) -> bool {
    let rest = rest.trim_start();
    if rest.starts_with('%') {
        return true;
    }
    let word: String = rest
        .chars()
        .take_while(|c| c.is_alphabetic())
        .collect::<String>()
        .to_lowercase();
    QUANTITY_UNITS.contains(&word.as_str())
}

/// Keep the highest-confidence match of every overlapping group, then
/// restore source order.
fn resolve_overlaps(mut found: Vec<DateMatch>) -> Vec<DateMatch> {
    // Stable sort: equal confidences keep evaluation order.
    found.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut kept: Vec<DateMatch> = Vec::with_capacity(found.len());
    for candidate in found {
        if kept.iter().all(|k| !k.overlaps(&candidate)) {
            kept.push(candidate);
        }
    }
    kept.sort_by_key(|m| m.start);
    kept
}

/// Two-digit years: below 50 is 20xx, otherwise 19xx.
fn expand_year(raw: &str) -> Option<i32> {
    let value: i32 = raw.parse().ok()?;
    if raw.len() == 2 {
        Some(if value < 50 { 2000 + value } else { 1900 + value })
    } else {
        Some(value)
    }
}

fn month_number(name: &str) -> Option<u32> {
    let lower = name.to_lowercase();
    let key = lower.get(..3)?;
    let month = match key {
        "jan" => 1,
        "feb" => 2,
        "mar" => 3,
        "apr" => 4,
        "may" => 5,
        "jun" => 6,
        "jul" => 7,
        "aug" => 8,
        "sep" => 9,
        "oct" => 10,
        "nov" => 11,
        "dec" => 12,
        _ => return None,
    };
    Some(month)
}

fn weekday_from_name(name: &str) -> Option<Weekday> {
    let lower = name.to_lowercase();
    let weekday = match lower.get(..3)? {
        "mon" => Weekday::Mon,
        "tue" => Weekday::Tue,
        "wed" => Weekday::Wed,
        "thu" => Weekday::Thu,
        "fri" => Weekday::Fri,
        "sat" => Weekday::Sat,
        "sun" => Weekday::Sun,
        _ => return None,
    };
    Some(weekday)
}
