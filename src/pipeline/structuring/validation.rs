// Per-item validation shared by heuristic candidates and model output.
// Hard failures drop the single item; soft problems are repaired and warned.

use std::sync::LazyLock;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use regex::Regex;

use super::types::{
    format_timestamp, EventCandidate, RawEvent, ValidatedEvent, ValidationConfig, ValidationIssue,
    ValidationReport, ValidationStats,
};
use crate::pipeline::extraction::EventType;

/// Confidence assumed when an item carries none.
const DEFAULT_CONFIDENCE: f32 = 0.5;

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
];

static ZONE_SUFFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(.*?\d)\s*(?:[zZ]|[+-]\d{2}(?::?\d{2})?)$").unwrap()
});

/// Drop a trailing `Z` or `±HH:MM` offset. Date-only strings such as
/// `2025-09-15` are left alone.
pub fn strip_zone_suffix(raw: &str) -> &str {
    let trimmed = raw.trim();
    let has_time = trimmed.len() > 10 && trimmed.chars().take(19).any(|c| c == ':');
    let date_with_z = trimmed.len() == 11 && trimmed.ends_with(['z', 'Z']);
    if !(has_time || date_with_z) {
        return trimmed;
    }
    match ZONE_SUFFIX.captures(trimmed).and_then(|c| c.get(1)) {
        Some(m) => m.as_str(),
        None => trimmed,
    }
}

/// Parse a zone-naive (or zone-stripped) timestamp. Bare dates map to midnight.
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let text = strip_zone_suffix(raw);
    if text.is_empty() {
        return None;
    }
    for fmt in DATETIME_FORMATS {
        if let Ok(ts) = NaiveDateTime::parse_from_str(text, fmt) {
            return Some(ts);
        }
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .map(|d| d.and_time(NaiveTime::MIN))
}

fn trimmed_non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

pub struct EventValidator {
    config: ValidationConfig,
}

impl EventValidator {
    pub fn new(config: ValidationConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ValidationConfig {
        &self.config
    }

    pub fn validate_candidates(&self, candidates: &[EventCandidate]) -> ValidationReport {
        let items: Vec<RawEvent> = candidates.iter().map(RawEvent::from).collect();
        self.validate(&items)
    }

    /// Partial success: failing items are dropped and reported, the rest continue.
    pub fn validate(&self, items: &[RawEvent]) -> ValidationReport {
        let mut report = ValidationReport {
            stats: ValidationStats {
                total: items.len(),
                ..ValidationStats::default()
            },
            ..ValidationReport::default()
        };

        for (index, item) in items.iter().enumerate() {
            match self.validate_item(index, item, &mut report.stats, &mut report.warnings) {
                Ok(event) => report.events.push(event),
                Err(issue) => report.errors.push(issue),
            }
        }

        report.stats.valid = report.events.len();
        report.stats.invalid = report.errors.len();
        report.valid = report.errors.is_empty();

        if !report.errors.is_empty() || !report.warnings.is_empty() {
            tracing::warn!(
                total = report.stats.total,
                invalid = report.stats.invalid,
                clamped = report.stats.clamped,
                warning_count = report.warnings.len(),
                "Event validation issues detected"
            );
        }
        report
    }

    /// Every item must pass; the first hard failure rejects the batch.
    pub fn validate_all_or_nothing(
        &self,
        items: &[RawEvent],
    ) -> Result<ValidationReport, ValidationIssue> {
        let report = self.validate(items);
        match report.errors.first() {
            Some(issue) => Err(issue.clone()),
            None => Ok(report),
        }
    }

    fn validate_item(
        &self,
        index: usize,
        item: &RawEvent,
        stats: &mut ValidationStats,
        warnings: &mut Vec<String>,
    ) -> Result<ValidatedEvent, ValidationIssue> {
        let issue = |field: &str, message: String| ValidationIssue {
            index,
            field: field.to_string(),
            message,
        };

        let id = trimmed_non_empty(item.id.as_deref())
            .ok_or_else(|| issue("id", "missing or empty id".to_string()))?;

        let raw_type = item.event_type.as_deref().unwrap_or("");
        let event_type = EventType::parse(raw_type)
            .ok_or_else(|| issue("type", format!("unrecognized event type '{raw_type}'")))?;

        let raw_start = item.start.as_deref().unwrap_or("");
        let mut start = parse_timestamp(raw_start)
            .ok_or_else(|| issue("start", format!("unresolvable start '{raw_start}'")))?;

        let mut end = match trimmed_non_empty(item.end.as_deref()) {
            None => None,
            Some(raw_end) => match parse_timestamp(&raw_end) {
                Some(ts) => Some(ts),
                None if self.config.strict => {
                    return Err(issue("end", format!("unresolvable end '{raw_end}'")));
                }
                None => {
                    warnings.push(format!("Event {index}: unparseable end '{raw_end}' dropped"));
                    None
                }
            },
        };

        let title = match trimmed_non_empty(item.title.as_deref()) {
            Some(t) => t,
            None => {
                stats.defaults_applied += 1;
                event_type.default_label().to_string()
            }
        };

        let all_day = match item.all_day {
            Some(flag) => flag,
            None => {
                stats.defaults_applied += 1;
                start.time() == NaiveTime::MIN
            }
        };

        let confidence = match item.confidence {
            None => {
                stats.defaults_applied += 1;
                DEFAULT_CONFIDENCE
            }
            Some(c) if c.is_nan() => {
                warnings.push(format!("Event {index}: confidence NaN replaced with 0"));
                0.0
            }
            Some(c) if !(0.0..=1.0).contains(&c) => {
                warnings.push(format!("Event {index}: confidence {c} clamped to [0,1]"));
                c.clamp(0.0, 1.0) as f32
            }
            Some(c) => c as f32,
        };

        let course_code = match trimmed_non_empty(item.course_code.as_deref()) {
            Some(code) => code,
            None => {
                if !self.config.default_course_code.is_empty() {
                    stats.defaults_applied += 1;
                }
                self.config.default_course_code.trim().to_string()
            }
        };

        let mut clamped = false;
        if let Some(ts) = self.clamp_to_term(start) {
            start = ts;
            clamped = true;
        }
        if let Some(ts) = end.and_then(|e| self.clamp_to_term(e)) {
            end = Some(ts);
            clamped = true;
        }
        if clamped {
            stats.clamped += 1;
            warnings.push(format!("Event {index} ('{title}') clamped to the term window"));
        }

        Ok(ValidatedEvent {
            id,
            course_code,
            event_type,
            title,
            start: format_timestamp(&start),
            end: end.as_ref().map(format_timestamp),
            all_day,
            location: trimmed_non_empty(item.location.as_deref()),
            notes: trimmed_non_empty(item.notes.as_deref()),
            confidence,
        })
    }

    /// `Some(bound)` when `ts` falls outside the configured term window.
    fn clamp_to_term(&self, ts: NaiveDateTime) -> Option<NaiveDateTime> {
        let lower = self.config.term_start.map(|d| d.and_time(NaiveTime::MIN));
        let upper = self
            .config
            .term_end
            .and_then(|d| d.and_hms_milli_opt(23, 59, 59, 999));
        if let (Some(lo), Some(hi)) = (lower, upper) {
            if lo > hi {
                return None;
            }
        }
        if let Some(lo) = lower.filter(|lo| ts < *lo) {
            return Some(lo);
        }
        upper.filter(|hi| ts > *hi)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(id: &str, kind: &str, start: &str) -> RawEvent {
        RawEvent {
            id: Some(id.into()),
            event_type: Some(kind.into()),
            title: Some("Quiz 1".into()),
            start: Some(start.into()),
            all_day: Some(true),
            confidence: Some(0.8),
            ..RawEvent::default()
        }
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn term_validator() -> EventValidator {
        EventValidator::new(ValidationConfig {
            default_course_code: "CS101".into(),
            term_start: Some(date(2025, 9, 1)),
            term_end: Some(date(2025, 12, 19)),
            strict: false,
        })
    }

    #[test]
    fn zone_suffixes_are_stripped() {
        assert_eq!(strip_zone_suffix("2025-09-15T10:00:00Z"), "2025-09-15T10:00:00");
        assert_eq!(strip_zone_suffix("2025-09-15T10:00:00.000+02:00"), "2025-09-15T10:00:00.000");
        assert_eq!(strip_zone_suffix("2025-09-15T10:00-0500"), "2025-09-15T10:00");
        assert_eq!(strip_zone_suffix("2025-09-15Z"), "2025-09-15");
        assert_eq!(strip_zone_suffix("2025-09-15"), "2025-09-15");
    }

    #[test]
    fn timestamp_round_trip() {
        let ts = date(2025, 9, 15).and_hms_milli_opt(13, 45, 0, 250).unwrap();
        assert_eq!(parse_timestamp(&format_timestamp(&ts)), Some(ts));
    }

    #[test]
    fn parses_common_shapes() {
        let midnight = date(2025, 9, 15).and_time(NaiveTime::MIN);
        assert_eq!(parse_timestamp("2025-09-15"), Some(midnight));
        assert_eq!(parse_timestamp("2025-09-15T00:00"), Some(midnight));
        assert_eq!(parse_timestamp("2025-09-15 00:00:00"), Some(midnight));
        assert_eq!(parse_timestamp("2025-09-15T00:00:00Z"), Some(midnight));
        assert_eq!(parse_timestamp("next Tuesday"), None);
        assert_eq!(parse_timestamp("2025-02-30"), None);
    }

    #[test]
    fn hard_failures_drop_only_the_offending_item() {
        let validator = EventValidator::new(ValidationConfig::default());
        let items = vec![
            raw("a", "QUIZ", "2025-09-12"),
            raw("", "QUIZ", "2025-09-12"),
            raw("c", "PICNIC", "2025-09-12"),
            raw("d", "LAB", "someday"),
            raw("e", "lab", "2025-09-19T14:00:00"),
        ];
        let report = validator.validate(&items);
        assert!(!report.valid);
        assert_eq!(report.stats.total, 5);
        assert_eq!(report.stats.valid, 2);
        assert_eq!(report.stats.invalid, 3);
        let fields: Vec<&str> = report.errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(fields, vec!["id", "type", "start"]);
        assert_eq!(report.errors[1].index, 2);
        assert_eq!(report.events[1].event_type, EventType::Lab);
    }

    #[test]
    fn soft_repairs_fill_defaults() {
        let validator = term_validator();
        let item = RawEvent {
            id: Some("  x1 ".into()),
            event_type: Some("final exam".into()),
            title: Some("   ".into()),
            start: Some("2025-12-12T09:30:00".into()),
            location: Some("  ".into()),
            notes: Some(" Bring ID ".into()),
            ..RawEvent::default()
        };
        let report = validator.validate(&[item]);
        assert!(report.valid);
        let event = &report.events[0];
        assert_eq!(event.id, "x1");
        assert_eq!(event.event_type, EventType::Final);
        assert_eq!(event.title, "Final Exam");
        assert!(!event.all_day);
        assert_eq!(event.confidence, 0.5);
        assert_eq!(event.course_code, "CS101");
        assert_eq!(event.location, None);
        assert_eq!(event.notes.as_deref(), Some("Bring ID"));
        assert_eq!(report.stats.defaults_applied, 4);
    }

    #[test]
    fn confidence_is_clamped() {
        let validator = EventValidator::new(ValidationConfig::default());
        let mut high = raw("a", "QUIZ", "2025-09-12");
        high.confidence = Some(1.7);
        let mut nan = raw("b", "QUIZ", "2025-09-13");
        nan.confidence = Some(f64::NAN);
        let report = validator.validate(&[high, nan]);
        assert_eq!(report.events[0].confidence, 1.0);
        assert_eq!(report.events[1].confidence, 0.0);
        assert_eq!(report.warnings.len(), 2);
    }

    #[test]
    fn event_before_term_clamps_to_term_start() {
        let report = term_validator().validate(&[raw("a", "QUIZ", "2025-08-20")]);
        assert_eq!(report.events.len(), 1);
        assert_eq!(report.events[0].start, "2025-09-01T00:00:00.000");
        assert_eq!(report.stats.clamped, 1);
        assert_eq!(report.warnings.len(), 1);
    }

    #[test]
    fn event_after_term_clamps_to_end_of_last_day() {
        let mut item = raw("a", "FINAL", "2026-01-05T10:00:00");
        item.end = Some("2026-01-05T12:00:00".into());
        let report = term_validator().validate(&[item]);
        assert_eq!(report.events[0].start, "2025-12-19T23:59:59.999");
        assert_eq!(report.events[0].end.as_deref(), Some("2025-12-19T23:59:59.999"));
        assert_eq!(report.stats.clamped, 1);
    }

    #[test]
    fn inside_term_untouched() {
        let report = term_validator().validate(&[raw("a", "QUIZ", "2025-10-01")]);
        assert_eq!(report.events[0].start, "2025-10-01T00:00:00.000");
        assert_eq!(report.stats.clamped, 0);
    }

    #[test]
    fn bad_end_dropped_unless_strict() {
        let mut item = raw("a", "LAB", "2025-10-01T14:00:00");
        item.end = Some("later".into());

        let lenient = EventValidator::new(ValidationConfig::default()).validate(&[item.clone()]);
        assert!(lenient.valid);
        assert_eq!(lenient.events[0].end, None);
        assert_eq!(lenient.warnings.len(), 1);

        let strict = EventValidator::new(ValidationConfig {
            strict: true,
            ..ValidationConfig::default()
        })
        .validate(&[item]);
        assert!(!strict.valid);
        assert_eq!(strict.errors[0].field, "end");
    }

    #[test]
    fn all_or_nothing_rejects_on_first_failure() {
        let validator = EventValidator::new(ValidationConfig::default());
        let items = vec![raw("a", "QUIZ", "2025-09-12"), raw("b", "QUIZ", "")];
        let issue = validator.validate_all_or_nothing(&items).unwrap_err();
        assert_eq!(issue.index, 1);
        assert_eq!(issue.field, "start");
    }
}
