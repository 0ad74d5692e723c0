use std::collections::BTreeSet;

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::pipeline::extraction::{DateMatch, EventType};

/// Canonical zone-naive timestamp rendering, e.g. `2025-09-15T00:00:00.000`.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3f";

pub fn format_timestamp(ts: &NaiveDateTime) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

/// A provisional event produced by the candidate builder.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventCandidate {
    pub id: String,
    pub course_code: Option<String>,
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub title: String,
    pub start: NaiveDateTime,
    pub end: Option<NaiveDateTime>,
    pub all_day: bool,
    pub location: Option<String>,
    pub notes: Option<String>,
    pub confidence: f32,
    pub source_line_index: usize,
    pub source_text: String,
    pub keywords: BTreeSet<String>,
    pub date_matches: Vec<DateMatch>,
}

/// Loosely-typed event as it arrives at the validator, from either the
/// candidate builder or a model response. Keys are accepted in camelCase
/// or snake_case.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawEvent {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default, alias = "course_code")]
    pub course_code: Option<String>,
    #[serde(default, rename = "type", alias = "eventType", alias = "event_type")]
    pub event_type: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub start: Option<String>,
    #[serde(default)]
    pub end: Option<String>,
    #[serde(default, alias = "all_day")]
    pub all_day: Option<bool>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub confidence: Option<f64>,
}

impl From<&EventCandidate> for RawEvent {
    fn from(c: &EventCandidate) -> Self {
        Self {
            id: Some(c.id.clone()),
            course_code: c.course_code.clone(),
            event_type: Some(c.event_type.as_str().to_string()),
            title: Some(c.title.clone()),
            start: Some(format_timestamp(&c.start)),
            end: c.end.as_ref().map(format_timestamp),
            all_day: Some(c.all_day),
            location: c.location.clone(),
            notes: c.notes.clone(),
            confidence: Some(f64::from(c.confidence)),
        }
    }
}

/// Output event DTO.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidatedEvent {
    pub id: String,
    pub course_code: String,
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub title: String,
    pub start: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub end: Option<String>,
    pub all_day: bool,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub notes: Option<String>,
    pub confidence: f32,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ValidationConfig {
    pub default_course_code: String,
    pub term_start: Option<NaiveDate>,
    pub term_end: Option<NaiveDate>,
    /// Unparseable `end` values become hard failures instead of being dropped.
    pub strict: bool,
}

/// A per-item hard failure.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationIssue {
    pub index: usize,
    pub field: String,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationStats {
    pub total: usize,
    pub valid: usize,
    pub invalid: usize,
    pub clamped: usize,
    pub defaults_applied: usize,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationReport {
    pub events: Vec<ValidatedEvent>,
    /// False when any item failed hard validation.
    pub valid: bool,
    pub stats: ValidationStats,
    pub warnings: Vec<String>,
    pub errors: Vec<ValidationIssue>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_event_accepts_both_key_styles() {
        let camel: RawEvent = serde_json::from_str(
            r#"{"id":"a","courseCode":"CS101","type":"QUIZ","start":"2025-09-12","allDay":true}"#,
        )
        .unwrap();
        let snake: RawEvent = serde_json::from_str(
            r#"{"id":"a","course_code":"CS101","event_type":"QUIZ","start":"2025-09-12","all_day":true}"#,
        )
        .unwrap();
        assert_eq!(camel, snake);
        assert_eq!(camel.course_code.as_deref(), Some("CS101"));
    }

    #[test]
    fn validated_event_wire_shape() {
        let event = ValidatedEvent {
            id: "e1".into(),
            course_code: "CS101".into(),
            event_type: EventType::Midterm,
            title: "Midterm".into(),
            start: "2025-10-20T00:00:00.000".into(),
            end: None,
            all_day: true,
            location: None,
            notes: None,
            confidence: 0.8,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "MIDTERM");
        assert_eq!(json["courseCode"], "CS101");
        assert_eq!(json["allDay"], true);
        assert!(json.get("end").is_none());
    }

    #[test]
    fn timestamp_format_has_millis_and_no_zone() {
        let ts = NaiveDate::from_ymd_opt(2025, 9, 15)
            .unwrap()
            .and_hms_milli_opt(14, 30, 0, 0)
            .unwrap();
        assert_eq!(format_timestamp(&ts), "2025-09-15T14:30:00.000");
    }
}
