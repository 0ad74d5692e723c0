use chrono::NaiveDate;

use super::llm_types::ChatMessage;
use super::sanitize::sanitize_for_prompt;

pub const EXTRACTION_SYSTEM_PROMPT: &str = r#"
You convert course syllabus text into calendar events. Extract ONLY events
whose dates are written in the syllabus. Never invent dates or events.

Respond with JSON only: either an array of events or an object of the form
{"events": [...]}. Each event has exactly these fields:
  "id": short unique string
  "type": one of ASSIGNMENT, QUIZ, MIDTERM, FINAL, LAB, LECTURE, OTHER
  "title": short human title
  "start": local time "YYYY-MM-DDTHH:mm:ss.sss" with NO timezone offset
  "end": same format or null
  "allDay": true when no clock time is written
  "location": string or null
  "notes": string or null
  "confidence": number between 0 and 1
"#;

/// Context embedded alongside the syllabus text.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PromptContext {
    pub course_code: Option<String>,
    pub term_start: Option<NaiveDate>,
    pub term_end: Option<NaiveDate>,
    /// Informational only; outputs stay zone-naive.
    pub timezone: Option<String>,
    pub default_year: Option<i32>,
}

/// Role-tagged messages for one extraction request.
pub fn build_extraction_messages(text: &str, context: &PromptContext) -> Vec<ChatMessage> {
    let mut facts = Vec::new();
    if let Some(code) = &context.course_code {
        facts.push(format!("Course code: {code}"));
    }
    match (context.term_start, context.term_end) {
        (Some(start), Some(end)) => facts.push(format!("Term: {start} to {end}")),
        (Some(start), None) => facts.push(format!("Term starts: {start}")),
        (None, Some(end)) => facts.push(format!("Term ends: {end}")),
        (None, None) => {}
    }
    if let Some(year) = context.default_year {
        facts.push(format!("Dates without a year fall in {year}"));
    }
    if let Some(tz) = &context.timezone {
        facts.push(format!("Timezone label (do not apply offsets): {tz}"));
    }

    let facts = if facts.is_empty() {
        String::new()
    } else {
        format!("{}\n\n", facts.join("\n"))
    };
    let body = sanitize_for_prompt(text);

    vec![
        ChatMessage::system(EXTRACTION_SYSTEM_PROMPT.trim()),
        ChatMessage::user(format!(
            "{facts}<syllabus>\n{body}\n</syllabus>\n\nReturn the events as JSON."
        )),
    ]
}
