//! Wire types for the completion endpoint and decoding of its replies.

use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use super::types::RawEvent;
use super::FallbackError;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".into(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".into(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResponseFormat {
    #[serde(rename = "type")]
    pub kind: String,
}

impl ResponseFormat {
    pub fn json_object() -> Self {
        Self {
            kind: "json_object".into(),
        }
    }
}

/// Body posted to the completion endpoint.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    pub max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_format: Option<ResponseFormat>,
}

/// Text recovered from a completion reply, tagged with the shape it came from.
#[derive(Debug, Clone, PartialEq)]
pub enum CompletionPayload {
    /// Top-level `output_text`.
    OutputText(String),
    /// `output[].content[].text` or `content[].text`.
    ContentArray(String),
    /// `choices[0].message.content`.
    ChatMessage(String),
}

impl CompletionPayload {
    pub fn text(&self) -> &str {
        match self {
            CompletionPayload::OutputText(t)
            | CompletionPayload::ContentArray(t)
            | CompletionPayload::ChatMessage(t) => t,
        }
    }

    pub fn shape(&self) -> &'static str {
        match self {
            CompletionPayload::OutputText(_) => "output_text",
            CompletionPayload::ContentArray(_) => "content_array",
            CompletionPayload::ChatMessage(_) => "chat_message",
        }
    }
}

type ShapeMatcher = fn(&Value) -> Option<CompletionPayload>;

/// Tried in order; the first non-empty text wins.
const SHAPE_MATCHERS: &[ShapeMatcher] = &[match_output_text, match_content_array, match_chat_message];

fn non_empty(text: String) -> Option<String> {
    (!text.trim().is_empty()).then_some(text)
}

/// Concatenate `text` fields of a parts array.
fn join_parts(parts: &Value) -> Option<String> {
    let joined: String = parts
        .as_array()?
        .iter()
        .filter_map(|part| match part {
            Value::String(s) => Some(s.as_str()),
            other => other.get("text").and_then(Value::as_str),
        })
        .collect();
    non_empty(joined)
}

fn match_output_text(body: &Value) -> Option<CompletionPayload> {
    let text = body.get("output_text")?.as_str()?;
    non_empty(text.to_string()).map(CompletionPayload::OutputText)
}

fn match_content_array(body: &Value) -> Option<CompletionPayload> {
    if let Some(output) = body.get("output").and_then(Value::as_array) {
        let joined: String = output
            .iter()
            .filter_map(|item| item.get("content").and_then(join_parts))
            .collect();
        if let Some(text) = non_empty(joined) {
            return Some(CompletionPayload::ContentArray(text));
        }
    }
    body.get("content")
        .and_then(join_parts)
        .map(CompletionPayload::ContentArray)
}

fn match_chat_message(body: &Value) -> Option<CompletionPayload> {
    let content = body.get("choices")?.get(0)?.get("message")?.get("content")?;
    let text = match content {
        Value::String(s) => non_empty(s.clone()),
        parts => join_parts(parts),
    }?;
    Some(CompletionPayload::ChatMessage(text))
}

pub fn extract_payload(body: &Value) -> Result<CompletionPayload, FallbackError> {
    SHAPE_MATCHERS
        .iter()
        .find_map(|matcher| matcher(body))
        .ok_or(FallbackError::EmptyResponse)
}

/// Contents of the first ```json (or bare ```) fence, or the trimmed text.
pub fn strip_code_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(open) = trimmed.find("```") else {
        return trimmed;
    };
    let after = &trimmed[open + 3..];
    let after = after.strip_prefix("json").unwrap_or(after);
    match after.find("```") {
        Some(close) => after[..close].trim(),
        None => after.trim(),
    }
}

/// Decode model text into raw events. Items lacking an id receive a
/// deterministic one.
pub fn parse_event_items(text: &str) -> Result<Vec<RawEvent>, FallbackError> {
    let json = strip_code_fences(text);
    let value: Value =
        serde_json::from_str(json).map_err(|e| FallbackError::InvalidJson(e.to_string()))?;

    let items = match value {
        Value::Array(items) => items,
        Value::Object(mut map) => match map.remove("events") {
            Some(Value::Array(items)) => items,
            _ => {
                return Err(FallbackError::InvalidShape(
                    "object without an events array".into(),
                ))
            }
        },
        other => {
            return Err(FallbackError::InvalidShape(format!(
                "expected array or object, got {}",
                json_kind(&other)
            )))
        }
    };

    items
        .into_iter()
        .enumerate()
        .map(|(index, item)| {
            let mut event: RawEvent = serde_json::from_value(item).map_err(|e| {
                FallbackError::SchemaInvalid {
                    index,
                    message: e.to_string(),
                }
            })?;
            if event.id.as_deref().map_or(true, |id| id.trim().is_empty()) {
                let key = format!(
                    "model|{index}|{}|{}",
                    event.title.as_deref().unwrap_or(""),
                    event.start.as_deref().unwrap_or("")
                );
                event.id = Some(Uuid::new_v5(&Uuid::NAMESPACE_OID, key.as_bytes()).to_string());
            }
            Ok(event)
        })
        .collect()
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
