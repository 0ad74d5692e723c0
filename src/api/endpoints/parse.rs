//! Syllabus parse endpoints.
//!
//! `POST /api/parse` takes a JSON body with the text and optional term
//! context. `POST /api/parse/text` takes the raw text as the body and the
//! same options as query parameters.

use axum::body::Bytes;
use axum::extract::rejection::{BytesRejection, JsonRejection, QueryRejection};
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use chrono::NaiveDate;
use serde::Deserialize;

use crate::api::error::ApiError;
use crate::api::types::{AppState, CLIENT_ID_HEADER};
use crate::pipeline::extraction::normalize_bytes;
use crate::pipeline::structuring::{ParseOutcome, ParseRequest, ANONYMOUS_CLIENT};

const MIN_YEAR: i32 = 1900;
const MAX_YEAR: i32 = 2200;

/// Optional context shared by both parse routes.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParseOptions {
    pub course_code: Option<String>,
    pub default_year: Option<i32>,
    /// `YYYY-MM-DD`
    pub term_start: Option<String>,
    /// `YYYY-MM-DD`
    pub term_end: Option<String>,
    pub timezone: Option<String>,
    pub client_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ParseBody {
    pub text: String,
    #[serde(flatten)]
    pub options: ParseOptions,
}

/// `POST /api/parse`
pub async fn parse_json(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<ParseBody>, JsonRejection>,
) -> Result<Json<ParseOutcome>, ApiError> {
    let Json(body) = payload.map_err(|rejection| {
        reject(rejection.status(), rejection.body_text(), state.max_text_chars)
    })?;

    let request = build_request(body.text, body.options, &headers, state.max_text_chars)?;
    run_parse(&state, request).await
}

/// `POST /api/parse/text`
pub async fn parse_text(
    State(state): State<AppState>,
    headers: HeaderMap,
    query: Result<Query<ParseOptions>, QueryRejection>,
    body: Result<Bytes, BytesRejection>,
) -> Result<Json<ParseOutcome>, ApiError> {
    let Query(options) = query.map_err(|rejection| ApiError::InvalidRequest(rejection.body_text()))?;
    let body = body.map_err(|rejection| {
        reject(rejection.status(), rejection.body_text(), state.max_text_chars)
    })?;

    let text = normalize_bytes(&body)?;
    let request = build_request(text, options, &headers, state.max_text_chars)?;
    run_parse(&state, request).await
}

fn reject(status: StatusCode, detail: String, limit: usize) -> ApiError {
    if status == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::TextTooLarge { limit }
    } else {
        ApiError::InvalidRequest(detail)
    }
}

async fn run_parse(state: &AppState, request: ParseRequest) -> Result<Json<ParseOutcome>, ApiError> {
    let parser = state.parser.clone();
    let outcome = tokio::spawn(async move { parser.parse(&request).await })
        .await
        .map_err(|e| ApiError::Internal(format!("parse task failed: {e}")))?;
    Ok(Json(outcome))
}

/// Validate the outer request and assemble a pipeline request.
pub fn build_request(
    text: String,
    options: ParseOptions,
    headers: &HeaderMap,
    max_text_chars: usize,
) -> Result<ParseRequest, ApiError> {
    if text.trim().is_empty() {
        return Err(ApiError::EmptyText);
    }
    if text.chars().count() > max_text_chars {
        return Err(ApiError::TextTooLarge {
            limit: max_text_chars,
        });
    }

    let term_start = parse_day("termStart", options.term_start.as_deref())?;
    let term_end = parse_day("termEnd", options.term_end.as_deref())?;
    if let (Some(start), Some(end)) = (term_start, term_end) {
        if start > end {
            return Err(ApiError::InvalidTermWindow {
                start: start.to_string(),
                end: end.to_string(),
            });
        }
    }

    if let Some(year) = options.default_year {
        if !(MIN_YEAR..=MAX_YEAR).contains(&year) {
            return Err(ApiError::InvalidRequest(format!(
                "defaultYear must be between {MIN_YEAR} and {MAX_YEAR}"
            )));
        }
    }

    let client_id = headers
        .get(CLIENT_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(non_blank)
        .or_else(|| options.client_id.as_deref().and_then(non_blank))
        .unwrap_or_else(|| ANONYMOUS_CLIENT.to_string());

    Ok(ParseRequest {
        text,
        course_code: options.course_code.as_deref().and_then(non_blank),
        default_year: options.default_year,
        term_start,
        term_end,
        timezone: options.timezone.as_deref().and_then(non_blank),
        client_id,
    })
}

fn parse_day(field: &str, raw: Option<&str>) -> Result<Option<NaiveDate>, ApiError> {
    let Some(raw) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
        return Ok(None);
    };
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map(Some)
        .map_err(|_| ApiError::InvalidRequest(format!("{field} must be YYYY-MM-DD, got '{raw}'")))
}

fn non_blank(value: &str) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn options() -> ParseOptions {
        ParseOptions::default()
    }

    #[test]
    fn blank_text_rejected() {
        let err = build_request("  \n ".into(), options(), &HeaderMap::new(), 100).unwrap_err();
        assert!(matches!(err, ApiError::EmptyText));
    }

    #[test]
    fn oversized_text_counts_characters() {
        let text = "é".repeat(10);
        assert!(build_request(text.clone(), options(), &HeaderMap::new(), 10).is_ok());
        let err = build_request(text, options(), &HeaderMap::new(), 9).unwrap_err();
        assert!(matches!(err, ApiError::TextTooLarge { limit: 9 }));
    }

    #[test]
    fn malformed_term_date_rejected() {
        let opts = ParseOptions {
            term_start: Some("09/01/2025".into()),
            ..options()
        };
        let err = build_request("Quiz 1 Sept 5".into(), opts, &HeaderMap::new(), 100).unwrap_err();
        assert_eq!(err.code(), "INVALID_REQUEST");
        assert!(err.to_string().contains("termStart"));
    }

    #[test]
    fn inverted_term_window_rejected() {
        let opts = ParseOptions {
            term_start: Some("2025-12-20".into()),
            term_end: Some("2025-09-01".into()),
            ..options()
        };
        let err = build_request("Quiz 1 Sept 5".into(), opts, &HeaderMap::new(), 100).unwrap_err();
        assert_eq!(err.code(), "INVALID_TERM_WINDOW");
    }

    #[test]
    fn out_of_range_year_rejected() {
        let opts = ParseOptions {
            default_year: Some(20250),
            ..options()
        };
        let err = build_request("Quiz 1 Sept 5".into(), opts, &HeaderMap::new(), 100).unwrap_err();
        assert_eq!(err.code(), "INVALID_REQUEST");
    }

    #[test]
    fn client_id_prefers_header() {
        let mut headers = HeaderMap::new();
        headers.insert(CLIENT_ID_HEADER, HeaderValue::from_static("from-header"));
        let opts = ParseOptions {
            client_id: Some("from-body".into()),
            ..options()
        };
        let request = build_request("Quiz".into(), opts, &headers, 100).unwrap();
        assert_eq!(request.client_id, "from-header");

        let opts = ParseOptions {
            client_id: Some("from-body".into()),
            ..options()
        };
        let request = build_request("Quiz".into(), opts, &HeaderMap::new(), 100).unwrap();
        assert_eq!(request.client_id, "from-body");

        let request = build_request("Quiz".into(), options(), &HeaderMap::new(), 100).unwrap();
        assert_eq!(request.client_id, ANONYMOUS_CLIENT);
    }

    #[test]
    fn options_are_carried_over() {
        let opts = ParseOptions {
            course_code: Some(" CS101 ".into()),
            default_year: Some(2025),
            term_start: Some("2025-09-01".into()),
            term_end: Some("2025-12-20".into()),
            timezone: Some("America/Toronto".into()),
            client_id: None,
        };
        let request = build_request("Quiz 1 Sept 5".into(), opts, &HeaderMap::new(), 100).unwrap();
        assert_eq!(request.course_code.as_deref(), Some("CS101"));
        assert_eq!(request.default_year, Some(2025));
        assert_eq!(request.term_start, NaiveDate::from_ymd_opt(2025, 9, 1));
        assert_eq!(request.term_end, NaiveDate::from_ymd_opt(2025, 12, 20));
        assert_eq!(request.timezone.as_deref(), Some("America/Toronto"));
    }
}
