//! Fallback completion client: timeout, retry with backoff, compatibility
//! retry for endpoints without structured output, response decoding.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use rand::Rng;
use serde_json::Value;
use thiserror::Error;

use super::llm_types::{
    extract_payload, parse_event_items, CompletionRequest, ResponseFormat,
};
use super::prompt::{build_extraction_messages, PromptContext};
use super::types::{ValidationConfig, ValidationReport};
use super::validation::EventValidator;
use super::FallbackError;

pub const DEFAULT_ENDPOINT: &str = "https://api.openai.com/v1/chat/completions";
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_TIMEOUT_SECS: u64 = 25;
pub const DEFAULT_MAX_RETRIES: u32 = 2;

const BACKOFF_BASE_MS: u64 = 300;
const MAX_JITTER_MS: u64 = 200;
/// Error bodies kept for diagnostics (characters).
const MAX_ERROR_BODY_CHARS: usize = 500;

/// Raw HTTP reply.
#[derive(Debug, Clone, PartialEq)]
pub struct TransportResponse {
    pub status: u16,
    pub body: String,
}

/// HTTP seam for the completion endpoint (allows scripting in tests).
#[async_trait]
pub trait CompletionTransport: Send + Sync {
    async fn post(
        &self,
        endpoint: &str,
        api_key: &str,
        body: &Value,
    ) -> Result<TransportResponse, FallbackError>;
}

/// reqwest-backed transport with bearer authentication.
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for ReqwestTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CompletionTransport for ReqwestTransport {
    async fn post(
        &self,
        endpoint: &str,
        api_key: &str,
        body: &Value,
    ) -> Result<TransportResponse, FallbackError> {
        let response = self
            .client
            .post(endpoint)
            .bearer_auth(api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| FallbackError::Network(e.to_string()))?;
        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| FallbackError::Network(e.to_string()))?;
        Ok(TransportResponse { status, body })
    }
}

/// One scripted reply for [`ScriptedTransport`].
#[derive(Debug, Clone)]
pub enum ScriptedReply {
    Respond { status: u16, body: String },
    /// Never answers; only the client timeout ends the attempt.
    Hang,
}

impl ScriptedReply {
    pub fn ok(body: impl Into<String>) -> Self {
        Self::Respond {
            status: 200,
            body: body.into(),
        }
    }

    pub fn status(status: u16, body: impl Into<String>) -> Self {
        Self::Respond {
            status,
            body: body.into(),
        }
    }
}

/// Transport replaying a fixed script and recording every request body.
/// Once the script is exhausted it answers 500.
#[derive(Default)]
pub struct ScriptedTransport {
    replies: Mutex<VecDeque<ScriptedReply>>,
    requests: Mutex<Vec<Value>>,
    calls: AtomicUsize,
}

impl ScriptedTransport {
    pub fn new(replies: Vec<ScriptedReply>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<Value> {
        self.requests
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl CompletionTransport for ScriptedTransport {
    async fn post(
        &self,
        _endpoint: &str,
        _api_key: &str,
        body: &Value,
    ) -> Result<TransportResponse, FallbackError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(body.clone());
        }
        let next = self.replies.lock().ok().and_then(|mut r| r.pop_front());
        match next {
            Some(ScriptedReply::Respond { status, body }) => Ok(TransportResponse { status, body }),
            Some(ScriptedReply::Hang) => {
                std::future::pending::<()>().await;
                Err(FallbackError::Network("unreachable".into()))
            }
            None => Ok(TransportResponse {
                status: 500,
                body: "script exhausted".into(),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FallbackConfig {
    pub endpoint: String,
    pub api_key: Option<String>,
    pub model: String,
    pub timeout: Duration,
    /// Extra attempts after the first.
    pub max_retries: u32,
    pub temperature: f32,
    pub max_output_tokens: u32,
}

impl Default for FallbackConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            api_key: None,
            model: DEFAULT_MODEL.to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            max_retries: DEFAULT_MAX_RETRIES,
            temperature: 0.0,
            max_output_tokens: 2_000,
        }
    }
}

impl FallbackConfig {
    pub fn has_credential(&self) -> bool {
        self.api_key.as_deref().is_some_and(|k| !k.trim().is_empty())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FallbackSuccess {
    pub report: ValidationReport,
    pub model: String,
    pub attempts: u32,
    pub payload_shape: &'static str,
    pub duration: Duration,
}

#[derive(Error, Debug, Clone, PartialEq)]
#[error("{error} (after {attempts} attempt(s))")]
pub struct FallbackFailure {
    pub error: FallbackError,
    pub attempts: u32,
    pub duration: Duration,
}

pub struct ModelFallbackClient {
    transport: Arc<dyn CompletionTransport>,
    config: FallbackConfig,
}

impl ModelFallbackClient {
    pub fn new(transport: Arc<dyn CompletionTransport>, config: FallbackConfig) -> Self {
        Self { transport, config }
    }

    pub fn config(&self) -> &FallbackConfig {
        &self.config
    }

    pub fn is_configured(&self) -> bool {
        self.config.has_credential()
    }

    /// Serialized request size in characters, used for cost estimates.
    pub fn prompt_chars(&self, text: &str, context: &PromptContext) -> usize {
        build_extraction_messages(text, context)
            .iter()
            .map(|m| m.content.chars().count())
            .sum()
    }

    /// Request events for `text`. Every returned item must validate or the
    /// whole call fails.
    pub async fn extract_events(
        &self,
        text: &str,
        context: &PromptContext,
        validation: &ValidationConfig,
    ) -> Result<FallbackSuccess, FallbackFailure> {
        let started = Instant::now();
        let fail = |error: FallbackError, attempts: u32| FallbackFailure {
            error,
            attempts,
            duration: started.elapsed(),
        };

        let api_key = match self.config.api_key.as_deref().map(str::trim) {
            Some(key) if !key.is_empty() => key.to_string(),
            _ => return Err(fail(FallbackError::MissingCredential, 0)),
        };

        let mut request = CompletionRequest {
            model: self.config.model.clone(),
            messages: build_extraction_messages(text, context),
            temperature: self.config.temperature,
            max_tokens: self.config.max_output_tokens,
            response_format: Some(ResponseFormat::json_object()),
        };

        let mut attempts = 0u32;
        let mut retries_used = 0u32;
        let body = loop {
            attempts += 1;
            match self.send_once(&api_key, &request).await {
                Ok(body) => break body,
                Err(FallbackError::HttpStatus { status: 400, ref body })
                    if attempts == 1
                        && request.response_format.is_some()
                        && cites_response_format(body) =>
                {
                    tracing::warn!(
                        model = %self.config.model,
                        "Endpoint rejected structured output, retrying without it"
                    );
                    request.response_format = None;
                }
                Err(e) if e.is_retryable() && retries_used < self.config.max_retries => {
                    let delay = backoff_delay(retries_used);
                    retries_used += 1;
                    tracing::warn!(
                        attempt = attempts,
                        code = e.code(),
                        delay_ms = delay.as_millis() as u64,
                        "Fallback call failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    tracing::warn!(attempt = attempts, code = e.code(), error = %e, "Fallback call failed");
                    return Err(fail(e, attempts));
                }
            }
        };

        let (report, payload_shape) = decode_events(&body, validation).map_err(|e| {
            tracing::warn!(code = e.code(), error = %e, "Fallback response rejected");
            fail(e, attempts)
        })?;

        tracing::info!(
            model = %self.config.model,
            attempts,
            events = report.events.len(),
            shape = payload_shape,
            "Fallback call succeeded"
        );

        Ok(FallbackSuccess {
            report,
            model: self.config.model.clone(),
            attempts,
            payload_shape,
            duration: started.elapsed(),
        })
    }

    /// One bounded attempt. Returns the body of a 2xx reply.
    async fn send_once(
        &self,
        api_key: &str,
        request: &CompletionRequest,
    ) -> Result<String, FallbackError> {
        let body = serde_json::to_value(request)
            .map_err(|e| FallbackError::Network(format!("request encoding failed: {e}")))?;
        let call = self.transport.post(&self.config.endpoint, api_key, &body);
        let response = tokio::time::timeout(self.config.timeout, call)
            .await
            .map_err(|_| FallbackError::Timeout(self.config.timeout.as_secs()))??;

        if !(200..300).contains(&response.status) {
            return Err(FallbackError::HttpStatus {
                status: response.status,
                body: response.body.chars().take(MAX_ERROR_BODY_CHARS).collect(),
            });
        }
        Ok(response.body)
    }
}

/// `base * 2^retry` plus 0..=200ms of jitter.
fn backoff_delay(retry: u32) -> Duration {
    let exp = BACKOFF_BASE_MS.saturating_mul(1u64 << retry.min(16));
    let jitter = rand::thread_rng().gen_range(0..=MAX_JITTER_MS);
    Duration::from_millis(exp + jitter)
}

/// A 400 that names the structured-output parameter.
fn cites_response_format(body: &str) -> bool {
    let lowered = body.to_lowercase();
    lowered.contains("response_format") || lowered.contains("json_object")
}

fn decode_events(
    body: &str,
    validation: &ValidationConfig,
) -> Result<(ValidationReport, &'static str), FallbackError> {
    let envelope: Value =
        serde_json::from_str(body).map_err(|e| FallbackError::InvalidJson(e.to_string()))?;
    let payload = extract_payload(&envelope)?;
    let items = parse_event_items(payload.text())?;
    let report = EventValidator::new(validation.clone())
        .validate_all_or_nothing(&items)
        .map_err(|issue| FallbackError::SchemaInvalid {
            index: issue.index,
            message: format!("{}: {}", issue.field, issue.message),
        })?;
    Ok((report, payload.shape()))
}
