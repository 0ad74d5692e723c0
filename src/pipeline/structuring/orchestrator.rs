//! End-to-end syllabus parsing:
//! normalize → dates → classify/build → validate → route → (guarded) fallback.

use std::sync::Arc;

use chrono::NaiveDate;
use serde::Serialize;
use tracing::Instrument;

use super::candidates::{CandidateConfig, EventCandidateBuilder, DEFAULT_MIN_CONFIDENCE};
use super::confidence::{overall_confidence, ConfidenceRouter, FallbackReason};
use super::cost_guard::CostGuard;
use super::llm::ModelFallbackClient;
use super::prompt::PromptContext;
use super::types::{ValidatedEvent, ValidationConfig, ValidationIssue, ValidationStats};
use super::validation::EventValidator;
use super::FallbackError;
use crate::pipeline::extraction::{normalize_text, DateExtractor};

pub const ANONYMOUS_CLIENT: &str = "anonymous";

#[derive(Debug, Clone, PartialEq)]
pub struct ParseRequest {
    pub text: String,
    pub course_code: Option<String>,
    pub default_year: Option<i32>,
    pub term_start: Option<NaiveDate>,
    pub term_end: Option<NaiveDate>,
    pub timezone: Option<String>,
    pub client_id: String,
}

impl ParseRequest {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            course_code: None,
            default_year: None,
            term_start: None,
            term_end: None,
            timezone: None,
            client_id: ANONYMOUS_CLIENT.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EventSource {
    Heuristics,
    Model,
}

/// What happened on the fallback path.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FallbackDiagnostics {
    pub reason: FallbackReason,
    /// True once a network request was issued.
    pub attempted: bool,
    pub attempts: u32,
    pub duration_ms: Option<u64>,
    pub model: Option<String>,
    pub error_code: Option<&'static str>,
    pub error_message: Option<String>,
    pub denial_code: Option<&'static str>,
    pub denial_message: Option<String>,
    /// Validation of the model batch; the top-level stats describe the
    /// heuristic batch.
    pub validation: Option<ValidationStats>,
    pub warnings: Vec<String>,
}

impl FallbackDiagnostics {
    fn new(reason: FallbackReason) -> Self {
        Self {
            reason,
            attempted: false,
            attempts: 0,
            duration_ms: None,
            model: None,
            error_code: None,
            error_message: None,
            denial_code: None,
            denial_message: None,
            validation: None,
            warnings: Vec::new(),
        }
    }

    fn with_error(mut self, error: &FallbackError) -> Self {
        self.error_code = Some(error.code());
        self.error_message = Some(error.to_string());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParseDiagnostics {
    pub source: EventSource,
    pub overall_confidence: f32,
    pub heuristic_confidence: f32,
    pub threshold: f32,
    pub lines_total: usize,
    pub lines_classified: usize,
    pub dates_found: usize,
    pub candidates_generated: usize,
    pub duplicates_removed: usize,
    pub validation: ValidationStats,
    pub warnings: Vec<String>,
    pub errors: Vec<ValidationIssue>,
    pub fallback: Option<FallbackDiagnostics>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParseOutcome {
    pub events: Vec<ValidatedEvent>,
    pub diagnostics: ParseDiagnostics,
}

/// Shared per-process parser. Each call is an independent unit of work;
/// only the cost guard counters are shared between calls.
#[derive(Clone)]
pub struct SyllabusParser {
    fallback: Arc<ModelFallbackClient>,
    cost_guard: CostGuard,
    router: ConfidenceRouter,
    min_confidence: f32,
}

impl SyllabusParser {
    pub fn new(fallback: Arc<ModelFallbackClient>, cost_guard: CostGuard, router: ConfidenceRouter) -> Self {
        Self {
            fallback,
            cost_guard,
            router,
            min_confidence: DEFAULT_MIN_CONFIDENCE,
        }
    }

    pub fn with_min_confidence(mut self, min_confidence: f32) -> Self {
        self.min_confidence = min_confidence.clamp(0.0, 1.0);
        self
    }

    pub fn fallback_configured(&self) -> bool {
        self.fallback.is_configured()
    }

    pub fn threshold(&self) -> f32 {
        self.router.threshold()
    }

    pub async fn parse(&self, request: &ParseRequest) -> ParseOutcome {
        let span = tracing::info_span!(
            "parse_syllabus",
            client_id = %request.client_id,
            chars = request.text.chars().count()
        );
        self.parse_inner(request).instrument(span).await
    }

    async fn parse_inner(&self, request: &ParseRequest) -> ParseOutcome {
        let normalized = normalize_text(&request.text);
        let extractor = DateExtractor::with_default_year(request.default_year);
        let dates = extractor.extract(&normalized);

        let builder = EventCandidateBuilder::new(CandidateConfig {
            min_confidence: self.min_confidence,
            course_code: request.course_code.clone(),
            ..CandidateConfig::default()
        });
        let batch = builder.build(&normalized, &dates);

        let validation = ValidationConfig {
            default_course_code: request.course_code.clone().unwrap_or_default(),
            term_start: request.term_start,
            term_end: request.term_end,
            strict: false,
        };
        let report = EventValidator::new(validation.clone()).validate_candidates(&batch.candidates);
        let decision = self.router.route(&report.events);

        tracing::info!(
            dates = dates.len(),
            candidates = batch.candidates.len(),
            events = report.events.len(),
            confidence = decision.overall_confidence,
            needs_fallback = decision.needs_fallback,
            "Heuristic pass complete"
        );

        let mut diagnostics = ParseDiagnostics {
            source: EventSource::Heuristics,
            overall_confidence: decision.overall_confidence,
            heuristic_confidence: decision.overall_confidence,
            threshold: decision.threshold,
            lines_total: batch.lines_total,
            lines_classified: batch.lines_classified,
            dates_found: dates.len(),
            candidates_generated: batch.generated,
            duplicates_removed: batch.duplicates_removed,
            validation: report.stats,
            warnings: report.warnings,
            errors: report.errors,
            fallback: None,
        };

        let Some(reason) = decision.reason else {
            return ParseOutcome {
                events: report.events,
                diagnostics,
            };
        };

        let context = PromptContext {
            course_code: request.course_code.clone(),
            term_start: request.term_start,
            term_end: request.term_end,
            timezone: request.timezone.clone(),
            default_year: Some(extractor.default_year()),
        };
        let (model_events, fallback) = self
            .run_fallback(reason, &normalized, &context, &validation, &request.client_id)
            .await;
        diagnostics.fallback = Some(fallback);

        match model_events {
            Some(events) => {
                diagnostics.source = EventSource::Model;
                diagnostics.overall_confidence = overall_confidence(&events);
                ParseOutcome { events, diagnostics }
            }
            None => ParseOutcome {
                events: report.events,
                diagnostics,
            },
        }
    }

    /// Credential check, then cost guard, then the network call. Any
    /// failure leaves the heuristic result in place.
    async fn run_fallback(
        &self,
        reason: FallbackReason,
        text: &str,
        context: &PromptContext,
        validation: &ValidationConfig,
        client_id: &str,
    ) -> (Option<Vec<ValidatedEvent>>, FallbackDiagnostics) {
        let diag = FallbackDiagnostics::new(reason);

        if !self.fallback.is_configured() {
            tracing::info!("Fallback skipped: no credential configured");
            return (None, diag.with_error(&FallbackError::MissingCredential));
        }

        let estimate = self
            .cost_guard
            .estimate(self.fallback.prompt_chars(text, context));
        if let Err(denial) = self.cost_guard.authorize(client_id, estimate) {
            let diag = FallbackDiagnostics {
                denial_code: Some(denial.code()),
                denial_message: Some(denial.to_string()),
                ..diag
            };
            return (None, diag);
        }

        let model = Some(self.fallback.config().model.clone());
        match self.fallback.extract_events(text, context, validation).await {
            Ok(success) => {
                let diag = FallbackDiagnostics {
                    attempted: true,
                    attempts: success.attempts,
                    duration_ms: Some(success.duration.as_millis() as u64),
                    model: Some(success.model),
                    validation: Some(success.report.stats),
                    warnings: success.report.warnings,
                    ..diag
                };
                (Some(success.report.events), diag)
            }
            Err(failure) => {
                let diag = FallbackDiagnostics {
                    attempted: failure.attempts > 0,
                    attempts: failure.attempts,
                    duration_ms: Some(failure.duration.as_millis() as u64),
                    model,
                    ..diag
                }
                .with_error(&failure.error);
                (None, diag)
            }
        }
    }
}
