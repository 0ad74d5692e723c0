//! Shared state for the API router.

use std::sync::Arc;

use crate::config::AppConfig;
use crate::pipeline::structuring::{
    CompletionTransport, ConfidenceRouter, CostGuard, ModelFallbackClient, ReqwestTransport,
    SyllabusParser,
};

/// Header carrying the caller's identifier for per-client budgets.
pub const CLIENT_ID_HEADER: &str = "x-client-id";

/// Shared context for all API routes.
#[derive(Clone)]
pub struct AppState {
    pub parser: SyllabusParser,
    pub max_text_chars: usize,
}

impl AppState {
    /// Production state: fallback calls go over HTTPS via reqwest.
    pub fn from_config(config: &AppConfig) -> Self {
        Self::with_transport(config, Arc::new(ReqwestTransport::new()))
    }

    pub fn with_transport(config: &AppConfig, transport: Arc<dyn CompletionTransport>) -> Self {
        let fallback = ModelFallbackClient::new(transport, config.fallback.clone());
        let parser = SyllabusParser::new(
            Arc::new(fallback),
            CostGuard::in_memory(config.cost_limits),
            ConfidenceRouter::new(config.confidence_threshold),
        )
        .with_min_confidence(config.min_confidence);

        Self {
            parser,
            max_text_chars: config.max_text_chars,
        }
    }
}
