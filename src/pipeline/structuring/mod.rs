pub mod types;
pub mod candidates;
pub mod dedup;
pub mod validation;
pub mod confidence;
pub mod cost_guard;
pub mod sanitize;
pub mod prompt;
pub mod llm_types;
pub mod llm;
pub mod orchestrator;

pub use types::*;
pub use candidates::*;
pub use dedup::*;
pub use validation::*;
pub use confidence::*;
pub use cost_guard::*;
pub use llm::*;
pub use orchestrator::*;

use thiserror::Error;

/// Terminal failures of a fallback model call. Every variant maps to a
/// stable code the caller records before keeping the heuristic result.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FallbackError {
    #[error("No API key configured for the completion endpoint")]
    MissingCredential,

    #[error("Completion response carried no extractable text")]
    EmptyResponse,

    #[error("Completion text is not valid JSON: {0}")]
    InvalidJson(String),

    #[error("Completion JSON has an unexpected shape: {0}")]
    InvalidShape(String),

    #[error("Completion item {index} failed validation: {message}")]
    SchemaInvalid { index: usize, message: String },

    #[error("Completion endpoint returned status {status}: {body}")]
    HttpStatus { status: u16, body: String },

    #[error("Completion request timed out after {0}s")]
    Timeout(u64),

    #[error("Network error: {0}")]
    Network(String),
}

impl FallbackError {
    pub fn code(&self) -> &'static str {
        match self {
            FallbackError::MissingCredential => "missing-credential",
            FallbackError::EmptyResponse => "empty-response",
            FallbackError::InvalidJson(_) => "invalid-json",
            FallbackError::InvalidShape(_) => "invalid-shape",
            FallbackError::SchemaInvalid { .. } => "schema-invalid",
            FallbackError::HttpStatus { .. } => "http-status",
            FallbackError::Timeout(_) => "timeout",
            FallbackError::Network(_) => "network",
        }
    }

    /// 408, 429, 5xx and timeouts are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            FallbackError::Timeout(_) => true,
            FallbackError::HttpStatus { status, .. } => {
                matches!(status, 408 | 429) || (500..=599).contains(status)
            }
            _ => false,
        }
    }
}

/// Why the cost guard refused a fallback call.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CostDenial {
    #[error("Client {client} reached its daily cap of {cap} fallback calls")]
    ClientCapReached { client: String, cap: u32 },

    #[error("Daily budget exceeded: spent ${spent:.4} + estimated ${estimate:.4} > ${budget:.4}")]
    DailyBudgetExceeded { spent: f64, estimate: f64, budget: f64 },
}

impl CostDenial {
    pub fn code(&self) -> &'static str {
        match self {
            CostDenial::ClientCapReached { .. } => "client-cap-reached",
            CostDenial::DailyBudgetExceeded { .. } => "daily-budget-exceeded",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_statuses() {
        for status in [408, 429, 500, 502, 503, 599] {
            let e = FallbackError::HttpStatus { status, body: String::new() };
            assert!(e.is_retryable(), "{status} should retry");
        }
        for status in [400, 401, 403, 404, 422] {
            let e = FallbackError::HttpStatus { status, body: String::new() };
            assert!(!e.is_retryable(), "{status} should not retry");
        }
        assert!(FallbackError::Timeout(25).is_retryable());
        assert!(!FallbackError::Network("refused".into()).is_retryable());
        assert!(!FallbackError::InvalidJson("eof".into()).is_retryable());
    }

    #[test]
    fn codes_are_stable() {
        assert_eq!(FallbackError::MissingCredential.code(), "missing-credential");
        assert_eq!(FallbackError::EmptyResponse.code(), "empty-response");
        assert_eq!(
            FallbackError::SchemaInvalid { index: 0, message: "x".into() }.code(),
            "schema-invalid"
        );
        assert_eq!(
            CostDenial::ClientCapReached { client: "a".into(), cap: 1 }.code(),
            "client-cap-reached"
        );
    }
}
