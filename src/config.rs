use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use crate::pipeline::structuring::{
    CostLimits, FallbackConfig, DEFAULT_CONFIDENCE_THRESHOLD, DEFAULT_ENDPOINT,
    DEFAULT_MAX_RETRIES, DEFAULT_MIN_CONFIDENCE, DEFAULT_MODEL, DEFAULT_TIMEOUT_SECS,
};

/// Application-level constants
pub const APP_NAME: &str = "syllabus-events";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:8787";
pub const DEFAULT_DAILY_BUDGET_USD: f64 = 5.0;
pub const DEFAULT_PER_CLIENT_DAILY_CALLS: u32 = 20;
pub const DEFAULT_MAX_TEXT_CHARS: usize = 200_000;

/// Filter used when `RUST_LOG` is unset.
pub fn default_log_filter() -> &'static str {
    "syllabus_events=info,tower_http=warn"
}

/// Process configuration, read once at startup.
#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    pub confidence_threshold: f32,
    pub min_confidence: f32,
    pub fallback: FallbackConfig,
    pub cost_limits: CostLimits,
    pub max_text_chars: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 8787)),
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            min_confidence: DEFAULT_MIN_CONFIDENCE,
            fallback: FallbackConfig::default(),
            cost_limits: CostLimits {
                daily_budget_usd: DEFAULT_DAILY_BUDGET_USD,
                per_client_daily_calls: DEFAULT_PER_CLIENT_DAILY_CALLS,
            },
            max_text_chars: DEFAULT_MAX_TEXT_CHARS,
        }
    }
}

impl AppConfig {
    /// Read `SYLLABUS_*` variables from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup. Malformed values keep the default.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let api_key = lookup("SYLLABUS_LLM_API_KEY").or_else(|| lookup("OPENAI_API_KEY"));

        let fallback = FallbackConfig {
            endpoint: lookup("SYLLABUS_LLM_ENDPOINT").unwrap_or_else(|| DEFAULT_ENDPOINT.to_string()),
            api_key,
            model: lookup("SYLLABUS_LLM_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            timeout: Duration::from_secs(parse_or(
                &lookup,
                "SYLLABUS_LLM_TIMEOUT_SECS",
                DEFAULT_TIMEOUT_SECS,
            )),
            max_retries: parse_or(&lookup, "SYLLABUS_LLM_MAX_RETRIES", DEFAULT_MAX_RETRIES),
            ..FallbackConfig::default()
        };

        let budget: f64 = parse_or(&lookup, "SYLLABUS_DAILY_BUDGET_USD", DEFAULT_DAILY_BUDGET_USD);
        let budget = if budget.is_finite() && budget >= 0.0 {
            budget
        } else {
            tracing::warn!(value = budget, "Negative or non-finite daily budget, using default");
            DEFAULT_DAILY_BUDGET_USD
        };

        Self {
            bind_addr: parse_or(
                &lookup,
                "SYLLABUS_BIND_ADDR",
                SocketAddr::from(([127, 0, 0, 1], 8787)),
            ),
            confidence_threshold: unit_interval(
                parse_or(&lookup, "SYLLABUS_CONFIDENCE_THRESHOLD", DEFAULT_CONFIDENCE_THRESHOLD),
                DEFAULT_CONFIDENCE_THRESHOLD,
            ),
            min_confidence: unit_interval(
                parse_or(&lookup, "SYLLABUS_MIN_CONFIDENCE", DEFAULT_MIN_CONFIDENCE),
                DEFAULT_MIN_CONFIDENCE,
            ),
            fallback,
            cost_limits: CostLimits {
                daily_budget_usd: budget,
                per_client_daily_calls: parse_or(
                    &lookup,
                    "SYLLABUS_PER_CLIENT_DAILY_CALLS",
                    DEFAULT_PER_CLIENT_DAILY_CALLS,
                ),
            },
            max_text_chars: parse_or(&lookup, "SYLLABUS_MAX_TEXT_CHARS", DEFAULT_MAX_TEXT_CHARS),
        }
    }
}

fn parse_or<T, F>(lookup: &F, key: &str, default: T) -> T
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => default,
        Some(raw) => match raw.parse() {
            Ok(value) => value,
            Err(_) => {
                tracing::warn!(key, value = %raw, "Malformed configuration value, using default");
                default
            }
        },
    }
}

fn unit_interval(value: f32, default: f32) -> f32 {
    if value.is_nan() {
        default
    } else {
        value.clamp(0.0, 1.0)
    }
}
