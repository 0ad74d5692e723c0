use serde::Serialize;

use super::types::ValidatedEvent;

/// Aggregate confidence below which heuristic output is replaced.
pub const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.6;

/// Why the router asked for a fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum FallbackReason {
    EmptyBatch,
    LowConfidence,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoutingDecision {
    pub overall_confidence: f32,
    pub threshold: f32,
    pub needs_fallback: bool,
    pub reason: Option<FallbackReason>,
}

/// Binary replace-or-keep decision over a validated heuristic batch.
#[derive(Debug, Clone, Copy)]
pub struct ConfidenceRouter {
    threshold: f32,
}

impl Default for ConfidenceRouter {
    fn default() -> Self {
        Self::new(DEFAULT_CONFIDENCE_THRESHOLD)
    }
}

impl ConfidenceRouter {
    /// Thresholds outside [0,1] are clamped.
    pub fn new(threshold: f32) -> Self {
        let threshold = if threshold.is_nan() {
            DEFAULT_CONFIDENCE_THRESHOLD
        } else {
            threshold.clamp(0.0, 1.0)
        };
        Self { threshold }
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    pub fn route(&self, events: &[ValidatedEvent]) -> RoutingDecision {
        let overall = overall_confidence(events);
        let reason = if events.is_empty() {
            Some(FallbackReason::EmptyBatch)
        } else if overall < self.threshold {
            Some(FallbackReason::LowConfidence)
        } else {
            None
        };
        RoutingDecision {
            overall_confidence: overall,
            threshold: self.threshold,
            needs_fallback: reason.is_some(),
            reason,
        }
    }
}

/// Mean event confidence, 0 for an empty batch.
pub fn overall_confidence(events: &[ValidatedEvent]) -> f32 {
    if events.is_empty() {
        return 0.0;
    }
    events.iter().map(|e| e.confidence).sum::<f32>() / events.len() as f32
}
