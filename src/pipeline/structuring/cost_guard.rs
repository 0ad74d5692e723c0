//! Daily cost and per-client call caps for fallback model calls.
//!
//! Counters live behind the [`UsageStore`] trait so a durable store can
//! replace the in-memory one. All counters roll over with the UTC date.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{NaiveDate, Utc};

use super::CostDenial;

/// Characters per estimated prompt token.
const CHARS_PER_TOKEN: usize = 4;

/// Usage snapshot for one UTC day.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DailyUsage {
    pub calls: u64,
    pub spent_usd: f64,
}

/// Backing store for fallback usage counters.
pub trait UsageStore: Send + Sync {
    /// Atomically check both caps and, when allowed, record the call.
    fn try_reserve(
        &self,
        day: NaiveDate,
        client_id: &str,
        estimated_cost: f64,
        limits: &CostLimits,
    ) -> Result<(), CostDenial>;

    fn usage(&self, day: NaiveDate) -> DailyUsage;

    fn client_calls(&self, day: NaiveDate, client_id: &str) -> u32;

    /// Clear every counter.
    fn reset(&self);
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CostLimits {
    pub daily_budget_usd: f64,
    pub per_client_daily_calls: u32,
}

#[derive(Debug, Default)]
struct Counters {
    day: Option<NaiveDate>,
    calls: u64,
    spent_usd: f64,
    per_client: HashMap<String, u32>,
}

impl Counters {
    fn roll_to(&mut self, day: NaiveDate) {
        if self.day != Some(day) {
            *self = Counters {
                day: Some(day),
                ..Counters::default()
            };
        }
    }
}

/// Process-local counters.
#[derive(Debug, Clone, Default)]
pub struct InMemoryUsageStore {
    inner: Arc<Mutex<Counters>>,
}

impl InMemoryUsageStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Counters> {
        // Counters stay usable after a panic elsewhere.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl UsageStore for InMemoryUsageStore {
    fn try_reserve(
        &self,
        day: NaiveDate,
        client_id: &str,
        estimated_cost: f64,
        limits: &CostLimits,
    ) -> Result<(), CostDenial> {
        let mut counters = self.lock();
        counters.roll_to(day);

        let client_calls = counters.per_client.get(client_id).copied().unwrap_or(0);
        if client_calls >= limits.per_client_daily_calls {
            return Err(CostDenial::ClientCapReached {
                client: client_id.to_string(),
                cap: limits.per_client_daily_calls,
            });
        }
        if counters.spent_usd + estimated_cost > limits.daily_budget_usd {
            return Err(CostDenial::DailyBudgetExceeded {
                spent: counters.spent_usd,
                estimate: estimated_cost,
                budget: limits.daily_budget_usd,
            });
        }

        counters.calls += 1;
        counters.spent_usd += estimated_cost;
        *counters.per_client.entry(client_id.to_string()).or_insert(0) += 1;
        Ok(())
    }

    fn usage(&self, day: NaiveDate) -> DailyUsage {
        let counters = self.lock();
        if counters.day != Some(day) {
            return DailyUsage::default();
        }
        DailyUsage {
            calls: counters.calls,
            spent_usd: counters.spent_usd,
        }
    }

    fn client_calls(&self, day: NaiveDate, client_id: &str) -> u32 {
        let counters = self.lock();
        if counters.day != Some(day) {
            return 0;
        }
        counters.per_client.get(client_id).copied().unwrap_or(0)
    }

    fn reset(&self) {
        *self.lock() = Counters::default();
    }
}

/// Per-call price model used for budget estimates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PricingModel {
    pub input_usd_per_1k_tokens: f64,
    pub output_usd_per_1k_tokens: f64,
    pub max_output_tokens: u32,
}

impl Default for PricingModel {
    fn default() -> Self {
        Self {
            input_usd_per_1k_tokens: 0.00015,
            output_usd_per_1k_tokens: 0.0006,
            max_output_tokens: 2_000,
        }
    }
}

impl PricingModel {
    /// Prompt tokens estimated at one per four characters, output at the cap.
    pub fn estimate(&self, prompt_chars: usize) -> f64 {
        let input_tokens = prompt_chars.div_ceil(CHARS_PER_TOKEN) as f64;
        let output_tokens = f64::from(self.max_output_tokens);
        input_tokens / 1000.0 * self.input_usd_per_1k_tokens
            + output_tokens / 1000.0 * self.output_usd_per_1k_tokens
    }
}

/// Gatekeeper consulted before every fallback call.
#[derive(Clone)]
pub struct CostGuard {
    store: Arc<dyn UsageStore>,
    limits: CostLimits,
    pricing: PricingModel,
}

impl CostGuard {
    pub fn new(store: Arc<dyn UsageStore>, limits: CostLimits, pricing: PricingModel) -> Self {
        Self {
            store,
            limits,
            pricing,
        }
    }

    pub fn in_memory(limits: CostLimits) -> Self {
        Self::new(
            Arc::new(InMemoryUsageStore::new()),
            limits,
            PricingModel::default(),
        )
    }

    pub fn limits(&self) -> CostLimits {
        self.limits
    }

    pub fn estimate(&self, prompt_chars: usize) -> f64 {
        self.pricing.estimate(prompt_chars)
    }

    /// Reserve one call for `client_id` on today's UTC date.
    pub fn authorize(&self, client_id: &str, estimated_cost: f64) -> Result<(), CostDenial> {
        self.authorize_on(Utc::now().date_naive(), client_id, estimated_cost)
    }

    pub fn authorize_on(
        &self,
        day: NaiveDate,
        client_id: &str,
        estimated_cost: f64,
    ) -> Result<(), CostDenial> {
        let result = self
            .store
            .try_reserve(day, client_id, estimated_cost, &self.limits);
        match &result {
            Ok(()) => tracing::debug!(client_id, estimated_cost, "Fallback call authorized"),
            Err(denial) => tracing::info!(
                client_id,
                code = denial.code(),
                "Fallback call denied by cost guard"
            ),
        }
        result
    }

    pub fn usage_today(&self) -> DailyUsage {
        self.store.usage(Utc::now().date_naive())
    }

    pub fn reset(&self) {
        self.store.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 9, d).unwrap()
    }

    fn guard(budget: f64, per_client: u32) -> CostGuard {
        CostGuard::in_memory(CostLimits {
            daily_budget_usd: budget,
            per_client_daily_calls: per_client,
        })
    }

    #[test]
    fn client_cap_denies_the_call_past_the_limit() {
        let g = guard(100.0, 2);
        assert!(g.authorize_on(day(1), "alice", 0.01).is_ok());
        assert!(g.authorize_on(day(1), "alice", 0.01).is_ok());
        let denial = g.authorize_on(day(1), "alice", 0.01).unwrap_err();
        assert_eq!(denial.code(), "client-cap-reached");
        assert!(g.authorize_on(day(1), "bob", 0.01).is_ok());
    }

    #[test]
    fn budget_denies_when_estimate_would_exceed() {
        let g = guard(1.0, 100);
        assert!(g.authorize_on(day(1), "a", 0.6).is_ok());
        let denial = g.authorize_on(day(1), "b", 0.5).unwrap_err();
        assert_eq!(denial.code(), "daily-budget-exceeded");
        // Exactly reaching the budget is allowed.
        assert!(g.authorize_on(day(1), "b", 0.4).is_ok());
    }

    #[test]
    fn denied_calls_are_not_counted() {
        let store = Arc::new(InMemoryUsageStore::new());
        let g = CostGuard::new(
            store.clone(),
            CostLimits {
                daily_budget_usd: 0.5,
                per_client_daily_calls: 5,
            },
            PricingModel::default(),
        );
        assert!(g.authorize_on(day(1), "a", 0.9).is_err());
        assert_eq!(store.usage(day(1)).calls, 0);
        assert_eq!(store.client_calls(day(1), "a"), 0);
    }

    #[test]
    fn counters_roll_over_with_the_date() {
        let g = guard(1.0, 1);
        assert!(g.authorize_on(day(1), "a", 0.9).is_ok());
        assert!(g.authorize_on(day(1), "a", 0.05).is_err());
        assert!(g.authorize_on(day(2), "a", 0.9).is_ok());
    }

    #[test]
    fn reset_clears_everything() {
        let g = guard(1.0, 1);
        assert!(g.authorize_on(day(1), "a", 0.9).is_ok());
        g.reset();
        assert!(g.authorize_on(day(1), "a", 0.9).is_ok());
    }

    #[test]
    fn estimate_rounds_tokens_up() {
        let pricing = PricingModel {
            input_usd_per_1k_tokens: 1.0,
            output_usd_per_1k_tokens: 2.0,
            max_output_tokens: 500,
        };
        // 4001 chars -> 1001 tokens.
        let cost = pricing.estimate(4_001);
        assert!((cost - (1.001 + 1.0)).abs() < 1e-9);
    }
}
