//! Plan configuration.
//!
//! Plan numbers are injected into the services that need them (the
//! distribution job, the bootstrap action, the metered gateway) rather than
//! read from a module-level singleton, so tests can run with fixture plans.

use serde::{Deserialize, Serialize};

/// Credit grants and quota limits for the free tier, plus metered-call
/// pricing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanConfig {
    /// Credits granted monthly to users without an active subscription.
    pub monthly_credits: i64,

    /// One-time credits granted at signup.
    pub signup_bonus: i64,

    /// Credits charged per `/api/data` call.
    pub data_cost_per_call: i64,

    /// Prompt characters covered by one credit on `/api/v1/ai/chat`.
    /// A call always costs at least one credit.
    pub chat_chars_per_credit: i64,

    /// Free-tier API call allowance per period. The metered endpoints bill
    /// per call rather than cutting traffic at the allowance; the figure is
    /// plan metadata for usage reporting.
    pub api_call_limit: i64,

    /// Free-tier storage allowance per period, in bytes. Like
    /// [`Self::api_call_limit`], not enforced by the gateway.
    pub storage_limit_bytes: i64,
}

impl PlanConfig {
    /// Credits charged for a chat completion over `prompt_chars` characters
    /// of prompt. Minimum one credit.
    #[must_use]
    pub const fn chat_cost(&self, prompt_chars: i64) -> i64 {
        let cost = prompt_chars / self.chat_chars_per_credit;
        if cost < 1 {
            1
        } else {
            cost
        }
    }
}

impl Default for PlanConfig {
    fn default() -> Self {
        Self {
            monthly_credits: 100,
            signup_bonus: 100,
            data_cost_per_call: 1,
            chat_chars_per_credit: 1000,
            api_call_limit: 10_000,
            storage_limit_bytes: 1024 * 1024 * 1024,
        }
    }
}
