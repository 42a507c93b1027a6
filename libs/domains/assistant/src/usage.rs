//! Per-session usage accounting.
//!
//! Counters are monotonic and reset only on explicit session reset.
//! Estimated cost is derived from the counters on every snapshot so a
//! pricing change never leaves a stale cached figure.

use std::sync::Mutex;

use crate::models::UsageCounters;

const TOKENS_PER_RATE_UNIT: f64 = 1_000_000.0;

/// Published per-token rates for a model family, in USD per 1M tokens
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModelPricing {
    pub input_per_mtok: f64,
    pub output_per_mtok: f64,
}

impl ModelPricing {
    /// Rates for Claude 3.7 Sonnet class models
    pub const CLAUDE_SONNET: ModelPricing = ModelPricing {
        input_per_mtok: 3.00,
        output_per_mtok: 15.00,
    };

    /// Rates for Amazon Nova Pro
    pub const NOVA_PRO: ModelPricing = ModelPricing {
        input_per_mtok: 0.80,
        output_per_mtok: 3.20,
    };

    /// Look up rates by model id. Unknown ids fall back to the Claude
    /// rates so cost estimates stay conservative rather than zero.
    pub fn for_model(model_id: &str) -> Self {
        if model_id.contains("nova-pro") {
            Self::NOVA_PRO
        } else {
            Self::CLAUDE_SONNET
        }
    }

    /// Estimated USD cost for the given token counts
    pub fn estimate(&self, prompt_tokens: u64, completion_tokens: u64) -> f64 {
        (prompt_tokens as f64 / TOKENS_PER_RATE_UNIT) * self.input_per_mtok
            + (completion_tokens as f64 / TOKENS_PER_RATE_UNIT) * self.output_per_mtok
    }
}

#[derive(Debug, Default)]
struct RawCounters {
    prompt_tokens: u64,
    completion_tokens: u64,
    tool_call_count: u64,
    request_count: u64,
}

/// Thread-safe usage tracker for one session
#[derive(Debug)]
pub struct UsageTracker {
    pricing: ModelPricing,
    counters: Mutex<RawCounters>,
}

impl UsageTracker {
    pub fn new(model_id: &str) -> Self {
        Self {
            pricing: ModelPricing::for_model(model_id),
            counters: Mutex::new(RawCounters::default()),
        }
    }

    /// Record one model round trip. Called after every model call so
    /// mid-turn reads are current.
    pub fn record(&self, prompt_tokens: u64, completion_tokens: u64, tool_call_count: u64) {
        let mut counters = self.counters.lock().expect("usage lock poisoned");
        counters.prompt_tokens += prompt_tokens;
        counters.completion_tokens += completion_tokens;
        counters.tool_call_count += tool_call_count;
        counters.request_count += 1;
    }

    /// Current counters with cost recomputed from the rates
    pub fn snapshot(&self) -> UsageCounters {
        let counters = self.counters.lock().expect("usage lock poisoned");
        UsageCounters {
            prompt_tokens: counters.prompt_tokens,
            completion_tokens: counters.completion_tokens,
            tool_call_count: counters.tool_call_count,
            request_count: counters.request_count,
            estimated_cost: self
                .pricing
                .estimate(counters.prompt_tokens, counters.completion_tokens),
        }
    }

    /// Zero all counters. Only called on explicit session reset.
    pub fn reset(&self) {
        let mut counters = self.counters.lock().expect("usage lock poisoned");
        *counters = RawCounters::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pricing_lookup() {
        let claude = ModelPricing::for_model("us.anthropic.claude-3-7-sonnet-20250219-v1:0");
        assert_eq!(claude, ModelPricing::CLAUDE_SONNET);

        let nova = ModelPricing::for_model("us.amazon.nova-pro-v1:0");
        assert_eq!(nova, ModelPricing::NOVA_PRO);

        // Unknown ids fall back to Claude rates
        let unknown = ModelPricing::for_model("some-future-model");
        assert_eq!(unknown, ModelPricing::CLAUDE_SONNET);
    }

    #[test]
    fn test_cost_estimate() {
        let cost = ModelPricing::CLAUDE_SONNET.estimate(1_000_000, 1_000_000);
        assert!((cost - 18.0).abs() < f64::EPSILON);

        let cost = ModelPricing::NOVA_PRO.estimate(500_000, 250_000);
        assert!((cost - (0.40 + 0.80)).abs() < 1e-9);
    }

    #[test]
    fn test_counters_are_monotonic_and_cost_recomputed() {
        let tracker = UsageTracker::new("us.anthropic.claude-3-7-sonnet-20250219-v1:0");

        tracker.record(1000, 500, 2);
        let first = tracker.snapshot();
        assert_eq!(first.prompt_tokens, 1000);
        assert_eq!(first.completion_tokens, 500);
        assert_eq!(first.tool_call_count, 2);
        assert_eq!(first.request_count, 1);

        tracker.record(2000, 1000, 0);
        let second = tracker.snapshot();
        assert_eq!(second.prompt_tokens, 3000);
        assert_eq!(second.completion_tokens, 1500);
        assert_eq!(second.tool_call_count, 2);
        assert_eq!(second.request_count, 2);
        assert!(second.estimated_cost > first.estimated_cost);

        let expected = ModelPricing::CLAUDE_SONNET.estimate(3000, 1500);
        assert!((second.estimated_cost - expected).abs() < 1e-12);
    }

    #[test]
    fn test_reset_zeroes_everything() {
        let tracker = UsageTracker::new("any");
        tracker.record(10, 20, 1);
        tracker.reset();
        let snapshot = tracker.snapshot();
        assert_eq!(snapshot, UsageCounters::default());
    }
}
