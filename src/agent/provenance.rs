//! Per-investigation LLM accounting, adapted from the Run↔Provenance
//! pairing: one `Provenance` per investigation, normalized token usage
//! across hops so cost and budget checks don't care which provider served
//! a given call.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub total_tokens: u64,
}

impl TokenUsage {
    pub fn add(&mut self, other: TokenUsage) {
        self.input_tokens += other.input_tokens;
        self.output_tokens += other.output_tokens;
        self.total_tokens += other.total_tokens;
    }

    pub fn is_consistent(&self) -> bool {
        self.total_tokens == self.input_tokens + self.output_tokens
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Provenance {
    /// Unique per call to `investigate()`, so a stored `Assessment` can be
    /// traced back to the exact hop sequence that produced it even when two
    /// investigations of the same file overlap in time.
    pub investigation_id: Uuid,
    pub provider: String,
    pub model: String,
    pub hops_used: u32,
    pub token_usage: TokenUsage,
    pub budget_exhausted: bool,
}

impl Provenance {
    pub fn new(provider: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            investigation_id: Uuid::new_v4(),
            provider: provider.into(),
            model: model.into(),
            hops_used: 0,
            token_usage: TokenUsage::default(),
            budget_exhausted: false,
        }
    }

    pub fn record_hop(&mut self, usage: TokenUsage) {
        self.hops_used += 1;
        self.token_usage.add(usage);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_hop_accumulates_usage_and_hop_count() {
        let mut p = Provenance::new("anthropic", "test-model");
        p.record_hop(TokenUsage {
            input_tokens: 100,
            output_tokens: 20,
            total_tokens: 120,
        });
        p.record_hop(TokenUsage {
            input_tokens: 50,
            output_tokens: 10,
            total_tokens: 60,
        });
        assert_eq!(p.hops_used, 2);
        assert_eq!(p.token_usage.total_tokens, 180);
        assert!(p.token_usage.is_consistent());
    }

    #[test]
    fn each_investigation_gets_a_distinct_id() {
        let a = Provenance::new("anthropic", "test-model");
        let b = Provenance::new("anthropic", "test-model");
        assert_ne!(a.investigation_id, b.investigation_id);
    }
}
