//! Runtime configuration for the CodeRisk core.
//!
//! A single `Config` struct collects every numeric threshold the baseline,
//! ingestion, and agent modules need, serde-derived so it can be loaded
//! from the host application's configuration file, with a `Default` impl
//! holding the values documented alongside each field.

use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    /// Co-change computation window, in days. Default 90.
    pub co_change_window_days: i64,
    /// Minimum Jaccard frequency for a CO_CHANGED edge to be emitted. Default 0.3.
    pub co_change_min_frequency: f64,
    /// Minimum raw co-change count for a CO_CHANGED edge to be emitted. Default 2.
    pub co_change_min_raw_count: u32,
    /// Coupling count risk threshold. Default 10.
    pub coupling_count_threshold: u32,
    /// Top co-change frequency risk threshold. Default 0.7.
    pub top_co_change_threshold: f64,
    /// Test-to-source ratio risk threshold. Default 0.3.
    pub test_to_source_ratio_threshold: f64,
    /// Ownership-transition lookback window, in days. Default 30.
    pub ownership_transition_window_days: i64,
    /// Recent-transition risk threshold, in days. Default 30.
    pub ownership_transition_risk_days: i64,
    /// Incident density window, in days. Default 90.
    pub incident_density_window_days: i64,
    /// Churn lookback window, in days. Default 90.
    pub churn_window_days: i64,
    /// Baseline metric cache TTL, in seconds. Default 900 (15 min).
    pub baseline_cache_ttl_secs: u64,
    /// Sustained upstream request rate, requests/sec. Default 1.0.
    pub upstream_rate_limit_per_sec: f64,
    /// Upstream rate-limiter burst capacity. Default 1.
    pub upstream_rate_limit_burst: u32,
    /// Retry backoff schedule in seconds. Default [1, 2, 4, 8].
    pub retry_backoff_schedule_secs: Vec<u64>,
    /// Max attempts for a single upstream fetch, including the first try. Default 4.
    pub retry_max_attempts: u32,
    /// Investigation agent hop ceiling. Default 5.
    pub agent_max_hops: u32,
    /// Investigation agent wall-clock budget, in seconds. Default 20.
    pub agent_wall_clock_budget_secs: u64,
    /// Per-LLM-call timeout, in seconds. Default 10.
    pub agent_llm_call_timeout_secs: u64,
    /// Confidence at which the agent may stop early. Default 0.85.
    pub agent_confidence_early_stop: f64,
    /// Graph builder write-batch size, in commits. Default 100.
    pub graph_write_batch_size: usize,
    /// Minimum confidence for a CAUSED_BY edge to count toward `incident_count`. Default 0.7.
    pub incident_count_min_confidence: f64,
    /// Distinct qualifying-incident count at which `incident_density` fails outright rather than warning. Default 2.
    pub incident_count_fail_threshold: u32,
    /// BM25 "similar incident" score threshold. Default 10.0, configuration not invariant.
    pub incident_similarity_threshold: f64,
    /// Consistency validator pass threshold, percent. Default 95.0.
    pub consistency_variance_pass_pct: f64,
    /// File size above which the structure parser skips a file with a diagnostic. Default 2 MiB.
    pub parser_max_file_size_bytes: u64,
    /// Diff truncation length fed to the agent context document. Default 500 lines.
    pub agent_diff_truncation_lines: usize,
}

impl Config {
    pub fn retry_backoff(&self) -> Vec<Duration> {
        self.retry_backoff_schedule_secs
            .iter()
            .map(|s| Duration::from_secs(*s))
            .collect()
    }

    pub fn baseline_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.baseline_cache_ttl_secs)
    }

    pub fn agent_wall_clock_budget(&self) -> Duration {
        Duration::from_secs(self.agent_wall_clock_budget_secs)
    }

    pub fn agent_llm_call_timeout(&self) -> Duration {
        Duration::from_secs(self.agent_llm_call_timeout_secs)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            co_change_window_days: 90,
            co_change_min_frequency: 0.3,
            co_change_min_raw_count: 2,
            coupling_count_threshold: 10,
            top_co_change_threshold: 0.7,
            test_to_source_ratio_threshold: 0.3,
            ownership_transition_window_days: 30,
            ownership_transition_risk_days: 30,
            incident_density_window_days: 90,
            churn_window_days: 90,
            baseline_cache_ttl_secs: 15 * 60,
            upstream_rate_limit_per_sec: 1.0,
            upstream_rate_limit_burst: 1,
            retry_backoff_schedule_secs: vec![1, 2, 4, 8],
            retry_max_attempts: 4,
            agent_max_hops: 5,
            agent_wall_clock_budget_secs: 20,
            agent_llm_call_timeout_secs: 10,
            agent_confidence_early_stop: 0.85,
            graph_write_batch_size: 100,
            incident_count_min_confidence: 0.7,
            incident_count_fail_threshold: 2,
            incident_similarity_threshold: 10.0,
            consistency_variance_pass_pct: 95.0,
            parser_max_file_size_bytes: 2 * 1024 * 1024,
            agent_diff_truncation_lines: 500,
        }
    }
}
