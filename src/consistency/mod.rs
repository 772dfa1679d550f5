//! Consistency validator: compares staging-store counts against
//! graph counts after a bulk ingestion or graph build, and flags the
//! repository `needs_sync` when any entity kind has drifted.

use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::graph::PropertyGraph;

/// Per-entity-kind counts from one store. Both the staging and graph sides
/// produce this same shape so they can be compared field-by-field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityCounts {
    pub commits: u64,
    pub issues: u64,
    pub pull_requests: u64,
    pub files: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStatus {
    Passed,
    NeedsSync,
}

#[derive(Debug, Clone, Copy)]
pub struct KindVariance {
    pub staging_count: u64,
    pub graph_count: u64,
    /// `graph_count / staging_count * 100`; `100.0` when staging is empty
    /// and the graph is too (nothing to drift).
    pub variance_pct: f64,
}

impl KindVariance {
    fn compute(staging_count: u64, graph_count: u64) -> Self {
        let variance_pct = if staging_count == 0 {
            if graph_count == 0 { 100.0 } else { 0.0 }
        } else {
            graph_count as f64 / staging_count as f64 * 100.0
        };
        Self {
            staging_count,
            graph_count,
            variance_pct,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SyncReport {
    pub status: SyncStatus,
    pub commits: KindVariance,
    pub issues: KindVariance,
    pub pull_requests: KindVariance,
    pub files: KindVariance,
}

impl SyncReport {
    /// The per-kind entries whose variance fell below the pass threshold,
    /// for logging ("the diff is logged per-kind").
    pub fn failing_kinds(&self, config: &Config) -> Vec<(&'static str, KindVariance)> {
        [
            ("commits", self.commits),
            ("issues", self.issues),
            ("pull_requests", self.pull_requests),
            ("files", self.files),
        ]
        .into_iter()
        .filter(|(_, v)| v.variance_pct < config.consistency_variance_pass_pct)
        .collect()
    }
}

/// Graph-side counts, derived by scanning the in-memory property graph.
/// Only `files` is counted this way today — commit/issue/PR nodes aren't
/// yet modeled with a cheap kind-filtered iterator, so the caller is
/// expected to supply those counts directly when available.
pub fn graph_file_count(graph: &PropertyGraph) -> u64 {
    graph.all_files().count() as u64
}

/// Computes the sync report from a staging-side count and a graph-side
/// count for each entity kind, per the `graph_count / staging_count * 100`
/// rule. The repository is `PASSED` only if every kind clears
/// `config.consistency_variance_pass_pct` (default 95%).
pub fn validate(staging: &EntityCounts, graph: &EntityCounts, config: &Config) -> SyncReport {
    let commits = KindVariance::compute(staging.commits, graph.commits);
    let issues = KindVariance::compute(staging.issues, graph.issues);
    let pull_requests = KindVariance::compute(staging.pull_requests, graph.pull_requests);
    let files = KindVariance::compute(staging.files, graph.files);

    let all_pass = [commits, issues, pull_requests, files]
        .iter()
        .all(|v| v.variance_pct >= config.consistency_variance_pass_pct);

    SyncReport {
        status: if all_pass { SyncStatus::Passed } else { SyncStatus::NeedsSync },
        commits,
        issues,
        pull_requests,
        files,
    }
}
