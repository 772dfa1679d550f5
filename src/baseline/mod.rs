//! Deterministic baseline metric engine.
//!
//! Six pure graph traversals, no LLM involved, each producing one evidence
//! record with a value, a threshold, and a pass/warn/fail verdict. The
//! overall risk level is read off a fixed rule table from the per-metric
//! verdicts, the same way every run, on the same graph generation, reaches
//! the same answer (determinism is the whole point of this module).

mod cache;
mod rules;

pub use cache::{BaselineCache, CacheKey};
pub use rules::RiskLevel;

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use petgraph::stable_graph::NodeIndex;
use tracing::instrument;

use crate::config::Config;
use crate::graph::PropertyGraph;
use crate::model::{CausedByEdge, Incident};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Pass,
    Warn,
    Fail,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricKind {
    Coupling,
    TopCoChange,
    TestToSourceRatio,
    Churn,
    OwnershipStability,
    IncidentDensity,
}

#[derive(Debug, Clone)]
pub struct MetricEvidence {
    pub metric: MetricKind,
    /// `None` only for `TestToSourceRatio` when no test-convention file
    /// exists to measure against — absence of a naming convention is not
    /// itself risk-bearing, so it reports `Warn` rather than `Fail`.
    pub value: Option<f64>,
    pub threshold: f64,
    pub severity: Severity,
    pub supporting_edge_count: usize,
}

#[derive(Debug, Clone)]
pub struct BaselineResult {
    pub canonical_path: String,
    pub metrics: Vec<MetricEvidence>,
    pub risk_level: RiskLevel,
    pub confidence: f64,
    pub escalate_to_agent: bool,
}

/// Extra context the graph alone doesn't carry: the repo-wide churn
/// distribution (for the relative top-decile threshold) and resolved
/// incidents (for windowing incident density by resolution date).
pub struct BaselineContext<'a> {
    pub repo_churn_counts: &'a [u32],
    pub incidents: &'a [Incident],
    pub now: DateTime<Utc>,
}

#[instrument(skip(graph, ctx))]
pub fn evaluate(
    graph: &PropertyGraph,
    file: NodeIndex,
    config: &Config,
    ctx: &BaselineContext,
) -> BaselineResult {
    let canonical_path = graph
        .file(file)
        .map(|f| f.canonical_path.clone())
        .unwrap_or_default();

    let metrics = vec![
        coupling(graph, file, config),
        top_co_change(graph, file, config),
        test_to_source_ratio(graph, file, config),
        churn(graph, file, config, ctx),
        ownership_stability(graph, file, config, ctx.now),
        incident_density(graph, file, config, ctx),
    ];

    let (risk_level, confidence) = rules::classify(&metrics);
    let escalate_to_agent = risk_level >= RiskLevel::Medium;

    BaselineResult {
        canonical_path,
        metrics,
        risk_level,
        confidence,
        escalate_to_agent,
    }
}

fn coupling(graph: &PropertyGraph, file: NodeIndex, config: &Config) -> MetricEvidence {
    let coupled = graph
        .co_changed_neighbors(file)
        .into_iter()
        .filter(|(_, freq)| *freq >= config.co_change_min_frequency)
        .count();
    let severity = if coupled as u32 > config.coupling_count_threshold {
        Severity::Fail
    } else {
        Severity::Pass
    };
    MetricEvidence {
        metric: MetricKind::Coupling,
        value: Some(coupled as f64),
        threshold: config.coupling_count_threshold as f64,
        severity,
        supporting_edge_count: coupled,
    }
}

fn top_co_change(graph: &PropertyGraph, file: NodeIndex, config: &Config) -> MetricEvidence {
    let neighbors = graph.co_changed_neighbors(file);
    let max_freq = neighbors.iter().map(|(_, f)| *f).fold(0.0_f64, f64::max);
    let severity = if max_freq > config.top_co_change_threshold {
        Severity::Fail
    } else {
        Severity::Pass
    };
    MetricEvidence {
        metric: MetricKind::TopCoChange,
        value: Some(max_freq),
        threshold: config.top_co_change_threshold,
        severity,
        supporting_edge_count: neighbors.len(),
    }
}

/// Approximates "size" as the file's CodeBlock count, since the graph
/// doesn't track line counts directly; a file with more functions than its
/// matching test file(s) combined is scored as under-tested.
fn test_to_source_ratio(graph: &PropertyGraph, file: NodeIndex, config: &Config) -> MetricEvidence {
    let Some(target) = graph.file(file) else {
        return MetricEvidence {
            metric: MetricKind::TestToSourceRatio,
            value: None,
            threshold: config.test_to_source_ratio_threshold,
            severity: Severity::Warn,
            supporting_edge_count: 0,
        };
    };

    let test_files: Vec<NodeIndex> = graph
        .all_files()
        .filter(|(idx, f)| *idx != file && is_test_convention_match(&target.canonical_path, &f.canonical_path))
        .map(|(idx, _)| idx)
        .collect();

    if test_files.is_empty() {
        return MetricEvidence {
            metric: MetricKind::TestToSourceRatio,
            value: None,
            threshold: config.test_to_source_ratio_threshold,
            severity: Severity::Warn,
            supporting_edge_count: 0,
        };
    }

    let test_size: usize = test_files.iter().map(|&idx| graph.contains_count(idx)).sum();
    let source_size = graph.contains_count(file).max(1);
    let ratio = test_size as f64 / source_size as f64;

    let severity = if ratio < config.test_to_source_ratio_threshold {
        Severity::Fail
    } else {
        Severity::Pass
    };
    MetricEvidence {
        metric: MetricKind::TestToSourceRatio,
        value: Some(ratio),
        threshold: config.test_to_source_ratio_threshold,
        severity,
        supporting_edge_count: test_files.len(),
    }
}

fn is_test_convention_match(source_path: &str, candidate_path: &str) -> bool {
    let stem = source_path
        .rsplit('/')
        .next()
        .unwrap_or(source_path)
        .split('.')
        .next()
        .unwrap_or(source_path);
    let candidate_name = candidate_path.rsplit('/').next().unwrap_or(candidate_path);
    candidate_name.contains(&format!("{stem}_test"))
        || candidate_name.contains(&format!("test_{stem}"))
        || candidate_name.contains(&format!("{stem}.test"))
}

fn churn(graph: &PropertyGraph, file: NodeIndex, config: &Config, ctx: &BaselineContext) -> MetricEvidence {
    let cutoff = ctx.now - chrono::Duration::days(config.churn_window_days);
    let recent = graph
        .modifies_edges_for_file(file)
        .into_iter()
        .filter(|(commit, _)| {
            graph
                .commit(*commit)
                .map(|c| c.author_date >= cutoff)
                .unwrap_or(false)
        })
        .count();

    let percentile = percentile_rank(recent as u32, ctx.repo_churn_counts);
    let severity = if percentile >= 0.9 { Severity::Fail } else { Severity::Pass };
    MetricEvidence {
        metric: MetricKind::Churn,
        value: Some(recent as f64),
        threshold: 0.9,
        severity,
        supporting_edge_count: recent,
    }
}

fn percentile_rank(value: u32, distribution: &[u32]) -> f64 {
    if distribution.is_empty() {
        return 0.0;
    }
    let below = distribution.iter().filter(|&&v| v <= value).count();
    below as f64 / distribution.len() as f64
}

/// Walks commits touching the file, newest first, to find the two most
/// recent distinct authors and the date ownership passed from one to the
/// other. A file with a single author throughout has no transition, and is
/// reported as stable (`Pass`) regardless of the window.
fn ownership_stability(
    graph: &PropertyGraph,
    file: NodeIndex,
    config: &Config,
    now: DateTime<Utc>,
) -> MetricEvidence {
    let mut touches: Vec<(DateTime<Utc>, String)> = graph
        .modifies_edges_for_file(file)
        .into_iter()
        .filter_map(|(commit, _)| {
            let commit_data = graph.commit(commit)?;
            let author = graph.author_of_commit(commit).and_then(|d| graph.developer(d))?;
            Some((commit_data.author_date, author.email.clone()))
        })
        .collect();
    touches.sort_by(|a, b| b.0.cmp(&a.0));

    let current_owner = touches.first().map(|(_, email)| email.clone());
    let transition = current_owner.as_ref().and_then(|owner| {
        touches
            .iter()
            .find(|(_, email)| email != owner)
            .map(|(date, _)| *date)
    });

    let (value, severity) = match transition {
        Some(transition_date) => {
            let days_since = (now - transition_date).num_days().max(0) as f64;
            let severity = if days_since <= config.ownership_transition_risk_days as f64 {
                Severity::Fail
            } else {
                Severity::Pass
            };
            (Some(days_since), severity)
        }
        None => (None, Severity::Pass),
    };

    MetricEvidence {
        metric: MetricKind::OwnershipStability,
        value,
        threshold: config.ownership_transition_risk_days as f64,
        severity,
        supporting_edge_count: touches.len(),
    }
}

fn incident_density(
    graph: &PropertyGraph,
    file: NodeIndex,
    config: &Config,
    ctx: &BaselineContext,
) -> MetricEvidence {
    let cutoff = ctx.now - chrono::Duration::days(config.incident_density_window_days);
    let resolved_by_issue: HashMap<u64, DateTime<Utc>> = ctx
        .incidents
        .iter()
        .filter_map(|i| i.resolved_at.map(|at| (i.issue_number, at)))
        .collect();

    let edges: Vec<&CausedByEdge> = graph
        .caused_by_edges_for_file(file)
        .into_iter()
        .filter(|e| e.confidence >= config.incident_count_min_confidence)
        .filter(|e| {
            resolved_by_issue
                .get(&e.issue_number)
                .map(|at| *at >= cutoff)
                .unwrap_or(false)
        })
        .collect();

    let distinct_issues: std::collections::HashSet<u64> = edges.iter().map(|e| e.issue_number).collect();
    let count = distinct_issues.len();
    let severity = if count as u32 >= config.incident_count_fail_threshold {
        Severity::Fail
    } else if count > 0 {
        Severity::Warn
    } else {
        Severity::Pass
    };
    MetricEvidence {
        metric: MetricKind::IncidentDensity,
        value: Some(count as f64),
        threshold: 0.0,
        severity,
        supporting_edge_count: edges.len(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{FileChangeStatus, FileEntity, ModifiesEdge};

    fn file(path: &str) -> FileEntity {
        FileEntity {
            canonical_path: path.to_string(),
            historical_paths: vec![path.to_string()],
            language: None,
            branch: "main".into(),
            last_known_sha: None,
        }
    }

    #[test]
    fn coupling_fails_above_threshold() {
        let mut g = PropertyGraph::new();
        let config = Config {
            coupling_count_threshold: 1,
            co_change_min_frequency: 0.1,
            ..Config::default()
        };
        let a = g.upsert_file(file("a.rs"));
        let b = g.upsert_file(file("b.rs"));
        let c = g.upsert_file(file("c.rs"));
        g.upsert_co_changed_pair(
            a,
            b,
            crate::model::CoChangedEdge {
                file_a: "a.rs".into(),
                file_b: "b.rs".into(),
                frequency: 0.5,
                co_change_count: 3,
                window_days: 90,
            },
        );
        g.upsert_co_changed_pair(
            a,
            c,
            crate::model::CoChangedEdge {
                file_a: "a.rs".into(),
                file_b: "c.rs".into(),
                frequency: 0.5,
                co_change_count: 3,
                window_days: 90,
            },
        );
        let ctx = BaselineContext {
            repo_churn_counts: &[],
            incidents: &[],
            now: Utc::now(),
        };
        let evidence = coupling(&g, a, &config);
        assert_eq!(evidence.severity, Severity::Fail);
    }

    #[test]
    fn test_to_source_ratio_is_none_without_convention_match() {
        let mut g = PropertyGraph::new();
        let config = Config::default();
        let a = g.upsert_file(file("src/lonely.rs"));
        let evidence = test_to_source_ratio(&g, a, &config);
        assert!(evidence.value.is_none());
        assert_eq!(evidence.severity, Severity::Warn);
    }

    #[test]
    fn churn_is_relative_to_repo_distribution() {
        let mut g = PropertyGraph::new();
        let config = Config::default();
        let file_idx = g.upsert_file(file("hot.rs"));
        let commit = g.upsert_commit(crate::model::Commit {
            sha: "abc".into(),
            author_email: "a@b.com".into(),
            author_date: Utc::now(),
            message: String::new(),
            additions: 1,
            deletions: 0,
            files_changed: 1,
            parent_shas: vec![],
            topological_index: Some(0),
        });
        g.upsert_modifies(
            commit,
            file_idx,
            ModifiesEdge {
                commit_sha: "abc".into(),
                canonical_file_path: "hot.rs".into(),
                additions: 1,
                deletions: 0,
                status: FileChangeStatus::Modified,
            },
        )
        .unwrap();
        let distribution = [0, 0, 0, 1];
        let ctx = BaselineContext {
            repo_churn_counts: &distribution,
            incidents: &[],
            now: Utc::now(),
        };
        let evidence = churn(&g, file_idx, &config, &ctx);
        assert_eq!(evidence.severity, Severity::Fail);
    }

    #[test]
    fn incident_density_fails_at_two_or_more_qualifying_issues() {
        let mut g = PropertyGraph::new();
        let config = Config::default();
        let file_idx = g.upsert_file(file("risky.rs"));
        let now = Utc::now();

        for issue_number in [1_u64, 2_u64] {
            let incident_idx = g.upsert_incident(issue_number);
            g.upsert_caused_by(
                incident_idx,
                file_idx,
                crate::model::CausedByEdge {
                    issue_number,
                    canonical_file_path: "risky.rs".into(),
                    block_name: None,
                    confidence: 0.9,
                    evidence_source: crate::model::EvidenceSource::TimelineEvent,
                },
            );
        }

        let incidents = vec![
            crate::model::Incident {
                issue_number: 1,
                fixing_commit_shas: vec![],
                resolved_at: Some(now),
            },
            crate::model::Incident {
                issue_number: 2,
                fixing_commit_shas: vec![],
                resolved_at: Some(now),
            },
        ];
        let ctx = BaselineContext {
            repo_churn_counts: &[],
            incidents: &incidents,
            now,
        };
        let evidence = incident_density(&g, file_idx, &config, &ctx);
        assert_eq!(evidence.severity, Severity::Fail);
    }
}
