//! Bounded-hop investigation agent, invoked only when the baseline escalates.
//! Structured as an Intent→Run→Evidence→Decision lifecycle (see DESIGN.md):
//! each hop plays the role of a Run, the parsed LLM response is this crate's
//! Decision, and `Provenance`/`TokenUsage` track the same accounting problem
//! regardless of domain — how many tokens did this model call cost, across
//! how many calls.
//!
//! The concrete LLM vendor is a caller-supplied `LlmClient`; this module
//! owns only the loop, the prompt shape, and the termination rule.

mod classifier;
mod concurrency;
mod provenance;

pub use classifier::{HeuristicClassifier, ModificationClassifier, ModificationType};
pub use concurrency::investigate_many;
pub use provenance::{Provenance, TokenUsage};

use std::collections::BTreeSet;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use petgraph::stable_graph::NodeIndex;
use serde::Deserialize;
use tracing::{debug, instrument, warn};

use crate::baseline::{BaselineResult, RiskLevel};
use crate::config::Config;
use crate::errors::CoreError;
use crate::graph::PropertyGraph;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier2Metric {
    OwnershipChurn,
    IncidentSimilarity,
    Complexity,
}

#[derive(Debug, Clone, PartialEq)]
pub enum NextAction {
    Finalize,
    GatherMoreEvidence { metric: Tier2Metric },
    ExpandGraph { depth: u32 },
}

#[derive(Debug, Clone)]
pub struct HopRecord {
    pub hop_number: u32,
    pub at: DateTime<Utc>,
    pub confidence: f64,
    pub reasoning: String,
    pub next_action: NextAction,
    pub token_usage: TokenUsage,
}

#[derive(Debug, Clone)]
pub struct Assessment {
    pub canonical_path: String,
    pub risk_level: RiskLevel,
    pub score: f64,
    pub confidence: f64,
    pub investigation_trace: Vec<HopRecord>,
    pub provenance: Provenance,
    /// Set when the loop stopped for a reason other than a confident
    /// FINALIZE: hop ceiling, wall-clock budget, or two consecutive parse
    /// failures. The caller should present the result as provisional.
    pub budget_exhausted: bool,
}

/// One raw LLM call. The vendor, auth, and transport are entirely the
/// caller's concern; this trait exists only so `investigate()` doesn't
/// depend on a specific provider.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, prompt: &str, timeout: Duration) -> Result<(String, TokenUsage), CoreError>;
}

#[derive(Debug, Deserialize)]
struct RawResponse {
    confidence: f64,
    reasoning: String,
    next_action: String,
    #[serde(default)]
    metric: Option<String>,
    #[serde(default)]
    depth: Option<u32>,
}

fn parse_response(raw: &str) -> Result<RawResponse, CoreError> {
    serde_json::from_str(raw).map_err(|e| CoreError::parse_failure("agent_response", e.to_string()))
}

fn to_next_action(raw: &RawResponse) -> NextAction {
    match raw.next_action.as_str() {
        "FINALIZE" => NextAction::Finalize,
        "GATHER_MORE_EVIDENCE" => {
            let metric = match raw.metric.as_deref() {
                Some("incident_similarity") => Tier2Metric::IncidentSimilarity,
                Some("complexity") => Tier2Metric::Complexity,
                _ => Tier2Metric::OwnershipChurn,
            };
            NextAction::GatherMoreEvidence { metric }
        }
        "EXPAND_GRAPH" => NextAction::ExpandGraph {
            depth: raw.depth.unwrap_or(2),
        },
        other => {
            warn!(action = other, "unrecognized next_action, treating as FINALIZE");
            NextAction::Finalize
        }
    }
}

/// Rough token count for the rendered prompt, used only for logging —
/// the hard budget enforced by the loop is wall-clock and hop count, not
/// tokens, but surfacing the estimate helps diagnose a provider's own
/// context-length rejections.
fn estimate_tokens(text: &str) -> usize {
    match tiktoken_rs::cl100k_base() {
        Ok(bpe) => bpe.encode_ordinary(text).len(),
        Err(_) => text.split_whitespace().count(),
    }
}

fn truncate_diff(diff_text: &str, max_lines: usize) -> String {
    let lines: Vec<&str> = diff_text.lines().collect();
    if lines.len() <= max_lines {
        diff_text.to_string()
    } else {
        lines[..max_lines].join("\n")
    }
}

fn render_prompt(
    baseline: &BaselineResult,
    modification_type: ModificationType,
    diff_text: &str,
    trace: &[HopRecord],
    evidence: Option<&str>,
) -> String {
    let prior_hops: String = trace
        .iter()
        .map(|h| format!("hop {}: confidence={:.2} reasoning={}", h.hop_number, h.confidence, h.reasoning))
        .collect::<Vec<_>>()
        .join("\n");
    let evidence_block = evidence.map(|e| format!("\ngathered_evidence:\n{e}\n")).unwrap_or_default();

    format!(
        "file: {}\nrisk_level: {:?}\nmodification_type: {:?}\nprior_hops:\n{}{}\ndiff:\n{}\n\nRespond with a JSON object: {{\"confidence\": <0..1>, \"reasoning\": <string>, \"next_action\": \"FINALIZE\"|\"GATHER_MORE_EVIDENCE\"|\"EXPAND_GRAPH\"}}",
        baseline.canonical_path, baseline.risk_level, modification_type, prior_hops, evidence_block, diff_text,
    )
}

/// Answers a `GatherMoreEvidence` request by pulling the requested tier-2
/// signal straight from the graph, so the next hop's prompt carries a real
/// measurement instead of the model re-asking the same question blind.
fn gather_tier2_evidence(graph: &PropertyGraph, file: NodeIndex, metric: Tier2Metric) -> String {
    match metric {
        Tier2Metric::OwnershipChurn => {
            let mut authors = BTreeSet::new();
            for (commit, _edge) in graph.modifies_edges_for_file(file) {
                if let Some(dev_idx) = graph.author_of_commit(commit) {
                    if let Some(dev) = graph.developer(dev_idx) {
                        authors.insert(dev.email.clone());
                    }
                }
            }
            format!(
                "ownership_churn: {} distinct author(s) touched this file: {}",
                authors.len(),
                authors.into_iter().collect::<Vec<_>>().join(", ")
            )
        }
        Tier2Metric::IncidentSimilarity => {
            let edges = graph.caused_by_edges_for_file(file);
            if edges.is_empty() {
                return "incident_similarity: no recorded incidents reference this file".to_string();
            }
            let summary: Vec<String> = edges
                .iter()
                .map(|e| format!("issue #{} (confidence {:.2})", e.issue_number, e.confidence))
                .collect();
            format!("incident_similarity: {} linked incident(s): {}", edges.len(), summary.join(", "))
        }
        Tier2Metric::Complexity => {
            format!("complexity: file contains {} parsed code block(s)", graph.contains_count(file))
        }
    }
}

/// Answers an `ExpandGraph` request with a breadth-first walk over
/// CO_CHANGED edges, up to `depth` hops, so the model can reason about
/// coupling beyond the direct neighbors the baseline already considered.
fn expand_graph_evidence(graph: &PropertyGraph, file: NodeIndex, depth: u32) -> String {
    let mut visited = BTreeSet::new();
    visited.insert(file);
    let mut frontier = vec![file];
    let mut discovered: Vec<(String, f64)> = Vec::new();

    for _ in 0..depth.max(1) {
        let mut next_frontier = Vec::new();
        for node in frontier {
            for (neighbor, frequency) in graph.co_changed_neighbors(node) {
                if visited.insert(neighbor) {
                    if let Some(f) = graph.file(neighbor) {
                        discovered.push((f.canonical_path.clone(), frequency));
                    }
                    next_frontier.push(neighbor);
                }
            }
        }
        frontier = next_frontier;
    }

    if discovered.is_empty() {
        return format!("expand_graph(depth={depth}): no additional co-changed files found");
    }
    let summary: Vec<String> = discovered.iter().map(|(p, f)| format!("{p} (frequency {f:.2})")).collect();
    format!("expand_graph(depth={depth}): {} file(s) within range: {}", discovered.len(), summary.join(", "))
}

/// Runs the bounded investigation loop over a single file's baseline
/// result. Ends on FINALIZE, on reaching the confidence early-stop, on the
/// hop ceiling, on the wall-clock budget, or on two consecutive response
/// parse failures — whichever comes first.
#[instrument(skip(llm, classifier, diff_text, graph))]
pub async fn investigate(
    baseline: &BaselineResult,
    diff_text: &str,
    graph: &PropertyGraph,
    file: NodeIndex,
    classifier: &dyn ModificationClassifier,
    llm: &dyn LlmClient,
    config: &Config,
) -> Assessment {
    let started = Instant::now();
    let wall_clock_budget = config.agent_wall_clock_budget();
    let mut provenance = Provenance::new("configured-provider", "configured-model");
    let mut confidence = baseline.confidence;
    let mut trace: Vec<HopRecord> = Vec::new();
    let modification_type = classifier.classify(&baseline.canonical_path, diff_text);
    let truncated_diff = truncate_diff(diff_text, config.agent_diff_truncation_lines);
    let mut budget_exhausted = false;
    let mut pending_evidence: Option<String> = None;

    for hop in 1..=config.agent_max_hops {
        if started.elapsed() >= wall_clock_budget {
            budget_exhausted = true;
            break;
        }

        let prompt = render_prompt(baseline, modification_type, &truncated_diff, &trace, pending_evidence.as_deref());
        debug!(hop, tokens = estimate_tokens(&prompt), "sending investigation prompt");
        let (raw_text, usage) = match llm.complete(&prompt, config.agent_llm_call_timeout()).await {
            Ok(r) => r,
            Err(e) => {
                warn!(error = %e, hop, "llm call failed, falling back to baseline");
                budget_exhausted = true;
                break;
            }
        };

        let parsed = match parse_response(&raw_text) {
            Ok(p) => p,
            Err(_) => {
                warn!(hop, "first parse failure, retrying once");
                let (retry_text, retry_usage) = match llm.complete(&prompt, config.agent_llm_call_timeout()).await {
                    Ok(r) => r,
                    Err(_) => {
                        budget_exhausted = true;
                        break;
                    }
                };
                provenance.record_hop(usage);
                match parse_response(&retry_text) {
                    Ok(p) => {
                        provenance.record_hop(retry_usage);
                        p
                    }
                    Err(_) => {
                        warn!(hop, "second parse failure, falling back to baseline");
                        budget_exhausted = true;
                        break;
                    }
                }
            }
        };

        provenance.record_hop(usage);
        confidence = parsed.confidence;
        let next_action = to_next_action(&parsed);

        trace.push(HopRecord {
            hop_number: hop,
            at: Utc::now(),
            confidence: parsed.confidence,
            reasoning: parsed.reasoning,
            next_action: next_action.clone(),
            token_usage: usage,
        });

        let should_stop = matches!(next_action, NextAction::Finalize) || confidence >= config.agent_confidence_early_stop;
        if should_stop {
            break;
        }

        pending_evidence = match &next_action {
            NextAction::GatherMoreEvidence { metric } => Some(gather_tier2_evidence(graph, file, *metric)),
            NextAction::ExpandGraph { depth } => Some(expand_graph_evidence(graph, file, *depth)),
            NextAction::Finalize => None,
        };

        if hop == config.agent_max_hops {
            budget_exhausted = true;
        }
    }

    provenance.budget_exhausted = budget_exhausted;

    Assessment {
        canonical_path: baseline.canonical_path.clone(),
        risk_level: baseline.risk_level,
        score: confidence * 10.0,
        confidence,
        investigation_trace: trace,
        provenance,
        budget_exhausted,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::baseline::MetricEvidence;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct ScriptedClient {
        responses: Vec<&'static str>,
        calls: AtomicU32,
    }

    #[async_trait]
    impl LlmClient for ScriptedClient {
        async fn complete(&self, _prompt: &str, _timeout: Duration) -> Result<(String, TokenUsage), CoreError> {
            let idx = self.calls.fetch_add(1, Ordering::SeqCst) as usize;
            let text = self.responses.get(idx).copied().unwrap_or(self.responses.last().unwrap());
            Ok((
                text.to_string(),
                TokenUsage {
                    input_tokens: 10,
                    output_tokens: 5,
                    total_tokens: 15,
                },
            ))
        }
    }

    fn baseline() -> BaselineResult {
        BaselineResult {
            canonical_path: "auth.go".into(),
            metrics: Vec::<MetricEvidence>::new(),
            risk_level: RiskLevel::Medium,
            confidence: 0.5,
            escalate_to_agent: true,
        }
    }

    fn graph_with_file(path: &str) -> (PropertyGraph, NodeIndex) {
        let mut graph = PropertyGraph::new();
        let idx = graph.upsert_file(crate::model::FileEntity {
            canonical_path: path.to_string(),
            historical_paths: vec![path.to_string()],
            language: None,
            branch: "main".to_string(),
            last_known_sha: None,
        });
        (graph, idx)
    }

    #[tokio::test]
    async fn finalize_on_first_hop_stops_the_loop() {
        let client = ScriptedClient {
            responses: vec![r#"{"confidence":0.9,"reasoning":"clear","next_action":"FINALIZE"}"#],
            calls: AtomicU32::new(0),
        };
        let config = Config::default();
        let (graph, file) = graph_with_file("auth.go");
        let result = investigate(&baseline(), "diff text", &graph, file, &HeuristicClassifier, &client, &config).await;
        assert_eq!(result.investigation_trace.len(), 1);
        assert!(!result.budget_exhausted);
        assert_eq!(result.confidence, 0.9);
        assert_eq!(result.provenance.hops_used, 1);
    }

    #[tokio::test]
    async fn hop_ceiling_marks_budget_exhausted_below_threshold() {
        let client = ScriptedClient {
            responses: vec![r#"{"confidence":0.4,"reasoning":"still unsure","next_action":"GATHER_MORE_EVIDENCE","metric":"complexity"}"#],
            calls: AtomicU32::new(0),
        };
        let config = Config {
            agent_max_hops: 2,
            ..Config::default()
        };
        let (graph, file) = graph_with_file("auth.go");
        let result = investigate(&baseline(), "diff text", &graph, file, &HeuristicClassifier, &client, &config).await;
        assert_eq!(result.investigation_trace.len(), 2);
        assert!(result.budget_exhausted);
        assert!(result.provenance.budget_exhausted);
    }

    #[tokio::test]
    async fn malformed_response_falls_back_after_two_failures() {
        let client = ScriptedClient {
            responses: vec!["not json", "still not json"],
            calls: AtomicU32::new(0),
        };
        let config = Config::default();
        let (graph, file) = graph_with_file("auth.go");
        let result = investigate(&baseline(), "diff text", &graph, file, &HeuristicClassifier, &client, &config).await;
        assert!(result.investigation_trace.is_empty());
        assert!(result.budget_exhausted);
    }

    #[test]
    fn gather_tier2_evidence_reports_ownership_churn_authors() {
        let (mut graph, file) = graph_with_file("auth.go");
        let commit_idx = graph.upsert_commit(crate::model::Commit {
            sha: "abc".into(),
            author_email: "dev@example.com".into(),
            author_date: Utc::now(),
            message: String::new(),
            additions: 0,
            deletions: 0,
            files_changed: 0,
            parent_shas: vec![],
            topological_index: Some(0),
        });
        let dev_idx = graph.upsert_developer(crate::model::Developer {
            email: "dev@example.com".into(),
            display_name: "dev".into(),
            first_commit_at: Utc::now(),
            last_commit_at: Utc::now(),
            commit_count: 1,
        });
        graph.upsert_authored(dev_idx, commit_idx);
        graph
            .upsert_modifies(
                commit_idx,
                file,
                crate::model::ModifiesEdge {
                    commit_sha: "abc".into(),
                    canonical_file_path: "auth.go".into(),
                    additions: 1,
                    deletions: 0,
                    status: crate::model::FileChangeStatus::Modified,
                },
            )
            .unwrap();

        let evidence = gather_tier2_evidence(&graph, file, Tier2Metric::OwnershipChurn);
        assert!(evidence.contains("1 distinct author"));
        assert!(evidence.contains("dev@example.com"));
    }

    #[test]
    fn expand_graph_evidence_walks_two_hops_of_co_change() {
        let (mut graph, hot) = graph_with_file("auth.go");
        let mid = graph.upsert_file(crate::model::FileEntity {
            canonical_path: "session.go".into(),
            historical_paths: vec!["session.go".into()],
            language: None,
            branch: "main".into(),
            last_known_sha: None,
        });
        let far = graph.upsert_file(crate::model::FileEntity {
            canonical_path: "token.go".into(),
            historical_paths: vec!["token.go".into()],
            language: None,
            branch: "main".into(),
            last_known_sha: None,
        });
        graph.upsert_co_changed_pair(
            hot,
            mid,
            crate::model::CoChangedEdge {
                file_a: "auth.go".into(),
                file_b: "session.go".into(),
                frequency: 0.8,
                co_change_count: 5,
                window_days: 90,
            },
        );
        graph.upsert_co_changed_pair(
            mid,
            far,
            crate::model::CoChangedEdge {
                file_a: "session.go".into(),
                file_b: "token.go".into(),
                frequency: 0.6,
                co_change_count: 3,
                window_days: 90,
            },
        );

        let one_hop = expand_graph_evidence(&graph, hot, 1);
        assert!(one_hop.contains("session.go"));
        assert!(!one_hop.contains("token.go"));

        let two_hop = expand_graph_evidence(&graph, hot, 2);
        assert!(two_hop.contains("session.go"));
        assert!(two_hop.contains("token.go"));
    }
}
