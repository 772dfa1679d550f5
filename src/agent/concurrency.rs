//! Runs N file investigations concurrently, bounded by the same
//! token-bucket limiter the source ingester uses, so agent LLM calls and
//! any remaining upstream fetches share one global rate budget.

use std::sync::Arc;

use futures::stream::{self, StreamExt};
use petgraph::stable_graph::NodeIndex;

use crate::graph::PropertyGraph;
use crate::ingest::limiter::TokenBucket;

use super::{Assessment, BaselineResult, LlmClient, ModificationClassifier};
use crate::config::Config;

/// Runs `investigate()` for each `(baseline, diff, file)` triple against a
/// shared graph, acquiring one limiter token per hop-loop invocation before
/// it starts so a slow LLM provider can't starve the ingester (and vice
/// versa) — both draw from the same `Arc<TokenBucket>`.
pub async fn investigate_many<'a>(
    inputs: Vec<(&'a BaselineResult, &'a str, NodeIndex)>,
    graph: &'a PropertyGraph,
    classifier: &'a dyn ModificationClassifier,
    llm: &'a dyn LlmClient,
    config: &'a Config,
    limiter: Arc<TokenBucket>,
    max_concurrency: usize,
) -> Vec<Assessment> {
    stream::iter(inputs)
        .map(|(baseline, diff_text, file)| {
            let limiter = Arc::clone(&limiter);
            async move {
                limiter.acquire().await;
                super::investigate(baseline, diff_text, graph, file, classifier, llm, config).await
            }
        })
        .buffer_unordered(max_concurrency.max(1))
        .collect()
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::{HeuristicClassifier, TokenUsage};
    use crate::baseline::RiskLevel;
    use async_trait::async_trait;
    use std::time::Duration;

    struct ImmediateFinalize;

    #[async_trait]
    impl LlmClient for ImmediateFinalize {
        async fn complete(&self, _prompt: &str, _timeout: Duration) -> Result<(String, TokenUsage), crate::errors::CoreError> {
            Ok((
                r#"{"confidence":0.9,"reasoning":"ok","next_action":"FINALIZE"}"#.to_string(),
                TokenUsage {
                    input_tokens: 1,
                    output_tokens: 1,
                    total_tokens: 2,
                },
            ))
        }
    }

    #[tokio::test]
    async fn runs_every_input_and_preserves_count() {
        let baselines = vec![
            BaselineResult {
                canonical_path: "a.go".into(),
                metrics: Vec::new(),
                risk_level: RiskLevel::Medium,
                confidence: 0.5,
                escalate_to_agent: true,
            },
            BaselineResult {
                canonical_path: "b.go".into(),
                metrics: Vec::new(),
                risk_level: RiskLevel::Medium,
                confidence: 0.5,
                escalate_to_agent: true,
            },
        ];

        let mut graph = crate::graph::PropertyGraph::new();
        let indices: Vec<_> = baselines
            .iter()
            .map(|b| {
                graph.upsert_file(crate::model::FileEntity {
                    canonical_path: b.canonical_path.clone(),
                    historical_paths: vec![b.canonical_path.clone()],
                    language: None,
                    branch: "main".into(),
                    last_known_sha: None,
                })
            })
            .collect();

        let inputs: Vec<(&BaselineResult, &str, NodeIndex)> =
            baselines.iter().zip(indices).map(|(b, idx)| (b, "diff", idx)).collect();
        let limiter = Arc::new(TokenBucket::new(100.0, 10));
        let client = ImmediateFinalize;
        let config = Config::default();
        let results = investigate_many(inputs, &graph, &HeuristicClassifier, &client, &config, limiter, 4).await;
        assert_eq!(results.len(), 2);
    }
}
