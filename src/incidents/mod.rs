//! Incident linker: derives CAUSED_BY edges connecting a
//! resolved issue to the files/blocks whose change resolved it, each
//! carrying a confidence score and the evidence source that produced it.
//!
//! Confidence is assigned per source, highest first: a timeline event that
//! names a closing commit is near-certain; a PR merge that claims to fix
//! the issue is slightly less so (the merge commit may touch unrelated
//! files); a commit trailer is a plain textual claim with no platform
//! cross-check; and a BM25 text-similarity match between the issue and a
//! commit message is the weakest signal, clamped into a narrow band so it
//! never outweighs a direct platform link.

mod bm25;

use std::collections::HashMap;

use regex::Regex;

use crate::config::Config;
use crate::model::{
    CausedByEdge, Commit, EvidenceSource, Issue, ModifiesEdge, PullRequest, TimelineEvent,
    TimelineEventKind,
};

const TIMELINE_EVENT_CONFIDENCE: f64 = 0.95;
const PR_MERGE_CONFIDENCE: f64 = 0.9;
const COMMIT_TRAILER_CONFIDENCE: f64 = 0.8;
const LLM_INFERRED_MIN: f64 = 0.5;
const LLM_INFERRED_MAX: f64 = 0.85;

/// One commit's resolved file touch-set, passed in by the caller since
/// this module has no staging/graph access of its own.
pub struct CommitChanges<'a> {
    pub commit: &'a Commit,
    pub changes: &'a [ModifiesEdge],
}

/// Links a single issue against the commits/PRs/timeline events that might
/// have resolved it, returning every CAUSED_BY edge the evidence supports.
/// Multiple sources may each produce an edge for the same (issue, file)
/// pair; the staging layer keeps the highest-confidence one on upsert.
pub fn link_issue(
    issue: &Issue,
    timeline_events: &[TimelineEvent],
    pull_requests: &[PullRequest],
    commits: &[CommitChanges],
) -> Vec<CausedByEdge> {
    let mut edges = Vec::new();
    let commits_by_sha: HashMap<&str, &CommitChanges> = commits
        .iter()
        .map(|c| (c.commit.sha.as_str(), c))
        .collect();

    for event in timeline_events
        .iter()
        .filter(|e| e.issue_number == issue.number)
        .filter(|e| matches!(e.kind, TimelineEventKind::Referenced | TimelineEventKind::Closed))
    {
        if let Some(sha) = &event.source_sha {
            if let Some(cc) = commits_by_sha.get(sha.as_str()) {
                edges.extend(edges_for_commit(
                    issue.number,
                    cc,
                    TIMELINE_EVENT_CONFIDENCE,
                    EvidenceSource::TimelineEvent,
                ));
            }
        }
    }

    for pr in pull_requests
        .iter()
        .filter(|p| p.fixes_issue_numbers.contains(&issue.number))
    {
        if let Some(sha) = &pr.merge_commit_sha {
            if let Some(cc) = commits_by_sha.get(sha.as_str()) {
                edges.extend(edges_for_commit(
                    issue.number,
                    cc,
                    PR_MERGE_CONFIDENCE,
                    EvidenceSource::BodyMention,
                ));
            }
        }
    }

    let trailer = trailer_pattern(issue.number);
    for cc in commits {
        if trailer.is_match(&cc.commit.message) {
            edges.extend(edges_for_commit(
                issue.number,
                cc,
                COMMIT_TRAILER_CONFIDENCE,
                EvidenceSource::CommitTrailer,
            ));
        }
    }

    edges
}

fn trailer_pattern(issue_number: u64) -> Regex {
    Regex::new(&format!(
        r"(?i)\b(fixes|closes|resolves)\s+#{}\b",
        issue_number
    ))
    .expect("trailer pattern is always valid")
}

fn edges_for_commit(
    issue_number: u64,
    cc: &CommitChanges,
    confidence: f64,
    source: EvidenceSource,
) -> Vec<CausedByEdge> {
    cc.changes
        .iter()
        .map(|change| CausedByEdge {
            issue_number,
            canonical_file_path: change.canonical_file_path.clone(),
            block_name: None,
            confidence,
            evidence_source: source,
        })
        .collect()
}

/// Falls back to BM25 text similarity between an issue's title+body and a
/// pool of unlinked commit messages, for issues no direct evidence source
/// covers. The raw BM25 score is mapped into `[LLM_INFERRED_MIN,
/// LLM_INFERRED_MAX]` by rank rather than raw magnitude, since BM25 scores
/// aren't comparable across corpora.
pub fn link_by_similarity(issue: &Issue, commits: &[CommitChanges], threshold: f64) -> Vec<CausedByEdge> {
    if commits.is_empty() {
        return Vec::new();
    }
    let documents: Vec<String> = commits.iter().map(|c| c.commit.message.clone()).collect();
    let corpus = bm25::Corpus::new(&documents);
    let query = format!("{} {}", issue.title, issue.body);
    let ranked = corpus.rank(&query);

    let max_score = ranked.first().map(|(_, s)| *s).unwrap_or(0.0);
    if max_score <= 0.0 {
        return Vec::new();
    }

    ranked
        .into_iter()
        .filter(|(_, score)| *score / max_score >= threshold)
        .flat_map(|(idx, score)| {
            let normalized = (score / max_score).clamp(0.0, 1.0);
            let confidence = LLM_INFERRED_MIN + normalized * (LLM_INFERRED_MAX - LLM_INFERRED_MIN);
            edges_for_commit(issue.number, &commits[idx], confidence, EvidenceSource::LlmInferred)
        })
        .collect()
}

/// Rolls CAUSED_BY edges up into `incident_count` per file, counting only
/// edges at or above the confidence floor. A file with zero qualifying
/// edges gets `incident_count == 0`, never negative or absent.
pub fn incident_count_by_file(edges: &[CausedByEdge], config: &Config) -> HashMap<String, u32> {
    let mut counts: HashMap<String, std::collections::HashSet<u64>> = HashMap::new();
    for edge in edges {
        if edge.confidence >= config.incident_count_min_confidence {
            counts
                .entry(edge.canonical_file_path.clone())
                .or_default()
                .insert(edge.issue_number);
        }
    }
    counts.into_iter().map(|(k, v)| (k, v.len() as u32)).collect()
}
