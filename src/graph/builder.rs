//! Graph builder: drives `PropertyGraph` writes from staged rows and raw
//! git/parser output. `Store` only checkpoints which commits have been
//! processed; this module is the pass that actually walks the unprocessed
//! rows and turns them into Commit/Developer/AUTHORED/MODIFIES graph state,
//! plus the parser- and incident-linker-derived wiring that has nowhere
//! else to run.

use petgraph::stable_graph::NodeIndex;

use crate::errors::CoreError;
use crate::git::CommitRecord;
use crate::model::{CausedByEdge, CodeBlock, Commit, Developer, FileEntity, Issue, PullRequest};
use crate::parser::ParseOutcome;
use crate::staging::Store;

use super::PropertyGraph;

/// Drains every unprocessed commit row for `repo_id`, matches it by SHA
/// against the corresponding `CommitRecord` from `git::Repository::log`,
/// and upserts the Commit/Developer/AUTHORED/MODIFIES shape into `graph`.
/// A staged commit with no matching log entry is left unprocessed — the
/// log window passed in may not cover it yet — rather than silently
/// dropped. Returns the number of commits synced.
pub async fn sync_commits(
    store: &Store,
    graph: &mut PropertyGraph,
    repo_id: i64,
    log: &[CommitRecord],
) -> Result<usize, CoreError> {
    let by_sha: std::collections::HashMap<&str, &CommitRecord> =
        log.iter().map(|r| (r.commit.sha.as_str(), r)).collect();

    let rows = store.unprocessed_commits(repo_id).await?;
    let mut synced = 0;

    for row in rows {
        let Some(record) = by_sha.get(row.sha.as_str()) else {
            continue;
        };

        let developer = upsert_developer_for_commit(graph, &record.commit);
        let commit_idx = graph.upsert_commit(record.commit.clone());
        graph.upsert_authored(developer, commit_idx);

        for change in &record.changes {
            let file_idx = graph.upsert_file(FileEntity {
                canonical_path: change.canonical_file_path.clone(),
                historical_paths: vec![change.canonical_file_path.clone()],
                language: None,
                branch: "main".to_string(),
                last_known_sha: Some(record.commit.sha.clone()),
            });
            graph.upsert_modifies(commit_idx, file_idx, change.clone())?;
        }

        store.mark_commit_processed(row.id).await?;
        synced += 1;
    }

    if synced > 0 {
        graph.advance_generation();
    }

    Ok(synced)
}

/// Accumulates a commit onto its author's Developer node rather than
/// overwriting `commit_count`/`first_commit_at` on every call, since a
/// developer is typically revisited across many commits in a single sync.
fn upsert_developer_for_commit(graph: &mut PropertyGraph, commit: &Commit) -> NodeIndex {
    if let Some(idx) = graph.developer_node(&commit.author_email) {
        let mut dev = graph
            .developer(idx)
            .cloned()
            .unwrap_or_else(|| fresh_developer(commit));
        dev.first_commit_at = dev.first_commit_at.min(commit.author_date);
        dev.last_commit_at = dev.last_commit_at.max(commit.author_date);
        dev.commit_count += 1;
        graph.upsert_developer(dev)
    } else {
        graph.upsert_developer(fresh_developer(commit))
    }
}

fn fresh_developer(commit: &Commit) -> Developer {
    Developer {
        email: commit.author_email.clone(),
        display_name: commit.author_email.clone(),
        first_commit_at: commit.author_date,
        last_commit_at: commit.author_date,
        commit_count: 1,
    }
}

/// Wires a parsed file's structure into the graph: one CodeBlock node per
/// extracted entity, a CONTAINS edge from `file`, and a MODIFIED_BLOCK
/// edge from `commit` when the parse ran against a specific commit's
/// content rather than a standalone snapshot.
pub fn apply_parsed_structure(
    graph: &mut PropertyGraph,
    file: NodeIndex,
    commit: Option<NodeIndex>,
    outcome: &ParseOutcome,
) {
    for entity in &outcome.entities {
        let block = CodeBlock {
            canonical_file_path: entity.canonical_file_path.clone(),
            block_name: entity.name.clone(),
            signature: entity.signature.clone(),
            block_type: entity.block_type,
            historical_block_names: entity.historical_names.clone(),
            churn: 0,
            incident_count: 0,
            risk_score: 0.0,
        };
        let block_idx = graph.upsert_code_block(block);
        graph.upsert_contains(file, block_idx);
        if let Some(commit_idx) = commit {
            graph.upsert_modified_block(commit_idx, block_idx);
        }
    }
}

/// Wires incident-linker output into the graph: an Incident node per
/// distinct issue number and a CAUSED_BY edge to the file it evidences.
/// Edges whose file hasn't been staged into the graph yet are skipped —
/// they'll be picked up on a later sync once `sync_commits` has run.
pub fn apply_caused_by_edges(graph: &mut PropertyGraph, edges: &[CausedByEdge]) {
    for edge in edges {
        let Some(file_idx) = graph.file_node(&edge.canonical_file_path) else {
            continue;
        };
        let incident_idx = graph.upsert_incident(edge.issue_number);
        graph.upsert_caused_by(incident_idx, file_idx, edge.clone());
    }
}

/// Wires a pull request into the graph: the PullRequest node, a MERGED_TO
/// edge to its merge commit if merged and the commit is already staged,
/// and a FIXES edge to each issue in `issues` that the PR's body claims
/// to fix.
pub fn apply_pull_request(graph: &mut PropertyGraph, pr: PullRequest, issues: &[Issue]) -> NodeIndex {
    let fixes = pr.fixes_issue_numbers.clone();
    let merge_commit_sha = pr.merge_commit_sha.clone();
    let pr_idx = graph.upsert_pull_request(pr);

    if let Some(sha) = merge_commit_sha {
        if let Some(commit_idx) = graph.commit_node(&sha) {
            graph.upsert_merged_to(pr_idx, commit_idx);
        }
    }

    for issue in issues.iter().filter(|i| fixes.contains(&i.number)) {
        let issue_idx = graph.upsert_issue(issue.clone());
        graph.upsert_fixes(pr_idx, issue_idx);
    }

    pr_idx
}
