//! Graph builder & property graph store.
//!
//! Nodes are arena-allocated in a `petgraph::stable_graph::StableGraph` and
//! referenced by stable `NodeIndex`, not by pointer, which avoids ownership
//! tangles in a graph that contains cycles (File ↔ File via CO_CHANGED). A
//! side index maps natural
//! keys (SHA, email, canonical path) to `NodeIndex` so every write is an
//! upsert-on-natural-key.

mod builder;
mod co_change;

pub use builder::{apply_caused_by_edges, apply_parsed_structure, apply_pull_request, sync_commits};
pub use co_change::compute_co_change;

use ahash::AHashMap as HashMap;
use petgraph::stable_graph::{NodeIndex, StableGraph};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use tracing::instrument;

use crate::errors::CoreError;
use crate::model::{
    CausedByEdge, CoChangedEdge, CodeBlock, Commit, Developer, FileEntity, Issue, ModifiesEdge,
    PullRequest,
};

#[derive(Debug, Clone)]
pub enum GraphNode {
    File(FileEntity),
    CodeBlock(CodeBlock),
    Commit(Commit),
    Developer(Developer),
    Incident { issue_number: u64 },
    PullRequest(PullRequest),
    Issue(Issue),
}

#[derive(Debug, Clone)]
pub enum GraphEdge {
    Contains,
    Imports,
    Authored,
    Modifies(ModifiesEdge),
    ModifiedBlock,
    CoChanged(CoChangedEdge),
    MergedTo,
    Fixes,
    CausedBy(CausedByEdge),
}

/// The three-layer property graph: code structure, temporal history
/// (commits/developers), and incident linkage, all in one graph since
/// edges cross the layers (e.g. CAUSED_BY goes from an incident to a File).
#[derive(Default)]
pub struct PropertyGraph {
    graph: StableGraph<GraphNode, GraphEdge>,
    files_by_canonical_path: HashMap<String, NodeIndex>,
    commits_by_sha: HashMap<String, NodeIndex>,
    developers_by_email: HashMap<String, NodeIndex>,
    issues_by_number: HashMap<u64, NodeIndex>,
    pull_requests_by_number: HashMap<u64, NodeIndex>,
    incidents_by_issue_number: HashMap<u64, NodeIndex>,
    code_blocks_by_key: HashMap<String, NodeIndex>,
    /// Monotonic counter bumped whenever a batch commits; baseline cache
    /// keys and consistency checks key off this.
    generation: u64,
}

impl PropertyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn advance_generation(&mut self) {
        self.generation += 1;
    }

    pub fn file_node(&self, canonical_path: &str) -> Option<NodeIndex> {
        self.files_by_canonical_path.get(canonical_path).copied()
    }

    pub fn commit_node(&self, sha: &str) -> Option<NodeIndex> {
        self.commits_by_sha.get(sha).copied()
    }

    pub fn developer_node(&self, email: &str) -> Option<NodeIndex> {
        self.developers_by_email.get(email).copied()
    }

    pub fn issue_node(&self, number: u64) -> Option<NodeIndex> {
        self.issues_by_number.get(&number).copied()
    }

    pub fn pull_request_node(&self, number: u64) -> Option<NodeIndex> {
        self.pull_requests_by_number.get(&number).copied()
    }

    pub fn incident_node(&self, issue_number: u64) -> Option<NodeIndex> {
        self.incidents_by_issue_number.get(&issue_number).copied()
    }

    fn code_block_key(block: &CodeBlock) -> String {
        format!(
            "{}\0{}\0{}\0{:?}",
            block.canonical_file_path, block.block_name, block.signature, block.block_type
        )
    }

    pub fn code_block_node(&self, block: &CodeBlock) -> Option<NodeIndex> {
        self.code_blocks_by_key.get(&Self::code_block_key(block)).copied()
    }

    /// Upserts a File node by canonical path. Idempotent: calling twice
    /// with the same canonical path updates properties in place rather
    /// than creating a duplicate node.
    pub fn upsert_file(&mut self, file: FileEntity) -> NodeIndex {
        if let Some(&idx) = self.files_by_canonical_path.get(&file.canonical_path) {
            self.graph[idx] = GraphNode::File(file);
            idx
        } else {
            let key = file.canonical_path.clone();
            let idx = self.graph.add_node(GraphNode::File(file));
            self.files_by_canonical_path.insert(key, idx);
            idx
        }
    }

    pub fn upsert_commit(&mut self, commit: Commit) -> NodeIndex {
        if let Some(&idx) = self.commits_by_sha.get(&commit.sha) {
            self.graph[idx] = GraphNode::Commit(commit);
            idx
        } else {
            let key = commit.sha.clone();
            let idx = self.graph.add_node(GraphNode::Commit(commit));
            self.commits_by_sha.insert(key, idx);
            idx
        }
    }

    pub fn upsert_developer(&mut self, dev: Developer) -> NodeIndex {
        if let Some(&idx) = self.developers_by_email.get(&dev.email) {
            self.graph[idx] = GraphNode::Developer(dev);
            idx
        } else {
            let key = dev.email.clone();
            let idx = self.graph.add_node(GraphNode::Developer(dev));
            self.developers_by_email.insert(key, idx);
            idx
        }
    }

    /// Upserts an Issue node by issue number.
    pub fn upsert_issue(&mut self, issue: Issue) -> NodeIndex {
        if let Some(&idx) = self.issues_by_number.get(&issue.number) {
            self.graph[idx] = GraphNode::Issue(issue);
            idx
        } else {
            let key = issue.number;
            let idx = self.graph.add_node(GraphNode::Issue(issue));
            self.issues_by_number.insert(key, idx);
            idx
        }
    }

    /// Upserts a PullRequest node by PR number.
    pub fn upsert_pull_request(&mut self, pr: PullRequest) -> NodeIndex {
        if let Some(&idx) = self.pull_requests_by_number.get(&pr.number) {
            self.graph[idx] = GraphNode::PullRequest(pr);
            idx
        } else {
            let key = pr.number;
            let idx = self.graph.add_node(GraphNode::PullRequest(pr));
            self.pull_requests_by_number.insert(key, idx);
            idx
        }
    }

    /// Upserts an Incident node by the issue number it derives from. An
    /// Incident only carries its key in the graph; the fixing-commit/
    /// resolved-at detail lives on the CAUSED_BY edges and the staging
    /// `Incident` record, not on the node itself.
    pub fn upsert_incident(&mut self, issue_number: u64) -> NodeIndex {
        if let Some(&idx) = self.incidents_by_issue_number.get(&issue_number) {
            idx
        } else {
            let idx = self.graph.add_node(GraphNode::Incident { issue_number });
            self.incidents_by_issue_number.insert(issue_number, idx);
            idx
        }
    }

    /// Upserts a CodeBlock node, keyed by (canonical_file_path, block_name,
    /// signature, block_type) per the staging schema's uniqueness constraint.
    pub fn upsert_code_block(&mut self, block: CodeBlock) -> NodeIndex {
        let key = Self::code_block_key(&block);
        if let Some(&idx) = self.code_blocks_by_key.get(&key) {
            self.graph[idx] = GraphNode::CodeBlock(block);
            idx
        } else {
            let idx = self.graph.add_node(GraphNode::CodeBlock(block));
            self.code_blocks_by_key.insert(key, idx);
            idx
        }
    }

    /// Upserts a single AUTHORED edge. No-op if it already exists.
    pub fn upsert_authored(&mut self, developer: NodeIndex, commit: NodeIndex) {
        self.upsert_edge_unlabeled(developer, commit, GraphEdge::Authored, |e| {
            matches!(e, GraphEdge::Authored)
        });
    }

    /// Upserts one MODIFIES edge. The endpoints must already be canonical
    /// File nodes, resolved via `identity::resolve` upstream.
    #[instrument(skip(self))]
    pub fn upsert_modifies(
        &mut self,
        commit: NodeIndex,
        file: NodeIndex,
        edge: ModifiesEdge,
    ) -> Result<(), CoreError> {
        if let Some(existing) = self
            .graph
            .edges_connecting(commit, file)
            .find(|e| matches!(e.weight(), GraphEdge::Modifies(_)))
            .map(|e| e.id())
        {
            self.graph[existing] = GraphEdge::Modifies(edge);
        } else {
            self.graph.add_edge(commit, file, GraphEdge::Modifies(edge));
        }
        Ok(())
    }

    pub fn upsert_contains(&mut self, file: NodeIndex, block: NodeIndex) {
        self.upsert_edge_unlabeled(file, block, GraphEdge::Contains, |e| {
            matches!(e, GraphEdge::Contains)
        });
    }

    pub fn upsert_imports(&mut self, from: NodeIndex, to: NodeIndex) {
        self.upsert_edge_unlabeled(from, to, GraphEdge::Imports, |e| {
            matches!(e, GraphEdge::Imports)
        });
    }

    /// Upserts MERGED_TO (PullRequest → Commit), for a merged PR's merge commit.
    pub fn upsert_merged_to(&mut self, pull_request: NodeIndex, commit: NodeIndex) {
        self.upsert_edge_unlabeled(pull_request, commit, GraphEdge::MergedTo, |e| {
            matches!(e, GraphEdge::MergedTo)
        });
    }

    /// Upserts FIXES (PullRequest → Issue), for a PR body's `Fixes #N` claim.
    pub fn upsert_fixes(&mut self, pull_request: NodeIndex, issue: NodeIndex) {
        self.upsert_edge_unlabeled(pull_request, issue, GraphEdge::Fixes, |e| {
            matches!(e, GraphEdge::Fixes)
        });
    }

    /// Upserts MODIFIED_BLOCK (Commit → CodeBlock), for a commit's parsed
    /// structural touch of a specific block rather than the whole file.
    pub fn upsert_modified_block(&mut self, commit: NodeIndex, block: NodeIndex) {
        self.upsert_edge_unlabeled(commit, block, GraphEdge::ModifiedBlock, |e| {
            matches!(e, GraphEdge::ModifiedBlock)
        });
    }

    fn upsert_edge_unlabeled(
        &mut self,
        from: NodeIndex,
        to: NodeIndex,
        edge: GraphEdge,
        matches_kind: impl Fn(&GraphEdge) -> bool,
    ) {
        let exists = self
            .graph
            .edges_connecting(from, to)
            .any(|e| matches_kind(e.weight()));
        if !exists {
            self.graph.add_edge(from, to, edge);
        }
    }

    /// Drops every CO_CHANGED edge in the graph. Call before recomputing
    /// co-change frequencies so stale aggregates don't linger alongside
    /// fresh ones.
    pub fn clear_co_changed(&mut self) {
        let to_remove: Vec<_> = self
            .graph
            .edge_indices()
            .filter(|&idx| matches!(self.graph[idx], GraphEdge::CoChanged(_)))
            .collect();
        for idx in to_remove {
            self.graph.remove_edge(idx);
        }
    }

    /// Upserts a symmetric pair of CO_CHANGED edges: A→B and B→A, each
    /// carrying the same frequency and count.
    pub fn upsert_co_changed_pair(&mut self, a: NodeIndex, b: NodeIndex, edge: CoChangedEdge) {
        let reverse = CoChangedEdge {
            file_a: edge.file_b.clone(),
            file_b: edge.file_a.clone(),
            frequency: edge.frequency,
            co_change_count: edge.co_change_count,
            window_days: edge.window_days,
        };
        self.graph.add_edge(a, b, GraphEdge::CoChanged(edge));
        self.graph.add_edge(b, a, GraphEdge::CoChanged(reverse));
    }

    /// All CO_CHANGED edges incident on `file`, as `(neighbor, frequency)`.
    pub fn co_changed_neighbors(&self, file: NodeIndex) -> Vec<(NodeIndex, f64)> {
        self.graph
            .edges_directed(file, Direction::Outgoing)
            .filter_map(|e| match e.weight() {
                GraphEdge::CoChanged(c) => Some((e.target(), c.frequency)),
                _ => None,
            })
            .collect()
    }

    pub fn upsert_caused_by(&mut self, incident: NodeIndex, file: NodeIndex, edge: CausedByEdge) {
        self.upsert_edge_unlabeled(incident, file, GraphEdge::CausedBy(edge.clone()), move |e| {
            matches!(e, GraphEdge::CausedBy(existing) if existing.issue_number == edge.issue_number)
        });
    }

    pub fn caused_by_edges_for_file(&self, file: NodeIndex) -> Vec<&CausedByEdge> {
        self.graph
            .edges_directed(file, Direction::Incoming)
            .filter_map(|e| match e.weight() {
                GraphEdge::CausedBy(c) => Some(c),
                _ => None,
            })
            .collect()
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// MODIFIES edges incident on a commit.
    pub fn modifies_edges_for_commit(&self, commit: NodeIndex) -> Vec<&ModifiesEdge> {
        self.graph
            .edges_directed(commit, Direction::Outgoing)
            .filter_map(|e| match e.weight() {
                GraphEdge::Modifies(m) => Some(m),
                _ => None,
            })
            .collect()
    }

    pub fn file(&self, idx: NodeIndex) -> Option<&FileEntity> {
        match self.graph.node_weight(idx) {
            Some(GraphNode::File(f)) => Some(f),
            _ => None,
        }
    }

    pub fn commit(&self, idx: NodeIndex) -> Option<&Commit> {
        match self.graph.node_weight(idx) {
            Some(GraphNode::Commit(c)) => Some(c),
            _ => None,
        }
    }

    pub fn developer(&self, idx: NodeIndex) -> Option<&Developer> {
        match self.graph.node_weight(idx) {
            Some(GraphNode::Developer(d)) => Some(d),
            _ => None,
        }
    }

    pub fn issue(&self, idx: NodeIndex) -> Option<&Issue> {
        match self.graph.node_weight(idx) {
            Some(GraphNode::Issue(i)) => Some(i),
            _ => None,
        }
    }

    pub fn pull_request(&self, idx: NodeIndex) -> Option<&PullRequest> {
        match self.graph.node_weight(idx) {
            Some(GraphNode::PullRequest(p)) => Some(p),
            _ => None,
        }
    }

    pub fn code_block(&self, idx: NodeIndex) -> Option<&CodeBlock> {
        match self.graph.node_weight(idx) {
            Some(GraphNode::CodeBlock(b)) => Some(b),
            _ => None,
        }
    }

    /// `(commit, edge)` pairs for every commit that modified `file`, via
    /// the incoming MODIFIES edges.
    pub fn modifies_edges_for_file(&self, file: NodeIndex) -> Vec<(NodeIndex, &ModifiesEdge)> {
        self.graph
            .edges_directed(file, Direction::Incoming)
            .filter_map(|e| match e.weight() {
                GraphEdge::Modifies(m) => Some((e.source(), m)),
                _ => None,
            })
            .collect()
    }

    /// The developer with an AUTHORED edge into `commit`, if any.
    pub fn author_of_commit(&self, commit: NodeIndex) -> Option<NodeIndex> {
        self.graph
            .edges_directed(commit, Direction::Incoming)
            .find(|e| matches!(e.weight(), GraphEdge::Authored))
            .map(|e| e.source())
    }

    pub fn all_files(&self) -> impl Iterator<Item = (NodeIndex, &FileEntity)> {
        self.graph.node_indices().filter_map(|idx| match &self.graph[idx] {
            GraphNode::File(f) => Some((idx, f)),
            _ => None,
        })
    }

    /// Number of CodeBlock children a file CONTAINS, used as a cheap size
    /// proxy where line counts aren't tracked in the graph.
    pub fn contains_count(&self, file: NodeIndex) -> usize {
        self.graph
            .edges_directed(file, Direction::Outgoing)
            .filter(|e| matches!(e.weight(), GraphEdge::Contains))
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn file(path: &str) -> FileEntity {
        FileEntity {
            canonical_path: path.to_string(),
            historical_paths: vec![path.to_string()],
            language: None,
            branch: "main".to_string(),
            last_known_sha: None,
        }
    }

    #[test]
    fn upsert_file_is_idempotent_by_canonical_path() {
        let mut g = PropertyGraph::new();
        let a = g.upsert_file(file("src/main.rs"));
        let b = g.upsert_file(file("src/main.rs"));
        assert_eq!(a, b);
        assert_eq!(g.node_count(), 1);
    }

    #[test]
    fn modifies_edge_upsert_is_a_noop_on_rerun() {
        let mut g = PropertyGraph::new();
        let f = g.upsert_file(file("a.rs"));
        let c = g.upsert_commit(Commit {
            sha: "abc".into(),
            author_email: "a@b.com".into(),
            author_date: Utc::now(),
            message: String::new(),
            additions: 0,
            deletions: 0,
            files_changed: 0,
            parent_shas: vec![],
            topological_index: Some(0),
        });
        let edge = ModifiesEdge {
            commit_sha: "abc".into(),
            canonical_file_path: "a.rs".into(),
            additions: 1,
            deletions: 0,
            status: crate::model::FileChangeStatus::Modified,
        };
        g.upsert_modifies(c, f, edge.clone()).unwrap();
        g.upsert_modifies(c, f, edge).unwrap();
        assert_eq!(g.edge_count(), 1);
    }

    #[test]
    fn co_changed_pair_is_symmetric() {
        let mut g = PropertyGraph::new();
        let a = g.upsert_file(file("a.rs"));
        let b = g.upsert_file(file("b.rs"));
        g.upsert_co_changed_pair(
            a,
            b,
            CoChangedEdge {
                file_a: "a.rs".into(),
                file_b: "b.rs".into(),
                frequency: 0.5,
                co_change_count: 3,
                window_days: 90,
            },
        );
        let a_neighbors = g.co_changed_neighbors(a);
        let b_neighbors = g.co_changed_neighbors(b);
        assert_eq!(a_neighbors.len(), 1);
        assert_eq!(b_neighbors.len(), 1);
        assert_eq!(a_neighbors[0].1, b_neighbors[0].1);
    }

    #[test]
    fn clear_co_changed_removes_only_co_changed_edges() {
        let mut g = PropertyGraph::new();
        let a = g.upsert_file(file("a.rs"));
        let b = g.upsert_file(file("b.rs"));
        g.upsert_imports(a, b);
        g.upsert_co_changed_pair(
            a,
            b,
            CoChangedEdge {
                file_a: "a.rs".into(),
                file_b: "b.rs".into(),
                frequency: 0.5,
                co_change_count: 3,
                window_days: 90,
            },
        );
        assert_eq!(g.edge_count(), 3);
        g.clear_co_changed();
        assert_eq!(g.edge_count(), 1);
    }

    fn issue(number: u64) -> Issue {
        Issue {
            number,
            state: crate::model::IssueState::Closed,
            created_at: Utc::now(),
            closed_at: Some(Utc::now()),
            labels: vec![],
            body: String::new(),
            title: "crash on null input".into(),
        }
    }

    fn pull_request(number: u64) -> PullRequest {
        PullRequest {
            number,
            state: crate::model::IssueState::Closed,
            created_at: Utc::now(),
            closed_at: Some(Utc::now()),
            merged_at: Some(Utc::now()),
            merge_commit_sha: Some("merged-sha".into()),
            labels: vec![],
            body: String::new(),
            title: "fix crash".into(),
            fixes_issue_numbers: vec![number],
        }
    }

    #[test]
    fn upsert_incident_is_idempotent_and_drives_caused_by() {
        let mut g = PropertyGraph::new();
        let file_idx = g.upsert_file(file("risky.rs"));
        let a = g.upsert_incident(7);
        let b = g.upsert_incident(7);
        assert_eq!(a, b);
        g.upsert_caused_by(
            a,
            file_idx,
            CausedByEdge {
                issue_number: 7,
                canonical_file_path: "risky.rs".into(),
                block_name: None,
                confidence: 0.9,
                evidence_source: crate::model::EvidenceSource::TimelineEvent,
            },
        );
        assert_eq!(g.caused_by_edges_for_file(file_idx).len(), 1);
    }

    #[test]
    fn upsert_pull_request_wires_merged_to_and_fixes() {
        let mut g = PropertyGraph::new();
        let issue_idx = g.upsert_issue(issue(42));
        let commit_idx = g.upsert_commit(Commit {
            sha: "merged-sha".into(),
            author_email: "a@b.com".into(),
            author_date: Utc::now(),
            message: String::new(),
            additions: 0,
            deletions: 0,
            files_changed: 0,
            parent_shas: vec![],
            topological_index: Some(0),
        });
        let pr_idx = g.upsert_pull_request(pull_request(42));
        g.upsert_merged_to(pr_idx, commit_idx);
        g.upsert_fixes(pr_idx, issue_idx);
        g.upsert_merged_to(pr_idx, commit_idx);
        g.upsert_fixes(pr_idx, issue_idx);

        assert!(g.pull_request(pr_idx).is_some());
        assert_eq!(g.issue(issue_idx).unwrap().number, 42);
        assert_eq!(g.edge_count(), 2);
    }

    #[test]
    fn upsert_code_block_dedupes_by_composite_key_and_tracks_modified_block() {
        let mut g = PropertyGraph::new();
        let block = CodeBlock {
            canonical_file_path: "auth.go".into(),
            block_name: "Login".into(),
            signature: "(string,string)".into(),
            block_type: crate::model::BlockType::Function,
            historical_block_names: vec![],
            churn: 1,
            incident_count: 0,
            risk_score: 0.0,
        };
        let a = g.upsert_code_block(block.clone());
        let b = g.upsert_code_block(block.clone());
        assert_eq!(a, b);
        assert_eq!(g.node_count(), 1);

        let commit_idx = g.upsert_commit(Commit {
            sha: "abc".into(),
            author_email: "a@b.com".into(),
            author_date: Utc::now(),
            message: String::new(),
            additions: 0,
            deletions: 0,
            files_changed: 0,
            parent_shas: vec![],
            topological_index: Some(0),
        });
        g.upsert_modified_block(commit_idx, a);
        g.upsert_modified_block(commit_idx, a);
        assert_eq!(g.code_block(a).unwrap().block_name, "Login");
        assert_eq!(g.edge_count(), 1);
    }
}
