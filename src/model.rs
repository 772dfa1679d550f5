//! Shared entity and relationship types.
//!
//! These types are the vocabulary every other module speaks: the staging
//! store deserializes raw upstream JSON into them, the graph builder turns
//! them into nodes and edges, and the baseline/agent modules read them back
//! out. Keeping them in one place avoids each module inventing its own
//! partial view of "what a commit is."

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A repository identifier: owner + name is the natural key upstream uses;
/// `id` is the staging store's surrogate key once the row exists.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RepoRef {
    pub owner: String,
    pub name: String,
}

impl RepoRef {
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }
}

impl std::fmt::Display for RepoRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.full_name())
    }
}

/// Commit. SHA is the 40-char hex object ID; `topological_index`
/// is assigned by the Kahn traversal in `git::topological_order` and is
/// `None` until that pass has run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Commit {
    pub sha: String,
    pub author_email: String,
    pub author_date: DateTime<Utc>,
    pub message: String,
    pub additions: u32,
    pub deletions: u32,
    pub files_changed: u32,
    pub parent_shas: Vec<String>,
    pub topological_index: Option<u64>,
}

/// Developer, keyed by email within a repo.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Developer {
    pub email: String,
    pub display_name: String,
    pub first_commit_at: DateTime<Utc>,
    pub last_commit_at: DateTime<Utc>,
    pub commit_count: u32,
}

/// File. `canonical_path` is the path at HEAD, or the last known
/// path if deleted; `historical_paths` is the ordered, deduped rename
/// history produced by `identity::resolve`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileEntity {
    pub canonical_path: String,
    pub historical_paths: Vec<String>,
    pub language: Option<String>,
    pub branch: String,
    pub last_known_sha: Option<String>,
}

/// The kind of named code region a `CodeBlock` represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockType {
    Function,
    Method,
    Class,
    Interface,
    Module,
}

/// Function/Class. `signature` is the normalized parameter-type
/// string produced by `parser::normalize_signature`; together with
/// `canonical_path` and `name` it disambiguates overloads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodeEntity {
    pub name: String,
    pub canonical_file_path: String,
    pub signature: String,
    pub block_type: BlockType,
    pub start_line: u32,
    pub end_line: u32,
    pub historical_names: Vec<String>,
}

/// CodeBlock: the unit the baseline and incident linker score.
/// Uniquely identified by (canonical_file_path, block_name, signature,
/// block_type) per the staging schema's uniqueness constraint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodeBlock {
    pub canonical_file_path: String,
    pub block_name: String,
    pub signature: String,
    pub block_type: BlockType,
    pub historical_block_names: Vec<String>,
    pub churn: u32,
    pub incident_count: u32,
    pub risk_score: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueState {
    Open,
    Closed,
}

/// Issue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    pub number: u64,
    pub state: IssueState,
    pub created_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
    pub labels: Vec<String>,
    pub body: String,
    pub title: String,
}

/// PullRequest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PullRequest {
    pub number: u64,
    pub state: IssueState,
    pub created_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
    pub merged_at: Option<DateTime<Utc>>,
    pub merge_commit_sha: Option<String>,
    pub labels: Vec<String>,
    pub body: String,
    pub title: String,
    /// Issue numbers this PR's body claims to fix (`Fixes #N` / `Closes #N`).
    pub fixes_issue_numbers: Vec<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimelineEventKind {
    Referenced,
    Closed,
    CrossReferenced,
    Merged,
}

/// TimelineEvent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineEvent {
    pub issue_number: u64,
    pub kind: TimelineEventKind,
    pub source_sha: Option<String>,
    pub source_kind: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Evidence source backing a CAUSED_BY edge, in descending
/// confidence order as harvested by the incident linker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvidenceSource {
    TimelineEvent,
    BodyMention,
    TitleMatch,
    CommitTrailer,
    LlmInferred,
}

/// Incident: derived, not staged directly — an issue that
/// evidence connects to one or more fixing commits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Incident {
    pub issue_number: u64,
    pub fixing_commit_shas: Vec<String>,
    pub resolved_at: Option<DateTime<Utc>>,
}

/// File change status as recorded on a MODIFIES edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileChangeStatus {
    Added,
    Modified,
    Deleted,
    Renamed,
}

/// MODIFIES (Commit → File), carrying per-file numstat.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModifiesEdge {
    pub commit_sha: String,
    pub canonical_file_path: String,
    pub additions: u32,
    pub deletions: u32,
    pub status: FileChangeStatus,
}

/// CO_CHANGED (File ↔ File), symmetric by construction: an edge A→B is
/// always accompanied by a mirrored B→A edge with the same frequency.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoChangedEdge {
    pub file_a: String,
    pub file_b: String,
    pub frequency: f64,
    pub co_change_count: u32,
    pub window_days: i64,
}

/// CAUSED_BY (Incident → File/CodeBlock), with confidence and source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CausedByEdge {
    pub issue_number: u64,
    pub canonical_file_path: String,
    pub block_name: Option<String>,
    pub confidence: f64,
    pub evidence_source: EvidenceSource,
}
