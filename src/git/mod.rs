//! Git interface.
//!
//! Shells out to the system `git` binary rather than re-implementing the
//! pack/object/delta model: this component only needs clone, log,
//! follow-rename, diff, and topological ordering, all of which `git` itself
//! already does well. `std::process::Command` is the same approach the
//! surveyed corpus uses for git-log ingestion (see DESIGN.md).

mod topo;

pub use topo::topological_order;

use std::path::{Path, PathBuf};
use std::process::Command;

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use tracing::{debug, instrument, warn};

use crate::errors::CoreError;
use crate::model::{Commit, FileChangeStatus, ModifiesEdge};

const COMMIT_DELIMITER: &str = "\u{1}";
const FIELD_DELIMITER: &str = "\u{2}";

/// A shallow, single-branch local clone of a remote repository.
pub struct Repository {
    pub local_path: PathBuf,
}

/// Result of a single `log` traversal: commits plus their per-file numstat.
pub struct CommitRecord {
    pub commit: Commit,
    pub changes: Vec<ModifiesEdge>,
}

/// Derived from `log --follow`: the plan for re-processing a repository
/// whose `parent_shas_hash` changed, i.e. history was rewritten.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResyncPlan {
    pub previous_hash: Option<String>,
    pub current_hash: String,
    pub rewritten: bool,
}

impl Repository {
    /// Clone `url` shallowly (depth determined by `log`'s own `--since`/
    /// `window_days` windowing, not a fixed `--depth`, since the caller may
    /// need full history for topological ordering) into `dest`.
    #[instrument(skip(url))]
    pub fn clone(url: &str, dest: &Path) -> Result<Self, CoreError> {
        let status = Command::new("git")
            .args(["clone", "--single-branch", url, &dest.to_string_lossy()])
            .status()
            .map_err(CoreError::Io)?;

        if !status.success() {
            return Err(CoreError::upstream(
                url,
                1,
                format!("git clone exited with status {status}"),
            ));
        }

        Ok(Self {
            local_path: dest.to_path_buf(),
        })
    }

    pub fn open(local_path: impl Into<PathBuf>) -> Self {
        Self {
            local_path: local_path.into(),
        }
    }

    fn git(&self, args: &[&str]) -> Result<String, CoreError> {
        let output = Command::new("git")
            .args(args)
            .current_dir(&self.local_path)
            .output()
            .map_err(CoreError::Io)?;

        if !output.status.success() {
            return Err(CoreError::upstream(
                args.join(" "),
                1,
                String::from_utf8_lossy(&output.stderr).to_string(),
            ));
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    pub fn current_sha(&self) -> Result<String, CoreError> {
        Ok(self.git(&["rev-parse", "HEAD"])?.trim().to_string())
    }

    pub fn current_branch(&self) -> Result<String, CoreError> {
        Ok(self.git(&["rev-parse", "--abbrev-ref", "HEAD"])?.trim().to_string())
    }

    /// `log(window_days)`: a stream of commit records with per-file
    /// numstat, newest first. Uses control characters as delimiters since
    /// commit messages may contain any printable character.
    #[instrument(skip(self))]
    pub fn log(&self, window_days: Option<i64>) -> Result<Vec<CommitRecord>, CoreError> {
        let format = format!(
            "{COMMIT_DELIMITER}%H{FIELD_DELIMITER}%ae{FIELD_DELIMITER}%aI{FIELD_DELIMITER}%P{FIELD_DELIMITER}%s"
        );
        let mut args = vec![
            "log".to_string(),
            "--raw".to_string(),
            "--numstat".to_string(),
            format!("--pretty=format:{format}"),
        ];
        if let Some(days) = window_days {
            args.push(format!("--since={days}.days"));
        }
        let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();
        let raw = self.git(&arg_refs)?;
        parse_log(&raw)
    }

    /// `follow_history(path)`: ordered list of historical paths,
    /// oldest first, deduped preserving first occurrence.
    #[instrument(skip(self))]
    pub fn follow_history(&self, path: &str) -> Result<Vec<String>, CoreError> {
        let raw = self.git(&[
            "log",
            "--follow",
            "--name-only",
            "--pretty=format:",
            "--",
            path,
        ]);

        let raw = match raw {
            Ok(r) => r,
            Err(e) => {
                warn!(%path, error = %e, "follow_history failed, falling back to singleton path");
                return Ok(vec![path.to_string()]);
            }
        };

        let mut seen = std::collections::HashSet::new();
        let mut ordered = Vec::new();
        for line in raw.lines().rev() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            if seen.insert(line.to_string()) {
                ordered.push(line.to_string());
            }
        }

        if ordered.is_empty() {
            warn!(%path, "git could not resolve any history for path");
            return Ok(vec![path.to_string()]);
        }

        Ok(ordered)
    }

    /// `diff(file)`: unified diff text for the file's current
    /// working-tree state against HEAD.
    pub fn diff(&self, path: &str) -> Result<String, CoreError> {
        self.git(&["diff", "HEAD", "--", path])
    }

    /// `diff` of a specific commit against its first parent, for a single file.
    pub fn diff_commit(&self, sha: &str, path: &str) -> Result<String, CoreError> {
        self.git(&["show", sha, "--", path])
    }

    /// Hashes every commit SHA and parent-list reachable from HEAD into a
    /// single digest. Used by the Validator to detect force-pushes:
    /// if this value changes between syncs, history was rewritten.
    #[instrument(skip(self))]
    pub fn parent_shas_hash(&self) -> Result<String, CoreError> {
        let raw = self.git(&["log", "--pretty=format:%H %P", "--all"])?;
        let mut hasher = Sha256::new();
        let mut lines: Vec<&str> = raw.lines().collect();
        lines.sort_unstable();
        for line in lines {
            hasher.update(line.as_bytes());
            hasher.update(b"\n");
        }
        Ok(hex::encode(hasher.finalize()))
    }

    /// Computes a `ResyncPlan` by comparing the freshly computed
    /// `parent_shas_hash` against the previously recorded one.
    pub fn resync_plan(&self, previous_hash: Option<&str>) -> Result<ResyncPlan, CoreError> {
        let current_hash = self.parent_shas_hash()?;
        let rewritten = previous_hash.is_some_and(|p| p != current_hash);
        debug!(rewritten, "computed resync plan");
        Ok(ResyncPlan {
            previous_hash: previous_hash.map(str::to_string),
            current_hash,
            rewritten,
        })
    }
}

/// Maps a `git log --raw` entry's status letter onto `FileChangeStatus`.
/// Anything unrecognized (copies, type changes) falls back to `Modified`.
fn raw_entry_status(entry: &str) -> FileChangeStatus {
    let meta = entry.splitn(2, '\t').next().unwrap_or(entry);
    match meta.split_whitespace().last().and_then(|token| token.chars().next()) {
        Some('A') => FileChangeStatus::Added,
        Some('D') => FileChangeStatus::Deleted,
        Some('R') => FileChangeStatus::Renamed,
        _ => FileChangeStatus::Modified,
    }
}

/// The canonical path from a `git log --raw` entry: the new path for a
/// rename/copy (`:mode mode sha sha R100\told\tnew`), otherwise the single path.
fn raw_entry_path(entry: &str) -> Option<String> {
    let mut fields = entry.split('\t');
    fields.next()?;
    let first_path = fields.next()?;
    Some(fields.next().unwrap_or(first_path).to_string())
}

fn parse_log(raw: &str) -> Result<Vec<CommitRecord>, CoreError> {
    let mut records = Vec::new();

    for block in raw.split(COMMIT_DELIMITER).filter(|b| !b.trim().is_empty()) {
        let mut lines = block.lines();
        let header = lines
            .next()
            .ok_or_else(|| CoreError::parse_failure("git log", "missing commit header"))?;
        let fields: Vec<&str> = header.split(FIELD_DELIMITER).collect();
        if fields.len() < 5 {
            return Err(CoreError::parse_failure(
                "git log",
                format!("expected 5 fields, got {}: {header:?}", fields.len()),
            ));
        }
        let sha = fields[0].to_string();
        let author_email = fields[1].to_string();
        let author_date: DateTime<Utc> = fields[2]
            .parse()
            .map_err(|e| CoreError::parse_failure("git log author date", format!("{e}")))?;
        let parent_shas: Vec<String> = fields[3]
            .split_whitespace()
            .map(str::to_string)
            .collect();
        let message = fields[4..].join(FIELD_DELIMITER);

        // `--raw --numstat` always emits every raw (`:mode mode sha sha status\tpath`)
        // line for a commit before its numstat lines, in the same per-file order,
        // regardless of the order the two flags were passed in.
        let body_lines: Vec<&str> = lines.map(str::trim).filter(|l| !l.is_empty()).collect();
        let raw_entries: Vec<&str> = body_lines.iter().copied().filter(|l| l.starts_with(':')).collect();
        let numstat_lines: Vec<&str> = body_lines.iter().copied().filter(|l| !l.starts_with(':')).collect();

        let mut additions = 0u32;
        let mut deletions = 0u32;
        let mut changes = Vec::new();
        for (idx, line) in numstat_lines.iter().enumerate() {
            let parts: Vec<&str> = line.splitn(3, '\t').collect();
            if parts.len() != 3 {
                continue;
            }
            let file_additions = parts[0].parse::<u32>().unwrap_or(0);
            let file_deletions = parts[1].parse::<u32>().unwrap_or(0);
            additions += file_additions;
            deletions += file_deletions;

            let raw_entry = raw_entries.get(idx).copied();
            let status = raw_entry.map(raw_entry_status).unwrap_or(FileChangeStatus::Modified);
            let canonical_file_path = raw_entry
                .and_then(raw_entry_path)
                .unwrap_or_else(|| parts[2].to_string());

            changes.push(ModifiesEdge {
                commit_sha: sha.clone(),
                canonical_file_path,
                additions: file_additions,
                deletions: file_deletions,
                status,
            });
        }

        let files_changed = changes.len() as u32;
        records.push(CommitRecord {
            commit: Commit {
                sha,
                author_email,
                author_date,
                message,
                additions,
                deletions,
                files_changed,
                parent_shas,
                topological_index: None,
            },
            changes,
        });
    }

    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_single_commit_block() {
        let raw = format!(
            "{COMMIT_DELIMITER}abc123{FIELD_DELIMITER}dev@example.com{FIELD_DELIMITER}2024-01-01T00:00:00Z{FIELD_DELIMITER}{FIELD_DELIMITER}initial commit\n:100644 100644 0000 1111 A\tsrc/main.rs\n3\t1\tsrc/main.rs\n"
        );
        let records = parse_log(&raw).expect("parse");
        assert_eq!(records.len(), 1);
        let r = &records[0];
        assert_eq!(r.commit.sha, "abc123");
        assert_eq!(r.commit.additions, 3);
        assert_eq!(r.commit.deletions, 1);
        assert_eq!(r.changes.len(), 1);
        assert_eq!(r.changes[0].canonical_file_path, "src/main.rs");
        assert_eq!(r.changes[0].status, FileChangeStatus::Added);
    }

    #[test]
    fn parses_multiple_commits_with_parents() {
        let raw = format!(
            "{COMMIT_DELIMITER}c2{FIELD_DELIMITER}a@x.com{FIELD_DELIMITER}2024-02-01T00:00:00Z{FIELD_DELIMITER}c1{FIELD_DELIMITER}second\n:100644 100644 aaaa bbbb M\tREADME.md\n1\t0\tREADME.md\n{COMMIT_DELIMITER}c1{FIELD_DELIMITER}a@x.com{FIELD_DELIMITER}2024-01-01T00:00:00Z{FIELD_DELIMITER}{FIELD_DELIMITER}first\n:000000 100644 0000 cccc A\tREADME.md\n2\t0\tREADME.md\n"
        );
        let records = parse_log(&raw).expect("parse");
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].commit.parent_shas, vec!["c1".to_string()]);
        assert!(records[1].commit.parent_shas.is_empty());
        assert_eq!(records[0].changes[0].status, FileChangeStatus::Modified);
        assert_eq!(records[1].changes[0].status, FileChangeStatus::Added);
    }

    #[test]
    fn raw_status_letters_map_to_file_change_status() {
        let raw = format!(
            "{COMMIT_DELIMITER}deadbeef{FIELD_DELIMITER}dev@example.com{FIELD_DELIMITER}2024-03-01T00:00:00Z{FIELD_DELIMITER}{FIELD_DELIMITER}rename and delete\n\
             :100644 100644 aaaa bbbb R100\told_name.rs\tnew_name.rs\n\
             :100644 000000 cccc 0000 D\tgone.rs\n\
             0\t0\told_name.rs => new_name.rs\n\
             0\t4\tgone.rs\n"
        );
        let records = parse_log(&raw).expect("parse");
        assert_eq!(records.len(), 1);
        let changes = &records[0].changes;
        assert_eq!(changes.len(), 2);
        assert_eq!(changes[0].status, FileChangeStatus::Renamed);
        assert_eq!(changes[0].canonical_file_path, "new_name.rs");
        assert_eq!(changes[1].status, FileChangeStatus::Deleted);
        assert_eq!(changes[1].canonical_file_path, "gone.rs");
    }
}
