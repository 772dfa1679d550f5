//! File identity resolver.
//!
//! Maps a current path to the ordered set of historical paths it has held,
//! via `git log --follow`. The canonical path is always the path at HEAD
//! (or the last known path if the file has been deleted since).

use tracing::instrument;

use crate::errors::CoreError;
use crate::git::Repository;
use crate::model::FileEntity;

/// Resolves the identity of `current_path` within `repo`. On git failure to
/// resolve history (e.g. the file never existed under that name), falls
/// back to a singleton set containing the input path — the `warn!` call
/// site for that case is `git::follow_history` itself, so this function
/// doesn't need to duplicate the log line.
#[instrument(skip(repo))]
pub fn resolve(
    repo: &Repository,
    current_path: &str,
    branch: &str,
    language: Option<String>,
) -> Result<FileEntity, CoreError> {
    let historical_paths = repo.follow_history(current_path)?;
    let canonical_path = canonicalize(current_path, &historical_paths);

    Ok(FileEntity {
        canonical_path,
        historical_paths,
        language,
        branch: branch.to_string(),
        last_known_sha: None,
    })
}

/// Canonicalization rule: the canonical path is the path at HEAD. If
/// the caller already knows the current path exists at HEAD, it is used
/// directly; otherwise (the file was deleted) the most recent entry in the
/// rename history is used.
fn canonicalize(current_path: &str, historical_paths: &[String]) -> String {
    if historical_paths.iter().any(|p| p == current_path) {
        current_path.to_string()
    } else {
        historical_paths
            .last()
            .cloned()
            .unwrap_or_else(|| current_path.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonicalizes_to_current_path_when_present() {
        let history = vec!["old/name.rs".to_string(), "new/name.rs".to_string()];
        assert_eq!(canonicalize("new/name.rs", &history), "new/name.rs");
    }

    #[test]
    fn canonicalizes_to_last_known_path_when_deleted() {
        let history = vec!["old/name.rs".to_string(), "renamed/name.rs".to_string()];
        assert_eq!(canonicalize("deleted/name.rs", &history), "renamed/name.rs");
    }

    #[test]
    fn falls_back_to_input_when_history_is_empty() {
        assert_eq!(canonicalize("only/path.rs", &[]), "only/path.rs");
    }
}
