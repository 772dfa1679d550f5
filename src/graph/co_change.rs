//! Co-change frequency computation: Jaccard index over the sets of commits
//! that touched each file, within a sliding window.

use std::collections::{HashMap, HashSet};

use rayon::prelude::*;

use crate::config::Config;
use crate::model::{CoChangedEdge, ModifiesEdge};

/// One commit's file touch-set, already filtered to the window by the
/// caller.
pub struct CommitTouchSet<'a> {
    pub commit_sha: &'a str,
    pub files: &'a [ModifiesEdge],
}

/// Computes symmetric co-change pairs above `config.co_change_min_frequency`
/// and `config.co_change_min_raw_count`, using a Jaccard index over each
/// pair of files' commit sets:
///
/// `frequency(a, b) = |commits(a) ∩ commits(b)| / |commits(a) ∪ commits(b)|`
///
/// Returns one `CoChangedEdge` per unordered pair (the caller inserts both
/// directions into the graph).
pub fn compute_co_change(
    touches: &[CommitTouchSet],
    window_days: i64,
    config: &Config,
) -> Vec<CoChangedEdge> {
    let mut commits_by_file: HashMap<&str, HashSet<&str>> = HashMap::new();
    for touch in touches {
        for change in touch.files {
            commits_by_file
                .entry(change.canonical_file_path.as_str())
                .or_default()
                .insert(touch.commit_sha);
        }
    }

    let files: Vec<&str> = commits_by_file.keys().copied().collect();

    // The pairwise Jaccard computation is O(n^2) in file count; on large
    // repositories this is the most CPU-bound step in graph construction,
    // so each file's row of comparisons runs on a rayon worker.
    (0..files.len())
        .into_par_iter()
        .flat_map(|i| {
            let files = &files;
            let commits_by_file = &commits_by_file;
            ((i + 1)..files.len())
                .filter_map(move |j| {
                    let a = files[i];
                    let b = files[j];
                    let set_a = &commits_by_file[a];
                    let set_b = &commits_by_file[b];

                    let intersection = set_a.intersection(set_b).count();
                    if intersection < config.co_change_min_raw_count as usize {
                        return None;
                    }
                    let union = set_a.union(set_b).count();
                    if union == 0 {
                        return None;
                    }
                    let frequency = intersection as f64 / union as f64;
                    if frequency < config.co_change_min_frequency {
                        return None;
                    }

                    Some(CoChangedEdge {
                        file_a: a.to_string(),
                        file_b: b.to_string(),
                        frequency,
                        co_change_count: intersection as u32,
                        window_days,
                    })
                })
                .collect::<Vec<_>>()
        })
        .collect()
}
