//! Kahn-style topological ordering of commits over the parent DAG.
//!
//! Ties are broken by author date ascending, then by SHA, for determinism:
//! the baseline metrics read `topological_index` and must get the same
//! answer on every run over the same history.

use std::collections::{BinaryHeap, HashMap, HashSet};

use crate::model::Commit;

/// Assigns a monotonic `topological_index` to every commit such that for
/// any ancestor A of B, `topo(A) < topo(B)`. Returns a map from SHA to
/// index; does not mutate the input.
pub fn topological_order(commits: &[Commit]) -> HashMap<String, u64> {
    // children[p] = set of commits whose parent list contains p
    let mut children: HashMap<&str, Vec<&str>> = HashMap::new();
    let mut indegree: HashMap<&str, usize> = HashMap::new();
    let by_sha: HashMap<&str, &Commit> = commits.iter().map(|c| (c.sha.as_str(), c)).collect();

    for c in commits {
        indegree.entry(c.sha.as_str()).or_insert(0);
        for p in &c.parent_shas {
            if by_sha.contains_key(p.as_str()) {
                children.entry(p.as_str()).or_default().push(c.sha.as_str());
                *indegree.entry(c.sha.as_str()).or_insert(0) += 1;
            }
        }
    }

    // Order ready nodes by (author_date, sha) ascending so output is
    // deterministic regardless of input order or HashMap iteration order.
    #[derive(Eq, PartialEq)]
    struct Ready<'a> {
        date: chrono::DateTime<chrono::Utc>,
        sha: &'a str,
    }
    impl<'a> Ord for Ready<'a> {
        fn cmp(&self, other: &Self) -> std::cmp::Ordering {
            // Reverse so BinaryHeap (a max-heap) pops the smallest (date, sha).
            other.date.cmp(&self.date).then_with(|| other.sha.cmp(self.sha))
        }
    }
    impl<'a> PartialOrd for Ready<'a> {
        fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
            Some(self.cmp(other))
        }
    }

    let mut heap = BinaryHeap::new();
    let mut seen_ready = HashSet::new();
    for (&sha, &deg) in &indegree {
        if deg == 0 {
            let c = by_sha[sha];
            heap.push(Ready { date: c.author_date, sha });
            seen_ready.insert(sha);
        }
    }

    let mut result = HashMap::with_capacity(commits.len());
    let mut index: u64 = 0;
    let mut remaining_indegree = indegree.clone();

    while let Some(Ready { sha, .. }) = heap.pop() {
        result.insert(sha.to_string(), index);
        index += 1;

        if let Some(kids) = children.get(sha) {
            for &kid in kids {
                let deg = remaining_indegree.get_mut(kid).unwrap();
                *deg -= 1;
                if *deg == 0 && seen_ready.insert(kid) {
                    let c = by_sha[kid];
                    heap.push(Ready { date: c.author_date, sha: kid });
                }
            }
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn commit(sha: &str, parents: &[&str], day: u32) -> Commit {
        Commit {
            sha: sha.to_string(),
            author_email: "dev@example.com".into(),
            author_date: Utc.with_ymd_and_hms(2024, 1, day, 0, 0, 0).unwrap(),
            message: String::new(),
            additions: 0,
            deletions: 0,
            files_changed: 0,
            parent_shas: parents.iter().map(|s| s.to_string()).collect(),
            topological_index: None,
        }
    }

    #[test]
    fn ancestor_sorts_before_descendant() {
        let commits = vec![
            commit("c3", &["c2"], 3),
            commit("c1", &[], 1),
            commit("c2", &["c1"], 2),
        ];
        let order = topological_order(&commits);
        assert!(order["c1"] < order["c2"]);
        assert!(order["c2"] < order["c3"]);
    }

    #[test]
    fn merge_commit_waits_for_both_parents() {
        let commits = vec![
            commit("base", &[], 1),
            commit("left", &["base"], 2),
            commit("right", &["base"], 2),
            commit("merge", &["left", "right"], 3),
        ];
        let order = topological_order(&commits);
        assert!(order["base"] < order["left"]);
        assert!(order["base"] < order["right"]);
        assert!(order["left"] < order["merge"]);
        assert!(order["right"] < order["merge"]);
    }

    #[test]
    fn ties_broken_deterministically_by_date_then_sha() {
        let commits = vec![commit("b", &[], 1), commit("a", &[], 1)];
        let order1 = topological_order(&commits);
        let order2 = topological_order(&commits);
        assert_eq!(order1, order2);
        assert!(order1["a"] < order1["b"]);
    }
}
