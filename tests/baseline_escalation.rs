use chrono::Utc;
use coderisk_core::baseline::{evaluate, BaselineContext, RiskLevel};
use coderisk_core::config::Config;
use coderisk_core::graph::PropertyGraph;
use coderisk_core::model::{
    CausedByEdge, CoChangedEdge, Commit, EvidenceSource, FileChangeStatus, FileEntity, Incident,
    ModifiesEdge,
};

fn file(path: &str) -> FileEntity {
    FileEntity {
        canonical_path: path.to_string(),
        historical_paths: vec![path.to_string()],
        language: Some("rust".to_string()),
        branch: "main".to_string(),
        last_known_sha: None,
    }
}

fn commit(sha: &str) -> Commit {
    Commit {
        sha: sha.to_string(),
        author_email: "dev@example.com".to_string(),
        author_date: Utc::now(),
        message: "change".to_string(),
        additions: 10,
        deletions: 2,
        files_changed: 1,
        parent_shas: vec![],
        topological_index: None,
    }
}

#[test]
fn heavily_coupled_file_with_tight_co_change_escalates_to_agent() {
    let mut graph = PropertyGraph::new();
    let config = Config::default();

    let hot = graph.upsert_file(file("src/payments.rs"));
    let commit_idx = graph.upsert_commit(commit("c1"));
    graph
        .upsert_modifies(
            commit_idx,
            hot,
            ModifiesEdge {
                commit_sha: "c1".to_string(),
                canonical_file_path: "src/payments.rs".to_string(),
                additions: 10,
                deletions: 2,
                status: FileChangeStatus::Modified,
            },
        )
        .expect("upsert_modifies");

    // Couple `payments.rs` tightly with more files than the default
    // coupling threshold, each at a frequency above the top-co-change
    // threshold, so both metrics fail simultaneously.
    for i in 0..(config.coupling_count_threshold + 1) {
        let neighbor = graph.upsert_file(file(&format!("src/neighbor_{i}.rs")));
        graph.upsert_co_changed_pair(
            hot,
            neighbor,
            CoChangedEdge {
                file_a: "src/payments.rs".to_string(),
                file_b: format!("src/neighbor_{i}.rs"),
                frequency: 0.9,
                co_change_count: 9,
                window_days: config.co_change_window_days,
            },
        );
    }

    let ctx = BaselineContext {
        repo_churn_counts: &[1, 2, 3],
        incidents: &[],
        now: Utc::now(),
    };

    let result = evaluate(&graph, hot, &config, &ctx);
    assert_eq!(result.canonical_path, "src/payments.rs");
    assert_eq!(result.risk_level, RiskLevel::Critical);
    assert!(result.escalate_to_agent);
}

#[test]
fn untouched_isolated_file_stays_below_escalation() {
    let mut graph = PropertyGraph::new();
    let config = Config::default();

    // No commits, no co-changed neighbors, no incidents, and no file in the
    // graph matching the test-naming convention. Every metric but
    // test-to-source passes; that one metric warns (no convention to
    // measure against isn't itself risk-bearing), which alone is enough to
    // lift the file out of `None` without crossing the escalation line.
    let quiet = graph.upsert_file(file("src/quiet.rs"));
    let ctx = BaselineContext {
        repo_churn_counts: &[1, 2, 3],
        incidents: &[],
        now: Utc::now(),
    };

    let result = evaluate(&graph, quiet, &config, &ctx);
    assert_eq!(result.risk_level, RiskLevel::Low);
    assert!(!result.escalate_to_agent);
}

#[test]
fn coupling_failing_alone_still_reaches_high() {
    let mut graph = PropertyGraph::new();
    let config = Config::default();

    // 12 neighbors at exactly the top-co-change threshold: enough to trip
    // `coupling_count_threshold` (10) on its own, but `0.7 > 0.7` is false,
    // so `top_co_change` stays a Pass and no other metric fails alongside it.
    let hot = graph.upsert_file(file("src/settings.rs"));
    for i in 0..12 {
        let neighbor = graph.upsert_file(file(&format!("src/setting_{i}.rs")));
        graph.upsert_co_changed_pair(
            hot,
            neighbor,
            CoChangedEdge {
                file_a: "src/settings.rs".to_string(),
                file_b: format!("src/setting_{i}.rs"),
                frequency: config.top_co_change_threshold,
                co_change_count: 4,
                window_days: config.co_change_window_days,
            },
        );
    }

    let ctx = BaselineContext {
        repo_churn_counts: &[],
        incidents: &[],
        now: Utc::now(),
    };

    let result = evaluate(&graph, hot, &config, &ctx);
    assert_eq!(result.risk_level, RiskLevel::High);
    assert!(result.escalate_to_agent);
}

#[test]
fn two_resolved_incidents_alone_still_reach_high() {
    let mut graph = PropertyGraph::new();
    let config = Config::default();
    let now = Utc::now();

    let hot = graph.upsert_file(file("src/payment_gateway.rs"));
    for issue_number in [101_u64, 202_u64] {
        let incident_idx = graph.upsert_incident(issue_number);
        graph.upsert_caused_by(
            incident_idx,
            hot,
            CausedByEdge {
                issue_number,
                canonical_file_path: "src/payment_gateway.rs".to_string(),
                block_name: None,
                confidence: 0.9,
                evidence_source: EvidenceSource::TimelineEvent,
            },
        );
    }

    let incidents = vec![
        Incident {
            issue_number: 101,
            fixing_commit_shas: vec![],
            resolved_at: Some(now),
        },
        Incident {
            issue_number: 202,
            fixing_commit_shas: vec![],
            resolved_at: Some(now),
        },
    ];
    let ctx = BaselineContext {
        repo_churn_counts: &[],
        incidents: &incidents,
        now,
    };

    let result = evaluate(&graph, hot, &config, &ctx);
    assert_eq!(result.risk_level, RiskLevel::High);
    assert!(result.escalate_to_agent);
}
