//! Fixed risk-level rule table: maps the per-metric verdicts onto one
//! of five ordered risk levels plus an overall confidence.

use super::{MetricEvidence, Severity};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum RiskLevel {
    None,
    Low,
    Medium,
    High,
    Critical,
}

/// Reads the risk level off the count of failing and warning metrics. The
/// table is intentionally coarse: one fail is LOW, two is MEDIUM, three or
/// more is HIGH, and any fail alongside the coupling or top-co-change
/// metric at its threshold edge escalates to CRITICAL — those two metrics
/// are the strongest predictors and a simultaneous failure compounds risk
/// rather than adding linearly. Coupling and incident density are each
/// strong enough signals on their own that a sole failure on either one
/// also reaches HIGH rather than waiting on a second failing metric.
pub fn classify(metrics: &[MetricEvidence]) -> (RiskLevel, f64) {
    let fails = metrics.iter().filter(|m| m.severity == Severity::Fail).count();
    let warns = metrics.iter().filter(|m| m.severity == Severity::Warn).count();

    let coupling_fails = metrics
        .iter()
        .any(|m| matches!(m.metric, super::MetricKind::Coupling) && m.severity == Severity::Fail);
    let top_co_change_fails = metrics
        .iter()
        .any(|m| matches!(m.metric, super::MetricKind::TopCoChange) && m.severity == Severity::Fail);
    let incident_density_fails = metrics
        .iter()
        .any(|m| matches!(m.metric, super::MetricKind::IncidentDensity) && m.severity == Severity::Fail);

    let high_impact_single_fail = fails == 1 && (coupling_fails || incident_density_fails);

    let level = if coupling_fails && top_co_change_fails && fails >= 2 {
        RiskLevel::Critical
    } else if high_impact_single_fail {
        RiskLevel::High
    } else {
        match fails {
            0 => {
                if warns > 0 {
                    RiskLevel::Low
                } else {
                    RiskLevel::None
                }
            }
            1 => RiskLevel::Low,
            2 => RiskLevel::Medium,
            _ => RiskLevel::High,
        }
    };

    let confidence = match level {
        RiskLevel::None => 0.9,
        RiskLevel::Low => 0.85,
        RiskLevel::Medium => 0.75,
        RiskLevel::High => 0.7,
        RiskLevel::Critical => 0.65,
    };

    (level, confidence)
}
