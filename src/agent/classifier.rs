//! Modification-type inference. Kept as an explicit, swappable input
//! rather than baked into the hop loop: the default implementation is a
//! path/keyword heuristic, but a caller with an LLM budget to spare can
//! substitute a model-backed classifier without touching `investigate()`.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModificationType {
    Security,
    Interface,
    Configuration,
    Documentation,
    Structural,
    Behavioral,
    TemporalPattern,
    Ownership,
    Performance,
    TestQuality,
}

pub trait ModificationClassifier: Send + Sync {
    fn classify(&self, canonical_path: &str, diff_text: &str) -> ModificationType;
}

/// Default heuristic: checks the path first (config/docs/test conventions
/// are unambiguous), then falls back to scanning the diff body for
/// keywords associated with each remaining category.
pub struct HeuristicClassifier;

impl ModificationClassifier for HeuristicClassifier {
    fn classify(&self, canonical_path: &str, diff_text: &str) -> ModificationType {
        let path = canonical_path.to_ascii_lowercase();
        let diff = diff_text.to_ascii_lowercase();

        if path.ends_with(".md") || path.contains("docs/") || path.ends_with(".rst") {
            return ModificationType::Documentation;
        }
        if path.contains("_test.") || path.contains("test_") || path.contains(".test.") {
            return ModificationType::TestQuality;
        }
        if path.ends_with(".yaml")
            || path.ends_with(".yml")
            || path.ends_with(".toml")
            || path.ends_with(".json")
            || path.contains("config")
        {
            return ModificationType::Configuration;
        }

        const SECURITY_TERMS: &[&str] = &["password", "token", "auth", "crypto", "secret", "permission"];
        const INTERFACE_TERMS: &[&str] = &["pub fn", "export", "public", "interface", "trait ", "api"];
        const PERFORMANCE_TERMS: &[&str] = &["cache", "allocat", "loop", "n+1", "index"];
        const TEMPORAL_TERMS: &[&str] = &["deadline", "timeout", "schedule", "retry", "async"];
        const OWNERSHIP_TERMS: &[&str] = &["codeowners", "maintainer"];

        if SECURITY_TERMS.iter().any(|t| diff.contains(t)) {
            ModificationType::Security
        } else if INTERFACE_TERMS.iter().any(|t| diff.contains(t)) {
            ModificationType::Interface
        } else if OWNERSHIP_TERMS.iter().any(|t| diff.contains(t)) {
            ModificationType::Ownership
        } else if PERFORMANCE_TERMS.iter().any(|t| diff.contains(t)) {
            ModificationType::Performance
        } else if TEMPORAL_TERMS.iter().any(|t| diff.contains(t)) {
            ModificationType::TemporalPattern
        } else {
            ModificationType::Structural
        }
    }
}
