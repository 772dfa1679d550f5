//! Error types for the CodeRisk core crate.
//!
//! A single unified enumeration is used across ingestion, staging, graph
//! construction, and investigation so that every fallible call site in the
//! crate returns the same `Result<T, CoreError>`. Variants carry enough
//! context (endpoint, attempt count, entity key) to reproduce the failure
//! without re-running the whole pipeline.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    /// External fetch failed after exhausting the retry budget.
    #[error("upstream unavailable: {endpoint} (after {attempts} attempts): {message}")]
    UpstreamUnavailable {
        endpoint: String,
        attempts: u32,
        message: String,
    },

    /// Local limiter rejected the call, or upstream returned 429 past the backoff budget.
    #[error("rate limited: {endpoint} (retry_after={retry_after_secs:?}s)")]
    RateLimited {
        endpoint: String,
        retry_after_secs: Option<u64>,
    },

    /// A specific entity is missing upstream. Recorded and skipped, never retried.
    #[error("not found: {entity_kind} {key}")]
    NotFound { entity_kind: String, key: String },

    /// A structured response (LLM JSON, diff chunk) could not be parsed.
    #[error("parse failure in {context}: {message}")]
    ParseFailure { context: String, message: String },

    /// An invariant check failed (e.g. CO_CHANGED asymmetry, missing canonical path).
    /// Non-recoverable within the run; logged with enough context to reproduce.
    #[error("integrity violation: {invariant}: {detail}")]
    IntegrityViolation { invariant: String, detail: String },

    /// Wall-clock budget exceeded. The core completes with best-effort output.
    #[error("deadline exceeded after {elapsed_ms}ms (budget {budget_ms}ms)")]
    DeadlineExceeded { elapsed_ms: u64, budget_ms: u64 },

    /// Token/LLM-call budget exceeded. Treated the same as `DeadlineExceeded`.
    #[error("budget exhausted: {resource} ({used}/{limit})")]
    BudgetExhausted {
        resource: String,
        used: u64,
        limit: u64,
    },

    /// Underlying filesystem/process I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Staging store error.
    #[error("database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    /// Graph write/read error that is not itself an integrity violation
    /// (e.g. a missing node the caller should have upserted first).
    #[error("graph error: {0}")]
    GraphWrite(String),

    /// Generic catch-all for conditions that don't fit the taxonomy above.
    #[error("{0}")]
    Custom(String),
}

impl CoreError {
    pub fn upstream(endpoint: impl Into<String>, attempts: u32, message: impl Into<String>) -> Self {
        CoreError::UpstreamUnavailable {
            endpoint: endpoint.into(),
            attempts,
            message: message.into(),
        }
    }

    pub fn not_found(entity_kind: impl Into<String>, key: impl Into<String>) -> Self {
        CoreError::NotFound {
            entity_kind: entity_kind.into(),
            key: key.into(),
        }
    }

    pub fn parse_failure(context: impl Into<String>, message: impl Into<String>) -> Self {
        CoreError::ParseFailure {
            context: context.into(),
            message: message.into(),
        }
    }

    pub fn integrity(invariant: impl Into<String>, detail: impl Into<String>) -> Self {
        CoreError::IntegrityViolation {
            invariant: invariant.into(),
            detail: detail.into(),
        }
    }

    /// Whether a retry is ever meaningful for this error kind.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CoreError::UpstreamUnavailable { .. } | CoreError::RateLimited { .. }
        )
    }
}
