//! Error types for mobgen.
//!
//! Epistemic taxonomy:
//! - B_i falsified (fatal): the query could not be understood or resolved, no result body exists
//! - B_i falsified (expected): bad input or bad configuration
//! - I^B materialized: infrastructure failures (network, timeout, upstream API errors)
//! - K_i violated: internal invariant violations (bugs)
//!
//! Validation problems are not errors. They travel as `Violation` values
//! inside a `ValidationOutcome` and end up as warnings in the result.

use std::time::Duration;
use thiserror::Error;

/// Top-level error type for mobgen.
#[derive(Debug, Error)]
pub enum MobgenError {
    // ═══════════════════════════════════════════════════════════════════
    // B_i FALSIFIED (fatal): surfaced to the caller as `failed`
    // ═══════════════════════════════════════════════════════════════════
    #[error("Intent extraction failed: {0}")]
    Extraction(#[from] ExtractionError),

    #[error("Resolution failed: {0}")]
    Resolution(#[from] ResolutionError),

    // ═══════════════════════════════════════════════════════════════════
    // B_i FALSIFIED (expected): bad input or bad configuration
    // ═══════════════════════════════════════════════════════════════════
    #[error("Configuration error: {0}")]
    Config(#[from] super::ConfigError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    // ═══════════════════════════════════════════════════════════════════
    // I^B MATERIALIZED: upstream services misbehaved
    // ═══════════════════════════════════════════════════════════════════
    #[error("LLM API error: {0}")]
    LlmApi(#[from] LlmApiError),

    #[error("Geocoding service error: {0}")]
    Geocoding(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Request timeout after {0:?}")]
    Timeout(Duration),

    #[error("Rate limited: retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: f64 },

    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    // ═══════════════════════════════════════════════════════════════════
    // K_i VIOLATED: invariant broken (bug, should not happen)
    // ═══════════════════════════════════════════════════════════════════
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Failure of the intent extraction step.
///
/// Always fatal: the query itself is unusable, so nothing downstream runs.
#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("query text is empty")]
    EmptyQuery,

    #[error("intent service failed: {0}")]
    Service(#[source] Box<MobgenError>),

    #[error("malformed intent: {0}")]
    Malformed(String),

    #[error("intent service timed out after {0:?}")]
    Timeout(Duration),
}

/// Which fan-out branch a resolution failure came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Branch {
    Location,
    Parameters,
}

impl std::fmt::Display for Branch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Branch::Location => write!(f, "location"),
            Branch::Parameters => write!(f, "parameters"),
        }
    }
}

/// Failure of the concurrent resolution phase.
///
/// Always fatal: a candidate needs both a geography and a distribution.
#[derive(Debug, Error)]
pub enum ResolutionError {
    #[error("{branch} branch failed: {source}")]
    BranchFailed {
        branch: Branch,
        #[source]
        source: Box<MobgenError>,
    },

    #[error("{branch} branch timed out after {after:?}")]
    Timeout { branch: Branch, after: Duration },
}

impl ResolutionError {
    /// The branch that caused the failure.
    pub fn branch(&self) -> Branch {
        match self {
            Self::BranchFailed { branch, .. } | Self::Timeout { branch, .. } => *branch,
        }
    }
}

/// Chat-completion API errors (OpenAI-compatible endpoints).
#[derive(Debug, Error)]
pub enum LlmApiError {
    #[error("Authentication failed: invalid API key")]
    AuthenticationFailed,

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("API error (status {status}): {message}")]
    ApiError { status: u16, message: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Request failed after {attempts} attempts: {last_error}")]
    MaxRetriesExceeded { attempts: u32, last_error: String },
}

impl MobgenError {
    /// Create an IO error with context.
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Check if this error is worth retrying at the transport level.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Timeout(_)
                | Self::RateLimited { .. }
                | Self::Network(_)
                | Self::LlmApi(LlmApiError::ApiError { status: 500..=599, .. })
        )
    }

    /// Get retry delay hint in seconds, if applicable.
    pub fn retry_after(&self) -> Option<f64> {
        match self {
            Self::RateLimited { retry_after_secs } => Some(*retry_after_secs),
            _ => None,
        }
    }

    /// Whether this error aborts a coordinator run.
    pub fn is_fatal_run_error(&self) -> bool {
        matches!(self, Self::Extraction(_) | Self::Resolution(_))
    }
}

/// Result type alias for mobgen.
pub type Result<T> = std::result::Result<T, MobgenError>;
