//! Error taxonomy shared by every stage of a discovery run.
//!
//! Errors are per-run: none of them leave the record store half-written,
//! since store writes are insert-only.

use crate::track::Label;
use thiserror::Error;

/// Convenience alias used across the library.
pub type Result<T, E = DiscoverError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum DiscoverError {
    /// The streaming service rejected our credentials. Never retried.
    #[error("streaming service rejected the access token: {0}")]
    Unauthorized(String),

    /// Still rate limited after exhausting retries.
    #[error("streaming service kept rate limiting us after {attempts} attempts")]
    RateLimited { attempts: u32 },

    /// Network hiccup or 5xx that outlived the retry budget.
    #[error("streaming service request failed: {0}")]
    Transient(String),

    /// The service refused the request outright (4xx other than 401/429).
    #[error("streaming service returned {status}: {message}")]
    Service { status: u16, message: String },

    #[error("need {wanted} liked tracks to seed discovery, only {found} available")]
    InsufficientData { wanted: usize, found: usize },

    #[error("classifier accepted none of the {pool} candidate tracks")]
    NoAcceptedCandidates { pool: usize },

    #[error("training split is empty")]
    EmptyTrainingSet,

    #[error("training split only contains {label} tracks")]
    DegenerateTrainingSet { label: Label },

    /// The tree library refused the training data or hyperparameters.
    #[error("decision tree fitting failed: {0}")]
    Model(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("record store error: {0}")]
    Store(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl DiscoverError {
    /// Errors that should stop the run loop entirely.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::Unauthorized(_) | Self::InvalidConfig(_))
    }

    /// Errors that mean "nothing to publish this cycle" rather than a fault.
    #[must_use]
    pub const fn skips_cycle(&self) -> bool {
        matches!(
            self,
            Self::InsufficientData { .. }
                | Self::NoAcceptedCandidates { .. }
                | Self::EmptyTrainingSet
                | Self::DegenerateTrainingSet { .. }
        )
    }

    /// Whether retrying the same request later could succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::RateLimited { .. } | Self::Transient(_))
    }
}
