//! Error types for wikisocial-core

use thiserror::Error;

/// Main error type for the wikisocial-core library
#[derive(Error, Debug)]
pub enum Error {
    /// Caller supplied a contradictory or out-of-range filter/limit.
    /// Rejected at the API boundary, never silently clamped.
    #[error("invalid filter: {0}")]
    InvalidFilter(String),

    /// Upstream event or graph store unreachable or timed out.
    /// Components recover from this locally; it reaches callers only when
    /// a store adapter surfaces it directly.
    #[error("source unavailable: {source_name}: {reason}")]
    SourceUnavailable { source_name: String, reason: String },

    /// A cached value failed structural validation on read.
    /// Handled inside the cache layer (drop and recompute); kept as a
    /// variant so adapters can report it.
    #[error("cache corruption for owner {owner}: {reason}")]
    CacheCorruption { owner: u64, reason: String },

    /// Database error
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Shorthand for a store that could not be reached
    pub fn unavailable(source_name: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::SourceUnavailable {
            source_name: source_name.into(),
            reason: reason.into(),
        }
    }

    /// Whether a feed build should degrade to an empty feed with a signal
    /// instead of failing. Invalid requests are the only hard failures.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Error::InvalidFilter(_) | Error::Config(_))
    }
}

/// Result type alias for wikisocial-core
pub type Result<T> = std::result::Result<T, Error>;
