//! Error types.
//!
//! Compression itself never fails: malformed content degrades to the next
//! strategy and truncation is always available. The only fallible surfaces
//! are building a [`Transcript`](crate::Transcript) from foreign data and
//! loading a [`CompressionConfig`](crate::config::CompressionConfig).

use std::path::PathBuf;

use thiserror::Error;

/// A transcript whose indexes do not match message positions.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TranscriptError {
    #[error("message at position {position} carries sequence index {found}")]
    IndexMismatch { position: usize, found: usize },
}

/// Failure to load or validate a compression configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("{field} must be within [0.0, 1.0], got {value}")]
    ShareOutOfRange { field: &'static str, value: f64 },

    #[error("older_share + recent_share must not exceed 1.0, got {0}")]
    SharesExceedOne(f64),

    #[error("chars_per_token must be finite and at least 0.1, got {0}")]
    InvalidCharsPerToken(f64),

    #[error("invalid unit pattern: {0}")]
    Pattern(#[from] regex::Error),
}
