//! Error types for the tiered cache

use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the tiered cache
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error (disk read/write on the warm or cold tier)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Index or snapshot (de)serialization failed
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration file could not be parsed
    #[error("Failed to parse configuration file: {0}")]
    ConfigFile(#[from] serde_yaml::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Stored payload failed to decode or verify
    #[error("Corrupted entry {key}: {reason}")]
    Corruption { key: String, reason: String },

    /// Key cannot be used by the cache
    #[error("Invalid cache key: {0:?}")]
    InvalidKey(String),

    /// Embedding dimensions differ
    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Embedding is empty or has non-finite components
    #[error("Invalid embedding: {0}")]
    InvalidEmbedding(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    // =========================================================================
    // Compression Errors
    // =========================================================================
    /// Compression failed
    #[error("Compression with {algorithm} failed: {reason}")]
    CompressionFailed { algorithm: String, reason: String },

    /// Decompression failed
    #[error("Decompression with {algorithm} failed: {reason}")]
    DecompressionFailed { algorithm: String, reason: String },
}

impl Error {
    /// Build a corruption error for a key
    pub fn corruption(key: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Error::Corruption {
            key: key.into(),
            reason: reason.to_string(),
        }
    }

    /// True for failures that only affect a single call and resolve to a miss
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::Io(_) | Error::Serialization(_))
    }

    /// True when stored data for a key can no longer be decoded
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            Error::Corruption { .. } | Error::DecompressionFailed { .. }
        )
    }
}
