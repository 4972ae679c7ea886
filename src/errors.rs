/*!
 * Error types for the livetl pipeline.
 *
 * This module contains custom error types for the different parts of the
 * pipeline, using the thiserror crate for ergonomic error definitions.
 */

use thiserror::Error;

/// Errors that a translation provider can report for a single call
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    /// The provider signalled that its request quota is exhausted
    #[error("Rate limit exceeded: {0}")]
    RateLimited(String),

    /// The request never produced a usable response (connection, timeout)
    #[error("Network error: {0}")]
    NetworkError(String),

    /// The provider answered, but with an error or an unusable payload
    #[error("Service error: {0}")]
    ServiceError(String),
}

impl ProviderError {
    /// Whether the queue should keep the task and retry after a cooldown
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited(_))
    }
}

/// Errors surfaced to the caller of a translation request
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TranslationError {
    /// Error from the provider API
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    /// Quota retries kept failing until the bounded wait ran out
    #[error("Translation service unavailable after {attempts} rate-limited attempts")]
    ServiceUnavailable {
        /// Number of attempts made before giving up
        attempts: u32,
    },

    /// The queue worker is gone and can no longer accept work
    #[error("Translation queue closed")]
    QueueClosed,
}

/// Errors raised while locating the live content region
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DetectionError {
    /// Region discovery failed on every attempt; detection is abandoned
    #[error("Content region not found after {attempts} attempts")]
    RegionNotFound {
        /// Number of discovery attempts made
        attempts: u32,
    },
}

/// Errors raised while parsing a selector
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SelectorError {
    /// The selector text is not part of the supported subset
    #[error("Invalid selector '{selector}': {reason}")]
    Invalid {
        /// The selector as written
        selector: String,
        /// What went wrong
        reason: String,
    },
}

/// Errors raised by structural document operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DocumentError {
    /// The handle does not belong to this document
    #[error("Unknown node: {0}")]
    UnknownNode(crate::document::NodeId),

    /// The operation would put a node inside itself or move the root
    #[error("Invalid hierarchy operation on node {0}")]
    Hierarchy(crate::document::NodeId),
}

/// Errors raised by the durable cache store.
///
/// These are logged and never surfaced through the cache API.
#[derive(Error, Debug)]
pub enum CacheIoError {
    /// The backing store could not be read or written
    #[error("Cache store error: {0}")]
    Store(String),

    /// Persisted data could not be encoded or decoded
    #[error("Cache serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<rusqlite::Error> for CacheIoError {
    fn from(error: rusqlite::Error) -> Self {
        Self::Store(error.to_string())
    }
}

/// Main application error type that wraps all other errors
#[derive(Error, Debug)]
pub enum AppError {
    /// Error from a file operation
    #[error("File error: {0}")]
    File(String),

    /// Error from a provider
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    /// Error from translation
    #[error("Translation error: {0}")]
    Translation(#[from] TranslationError),

    /// Error from region detection
    #[error("Detection error: {0}")]
    Detection(#[from] DetectionError),

    /// Any other error
    #[error("Unknown error: {0}")]
    Unknown(String),
}

impl AppError {
    /// Process exit status reported by the command line tool
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::File(_) => 2,
            Self::Provider(_) | Self::Translation(_) => 3,
            Self::Detection(_) => 4,
            Self::Unknown(_) => 1,
        }
    }
}

// Utility functions for error conversion
impl From<anyhow::Error> for AppError {
    /// Recover the typed error behind an `anyhow` chain, if there is one
    fn from(error: anyhow::Error) -> Self {
        let error = match error.downcast::<TranslationError>() {
            Ok(error) => return Self::Translation(error),
            Err(error) => error,
        };
        let error = match error.downcast::<ProviderError>() {
            Ok(error) => return Self::Provider(error),
            Err(error) => error,
        };
        let error = match error.downcast::<DetectionError>() {
            Ok(error) => return Self::Detection(error),
            Err(error) => error,
        };
        if error.downcast_ref::<std::io::Error>().is_some() {
            return Self::File(format!("{:#}", error));
        }
        Self::Unknown(format!("{:#}", error))
    }
}

impl From<std::io::Error> for AppError {
    fn from(error: std::io::Error) -> Self {
        Self::File(error.to_string())
    }
}
