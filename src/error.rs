//! Error types for the cache layer.
//!
//! One enum covers setup failures, load failures, decode failures and
//! remote-store failures so callers can branch on the class of problem.

use std::sync::Arc;

use thiserror::Error;

/// Unified error type for the cache layer.
#[derive(Error, Debug)]
pub enum CacheError {
    /// A type was registered with a blank cache prefix.
    #[error("cache prefix must not be empty")]
    EmptyPrefix,

    /// The prefix is already owned by another registered type.
    #[error("prefix [{0}] is already registered")]
    DuplicatePrefix(String),

    /// A type or loader definition failed validation.
    #[error("invalid type definition: {0}")]
    InvalidType(String),

    /// Key is absent from a cache tier.
    #[error("key not found: {0}")]
    NotFound(String),

    /// The external key could not be converted into a query value.
    #[error("key [{key}] cannot be converted: {reason}")]
    Conversion { key: String, reason: String },

    /// The query collaborator failed.
    #[error("query failed: {0}")]
    Query(String),

    /// The load-through path failed; the loader's error is kept as the cause.
    #[error("load failed for [{key}]")]
    Load {
        key: String,
        #[source]
        source: Arc<CacheError>,
    },

    /// The task running a shared load panicked or was aborted.
    #[error("load task aborted: {0}")]
    LoadAborted(String),

    /// A cached payload does not match the expected shape.
    #[error("decode failed for [{key}]")]
    Decode {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    /// A value could not be encoded for the remote tier.
    #[error("encode failed: {0}")]
    Encode(#[source] serde_json::Error),

    /// Network or protocol failure talking to the remote store.
    #[error("remote store error: {0}")]
    Remote(#[from] redis::RedisError),

    /// The caller's context was cancelled.
    #[error("operation cancelled")]
    Cancelled,

    /// The caller's deadline passed before the operation finished.
    #[error("deadline exceeded")]
    DeadlineExceeded,

    /// Several independent steps failed; each failure is kept.
    #[error("{} operations failed: {}", .0.len(), join_errors(.0))]
    Aggregate(Vec<CacheError>),
}

impl CacheError {
    /// Whether this error only reports an absent key.
    pub fn is_not_found(&self) -> bool {
        matches!(self, CacheError::NotFound(_))
    }

    /// Strip `Load` wrappers and return the error that caused them.
    pub fn root_cause(&self) -> &CacheError {
        match self {
            CacheError::Load { source, .. } => source.root_cause(),
            other => other,
        }
    }

    /// Fold a list of failures into a single result.
    ///
    /// An empty list is success, a single failure is returned as-is.
    pub fn aggregate(mut errors: Vec<CacheError>) -> Result<()> {
        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => Err(CacheError::Aggregate(errors)),
        }
    }
}

fn join_errors(errors: &[CacheError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Convenience Result type for the cache layer.
pub type Result<T> = std::result::Result<T, CacheError>;
