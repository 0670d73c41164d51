//! Error types for the cache.

use thiserror::Error;

/// Main error type for cache operations.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Key already exists: {0}")]
    DuplicateKey(String),

    #[error("Item not found in sorted list: {0}")]
    ItemNotFound(String),

    #[error("Comparer does not yield a unique position for {0}")]
    NotUnique(String),

    #[error("Index calculator used before initial load")]
    NotLoaded,

    #[error("No comparer has been set")]
    NoComparer,

    #[error("Source cache has been disposed")]
    Disposed,

    #[error("Subscription was dropped")]
    SubscriptionDropped,

    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<serde_json::Error> for CacheError {
    fn from(e: serde_json::Error) -> Self {
        CacheError::Config(e.to_string())
    }
}

/// Result type for cache operations.
pub type Result<T> = std::result::Result<T, CacheError>;
