//! Sync error types

/// Sync result type
pub type Result<T> = std::result::Result<T, Error>;

/// Sync errors
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Core(#[from] verdict_core::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Room sync has stopped")]
    Closed,
}
