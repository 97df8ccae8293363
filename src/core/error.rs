//! Error types for the core module.

use super::storage::StorageError;

/// Core error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Goal text is blank.
    #[error("please enter a goal for your agent")]
    EmptyGoal,

    /// No agent with this ID.
    #[error("agent not found: {0}")]
    AgentNotFound(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Persistence failure.
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, Error>;
