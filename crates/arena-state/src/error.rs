//! Error types for arena-state

use thiserror::Error;

/// Errors raised while connecting to or preparing a backend.
#[derive(Error, Debug)]
pub enum StateError {
    /// Database connection error
    #[error("Database connection failed: {0}")]
    Connection(String),

    /// Database query error
    #[error("Database query failed: {0}")]
    Query(String),

    /// Schema setup error
    #[error("Schema setup failed: {0}")]
    SchemaSetup(String),
}

impl From<surrealdb::Error> for StateError {
    fn from(err: surrealdb::Error) -> Self {
        StateError::Query(err.to_string())
    }
}

/// Errors returned by the storage traits.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StorageError {
    #[error("agent not found: {agent_id}")]
    AgentNotFound { agent_id: String },

    #[error("interface code not found: {digest}")]
    InterfaceNotFound { digest: String },

    /// An outcome for this agent and day is already persisted.
    #[error("outcome already recorded for agent {agent_id} on {run_date}")]
    AlreadyRecorded { agent_id: String, run_date: String },

    /// The profile's tier or score changed after the write was computed.
    #[error("agent {agent_id} changed since it was read")]
    ScoreConflict { agent_id: String },

    #[error("invalid content digest: {digest}")]
    InvalidDigest { digest: String },

    /// The backend could not be reached; the call may succeed if repeated.
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    #[error("storage backend error: {0}")]
    Backend(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl StorageError {
    /// Whether repeating the same call can reasonably succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, StorageError::Unavailable(_))
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Serialization(err.to_string())
    }
}
