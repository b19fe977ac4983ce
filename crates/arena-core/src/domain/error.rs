//! Error taxonomy for arena evaluation.
//!
//! Three tiers, from least to most severe:
//! - non-success [`ExecutionStatus`](crate::sandbox::ExecutionStatus) values are
//!   data, scored as the floor for that scenario
//! - [`EngineFailure`] aborts one agent's run; its score and price carry over
//! - [`ArenaError`] aborts the whole batch call

use arena_state::{ArenaType, StorageError};

/// Agent-level failure: the agent cannot be evaluated this pass.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EngineFailure {
    #[error("agent has no registered interface")]
    MissingInterface,

    #[error("malformed interface: {0}")]
    MalformedInterface(String),

    #[error("interface code not found: {digest}")]
    InterfaceNotFound { digest: String },

    #[error("{arena} arena has no scenarios to run")]
    EmptyBattery { arena: ArenaType },
}

/// Batch-level failure: the orchestrator call returns this and nothing else.
#[derive(Debug, thiserror::Error)]
pub enum ArenaError {
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("write-back for agent {agent_id} failed after {attempts} attempts: {source}")]
    WriteBack {
        agent_id: String,
        attempts: u32,
        #[source]
        source: StorageError,
    },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("registration rejected: {0}")]
    Rejected(#[from] EngineFailure),

    #[error("evaluation worker failed: {0}")]
    Worker(String),
}

/// Result type for batch-level operations.
pub type ArenaResult<T> = std::result::Result<T, ArenaError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_back_message_names_agent_and_attempts() {
        let err = ArenaError::WriteBack {
            agent_id: "agent-7".into(),
            attempts: 3,
            source: StorageError::Unavailable("socket closed".into()),
        };
        let msg = err.to_string();
        assert!(msg.contains("agent-7"));
        assert!(msg.contains("3 attempts"));
        assert!(msg.contains("socket closed"));
    }

    #[test]
    fn test_storage_error_converts() {
        let err: ArenaError = StorageError::Backend("boom".into()).into();
        assert!(matches!(err, ArenaError::Storage(_)));
    }

    #[test]
    fn test_empty_battery_names_arena() {
        let err = EngineFailure::EmptyBattery {
            arena: ArenaType::Coding,
        };
        assert_eq!(err.to_string(), "coding arena has no scenarios to run");
    }
}
