//! Sandbox construction errors.
//!
//! Execution failures are never errors; they are reported through
//! [`ExecutionStatus`](super::ExecutionStatus).

/// Errors raised while building a sandbox backend.
#[derive(Debug, thiserror::Error)]
pub enum SandboxError {
    #[error("invalid sandbox settings: {0}")]
    InvalidSettings(String),

    #[error("{backend} sandbox is not supported on this platform")]
    Unsupported { backend: &'static str },

    #[error("invalid denylist pattern {pattern:?}: {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

/// Result type for sandbox construction.
pub type SandboxResult<T> = std::result::Result<T, SandboxError>;
