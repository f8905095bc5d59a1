//! Error taxonomy for the story engine.
//!
//! [`StoreError`] covers the turn store; [`EngineError`] is what lifecycle
//! operations return, wrapping storage, generation and response-validation
//! failures alongside the engine's own precondition errors.

use thiserror::Error;

use crate::generation::GenerationError;
use crate::story::response::ResponseError;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("failed to encode stored data: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("session not found: {0}")]
    SessionNotFound(String),

    #[error("turn index conflict in session {session_id}: expected {expected}, got {actual}")]
    IndexConflict {
        session_id: String,
        expected: u32,
        actual: u32,
    },

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("storage error: {0}")]
    Storage(#[from] StoreError),

    #[error("generation failed: {0}")]
    Generation(#[from] GenerationError),

    #[error("generator returned an unusable response: {0}")]
    MalformedResponse(#[from] ResponseError),

    #[error("session not found: {0}")]
    SessionNotFound(String),

    #[error("turn index {index} is out of range for a history of {len} turns")]
    IndexOutOfRange { index: u32, len: usize },

    #[error("embedding failed: {0}")]
    Embedding(String),

    #[error("no user turn to retry")]
    NothingToRetry,

    #[error("causal cutoff {cutoff} is not below the live turn count {live}")]
    CausalViolation { cutoff: u32, live: usize },
}

impl EngineError {
    /// Whether the same request may succeed if issued again.
    ///
    /// Storage and precondition errors are final for the action that raised
    /// them; generation errors depend on their kind.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Generation(e) => e.is_transient(),
            Self::MalformedResponse(_) => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn retryability_follows_error_kind() {
        assert!(EngineError::Generation(GenerationError::Timeout(Duration::from_secs(1))).is_retryable());
        assert!(!EngineError::Generation(GenerationError::Authentication("bad key".into())).is_retryable());
        assert!(!EngineError::Storage(StoreError::Unavailable("disk".into())).is_retryable());
        assert!(!EngineError::NothingToRetry.is_retryable());
        assert!(!EngineError::Embedding("model missing".into()).is_retryable());
    }
}
