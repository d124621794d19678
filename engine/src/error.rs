//! Engine error taxonomy
//!
//! Every variant here is recovered locally: the orchestrator maps failures
//! into cache misses, empty retrievals, structured tool failures, or a
//! templated answer. Nothing propagates to the caller of `ask`.

use thiserror::Error;

/// Errors raised by the engine's own components.
///
/// Provider, vector-store, and tool backends carry their own error enums;
/// those are converted into these variants (or into structured results) at
/// the point where the orchestrator decides how to degrade.
#[derive(Debug, Error)]
pub enum AgentError {
    /// The backing store for the query cache could not be reached.
    /// Treated as a miss on read and a no-op on write.
    #[error("cache unavailable: {0}")]
    CacheUnavailable(String),

    /// Retrieval produced no usable results; routes into the forced
    /// fallback tool.
    #[error("retrieval returned no results")]
    RetrievalEmpty,

    /// A tool invocation failed; isolated per tool, never aborts the turn.
    #[error("tool invocation failed: {0}")]
    ToolInvocationFailed(String),

    /// The generation provider failed or timed out; the answer is built
    /// from retrieved/tool text instead.
    #[error("generation failed: {0}")]
    GenerationFailed(String),

    /// A cache or memory write failed; logged and swallowed.
    #[error("persistence failed: {0}")]
    PersistenceFailed(String),

    /// Configuration could not be loaded or validated.
    #[error("configuration error: {0}")]
    Config(String),

    /// A database operation failed outside the degradable paths
    /// (e.g. reading history for the caller).
    #[error("database error: {0}")]
    Database(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = AgentError::CacheUnavailable("pool closed".to_string());
        assert_eq!(err.to_string(), "cache unavailable: pool closed");

        let err = AgentError::RetrievalEmpty;
        assert_eq!(err.to_string(), "retrieval returned no results");
    }
}
