//! Embedding/Generation Provider Abstraction Layer
//!
//! This module provides a common interface for the external model provider.
//! The [`Provider`] trait defines the contract the orchestrator consumes:
//! embed a query for retrieval, generate an answer from an assembled prompt.
//! Provider failures are transient by assumption; the orchestrator maps them
//! to fallback answers and never surfaces raw provider errors to callers.

use async_trait::async_trait;

pub mod gemini;

pub use gemini::GeminiProvider;

/// Result type for provider operations
pub type Result<T> = std::result::Result<T, ProviderError>;

/// Errors that can occur during provider calls
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("Provider unavailable: {0}")]
    Unavailable(String),

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Timeout")]
    Timeout,

    #[error("Parse error: {0}")]
    ParseError(String),
}

/// Contract every model provider must implement.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Returns the name of the provider (e.g., "gemini")
    fn name(&self) -> &str;

    /// Embed text into the vector space used by the knowledge base.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Generate an answer for an assembled prompt.
    async fn generate(&self, prompt: &str) -> Result<String>;
}
