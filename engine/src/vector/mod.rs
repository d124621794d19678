//! Vector Store Abstraction Layer
//!
//! The knowledge base is an external vector index. This module defines the
//! contract the engine consumes ([`VectorStore`]) plus the document types
//! that flow out of retrieval and into ranking. The concrete REST adapter
//! lives in [`chroma`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub mod chroma;

pub use chroma::ChromaStore;

/// Result type for vector store operations
pub type Result<T> = std::result::Result<T, VectorError>;

/// Errors that can occur against the vector index
#[derive(Debug, thiserror::Error)]
pub enum VectorError {
    #[error("vector store unavailable: {0}")]
    Unavailable(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("parse error: {0}")]
    Parse(String),
}

/// Provenance class of a knowledge-base chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    /// Scraped from the platform's official documentation
    Official,

    /// Community-written guides and posts
    Community,

    /// Provenance not recorded at ingest time
    Unknown,
}

impl SourceType {
    /// Official documentation gets the authoritative ranking boost.
    pub fn is_authoritative(&self) -> bool {
        matches!(self, SourceType::Official)
    }

    /// Parse the string form stored in chunk metadata. Unrecognized values
    /// fall back to `Unknown`.
    pub fn parse(value: &str) -> Self {
        match value {
            "official" => SourceType::Official,
            "community" => SourceType::Community,
            _ => SourceType::Unknown,
        }
    }
}

/// Metadata carried by a retrieved chunk
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentMetadata {
    /// Title of the source page
    pub title: String,

    /// URL or document locator
    pub locator: String,

    /// Provenance class
    pub source_type: SourceType,

    /// Age of the content in days, when the ingest recorded a publish time
    pub age_days: Option<i64>,

    /// True when the chunk was flagged as step-by-step guidance at ingest
    pub step_by_step: bool,
}

impl DocumentMetadata {
    /// Metadata with nothing known beyond a title and locator.
    pub fn bare(title: impl Into<String>, locator: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            locator: locator.into(),
            source_type: SourceType::Unknown,
            age_days: None,
            step_by_step: false,
        }
    }
}

/// One chunk returned by a similarity search
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievedDocument {
    /// Chunk text
    pub content: String,

    /// Source metadata
    pub metadata: DocumentMetadata,

    /// Raw distance score; lower means more similar
    pub distance: f64,
}

/// A document handed to the index for ingestion
#[derive(Debug, Clone, Serialize)]
pub struct NewDocument {
    /// Stable chunk identifier
    pub id: String,

    /// Chunk text
    pub content: String,

    /// Arbitrary metadata stored alongside the chunk
    pub metadata: serde_json::Value,
}

/// Contract the engine consumes from the vector index.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Similarity search. Results are ordered ascending by distance.
    async fn search(&self, query_vector: &[f32], k: usize) -> Result<Vec<RetrievedDocument>>;

    /// Add documents to the index.
    async fn add(&self, documents: &[NewDocument]) -> Result<()>;

    /// Number of documents in the index.
    async fn count(&self) -> Result<u64>;
}
