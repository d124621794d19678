//! Shared query/response types
//!
//! These types cross module boundaries: a [`Query`] flows from the caller
//! through classification, caching, and retrieval; an [`AgentResponse`] flows
//! back out and is what the cache and conversation memory persist.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

/// An incoming query, immutable once constructed.
#[derive(Debug, Clone)]
pub struct Query {
    /// The text exactly as the caller supplied it
    pub raw: String,

    /// Trimmed, lowercased form used for matching and fingerprinting
    pub normalized: String,

    /// Caller-supplied scoping metadata (community type, size, ...).
    ///
    /// A `BTreeMap` so that serialization is order-independent by
    /// construction: the same key/value pairs always produce the same bytes.
    pub context: BTreeMap<String, String>,
}

impl Query {
    /// Create a query, deriving the normalized form from the raw text.
    pub fn new(raw: impl Into<String>, context: BTreeMap<String, String>) -> Self {
        let raw = raw.into();
        let normalized = raw.trim().to_lowercase();
        Self {
            raw,
            normalized,
            context,
        }
    }

    /// Number of whitespace-separated words in the normalized text.
    pub fn word_count(&self) -> usize {
        self.normalized.split_whitespace().count()
    }
}

/// A single source attribution attached to an answer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SourceRef {
    /// Human-readable title of the source
    pub title: String,

    /// Where the source lives (URL or document locator)
    pub locator: String,

    /// Relevance score in [0, 1], when one is known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
}

impl SourceRef {
    pub fn new(title: impl Into<String>, locator: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            locator: locator.into(),
            score: None,
        }
    }

    pub fn with_score(mut self, score: f64) -> Self {
        self.score = Some(score);
        self
    }
}

/// The caller-visible result of one query.
///
/// `ask` always produces one of these; failures along the way degrade into a
/// templated answer rather than an error.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentResponse {
    /// The generated (or templated) answer text
    pub answer: String,

    /// Sources backing the answer, best first
    pub sources: Vec<SourceRef>,

    /// False only for the templated "nothing found" answer
    pub success: bool,

    /// True when the forced generic-lookup tool supplied the answer material
    pub used_fallback: bool,

    /// Number of knowledge-base results that survived ranking
    pub result_count: usize,

    /// True when this response was served from the query cache
    pub cached: bool,
}

/// Aggregate counters surfaced by the `status` subcommand.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentStats {
    /// Documents in the knowledge base
    pub documents: u64,

    /// Distinct sessions with live turns
    pub sessions: u64,

    /// Live conversation turns across all sessions
    pub turns: u64,
}

/// Current unix time in seconds.
pub fn now_unix() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_normalization() {
        let q = Query::new("  How do I add a Role?  ", BTreeMap::new());
        assert_eq!(q.raw, "  How do I add a Role?  ");
        assert_eq!(q.normalized, "how do i add a role?");
        assert_eq!(q.word_count(), 6);
    }

    #[test]
    fn test_source_ref_builder() {
        let s = SourceRef::new("Role basics", "docs/roles").with_score(0.82);
        assert_eq!(s.title, "Role basics");
        assert_eq!(s.score, Some(0.82));
    }

    #[test]
    fn test_response_round_trip() {
        let response = AgentResponse {
            answer: "answer".to_string(),
            sources: vec![SourceRef::new("t", "l")],
            success: true,
            used_fallback: false,
            result_count: 1,
            cached: false,
        };
        let json = serde_json::to_string(&response).unwrap();
        let back: AgentResponse = serde_json::from_str(&json).unwrap();
        assert_eq!(response, back);
    }

    #[test]
    fn test_now_unix_is_positive() {
        assert!(now_unix() > 0);
    }
}
