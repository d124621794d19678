//! Chroma REST adapter
//!
//! Implements [`VectorStore`] against a Chroma-style collection API:
//! `POST /api/v1/collections/{collection}/query` returns parallel
//! `documents` / `metadatas` / `distances` arrays ascending by distance.

use super::{
    DocumentMetadata, NewDocument, Result, RetrievedDocument, SourceType, VectorError, VectorStore,
};
use crate::types::now_unix;
use async_trait::async_trait;
use serde_json::json;

const SECONDS_PER_DAY: i64 = 24 * 60 * 60;

pub struct ChromaStore {
    client: reqwest::Client,
    base_url: String,
    collection: String,
}

impl ChromaStore {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>, collection: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            collection: collection.into(),
        }
    }

    fn collection_url(&self, suffix: &str) -> String {
        format!(
            "{}/api/v1/collections/{}/{}",
            self.base_url, self.collection, suffix
        )
    }

    /// Build chunk metadata from the arbitrary key/value map Chroma stores.
    fn parse_metadata(value: &serde_json::Value) -> DocumentMetadata {
        let title = value
            .get("title")
            .and_then(|v| v.as_str())
            .unwrap_or("Untitled")
            .to_string();
        let locator = value
            .get("locator")
            .or_else(|| value.get("url"))
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .to_string();
        let source_type = value
            .get("source_type")
            .and_then(|v| v.as_str())
            .map(SourceType::parse)
            .unwrap_or(SourceType::Unknown);
        let age_days = value
            .get("published_at")
            .and_then(|v| v.as_i64())
            .map(|published| (now_unix() - published).max(0) / SECONDS_PER_DAY);
        let step_by_step = value
            .get("step_by_step")
            .and_then(|v| v.as_bool())
            .unwrap_or(false);

        DocumentMetadata {
            title,
            locator,
            source_type,
            age_days,
            step_by_step,
        }
    }
}

#[async_trait]
impl VectorStore for ChromaStore {
    async fn search(&self, query_vector: &[f32], k: usize) -> Result<Vec<RetrievedDocument>> {
        let payload = json!({
            "query_embeddings": [query_vector],
            "n_results": k,
            "include": ["documents", "metadatas", "distances"],
        });

        let response = self
            .client
            .post(self.collection_url("query"))
            .json(&payload)
            .send()
            .await
            .map_err(|e| VectorError::Network(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(VectorError::Unavailable(format!(
                "query returned {}: {}",
                status, text
            )));
        }

        let data: serde_json::Value = response
            .json()
            .await
            .map_err(|e| VectorError::Parse(e.to_string()))?;

        // Chroma nests one result set per query embedding; we always send one.
        let documents = data
            .get("documents")
            .and_then(|v| v.as_array())
            .and_then(|v| v.first())
            .and_then(|v| v.as_array())
            .ok_or_else(|| VectorError::Parse("missing documents array".to_string()))?;
        let metadatas = data
            .get("metadatas")
            .and_then(|v| v.as_array())
            .and_then(|v| v.first())
            .and_then(|v| v.as_array())
            .ok_or_else(|| VectorError::Parse("missing metadatas array".to_string()))?;
        let distances = data
            .get("distances")
            .and_then(|v| v.as_array())
            .and_then(|v| v.first())
            .and_then(|v| v.as_array())
            .ok_or_else(|| VectorError::Parse("missing distances array".to_string()))?;

        let mut results = Vec::with_capacity(documents.len());
        for (i, doc) in documents.iter().enumerate() {
            let content = doc.as_str().unwrap_or_default().to_string();
            let metadata = metadatas
                .get(i)
                .map(Self::parse_metadata)
                .unwrap_or_else(|| DocumentMetadata::bare("Untitled", ""));
            let distance = distances.get(i).and_then(|v| v.as_f64()).unwrap_or(1.0);

            results.push(RetrievedDocument {
                content,
                metadata,
                distance,
            });
        }

        Ok(results)
    }

    async fn add(&self, documents: &[NewDocument]) -> Result<()> {
        let ids: Vec<&str> = documents.iter().map(|d| d.id.as_str()).collect();
        let contents: Vec<&str> = documents.iter().map(|d| d.content.as_str()).collect();
        let metadatas: Vec<&serde_json::Value> = documents.iter().map(|d| &d.metadata).collect();

        let payload = json!({
            "ids": ids,
            "documents": contents,
            "metadatas": metadatas,
        });

        let response = self
            .client
            .post(self.collection_url("add"))
            .json(&payload)
            .send()
            .await
            .map_err(|e| VectorError::Network(e.to_string()))?;

        if !response.status().is_success() {
            return Err(VectorError::Unavailable(format!(
                "add returned {}",
                response.status()
            )));
        }

        Ok(())
    }

    async fn count(&self) -> Result<u64> {
        let response = self
            .client
            .get(self.collection_url("count"))
            .send()
            .await
            .map_err(|e| VectorError::Network(e.to_string()))?;

        if !response.status().is_success() {
            return Err(VectorError::Unavailable(format!(
                "count returned {}",
                response.status()
            )));
        }

        let count: u64 = response
            .json()
            .await
            .map_err(|e| VectorError::Parse(e.to_string()))?;

        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_search_parses_parallel_arrays() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/api/v1/collections/community_docs/query"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "documents": [["How to create a role", "Webhook setup guide"]],
                "metadatas": [[
                    {"title": "Roles", "url": "docs/roles", "source_type": "official", "step_by_step": true},
                    {"title": "Webhooks", "url": "docs/webhooks", "source_type": "community"}
                ]],
                "distances": [[0.12, 0.34]],
            })))
            .mount(&server)
            .await;

        let store = ChromaStore::new(reqwest::Client::new(), server.uri(), "community_docs");
        let results = store.search(&[0.1, 0.2], 5).await.unwrap();

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].metadata.title, "Roles");
        assert_eq!(results[0].metadata.source_type, SourceType::Official);
        assert!(results[0].metadata.step_by_step);
        assert_eq!(results[0].distance, 0.12);
        assert_eq!(results[1].metadata.source_type, SourceType::Community);
        assert!(!results[1].metadata.step_by_step);
    }

    #[tokio::test]
    async fn test_search_maps_server_error() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/api/v1/collections/community_docs/query"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let store = ChromaStore::new(reqwest::Client::new(), server.uri(), "community_docs");
        let err = store.search(&[0.1], 5).await.unwrap_err();
        assert!(matches!(err, VectorError::Unavailable(_)));
    }

    #[tokio::test]
    async fn test_count() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/v1/collections/community_docs/count"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!(42)))
            .mount(&server)
            .await;

        let store = ChromaStore::new(reqwest::Client::new(), server.uri(), "community_docs");
        assert_eq!(store.count().await.unwrap(), 42);
    }

    #[test]
    fn test_parse_metadata_age() {
        let meta = ChromaStore::parse_metadata(&json!({
            "title": "Fresh guide",
            "url": "docs/fresh",
            "published_at": now_unix() - 5 * SECONDS_PER_DAY,
        }));
        assert_eq!(meta.age_days, Some(5));
    }
}
