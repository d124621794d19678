//! Generic web lookup backend
//!
//! The designated fallback tool: queries a DuckDuckGo-style instant-answer
//! endpoint and returns titles, URLs, and snippets. Used whenever a query is
//! out-of-domain or the knowledge base comes back empty-handed.

use super::{Result, ToolError};
use serde_json::json;

/// How many related results to keep per lookup
const MAX_RESULTS: usize = 5;

pub struct WebLookupTool {
    client: reqwest::Client,
    base_url: String,
}

impl WebLookupTool {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }

    /// Run a lookup. Params: `{"query": "..."}`.
    pub async fn invoke(&self, params: &serde_json::Value) -> Result<serde_json::Value> {
        let query = params
            .get("query")
            .and_then(|v| v.as_str())
            .filter(|q| !q.trim().is_empty())
            .ok_or_else(|| ToolError::MissingParameter("query".to_string()))?;

        let response = self
            .client
            .get(&self.base_url)
            .query(&[("q", query), ("format", "json"), ("no_html", "1")])
            .send()
            .await
            .map_err(|e| ToolError::Network(e.to_string()))?;

        if !response.status().is_success() {
            return Err(ToolError::Backend(format!(
                "lookup endpoint returned {}",
                response.status()
            )));
        }

        let data: serde_json::Value = response
            .json()
            .await
            .map_err(|e| ToolError::Backend(format!("undecodable lookup response: {}", e)))?;

        let mut results = Vec::new();

        // The abstract, when present, is the best single answer
        let abstract_text = data
            .get("AbstractText")
            .and_then(|v| v.as_str())
            .unwrap_or_default();
        if !abstract_text.is_empty() {
            results.push(json!({
                "title": data.get("Heading").and_then(|v| v.as_str()).unwrap_or(query),
                "url": data.get("AbstractURL").and_then(|v| v.as_str()).unwrap_or(""),
                "snippet": abstract_text,
            }));
        }

        // Related topics fill out the rest
        if let Some(topics) = data.get("RelatedTopics").and_then(|v| v.as_array()) {
            for topic in topics {
                if results.len() >= MAX_RESULTS {
                    break;
                }
                let text = topic.get("Text").and_then(|v| v.as_str()).unwrap_or_default();
                let url = topic
                    .get("FirstURL")
                    .and_then(|v| v.as_str())
                    .unwrap_or_default();
                if text.is_empty() {
                    continue;
                }
                // Topic text reads "Title - snippet"; keep the lead as title
                let title = text.split(" - ").next().unwrap_or(text);
                results.push(json!({
                    "title": title,
                    "url": url,
                    "snippet": text,
                }));
            }
        }

        Ok(json!({
            "query": query,
            "total_results": results.len(),
            "results": results,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_lookup_collects_abstract_and_topics() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(query_param("q", "what is 2+2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "Heading": "Arithmetic",
                "AbstractText": "2+2 equals 4.",
                "AbstractURL": "https://example.org/arithmetic",
                "RelatedTopics": [
                    {"Text": "Addition - combining numbers", "FirstURL": "https://example.org/addition"},
                    {"Text": "", "FirstURL": "https://example.org/empty"}
                ]
            })))
            .mount(&server)
            .await;

        let tool = WebLookupTool::new(reqwest::Client::new(), server.uri());
        let payload = tool.invoke(&json!({"query": "what is 2+2"})).await.unwrap();

        assert_eq!(payload["total_results"], 2);
        assert_eq!(payload["results"][0]["snippet"], "2+2 equals 4.");
        assert_eq!(payload["results"][1]["title"], "Addition");
    }

    #[tokio::test]
    async fn test_missing_query_param() {
        let server = MockServer::start().await;
        let tool = WebLookupTool::new(reqwest::Client::new(), server.uri());

        let err = tool.invoke(&json!({})).await.unwrap_err();
        assert!(matches!(err, ToolError::MissingParameter(_)));
    }

    #[tokio::test]
    async fn test_empty_answer_is_zero_results() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "AbstractText": "",
                "RelatedTopics": []
            })))
            .mount(&server)
            .await;

        let tool = WebLookupTool::new(reqwest::Client::new(), server.uri());
        let payload = tool.invoke(&json!({"query": "obscure"})).await.unwrap();
        assert_eq!(payload["total_results"], 0);
    }
}
