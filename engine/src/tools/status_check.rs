//! Platform status backend
//!
//! Queries a statuspage-style `summary.json` endpoint and condenses it to
//! overall health, per-component states, and active incidents.

use super::{Result, ToolError};
use serde_json::json;

/// Components listed in the summary payload
const MAX_COMPONENTS: usize = 8;

/// Active incidents listed in the summary payload
const MAX_INCIDENTS: usize = 3;

pub struct StatusCheckTool {
    client: reqwest::Client,
    base_url: String,
}

impl StatusCheckTool {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }

    /// Fetch and summarize the platform status. Takes no parameters.
    pub async fn invoke(&self, _params: &serde_json::Value) -> Result<serde_json::Value> {
        let url = format!("{}/api/v2/summary.json", self.base_url);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| ToolError::Network(e.to_string()))?;

        if !response.status().is_success() {
            return Err(ToolError::Backend(format!(
                "status endpoint returned {}",
                response.status()
            )));
        }

        let data: serde_json::Value = response
            .json()
            .await
            .map_err(|e| ToolError::Backend(format!("undecodable status response: {}", e)))?;

        let overall = data
            .get("status")
            .and_then(|s| s.get("description"))
            .and_then(|v| v.as_str())
            .unwrap_or("unknown")
            .to_string();
        let indicator = data
            .get("status")
            .and_then(|s| s.get("indicator"))
            .and_then(|v| v.as_str())
            .unwrap_or("none")
            .to_string();

        let components: Vec<serde_json::Value> = data
            .get("components")
            .and_then(|v| v.as_array())
            .map(|list| {
                list.iter()
                    .take(MAX_COMPONENTS)
                    .map(|c| {
                        json!({
                            "name": c.get("name").and_then(|v| v.as_str()).unwrap_or("unknown"),
                            "status": c.get("status").and_then(|v| v.as_str()).unwrap_or("unknown"),
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();

        let incidents: Vec<serde_json::Value> = data
            .get("incidents")
            .and_then(|v| v.as_array())
            .map(|list| {
                list.iter()
                    .take(MAX_INCIDENTS)
                    .map(|i| {
                        json!({
                            "name": i.get("name").and_then(|v| v.as_str()).unwrap_or("unknown"),
                            "status": i.get("status").and_then(|v| v.as_str()).unwrap_or("unknown"),
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();

        Ok(json!({
            "overall": overall,
            "indicator": indicator,
            "components": components,
            "active_incidents": incidents,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_summarizes_status_payload() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/v2/summary.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": {"description": "Partial System Outage", "indicator": "major"},
                "components": [
                    {"name": "API", "status": "degraded_performance"},
                    {"name": "Voice", "status": "operational"}
                ],
                "incidents": [
                    {"name": "Elevated API errors", "status": "investigating"}
                ]
            })))
            .mount(&server)
            .await;

        let tool = StatusCheckTool::new(reqwest::Client::new(), server.uri());
        let payload = tool.invoke(&json!({})).await.unwrap();

        assert_eq!(payload["overall"], "Partial System Outage");
        assert_eq!(payload["indicator"], "major");
        assert_eq!(payload["components"][0]["name"], "API");
        assert_eq!(payload["active_incidents"][0]["status"], "investigating");
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_backend_error() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/v2/summary.json"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let tool = StatusCheckTool::new(reqwest::Client::new(), server.uri());
        let err = tool.invoke(&json!({})).await.unwrap_err();
        assert!(matches!(err, ToolError::Backend(_)));
    }
}
