//! Webhook probe backend
//!
//! Validates the shape of a webhook URL and optionally delivers a test
//! payload, reporting reachability and response time.

use super::{Result, ToolError};
use regex::Regex;
use serde_json::json;
use std::time::Instant;

/// Body posted when a live delivery test is requested
const TEST_MESSAGE: &str = "Test message from the support agent";

pub struct WebhookProbeTool {
    client: reqwest::Client,
    url_pattern: Regex,
}

impl WebhookProbeTool {
    pub fn new(client: reqwest::Client) -> anyhow::Result<Self> {
        // Platform webhook URLs carry a numeric id and an opaque token
        let url_pattern =
            Regex::new(r"^https?://[\w.-]+(:\d+)?/api/webhooks/\d+/[A-Za-z0-9_-]+$")?;
        Ok(Self {
            client,
            url_pattern,
        })
    }

    /// Probe a webhook. Params: `{"webhook_url": "...", "deliver": bool}`.
    /// With `deliver` absent or false only the URL shape is checked.
    pub async fn invoke(&self, params: &serde_json::Value) -> Result<serde_json::Value> {
        let url = params
            .get("webhook_url")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ToolError::MissingParameter("webhook_url".to_string()))?;
        let deliver = params
            .get("deliver")
            .and_then(|v| v.as_bool())
            .unwrap_or(false);

        let shape_valid = self.url_pattern.is_match(url);
        if !deliver || !shape_valid {
            return Ok(json!({
                "webhook_url": url,
                "valid": shape_valid,
                "delivered": false,
            }));
        }

        let started = Instant::now();
        let response = self
            .client
            .post(url)
            .json(&json!({ "content": TEST_MESSAGE }))
            .send()
            .await
            .map_err(|e| ToolError::Network(e.to_string()))?;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        Ok(json!({
            "webhook_url": url,
            "valid": true,
            "delivered": response.status().is_success(),
            "status_code": response.status().as_u16(),
            "response_ms": elapsed_ms,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn tool() -> WebhookProbeTool {
        WebhookProbeTool::new(reqwest::Client::new()).unwrap()
    }

    #[tokio::test]
    async fn test_shape_validation_without_delivery() {
        let payload = tool()
            .invoke(&json!({
                "webhook_url": "https://platform.example.com/api/webhooks/123456/abc_DEF-789"
            }))
            .await
            .unwrap();

        assert_eq!(payload["valid"], true);
        assert_eq!(payload["delivered"], false);
    }

    #[tokio::test]
    async fn test_malformed_url_is_invalid() {
        let payload = tool()
            .invoke(&json!({"webhook_url": "https://example.com/not-a-webhook"}))
            .await
            .unwrap();

        assert_eq!(payload["valid"], false);
        assert_eq!(payload["delivered"], false);
    }

    #[tokio::test]
    async fn test_missing_url_param() {
        let err = tool().invoke(&json!({"deliver": true})).await.unwrap_err();
        assert!(matches!(err, ToolError::MissingParameter(_)));
    }

    #[tokio::test]
    async fn test_delivery_reports_status_and_latency() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/api/webhooks/42/test-token"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;

        let url = format!("{}/api/webhooks/42/test-token", server.uri());
        let payload = tool()
            .invoke(&json!({"webhook_url": url, "deliver": true}))
            .await
            .unwrap();

        assert_eq!(payload["valid"], true);
        assert_eq!(payload["delivered"], true);
        assert_eq!(payload["status_code"], 204);
        assert!(payload["response_ms"].is_u64());
    }
}
