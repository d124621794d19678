use super::{Provider, ProviderError, Result};
use crate::config::ProviderConfig;
use async_trait::async_trait;
use serde_json::json;

pub struct GeminiProvider {
    config: ProviderConfig,
    api_key: String,
    client: reqwest::Client,
}

impl GeminiProvider {
    pub fn new(config: ProviderConfig, api_key: impl Into<String>, client: reqwest::Client) -> Self {
        Self {
            config,
            api_key: api_key.into(),
            client,
        }
    }

    fn map_status(status: reqwest::StatusCode, text: String) -> ProviderError {
        match status.as_u16() {
            400 | 404 => ProviderError::InvalidRequest(text),
            401 | 403 => ProviderError::AuthenticationFailed(text),
            429 => ProviderError::RateLimitExceeded,
            _ => ProviderError::Unavailable(format!("Gemini API error ({}): {}", status, text)),
        }
    }
}

#[async_trait]
impl Provider for GeminiProvider {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let url = format!(
            "{}/models/{}:embedContent?key={}",
            self.config.base_url, self.config.embed_model, self.api_key
        );

        let payload = json!({
            "model": format!("models/{}", self.config.embed_model),
            "content": { "parts": [{ "text": text }] },
        });

        let response = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .json(&payload)
            .send()
            .await
            .map_err(|e| ProviderError::NetworkError(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(Self::map_status(status, text));
        }

        let data: serde_json::Value = response
            .json()
            .await
            .map_err(|e| ProviderError::ParseError(e.to_string()))?;

        let values = data
            .get("embedding")
            .and_then(|e| e.get("values"))
            .and_then(|v| v.as_array())
            .ok_or_else(|| ProviderError::ParseError("No embedding values in response".to_string()))?;

        Ok(values
            .iter()
            .filter_map(|v| v.as_f64())
            .map(|v| v as f32)
            .collect())
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        let url = format!(
            "{}/models/{}:generateContent?key={}",
            self.config.base_url, self.config.model, self.api_key
        );

        let payload = json!({
            "contents": [{
                "role": "user",
                "parts": [{ "text": prompt }],
            }],
        });

        let response = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .json(&payload)
            .send()
            .await
            .map_err(|e| ProviderError::NetworkError(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(Self::map_status(status, text));
        }

        let data: serde_json::Value = response
            .json()
            .await
            .map_err(|e| ProviderError::ParseError(e.to_string()))?;

        let candidate = data
            .get("candidates")
            .and_then(|c| c.as_array())
            .and_then(|c| c.first())
            .ok_or_else(|| ProviderError::ParseError("No candidates in response".to_string()))?;

        let parts = candidate
            .get("content")
            .and_then(|c| c.get("parts"))
            .and_then(|p| p.as_array())
            .ok_or_else(|| ProviderError::ParseError("No parts in candidate content".to_string()))?;

        let mut full_text = String::new();
        for part in parts {
            if let Some(text) = part.get("text").and_then(|t| t.as_str()) {
                full_text.push_str(text);
            }
        }

        if full_text.is_empty() {
            return Err(ProviderError::ParseError(
                "Empty text in candidate response".to_string(),
            ));
        }

        Ok(full_text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn provider_for(server: &MockServer) -> GeminiProvider {
        let config = ProviderConfig {
            base_url: server.uri(),
            model: "gemini-2.0-flash".to_string(),
            embed_model: "text-embedding-004".to_string(),
            api_key_env: "GEMINI_API_KEY".to_string(),
            timeout_secs: 30,
        };
        GeminiProvider::new(config, "test-key", reqwest::Client::new())
    }

    #[tokio::test]
    async fn test_generate_concatenates_parts() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/models/gemini-2.0-flash:generateContent"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "candidates": [{
                    "content": { "parts": [{"text": "Roles control "}, {"text": "access."}] }
                }]
            })))
            .mount(&server)
            .await;

        let provider = provider_for(&server);
        let answer = provider.generate("explain roles").await.unwrap();
        assert_eq!(answer, "Roles control access.");
    }

    #[tokio::test]
    async fn test_embed_parses_values() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/models/text-embedding-004:embedContent"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "embedding": { "values": [0.1, 0.2, 0.3] }
            })))
            .mount(&server)
            .await;

        let provider = provider_for(&server);
        let vector = provider.embed("roles").await.unwrap();
        assert_eq!(vector.len(), 3);
        assert!((vector[1] - 0.2).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_rate_limit_maps_to_typed_error() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/models/gemini-2.0-flash:generateContent"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;

        let provider = provider_for(&server);
        let err = provider.generate("anything").await.unwrap_err();
        assert!(matches!(err, ProviderError::RateLimitExceeded));
    }

    #[tokio::test]
    async fn test_auth_failure_maps_to_typed_error() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/models/gemini-2.0-flash:generateContent"))
            .respond_with(ResponseTemplate::new(403).set_body_string("forbidden"))
            .mount(&server)
            .await;

        let provider = provider_for(&server);
        let err = provider.generate("anything").await.unwrap_err();
        assert!(matches!(err, ProviderError::AuthenticationFailed(_)));
    }
}
