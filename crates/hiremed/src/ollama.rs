//! Client for the local Ollama generate endpoint.
//!
//! One request shape only: a non-streamed, JSON-formatted completion. The
//! envelope's `response` field is itself a JSON-encoded string; anything
//! that does not parse is treated as a failed request.

use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum OllamaError {
    #[error("ollama request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("ollama returned status {0}")]
    Status(reqwest::StatusCode),
    #[error("ollama payload was not valid JSON")]
    Payload,
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    format: &'a str,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
}

#[derive(Debug, Clone)]
pub struct OllamaClient {
    http: reqwest::Client,
    base_url: String,
}

impl OllamaClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            http,
            base_url: base_url.into(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Request a JSON-formatted completion and parse the payload.
    pub async fn generate_json(
        &self,
        model: &str,
        prompt: &str,
    ) -> Result<serde_json::Value, OllamaError> {
        let url = format!("{}/api/generate", self.base_url.trim_end_matches('/'));
        let response = self
            .http
            .post(url)
            .json(&GenerateRequest {
                model,
                prompt,
                stream: false,
                format: "json",
            })
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(OllamaError::Status(response.status()));
        }

        let envelope: GenerateResponse =
            response.json().await.map_err(|_| OllamaError::Payload)?;
        serde_json::from_str(&envelope.response).map_err(|_| OllamaError::Payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn parses_nested_json_payload() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .and(body_partial_json(serde_json::json!({
                "stream": false,
                "format": "json"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "response": "{\"name\":\"Ada\"}"
            })))
            .mount(&server)
            .await;

        let client = OllamaClient::new(server.uri());
        let value = client.generate_json("llama2", "extract").await.unwrap();
        assert_eq!(value["name"], "Ada");
    }

    #[tokio::test]
    async fn non_success_status_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let client = OllamaClient::new(server.uri());
        let err = client.generate_json("llama2", "extract").await.unwrap_err();
        assert!(matches!(err, OllamaError::Status(_)));
    }

    #[tokio::test]
    async fn unparseable_payload_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "response": "not json at all"
            })))
            .mount(&server)
            .await;

        let client = OllamaClient::new(server.uri());
        let err = client.generate_json("llama2", "extract").await.unwrap_err();
        assert!(matches!(err, OllamaError::Payload));
    }
}
