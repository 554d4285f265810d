//! Backend for the chat-style generation API used by the synthesis stage.
//!
//! [`ChatBackend`] sends a free-form text prompt with a generation config and
//! returns the response's `text` field. Unlike the other backends it owns its
//! generation settings; the chairman stage only supplies the prompt.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use tracing::debug;

use super::{error_from_response, ModelBackend};
use crate::error::{CouncilError, Result};

/// A chat-style generation endpoint (synthesis only).
#[derive(Debug, Clone)]
pub struct ChatBackend {
    model_name: String,
    url: String,
    api_key: String,
    temperature: f64,
    max_output_tokens: u32,
}

impl ChatBackend {
    pub fn new(
        model_name: impl Into<String>,
        api_url: &str,
        model: &str,
        api_key: impl Into<String>,
        temperature: f64,
        max_output_tokens: u32,
    ) -> Self {
        Self {
            model_name: model_name.into(),
            url: format!("{}/{}", api_url.trim_end_matches('/'), model),
            api_key: api_key.into(),
            temperature,
            max_output_tokens,
        }
    }

    fn build_body(&self, prompt: &str) -> Value {
        json!({
            "prompt": prompt,
            "generation_config": {
                "temperature": self.temperature,
                "max_output_tokens": self.max_output_tokens,
                "candidate_count": 1,
            },
        })
    }
}

#[async_trait]
impl ModelBackend for ChatBackend {
    /// The payload is the rendered prompt: either a bare JSON string or an
    /// object with a `prompt` field.
    async fn complete(&self, client: &Client, payload: &Value) -> Result<String> {
        if self.api_key.is_empty() {
            return Err(CouncilError::Other(format!(
                "{} API key not configured",
                self.model_name
            )));
        }

        let prompt = payload
            .as_str()
            .or_else(|| payload.get("prompt").and_then(Value::as_str))
            .unwrap_or_default();

        debug!(model = %self.model_name, url = %self.url, "calling chat API");

        let resp = client
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .json(&self.build_body(prompt))
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(error_from_response(resp).await);
        }

        let body: Value = resp.json().await?;
        let text = body
            .get("text")
            .and_then(Value::as_str)
            .ok_or_else(|| CouncilError::Validation("chat response has no text field".into()))?;
        Ok(text.trim().to_string())
    }

    async fn health(&self, client: &Client) -> bool {
        if self.api_key.is_empty() {
            return false;
        }
        // A minimal probe generation; any non-empty text counts as online.
        match self.complete(client, &Value::String("ping".into())).await {
            Ok(text) => !text.is_empty(),
            Err(_) => false,
        }
    }

    fn name(&self) -> &str {
        &self.model_name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_backend() -> ChatBackend {
        ChatBackend::new(
            "Chairman",
            "https://api.example.com/v1",
            "chat-pro",
            "key",
            0.3,
            4096,
        )
    }

    #[test]
    fn body_carries_generation_config() {
        let backend = test_backend();
        let body = backend.build_body("synthesize this");
        assert_eq!(body["prompt"], "synthesize this");
        assert_eq!(body["generation_config"]["temperature"], 0.3);
        assert_eq!(body["generation_config"]["max_output_tokens"], 4096);
        assert_eq!(body["generation_config"]["candidate_count"], 1);
    }

    #[test]
    fn url_joins_api_and_model() {
        let backend = test_backend();
        assert_eq!(backend.url, "https://api.example.com/v1/chat-pro");
    }

    #[tokio::test]
    async fn missing_key_is_an_error() {
        let backend = ChatBackend::new("Chairman", "https://api.example.com", "m", "", 0.3, 64);
        let client = Client::new();
        let err = backend
            .complete(&client, &Value::String("p".into()))
            .await
            .unwrap_err();
        assert!(matches!(err, CouncilError::Other(_)));
    }

    #[tokio::test]
    async fn missing_key_probe_is_offline() {
        let backend = ChatBackend::new("Chairman", "https://api.example.com", "m", "", 0.3, 64);
        assert!(!backend.health(&Client::new()).await);
    }
}
