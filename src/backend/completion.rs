//! Backend for llama.cpp-style completion servers.
//!
//! [`CompletionBackend`] speaks the `POST {base}/completion` wire contract
//! used by the council's local model servers. The request payload is built by
//! the stage (see [`prompts`](crate::prompts)); the response text is pulled
//! from `content`, `choices[0].text`, or `text`, whichever is present.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use tracing::debug;

use super::{error_from_response, ModelBackend};
use crate::error::Result;

const HEALTH_TIMEOUT: Duration = Duration::from_secs(5);

/// A llama.cpp-compatible completion server hosting one model.
#[derive(Debug, Clone)]
pub struct CompletionBackend {
    model_name: String,
    base_url: String,
}

impl CompletionBackend {
    pub fn new(model_name: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            model_name: model_name.into(),
            base_url: base_url.into(),
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), path)
    }

    /// Pull the generated text out of a completion response.
    ///
    /// Servers vary: some return `content`, some an OpenAI-style
    /// `choices[0].text`, some a top-level `text`. The stringified body is
    /// the last resort.
    fn extract_text(body: &Value) -> String {
        if let Some(content) = body.get("content").and_then(Value::as_str) {
            return content.to_string();
        }
        if let Some(text) = body
            .get("choices")
            .and_then(Value::as_array)
            .and_then(|choices| choices.first())
            .and_then(|choice| choice.get("text"))
            .and_then(Value::as_str)
        {
            return text.to_string();
        }
        if let Some(text) = body.get("text").and_then(Value::as_str) {
            return text.to_string();
        }
        body.to_string()
    }
}

#[async_trait]
impl ModelBackend for CompletionBackend {
    async fn complete(&self, client: &Client, payload: &Value) -> Result<String> {
        let url = self.endpoint("completion");
        debug!(model = %self.model_name, %url, "calling completion server");

        let resp = client.post(&url).json(payload).send().await?;
        if !resp.status().is_success() {
            return Err(error_from_response(resp).await);
        }

        let body: Value = resp.json().await?;
        Ok(Self::extract_text(&body).trim().to_string())
    }

    async fn health(&self, client: &Client) -> bool {
        let url = self.endpoint("health");
        match client.get(&url).timeout(HEALTH_TIMEOUT).send().await {
            Ok(resp) => resp.status().as_u16() == 200,
            Err(_) => false,
        }
    }

    fn name(&self) -> &str {
        &self.model_name
    }
}
