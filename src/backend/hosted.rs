//! Backend for the hosted inference API.
//!
//! [`HostedBackend`] speaks the `POST {api_url}/{model}` contract with bearer
//! token auth. The payload carries `inputs` and `parameters`; the response is
//! either a list of `{generated_text}` objects or a dict with
//! `generated_text`/`text`. During a health probe a 503 ("model loading") is
//! treated as online.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use tracing::{debug, warn};

use super::{error_from_response, ModelBackend};
use crate::error::Result;

const HEALTH_TIMEOUT: Duration = Duration::from_secs(10);

/// A hosted inference endpoint serving one model.
#[derive(Debug, Clone)]
pub struct HostedBackend {
    model_name: String,
    url: String,
    api_token: String,
}

impl HostedBackend {
    pub fn new(
        model_name: impl Into<String>,
        api_url: &str,
        model: &str,
        api_token: impl Into<String>,
    ) -> Self {
        let api_token = api_token.into();
        if api_token.is_empty() {
            warn!("hosted API token not set");
        }
        Self {
            model_name: model_name.into(),
            url: format!("{}/{}", api_url.trim_end_matches('/'), model),
            api_token,
        }
    }

    /// Pull the generated text out of a hosted inference response.
    fn extract_text(body: &Value) -> String {
        if let Some(first) = body.as_array().and_then(|list| list.first()) {
            return first
                .get("generated_text")
                .and_then(Value::as_str)
                .unwrap_or("")
                .to_string();
        }
        if body.is_object() {
            return body
                .get("generated_text")
                .or_else(|| body.get("text"))
                .and_then(Value::as_str)
                .unwrap_or("")
                .to_string();
        }
        body.to_string()
    }

    /// Some hosted models echo the input prompt ahead of the completion;
    /// strip it so downstream parsers only see generated text.
    fn strip_echoed_prompt<'a>(text: &'a str, payload: &Value) -> &'a str {
        match payload.get("inputs").and_then(Value::as_str) {
            Some(inputs) => text.strip_prefix(inputs).unwrap_or(text),
            None => text,
        }
    }
}

#[async_trait]
impl ModelBackend for HostedBackend {
    async fn complete(&self, client: &Client, payload: &Value) -> Result<String> {
        debug!(model = %self.model_name, url = %self.url, "calling hosted inference API");

        let resp = client
            .post(&self.url)
            .bearer_auth(&self.api_token)
            .json(payload)
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(error_from_response(resp).await);
        }

        let body: Value = resp.json().await?;
        let text = Self::extract_text(&body);
        Ok(Self::strip_echoed_prompt(&text, payload).trim().to_string())
    }

    async fn health(&self, client: &Client) -> bool {
        match client
            .get(&self.url)
            .bearer_auth(&self.api_token)
            .timeout(HEALTH_TIMEOUT)
            .send()
            .await
        {
            // 503 means the model is still loading, which counts as alive.
            Ok(resp) => matches!(resp.status().as_u16(), 200 | 503),
            Err(_) => false,
        }
    }

    fn name(&self) -> &str {
        &self.model_name
    }
}
