//! Backend trait and transport-level plumbing.
//!
//! [`ModelBackend`] abstracts over the council's heterogeneous inference
//! providers, translating a stage-built prompt payload into a provider HTTP
//! request and returning the raw generated text. Built-in implementations:
//! [`CompletionBackend`] (llama.cpp-style completion servers),
//! [`HostedBackend`] (hosted inference API), [`ChatBackend`] (chat-style
//! synthesis API), and [`MockBackend`] for tests.

pub mod backoff;
pub mod chat;
pub mod completion;
pub mod hosted;
pub mod mock;

pub use backoff::BackoffConfig;
pub use chat::ChatBackend;
pub use completion::CompletionBackend;
pub use hosted::HostedBackend;
pub use mock::{MockBackend, MockOutcome};

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use tracing::warn;

use crate::error::{CouncilError, Result};

/// Abstraction over the council's inference providers.
///
/// Implementors translate a stage-built prompt payload into the provider's
/// HTTP API and return the raw generated text, trimmed. Deadlines are
/// enforced by the calling [`Invoker`](crate::invoker::Invoker), not here.
///
/// # Object Safety
///
/// This trait is object-safe and designed to be used as `Arc<dyn ModelBackend>`.
#[async_trait]
pub trait ModelBackend: Send + Sync {
    /// Execute one inference call and return the generated text.
    async fn complete(&self, client: &Client, payload: &Value) -> Result<String>;

    /// Probe the provider for liveness.
    async fn health(&self, client: &Client) -> bool;

    /// Human-readable name for logging and diagnostics.
    fn name(&self) -> &str;
}

/// Check whether an error is retryable at the transport level.
///
/// Retryable conditions:
/// - [`CouncilError::Http`] with a status in `config.retryable_statuses`
/// - [`CouncilError::Request`] (connection/transport errors)
pub fn is_retryable(error: &CouncilError, config: &BackoffConfig) -> bool {
    match error {
        CouncilError::Http { status, .. } => config.retryable_statuses.contains(status),
        CouncilError::Request(_) => true,
        _ => false,
    }
}

/// Execute a backend call with transport-level retry and exponential backoff.
///
/// Retries transient failures (429, 5xx, connection errors) according to the
/// [`BackoffConfig`]; parse and validation failures are never retried here
/// because the backend only ever surfaces transport outcomes. Returns the
/// first successful response, or the last error once retries are exhausted.
pub async fn with_backoff(
    backend: &Arc<dyn ModelBackend>,
    client: &Client,
    payload: &Value,
    config: &BackoffConfig,
) -> Result<String> {
    let mut last_error: Option<CouncilError> = None;

    for attempt in 0..=config.max_retries {
        if attempt > 0 {
            let delay = match &last_error {
                Some(CouncilError::Http {
                    retry_after: Some(ra),
                    ..
                }) if config.respect_retry_after => *ra,
                _ => config.delay_for_attempt(attempt - 1),
            };
            warn!(
                backend = backend.name(),
                attempt,
                delay_ms = delay.as_millis() as u64,
                "retrying after transport failure"
            );
            tokio::time::sleep(delay).await;
        }

        match backend.complete(client, payload).await {
            Ok(text) => return Ok(text),
            Err(e) => {
                if attempt < config.max_retries && is_retryable(&e, config) {
                    last_error = Some(e);
                    continue;
                }
                return Err(e);
            }
        }
    }

    Err(last_error
        .unwrap_or_else(|| CouncilError::Other("backoff loop exited unexpectedly".into())))
}

/// Turn a non-success response into an [`CouncilError::Http`], capturing any
/// `Retry-After` hint before the body is consumed.
pub(crate) async fn error_from_response(resp: reqwest::Response) -> CouncilError {
    let status = resp.status().as_u16();
    let retry_after = resp
        .headers()
        .get("retry-after")
        .and_then(|v| v.to_str().ok())
        .and_then(parse_retry_after);
    let body = resp.text().await.unwrap_or_default();
    CouncilError::Http {
        status,
        body,
        retry_after,
    }
}

/// Parse a Retry-After header value as integer seconds.
fn parse_retry_after(value: &str) -> Option<Duration> {
    value.trim().parse::<u64>().map(Duration::from_secs).ok()
}
