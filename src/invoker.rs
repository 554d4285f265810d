//! Labelled invoker wrapping a backend with deadline and retry policy.
//!
//! An [`Invoker`] is the unit a stage fans out over: one backend, one label,
//! one retry policy. The effective deadline of each call is the minimum of
//! the request deadline and the invoker's own per-call timeout; expiry
//! surfaces as [`CouncilError::Timeout`] and cancels the in-flight call.

use std::sync::Arc;
use std::time::{Duration, Instant};

use reqwest::Client;
use serde_json::Value;
use tracing::debug;

use crate::backend::{with_backoff, BackoffConfig, ModelBackend};
use crate::error::{CouncilError, Result};

/// A typed client over one backend producing raw text given a prompt payload.
pub struct Invoker {
    label: String,
    backend: Arc<dyn ModelBackend>,
    backoff: BackoffConfig,
    call_timeout: Option<Duration>,
}

impl Invoker {
    pub fn new(label: impl Into<String>, backend: Arc<dyn ModelBackend>) -> Self {
        Self {
            label: label.into(),
            backend,
            backoff: BackoffConfig::none(),
            call_timeout: None,
        }
    }

    /// Set the transport retry policy.
    pub fn with_backoff(mut self, backoff: BackoffConfig) -> Self {
        self.backoff = backoff;
        self
    }

    /// Cap each call at this duration, independent of the request deadline.
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = Some(timeout);
        self
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn backend(&self) -> &Arc<dyn ModelBackend> {
        &self.backend
    }

    /// Execute one call against the backend, bounded by the request deadline.
    pub async fn invoke(&self, client: &Client, payload: &Value, deadline: Instant) -> Result<String> {
        let mut remaining = deadline.saturating_duration_since(Instant::now());
        if let Some(per_call) = self.call_timeout {
            remaining = remaining.min(per_call);
        }
        if remaining.is_zero() {
            return Err(CouncilError::Timeout {
                model: self.label.clone(),
            });
        }

        let started = Instant::now();
        let outcome = tokio::time::timeout(
            remaining,
            with_backoff(&self.backend, client, payload, &self.backoff),
        )
        .await;

        match outcome {
            Ok(result) => {
                debug!(
                    model = %self.label,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    ok = result.is_ok(),
                    "model call finished"
                );
                result
            }
            Err(_) => Err(CouncilError::Timeout {
                model: self.label.clone(),
            }),
        }
    }
}

impl std::fmt::Debug for Invoker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Invoker")
            .field("label", &self.label)
            .field("backend", &self.backend.name())
            .field("max_retries", &self.backoff.max_retries)
            .field("call_timeout", &self.call_timeout)
            .finish()
    }
}
