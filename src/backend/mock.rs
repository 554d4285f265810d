//! Recording mock backend for testing without live model servers.
//!
//! [`MockBackend`] returns scripted outcomes in order and counts every call,
//! so tests can assert both pipeline behavior and that a stage made (or did
//! not make) backend calls — e.g. that a cache hit performs none.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;

use super::ModelBackend;
use crate::error::{CouncilError, Result};

/// One scripted call outcome.
#[derive(Debug, Clone)]
pub enum MockOutcome {
    /// Return this text with a 200.
    Text(String),
    /// Fail with an HTTP error of this status.
    Status(u16),
    /// Fail as a deadline expiry.
    Timeout,
}

/// A test backend that replays scripted outcomes in order.
///
/// Cycles back to the beginning when all outcomes have been consumed.
#[derive(Debug)]
pub struct MockBackend {
    name: String,
    outcomes: Vec<MockOutcome>,
    index: AtomicUsize,
    calls: AtomicUsize,
    healthy: bool,
    payloads: Mutex<Vec<Value>>,
}

impl MockBackend {
    pub fn scripted(name: impl Into<String>, outcomes: Vec<MockOutcome>) -> Self {
        assert!(
            !outcomes.is_empty(),
            "MockBackend requires at least one outcome"
        );
        Self {
            name: name.into(),
            outcomes,
            index: AtomicUsize::new(0),
            calls: AtomicUsize::new(0),
            healthy: true,
            payloads: Mutex::new(Vec::new()),
        }
    }

    /// A mock that always returns the same text.
    pub fn fixed(name: impl Into<String>, response: impl Into<String>) -> Self {
        Self::scripted(name, vec![MockOutcome::Text(response.into())])
    }

    /// A mock that returns the given responses in order, then cycles.
    pub fn replies(name: impl Into<String>, responses: Vec<String>) -> Self {
        Self::scripted(name, responses.into_iter().map(MockOutcome::Text).collect())
    }

    /// A mock whose every call fails with the given HTTP status.
    pub fn failing(name: impl Into<String>, status: u16) -> Self {
        Self::scripted(name, vec![MockOutcome::Status(status)])
    }

    /// Mark the backend as unhealthy for probe tests.
    pub fn unhealthy(mut self) -> Self {
        self.healthy = false;
        self
    }

    /// Number of `complete` calls made so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }

    /// Payloads received so far, in call order.
    pub fn recorded_payloads(&self) -> Vec<Value> {
        self.payloads
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn next_outcome(&self) -> MockOutcome {
        let idx = self.index.fetch_add(1, Ordering::Relaxed) % self.outcomes.len();
        self.outcomes[idx].clone()
    }
}

#[async_trait]
impl ModelBackend for MockBackend {
    async fn complete(&self, _client: &Client, payload: &Value) -> Result<String> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        self.payloads
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(payload.clone());

        match self.next_outcome() {
            MockOutcome::Text(text) => Ok(text),
            MockOutcome::Status(status) => Err(CouncilError::Http {
                status,
                body: format!("mock failure {}", status),
                retry_after: None,
            }),
            MockOutcome::Timeout => Err(CouncilError::Timeout {
                model: self.name.clone(),
            }),
        }
    }

    async fn health(&self, _client: &Client) -> bool {
        self.healthy
    }

    fn name(&self) -> &str {
        &self.name
    }
}
