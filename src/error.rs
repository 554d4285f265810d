use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

/// Errors produced by the council pipeline and its components.
#[derive(Error, Debug)]
pub enum CouncilError {
    /// A backend call exceeded its deadline.
    #[error("{model} request timed out")]
    Timeout {
        /// Label of the model whose call timed out.
        model: String,
    },

    /// Low-level HTTP transport failure (connection refused, DNS, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// HTTP error with status code, response body, and optional Retry-After hint.
    ///
    /// Returned by [`ModelBackend`](crate::backend::ModelBackend) implementations
    /// when the provider returns a non-success status code. The `retry_after`
    /// field is populated from the `Retry-After` response header when present.
    #[error("HTTP {status}: {body}")]
    Http {
        /// HTTP status code (e.g. 429, 500, 503).
        status: u16,
        /// Response body text.
        body: String,
        /// Parsed `Retry-After` header value, if present.
        retry_after: Option<Duration>,
    },

    /// JSON parsing failed at the serde level.
    #[error("JSON parsing failed: {0}")]
    Json(#[from] serde_json::Error),

    /// No JSON object could be recovered from model output, even after repair.
    #[error("no JSON object found in model output: {text}")]
    Parse {
        /// A truncated copy of the offending text (max 200 chars).
        text: String,
    },

    /// Output was structurally parseable but missing required fields.
    #[error("response validation failed: {0}")]
    Validation(String),

    /// Every invoker of a required stage failed.
    ///
    /// Carries the last underlying failure so the HTTP classifier can map
    /// the composite by its dominant cause.
    #[error("pipeline failed: {message}")]
    Pipeline {
        message: String,
        #[source]
        cause: Option<Box<CouncilError>>,
    },

    /// The query failed input validation.
    #[error("invalid query: {0}")]
    InvalidQuery(String),

    /// Catch-all for other errors.
    #[error("{0}")]
    Other(String),
}

impl From<anyhow::Error> for CouncilError {
    fn from(err: anyhow::Error) -> Self {
        CouncilError::Other(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, CouncilError>;

impl CouncilError {
    /// Convenience constructor for a stage-level composite failure.
    pub fn pipeline(message: impl Into<String>, cause: Option<CouncilError>) -> Self {
        CouncilError::Pipeline {
            message: message.into(),
            cause: cause.map(Box::new),
        }
    }

    /// Short machine-readable name for the error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            CouncilError::Timeout { .. } => "timeout",
            CouncilError::Request(_) => "transport",
            CouncilError::Http { .. } => "status",
            CouncilError::Json(_) | CouncilError::Parse { .. } => "parse",
            CouncilError::Validation(_) => "validation",
            CouncilError::Pipeline { .. } => "pipeline",
            CouncilError::InvalidQuery(_) => "invalid_query",
            CouncilError::Other(_) => "internal",
        }
    }

    /// Map the error kind to an HTTP status code for the hosting layer.
    ///
    /// Timeout maps to 504, transport/status failures to 502, validation to
    /// 422, bad input to 400, anything else to 500. A composite pipeline
    /// failure is classified by its underlying cause when one was recorded.
    pub fn status_code(&self) -> u16 {
        match self {
            CouncilError::Timeout { .. } => 504,
            CouncilError::Request(_) | CouncilError::Http { .. } => 502,
            CouncilError::Json(_) | CouncilError::Parse { .. } => 502,
            CouncilError::Validation(_) => 422,
            CouncilError::InvalidQuery(_) => 400,
            CouncilError::Pipeline { cause, .. } => {
                cause.as_deref().map_or(500, CouncilError::status_code)
            }
            CouncilError::Other(_) => 500,
        }
    }
}

/// Structured error payload handed back to the caller on hard failure.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorReport {
    /// HTTP status code selected by the classifier.
    pub status_code: u16,
    /// Machine-readable error kind.
    pub error: String,
    /// Human-readable message.
    pub message: String,
    /// Request tracking id.
    pub request_id: String,
    /// Seconds spent before the failure surfaced.
    pub processing_time: f64,
}

impl ErrorReport {
    pub fn from_error(err: &CouncilError, request_id: &str, processing_time: f64) -> Self {
        Self {
            status_code: err.status_code(),
            error: err.kind().to_string(),
            message: err.to_string(),
            request_id: request_id.to_string(),
            processing_time,
        }
    }
}
