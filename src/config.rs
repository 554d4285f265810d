//! Static configuration for the council pipeline.
//!
//! [`CouncilConfig`] is a plain value the hosting layer fills in however it
//! likes (environment, files, flags); this crate only consumes it.

use std::time::Duration;

use crate::backend::BackoffConfig;

/// Configuration for backends, stage dispatch, timeouts, retry, and caching.
#[derive(Debug, Clone)]
pub struct CouncilConfig {
    // Completion-server endpoints, one per local model role.
    pub stage1_local_url: String,
    pub paraphrase_url: String,
    pub reviewer_a_url: String,
    pub reviewer_b_url: String,

    // Hosted inference API (Stage-1 remote opinion).
    pub hosted_api_url: String,
    pub hosted_model: String,
    pub hosted_api_token: String,

    // Chat-style API (synthesis only).
    pub chat_api_url: String,
    pub chat_model: String,
    pub chat_api_key: String,
    pub chat_temperature: f64,
    pub chat_max_tokens: u32,

    // Per-stage generation settings.
    pub stage1_temperature: f64,
    pub stage1_max_tokens: u32,
    pub paraphrase_temperature: f64,
    pub paraphrase_max_tokens: u32,
    pub reviewer_temperature: f64,
    pub reviewer_max_tokens: u32,

    // Stage enable flags.
    pub enable_stage1_local: bool,
    pub enable_stage1_hosted: bool,
    pub enable_reviewer_a: bool,
    pub enable_reviewer_b: bool,
    pub enable_chairman: bool,

    // Parallelism flags; each stage also honors the per-request option.
    pub parallel_stage1: bool,
    pub parallel_reviewers: bool,

    // Timeouts.
    pub request_timeout: Duration,
    pub local_model_timeout: Duration,

    // Transport retry; never applied to parse or validation failures.
    pub max_retries: u32,
    pub retry_delay: Duration,

    // Response cache.
    pub enable_cache: bool,
    pub cache_ttl: Duration,
    pub cache_dir: String,
}

impl Default for CouncilConfig {
    fn default() -> Self {
        Self {
            stage1_local_url: "http://localhost:8001".into(),
            paraphrase_url: "http://localhost:8002".into(),
            reviewer_a_url: "http://localhost:8003".into(),
            reviewer_b_url: "http://localhost:8004".into(),

            hosted_api_url: "https://api-inference.huggingface.co/models".into(),
            hosted_model: String::new(),
            hosted_api_token: String::new(),

            chat_api_url: String::new(),
            chat_model: String::new(),
            chat_api_key: String::new(),
            chat_temperature: 0.3,
            chat_max_tokens: 4096,

            stage1_temperature: 0.7,
            stage1_max_tokens: 1024,
            paraphrase_temperature: 0.5,
            paraphrase_max_tokens: 512,
            reviewer_temperature: 0.3,
            reviewer_max_tokens: 1024,

            enable_stage1_local: true,
            enable_stage1_hosted: true,
            enable_reviewer_a: true,
            enable_reviewer_b: true,
            enable_chairman: true,

            parallel_stage1: true,
            parallel_reviewers: true,

            request_timeout: Duration::from_secs(120),
            local_model_timeout: Duration::from_secs(120),

            max_retries: 3,
            retry_delay: Duration::from_secs(2),

            enable_cache: true,
            cache_ttl: Duration::from_secs(3600),
            cache_dir: "./cache".into(),
        }
    }
}

impl CouncilConfig {
    pub fn with_cache_dir(mut self, dir: impl Into<String>) -> Self {
        self.cache_dir = dir.into();
        self
    }

    pub fn with_cache(mut self, enabled: bool) -> Self {
        self.enable_cache = enabled;
        self
    }

    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    /// Transport-level retry settings as a backoff configuration.
    pub fn transport_backoff(&self) -> BackoffConfig {
        BackoffConfig::from_retry_settings(self.max_retries, self.retry_delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let cfg = CouncilConfig::default();
        assert_eq!(cfg.stage1_local_url, "http://localhost:8001");
        assert_eq!(cfg.stage1_max_tokens, 1024);
        assert_eq!(cfg.reviewer_temperature, 0.3);
        assert_eq!(cfg.request_timeout, Duration::from_secs(120));
        assert_eq!(cfg.cache_ttl, Duration::from_secs(3600));
        assert!(cfg.enable_cache);
        assert!(cfg.parallel_stage1);
    }

    #[test]
    fn builder_setters() {
        let cfg = CouncilConfig::default()
            .with_cache(false)
            .with_cache_dir("/tmp/council")
            .with_max_retries(0);
        assert!(!cfg.enable_cache);
        assert_eq!(cfg.cache_dir, "/tmp/council");
        assert_eq!(cfg.max_retries, 0);
    }

    #[test]
    fn transport_backoff_reflects_retry_settings() {
        let cfg = CouncilConfig::default().with_max_retries(2);
        let backoff = cfg.transport_backoff();
        assert_eq!(backoff.max_retries, 2);
        assert_eq!(backoff.initial_delay, Duration::from_secs(2));
    }
}
