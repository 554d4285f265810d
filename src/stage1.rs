//! Stage-1: independent first opinions.
//!
//! Fans the query out to every enabled opinion model. Parse failures never
//! fail the stage — the raw response becomes the answer with
//! `meta.parse_error` set. Model failures are dropped under
//! `skip_failed_models`; the stage only fails when every model does.

use std::sync::Arc;
use std::time::Instant;

use futures::future::join_all;
use reqwest::Client;
use serde_json::Value;
use tracing::warn;

use crate::config::CouncilConfig;
use crate::error::{CouncilError, Result};
use crate::invoker::Invoker;
use crate::prompts;
use crate::recover::{recover_json, truncate_chars};
use crate::types::{Citation, OpinionMeta, QueryOptions, Stage1Opinion};

/// Maximum length of the raw-text answer kept on a parse failure.
const RAW_ANSWER_LIMIT: usize = 500;

/// Which prompt payload a Stage-1 model consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpinionPayload {
    /// llama.cpp-style completion payload.
    Completion,
    /// Hosted inference API payload.
    Hosted,
}

/// One enabled Stage-1 model: its invoker plus the payload shape it speaks.
pub struct Stage1Member {
    pub invoker: Invoker,
    pub payload: OpinionPayload,
}

impl Stage1Member {
    pub fn new(invoker: Invoker, payload: OpinionPayload) -> Self {
        Self { invoker, payload }
    }

    fn build_payload(&self, query: &str, config: &CouncilConfig) -> Value {
        match self.payload {
            OpinionPayload::Completion => prompts::stage1_completion_payload(query, config),
            OpinionPayload::Hosted => prompts::stage1_hosted_payload(query, config),
        }
    }
}

/// The Stage-1 fan-out service.
pub struct Stage1Service {
    members: Vec<Stage1Member>,
    config: Arc<CouncilConfig>,
}

impl Stage1Service {
    pub fn new(members: Vec<Stage1Member>, config: Arc<CouncilConfig>) -> Self {
        Self { members, config }
    }

    /// Collect one opinion per enabled model.
    pub async fn first_opinions(
        &self,
        client: &Client,
        query: &str,
        options: &QueryOptions,
        deadline: Instant,
    ) -> Result<Vec<Stage1Opinion>> {
        if self.members.is_empty() {
            return Err(CouncilError::pipeline("no Stage-1 models are enabled", None));
        }

        let parallel = options.enable_parallel && self.config.parallel_stage1;
        let results = if parallel {
            let futures = self
                .members
                .iter()
                .map(|member| self.call_member(client, member, query, deadline));
            join_all(futures).await
        } else {
            let mut results = Vec::with_capacity(self.members.len());
            for member in &self.members {
                results.push(self.call_member(client, member, query, deadline).await);
            }
            results
        };

        let mut opinions = Vec::new();
        let mut last_error = None;
        for result in results {
            match result {
                Ok(opinion) => opinions.push(opinion),
                Err(err) => {
                    warn!(error = %err, "Stage-1 model failed");
                    if !options.skip_failed_models {
                        return Err(err);
                    }
                    last_error = Some(err);
                }
            }
        }

        if opinions.is_empty() {
            return Err(CouncilError::pipeline("All Stage-1 models failed", last_error));
        }

        Ok(opinions)
    }

    async fn call_member(
        &self,
        client: &Client,
        member: &Stage1Member,
        query: &str,
        deadline: Instant,
    ) -> Result<Stage1Opinion> {
        let payload = member.build_payload(query, &self.config);
        let response = member.invoker.invoke(client, &payload, deadline).await?;
        Ok(parse_opinion(member.invoker.label(), &response))
    }
}

/// Parse a Stage-1 response into an opinion.
///
/// Never fails: on recovery failure the raw response (truncated) becomes the
/// answer, claim and citation lists stay empty, and `parse_error` is set.
pub fn parse_opinion(model_name: &str, response: &str) -> Stage1Opinion {
    match recover_json(response) {
        Ok(parsed) => Stage1Opinion {
            model_name: model_name.to_string(),
            answer_text: parsed
                .get("answer_text")
                .and_then(Value::as_str)
                .unwrap_or("")
                .to_string(),
            claims: string_list(parsed.get("claims")),
            citations: citation_list(parsed.get("citations")),
            meta: OpinionMeta::default(),
        },
        Err(err) => {
            warn!(model = model_name, error = %err, "failed to parse Stage-1 response");
            Stage1Opinion {
                model_name: model_name.to_string(),
                answer_text: truncate_chars(response.trim(), RAW_ANSWER_LIMIT),
                claims: Vec::new(),
                citations: Vec::new(),
                meta: OpinionMeta { parse_error: true },
            }
        }
    }
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn citation_list(value: Option<&Value>) -> Vec<Citation> {
    value
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| serde_json::from_value(item.clone()).ok())
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MockBackend;
    use std::time::Duration;

    fn service(members: Vec<Stage1Member>) -> Stage1Service {
        Stage1Service::new(members, Arc::new(CouncilConfig::default()))
    }

    fn member(label: &str, mock: Arc<MockBackend>) -> Stage1Member {
        Stage1Member::new(Invoker::new(label, mock), OpinionPayload::Completion)
    }

    fn far_deadline() -> Instant {
        Instant::now() + Duration::from_secs(30)
    }

    const GOOD: &str = r#"{"answer_text": "Paris.", "claims": ["Paris is the capital of France."], "citations": []}"#;

    #[tokio::test]
    async fn collects_parallel_opinions() {
        let a = Arc::new(MockBackend::fixed("A", GOOD));
        let b = Arc::new(MockBackend::fixed("B", GOOD));
        let svc = service(vec![member("A", a), member("B", b)]);

        let opinions = svc
            .first_opinions(
                &Client::new(),
                "What is the capital of France?",
                &QueryOptions::default(),
                far_deadline(),
            )
            .await
            .unwrap();

        assert_eq!(opinions.len(), 2);
        assert_eq!(opinions[0].model_name, "A");
        assert_eq!(opinions[1].model_name, "B");
        assert_eq!(opinions[0].claims, vec!["Paris is the capital of France."]);
    }

    #[tokio::test]
    async fn sequential_dispatch_matches_parallel() {
        let a = Arc::new(MockBackend::fixed("A", GOOD));
        let svc = service(vec![member("A", a)]);
        let options = QueryOptions {
            enable_parallel: false,
            ..QueryOptions::default()
        };

        let opinions = svc
            .first_opinions(&Client::new(), "query text", &options, far_deadline())
            .await
            .unwrap();
        assert_eq!(opinions.len(), 1);
    }

    #[tokio::test]
    async fn skip_failed_models_drops_failures() {
        let a = Arc::new(MockBackend::failing("A", 500));
        let b = Arc::new(MockBackend::fixed("B", GOOD));
        let svc = service(vec![member("A", a), member("B", b)]);

        let opinions = svc
            .first_opinions(
                &Client::new(),
                "query text",
                &QueryOptions::default(),
                far_deadline(),
            )
            .await
            .unwrap();
        assert_eq!(opinions.len(), 1);
        assert_eq!(opinions[0].model_name, "B");
    }

    #[tokio::test]
    async fn strict_mode_propagates_first_error() {
        let a = Arc::new(MockBackend::failing("A", 500));
        let b = Arc::new(MockBackend::fixed("B", GOOD));
        let svc = service(vec![member("A", a), member("B", b)]);
        let options = QueryOptions {
            skip_failed_models: false,
            ..QueryOptions::default()
        };

        let err = svc
            .first_opinions(&Client::new(), "query text", &options, far_deadline())
            .await
            .unwrap_err();
        assert!(matches!(err, CouncilError::Http { status: 500, .. }));
    }

    #[tokio::test]
    async fn all_failed_is_a_pipeline_error() {
        let a = Arc::new(MockBackend::failing("A", 500));
        let b = Arc::new(MockBackend::failing("B", 502));
        let svc = service(vec![member("A", a), member("B", b)]);

        let err = svc
            .first_opinions(
                &Client::new(),
                "query text",
                &QueryOptions::default(),
                far_deadline(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, CouncilError::Pipeline { .. }));
        assert_eq!(err.status_code(), 502);
    }

    #[tokio::test]
    async fn no_members_is_a_pipeline_error() {
        let svc = service(vec![]);
        let err = svc
            .first_opinions(
                &Client::new(),
                "query text",
                &QueryOptions::default(),
                far_deadline(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, CouncilError::Pipeline { .. }));
    }

    #[test]
    fn parse_opinion_happy_path() {
        let response = r#"{"answer_text": "A.", "claims": ["c1", "c2"], "citations": [{"source": "s", "url": "u", "snippet": "q"}]}"#;
        let opinion = parse_opinion("M", response);
        assert_eq!(opinion.answer_text, "A.");
        assert_eq!(opinion.claims.len(), 2);
        assert_eq!(opinion.citations.len(), 1);
        assert!(!opinion.meta.parse_error);
    }

    #[test]
    fn parse_opinion_degrades_to_raw_text() {
        let long = "x".repeat(800);
        let opinion = parse_opinion("M", &long);
        assert!(opinion.meta.parse_error);
        assert_eq!(opinion.answer_text.chars().count(), RAW_ANSWER_LIMIT);
        assert!(opinion.claims.is_empty());
        assert!(opinion.citations.is_empty());
    }

    #[test]
    fn parse_opinion_skips_non_string_claims() {
        let response = r#"{"answer_text": "A.", "claims": ["keep", 42, null, "also"]}"#;
        let opinion = parse_opinion("M", response);
        assert_eq!(opinion.claims, vec!["keep", "also"]);
    }
}
