//! Chairman stage: synthesize the final answer from all prior artifacts.
//!
//! Synthesis never fails the pipeline. Any backend error, unparseable
//! output, or missing `final_answer` drops to a deterministic fallback built
//! from the aggregation's supported claims.

use std::time::Instant;

use reqwest::Client;
use serde_json::Value;
use tracing::{info, warn};

use crate::error::{CouncilError, Result};
use crate::invoker::Invoker;
use crate::prompts;
use crate::recover::recover_json;
use crate::types::{Aggregation, Citation, FinalAnswer, ParaphrasedClaim, ReviewerVerdict, Stage1Opinion};

const DEFAULT_CONFIDENCE: f64 = 0.7;
const FALLBACK_CONFIDENCE: f64 = 0.5;
const MAX_SUPPORTING: usize = 10;
const MAX_UNCERTAIN: usize = 5;
const MAX_REJECTED: usize = 5;
const MAX_CITATIONS: usize = 10;

/// The synthesis service. `invoker` is `None` when the chairman is disabled.
///
/// Generation settings (temperature, token budget) live on the chat backend
/// itself, so the service only renders the prompt and validates the result.
pub struct ChairmanService {
    invoker: Option<Invoker>,
}

impl ChairmanService {
    pub fn new(invoker: Option<Invoker>) -> Self {
        Self { invoker }
    }

    /// Produce the final answer; degrades to the deterministic fallback on
    /// any failure.
    pub async fn synthesize(
        &self,
        client: &Client,
        query: &str,
        opinions: &[Stage1Opinion],
        claims: &[ParaphrasedClaim],
        verdicts: &[ReviewerVerdict],
        aggregation: &Aggregation,
        deadline: Instant,
    ) -> FinalAnswer {
        let Some(invoker) = &self.invoker else {
            return disabled_fallback(aggregation);
        };

        match self
            .try_synthesize(client, invoker, query, opinions, claims, verdicts, aggregation, deadline)
            .await
        {
            Ok(answer) => {
                info!(confidence = answer.confidence, "final answer synthesized");
                answer
            }
            Err(err) => {
                warn!(error = %err, "chairman synthesis failed, using fallback");
                error_fallback(aggregation)
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn try_synthesize(
        &self,
        client: &Client,
        invoker: &Invoker,
        query: &str,
        opinions: &[Stage1Opinion],
        claims: &[ParaphrasedClaim],
        verdicts: &[ReviewerVerdict],
        aggregation: &Aggregation,
        deadline: Instant,
    ) -> Result<FinalAnswer> {
        let prompt = prompts::chairman_prompt(query, opinions, claims, verdicts, aggregation);
        let response = invoker
            .invoke(client, &Value::String(prompt), deadline)
            .await?;
        let parsed = recover_json(&response)?;
        build_answer(&parsed)
    }
}

/// Validate and normalize a parsed chairman response.
fn build_answer(parsed: &Value) -> Result<FinalAnswer> {
    let final_answer = parsed
        .get("final_answer")
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| CouncilError::Validation("missing final_answer in chairman response".into()))?;

    let confidence = parsed
        .get("confidence")
        .and_then(Value::as_f64)
        .unwrap_or(DEFAULT_CONFIDENCE)
        .clamp(0.0, 1.0);

    let reasoning_summary = parsed
        .get("reasoning_summary")
        .and_then(Value::as_str)
        .unwrap_or("Synthesized based on supported claims and peer review.")
        .to_string();

    Ok(FinalAnswer {
        final_answer: final_answer.to_string(),
        supporting_claims: capped_strings(parsed.get("supporting_claims"), MAX_SUPPORTING),
        uncertain_points: capped_strings(parsed.get("uncertain_points"), MAX_UNCERTAIN),
        rejected_claims: capped_strings(parsed.get("rejected_claims"), MAX_REJECTED),
        citations: capped_citations(parsed.get("citations"), MAX_CITATIONS),
        confidence,
        reasoning_summary,
    })
}

fn capped_strings(value: Option<&Value>, cap: usize) -> Vec<String> {
    value
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .take(cap)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn capped_citations(value: Option<&Value>, cap: usize) -> Vec<Citation> {
    value
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| serde_json::from_value(item.clone()).ok())
                .take(cap)
                .collect()
        })
        .unwrap_or_default()
}

fn fallback_answer(aggregation: &Aggregation, empty_sentinel: &str, reasoning: &str) -> FinalAnswer {
    let supported = &aggregation.supported_claims;
    let final_answer = if supported.is_empty() {
        empty_sentinel.to_string()
    } else {
        supported[..supported.len().min(3)].join(" ")
    };

    FinalAnswer {
        final_answer,
        supporting_claims: supported.iter().take(5).cloned().collect(),
        uncertain_points: aggregation.uncertain_claims.iter().take(3).cloned().collect(),
        rejected_claims: aggregation.rejected_claims.iter().take(3).cloned().collect(),
        citations: Vec::new(),
        confidence: FALLBACK_CONFIDENCE,
        reasoning_summary: reasoning.to_string(),
    }
}

/// Fallback when the chairman stage is disabled by configuration.
pub fn disabled_fallback(aggregation: &Aggregation) -> FinalAnswer {
    fallback_answer(
        aggregation,
        "Unable to synthesize answer.",
        "Fallback synthesis (chairman unavailable).",
    )
}

/// Fallback when a synthesis attempt failed.
pub fn error_fallback(aggregation: &Aggregation) -> FinalAnswer {
    fallback_answer(
        aggregation,
        "Unable to provide a confident answer due to insufficient verified claims.",
        "Fallback synthesis due to chairman error.",
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MockBackend;
    use std::sync::Arc;
    use std::time::Duration;

    fn agg(supported: &[&str]) -> Aggregation {
        Aggregation {
            total_claims: supported.len(),
            supported_claims: supported.iter().map(|s| s.to_string()).collect(),
            uncertain_claims: vec!["maybe".into()],
            rejected_claims: vec!["wrong".into()],
            ..Aggregation::default()
        }
    }

    fn service(invoker: Option<Invoker>) -> ChairmanService {
        ChairmanService::new(invoker)
    }

    fn far_deadline() -> Instant {
        Instant::now() + Duration::from_secs(30)
    }

    #[tokio::test]
    async fn synthesizes_from_valid_response() {
        let response = r#"{
            "final_answer": "Paris is the capital of France.",
            "supporting_claims": ["Paris is the capital of France."],
            "uncertain_points": [],
            "rejected_claims": [],
            "citations": [{"source": "enc", "url": "https://example.com", "snippet": "Paris"}],
            "confidence": 0.92,
            "reasoning_summary": "All reviewers agreed."
        }"#;
        let mock = Arc::new(MockBackend::fixed("Chairman", response));
        let svc = service(Some(Invoker::new("Chairman", mock)));

        let answer = svc
            .synthesize(
                &Client::new(),
                "capital of France?",
                &[],
                &[],
                &[],
                &agg(&["Paris is the capital of France."]),
                far_deadline(),
            )
            .await;

        assert_eq!(answer.final_answer, "Paris is the capital of France.");
        assert_eq!(answer.confidence, 0.92);
        assert_eq!(answer.citations.len(), 1);
        assert_eq!(answer.reasoning_summary, "All reviewers agreed.");
    }

    #[tokio::test]
    async fn malformed_output_falls_back_deterministically() {
        let mock = Arc::new(MockBackend::fixed("Chairman", "```not json at all"));
        let svc = service(Some(Invoker::new("Chairman", mock)));

        let answer = svc
            .synthesize(
                &Client::new(),
                "capital of France?",
                &[],
                &[],
                &[],
                &agg(&["Paris is the capital of France."]),
                far_deadline(),
            )
            .await;

        assert_eq!(answer.final_answer, "Paris is the capital of France.");
        assert_eq!(answer.confidence, 0.5);
        assert!(answer.reasoning_summary.contains("Fallback"));
    }

    #[tokio::test]
    async fn backend_error_falls_back() {
        let mock = Arc::new(MockBackend::failing("Chairman", 500));
        let svc = service(Some(Invoker::new("Chairman", mock)));

        let answer = svc
            .synthesize(
                &Client::new(),
                "q",
                &[],
                &[],
                &[],
                &agg(&[]),
                far_deadline(),
            )
            .await;

        assert_eq!(
            answer.final_answer,
            "Unable to provide a confident answer due to insufficient verified claims."
        );
        assert_eq!(answer.confidence, 0.5);
    }

    #[tokio::test]
    async fn disabled_chairman_uses_disabled_sentinel() {
        let svc = service(None);
        let answer = svc
            .synthesize(&Client::new(), "q", &[], &[], &[], &agg(&[]), far_deadline())
            .await;
        assert_eq!(answer.final_answer, "Unable to synthesize answer.");
        assert!(answer.reasoning_summary.contains("unavailable"));
    }

    #[test]
    fn missing_final_answer_is_a_validation_error() {
        let parsed = serde_json::json!({"confidence": 0.9});
        assert!(matches!(
            build_answer(&parsed),
            Err(CouncilError::Validation(_))
        ));
    }

    #[test]
    fn missing_fields_get_defaults() {
        let parsed = serde_json::json!({"final_answer": "Answer."});
        let answer = build_answer(&parsed).unwrap();
        assert_eq!(answer.confidence, DEFAULT_CONFIDENCE);
        assert!(answer.supporting_claims.is_empty());
        assert!(answer.citations.is_empty());
        assert_eq!(
            answer.reasoning_summary,
            "Synthesized based on supported claims and peer review."
        );
    }

    #[test]
    fn lists_are_capped() {
        let many: Vec<String> = (0..20).map(|i| format!("claim {}", i)).collect();
        let parsed = serde_json::json!({
            "final_answer": "Answer.",
            "supporting_claims": many,
            "uncertain_points": many,
            "rejected_claims": many,
            "citations": (0..20).map(|i| serde_json::json!({"source": format!("s{}", i)})).collect::<Vec<_>>(),
        });
        let answer = build_answer(&parsed).unwrap();
        assert_eq!(answer.supporting_claims.len(), MAX_SUPPORTING);
        assert_eq!(answer.uncertain_points.len(), MAX_UNCERTAIN);
        assert_eq!(answer.rejected_claims.len(), MAX_REJECTED);
        assert_eq!(answer.citations.len(), MAX_CITATIONS);
    }

    #[test]
    fn confidence_is_clamped() {
        let parsed = serde_json::json!({"final_answer": "A.", "confidence": 3.5});
        assert_eq!(build_answer(&parsed).unwrap().confidence, 1.0);
    }

    #[test]
    fn fallback_joins_first_three_supported() {
        let aggregation = agg(&["One.", "Two.", "Three.", "Four."]);
        let answer = error_fallback(&aggregation);
        assert_eq!(answer.final_answer, "One. Two. Three.");
        assert_eq!(answer.supporting_claims.len(), 4);
        assert_eq!(answer.uncertain_points, vec!["maybe"]);
        assert_eq!(answer.rejected_claims, vec!["wrong"]);
        assert!(answer.citations.is_empty());
    }
}
