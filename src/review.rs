//! Review stage: independent peer review of the shared claim list.
//!
//! Every enabled reviewer receives the identical claim list and the original
//! query; the claim-id convention carries no hint of which model produced
//! which claim. Unparseable reviewer output degrades to an all-uncertain
//! fallback verdict. A reviewer whose backend call fails also contributes the
//! fallback verdict (under `skip_failed_models`), but the stage fails hard
//! when every reviewer's backend errored.

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
use crate::recover::recover_json;
use crate::types::{ParaphrasedClaim, QueryOptions, ReviewItem, ReviewerMeta, ReviewerVerdict};

const FALLBACK_REASON: &str = "Unable to verify due to reviewer error";
const FALLBACK_CONFIDENCE: f64 = 0.3;
const DEFAULT_CONFIDENCE: f64 = 0.5;

/// The peer-review fan-out service.
pub struct ReviewerService {
    reviewers: Vec<Invoker>,
    config: Arc<CouncilConfig>,
}

impl ReviewerService {
    pub fn new(reviewers: Vec<Invoker>, config: Arc<CouncilConfig>) -> Self {
        Self { reviewers, config }
    }

    /// Run every enabled reviewer over the claim list.
    pub async fn review_claims(
        &self,
        client: &Client,
        query: &str,
        claims: &[ParaphrasedClaim],
        options: &QueryOptions,
        deadline: Instant,
    ) -> Result<Vec<ReviewerVerdict>> {
        if self.reviewers.is_empty() {
            return Err(CouncilError::pipeline("All reviewers failed", None));
        }

        let payload = prompts::reviewer_payload(query, claims, &self.config);
        let parallel = options.enable_parallel && self.config.parallel_reviewers;

        let results = if parallel {
            let futures = self
                .reviewers
                .iter()
                .map(|reviewer| self.call_reviewer(client, reviewer, &payload, claims, deadline));
            join_all(futures).await
        } else {
            let mut results = Vec::with_capacity(self.reviewers.len());
            for reviewer in &self.reviewers {
                results.push(
                    self.call_reviewer(client, reviewer, &payload, claims, deadline)
                        .await,
                );
            }
            results
        };

        let mut verdicts = Vec::new();
        let mut errored = 0usize;
        let mut last_error = None;
        for (reviewer, result) in self.reviewers.iter().zip(results) {
            match result {
                Ok(verdict) => verdicts.push(verdict),
                Err(err) => {
                    warn!(reviewer = reviewer.label(), error = %err, "reviewer failed");
                    if !options.skip_failed_models {
                        return Err(err);
                    }
                    errored += 1;
                    last_error = Some(err);
                    verdicts.push(fallback_verdict(reviewer.label(), claims));
                }
            }
        }

        if errored == self.reviewers.len() {
            return Err(CouncilError::pipeline("All reviewers failed", last_error));
        }

        Ok(verdicts)
    }

    /// One reviewer call. Backend failures bubble up; unparseable output is
    /// handled here with the uncertain fallback.
    async fn call_reviewer(
        &self,
        client: &Client,
        reviewer: &Invoker,
        payload: &Value,
        claims: &[ParaphrasedClaim],
        deadline: Instant,
    ) -> Result<ReviewerVerdict> {
        let response = reviewer.invoke(client, payload, deadline).await?;

        match parse_reviews(&response) {
            Some(reviews) => Ok(ReviewerVerdict {
                reviewer_name: reviewer.label().to_string(),
                meta: ReviewerMeta {
                    total_reviewed: reviews.len(),
                    fallback: false,
                },
                reviews,
            }),
            None => {
                warn!(
                    reviewer = reviewer.label(),
                    "unparseable reviewer output, marking all claims uncertain"
                );
                Ok(fallback_verdict(reviewer.label(), claims))
            }
        }
    }
}

/// Parse and validate a reviewer response. Returns `None` when no reviews
/// list could be recovered at all; individually invalid items are dropped.
fn parse_reviews(response: &str) -> Option<Vec<ReviewItem>> {
    let parsed = recover_json(response).ok()?;
    let items = parsed.get("reviews")?.as_array()?;
    Some(items.iter().filter_map(validate_item).collect())
}

/// A review item is kept only if it carries a claim id, a reason, and a
/// recognizable verdict. Confidence defaults to 0.5, evidence_needed to false.
fn validate_item(item: &Value) -> Option<ReviewItem> {
    let claim_id = item.get("claim_id")?.as_str()?;
    let reason = item.get("reason")?.as_str()?;
    let verdict = item.get("verdict")?.as_str()?.parse().ok()?;

    let confidence = item
        .get("confidence")
        .and_then(lenient_number)
        .unwrap_or(DEFAULT_CONFIDENCE);
    let evidence_needed = item
        .get("evidence_needed")
        .and_then(Value::as_bool)
        .unwrap_or(false);

    Some(ReviewItem {
        claim_id: claim_id.to_string(),
        verdict,
        reason: reason.to_string(),
        evidence_needed,
        confidence,
    })
}

/// Accept a JSON number or a numeric string.
fn lenient_number(value: &Value) -> Option<f64> {
    value
        .as_f64()
        .or_else(|| value.as_str().and_then(|s| s.trim().parse().ok()))
}

/// One UNCERTAIN review per input claim, flagged as a fallback.
pub fn fallback_verdict(reviewer_name: &str, claims: &[ParaphrasedClaim]) -> ReviewerVerdict {
    let reviews: Vec<ReviewItem> = claims
        .iter()
        .map(|claim| ReviewItem {
            claim_id: claim.claim_id.clone(),
            verdict: crate::types::Verdict::Uncertain,
            reason: FALLBACK_REASON.to_string(),
            evidence_needed: true,
            confidence: FALLBACK_CONFIDENCE,
        })
        .collect();

    ReviewerVerdict {
        reviewer_name: reviewer_name.to_string(),
        meta: ReviewerMeta {
            total_reviewed: reviews.len(),
            fallback: true,
        },
        reviews,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MockBackend;
    use crate::types::Verdict;
    use std::time::Duration;

    fn claim(id: &str) -> ParaphrasedClaim {
        ParaphrasedClaim {
            claim_id: id.into(),
            origin_model: "m".into(),
            original_text: "orig".into(),
            canonical_text: format!("text for {}", id),
            word_count: 3,
        }
    }

    fn service(reviewers: Vec<Invoker>) -> ReviewerService {
        ReviewerService::new(reviewers, Arc::new(CouncilConfig::default()))
    }

    fn far_deadline() -> Instant {
        Instant::now() + Duration::from_secs(30)
    }

    const REVIEW_OK: &str = r#"{"reviews": [
        {"claim_id": "m_claim_0", "verdict": "correct", "reason": "known fact", "evidence_needed": false, "confidence": 0.9}
    ]}"#;

    #[tokio::test]
    async fn collects_verdicts_from_all_reviewers() {
        let a = Arc::new(MockBackend::fixed("Reviewer-A", REVIEW_OK));
        let b = Arc::new(MockBackend::fixed("Reviewer-B", REVIEW_OK));
        let svc = service(vec![
            Invoker::new("Reviewer-A", a),
            Invoker::new("Reviewer-B", b),
        ]);

        let verdicts = svc
            .review_claims(
                &Client::new(),
                "the query",
                &[claim("m_claim_0")],
                &QueryOptions::default(),
                far_deadline(),
            )
            .await
            .unwrap();

        assert_eq!(verdicts.len(), 2);
        assert_eq!(verdicts[0].reviewer_name, "Reviewer-A");
        assert_eq!(verdicts[0].reviews[0].verdict, Verdict::Correct);
        assert_eq!(verdicts[0].meta.total_reviewed, 1);
        assert!(!verdicts[0].meta.fallback);
    }

    #[tokio::test]
    async fn unparseable_output_degrades_to_uncertain() {
        let a = Arc::new(MockBackend::fixed("Reviewer-A", "garbage, no json"));
        let svc = service(vec![Invoker::new("Reviewer-A", a)]);
        let claims = [claim("m_claim_0"), claim("m_claim_1")];

        let verdicts = svc
            .review_claims(
                &Client::new(),
                "the query",
                &claims,
                &QueryOptions::default(),
                far_deadline(),
            )
            .await
            .unwrap();

        assert_eq!(verdicts.len(), 1);
        let verdict = &verdicts[0];
        assert!(verdict.meta.fallback);
        assert_eq!(verdict.reviews.len(), 2);
        for review in &verdict.reviews {
            assert_eq!(review.verdict, Verdict::Uncertain);
            assert_eq!(review.confidence, FALLBACK_CONFIDENCE);
            assert!(review.evidence_needed);
            assert_eq!(review.reason, FALLBACK_REASON);
        }
    }

    #[tokio::test]
    async fn one_backend_failure_keeps_the_stage_alive() {
        let a = Arc::new(MockBackend::failing("Reviewer-A", 500));
        let b = Arc::new(MockBackend::fixed("Reviewer-B", REVIEW_OK));
        let svc = service(vec![
            Invoker::new("Reviewer-A", a),
            Invoker::new("Reviewer-B", b),
        ]);

        let verdicts = svc
            .review_claims(
                &Client::new(),
                "the query",
                &[claim("m_claim_0")],
                &QueryOptions::default(),
                far_deadline(),
            )
            .await
            .unwrap();

        assert_eq!(verdicts.len(), 2);
        assert!(verdicts[0].meta.fallback);
        assert!(!verdicts[1].meta.fallback);
    }

    #[tokio::test]
    async fn all_backends_failing_is_a_pipeline_error() {
        let a = Arc::new(MockBackend::failing("Reviewer-A", 500));
        let b = Arc::new(MockBackend::failing("Reviewer-B", 500));
        let svc = service(vec![
            Invoker::new("Reviewer-A", a),
            Invoker::new("Reviewer-B", b),
        ]);

        let err = svc
            .review_claims(
                &Client::new(),
                "the query",
                &[claim("m_claim_0")],
                &QueryOptions::default(),
                far_deadline(),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, CouncilError::Pipeline { .. }));
        assert_eq!(err.status_code(), 502);
    }

    #[tokio::test]
    async fn strict_mode_propagates_backend_error() {
        let a = Arc::new(MockBackend::failing("Reviewer-A", 500));
        let svc = service(vec![Invoker::new("Reviewer-A", a)]);
        let options = QueryOptions {
            skip_failed_models: false,
            ..QueryOptions::default()
        };

        let err = svc
            .review_claims(
                &Client::new(),
                "the query",
                &[claim("m_claim_0")],
                &options,
                far_deadline(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, CouncilError::Http { status: 500, .. }));
    }

    #[test]
    fn validate_item_normalizes_and_defaults() {
        let item = serde_json::json!({
            "claim_id": "c0",
            "verdict": "Correct",
            "reason": "looks right"
        });
        let review = validate_item(&item).unwrap();
        assert_eq!(review.verdict, Verdict::Correct);
        assert_eq!(review.confidence, DEFAULT_CONFIDENCE);
        assert!(!review.evidence_needed);
    }

    #[test]
    fn validate_item_accepts_string_confidence() {
        let item = serde_json::json!({
            "claim_id": "c0",
            "verdict": "UNCERTAIN",
            "reason": "hmm",
            "confidence": "0.75"
        });
        assert_eq!(validate_item(&item).unwrap().confidence, 0.75);
    }

    #[test]
    fn validate_item_discards_bad_items() {
        // Missing reason.
        assert!(validate_item(&serde_json::json!({
            "claim_id": "c0", "verdict": "CORRECT"
        }))
        .is_none());
        // Unknown verdict.
        assert!(validate_item(&serde_json::json!({
            "claim_id": "c0", "verdict": "MAYBE", "reason": "r"
        }))
        .is_none());
        // Missing claim id.
        assert!(validate_item(&serde_json::json!({
            "verdict": "CORRECT", "reason": "r"
        }))
        .is_none());
    }

    #[test]
    fn parse_reviews_drops_invalid_items_silently() {
        let response = r#"{"reviews": [
            {"claim_id": "c0", "verdict": "CORRECT", "reason": "ok"},
            {"claim_id": "c1", "verdict": "BOGUS", "reason": "nope"},
            {"claim_id": "c2", "verdict": "incorrect", "reason": "wrong", "confidence": 0.8}
        ]}"#;
        let reviews = parse_reviews(response).unwrap();
        assert_eq!(reviews.len(), 2);
        assert_eq!(reviews[0].claim_id, "c0");
        assert_eq!(reviews[1].verdict, Verdict::Incorrect);
    }

    #[test]
    fn parse_reviews_requires_reviews_list() {
        assert!(parse_reviews(r#"{"not_reviews": []}"#).is_none());
        assert!(parse_reviews("plain text").is_none());
    }
}
