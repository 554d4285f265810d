//! Data model for the council pipeline.
//!
//! Every entity is created by exactly one stage and treated as read-only
//! downstream; a [`PipelineResult`] owns the full set for one request.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{CouncilError, Result};

/// Minimum accepted query length, in characters after trimming.
pub const QUERY_MIN_CHARS: usize = 5;
/// Maximum accepted query length.
pub const QUERY_MAX_CHARS: usize = 1000;

/// Per-request options controlling caching, timeout, and dispatch policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryOptions {
    /// Consult and populate the response cache.
    pub use_cache: bool,

    /// Whole-request deadline in seconds.
    pub timeout: u64,

    /// Allow fan-out stages to run their invokers concurrently.
    pub enable_parallel: bool,

    /// Tolerate individual model failures instead of propagating the first one.
    pub skip_failed_models: bool,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            use_cache: true,
            timeout: 120,
            enable_parallel: true,
            skip_failed_models: true,
        }
    }
}

/// Validate and normalize a raw query string.
///
/// Trims surrounding whitespace and enforces the length bounds. The returned
/// string is the canonical query used for the pipeline and the cache key.
pub fn validate_query(raw: &str) -> Result<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(CouncilError::InvalidQuery("query cannot be empty".into()));
    }
    let chars = trimmed.chars().count();
    if chars < QUERY_MIN_CHARS {
        return Err(CouncilError::InvalidQuery(format!(
            "query must be at least {} characters",
            QUERY_MIN_CHARS
        )));
    }
    if chars > QUERY_MAX_CHARS {
        return Err(CouncilError::InvalidQuery(format!(
            "query must be at most {} characters",
            QUERY_MAX_CHARS
        )));
    }
    Ok(trimmed.to_string())
}

/// A source reference attached to an answer or claim.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Citation {
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub snippet: Option<String>,
}

/// Parse metadata attached to a Stage-1 opinion.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OpinionMeta {
    /// True when the model output could not be recovered as JSON and the
    /// raw text was used as the answer instead.
    #[serde(default)]
    pub parse_error: bool,
}

/// One model's independent first answer to the query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stage1Opinion {
    /// Label of the model that produced this opinion; unique per request.
    pub model_name: String,
    pub answer_text: String,
    #[serde(default)]
    pub claims: Vec<String>,
    #[serde(default)]
    pub citations: Vec<Citation>,
    #[serde(default)]
    pub meta: OpinionMeta,
}

/// An atomic canonical claim extracted from one opinion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParaphrasedClaim {
    /// `"<lowercased origin model>_claim_<index>"`, unique per request.
    pub claim_id: String,
    /// Label of the model whose answer this claim came from.
    pub origin_model: String,
    /// The full answer text the claim was extracted from.
    pub original_text: String,
    /// The claim itself, stripped of hedging and bounded in length.
    pub canonical_text: String,
    pub word_count: usize,
}

/// A reviewer's judgment on one claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Verdict {
    Correct,
    Incorrect,
    Uncertain,
}

impl FromStr for Verdict {
    type Err = ();

    /// Case-insensitive; reviewers routinely vary the casing.
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "CORRECT" => Ok(Verdict::Correct),
            "INCORRECT" => Ok(Verdict::Incorrect),
            "UNCERTAIN" => Ok(Verdict::Uncertain),
            _ => Err(()),
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Verdict::Correct => "CORRECT",
            Verdict::Incorrect => "INCORRECT",
            Verdict::Uncertain => "UNCERTAIN",
        };
        f.write_str(s)
    }
}

/// A single validated review of one claim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewItem {
    pub claim_id: String,
    pub verdict: Verdict,
    pub reason: String,
    #[serde(default)]
    pub evidence_needed: bool,
    /// Reviewer's confidence in this verdict, in `[0, 1]`.
    pub confidence: f64,
}

/// Metadata attached to a reviewer's verdict set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReviewerMeta {
    pub total_reviewed: usize,
    /// True when the reviews are the degraded all-uncertain fallback.
    #[serde(default)]
    pub fallback: bool,
}

/// The complete output of one reviewer over the shared claim list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewerVerdict {
    /// Reviewer label; unique per request.
    pub reviewer_name: String,
    pub reviews: Vec<ReviewItem>,
    #[serde(default)]
    pub meta: ReviewerMeta,
}

/// Categorized claim buckets plus the cross-reviewer consensus score.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Aggregation {
    pub total_claims: usize,
    pub supported_claims: Vec<String>,
    pub rejected_claims: Vec<String>,
    pub disputed_claims: Vec<String>,
    pub uncertain_claims: Vec<String>,
    /// Fraction of multi-reviewed claims on which all reviewers agree,
    /// rounded to 3 decimals; 0.5 when no claim was cross-checked.
    pub consensus_score: f64,
    pub evidence_needed_count: usize,
}

/// The synthesized final answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalAnswer {
    pub final_answer: String,
    pub supporting_claims: Vec<String>,
    pub uncertain_points: Vec<String>,
    pub rejected_claims: Vec<String>,
    #[serde(default)]
    pub citations: Vec<Citation>,
    pub confidence: f64,
    pub reasoning_summary: String,
}

/// Wall-clock duration of one executed stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageTiming {
    pub stage: String,
    pub seconds: f64,
}

/// Request-scoped execution metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineMetadata {
    pub request_id: String,
    /// Total wall-clock seconds for the request.
    pub processing_time: f64,
    /// Enabled models in flag order, independent of runtime success.
    pub models_used: Vec<String>,
    pub cache_hit: bool,
    #[serde(default)]
    pub errors: Vec<String>,
    #[serde(default)]
    pub warnings: Vec<String>,
    /// Stage durations in execution order.
    pub stage_timings: Vec<StageTiming>,
    pub timestamp: String,
    /// Stamped by the cache at write time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cached_at: Option<String>,
}

/// The complete result of one pipeline run, returned to the caller and cached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineResult {
    pub query: String,
    pub stage1_opinions: Vec<Stage1Opinion>,
    pub paraphrased_claims: Vec<ParaphrasedClaim>,
    pub reviewer_verdicts: Vec<ReviewerVerdict>,
    pub aggregation: Aggregation,
    pub final_answer: FinalAnswer,
    pub metadata: PipelineMetadata,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_query_trims() {
        let q = validate_query("  What is the capital of France?  ").unwrap();
        assert_eq!(q, "What is the capital of France?");
    }

    #[test]
    fn validate_query_rejects_empty() {
        assert!(matches!(
            validate_query("   "),
            Err(CouncilError::InvalidQuery(_))
        ));
    }

    #[test]
    fn validate_query_rejects_short() {
        assert!(validate_query("hi").is_err());
    }

    #[test]
    fn validate_query_rejects_long() {
        let long = "x".repeat(QUERY_MAX_CHARS + 1);
        assert!(validate_query(&long).is_err());
    }

    #[test]
    fn verdict_parses_case_insensitively() {
        assert_eq!("correct".parse::<Verdict>(), Ok(Verdict::Correct));
        assert_eq!("Incorrect".parse::<Verdict>(), Ok(Verdict::Incorrect));
        assert_eq!(" UNCERTAIN ".parse::<Verdict>(), Ok(Verdict::Uncertain));
        assert!("MAYBE".parse::<Verdict>().is_err());
    }

    #[test]
    fn verdict_serializes_upper() {
        assert_eq!(
            serde_json::to_string(&Verdict::Correct).unwrap(),
            "\"CORRECT\""
        );
        let v: Verdict = serde_json::from_str("\"UNCERTAIN\"").unwrap();
        assert_eq!(v, Verdict::Uncertain);
    }

    #[test]
    fn default_options() {
        let opts = QueryOptions::default();
        assert!(opts.use_cache);
        assert_eq!(opts.timeout, 120);
        assert!(opts.enable_parallel);
        assert!(opts.skip_failed_models);
    }

    #[test]
    fn opinion_meta_defaults_on_deserialize() {
        let json = r#"{"model_name": "m", "answer_text": "a"}"#;
        let opinion: Stage1Opinion = serde_json::from_str(json).unwrap();
        assert!(!opinion.meta.parse_error);
        assert!(opinion.claims.is_empty());
    }
}
