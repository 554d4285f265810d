//! Paraphrase stage: reduce each opinion to atomic canonical claims.
//!
//! Opinions are processed one at a time so each origin's model label flows
//! cleanly into its claim ids. A failed paraphrase degrades to a sentence
//! split of the answer text; downstream stages treat fallback claims exactly
//! like paraphrased ones.

use std::sync::Arc;
use std::time::Instant;

use reqwest::Client;
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::CouncilConfig;
use crate::error::{CouncilError, Result};
use crate::invoker::Invoker;
use crate::prompts;
use crate::recover::recover_json;
use crate::types::{ParaphrasedClaim, Stage1Opinion};

/// Maximum sentences kept by the sentence-split fallback.
const FALLBACK_MAX_SENTENCES: usize = 5;
/// Minimum sentence length (chars) kept by the fallback.
const FALLBACK_MIN_LEN: usize = 10;

/// The claim-extraction service.
pub struct ParaphraseService {
    invoker: Invoker,
    config: Arc<CouncilConfig>,
}

impl ParaphraseService {
    pub fn new(invoker: Invoker, config: Arc<CouncilConfig>) -> Self {
        Self { invoker, config }
    }

    /// Extract canonical claims from every opinion, preserving origin order.
    ///
    /// Per-opinion failures never abort the stage; an opinion whose fallback
    /// also yields nothing is silently dropped.
    pub async fn extract_claims(
        &self,
        client: &Client,
        opinions: &[Stage1Opinion],
        deadline: Instant,
    ) -> Vec<ParaphrasedClaim> {
        let mut all_claims = Vec::new();

        for opinion in opinions {
            match self.claims_for(client, opinion, deadline).await {
                Ok(claims) => {
                    debug!(
                        model = %opinion.model_name,
                        count = claims.len(),
                        "extracted claims"
                    );
                    all_claims.extend(claims);
                }
                Err(err) => {
                    warn!(
                        model = %opinion.model_name,
                        error = %err,
                        "paraphrase failed, using sentence-split fallback"
                    );
                    all_claims.extend(fallback_claims(&opinion.model_name, &opinion.answer_text));
                }
            }
        }

        all_claims
    }

    async fn claims_for(
        &self,
        client: &Client,
        opinion: &Stage1Opinion,
        deadline: Instant,
    ) -> Result<Vec<ParaphrasedClaim>> {
        let payload = prompts::paraphrase_payload(&opinion.answer_text, &self.config);
        let response = self.invoker.invoke(client, &payload, deadline).await?;
        let parsed = recover_json(&response)?;

        let raw_claims = parsed
            .get("claims")
            .and_then(Value::as_array)
            .ok_or_else(|| {
                CouncilError::Validation("paraphrase response has no claims list".into())
            })?;

        // Indices track positions in the model's list, so skipped entries
        // leave gaps; ids stay unique and deterministic either way.
        let mut claims = Vec::new();
        for (idx, value) in raw_claims.iter().enumerate() {
            if let Some(text) = value.as_str() {
                let text = text.trim();
                if !text.is_empty() {
                    claims.push(make_claim(&opinion.model_name, &opinion.answer_text, idx, text));
                }
            }
        }
        Ok(claims)
    }
}

/// Sentence-split fallback: first five `.`-separated segments longer than
/// ten characters, each re-terminated with a period.
pub fn fallback_claims(model_name: &str, answer_text: &str) -> Vec<ParaphrasedClaim> {
    answer_text
        .split('.')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .take(FALLBACK_MAX_SENTENCES)
        .enumerate()
        .filter(|(_, sentence)| sentence.len() > FALLBACK_MIN_LEN)
        .map(|(idx, sentence)| {
            make_claim(model_name, answer_text, idx, &format!("{}.", sentence))
        })
        .collect()
}

fn make_claim(model_name: &str, original_text: &str, idx: usize, canonical: &str) -> ParaphrasedClaim {
    ParaphrasedClaim {
        claim_id: format!("{}_claim_{}", model_name.to_lowercase(), idx),
        origin_model: model_name.to_string(),
        original_text: original_text.to_string(),
        canonical_text: canonical.to_string(),
        word_count: canonical.split_whitespace().count(),
    }
}
