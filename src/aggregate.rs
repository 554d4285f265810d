//! Aggregation: pure reduction over reviewer verdicts.
//!
//! Reviews are grouped by claim id in first-appearance order, which makes
//! bucket member order deterministic for a given verdict sequence. Reviews
//! referencing unknown claim ids are ignored entirely.

use std::collections::HashMap;

use crate::types::{Aggregation, ParaphrasedClaim, ReviewItem, ReviewerVerdict, Verdict};

/// Reviews grouped by claim id, preserving first-appearance order.
struct ReviewsByClaim<'a> {
    order: Vec<&'a str>,
    reviews: HashMap<&'a str, Vec<&'a ReviewItem>>,
}

impl<'a> ReviewsByClaim<'a> {
    fn collect(verdicts: &'a [ReviewerVerdict], known: &HashMap<&str, &str>) -> Self {
        let mut order = Vec::new();
        let mut reviews: HashMap<&str, Vec<&ReviewItem>> = HashMap::new();

        for verdict in verdicts {
            for review in &verdict.reviews {
                let claim_id = review.claim_id.as_str();
                if !known.contains_key(claim_id) {
                    continue;
                }
                let entry = reviews.entry(claim_id).or_default();
                if entry.is_empty() {
                    order.push(claim_id);
                }
                entry.push(review);
            }
        }

        Self { order, reviews }
    }

    fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    fn iter<'s>(&'s self) -> impl Iterator<Item = (&'s str, &'s [&'a ReviewItem])> + 's {
        self.order
            .iter()
            .map(move |id| (*id, self.reviews[id].as_slice()))
    }
}

/// Combine all reviewer verdicts into categorized claim buckets plus a
/// consensus score.
pub fn aggregate(claims: &[ParaphrasedClaim], verdicts: &[ReviewerVerdict]) -> Aggregation {
    let claim_lookup: HashMap<&str, &str> = claims
        .iter()
        .map(|c| (c.claim_id.as_str(), c.canonical_text.as_str()))
        .collect();

    let by_claim = ReviewsByClaim::collect(verdicts, &claim_lookup);

    let mut supported_claims = Vec::new();
    let mut rejected_claims = Vec::new();
    let mut disputed_claims = Vec::new();
    let mut uncertain_claims = Vec::new();
    let mut evidence_needed_count = 0;

    for (claim_id, reviews) in by_claim.iter() {
        let claim_text = claim_lookup[claim_id].to_string();

        if reviews.iter().any(|r| r.evidence_needed) {
            evidence_needed_count += 1;
        }

        let total = reviews.len();
        let correct = count(reviews, Verdict::Correct);
        let incorrect = count(reviews, Verdict::Incorrect);
        let uncertain = count(reviews, Verdict::Uncertain);

        if correct == total {
            supported_claims.push(claim_text);
        } else if incorrect == total {
            rejected_claims.push(claim_text);
        } else if uncertain == total {
            uncertain_claims.push(claim_text);
        } else if correct > incorrect && correct > uncertain {
            supported_claims.push(claim_text);
        } else if incorrect > correct && incorrect > uncertain {
            rejected_claims.push(claim_text);
        } else {
            disputed_claims.push(claim_text);
        }
    }

    let consensus_score = consensus(&by_claim);

    Aggregation {
        total_claims: claims.len(),
        supported_claims,
        rejected_claims,
        disputed_claims,
        uncertain_claims,
        consensus_score,
        evidence_needed_count,
    }
}

fn count(reviews: &[&ReviewItem], verdict: Verdict) -> usize {
    reviews.iter().filter(|r| r.verdict == verdict).count()
}

/// Fraction of multi-reviewed claims on which all reviews agree, rounded to
/// three decimals. 0.5 when no claim was reviewed more than once (no
/// cross-check to score); 0.0 when nothing was reviewed at all.
fn consensus(by_claim: &ReviewsByClaim<'_>) -> f64 {
    if by_claim.is_empty() {
        return 0.0;
    }

    let mut unanimous = 0usize;
    let mut counted = 0usize;
    for (_, reviews) in by_claim.iter() {
        if reviews.len() < 2 {
            continue;
        }
        counted += 1;
        let first = reviews[0].verdict;
        if reviews.iter().all(|r| r.verdict == first) {
            unanimous += 1;
        }
    }

    if counted == 0 {
        return 0.5;
    }

    round3(unanimous as f64 / counted as f64)
}

fn round3(x: f64) -> f64 {
    (x * 1000.0).round() / 1000.0
}
