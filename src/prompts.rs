//! Prompt builders for every pipeline stage.
//!
//! Each builder is a pure function from stage inputs to the payload its
//! backend consumes. Completion-server payloads carry the full generation
//! settings; the chairman builder returns the rendered prompt text because
//! the chat backend owns its own generation config.

use serde_json::{json, Value};
use std::fmt::Write;

use crate::config::CouncilConfig;
use crate::types::{Aggregation, ParaphrasedClaim, ReviewerVerdict, Stage1Opinion};

const STAGE1_SYSTEM: &str = "\
You are an expert AI assistant providing factual, concise answers.
Your task is to answer the user's query accurately and provide supporting claims and citations.

CRITICAL RULES:
1. Do NOT engage in chain-of-thought reasoning
2. Do NOT show your work or thinking process
3. Provide ONLY the structured JSON output
4. Be factual and concise
5. Each claim should be atomic and verifiable
6. Include citations when possible";

const PARAPHRASE_SYSTEM: &str = "\
You are an expert at extracting and reformulating claims into canonical form.
Your task is to convert natural language answers into atomic, canonical claims.

RULES:
1. Each claim must be atomic (single verifiable fact)
2. Each claim must be <=20 words
3. Use clear, unambiguous language
4. Remove hedging words unless factually necessary
5. Maintain factual accuracy
6. Do NOT add information not present in the original
7. Return ONLY JSON output";

const REVIEWER_SYSTEM: &str = "\
You are an expert fact-checker and peer reviewer.
Your task is to evaluate anonymized claims for factual accuracy.

CRITICAL RULES:
1. Evaluate ONLY the claims provided
2. Do NOT know the source of claims (they are anonymized)
3. Do NOT engage in chain-of-thought
4. Judge each claim independently
5. Base verdicts on factual accuracy and verifiability
6. Return ONLY JSON output

VERDICT TYPES:
- CORRECT: Factually accurate and verifiable
- INCORRECT: Factually wrong or misleading
- UNCERTAIN: Cannot verify with confidence, needs more evidence";

const CHAIRMAN_SYSTEM: &str = "\
You are the Chairman of an expert panel synthesizing a final answer.
You have received:
1. Multiple initial opinions from different experts (anonymized)
2. Extracted canonical claims from those opinions
3. Independent peer review verdicts on each claim

Your task is to synthesize a final, authoritative answer based ONLY on:
- Claims marked as CORRECT by reviewers
- Claims with high consensus
- Verifiable facts

CRITICAL RULES:
1. Use ONLY supported claims (marked CORRECT)
2. Acknowledge uncertain points explicitly
3. Mention rejected claims if relevant to context
4. Provide a balanced, fact-based answer
5. Include citations when available
6. Be concise but comprehensive
7. Return ONLY JSON output";

fn stage1_user_prompt(query: &str) -> String {
    format!(
        "Answer the following query concisely and factually.\n\n\
         Query: {query}\n\n\
         Return your response as a valid JSON object with this EXACT structure:\n\
         {{\n\
           \"answer_text\": \"Your concise answer here (2-4 sentences)\",\n\
           \"claims\": [\n\
             \"Atomic factual claim 1\",\n\
             \"Atomic factual claim 2\",\n\
             \"Atomic factual claim 3\"\n\
           ],\n\
           \"citations\": [\n\
             {{\"source\": \"Source name\", \"url\": \"https://...\", \"snippet\": \"Relevant quote\"}}\n\
           ]\n\
         }}\n\n\
         IMPORTANT:\n\
         - answer_text: 2-4 sentences maximum\n\
         - claims: 3-7 atomic, verifiable statements\n\
         - Each claim should be <=25 words\n\
         - citations: Include if you have reliable sources\n\
         - Return ONLY valid JSON, no other text"
    )
}

/// Stage-1 payload for a completion server.
pub fn stage1_completion_payload(query: &str, config: &CouncilConfig) -> Value {
    json!({
        "prompt": format!("{}\n\n{}", STAGE1_SYSTEM, stage1_user_prompt(query)),
        "temperature": config.stage1_temperature,
        "max_tokens": config.stage1_max_tokens,
        "stop": ["</s>", "User:", "Query:"],
        "stream": false,
    })
}

/// Stage-1 payload for the hosted inference API.
pub fn stage1_hosted_payload(query: &str, config: &CouncilConfig) -> Value {
    json!({
        "inputs": format!("{}\n\n{}", STAGE1_SYSTEM, stage1_user_prompt(query)),
        "parameters": {
            "max_new_tokens": config.stage1_max_tokens,
            "temperature": config.stage1_temperature,
            "top_p": 0.9,
            "do_sample": true,
            "return_full_text": false,
        },
    })
}

/// Paraphrase payload for a completion server.
pub fn paraphrase_payload(answer_text: &str, config: &CouncilConfig) -> Value {
    let user = format!(
        "Convert the following answer into a list of atomic canonical claims.\n\n\
         Original Answer:\n{answer_text}\n\n\
         Extract and reformulate ALL factual claims. Each claim should be:\n\
         - Atomic (one fact per claim)\n\
         - Clear and unambiguous\n\
         - <=20 words\n\
         - Preserving original meaning\n\n\
         Return ONLY valid JSON with this structure:\n\
         {{\n\
           \"claims\": [\n\
             \"Canonical claim 1\",\n\
             \"Canonical claim 2\",\n\
             \"Canonical claim 3\"\n\
           ]\n\
         }}\n\n\
         IMPORTANT:\n\
         - Return ONLY the JSON object\n\
         - No explanations or additional text\n\
         - Each claim is a single sentence\n\
         - Preserve all facts from the original answer"
    );
    json!({
        "prompt": format!("{}\n\n{}", PARAPHRASE_SYSTEM, user),
        "temperature": config.paraphrase_temperature,
        "max_tokens": config.paraphrase_max_tokens,
        "stop": ["</s>", "Original Answer:", "\n\n\n"],
        "stream": false,
    })
}

/// Reviewer payload for a completion server.
///
/// Claims are listed by id only; the id convention carries no hint of which
/// model produced which claim.
pub fn reviewer_payload(query: &str, claims: &[ParaphrasedClaim], config: &CouncilConfig) -> Value {
    let claims_list = claims
        .iter()
        .map(|c| format!("[{}]: {}", c.claim_id, c.canonical_text))
        .collect::<Vec<_>>()
        .join("\n");

    let user = format!(
        "Original Question: {query}\n\n\
         Evaluate the following anonymized claims for factual accuracy.\n\
         Judge each claim independently based on your knowledge.\n\n\
         Claims to review:\n{claims_list}\n\n\
         For each claim, provide:\n\
         1. verdict: CORRECT, INCORRECT, or UNCERTAIN\n\
         2. reason: Brief explanation (<=30 words)\n\
         3. evidence_needed: true if more evidence would help verify\n\
         4. confidence: 0.0-1.0 (your confidence in this verdict)\n\n\
         Return ONLY valid JSON with this structure:\n\
         {{\n\
           \"reviews\": [\n\
             {{\n\
               \"claim_id\": \"claim_0\",\n\
               \"verdict\": \"CORRECT\",\n\
               \"reason\": \"Brief justification\",\n\
               \"evidence_needed\": false,\n\
               \"confidence\": 0.85\n\
             }}\n\
           ]\n\
         }}\n\n\
         IMPORTANT:\n\
         - Return ONLY the JSON object\n\
         - No explanations outside the JSON\n\
         - Review ALL claims provided\n\
         - Be objective and evidence-based"
    );
    json!({
        "prompt": format!("{}\n\n{}", REVIEWER_SYSTEM, user),
        "temperature": config.reviewer_temperature,
        "max_tokens": config.reviewer_max_tokens,
        "stop": ["</s>", "Original Question:", "Claims to review:"],
        "stream": false,
    })
}

fn format_opinions(opinions: &[Stage1Opinion]) -> String {
    opinions
        .iter()
        .enumerate()
        .map(|(idx, o)| format!("Expert {}: {}", idx + 1, o.answer_text))
        .collect::<Vec<_>>()
        .join("\n")
}

fn format_claims(claims: &[ParaphrasedClaim]) -> String {
    claims
        .iter()
        .map(|c| format!("- [{}] {}", c.claim_id, c.canonical_text))
        .collect::<Vec<_>>()
        .join("\n")
}

fn format_verdicts(verdicts: &[ReviewerVerdict]) -> String {
    let mut out = String::new();
    for verdict in verdicts {
        let _ = write!(out, "\n{}:", verdict.reviewer_name);
        for review in &verdict.reviews {
            let _ = write!(
                out,
                "\n  [{}] {} (confidence: {:.2}) - {}",
                review.claim_id, review.verdict, review.confidence, review.reason
            );
        }
    }
    out
}

/// The full chairman synthesis prompt: query, anonymized opinions, canonical
/// claims, per-reviewer verdicts, and the aggregation summary.
pub fn chairman_prompt(
    query: &str,
    opinions: &[Stage1Opinion],
    claims: &[ParaphrasedClaim],
    verdicts: &[ReviewerVerdict],
    aggregation: &Aggregation,
) -> String {
    format!(
        "{system}\n\n\
         Original Query: {query}\n\n\
         === INITIAL OPINIONS ===\n{opinions}\n\n\
         === CANONICAL CLAIMS ===\n{claims}\n\n\
         === PEER REVIEW VERDICTS ===\n{verdicts}\n\n\
         === AGGREGATION SUMMARY ===\n\
         Total claims: {total}\n\
         Supported (CORRECT): {supported}\n\
         Rejected (INCORRECT): {rejected}\n\
         Uncertain: {uncertain}\n\
         Disputed: {disputed}\n\
         Consensus score: {consensus}\n\n\
         === YOUR TASK ===\n\
         Synthesize a final answer to the original query based on the evidence above.\n\n\
         Return ONLY valid JSON with this structure:\n\
         {{\n\
           \"final_answer\": \"Your comprehensive final answer (3-6 sentences). Base this ONLY on supported claims. Acknowledge uncertainties.\",\n\
           \"supporting_claims\": [\"Claim 1 that supports the answer\"],\n\
           \"uncertain_points\": [\"Point 1 that needs more evidence\"],\n\
           \"rejected_claims\": [\"Claim 1 that was marked incorrect\"],\n\
           \"citations\": [{{\"source\": \"Source name\", \"url\": \"https://...\", \"snippet\": \"Quote\"}}],\n\
           \"confidence\": 0.85,\n\
           \"reasoning_summary\": \"Brief summary of your reasoning process (2-3 sentences)\"\n\
         }}\n\n\
         IMPORTANT:\n\
         - final_answer: 3-6 sentences, comprehensive but concise\n\
         - confidence: 0.0-1.0 based on consensus and evidence quality\n\
         - Include ALL categories even if empty lists\n\
         - Return ONLY valid JSON, no other text\n\
         - Be objective and evidence-based",
        system = CHAIRMAN_SYSTEM,
        query = query,
        opinions = format_opinions(opinions),
        claims = format_claims(claims),
        verdicts = format_verdicts(verdicts),
        total = aggregation.total_claims,
        supported = aggregation.supported_claims.len(),
        rejected = aggregation.rejected_claims.len(),
        uncertain = aggregation.uncertain_claims.len(),
        disputed = aggregation.disputed_claims.len(),
        consensus = aggregation.consensus_score,
    )
}
