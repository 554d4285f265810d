//! # Council Pipeline
//!
//! A staged, partially parallel, partial-failure-tolerant orchestrator that
//! answers a natural-language query by running a five-stage "council" of
//! heterogeneous LLM backends and synthesizing a single evidence-graded
//! answer.
//!
//! ## Stages
//!
//! 1. **Stage-1 opinions** — enabled models answer the query in parallel;
//!    each response is parsed into `(answer_text, claims, citations)`.
//! 2. **Paraphrase** — each answer is reduced to atomic canonical claims
//!    with deterministic ids.
//! 3. **Review** — independent reviewers judge the full anonymized claim
//!    list, one verdict per claim.
//! 4. **Aggregation** — a pure reduction buckets claims into
//!    supported/rejected/disputed/uncertain and scores cross-reviewer
//!    consensus.
//! 5. **Chairman** — a generative backend synthesizes the final answer, with
//!    a deterministic fallback when it is unavailable.
//!
//! Per-model failures degrade locally (raw-text opinions, sentence-split
//! claims, uncertain reviews, chairman fallback); a stage only fails when
//! every one of its required models does.
//!
//! ## Quick Start
//!
//! ```no_run
//! use council_pipeline::{CouncilConfig, CouncilOrchestrator, QueryOptions};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let orchestrator = CouncilOrchestrator::new(CouncilConfig::default());
//!
//!     let result = orchestrator
//!         .run(
//!             "What is the capital of France?",
//!             &QueryOptions::default(),
//!             "req-1",
//!         )
//!         .await?;
//!
//!     println!("{}", result.final_answer.final_answer);
//!     println!("consensus: {}", result.aggregation.consensus_score);
//!     Ok(())
//! }
//! ```
//!
//! ## Testing
//!
//! [`MockBackend`](backend::MockBackend) replays scripted outcomes and
//! records calls, so full pipelines can run without live model servers — see
//! [`CouncilOrchestrator::from_parts`].

pub mod aggregate;
pub mod backend;
pub mod cache;
pub mod chairman;
pub mod config;
pub mod error;
pub mod health;
pub mod invoker;
pub mod orchestrator;
pub mod paraphrase;
pub mod prompts;
pub mod recover;
pub mod review;
pub mod stage1;
pub mod stats;
pub mod types;

pub use backend::{BackoffConfig, ChatBackend, CompletionBackend, HostedBackend, MockBackend};
pub use cache::{CacheStats, ResponseCache};
pub use config::CouncilConfig;
pub use error::{CouncilError, ErrorReport, Result};
pub use health::{HealthReport, HealthStatus, ProbeStatus};
pub use invoker::Invoker;
pub use orchestrator::{CouncilOrchestrator, CouncilParts};
pub use stats::Statistics;
pub use types::{
    Aggregation, Citation, FinalAnswer, ParaphrasedClaim, PipelineMetadata, PipelineResult,
    QueryOptions, ReviewItem, ReviewerVerdict, Stage1Opinion, StageTiming, Verdict,
};
