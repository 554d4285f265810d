//! The pipeline driver.
//!
//! [`CouncilOrchestrator`] owns the stage services, the shared HTTP client,
//! the response cache, and the statistics counters, and sequences the five
//! stages for each request. It is invoked as a library by the HTTP host:
//! `run`, `check_health`, `statistics`, `clear_cache`.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use futures::future::join_all;
use reqwest::Client;
use tracing::{error, info};

use crate::backend::{ChatBackend, CompletionBackend, HostedBackend, ModelBackend};
use crate::cache::ResponseCache;
use crate::chairman::ChairmanService;
use crate::config::CouncilConfig;
use crate::error::Result;
use crate::health::{rollup, HealthReport, ModelProbe, ProbeStatus};
use crate::invoker::Invoker;
use crate::paraphrase::ParaphraseService;
use crate::review::ReviewerService;
use crate::stage1::{OpinionPayload, Stage1Member, Stage1Service};
use crate::stats::{Statistics, StatsCounters};
use crate::types::{
    validate_query, PipelineMetadata, PipelineResult, QueryOptions, StageTiming,
};

/// Model labels, one per council seat. Claim ids derive from the Stage-1
/// labels (lowercased), so these are part of the wire-visible contract.
pub const STAGE1_LOCAL: &str = "Stage1-Local";
pub const STAGE1_HOSTED: &str = "Stage1-Hosted";
pub const PARAPHRASE: &str = "Paraphrase";
pub const REVIEWER_A: &str = "Reviewer-A";
pub const REVIEWER_B: &str = "Reviewer-B";
pub const CHAIRMAN: &str = "Chairman";

/// Pre-built stage members for dependency injection (tests, custom hosts).
pub struct CouncilParts {
    pub stage1: Vec<Stage1Member>,
    pub paraphrase: Invoker,
    pub reviewers: Vec<Invoker>,
    pub chairman: Option<Invoker>,
}

/// Main orchestrator for the multi-model council pipeline.
///
/// Stages, in dependency order:
/// 1. Stage-1: independent first opinions (fan-out)
/// 2. Paraphrase: claim extraction
/// 3. Review: peer review of the shared claim list (fan-out)
/// 4. Aggregation: pure verdict reduction
/// 5. Chairman: final synthesis
pub struct CouncilOrchestrator {
    config: Arc<CouncilConfig>,
    client: Client,
    stage1: Stage1Service,
    paraphrase: ParaphraseService,
    reviewers: ReviewerService,
    chairman: ChairmanService,
    cache: ResponseCache,
    stats: StatsCounters,
    probes: Vec<(String, Arc<dyn ModelBackend>)>,
    models_used: Vec<String>,
}

impl CouncilOrchestrator {
    /// Wire up the production backends from configuration.
    ///
    /// Every configured backend gets a health probe regardless of its enable
    /// flag; only enabled backends participate in the pipeline.
    pub fn new(config: CouncilConfig) -> Self {
        let remote_backoff = config.transport_backoff();

        let local: Arc<dyn ModelBackend> = Arc::new(CompletionBackend::new(
            STAGE1_LOCAL,
            config.stage1_local_url.as_str(),
        ));
        let hosted: Arc<dyn ModelBackend> = Arc::new(HostedBackend::new(
            STAGE1_HOSTED,
            config.hosted_api_url.as_str(),
            config.hosted_model.as_str(),
            config.hosted_api_token.as_str(),
        ));
        let paraphrase: Arc<dyn ModelBackend> = Arc::new(CompletionBackend::new(
            PARAPHRASE,
            config.paraphrase_url.as_str(),
        ));
        let reviewer_a: Arc<dyn ModelBackend> = Arc::new(CompletionBackend::new(
            REVIEWER_A,
            config.reviewer_a_url.as_str(),
        ));
        let reviewer_b: Arc<dyn ModelBackend> = Arc::new(CompletionBackend::new(
            REVIEWER_B,
            config.reviewer_b_url.as_str(),
        ));
        let chairman: Arc<dyn ModelBackend> = Arc::new(ChatBackend::new(
            CHAIRMAN,
            config.chat_api_url.as_str(),
            config.chat_model.as_str(),
            config.chat_api_key.as_str(),
            config.chat_temperature,
            config.chat_max_tokens,
        ));

        let mut stage1 = Vec::new();
        if config.enable_stage1_local {
            stage1.push(Stage1Member::new(
                Invoker::new(STAGE1_LOCAL, local.clone())
                    .with_call_timeout(config.local_model_timeout),
                OpinionPayload::Completion,
            ));
        }
        if config.enable_stage1_hosted {
            stage1.push(Stage1Member::new(
                Invoker::new(STAGE1_HOSTED, hosted.clone())
                    .with_backoff(remote_backoff.clone())
                    .with_call_timeout(config.request_timeout),
                OpinionPayload::Hosted,
            ));
        }

        let mut reviewers = Vec::new();
        if config.enable_reviewer_a {
            reviewers.push(
                Invoker::new(REVIEWER_A, reviewer_a.clone())
                    .with_call_timeout(config.local_model_timeout),
            );
        }
        if config.enable_reviewer_b {
            reviewers.push(
                Invoker::new(REVIEWER_B, reviewer_b.clone())
                    .with_call_timeout(config.local_model_timeout),
            );
        }

        let parts = CouncilParts {
            stage1,
            paraphrase: Invoker::new(PARAPHRASE, paraphrase.clone())
                .with_call_timeout(config.local_model_timeout),
            reviewers,
            chairman: config.enable_chairman.then(|| {
                Invoker::new(CHAIRMAN, chairman.clone())
                    .with_backoff(remote_backoff)
                    .with_call_timeout(config.request_timeout)
            }),
        };

        let probes = vec![
            (STAGE1_LOCAL.to_string(), local),
            (STAGE1_HOSTED.to_string(), hosted),
            (PARAPHRASE.to_string(), paraphrase),
            (REVIEWER_A.to_string(), reviewer_a),
            (REVIEWER_B.to_string(), reviewer_b),
            (CHAIRMAN.to_string(), chairman),
        ];

        Self::assemble(config, parts, probes)
    }

    /// Wire up from pre-built stage members. Health probes cover exactly the
    /// provided backends.
    pub fn from_parts(config: CouncilConfig, parts: CouncilParts) -> Self {
        let mut probes: Vec<(String, Arc<dyn ModelBackend>)> = Vec::new();
        for member in &parts.stage1 {
            probes.push((
                member.invoker.label().to_string(),
                member.invoker.backend().clone(),
            ));
        }
        probes.push((
            parts.paraphrase.label().to_string(),
            parts.paraphrase.backend().clone(),
        ));
        for reviewer in &parts.reviewers {
            probes.push((reviewer.label().to_string(), reviewer.backend().clone()));
        }
        if let Some(chairman) = &parts.chairman {
            probes.push((chairman.label().to_string(), chairman.backend().clone()));
        }

        Self::assemble(config, parts, probes)
    }

    fn assemble(
        config: CouncilConfig,
        parts: CouncilParts,
        probes: Vec<(String, Arc<dyn ModelBackend>)>,
    ) -> Self {
        let mut models_used: Vec<String> = parts
            .stage1
            .iter()
            .map(|m| m.invoker.label().to_string())
            .collect();
        models_used.push(parts.paraphrase.label().to_string());
        models_used.extend(parts.reviewers.iter().map(|r| r.label().to_string()));
        if let Some(chairman) = &parts.chairman {
            models_used.push(chairman.label().to_string());
        }

        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .expect("failed to build HTTP client");
        let cache = ResponseCache::new(config.enable_cache, config.cache_ttl, &config.cache_dir);
        let config = Arc::new(config);

        info!(models = ?models_used, "council orchestrator initialized");

        Self {
            stage1: Stage1Service::new(parts.stage1, config.clone()),
            paraphrase: ParaphraseService::new(parts.paraphrase, config.clone()),
            reviewers: ReviewerService::new(parts.reviewers, config.clone()),
            chairman: ChairmanService::new(parts.chairman),
            cache,
            stats: StatsCounters::new(),
            probes,
            models_used,
            client,
            config,
        }
    }

    /// Run the complete pipeline for one query.
    pub async fn run(
        &self,
        query: &str,
        options: &QueryOptions,
        request_id: &str,
    ) -> Result<PipelineResult> {
        let started = Instant::now();
        self.stats.record_started();

        match self.run_inner(query, options, request_id, started).await {
            Ok(result) => Ok(result),
            Err(err) => {
                self.stats.record_failure();
                error!(request_id, error = %err, "pipeline failed");
                Err(err)
            }
        }
    }

    async fn run_inner(
        &self,
        query: &str,
        options: &QueryOptions,
        request_id: &str,
        started: Instant,
    ) -> Result<PipelineResult> {
        let query = validate_query(query)?;

        if options.use_cache {
            if let Some(mut cached) = self.cache.get(&query, options).await {
                self.stats.record_cache_hit();
                info!(request_id, "returning cached response");
                cached.metadata.cache_hit = true;
                return Ok(cached);
            }
        }

        let budget = Duration::from_secs(options.timeout).min(self.config.request_timeout);
        let deadline = started + budget;
        let mut stage_timings = Vec::new();

        let stage_started = Instant::now();
        let stage1_opinions = self
            .stage1
            .first_opinions(&self.client, &query, options, deadline)
            .await?;
        push_timing(&mut stage_timings, request_id, "stage1", stage_started);

        let stage_started = Instant::now();
        let paraphrased_claims = self
            .paraphrase
            .extract_claims(&self.client, &stage1_opinions, deadline)
            .await;
        push_timing(&mut stage_timings, request_id, "paraphrase", stage_started);

        let stage_started = Instant::now();
        let reviewer_verdicts = self
            .reviewers
            .review_claims(&self.client, &query, &paraphrased_claims, options, deadline)
            .await?;
        push_timing(&mut stage_timings, request_id, "review", stage_started);

        let stage_started = Instant::now();
        let aggregation = crate::aggregate::aggregate(&paraphrased_claims, &reviewer_verdicts);
        push_timing(&mut stage_timings, request_id, "aggregation", stage_started);

        let stage_started = Instant::now();
        let final_answer = self
            .chairman
            .synthesize(
                &self.client,
                &query,
                &stage1_opinions,
                &paraphrased_claims,
                &reviewer_verdicts,
                &aggregation,
                deadline,
            )
            .await;
        push_timing(&mut stage_timings, request_id, "chairman", stage_started);

        let processing_time = started.elapsed().as_secs_f64();
        let result = PipelineResult {
            query: query.clone(),
            stage1_opinions,
            paraphrased_claims,
            reviewer_verdicts,
            aggregation,
            final_answer,
            metadata: PipelineMetadata {
                request_id: request_id.to_string(),
                processing_time,
                models_used: self.models_used.clone(),
                cache_hit: false,
                errors: Vec::new(),
                warnings: Vec::new(),
                stage_timings,
                timestamp: Utc::now().to_rfc3339(),
                cached_at: None,
            },
        };

        if options.use_cache {
            self.cache.set(&query, options, &result).await;
        }

        self.stats.record_success(processing_time);
        Ok(result)
    }

    /// Probe every configured backend concurrently and roll up the results.
    pub async fn check_health(&self) -> HealthReport {
        let futures = self.probes.iter().map(|(name, backend)| async move {
            let status = if backend.health(&self.client).await {
                ProbeStatus::Online
            } else {
                ProbeStatus::Offline
            };
            ModelProbe {
                name: name.clone(),
                status,
            }
        });
        rollup(join_all(futures).await)
    }

    /// Process-lifetime statistics plus current cache stats.
    pub async fn statistics(&self) -> Statistics {
        self.stats.snapshot(self.cache.stats().await)
    }

    /// Drop every cached response.
    pub async fn clear_cache(&self) {
        self.cache.clear().await;
    }

    /// Enabled models in flag order.
    pub fn models_used(&self) -> &[String] {
        &self.models_used
    }
}

fn push_timing(timings: &mut Vec<StageTiming>, request_id: &str, stage: &str, started: Instant) {
    let seconds = started.elapsed().as_secs_f64();
    info!(request_id, stage, seconds, "stage completed");
    timings.push(StageTiming {
        stage: stage.to_string(),
        seconds,
    });
}
