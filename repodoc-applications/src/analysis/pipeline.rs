//! Pipeline orchestrator
//!
//! Drives one analysis job through fetching, cloning, fragmenting, analyzing
//! and generating. Entering a step persists a checkpoint on the job and
//! publishes a progress event to the job's owner. Any fatal error marks the
//! job and its repository failed; success records the repository summary and
//! marks the job completed.

use super::errors::{PipelineError, PipelineResult};
use super::export::write_analysis_file;
use super::storage::{JobResults, JobStore, RepositoryStore};
use async_trait::async_trait;
use chrono::Utc;
use repodoc_analysis::{aggregate, compile_analysis_text, ChunkAnalyzer, Fragmenter, OverviewGenerator};
use repodoc_core::performance::{measure_async, measure_sync};
use repodoc_core::{
    log_operation_error, log_operation_start, log_operation_success, storage_error,
    AnalysisClient, AnalysisConfig, AnalysisEvent, AnalysisJob, AnalysisStep, FileRecord,
    JobStatus, NotificationChannel, ProgressSink, ProjectContext, RepodocConfig, RepodocResult,
    Repository, RepositoryAnalysisStatus, RepositoryConfig, Statistics,
};
use repodoc_repo::{ContentFetcher, FileFilter, RepositoryApiClient, ResolvedRepository};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Overall percentage when the analyzing step starts
const ANALYZING_START: u8 = 60;
/// Share of the overall percentage covered by chunk progress
const ANALYZING_SPAN: u16 = 25;

/// Persists checkpoints for one job and mirrors them as progress events
struct Checkpoints<'a> {
    jobs: &'a dyn JobStore,
    notifier: &'a dyn NotificationChannel,
    analysis_id: &'a str,
    user_id: &'a str,
}

impl Checkpoints<'_> {
    async fn enter(&self, step: AnalysisStep, percentage: u8, message: &str) -> RepodocResult<()> {
        self.jobs
            .update_progress(self.analysis_id, step, percentage, message)
            .await?;
        info!(analysis_id = %self.analysis_id, step = %step, percentage, "{}", message);

        self.notifier.publish(
            self.user_id,
            AnalysisEvent::Progress {
                analysis_id: self.analysis_id.to_string(),
                step,
                percentage,
                message: message.to_string(),
            },
        );
        Ok(())
    }
}

/// Maps chunk-local progress into the analyzing share of the job
struct ChunkProgress<'a>(&'a Checkpoints<'a>);

#[async_trait]
impl ProgressSink for ChunkProgress<'_> {
    async fn report(&self, step: AnalysisStep, percentage: u8, message: &str) -> RepodocResult<()> {
        let local = u16::from(percentage.min(100));
        let overall = ANALYZING_START + (local * ANALYZING_SPAN / 100) as u8;
        self.0
            .enter(step, overall, message)
            .await
            .map_err(|e| storage_error!("Failed to persist chunk progress", "analysis_pipeline", e))
    }
}

pub struct AnalysisPipeline {
    jobs: Arc<dyn JobStore>,
    repositories: Arc<dyn RepositoryStore>,
    notifier: Arc<dyn NotificationChannel>,
    client: Arc<dyn AnalysisClient>,
    repository_config: RepositoryConfig,
    analysis_config: AnalysisConfig,
    analysis_dir: Option<PathBuf>,
}

impl AnalysisPipeline {
    pub fn new(
        jobs: Arc<dyn JobStore>,
        repositories: Arc<dyn RepositoryStore>,
        notifier: Arc<dyn NotificationChannel>,
        client: Arc<dyn AnalysisClient>,
        config: &RepodocConfig,
    ) -> Self {
        Self {
            jobs,
            repositories,
            notifier,
            client,
            repository_config: config.repository.clone(),
            analysis_config: config.analysis.clone(),
            analysis_dir: config.storage.analysis_dir.clone(),
        }
    }

    pub fn jobs(&self) -> &Arc<dyn JobStore> {
        &self.jobs
    }

    pub fn repositories(&self) -> &Arc<dyn RepositoryStore> {
        &self.repositories
    }

    /// Run `job` to a terminal state and return that state.
    ///
    /// Never returns an error: failures are persisted on the job and
    /// published to its owner.
    pub async fn run(
        &self,
        job: &AnalysisJob,
        repository: &Repository,
        source: Arc<dyn RepositoryApiClient>,
    ) -> JobStatus {
        log_operation_start!(
            "repository_analysis",
            analysis_id = %job.id,
            repository = %repository.full_name,
            branch = %job.branch
        );

        let result = match self.execute(job, repository, source).await {
            Ok(statistics) => self.complete(job, repository, &statistics).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(()) => {
                log_operation_success!("repository_analysis", analysis_id = %job.id);
                JobStatus::Completed
            }
            Err(e) => {
                self.fail(&job.id, &repository.id, &job.user_id, &e).await;
                JobStatus::Failed
            }
        }
    }

    /// Mark the job and its repository failed and notify the owner
    pub async fn fail(
        &self,
        analysis_id: &str,
        repository_id: &str,
        user_id: &str,
        failure: &PipelineError,
    ) {
        log_operation_error!(
            "repository_analysis",
            failure,
            analysis_id = %analysis_id,
            category = failure.category()
        );

        let message = failure.to_string();
        if let Err(e) = self
            .jobs
            .mark_failed(analysis_id, &message, Some(&failure.detail()))
            .await
        {
            error!(analysis_id, error = %e, "Failed to record analysis failure");
        }
        if let Err(e) = self
            .repositories
            .update_analysis_status(repository_id, RepositoryAnalysisStatus::Failed)
            .await
        {
            error!(repository_id, error = %e, "Failed to mark repository as failed");
        }

        self.notifier.publish(
            user_id,
            AnalysisEvent::Failed {
                analysis_id: analysis_id.to_string(),
                repository_id: repository_id.to_string(),
                error: message,
            },
        );
    }

    async fn execute(
        &self,
        job: &AnalysisJob,
        repository: &Repository,
        source: Arc<dyn RepositoryApiClient>,
    ) -> PipelineResult<Statistics> {
        let checkpoints = Checkpoints {
            jobs: self.jobs.as_ref(),
            notifier: self.notifier.as_ref(),
            analysis_id: &job.id,
            user_id: &job.user_id,
        };
        let mut durations = BTreeMap::new();
        let filter =
            FileFilter::from_config(&self.repository_config).with_settings(&repository.settings);
        let fetcher = ContentFetcher::new(source, filter);

        checkpoints
            .enter(AnalysisStep::Fetching, 10, "Fetching repository information...")
            .await
            .map_err(PipelineError::Persistence)?;
        let (resolved, ms) = measure_async(
            "fetching",
            fetcher.resolve(&repository.owner, &repository.name, Some(job.branch.as_str())),
        )
        .await;
        durations.insert(AnalysisStep::Fetching, ms);
        let resolved = resolved.map_err(PipelineError::Fetch)?;
        self.jobs
            .record_commit(&job.id, &resolved.branch.commit_sha)
            .await
            .map_err(PipelineError::Persistence)?;

        checkpoints
            .enter(AnalysisStep::Cloning, 25, "Downloading repository files...")
            .await
            .map_err(PipelineError::Persistence)?;
        let (downloaded, ms) = measure_async("cloning", fetcher.download(&resolved)).await;
        durations.insert(AnalysisStep::Cloning, ms);
        let downloaded = downloaded.map_err(PipelineError::Fetch)?;
        let files: Vec<FileRecord> = downloaded.files.iter().map(|f| f.record.clone()).collect();
        self.jobs
            .record_files(&job.id, &files)
            .await
            .map_err(PipelineError::Persistence)?;

        checkpoints
            .enter(AnalysisStep::Fragmenting, 40, "Breaking down files into chunks...")
            .await
            .map_err(PipelineError::Persistence)?;
        let fragmenter = Fragmenter::new(self.analysis_config.max_tokens_per_chunk).map_err(|e| {
            PipelineError::Internal {
                message: "Invalid chunk token budget".to_string(),
                source: Some(e),
            }
        })?;
        let (chunks, ms) = measure_sync("fragmenting", || {
            fragmenter.fragment(
                &job.id,
                downloaded
                    .files
                    .iter()
                    .map(|f| (&f.record, f.content.as_str())),
            )
        });
        durations.insert(AnalysisStep::Fragmenting, ms);
        let chunks = chunks.map_err(PipelineError::InvalidRecord)?;
        self.jobs
            .record_chunks(&job.id, &chunks)
            .await
            .map_err(PipelineError::Persistence)?;

        checkpoints
            .enter(AnalysisStep::Analyzing, ANALYZING_START, "Analyzing code with AI...")
            .await
            .map_err(PipelineError::Persistence)?;
        let context = project_context(repository, &resolved);
        let analyzer = ChunkAnalyzer::new(self.client.clone(), &self.analysis_config);
        let (report, ms) = measure_async(
            "analyzing",
            analyzer.analyze(chunks, &context, &ChunkProgress(&checkpoints)),
        )
        .await;
        durations.insert(AnalysisStep::Analyzing, ms);
        let report = report.map_err(PipelineError::from_analysis)?;
        self.jobs
            .record_chunks(&job.id, &report.chunks)
            .await
            .map_err(PipelineError::Persistence)?;

        let statistics = aggregate(&files, &report.chunks).map_err(PipelineError::InvalidRecord)?;

        checkpoints
            .enter(AnalysisStep::Generating, 90, "Generating project overview...")
            .await
            .map_err(PipelineError::Persistence)?;
        let analysis_text = compile_analysis_text(&report.chunks);
        let generator = OverviewGenerator::new(
            self.client.clone(),
            self.analysis_config.request_timeout_ms,
            self.analysis_config.generate_overview,
        );
        let (overview, ms) = measure_async("generating", generator.generate(&context, &analysis_text)).await;
        durations.insert(AnalysisStep::Generating, ms);

        if let Some(dir) = &self.analysis_dir {
            if let Err(e) =
                write_analysis_file(dir, &repository.owner, &repository.name, &analysis_text).await
            {
                warn!(analysis_id = %job.id, error = %e, "Failed to write analysis file");
            }
        }

        let mut usage = report.usage;
        usage.merge(overview.usage);
        let results = JobResults {
            statistics: statistics.clone(),
            overview: overview.state,
            usage,
            step_durations: durations,
        };
        self.jobs
            .record_results(&job.id, &results)
            .await
            .map_err(PipelineError::Persistence)?;

        info!(
            analysis_id = %job.id,
            files = statistics.total_files,
            chunks = statistics.total_chunks,
            failed_chunks = statistics.failed_chunks,
            tokens_used = usage.tokens_used,
            api_calls = usage.api_calls,
            "Analysis stages finished"
        );
        Ok(statistics)
    }

    async fn complete(
        &self,
        job: &AnalysisJob,
        repository: &Repository,
        statistics: &Statistics,
    ) -> PipelineResult<()> {
        self.repositories
            .record_analysis_summary(
                &repository.id,
                Utc::now(),
                statistics.total_files,
                statistics.total_lines,
            )
            .await
            .map_err(PipelineError::Persistence)?;
        self.jobs
            .mark_completed(&job.id)
            .await
            .map_err(PipelineError::Persistence)?;

        self.notifier.publish(
            &job.user_id,
            AnalysisEvent::Completed {
                analysis_id: job.id.clone(),
                repository_id: repository.id.clone(),
                success: true,
            },
        );
        Ok(())
    }
}

/// Stored repository details, completed from the host's metadata
fn project_context(repository: &Repository, resolved: &ResolvedRepository) -> ProjectContext {
    ProjectContext {
        full_name: resolved.metadata.full_name.clone(),
        description: repository
            .description
            .clone()
            .or_else(|| resolved.metadata.description.clone()),
        language: repository
            .language
            .clone()
            .or_else(|| resolved.metadata.language.clone()),
    }
}
