//! Analysis triggering
//!
//! Creates a pending job synchronously and runs the pipeline as a supervised
//! background task. A panic inside the pipeline is caught and routed to the
//! same failure path as any other fatal error, so a job never stays in a
//! non-terminal state because its task died.

use super::errors::PipelineError;
use super::pipeline::AnalysisPipeline;
use futures::FutureExt;
use repodoc_core::{
    not_found_error, AnalysisJob, JobStatus, RepodocResult, RepositoryAnalysisStatus,
};
use repodoc_repo::ApiClientFactory;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::info;

/// A triggered analysis
pub struct AnalysisHandle {
    pub analysis_id: String,
    /// Resolves to the job's terminal status
    pub task: JoinHandle<JobStatus>,
}

pub struct AnalysisManager {
    pipeline: Arc<AnalysisPipeline>,
    sources: Arc<dyn ApiClientFactory>,
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

impl AnalysisManager {
    pub fn new(pipeline: AnalysisPipeline, sources: Arc<dyn ApiClientFactory>) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
            sources,
        }
    }

    /// Start analysing `repository_id` on behalf of `user_id`.
    ///
    /// Returns as soon as the pending job exists; progress and outcome are
    /// observable through the job store and the notification channel.
    pub async fn trigger(
        &self,
        repository_id: &str,
        user_id: &str,
        credential: Option<String>,
    ) -> RepodocResult<AnalysisHandle> {
        let repository = self
            .pipeline
            .repositories()
            .load_repository(repository_id)
            .await?
            .ok_or_else(|| not_found_error!(format!("repository {}", repository_id), "analysis_manager"))?;
        let source = self.sources.create_client(credential)?;

        let job = AnalysisJob::new(&repository.id, user_id, &repository.default_branch);
        self.pipeline.jobs().create_job(&job).await?;
        if let Err(e) = self
            .pipeline
            .repositories()
            .update_analysis_status(&repository.id, RepositoryAnalysisStatus::Analyzing)
            .await
        {
            // no task will run this job
            let failure = PipelineError::Persistence(e);
            self.pipeline
                .fail(&job.id, &repository.id, user_id, &failure)
                .await;
            return Err(failure.into());
        }

        info!(
            analysis_id = %job.id,
            repository = %repository.full_name,
            branch = %job.branch,
            "Analysis triggered"
        );

        let analysis_id = job.id.clone();
        let pipeline = self.pipeline.clone();
        let task = tokio::spawn(async move {
            let outcome = AssertUnwindSafe(pipeline.run(&job, &repository, source))
                .catch_unwind()
                .await;
            match outcome {
                Ok(status) => status,
                Err(payload) => {
                    let failure = PipelineError::internal(format!(
                        "Analysis task panicked: {}",
                        panic_message(payload.as_ref())
                    ));
                    pipeline
                        .fail(&job.id, &repository.id, &job.user_id, &failure)
                        .await;
                    JobStatus::Failed
                }
            }
        });

        Ok(AnalysisHandle { analysis_id, task })
    }

    /// The persisted state of an analysis
    pub async fn status(&self, analysis_id: &str) -> RepodocResult<AnalysisJob> {
        self.pipeline
            .jobs()
            .load_job(analysis_id)
            .await?
            .ok_or_else(|| not_found_error!(format!("analysis job {}", analysis_id), "analysis_manager"))
    }

    /// Analyses of a repository, newest first
    pub async fn history(&self, repository_id: &str) -> RepodocResult<Vec<AnalysisJob>> {
        self.pipeline.jobs().list_jobs(repository_id).await
    }
}
