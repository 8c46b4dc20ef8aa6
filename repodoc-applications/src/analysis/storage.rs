//! Analysis storage backends
//!
//! Durable records for analysis jobs and the repositories they belong to,
//! with in-memory and SQLite implementations. Every job update is a scoped
//! partial update; jobs in a terminal state reject all further updates.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use repodoc_core::{
    not_found_error, AnalysisJob, AnalysisStep, ChunkRecord, FileRecord, JobError, JobStatus,
    OverviewState, RepodocResult, Repository, RepositoryAnalysisStatus, Statistics, UsageStats,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// Results recorded once the analysis stages have finished
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobResults {
    pub statistics: Statistics,
    pub overview: OverviewState,
    pub usage: UsageStats,
    pub step_durations: BTreeMap<AnalysisStep, u64>,
}

/// Persistence for analysis jobs
#[async_trait]
pub trait JobStore: Send + Sync {
    async fn create_job(&self, job: &AnalysisJob) -> RepodocResult<()>;

    async fn load_job(&self, id: &str) -> RepodocResult<Option<AnalysisJob>>;

    /// Jobs of a repository, newest first
    async fn list_jobs(&self, repository_id: &str) -> RepodocResult<Vec<AnalysisJob>>;

    /// Persist a checkpoint. Moves a pending job to processing.
    async fn update_progress(
        &self,
        id: &str,
        step: AnalysisStep,
        percentage: u8,
        message: &str,
    ) -> RepodocResult<()>;

    async fn record_commit(&self, id: &str, commit_sha: &str) -> RepodocResult<()>;

    async fn record_files(&self, id: &str, files: &[FileRecord]) -> RepodocResult<()>;

    async fn record_chunks(&self, id: &str, chunks: &[ChunkRecord]) -> RepodocResult<()>;

    async fn record_results(&self, id: &str, results: &JobResults) -> RepodocResult<()>;

    async fn mark_completed(&self, id: &str) -> RepodocResult<()>;

    /// Fail the job at its current step
    async fn mark_failed(&self, id: &str, message: &str, detail: Option<&str>)
        -> RepodocResult<()>;
}

/// Persistence for repositories
#[async_trait]
pub trait RepositoryStore: Send + Sync {
    async fn save_repository(&self, repository: &Repository) -> RepodocResult<()>;

    async fn load_repository(&self, id: &str) -> RepodocResult<Option<Repository>>;

    /// Look a repository up by `owner/name`
    async fn find_repository(&self, full_name: &str) -> RepodocResult<Option<Repository>>;

    async fn update_analysis_status(
        &self,
        id: &str,
        status: RepositoryAnalysisStatus,
    ) -> RepodocResult<()>;

    /// Record the outcome of a completed analysis and mark the repository completed
    async fn record_analysis_summary(
        &self,
        id: &str,
        last_analyzed: DateTime<Utc>,
        file_count: usize,
        total_lines: usize,
    ) -> RepodocResult<()>;
}

/// A scoped update to one job
pub(crate) enum JobUpdate<'a> {
    Progress {
        step: AnalysisStep,
        percentage: u8,
        message: &'a str,
    },
    Commit(&'a str),
    Files(&'a [FileRecord]),
    Chunks(&'a [ChunkRecord]),
    Results(&'a JobResults),
    Completed,
    Failed {
        message: &'a str,
        detail: Option<&'a str>,
    },
}

fn finish_timing(job: &mut AnalysisJob, now: DateTime<Utc>) {
    job.performance.end_time = Some(now);
    let elapsed = (now - job.performance.start_time).num_milliseconds().max(0);
    job.performance.total_duration_ms = Some(elapsed as u64);
}

pub(crate) fn check_percentage(percentage: u8) -> RepodocResult<()> {
    if percentage > 100 {
        return Err(repodoc_core::validation_error!(
            format!("Progress percentage {} is out of range", percentage),
            "percentage",
            "job_store"
        ));
    }
    Ok(())
}

fn terminal_job(id: &str, status: JobStatus) -> repodoc_core::RepodocError {
    repodoc_core::validation_error!(
        format!(
            "Analysis job {} is {} and can no longer change",
            id,
            status.as_str()
        ),
        "status",
        "job_store"
    )
}

/// Apply `update` to `job`, enforcing terminal-state immutability
pub(crate) fn apply_update(job: &mut AnalysisJob, update: JobUpdate<'_>) -> RepodocResult<()> {
    if job.status.is_terminal() {
        return Err(terminal_job(&job.id, job.status));
    }

    let now = Utc::now();
    match update {
        JobUpdate::Progress {
            step,
            percentage,
            message,
        } => {
            check_percentage(percentage)?;
            if job.status == JobStatus::Pending {
                job.status = JobStatus::Processing;
            }
            job.progress.current_step = step;
            job.progress.percentage = percentage;
            job.progress.message = Some(message.to_string());
        }
        JobUpdate::Commit(commit_sha) => job.commit_sha = Some(commit_sha.to_string()),
        JobUpdate::Files(files) => job.files = files.to_vec(),
        JobUpdate::Chunks(chunks) => job.chunks = chunks.to_vec(),
        JobUpdate::Results(results) => {
            job.statistics = Some(results.statistics.clone());
            job.overview = results.overview.clone();
            job.performance.tokens_used = results.usage.tokens_used;
            job.performance.api_calls = results.usage.api_calls;
            job.performance
                .step_durations
                .extend(results.step_durations.iter().map(|(k, v)| (*k, *v)));
        }
        JobUpdate::Completed => {
            job.status = JobStatus::Completed;
            job.progress.percentage = 100;
            job.progress.message = Some("Analysis completed".to_string());
            finish_timing(job, now);
        }
        JobUpdate::Failed { message, detail } => {
            job.status = JobStatus::Failed;
            job.error = Some(JobError {
                message: message.to_string(),
                detail: detail.map(str::to_string),
                step: job.progress.current_step,
                timestamp: now,
            });
            finish_timing(job, now);
        }
    }
    job.updated_at = now;
    Ok(())
}

fn missing_job(id: &str) -> repodoc_core::RepodocError {
    not_found_error!(format!("analysis job {}", id), "job_store")
}

fn missing_repository(id: &str) -> repodoc_core::RepodocError {
    not_found_error!(format!("repository {}", id), "repository_store")
}

/// In-memory job storage
#[derive(Clone, Default)]
pub struct MemoryJobStore {
    jobs: Arc<RwLock<HashMap<String, AnalysisJob>>>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    async fn update(&self, id: &str, update: JobUpdate<'_>) -> RepodocResult<()> {
        let mut jobs = self.jobs.write().await;
        let job = jobs.get_mut(id).ok_or_else(|| missing_job(id))?;
        apply_update(job, update)
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn create_job(&self, job: &AnalysisJob) -> RepodocResult<()> {
        let mut jobs = self.jobs.write().await;
        jobs.insert(job.id.clone(), job.clone());
        debug!(analysis_id = %job.id, "Saved analysis job to memory storage");
        Ok(())
    }

    async fn load_job(&self, id: &str) -> RepodocResult<Option<AnalysisJob>> {
        Ok(self.jobs.read().await.get(id).cloned())
    }

    async fn list_jobs(&self, repository_id: &str) -> RepodocResult<Vec<AnalysisJob>> {
        let jobs = self.jobs.read().await;
        let mut matching: Vec<AnalysisJob> = jobs
            .values()
            .filter(|job| job.repository_id == repository_id)
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(matching)
    }

    async fn update_progress(
        &self,
        id: &str,
        step: AnalysisStep,
        percentage: u8,
        message: &str,
    ) -> RepodocResult<()> {
        self.update(
            id,
            JobUpdate::Progress {
                step,
                percentage,
                message,
            },
        )
        .await
    }

    async fn record_commit(&self, id: &str, commit_sha: &str) -> RepodocResult<()> {
        self.update(id, JobUpdate::Commit(commit_sha)).await
    }

    async fn record_files(&self, id: &str, files: &[FileRecord]) -> RepodocResult<()> {
        self.update(id, JobUpdate::Files(files)).await
    }

    async fn record_chunks(&self, id: &str, chunks: &[ChunkRecord]) -> RepodocResult<()> {
        self.update(id, JobUpdate::Chunks(chunks)).await
    }

    async fn record_results(&self, id: &str, results: &JobResults) -> RepodocResult<()> {
        self.update(id, JobUpdate::Results(results)).await
    }

    async fn mark_completed(&self, id: &str) -> RepodocResult<()> {
        self.update(id, JobUpdate::Completed).await
    }

    async fn mark_failed(
        &self,
        id: &str,
        message: &str,
        detail: Option<&str>,
    ) -> RepodocResult<()> {
        self.update(id, JobUpdate::Failed { message, detail }).await
    }
}

/// In-memory repository storage
#[derive(Clone, Default)]
pub struct MemoryRepositoryStore {
    repositories: Arc<RwLock<HashMap<String, Repository>>>,
}

impl MemoryRepositoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RepositoryStore for MemoryRepositoryStore {
    async fn save_repository(&self, repository: &Repository) -> RepodocResult<()> {
        let mut repositories = self.repositories.write().await;
        repositories.insert(repository.id.clone(), repository.clone());
        debug!(repository_id = %repository.id, "Saved repository to memory storage");
        Ok(())
    }

    async fn load_repository(&self, id: &str) -> RepodocResult<Option<Repository>> {
        Ok(self.repositories.read().await.get(id).cloned())
    }

    async fn find_repository(&self, full_name: &str) -> RepodocResult<Option<Repository>> {
        let repositories = self.repositories.read().await;
        Ok(repositories
            .values()
            .find(|repo| repo.full_name == full_name)
            .cloned())
    }

    async fn update_analysis_status(
        &self,
        id: &str,
        status: RepositoryAnalysisStatus,
    ) -> RepodocResult<()> {
        let mut repositories = self.repositories.write().await;
        let repository = repositories
            .get_mut(id)
            .ok_or_else(|| missing_repository(id))?;
        repository.analysis_status = status;
        Ok(())
    }

    async fn record_analysis_summary(
        &self,
        id: &str,
        last_analyzed: DateTime<Utc>,
        file_count: usize,
        total_lines: usize,
    ) -> RepodocResult<()> {
        let mut repositories = self.repositories.write().await;
        let repository = repositories
            .get_mut(id)
            .ok_or_else(|| missing_repository(id))?;
        repository.analysis_status = RepositoryAnalysisStatus::Completed;
        repository.last_analyzed = Some(last_analyzed);
        repository.file_count = file_count;
        repository.total_lines = total_lines;
        Ok(())
    }
}

/// SQLite storage for jobs and repositories
///
/// Indexed columns are kept next to a JSON `data` column holding the full
/// record. Checkpoints only touch the status and progress columns, which
/// take precedence over `data` when a job is read back. Every other update
/// runs inside a transaction: read, apply, write back.
#[cfg(feature = "sqlite")]
pub struct SqliteStore {
    pool: sqlx::SqlitePool,
}

#[cfg(feature = "sqlite")]
mod sqlite {
    use super::*;
    use repodoc_core::{storage_error, RepodocError};
    use serde::de::DeserializeOwned;
    use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection, SqlitePoolOptions, SqliteRow};
    use sqlx::Row;
    use std::str::FromStr;
    use tracing::{info, warn};

    const CREATE_JOBS_TABLE: &str = r#"
        CREATE TABLE IF NOT EXISTS analysis_jobs (
            id TEXT PRIMARY KEY NOT NULL,
            repository_id TEXT NOT NULL,
            user_id TEXT NOT NULL,
            status TEXT NOT NULL,
            current_step TEXT NOT NULL,
            percentage INTEGER NOT NULL,
            message TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            data TEXT NOT NULL
        )
    "#;

    const CREATE_JOBS_INDEX: &str =
        "CREATE INDEX IF NOT EXISTS idx_analysis_jobs_repository ON analysis_jobs (repository_id)";

    const CREATE_REPOSITORIES_TABLE: &str = r#"
        CREATE TABLE IF NOT EXISTS repositories (
            id TEXT PRIMARY KEY NOT NULL,
            full_name TEXT NOT NULL,
            analysis_status TEXT NOT NULL,
            data TEXT NOT NULL
        )
    "#;

    fn db_error(operation: &str) -> impl FnOnce(sqlx::Error) -> RepodocError + '_ {
        move |e| storage_error!(format!("Failed to {}: {}", operation, e), "sqlite_store", e)
    }

    fn decode<T: DeserializeOwned>(row: &SqliteRow) -> RepodocResult<T> {
        let data: String = row.try_get("data").map_err(db_error("read data column"))?;
        Ok(serde_json::from_str(&data)?)
    }

    /// The stored record with the checkpoint columns applied on top
    fn decode_job(row: &SqliteRow) -> RepodocResult<AnalysisJob> {
        let mut job: AnalysisJob = decode(row)?;

        let status: String = row.try_get("status").map_err(db_error("read status column"))?;
        let step: String = row
            .try_get("current_step")
            .map_err(db_error("read current_step column"))?;
        let percentage: i64 = row
            .try_get("percentage")
            .map_err(db_error("read percentage column"))?;
        let message: Option<String> = row.try_get("message").map_err(db_error("read message column"))?;
        let updated_at: String = row
            .try_get("updated_at")
            .map_err(db_error("read updated_at column"))?;

        job.status = status.parse()?;
        job.progress.current_step = step.parse()?;
        job.progress.percentage = u8::try_from(percentage).map_err(|e| {
            storage_error!(format!("Invalid stored percentage {}", percentage), "sqlite_store", e)
        })?;
        job.progress.message = message;
        job.updated_at = DateTime::parse_from_rfc3339(&updated_at)
            .map_err(|e| storage_error!("Invalid stored update time", "sqlite_store", e))?
            .with_timezone(&Utc);
        Ok(job)
    }

    impl SqliteStore {
        pub fn new(pool: sqlx::SqlitePool) -> Self {
            Self { pool }
        }

        /// Connect to `database_url`, creating the database file if needed
        pub async fn connect(database_url: &str) -> RepodocResult<Self> {
            let options = SqliteConnectOptions::from_str(database_url)
                .map_err(db_error("parse database URL"))?
                .create_if_missing(true);
            let pool = SqlitePoolOptions::new()
                .max_connections(5)
                .connect_with(options)
                .await
                .map_err(db_error("connect to SQLite database"))?;

            let store = Self::new(pool);
            store.migrate().await?;
            Ok(store)
        }

        /// Create tables if they do not exist
        pub async fn migrate(&self) -> RepodocResult<()> {
            for statement in [CREATE_JOBS_TABLE, CREATE_JOBS_INDEX, CREATE_REPOSITORIES_TABLE] {
                sqlx::query(statement)
                    .execute(&self.pool)
                    .await
                    .map_err(db_error("run schema migration"))?;
            }
            info!("Database schema is up to date");
            Ok(())
        }

        async fn write_job(conn: &mut SqliteConnection, job: &AnalysisJob) -> RepodocResult<()> {
            let data = serde_json::to_string(job)?;
            sqlx::query(
                r#"
                INSERT OR REPLACE INTO analysis_jobs
                (id, repository_id, user_id, status, current_step, percentage, message, created_at, updated_at, data)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&job.id)
            .bind(&job.repository_id)
            .bind(&job.user_id)
            .bind(job.status.as_str())
            .bind(job.progress.current_step.as_str())
            .bind(i64::from(job.progress.percentage))
            .bind(job.progress.message.as_deref())
            .bind(job.created_at.to_rfc3339())
            .bind(job.updated_at.to_rfc3339())
            .bind(data)
            .execute(conn)
            .await
            .map_err(db_error("save analysis job"))?;
            Ok(())
        }

        async fn update(&self, id: &str, update: JobUpdate<'_>) -> RepodocResult<()> {
            let mut tx = self.pool.begin().await.map_err(db_error("begin transaction"))?;

            let row = sqlx::query("SELECT data, status, current_step, percentage, message, updated_at FROM analysis_jobs WHERE id = ?")
                .bind(id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(db_error("load analysis job"))?;
            let row = row.ok_or_else(|| missing_job(id))?;
            let mut job = decode_job(&row)?;

            apply_update(&mut job, update)?;
            Self::write_job(&mut *tx, &job).await?;

            tx.commit().await.map_err(db_error("commit transaction"))?;
            debug!(analysis_id = %id, status = job.status.as_str(), "Updated analysis job in SQLite storage");
            Ok(())
        }

        async fn update_repository<F>(&self, id: &str, change: F) -> RepodocResult<()>
        where
            F: FnOnce(&mut Repository) + Send,
        {
            let mut tx = self.pool.begin().await.map_err(db_error("begin transaction"))?;

            let row = sqlx::query("SELECT data FROM repositories WHERE id = ?")
                .bind(id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(db_error("load repository"))?;
            let row = row.ok_or_else(|| missing_repository(id))?;
            let mut repository: Repository = decode(&row)?;

            change(&mut repository);

            sqlx::query("UPDATE repositories SET analysis_status = ?, data = ? WHERE id = ?")
                .bind(repository.analysis_status.as_str())
                .bind(serde_json::to_string(&repository)?)
                .bind(id)
                .execute(&mut *tx)
                .await
                .map_err(db_error("update repository"))?;

            tx.commit().await.map_err(db_error("commit transaction"))?;
            Ok(())
        }
    }

    #[async_trait]
    impl JobStore for SqliteStore {
        async fn create_job(&self, job: &AnalysisJob) -> RepodocResult<()> {
            let mut conn = self.pool.acquire().await.map_err(db_error("acquire connection"))?;
            Self::write_job(&mut conn, job).await?;
            debug!(analysis_id = %job.id, "Saved analysis job to SQLite storage");
            Ok(())
        }

        async fn load_job(&self, id: &str) -> RepodocResult<Option<AnalysisJob>> {
            let row = sqlx::query("SELECT data, status, current_step, percentage, message, updated_at FROM analysis_jobs WHERE id = ?")
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(db_error("load analysis job"))?;
            row.as_ref().map(decode_job).transpose()
        }

        async fn list_jobs(&self, repository_id: &str) -> RepodocResult<Vec<AnalysisJob>> {
            let rows = sqlx::query("SELECT data, status, current_step, percentage, message, updated_at FROM analysis_jobs WHERE repository_id = ?")
                .bind(repository_id)
                .fetch_all(&self.pool)
                .await
                .map_err(db_error("list analysis jobs"))?;

            let mut jobs = Vec::with_capacity(rows.len());
            for row in rows {
                match decode_job(&row) {
                    Ok(job) => jobs.push(job),
                    Err(e) => warn!(error = %e, "Failed to parse analysis job row"),
                }
            }
            jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            Ok(jobs)
        }

        async fn update_progress(
            &self,
            id: &str,
            step: AnalysisStep,
            percentage: u8,
            message: &str,
        ) -> RepodocResult<()> {
            check_percentage(percentage)?;

            let result = sqlx::query(
                r#"
                UPDATE analysis_jobs
                SET status = ?, current_step = ?, percentage = ?, message = ?, updated_at = ?
                WHERE id = ? AND status NOT IN (?, ?)
                "#,
            )
            .bind(JobStatus::Processing.as_str())
            .bind(step.as_str())
            .bind(i64::from(percentage))
            .bind(message)
            .bind(Utc::now().to_rfc3339())
            .bind(id)
            .bind(JobStatus::Completed.as_str())
            .bind(JobStatus::Failed.as_str())
            .execute(&self.pool)
            .await
            .map_err(db_error("update job progress"))?;

            if result.rows_affected() == 0 {
                let status: Option<String> =
                    sqlx::query_scalar("SELECT status FROM analysis_jobs WHERE id = ?")
                        .bind(id)
                        .fetch_optional(&self.pool)
                        .await
                        .map_err(db_error("load job status"))?;
                return Err(match status {
                    Some(status) => terminal_job(id, status.parse()?),
                    None => missing_job(id),
                });
            }
            Ok(())
        }

        async fn record_commit(&self, id: &str, commit_sha: &str) -> RepodocResult<()> {
            self.update(id, JobUpdate::Commit(commit_sha)).await
        }

        async fn record_files(&self, id: &str, files: &[FileRecord]) -> RepodocResult<()> {
            self.update(id, JobUpdate::Files(files)).await
        }

        async fn record_chunks(&self, id: &str, chunks: &[ChunkRecord]) -> RepodocResult<()> {
            self.update(id, JobUpdate::Chunks(chunks)).await
        }

        async fn record_results(&self, id: &str, results: &JobResults) -> RepodocResult<()> {
            self.update(id, JobUpdate::Results(results)).await
        }

        async fn mark_completed(&self, id: &str) -> RepodocResult<()> {
            self.update(id, JobUpdate::Completed).await
        }

        async fn mark_failed(
            &self,
            id: &str,
            message: &str,
            detail: Option<&str>,
        ) -> RepodocResult<()> {
            self.update(id, JobUpdate::Failed { message, detail }).await
        }
    }

    #[async_trait]
    impl RepositoryStore for SqliteStore {
        async fn save_repository(&self, repository: &Repository) -> RepodocResult<()> {
            sqlx::query(
                "INSERT OR REPLACE INTO repositories (id, full_name, analysis_status, data) VALUES (?, ?, ?, ?)",
            )
            .bind(&repository.id)
            .bind(&repository.full_name)
            .bind(repository.analysis_status.as_str())
            .bind(serde_json::to_string(repository)?)
            .execute(&self.pool)
            .await
            .map_err(db_error("save repository"))?;
            debug!(repository_id = %repository.id, "Saved repository to SQLite storage");
            Ok(())
        }

        async fn load_repository(&self, id: &str) -> RepodocResult<Option<Repository>> {
            let row = sqlx::query("SELECT data FROM repositories WHERE id = ?")
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(db_error("load repository"))?;
            row.as_ref().map(decode).transpose()
        }

        async fn find_repository(&self, full_name: &str) -> RepodocResult<Option<Repository>> {
            let row = sqlx::query("SELECT data FROM repositories WHERE full_name = ? LIMIT 1")
                .bind(full_name)
                .fetch_optional(&self.pool)
                .await
                .map_err(db_error("find repository"))?;
            row.as_ref().map(decode).transpose()
        }

        async fn update_analysis_status(
            &self,
            id: &str,
            status: RepositoryAnalysisStatus,
        ) -> RepodocResult<()> {
            self.update_repository(id, move |repository| repository.analysis_status = status)
                .await
        }

        async fn record_analysis_summary(
            &self,
            id: &str,
            last_analyzed: DateTime<Utc>,
            file_count: usize,
            total_lines: usize,
        ) -> RepodocResult<()> {
            self.update_repository(id, move |repository| {
                repository.analysis_status = RepositoryAnalysisStatus::Completed;
                repository.last_analyzed = Some(last_analyzed);
                repository.file_count = file_count;
                repository.total_lines = total_lines;
            })
            .await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use repodoc_core::RepodocError;

    fn job() -> AnalysisJob {
        AnalysisJob::new("repo-1", "user-1", "main")
    }

    #[test]
    fn test_first_checkpoint_starts_processing() {
        let mut job = job();
        apply_update(
            &mut job,
            JobUpdate::Progress {
                step: AnalysisStep::Fetching,
                percentage: 10,
                message: "Fetching repository information...",
            },
        )
        .unwrap();
        assert_eq!(job.status, JobStatus::Processing);
        assert_eq!(job.progress.percentage, 10);
    }

    #[test]
    fn test_failure_records_current_step() {
        let mut job = job();
        apply_update(
            &mut job,
            JobUpdate::Progress {
                step: AnalysisStep::Fragmenting,
                percentage: 40,
                message: "Breaking down files into chunks...",
            },
        )
        .unwrap();
        apply_update(
            &mut job,
            JobUpdate::Failed {
                message: "boom",
                detail: None,
            },
        )
        .unwrap();

        let error = job.error.as_ref().unwrap();
        assert_eq!(error.step, AnalysisStep::Fragmenting);
        assert_eq!(job.status, JobStatus::Failed);
        assert!(job.performance.total_duration_ms.is_some());
    }

    #[test]
    fn test_terminal_job_is_immutable() {
        let mut job = job();
        apply_update(&mut job, JobUpdate::Completed).unwrap();
        assert_eq!(job.progress.percentage, 100);

        let err = apply_update(&mut job, JobUpdate::Commit("abc")).unwrap_err();
        assert!(matches!(err, RepodocError::Validation { .. }));
        assert_eq!(job.commit_sha, None);
    }

    #[test]
    fn test_out_of_range_percentage_rejected() {
        let mut job = job();
        let result = apply_update(
            &mut job,
            JobUpdate::Progress {
                step: AnalysisStep::Analyzing,
                percentage: 101,
                message: "",
            },
        );
        assert!(result.is_err());
        assert_eq!(job.status, JobStatus::Pending);
    }

    #[tokio::test]
    async fn test_memory_store_lists_newest_first() {
        let store = MemoryJobStore::new();
        let mut older = job();
        older.created_at = Utc::now() - chrono::Duration::minutes(5);
        let newer = job();
        store.create_job(&older).await.unwrap();
        store.create_job(&newer).await.unwrap();
        store.create_job(&AnalysisJob::new("repo-2", "user-1", "main")).await.unwrap();

        let jobs = store.list_jobs("repo-1").await.unwrap();
        let ids: Vec<&str> = jobs.iter().map(|j| j.id.as_str()).collect();
        assert_eq!(ids, vec![newer.id.as_str(), older.id.as_str()]);
    }

    #[tokio::test]
    async fn test_memory_store_unknown_job_is_not_found() {
        let store = MemoryJobStore::new();
        let err = store.mark_completed("missing").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_repository_summary_marks_completed() {
        let store = MemoryRepositoryStore::new();
        let repository = Repository::new("acme", "widgets", "user-1");
        store.save_repository(&repository).await.unwrap();

        store
            .update_analysis_status(&repository.id, RepositoryAnalysisStatus::Analyzing)
            .await
            .unwrap();
        store
            .record_analysis_summary(&repository.id, Utc::now(), 12, 340)
            .await
            .unwrap();

        let loaded = store.find_repository("acme/widgets").await.unwrap().unwrap();
        assert_eq!(loaded.analysis_status, RepositoryAnalysisStatus::Completed);
        assert_eq!((loaded.file_count, loaded.total_lines), (12, 340));
        assert!(loaded.last_analyzed.is_some());
    }

    #[cfg(feature = "sqlite")]
    fn chunk(index: usize) -> ChunkRecord {
        ChunkRecord {
            id: format!("job_{}", index),
            file_path: format!("src/file_{}.rs", index),
            file_name: format!("file_{}.rs", index),
            extension: Some(".rs".to_string()),
            content: "fn main() {}\n".repeat(200),
            start_line: 1,
            end_line: 201,
            estimated_tokens: 700,
            chunk_number: 1,
            total_chunks: 1,
            analyzed: false,
            analysis: None,
        }
    }

    #[cfg(feature = "sqlite")]
    #[tokio::test]
    async fn test_sqlite_checkpoint_leaves_job_record_untouched() {
        let temp = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}", temp.path().join("jobs.db").display());
        let store = SqliteStore::connect(&url).await.unwrap();

        let job = job();
        store.create_job(&job).await.unwrap();
        let chunks: Vec<ChunkRecord> = (0..20).map(chunk).collect();
        store.record_chunks(&job.id, &chunks).await.unwrap();
        let stored_data = |pool: sqlx::SqlitePool, id: String| async move {
            sqlx::query_scalar::<_, String>("SELECT data FROM analysis_jobs WHERE id = ?")
                .bind(id)
                .fetch_one(&pool)
                .await
                .unwrap()
        };
        let before = stored_data(store.pool.clone(), job.id.clone()).await;

        for (index, percentage) in [60u8, 66, 72, 78, 85].into_iter().enumerate() {
            store
                .update_progress(
                    &job.id,
                    AnalysisStep::Analyzing,
                    percentage,
                    &format!("Analyzed {}/5 code chunks", index + 1),
                )
                .await
                .unwrap();
        }

        // checkpoints only rewrite the progress columns
        assert_eq!(stored_data(store.pool.clone(), job.id.clone()).await, before);

        let loaded = store.load_job(&job.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, JobStatus::Processing);
        assert_eq!(loaded.progress.current_step, AnalysisStep::Analyzing);
        assert_eq!(loaded.progress.percentage, 85);
        assert_eq!(
            loaded.progress.message.as_deref(),
            Some("Analyzed 5/5 code chunks")
        );
        assert_eq!(loaded.chunks.len(), 20);

        // a full update keeps the checkpoint
        store
            .mark_failed(&job.id, "Persistence failed", None)
            .await
            .unwrap();
        let failed = store.load_job(&job.id).await.unwrap().unwrap();
        assert_eq!(failed.status, JobStatus::Failed);
        assert_eq!(failed.error.unwrap().step, AnalysisStep::Analyzing);
        assert_eq!(failed.progress.percentage, 85);
    }

    #[cfg(feature = "sqlite")]
    #[tokio::test]
    async fn test_sqlite_checkpoint_rejects_terminal_and_unknown_jobs() {
        let temp = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}", temp.path().join("jobs.db").display());
        let store = SqliteStore::connect(&url).await.unwrap();

        let job = job();
        store.create_job(&job).await.unwrap();
        store.mark_completed(&job.id).await.unwrap();

        let err = store
            .update_progress(&job.id, AnalysisStep::Generating, 90, "late")
            .await
            .unwrap_err();
        assert!(matches!(err, RepodocError::Validation { .. }));
        let loaded = store.load_job(&job.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, JobStatus::Completed);
        assert_eq!(loaded.progress.percentage, 100);

        let err = store
            .update_progress("missing", AnalysisStep::Fetching, 10, "")
            .await
            .unwrap_err();
        assert!(err.is_not_found());

        let err = store
            .update_progress(&job.id, AnalysisStep::Fetching, 101, "")
            .await
            .unwrap_err();
        assert!(matches!(err, RepodocError::Validation { .. }));
    }
}
