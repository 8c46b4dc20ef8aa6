//! Repodoc Applications - the analysis pipeline and its collaborators
//!
//! Builds on the stages in repodoc-analysis and the fetcher in repodoc-repo:
//!
//! - Job and repository persistence (in-memory and SQLite)
//! - A per-user broadcast notification channel
//! - The checkpointed pipeline orchestrator
//! - Supervised triggering of analyses

pub mod analysis;
pub mod notifier;

pub use analysis::{
    analysis_file_name, write_analysis_file, AnalysisHandle, AnalysisManager, AnalysisPipeline,
    ExportedAnalysis, JobResults, JobStore, MemoryJobStore, MemoryRepositoryStore, PipelineError,
    PipelineResult, RepositoryStore,
};
#[cfg(feature = "sqlite")]
pub use analysis::SqliteStore;
pub use notifier::{BroadcastNotifier, Subscription};
