//! Core data type definitions
//!
//! Records owned by an analysis job are explicit structures validated at
//! construction; stage boundaries call `validate()` before trusting them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::{ErrorContext, RepodocError, RepodocResult};
use crate::language::{extension_of, language_for_extension};

/// Repository analysis status as recorded on the [`Repository`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RepositoryAnalysisStatus {
    #[default]
    Pending,
    Analyzing,
    Completed,
    Failed,
}

impl RepositoryAnalysisStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Analyzing => "analyzing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl FromStr for RepositoryAnalysisStatus {
    type Err = RepodocError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "analyzing" => Ok(Self::Analyzing),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => Err(crate::validation_error!(
                format!("Unknown repository analysis status: {}", other),
                "analysis_status",
                "types"
            )),
        }
    }
}

/// Per-repository overrides of the fetch filter
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RepositorySettings {
    /// Replaces the configured byte-size cap when set
    pub max_file_size_bytes: Option<u64>,
    /// Extra directory names excluded from fetching
    pub excluded_paths: Vec<String>,
    /// When non-empty, replaces the configured supported extensions
    pub included_extensions: Vec<String>,
}

/// A source project known to the system.
///
/// Created out-of-band; the pipeline only touches the analysis summary fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Repository {
    pub id: String,
    pub owner: String,
    pub name: String,
    pub full_name: String,
    pub description: Option<String>,
    pub language: Option<String>,
    pub default_branch: String,
    /// User who registered the repository
    pub user_id: String,
    pub settings: RepositorySettings,
    pub analysis_status: RepositoryAnalysisStatus,
    pub last_analyzed: Option<DateTime<Utc>>,
    pub file_count: usize,
    pub total_lines: usize,
}

impl Repository {
    pub fn new(owner: &str, name: &str, user_id: &str) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            owner: owner.to_string(),
            name: name.to_string(),
            full_name: format!("{}/{}", owner, name),
            description: None,
            language: None,
            default_branch: "main".to_string(),
            user_id: user_id.to_string(),
            settings: RepositorySettings::default(),
            analysis_status: RepositoryAnalysisStatus::Pending,
            last_analyzed: None,
            file_count: 0,
            total_lines: 0,
        }
    }

    pub fn with_default_branch(mut self, branch: &str) -> Self {
        self.default_branch = branch.to_string();
        self
    }

    pub fn with_description(mut self, description: &str) -> Self {
        self.description = Some(description.to_string());
        self
    }

    pub fn with_language(mut self, language: &str) -> Self {
        self.language = Some(language.to_string());
        self
    }

    pub fn with_settings(mut self, settings: RepositorySettings) -> Self {
        self.settings = settings;
        self
    }

    /// Textual context handed to the analysis collaborator
    pub fn project_context(&self) -> ProjectContext {
        ProjectContext {
            full_name: self.full_name.clone(),
            description: self.description.clone(),
            language: self.language.clone(),
        }
    }
}

/// Repository name, description and primary language
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectContext {
    pub full_name: String,
    pub description: Option<String>,
    pub language: Option<String>,
}

impl fmt::Display for ProjectContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Repository: {}, Language: {}, Description: {}",
            self.full_name,
            self.language.as_deref().unwrap_or("Mixed"),
            self.description.as_deref().unwrap_or("No description provided")
        )
    }
}

/// Lifecycle status of an [`AnalysisJob`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    #[default]
    Pending,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl FromStr for JobStatus {
    type Err = RepodocError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "processing" => Ok(Self::Processing),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => Err(crate::validation_error!(
                format!("Unknown job status: {}", other),
                "status",
                "types"
            )),
        }
    }
}

/// Pipeline steps, in execution order
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisStep {
    #[default]
    Fetching,
    Cloning,
    Fragmenting,
    Analyzing,
    Generating,
}

impl AnalysisStep {
    pub const ALL: [AnalysisStep; 5] = [
        AnalysisStep::Fetching,
        AnalysisStep::Cloning,
        AnalysisStep::Fragmenting,
        AnalysisStep::Analyzing,
        AnalysisStep::Generating,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fetching => "fetching",
            Self::Cloning => "cloning",
            Self::Fragmenting => "fragmenting",
            Self::Analyzing => "analyzing",
            Self::Generating => "generating",
        }
    }
}

impl fmt::Display for AnalysisStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AnalysisStep {
    type Err = RepodocError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AnalysisStep::ALL
            .into_iter()
            .find(|step| step.as_str() == s)
            .ok_or_else(|| {
                crate::validation_error!(format!("Unknown analysis step: {}", s), "step", "types")
            })
    }
}

/// Durable checkpoint of a running job
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobProgress {
    pub current_step: AnalysisStep,
    /// 0..=100
    pub percentage: u8,
    pub message: Option<String>,
}

/// A fetched file, without its content
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    pub path: String,
    pub name: String,
    /// Extension including the leading dot, original case
    pub extension: Option<String>,
    pub size: u64,
    pub language: String,
    pub line_count: usize,
}

impl FileRecord {
    /// Build a record for `path`, deriving name, extension, language and line count
    pub fn new(path: &str, size: u64, content: &str) -> RepodocResult<Self> {
        let path = path.trim_start_matches('/');
        let name = path.rsplit('/').next().unwrap_or(path).to_string();
        if name.is_empty() {
            return Err(crate::validation_error!(
                format!("File path '{}' has no file name", path),
                "path",
                "file_record"
            ));
        }

        let extension = extension_of(&name);
        let language = language_for_extension(extension.as_deref()).to_string();

        Ok(Self {
            path: path.to_string(),
            name,
            extension,
            size,
            language,
            line_count: count_lines(content),
        })
    }

    pub fn validate(&self) -> RepodocResult<()> {
        if self.path.is_empty() || self.name.is_empty() {
            return Err(crate::validation_error!(
                "File record is missing its path or name",
                "path",
                "file_record"
            ));
        }
        if !self.path.ends_with(&self.name) {
            return Err(crate::validation_error!(
                format!("File name '{}' does not match path '{}'", self.name, self.path),
                "name",
                "file_record"
            ));
        }
        Ok(())
    }
}

/// Number of `'\n'`-separated lines, 0 for empty content
pub fn count_lines(content: &str) -> usize {
    if content.is_empty() {
        0
    } else {
        content.split('\n').count()
    }
}

/// A line-addressed slice of one file, the unit submitted for analysis
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkRecord {
    pub id: String,
    pub file_path: String,
    pub file_name: String,
    pub extension: Option<String>,
    pub content: String,
    /// 1-indexed, inclusive
    pub start_line: usize,
    /// 1-indexed, inclusive
    pub end_line: usize,
    pub estimated_tokens: usize,
    /// 1-indexed position within the file's chunk sequence
    pub chunk_number: usize,
    pub total_chunks: usize,
    pub analyzed: bool,
    /// Analysis text on success, failure reason otherwise; `None` until processed
    pub analysis: Option<String>,
}

impl ChunkRecord {
    pub fn validate(&self) -> RepodocResult<()> {
        let invalid = |message: String, field: &str| {
            Err(RepodocError::Validation {
                message,
                field: Some(field.to_string()),
                context: ErrorContext::new("chunk_record")
                    .with_operation("validate")
                    .with_metadata("chunk_id", &self.id),
            })
        };

        if self.id.is_empty() {
            return invalid("Chunk id is empty".to_string(), "id");
        }
        if self.file_path.is_empty() {
            return invalid(format!("Chunk {} has no file path", self.id), "file_path");
        }
        if self.start_line == 0 || self.end_line < self.start_line {
            return invalid(
                format!(
                    "Chunk {} has invalid line range {}-{}",
                    self.id, self.start_line, self.end_line
                ),
                "start_line",
            );
        }
        if self.chunk_number == 0 || self.chunk_number > self.total_chunks {
            return invalid(
                format!(
                    "Chunk {} has position {} of {}",
                    self.id, self.chunk_number, self.total_chunks
                ),
                "chunk_number",
            );
        }
        Ok(())
    }

    /// Number of lines covered by this chunk
    pub fn line_span(&self) -> usize {
        self.end_line + 1 - self.start_line
    }

    /// Whether the analyzer has visited this chunk, successfully or not
    pub fn is_processed(&self) -> bool {
        self.analysis.is_some()
    }

    pub fn record_success(&mut self, analysis: String) {
        self.analyzed = true;
        self.analysis = Some(analysis);
    }

    pub fn record_failure(&mut self, reason: String) {
        self.analyzed = false;
        self.analysis = Some(reason);
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LanguageStat {
    pub language: String,
    pub file_count: usize,
    pub line_count: usize,
    pub percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileTypeStat {
    pub extension: String,
    pub count: usize,
    pub percentage: f64,
}

/// Language and file-type statistics for one job
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Statistics {
    pub total_files: usize,
    pub total_lines: usize,
    pub total_chunks: usize,
    /// Chunks that went through analysis, successfully or not
    pub processed_chunks: usize,
    pub analyzed_chunks: usize,
    pub failed_chunks: usize,
    pub language_breakdown: Vec<LanguageStat>,
    pub file_types: Vec<FileTypeStat>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ComplexityLevel {
    Low,
    #[default]
    Medium,
    High,
    VeryHigh,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectOverview {
    pub summary: String,
    pub complexity: ComplexityLevel,
    pub generated_at: DateTime<Utc>,
}

/// Outcome of the overview stage
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum OverviewState {
    #[default]
    NotRequested,
    Generated { overview: ProjectOverview },
    Failed { reason: String },
}

impl OverviewState {
    pub fn overview(&self) -> Option<&ProjectOverview> {
        match self {
            OverviewState::Generated { overview } => Some(overview),
            _ => None,
        }
    }
}

/// Token and call accounting against the analysis collaborator
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageStats {
    pub tokens_used: u64,
    pub api_calls: u64,
}

impl UsageStats {
    pub fn record_call(&mut self, tokens: u64) {
        self.tokens_used += tokens;
        self.api_calls += 1;
    }

    pub fn merge(&mut self, other: UsageStats) {
        self.tokens_used += other.tokens_used;
        self.api_calls += other.api_calls;
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Performance {
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub total_duration_ms: Option<u64>,
    pub step_durations: BTreeMap<AnalysisStep, u64>,
    pub tokens_used: u64,
    pub api_calls: u64,
}

impl Default for Performance {
    fn default() -> Self {
        Self {
            start_time: Utc::now(),
            end_time: None,
            total_duration_ms: None,
            step_durations: BTreeMap::new(),
            tokens_used: 0,
            api_calls: 0,
        }
    }
}

/// Failure details captured when a job fails
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobError {
    pub message: String,
    /// Error chain, outermost first
    pub detail: Option<String>,
    pub step: AnalysisStep,
    pub timestamp: DateTime<Utc>,
}

/// One end-to-end run of the pipeline against a repository snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisJob {
    pub id: String,
    pub repository_id: String,
    pub user_id: String,
    pub branch: String,
    pub commit_sha: Option<String>,
    pub status: JobStatus,
    pub progress: JobProgress,
    pub files: Vec<FileRecord>,
    pub chunks: Vec<ChunkRecord>,
    pub statistics: Option<Statistics>,
    pub overview: OverviewState,
    pub performance: Performance,
    pub error: Option<JobError>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AnalysisJob {
    pub fn new(repository_id: &str, user_id: &str, branch: &str) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            repository_id: repository_id.to_string(),
            user_id: user_id.to_string(),
            branch: branch.to_string(),
            commit_sha: None,
            status: JobStatus::Pending,
            progress: JobProgress::default(),
            files: Vec::new(),
            chunks: Vec::new(),
            statistics: None,
            overview: OverviewState::NotRequested,
            performance: Performance {
                start_time: now,
                ..Performance::default()
            },
            error: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Events published on the per-user notification channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AnalysisEvent {
    Progress {
        analysis_id: String,
        step: AnalysisStep,
        percentage: u8,
        message: String,
    },
    Completed {
        analysis_id: String,
        repository_id: String,
        success: bool,
    },
    Failed {
        analysis_id: String,
        repository_id: String,
        error: String,
    },
}

impl AnalysisEvent {
    pub fn analysis_id(&self) -> &str {
        match self {
            AnalysisEvent::Progress { analysis_id, .. }
            | AnalysisEvent::Completed { analysis_id, .. }
            | AnalysisEvent::Failed { analysis_id, .. } => analysis_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_record_derives_metadata() {
        let record = FileRecord::new("src/lib/Parser.RS", 42, "fn a() {}\nfn b() {}").unwrap();
        assert_eq!(record.name, "Parser.RS");
        assert_eq!(record.extension.as_deref(), Some(".RS"));
        assert_eq!(record.language, "Rust");
        assert_eq!(record.line_count, 2);
    }

    #[test]
    fn test_file_record_without_extension() {
        let record = FileRecord::new("Dockerfile", 10, "FROM rust\n").unwrap();
        assert_eq!(record.extension, None);
        assert_eq!(record.language, "Unknown");
        // trailing newline yields an empty last segment
        assert_eq!(record.line_count, 2);
    }

    #[test]
    fn test_file_record_rejects_directory_path() {
        assert!(FileRecord::new("src/", 0, "").is_err());
    }

    #[test]
    fn test_chunk_validation() {
        let mut chunk = ChunkRecord {
            id: "job_0".to_string(),
            file_path: "src/main.rs".to_string(),
            file_name: "main.rs".to_string(),
            extension: Some(".rs".to_string()),
            content: "fn main() {}".to_string(),
            start_line: 1,
            end_line: 1,
            estimated_tokens: 3,
            chunk_number: 1,
            total_chunks: 1,
            analyzed: false,
            analysis: None,
        };
        assert!(chunk.validate().is_ok());
        assert_eq!(chunk.line_span(), 1);

        chunk.end_line = 0;
        assert!(chunk.validate().is_err());

        chunk.end_line = 1;
        chunk.chunk_number = 2;
        assert!(chunk.validate().is_err());
    }

    #[test]
    fn test_step_round_trips_through_str() {
        for step in AnalysisStep::ALL {
            assert_eq!(step.as_str().parse::<AnalysisStep>().unwrap(), step);
        }
        assert!("cloning-ish".parse::<AnalysisStep>().is_err());
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(!JobStatus::Pending.is_terminal());
        assert!(!JobStatus::Processing.is_terminal());
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
    }

    #[test]
    fn test_overview_state_serialization_is_tagged() {
        let json = serde_json::to_value(OverviewState::Failed {
            reason: "boom".to_string(),
        })
        .unwrap();
        assert_eq!(json["state"], "failed");
        assert_eq!(json["reason"], "boom");
    }

    #[test]
    fn test_project_context_display() {
        let repo = Repository::new("acme", "widgets", "user-1").with_language("Rust");
        assert_eq!(
            repo.project_context().to_string(),
            "Repository: acme/widgets, Language: Rust, Description: No description provided"
        );
    }
}
