//! Repodoc CLI - Command-line interface for Repodoc
//!
//! Runs repository analyses against GitHub and inspects persisted jobs

use anyhow::Context;
use clap::{Parser, Subcommand};
use repodoc_analysis::SiumaiAnalysisClient;
use repodoc_applications::{
    AnalysisManager, AnalysisPipeline, BroadcastNotifier, JobStore, MemoryJobStore,
    MemoryRepositoryStore, RepositoryStore, SqliteStore,
};
use repodoc_core::{
    init_logging, log_operation_error, log_operation_start, log_operation_success,
    validation_error, AnalysisEvent, AnalysisJob, ErrorContext, JobStatus, LoggingConfig,
    OverviewState, RepodocConfig, RepodocError, RepodocResult, Repository,
};
use repodoc_repo::{ApiClientConfig, ApiClientFactory, GitHubClientFactory};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

/// Owner of analyses started from the command line
const LOCAL_USER: &str = "local";

#[derive(Parser)]
#[command(name = "repodoc")]
#[command(about = "AI-assisted documentation analysis for GitHub repositories")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze a repository and generate its overview
    Analyze {
        /// Repository as owner/name
        repo: String,

        /// Branch to analyze (defaults to the repository's default branch)
        #[arg(short, long)]
        branch: Option<String>,

        /// Access token for private repositories
        #[arg(short, long, env = "GITHUB_TOKEN", hide_env_values = true)]
        token: Option<String>,

        /// Token budget per chunk
        #[arg(long)]
        max_tokens: Option<usize>,

        /// SQLite database URL for persisting jobs
        #[arg(long)]
        database_url: Option<String>,

        /// Write the finished job as JSON to this file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Show a persisted analysis job
    Status {
        analysis_id: String,

        #[arg(long)]
        database_url: Option<String>,
    },

    /// List analyses of a repository, newest first
    History {
        /// Repository as owner/name
        repo: String,

        #[arg(long)]
        database_url: Option<String>,
    },

    /// Configuration management
    Config {
        /// Write the default configuration
        #[arg(long)]
        init: bool,

        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    let logging_config = if cli.verbose {
        LoggingConfig::verbose()
    } else {
        config.logging.clone()
    };
    init_logging(&logging_config).map_err(|e| RepodocError::Config {
        message: format!("Failed to initialize logging: {}", e),
        source: Some(e),
        context: ErrorContext::new("cli")
            .with_operation("init_logging")
            .with_suggestion("Check the [logging] section of the configuration"),
    })?;

    info!("Starting Repodoc CLI v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Commands::Analyze {
            repo,
            branch,
            token,
            max_tokens,
            database_url,
            output,
        } => {
            let mut config = config;
            if let Some(max_tokens) = max_tokens {
                config.analysis.max_tokens_per_chunk = max_tokens;
            }
            if database_url.is_some() {
                config.storage.database_url = database_url;
            }
            config.validate()?;
            handle_analyze(&repo, branch, token, output, &config).await?;
        }
        Commands::Status {
            analysis_id,
            database_url,
        } => {
            let store = open_database(database_url.as_deref(), &config).await?;
            handle_status(&analysis_id, &store).await?;
        }
        Commands::History { repo, database_url } => {
            let store = open_database(database_url.as_deref(), &config).await?;
            handle_history(&repo, &store).await?;
        }
        Commands::Config { init, show } => {
            handle_config(init, show, &config)?;
        }
    }

    Ok(())
}

fn load_config(path: Option<&Path>) -> RepodocResult<RepodocConfig> {
    match path {
        Some(path) => RepodocConfig::from_file(path),
        None => RepodocConfig::load_or_default(RepodocConfig::default_path()?),
    }
}

fn parse_repo(repo: &str) -> RepodocResult<(&str, &str)> {
    match repo.split_once('/') {
        Some((owner, name)) if !owner.is_empty() && !name.is_empty() && !name.contains('/') => {
            Ok((owner, name))
        }
        _ => Err(validation_error!(
            format!("Expected owner/name, got '{}'", repo),
            "repo",
            "cli"
        )),
    }
}

async fn open_database(
    database_url: Option<&str>,
    config: &RepodocConfig,
) -> RepodocResult<SqliteStore> {
    let url = database_url
        .map(str::to_string)
        .or_else(|| config.storage.database_url.clone())
        .ok_or_else(|| RepodocError::Config {
            message: "No database configured".to_string(),
            source: None,
            context: ErrorContext::new("cli")
                .with_operation("open_database")
                .with_suggestion("Pass --database-url or set storage.database_url"),
        })?;
    SqliteStore::connect(&url).await
}

/// Job and repository stores: SQLite when configured, in memory otherwise
async fn open_stores(
    config: &RepodocConfig,
) -> RepodocResult<(Arc<dyn JobStore>, Arc<dyn RepositoryStore>)> {
    match &config.storage.database_url {
        Some(url) => {
            let store = Arc::new(SqliteStore::connect(url).await?);
            let jobs: Arc<dyn JobStore> = store.clone();
            let repositories: Arc<dyn RepositoryStore> = store;
            Ok((jobs, repositories))
        }
        None => {
            let jobs: Arc<dyn JobStore> = Arc::new(MemoryJobStore::new());
            let repositories: Arc<dyn RepositoryStore> = Arc::new(MemoryRepositoryStore::new());
            Ok((jobs, repositories))
        }
    }
}

/// The stored repository for `owner/name`, registered from the host's metadata
/// on first use
async fn register_repository(
    repositories: &dyn RepositoryStore,
    sources: &dyn ApiClientFactory,
    token: Option<String>,
    owner: &str,
    name: &str,
    branch: Option<String>,
) -> RepodocResult<Repository> {
    let full_name = format!("{}/{}", owner, name);
    let mut repository = match repositories.find_repository(&full_name).await? {
        Some(existing) => existing,
        None => {
            let metadata = sources
                .create_client(token)?
                .get_repository_metadata(owner, name)
                .await?;
            let mut repository = Repository::new(owner, name, LOCAL_USER)
                .with_default_branch(&metadata.default_branch);
            if let Some(description) = &metadata.description {
                repository = repository.with_description(description);
            }
            if let Some(language) = &metadata.language {
                repository = repository.with_language(language);
            }
            repository
        }
    };

    if let Some(branch) = branch {
        repository.default_branch = branch;
    }
    repositories.save_repository(&repository).await?;
    Ok(repository)
}

async fn handle_analyze(
    repo: &str,
    branch: Option<String>,
    token: Option<String>,
    output: Option<PathBuf>,
    config: &RepodocConfig,
) -> anyhow::Result<()> {
    log_operation_start!("analyze_repository", repo = %repo);
    let (owner, name) = parse_repo(repo)?;

    let (jobs, repositories) = open_stores(config).await?;
    let notifier = Arc::new(BroadcastNotifier::default());
    let mut events = notifier.subscribe(LOCAL_USER);
    let client = Arc::new(SiumaiAnalysisClient::new(&config.llm).await.map_err(|e| {
        log_operation_error!("create_llm_client", e, provider = %config.llm.provider);
        e
    })?);
    let sources = Arc::new(GitHubClientFactory::new(ApiClientConfig::from_repository_config(
        &config.repository,
        None,
    )));

    let repository = register_repository(
        repositories.as_ref(),
        sources.as_ref(),
        token.clone(),
        owner,
        name,
        branch,
    )
    .await?;

    let pipeline = AnalysisPipeline::new(jobs, repositories, notifier, client, config);
    let manager = AnalysisManager::new(pipeline, sources);
    let handle = manager
        .trigger(&repository.id, LOCAL_USER, token)
        .await
        .inspect_err(RepodocError::log)?;

    println!("🔍 Analyzing {} ({})", repository.full_name, repository.default_branch);
    println!("🆔 Analysis ID: {}", handle.analysis_id);

    let mut task = handle.task;
    let status = loop {
        tokio::select! {
            joined = &mut task => break joined.context("Analysis task did not finish")?,
            Some(event) = events.recv() => print_event(&event),
        }
    };
    // Terminal events published just before the task returned
    while let Ok(Some(event)) =
        tokio::time::timeout(std::time::Duration::from_millis(50), events.recv()).await
    {
        print_event(&event);
    }

    let job = manager.status(&handle.analysis_id).await?;
    match &output {
        Some(path) => {
            let json = serde_json::to_string_pretty(&job)?;
            tokio::fs::write(path, json)
                .await
                .with_context(|| format!("Failed to write {}", path.display()))?;
            println!("📝 Job written to {}", path.display());
        }
        None => print_job(&job),
    }

    match status {
        JobStatus::Completed => {
            log_operation_success!("analyze_repository", repo = %repo, analysis_id = %job.id);
            Ok(())
        }
        _ => {
            let message = job
                .error
                .as_ref()
                .map(|e| e.message.clone())
                .unwrap_or_else(|| format!("Analysis ended as {}", status.as_str()));
            anyhow::bail!(message)
        }
    }
}

fn print_event(event: &AnalysisEvent) {
    match event {
        AnalysisEvent::Progress {
            step,
            percentage,
            message,
            ..
        } => println!("  [{:>3}%] {:<11} {}", percentage, step.as_str(), message),
        AnalysisEvent::Completed { .. } => println!("✅ Analysis completed"),
        AnalysisEvent::Failed { error, .. } => println!("❌ Analysis failed: {}", error),
    }
}

fn print_job(job: &AnalysisJob) {
    println!("\n📋 Job {} [{}]", job.id, job.status.as_str());
    println!(
        "   Step: {} ({}%) {}",
        job.progress.current_step.as_str(),
        job.progress.percentage,
        job.progress.message.as_deref().unwrap_or("")
    );
    if let Some(sha) = &job.commit_sha {
        println!("   Commit: {}", sha);
    }

    if let Some(stats) = &job.statistics {
        println!("\n📊 Statistics");
        println!("   Files: {}  Lines: {}", stats.total_files, stats.total_lines);
        println!(
            "   Chunks: {} ({} analyzed, {} failed)",
            stats.total_chunks, stats.analyzed_chunks, stats.failed_chunks
        );
        for language in &stats.language_breakdown {
            println!(
                "   {:<14} {:>4} files {:>7} lines {:>5.1}%",
                language.language, language.file_count, language.line_count, language.percentage
            );
        }
    }

    let performance = &job.performance;
    println!(
        "\n⏱  API calls: {}  Tokens: {}",
        performance.api_calls, performance.tokens_used
    );
    for (step, ms) in &performance.step_durations {
        println!("   {:<11} {} ms", step.as_str(), ms);
    }

    match &job.overview {
        OverviewState::Generated { overview } => {
            println!("\n📖 Overview ({:?} complexity)\n", overview.complexity);
            println!("{}", overview.summary);
        }
        OverviewState::Failed { reason } => {
            println!("\n⚠️  Overview unavailable: {}", reason);
        }
        OverviewState::NotRequested => {}
    }

    if let Some(error) = &job.error {
        println!("\n❌ Failed during {}: {}", error.step.as_str(), error.message);
        if let Some(detail) = &error.detail {
            println!("{}", detail);
        }
    }
}

async fn handle_status(analysis_id: &str, store: &SqliteStore) -> RepodocResult<()> {
    let job = store.load_job(analysis_id).await?.ok_or_else(|| RepodocError::NotFound {
        resource: format!("analysis job {}", analysis_id),
        context: ErrorContext::new("cli").with_operation("status"),
    })?;
    print_job(&job);
    Ok(())
}

async fn handle_history(repo: &str, store: &SqliteStore) -> RepodocResult<()> {
    let (owner, name) = parse_repo(repo)?;
    let full_name = format!("{}/{}", owner, name);
    let Some(repository) = store.find_repository(&full_name).await? else {
        println!("No analyses recorded for {}", full_name);
        return Ok(());
    };

    let jobs = store.list_jobs(&repository.id).await?;
    println!(
        "📚 {} analyses of {} [{}]",
        jobs.len(),
        full_name,
        repository.analysis_status.as_str()
    );
    for job in jobs {
        println!(
            "  {}  {}  {:<10} {:>3}%  {}",
            job.created_at.format("%Y-%m-%d %H:%M:%S"),
            job.id,
            job.status.as_str(),
            job.progress.percentage,
            job.branch
        );
    }
    Ok(())
}

fn handle_config(init: bool, show: bool, config: &RepodocConfig) -> anyhow::Result<()> {
    if init {
        let path = RepodocConfig::default_path()?;
        RepodocConfig::default().save_to_file(&path)?;
        println!("✅ Configuration initialized at: {}", path.display());
        println!("📝 Please edit the file to add your API keys and customize settings.");
    }

    if show {
        println!("📋 Current configuration:");
        println!("{}", toml::to_string_pretty(config)?);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_repo() {
        assert_eq!(parse_repo("rust-lang/cargo").unwrap(), ("rust-lang", "cargo"));
        assert!(parse_repo("cargo").is_err());
        assert!(parse_repo("/cargo").is_err());
        assert!(parse_repo("a/b/c").is_err());
    }

    #[test]
    fn test_cli_parses_analyze_flags() {
        let cli = Cli::try_parse_from([
            "repodoc",
            "analyze",
            "octo/widget",
            "--branch",
            "dev",
            "--max-tokens",
            "500",
        ])
        .unwrap();
        match cli.command {
            Commands::Analyze {
                repo,
                branch,
                max_tokens,
                ..
            } => {
                assert_eq!(repo, "octo/widget");
                assert_eq!(branch.as_deref(), Some("dev"));
                assert_eq!(max_tokens, Some(500));
            }
            _ => panic!("expected analyze"),
        }
    }
}
