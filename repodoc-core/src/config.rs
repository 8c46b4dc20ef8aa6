//! Configuration management

use crate::error::{ErrorContext, RepodocError, RepodocResult};
use crate::logging::LoggingConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level configuration, loaded from `~/.repodoc/config.toml` by default
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RepodocConfig {
    pub llm: LlmConfig,
    pub repository: RepositoryConfig,
    pub analysis: AnalysisConfig,
    pub storage: StorageConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// openai, anthropic, ollama or groq
    pub provider: String,
    pub model: String,
    /// Falls back to the provider's environment variable
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            model: "gpt-4o-mini".to_string(),
            api_key: None,
            base_url: None,
            temperature: 0.7,
            max_tokens: 4096,
        }
    }
}

/// Remote code host access and fetch filtering
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RepositoryConfig {
    pub api_base_url: String,
    pub request_timeout_seconds: u64,
    pub max_file_size_bytes: u64,
    pub excluded_dirs: Vec<String>,
    pub excluded_files: Vec<String>,
    /// Extensions including the leading dot
    pub supported_extensions: Vec<String>,
    /// Extensionless names accepted when contained in the file name
    pub special_files: Vec<String>,
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            api_base_url: "https://api.github.com".to_string(),
            request_timeout_seconds: 30,
            max_file_size_bytes: 1_000_000,
            excluded_dirs: strings(&[
                "node_modules",
                ".git",
                "dist",
                "build",
                ".next",
                "venv",
                "__pycache__",
                ".vscode",
                ".idea",
                "coverage",
                ".nyc_output",
            ]),
            excluded_files: strings(&[
                ".env",
                ".env.local",
                ".env.production",
                "package-lock.json",
                "yarn.lock",
                ".DS_Store",
            ]),
            supported_extensions: strings(&[
                ".js",
                ".ts",
                ".jsx",
                ".tsx",
                ".py",
                ".java",
                ".cpp",
                ".c",
                ".cs",
                ".php",
                ".rb",
                ".go",
                ".rs",
                ".md",
                ".json",
                ".yml",
                ".yaml",
                ".xml",
                ".html",
                ".css",
                ".scss",
                ".sql",
                ".sh",
                ".dockerfile",
            ]),
            special_files: strings(&["Dockerfile", "Makefile", "README", "LICENSE", "CHANGELOG"]),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Token budget per chunk
    pub max_tokens_per_chunk: usize,
    /// In-flight chunk submissions; 1 keeps analysis strictly sequential
    pub max_concurrent_requests: usize,
    pub min_request_interval_ms: u64,
    pub request_timeout_ms: u64,
    pub generate_overview: bool,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            max_tokens_per_chunk: 3000,
            max_concurrent_requests: 1,
            min_request_interval_ms: 100,
            request_timeout_ms: 120_000,
            generate_overview: true,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// SQLite URL; jobs are kept in memory when unset
    pub database_url: Option<String>,
    /// Directory receiving `{owner}_{repo}_analysis.txt` exports
    pub analysis_dir: Option<PathBuf>,
}

impl RepodocConfig {
    /// `~/.repodoc/config.toml`
    pub fn default_path() -> RepodocResult<PathBuf> {
        let home = dirs::home_dir().ok_or_else(|| RepodocError::Config {
            message: "Could not determine home directory".to_string(),
            source: None,
            context: ErrorContext::new("config")
                .with_operation("default_path")
                .with_suggestion("Pass --config with an explicit path"),
        })?;
        Ok(home.join(".repodoc").join("config.toml"))
    }

    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> RepodocResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| RepodocError::Config {
            message: format!("Failed to read config file {}: {}", path.display(), e),
            source: Some(Box::new(e)),
            context: ErrorContext::new("config")
                .with_operation("read_file")
                .with_suggestion("Check if the config file exists and is readable"),
        })?;

        let config: RepodocConfig = toml::from_str(&content).map_err(|e| RepodocError::Config {
            message: format!("Failed to parse config: {}", e),
            source: Some(Box::new(e)),
            context: ErrorContext::new("config")
                .with_operation("parse_toml")
                .with_suggestion("Check TOML syntax in config file"),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Load from `path` when it exists, defaults otherwise
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> RepodocResult<Self> {
        if path.as_ref().exists() {
            Self::from_file(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to a TOML file, creating parent directories
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> RepodocResult<()> {
        let path = path.as_ref();
        let content = toml::to_string_pretty(self).map_err(|e| RepodocError::Config {
            message: format!("Failed to serialize config: {}", e),
            source: Some(Box::new(e)),
            context: ErrorContext::new("config").with_operation("serialize_toml"),
        })?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        std::fs::write(path, content).map_err(|e| RepodocError::Config {
            message: format!("Failed to write config file: {}", e),
            source: Some(Box::new(e)),
            context: ErrorContext::new("config")
                .with_operation("write_file")
                .with_suggestion("Check if the directory exists and is writable"),
        })?;

        Ok(())
    }

    pub fn validate(&self) -> RepodocResult<()> {
        let reject = |message: &str, suggestion: &str| {
            Err(RepodocError::Config {
                message: message.to_string(),
                source: None,
                context: ErrorContext::new("config")
                    .with_operation("validate")
                    .with_suggestion(suggestion),
            })
        };

        if self.analysis.max_tokens_per_chunk == 0 {
            return reject(
                "analysis.max_tokens_per_chunk must be greater than 0",
                "Set analysis.max_tokens_per_chunk to a positive value",
            );
        }
        if self.analysis.max_concurrent_requests == 0 {
            return reject(
                "analysis.max_concurrent_requests must be greater than 0",
                "Use 1 for strictly sequential analysis",
            );
        }
        if self.repository.max_file_size_bytes == 0 {
            return reject(
                "repository.max_file_size_bytes must be greater than 0",
                "Set repository.max_file_size_bytes to a positive value",
            );
        }
        if self.repository.supported_extensions.is_empty() {
            return reject(
                "repository.supported_extensions must not be empty",
                "List at least one extension, e.g. \".rs\"",
            );
        }
        if self.llm.max_tokens == 0 {
            return reject(
                "llm.max_tokens must be greater than 0",
                "Set llm.max_tokens to a positive value",
            );
        }

        Ok(())
    }
}
