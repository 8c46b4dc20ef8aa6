//! API clients for accessing remote repositories
//!
//! Read-only access to repository content over the code host's REST API,
//! without cloning.

use async_trait::async_trait;
use repodoc_core::{ErrorContext, RepodocError, RepodocResult, RepositoryConfig};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub mod github;


pub use github::GitHubApiClient;

/// A blob entry of the repository tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryFile {
    /// File path relative to repository root
    pub path: String,
    /// Tree entry type, always `blob` once listed
    pub file_type: String,
    /// File size in bytes (if available)
    pub size: Option<u64>,
    pub sha: Option<String>,
}

/// Repository metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryMetadata {
    pub name: String,
    /// `owner/name`
    pub full_name: String,
    pub description: Option<String>,
    pub default_branch: String,
    pub language: Option<String>,
    pub topics: Vec<String>,
    /// Repository size in KB
    pub size: Option<u64>,
    pub private: bool,
}

/// A branch resolved to its commit and root tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchRef {
    pub name: String,
    pub commit_sha: String,
    pub tree_sha: String,
}

/// Decoded file content
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileContent {
    pub content: String,
    pub size: u64,
    pub sha: String,
}

/// Configuration for API clients
#[derive(Debug, Clone)]
pub struct ApiClientConfig {
    /// Base URL for the API
    pub base_url: String,
    /// Access token for authentication
    pub access_token: Option<String>,
    /// Request timeout in seconds
    pub timeout_seconds: u64,
    pub user_agent: String,
    /// Additional headers
    pub headers: HashMap<String, String>,
}

impl Default for ApiClientConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            access_token: None,
            timeout_seconds: 30,
            user_agent: format!("repodoc/{}", env!("CARGO_PKG_VERSION")),
            headers: HashMap::new(),
        }
    }
}

impl ApiClientConfig {
    /// Configuration for api.github.com
    pub fn github(access_token: Option<String>) -> Self {
        Self {
            base_url: "https://api.github.com".to_string(),
            access_token,
            ..Default::default()
        }
    }

    /// Configuration derived from the `repository` config section
    pub fn from_repository_config(config: &RepositoryConfig, access_token: Option<String>) -> Self {
        Self {
            base_url: config.api_base_url.clone(),
            access_token,
            timeout_seconds: config.request_timeout_seconds,
            ..Default::default()
        }
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.to_string();
        self
    }

    /// Set additional header
    pub fn with_header(mut self, key: String, value: String) -> Self {
        self.headers.insert(key, value);
        self
    }

    /// Set timeout
    pub fn with_timeout(mut self, timeout_seconds: u64) -> Self {
        self.timeout_seconds = timeout_seconds;
        self
    }
}

/// Source repository collaborator
#[async_trait]
pub trait RepositoryApiClient: Send + Sync {
    /// Get repository metadata
    async fn get_repository_metadata(
        &self,
        owner: &str,
        repo: &str,
    ) -> RepodocResult<RepositoryMetadata>;

    /// Resolve a branch name to its commit and tree
    async fn resolve_branch(&self, owner: &str, repo: &str, branch: &str)
        -> RepodocResult<BranchRef>;

    /// List every blob under `tree_ref`, recursively, in tree order
    async fn get_file_tree(
        &self,
        owner: &str,
        repo: &str,
        tree_ref: &str,
    ) -> RepodocResult<Vec<RepositoryFile>>;

    /// Get the decoded content of a file at `git_ref`
    async fn get_file_content(
        &self,
        owner: &str,
        repo: &str,
        path: &str,
        git_ref: &str,
    ) -> RepodocResult<FileContent>;
}

/// Creates API clients bound to a caller's access credential
pub trait ApiClientFactory: Send + Sync {
    fn create_client(&self, access_token: Option<String>)
        -> RepodocResult<std::sync::Arc<dyn RepositoryApiClient>>;
}

/// Factory for [`GitHubApiClient`]s sharing a base configuration
#[derive(Debug, Clone)]
pub struct GitHubClientFactory {
    base: ApiClientConfig,
}

impl GitHubClientFactory {
    pub fn new(base: ApiClientConfig) -> Self {
        Self { base }
    }
}

impl ApiClientFactory for GitHubClientFactory {
    fn create_client(
        &self,
        access_token: Option<String>,
    ) -> RepodocResult<std::sync::Arc<dyn RepositoryApiClient>> {
        let config = ApiClientConfig {
            access_token: access_token.or_else(|| self.base.access_token.clone()),
            ..self.base.clone()
        };
        Ok(std::sync::Arc::new(GitHubApiClient::new(config)?))
    }
}

/// Helper function to create HTTP client with common configuration
pub(crate) fn create_http_client(config: &ApiClientConfig) -> RepodocResult<reqwest::Client> {
    let mut headers = reqwest::header::HeaderMap::new();

    headers.insert(
        reqwest::header::USER_AGENT,
        reqwest::header::HeaderValue::from_str(&config.user_agent).map_err(|e| {
            RepodocError::Repository {
                message: format!("Invalid user agent: {}", e),
                source: Some(Box::new(e)),
                context: ErrorContext::new("http_client").with_operation("create_client"),
            }
        })?,
    );

    for (key, value) in &config.headers {
        let header_name = reqwest::header::HeaderName::from_bytes(key.as_bytes()).map_err(|e| {
            RepodocError::Repository {
                message: format!("Invalid header name '{}': {}", key, e),
                source: Some(Box::new(e)),
                context: ErrorContext::new("http_client").with_operation("create_client"),
            }
        })?;

        let header_value =
            reqwest::header::HeaderValue::from_str(value).map_err(|e| RepodocError::Repository {
                message: format!("Invalid header value for '{}': {}", key, e),
                source: Some(Box::new(e)),
                context: ErrorContext::new("http_client").with_operation("create_client"),
            })?;

        headers.insert(header_name, header_value);
    }

    reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(config.timeout_seconds))
        .default_headers(headers)
        .build()
        .map_err(|e| RepodocError::Repository {
            message: format!("Failed to create HTTP client: {}", e),
            source: Some(Box::new(e)),
            context: ErrorContext::new("http_client").with_operation("create_client"),
        })
}

/// Milliseconds to wait before retrying, from `Retry-After` or `x-ratelimit-reset`
fn retry_after_ms(headers: &reqwest::header::HeaderMap) -> Option<u64> {
    let header = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());

    if let Some(seconds) = header("retry-after").and_then(|v| v.trim().parse::<u64>().ok()) {
        return Some(seconds.saturating_mul(1000));
    }

    header("x-ratelimit-reset")
        .and_then(|v| v.trim().parse::<i64>().ok())
        .map(|reset| {
            let wait = reset.saturating_sub(chrono::Utc::now().timestamp()).max(0) as u64;
            wait.saturating_mul(1000)
        })
}

/// Translate a non-success response into a typed error.
///
/// Not-found, authentication and rate-limit failures get their own variants so
/// callers can tell them apart.
pub(crate) async fn handle_response_error(
    response: reqwest::Response,
    operation: &str,
    resource: &str,
) -> RepodocError {
    let status = response.status();
    let url = response.url().clone();
    let headers = response.headers().clone();
    let rate_limit_exhausted = headers
        .get("x-ratelimit-remaining")
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim() == "0")
        .unwrap_or(false);

    let error_body = response.text().await.unwrap_or_default();
    let detail = if error_body.is_empty() {
        status.canonical_reason().unwrap_or("Unknown error").to_string()
    } else {
        error_body
    };

    let context = ErrorContext::new("api_client")
        .with_operation(operation)
        .with_metadata("url", url.as_str())
        .with_metadata("status", &status.as_u16().to_string());

    match status.as_u16() {
        404 => RepodocError::NotFound {
            resource: resource.to_string(),
            context: context.with_suggestion("Repository, branch or file not found or not accessible"),
        },
        401 => RepodocError::Authentication {
            message: format!("HTTP 401 for {}: {}", url, detail),
            context: context.with_suggestion("Check your access token"),
        },
        429 => RepodocError::RateLimit {
            message: format!("HTTP 429 for {}: {}", url, detail),
            retry_after_ms: retry_after_ms(&headers),
            context: context.with_suggestion("Wait for the rate limit window to reset"),
        },
        403 if rate_limit_exhausted => RepodocError::RateLimit {
            message: format!("API rate limit exceeded for {}: {}", url, detail),
            retry_after_ms: retry_after_ms(&headers),
            context: context.with_suggestion("Authenticate to raise the rate limit"),
        },
        code => RepodocError::Repository {
            message: format!("HTTP {} error for {}: {}", code, url, detail),
            source: None,
            context: context.with_suggestion(if code == 403 {
                "Check repository permissions"
            } else {
                "Check network connectivity and API status"
            }),
        },
    }
}
