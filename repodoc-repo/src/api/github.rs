//! GitHub API client implementation

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use repodoc_core::{ErrorContext, RepodocError, RepodocResult};
use serde::Deserialize;
use tracing::{debug, info, warn};

use super::{
    create_http_client, handle_response_error, ApiClientConfig, BranchRef, FileContent,
    RepositoryApiClient, RepositoryFile, RepositoryMetadata,
};

/// GitHub API client
pub struct GitHubApiClient {
    client: reqwest::Client,
    config: ApiClientConfig,
}

#[derive(Debug, Deserialize)]
struct GitHubRepository {
    name: String,
    full_name: String,
    description: Option<String>,
    default_branch: String,
    language: Option<String>,
    topics: Option<Vec<String>>,
    size: Option<u64>,
    #[serde(default)]
    private: bool,
}

#[derive(Debug, Deserialize)]
struct GitHubBranch {
    name: String,
    commit: GitHubBranchCommit,
}

#[derive(Debug, Deserialize)]
struct GitHubBranchCommit {
    sha: String,
    commit: GitHubCommitDetail,
}

#[derive(Debug, Deserialize)]
struct GitHubCommitDetail {
    tree: GitHubShaRef,
}

#[derive(Debug, Deserialize)]
struct GitHubShaRef {
    sha: String,
}

#[derive(Debug, Deserialize)]
struct GitHubTreeResponse {
    tree: Vec<GitHubTreeItem>,
    truncated: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct GitHubTreeItem {
    path: String,
    #[serde(rename = "type")]
    item_type: String,
    size: Option<u64>,
    sha: String,
}

#[derive(Debug, Deserialize)]
struct GitHubContentResponse {
    content: String,
    encoding: String,
    size: u64,
    sha: String,
}

/// Percent-encode each segment of a slash-separated path
fn encode_path(path: &str) -> String {
    path.split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

impl GitHubApiClient {
    pub fn new(config: ApiClientConfig) -> RepodocResult<Self> {
        let client = create_http_client(&config)?;

        info!(base_url = %config.base_url, "Created GitHub API client");

        Ok(Self { client, config })
    }

    fn create_auth_headers(&self) -> reqwest::header::HeaderMap {
        let mut headers = reqwest::header::HeaderMap::new();

        if let Some(ref token) = self.config.access_token {
            if let Ok(auth_value) =
                reqwest::header::HeaderValue::from_str(&format!("token {}", token))
            {
                headers.insert(reqwest::header::AUTHORIZATION, auth_value);
            }
        }

        headers.insert(
            reqwest::header::ACCEPT,
            reqwest::header::HeaderValue::from_static("application/vnd.github.v3+json"),
        );

        headers
    }

    /// GET `endpoint` relative to the base URL; non-success statuses become typed errors
    async fn get_request(&self, endpoint: &str, resource: &str) -> RepodocResult<reqwest::Response> {
        let url = format!(
            "{}/{}",
            self.config.base_url.trim_end_matches('/'),
            endpoint.trim_start_matches('/')
        );

        debug!(url = %url, "Making GitHub API request");

        let response = self
            .client
            .get(&url)
            .headers(self.create_auth_headers())
            .send()
            .await
            .map_err(|e| RepodocError::Network {
                message: format!("Failed to make request to GitHub API: {}", e),
                source: Some(Box::new(e)),
                context: ErrorContext::new("github_api_client")
                    .with_operation("get_request")
                    .with_metadata("url", &url),
            })?;

        if !response.status().is_success() {
            return Err(handle_response_error(response, "github_api_request", resource).await);
        }

        Ok(response)
    }

    async fn parse_json<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
        operation: &str,
    ) -> RepodocResult<T> {
        response.json().await.map_err(|e| RepodocError::Repository {
            message: format!("Failed to parse GitHub response: {}", e),
            source: Some(Box::new(e)),
            context: ErrorContext::new("github_api_client").with_operation(operation),
        })
    }

    /// Decode base64 content from GitHub API
    fn decode_base64_content(content: &str, path: &str) -> RepodocResult<String> {
        let cleaned_content = content.replace(['\n', '\r', ' '], "");

        let decoded_bytes = BASE64
            .decode(&cleaned_content)
            .map_err(|e| RepodocError::Repository {
                message: format!("Failed to decode base64 content of {}: {}", path, e),
                source: Some(Box::new(e)),
                context: ErrorContext::new("github_api_client")
                    .with_operation("decode_base64_content"),
            })?;

        match String::from_utf8(decoded_bytes) {
            Ok(content) => Ok(content),
            Err(e) => {
                warn!(path, "Content is not valid UTF-8, replacing invalid bytes");
                Ok(String::from_utf8_lossy(e.as_bytes()).into_owned())
            }
        }
    }
}

#[async_trait]
impl RepositoryApiClient for GitHubApiClient {
    async fn get_repository_metadata(
        &self,
        owner: &str,
        repo: &str,
    ) -> RepodocResult<RepositoryMetadata> {
        info!(owner, repo, "Fetching GitHub repository metadata");

        let endpoint = format!("repos/{}/{}", encode_path(owner), encode_path(repo));
        let response = self
            .get_request(&endpoint, &format!("repository {}/{}", owner, repo))
            .await?;
        let github_repo: GitHubRepository =
            Self::parse_json(response, "get_repository_metadata").await?;

        Ok(RepositoryMetadata {
            name: github_repo.name,
            full_name: github_repo.full_name,
            description: github_repo.description,
            default_branch: github_repo.default_branch,
            language: github_repo.language,
            topics: github_repo.topics.unwrap_or_default(),
            size: github_repo.size,
            private: github_repo.private,
        })
    }

    async fn resolve_branch(
        &self,
        owner: &str,
        repo: &str,
        branch: &str,
    ) -> RepodocResult<BranchRef> {
        debug!(owner, repo, branch, "Resolving GitHub branch");

        let endpoint = format!(
            "repos/{}/{}/branches/{}",
            encode_path(owner),
            encode_path(repo),
            urlencoding::encode(branch)
        );
        let response = self
            .get_request(&endpoint, &format!("branch {} of {}/{}", branch, owner, repo))
            .await?;
        let github_branch: GitHubBranch = Self::parse_json(response, "resolve_branch").await?;

        Ok(BranchRef {
            name: github_branch.name,
            commit_sha: github_branch.commit.sha,
            tree_sha: github_branch.commit.commit.tree.sha,
        })
    }

    async fn get_file_tree(
        &self,
        owner: &str,
        repo: &str,
        tree_ref: &str,
    ) -> RepodocResult<Vec<RepositoryFile>> {
        info!(owner, repo, tree_ref, "Fetching GitHub file tree");

        let endpoint = format!(
            "repos/{}/{}/git/trees/{}?recursive=1",
            encode_path(owner),
            encode_path(repo),
            urlencoding::encode(tree_ref)
        );
        let response = self
            .get_request(&endpoint, &format!("tree {} of {}/{}", tree_ref, owner, repo))
            .await?;
        let tree_response: GitHubTreeResponse = Self::parse_json(response, "get_file_tree").await?;

        if tree_response.truncated.unwrap_or(false) {
            warn!(owner, repo, "GitHub file tree was truncated; some files will be missing");
        }

        let files: Vec<RepositoryFile> = tree_response
            .tree
            .into_iter()
            .filter(|item| item.item_type == "blob")
            .map(|item| RepositoryFile {
                path: item.path,
                file_type: item.item_type,
                size: item.size,
                sha: Some(item.sha),
            })
            .collect();

        info!(owner, repo, files = files.len(), "Retrieved GitHub file tree");
        Ok(files)
    }

    async fn get_file_content(
        &self,
        owner: &str,
        repo: &str,
        path: &str,
        git_ref: &str,
    ) -> RepodocResult<FileContent> {
        debug!(owner, repo, path, "Fetching GitHub file content");

        let endpoint = format!(
            "repos/{}/{}/contents/{}?ref={}",
            encode_path(owner),
            encode_path(repo),
            encode_path(path),
            urlencoding::encode(git_ref)
        );
        let response = self.get_request(&endpoint, &format!("file {}", path)).await?;
        let content_response: GitHubContentResponse =
            Self::parse_json(response, "get_file_content").await?;

        if content_response.encoding != "base64" {
            return Err(RepodocError::Repository {
                message: format!(
                    "Unexpected encoding '{}' for {}",
                    content_response.encoding, path
                ),
                source: None,
                context: ErrorContext::new("github_api_client")
                    .with_operation("get_file_content")
                    .with_suggestion("Files larger than 1 MB are not served through the contents API"),
            });
        }

        Ok(FileContent {
            content: Self::decode_base64_content(&content_response.content, path)?,
            size: content_response.size,
            sha: content_response.sha,
        })
    }
}
