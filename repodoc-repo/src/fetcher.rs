//! Content fetching
//!
//! Resolves a repository branch and downloads the filtered set of files it
//! contains. Resolution failures are fatal; individual file failures are
//! recorded as skips and fetching continues.

use crate::api::{BranchRef, RepositoryApiClient, RepositoryMetadata};
use crate::filter::{FileFilter, FilterDecision};
use repodoc_core::{FileRecord, RepodocResult};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Repository metadata plus the branch it resolved to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedRepository {
    pub owner: String,
    pub repo: String,
    pub metadata: RepositoryMetadata,
    pub branch: BranchRef,
}

/// A fetched file and its decoded content
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedFile {
    pub record: FileRecord,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SkipReason {
    TooLarge { size: u64, limit: u64 },
    FetchFailed { error: String },
}

/// A file accepted by the filter that was left out of the fetch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedFile {
    pub path: String,
    pub reason: SkipReason,
}

/// Files downloaded from a resolved tree, in tree order
#[derive(Debug, Clone, Default)]
pub struct DownloadedFiles {
    pub files: Vec<FetchedFile>,
    pub skipped: Vec<SkippedFile>,
}

#[derive(Debug, Clone)]
pub struct FetchOutcome {
    pub resolved: ResolvedRepository,
    pub files: Vec<FetchedFile>,
    pub skipped: Vec<SkippedFile>,
}

pub struct ContentFetcher {
    client: Arc<dyn RepositoryApiClient>,
    filter: FileFilter,
}

impl ContentFetcher {
    pub fn new(client: Arc<dyn RepositoryApiClient>, filter: FileFilter) -> Self {
        Self { client, filter }
    }

    pub fn filter(&self) -> &FileFilter {
        &self.filter
    }

    /// Resolve repository metadata and `branch` (default branch when `None`)
    pub async fn resolve(
        &self,
        owner: &str,
        repo: &str,
        branch: Option<&str>,
    ) -> RepodocResult<ResolvedRepository> {
        let metadata = self.client.get_repository_metadata(owner, repo).await?;
        let branch_name = branch.unwrap_or(&metadata.default_branch).to_string();
        let branch = self.client.resolve_branch(owner, repo, &branch_name).await?;

        info!(
            owner,
            repo,
            branch = %branch.name,
            commit = %branch.commit_sha,
            "Resolved repository branch"
        );

        Ok(ResolvedRepository {
            owner: owner.to_string(),
            repo: repo.to_string(),
            metadata,
            branch,
        })
    }

    /// Download every accepted file of the resolved tree.
    ///
    /// Only the tree listing can fail; per-file problems become [`SkippedFile`]s.
    pub async fn download(&self, resolved: &ResolvedRepository) -> RepodocResult<DownloadedFiles> {
        let (owner, repo) = (resolved.owner.as_str(), resolved.repo.as_str());
        let tree = self
            .client
            .get_file_tree(owner, repo, &resolved.branch.tree_sha)
            .await?;

        let mut downloaded = DownloadedFiles::default();
        let limit = self.filter.max_file_size();

        for entry in tree {
            match self.filter.decide(&entry.path) {
                FilterDecision::Include => {}
                decision => {
                    debug!(path = %entry.path, ?decision, "Filtered out");
                    continue;
                }
            }

            if let Some(size) = entry.size.filter(|s| self.filter.exceeds_size_cap(*s)) {
                info!(path = %entry.path, size, limit, "Skipping large file");
                downloaded.skipped.push(SkippedFile {
                    path: entry.path,
                    reason: SkipReason::TooLarge { size, limit },
                });
                continue;
            }

            let file = match self
                .client
                .get_file_content(owner, repo, &entry.path, &resolved.branch.commit_sha)
                .await
            {
                Ok(file) => file,
                Err(e) => {
                    warn!(path = %entry.path, error = %e, "Failed to fetch file, skipping");
                    downloaded.skipped.push(SkippedFile {
                        path: entry.path,
                        reason: SkipReason::FetchFailed {
                            error: e.to_string(),
                        },
                    });
                    continue;
                }
            };

            if self.filter.exceeds_size_cap(file.size) {
                info!(path = %entry.path, size = file.size, limit, "Skipping large file");
                downloaded.skipped.push(SkippedFile {
                    path: entry.path,
                    reason: SkipReason::TooLarge {
                        size: file.size,
                        limit,
                    },
                });
                continue;
            }

            match FileRecord::new(&entry.path, file.size, &file.content) {
                Ok(record) => downloaded.files.push(FetchedFile {
                    record,
                    content: file.content,
                }),
                Err(e) => {
                    warn!(path = %entry.path, error = %e, "Invalid file entry, skipping");
                    downloaded.skipped.push(SkippedFile {
                        path: entry.path,
                        reason: SkipReason::FetchFailed {
                            error: e.to_string(),
                        },
                    });
                }
            }
        }

        info!(
            owner,
            repo,
            fetched = downloaded.files.len(),
            skipped = downloaded.skipped.len(),
            "Downloaded repository files"
        );
        Ok(downloaded)
    }

    /// Resolve and download in one call
    pub async fn fetch(
        &self,
        owner: &str,
        repo: &str,
        branch: Option<&str>,
    ) -> RepodocResult<FetchOutcome> {
        let resolved = self.resolve(owner, repo, branch).await?;
        let downloaded = self.download(&resolved).await?;
        Ok(FetchOutcome {
            resolved,
            files: downloaded.files,
            skipped: downloaded.skipped,
        })
    }
}
