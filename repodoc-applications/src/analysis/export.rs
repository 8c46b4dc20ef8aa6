//! Analysis text export

use repodoc_core::RepodocResult;
use std::path::{Path, PathBuf};
use tracing::info;

/// A written analysis file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportedAnalysis {
    pub path: PathBuf,
    pub size: usize,
}

/// `{owner}_{repo}_analysis.txt`
pub fn analysis_file_name(owner: &str, repo: &str) -> String {
    format!("{}_{}_analysis.txt", owner, repo)
}

/// Write the compiled analysis text into `dir`, creating it if needed
pub async fn write_analysis_file(
    dir: &Path,
    owner: &str,
    repo: &str,
    analysis_text: &str,
) -> RepodocResult<ExportedAnalysis> {
    tokio::fs::create_dir_all(dir).await?;
    let path = dir.join(analysis_file_name(owner, repo));
    tokio::fs::write(&path, analysis_text).await?;

    info!(path = %path.display(), bytes = analysis_text.len(), "Wrote analysis file");
    Ok(ExportedAnalysis {
        path,
        size: analysis_text.len(),
    })
}
