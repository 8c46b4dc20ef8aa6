//! Project overview generation

use crate::prompts::overview_messages;
use chrono::Utc;
use repodoc_core::{
    with_timeout, AnalysisClient, ChunkRecord, ComplexityLevel, OverviewState, ProjectContext,
    ProjectOverview, UsageStats,
};
use std::sync::Arc;
use tracing::{info, warn};

/// Concatenate successful chunk analyses as `"{path}\n{analysis}\n—\n"` blocks
pub fn compile_analysis_text(chunks: &[ChunkRecord]) -> String {
    chunks
        .iter()
        .filter(|chunk| chunk.analyzed)
        .filter_map(|chunk| {
            chunk
                .analysis
                .as_deref()
                .map(|analysis| format!("{}\n{}\n—\n", chunk.file_path, analysis))
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq)]
pub struct OverviewOutcome {
    pub state: OverviewState,
    pub usage: UsageStats,
}

pub struct OverviewGenerator {
    client: Arc<dyn AnalysisClient>,
    request_timeout_ms: u64,
    enabled: bool,
}

impl OverviewGenerator {
    pub fn new(client: Arc<dyn AnalysisClient>, request_timeout_ms: u64, enabled: bool) -> Self {
        Self {
            client,
            request_timeout_ms,
            enabled,
        }
    }

    /// Request a narrative overview. Never fails; a failed request is
    /// reported as [`OverviewState::Failed`].
    pub async fn generate(&self, context: &ProjectContext, analysis_text: &str) -> OverviewOutcome {
        if !self.enabled {
            return OverviewOutcome {
                state: OverviewState::NotRequested,
                usage: UsageStats::default(),
            };
        }

        let request = self.client.complete(overview_messages(context, analysis_text));
        match with_timeout(request, self.request_timeout_ms, "overview_generation")
            .await
            .and_then(|result| result)
        {
            Ok(completion) => {
                info!(
                    repository = %context.full_name,
                    tokens = completion.tokens_used,
                    "Generated project overview"
                );
                let mut usage = UsageStats::default();
                usage.record_call(completion.tokens_used);
                OverviewOutcome {
                    state: OverviewState::Generated {
                        overview: ProjectOverview {
                            summary: completion.text,
                            complexity: ComplexityLevel::Medium,
                            generated_at: Utc::now(),
                        },
                    },
                    usage,
                }
            }
            Err(e) => {
                warn!(repository = %context.full_name, error = %e, "Overview generation failed");
                OverviewOutcome {
                    state: OverviewState::Failed {
                        reason: e.to_string(),
                    },
                    usage: UsageStats::default(),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(path: &str, analyzed: bool, analysis: Option<&str>) -> ChunkRecord {
        ChunkRecord {
            id: format!("job_{}", path),
            file_path: path.to_string(),
            file_name: path.to_string(),
            extension: None,
            content: "x".to_string(),
            start_line: 1,
            end_line: 1,
            estimated_tokens: 1,
            chunk_number: 1,
            total_chunks: 1,
            analyzed,
            analysis: analysis.map(str::to_string),
        }
    }

    #[test]
    fn test_compiled_text_skips_failures() {
        let chunks = vec![
            chunk("a.rs", true, Some("does a")),
            chunk("b.rs", false, Some("Analysis failed: timeout")),
            chunk("c.rs", true, Some("does c")),
        ];
        assert_eq!(
            compile_analysis_text(&chunks),
            "a.rs\ndoes a\n—\nc.rs\ndoes c\n—\n"
        );
    }
}
