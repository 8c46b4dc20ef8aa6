//! Chunk analysis
//!
//! Submits every chunk to the analysis collaborator through a rate limiter,
//! records each result on the chunk and reports progress after every chunk.
//! A failed chunk never stops the loop.

use crate::prompts::chunk_analysis_messages;
use futures::stream::{self, StreamExt};
use repodoc_core::{
    with_timeout, AnalysisClient, AnalysisConfig, AnalysisStep, ChunkRecord, Completion,
    ProgressSink, ProjectContext, RateLimiter, RepodocResult, UsageStats,
};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Result of analysing a chunk list
#[derive(Debug, Clone)]
pub struct ChunkAnalysisReport {
    /// Every input chunk, in input order, each with `analysis` set
    pub chunks: Vec<ChunkRecord>,
    /// Accumulated over successful calls only
    pub usage: UsageStats,
    pub succeeded: usize,
    pub failed: usize,
}

impl ChunkAnalysisReport {
    pub fn processed(&self) -> usize {
        self.succeeded + self.failed
    }
}

pub struct ChunkAnalyzer {
    client: Arc<dyn AnalysisClient>,
    limiter: RateLimiter,
    max_in_flight: usize,
    request_timeout_ms: u64,
}

impl ChunkAnalyzer {
    pub fn new(client: Arc<dyn AnalysisClient>, config: &AnalysisConfig) -> Self {
        let max_in_flight = config.max_concurrent_requests.max(1);
        Self {
            client,
            limiter: RateLimiter::new(max_in_flight, config.min_request_interval_ms),
            max_in_flight,
            request_timeout_ms: config.request_timeout_ms,
        }
    }

    /// Analyse `chunks` in order.
    ///
    /// Returns an error only for malformed input or a failed progress report;
    /// per-chunk failures are recorded as `"Analysis failed: {reason}"`.
    pub async fn analyze(
        &self,
        chunks: Vec<ChunkRecord>,
        context: &ProjectContext,
        progress: &dyn ProgressSink,
    ) -> RepodocResult<ChunkAnalysisReport> {
        for chunk in &chunks {
            chunk.validate()?;
        }

        let total = chunks.len();
        info!(
            chunks = total,
            client = %self.client.describe(),
            max_in_flight = self.max_in_flight,
            "Starting chunk analysis"
        );

        let mut report = ChunkAnalysisReport {
            chunks: Vec::with_capacity(total),
            usage: UsageStats::default(),
            succeeded: 0,
            failed: 0,
        };

        // `buffered` yields results in submission order
        let mut results = stream::iter(chunks)
            .map(|chunk| async move {
                let result = self.analyze_one(&chunk, context).await;
                (chunk, result)
            })
            .buffered(self.max_in_flight);

        while let Some((mut chunk, result)) = results.next().await {
            match result {
                Ok(completion) => {
                    debug!(chunk_id = %chunk.id, tokens = completion.tokens_used, "Chunk analyzed");
                    report.usage.record_call(completion.tokens_used);
                    report.succeeded += 1;
                    chunk.record_success(completion.text);
                }
                Err(e) => {
                    warn!(
                        chunk_id = %chunk.id,
                        path = %chunk.file_path,
                        error = %e,
                        recoverable = e.is_recoverable(),
                        retry_after_ms = ?e.retry_delay_ms(),
                        "Chunk analysis failed"
                    );
                    report.failed += 1;
                    chunk.record_failure(format!("Analysis failed: {}", e));
                }
            }
            report.chunks.push(chunk);

            let processed = report.processed();
            let percentage = ((processed as f64 / total as f64) * 100.0).round() as u8;
            progress
                .report(
                    AnalysisStep::Analyzing,
                    percentage,
                    &format!("Analyzed {}/{} code chunks", processed, total),
                )
                .await?;
        }

        info!(
            succeeded = report.succeeded,
            failed = report.failed,
            tokens_used = report.usage.tokens_used,
            api_calls = report.usage.api_calls,
            "Chunk analysis finished"
        );
        Ok(report)
    }

    async fn analyze_one(
        &self,
        chunk: &ChunkRecord,
        context: &ProjectContext,
    ) -> RepodocResult<Completion> {
        let _guard = self.limiter.acquire().await?;
        let messages = chunk_analysis_messages(chunk, context);
        with_timeout(
            self.client.complete(messages),
            self.request_timeout_ms,
            "chunk_analysis",
        )
        .await?
    }
}
