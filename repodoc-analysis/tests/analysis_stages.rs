//! Fragmenter, chunk analyzer, aggregator and overview working together

use async_trait::async_trait;
use repodoc_analysis::{
    aggregate, compile_analysis_text, ChunkAnalyzer, Fragmenter, OverviewGenerator,
};
use repodoc_core::{
    AnalysisClient, AnalysisConfig, AnalysisStep, Completion, ErrorContext, FileRecord,
    OverviewState, ProgressSink, ProjectContext, PromptMessage, RepodocError, RepodocResult,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// Answers every request, failing the calls whose 1-based index is listed
struct MockAnalysisClient {
    calls: AtomicUsize,
    fail_on: Vec<usize>,
}

impl MockAnalysisClient {
    fn new(fail_on: Vec<usize>) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            fail_on,
        }
    }
}

#[async_trait]
impl AnalysisClient for MockAnalysisClient {
    async fn complete(&self, messages: Vec<PromptMessage>) -> RepodocResult<Completion> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_on.contains(&call) {
            return Err(RepodocError::Llm {
                message: format!("call {} rejected", call),
                provider: Some("mock".to_string()),
                model: None,
                context: ErrorContext::new("mock"),
            });
        }
        let prompt = &messages[1].content;
        let file_line = prompt
            .lines()
            .find(|l| l.starts_with("Code chunk from file:"))
            .unwrap_or("overview");
        Ok(Completion {
            text: format!("analysis #{} of {}", call, file_line),
            tokens_used: 10,
        })
    }
}

#[derive(Default)]
struct RecordingProgress {
    updates: Mutex<Vec<(AnalysisStep, u8, String)>>,
}

#[async_trait]
impl ProgressSink for RecordingProgress {
    async fn report(&self, step: AnalysisStep, percentage: u8, message: &str) -> RepodocResult<()> {
        self.updates
            .lock()
            .unwrap()
            .push((step, percentage, message.to_string()));
        Ok(())
    }
}

struct FailingProgress;

#[async_trait]
impl ProgressSink for FailingProgress {
    async fn report(&self, _: AnalysisStep, _: u8, _: &str) -> RepodocResult<()> {
        Err(repodoc_core::storage_error!("checkpoint write failed", "test"))
    }
}

fn fast_config() -> AnalysisConfig {
    AnalysisConfig {
        min_request_interval_ms: 0,
        ..AnalysisConfig::default()
    }
}

/// `lines` lines of `width` characters each, newline separated
fn text(lines: usize, width: usize) -> String {
    (0..lines)
        .map(|i| {
            let mut line = format!("{:04}", i);
            line.push_str(&"x".repeat(width - 4));
            line
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn record(path: &str, content: &str) -> FileRecord {
    FileRecord::new(path, content.len() as u64, content).unwrap()
}

#[test]
fn test_file_within_budget_is_one_chunk() {
    // 100 lines, 12_000 characters including separators
    let content = text(100, 119) + "x";
    assert_eq!(content.chars().count(), 12_000);
    let file = record("src/small.rs", &content);

    let chunks = Fragmenter::new(3000)
        .unwrap()
        .fragment("job", [(&file, content.as_str())])
        .unwrap();

    assert_eq!(chunks.len(), 1);
    assert_eq!((chunks[0].start_line, chunks[0].end_line), (1, 100));
    assert_eq!((chunks[0].chunk_number, chunks[0].total_chunks), (1, 1));
    assert_eq!(chunks[0].estimated_tokens, 3000);
}

#[test]
fn test_large_file_is_split_into_equal_line_ranges() {
    // 400 lines, 48_000 characters
    let content = text(400, 119) + "x";
    assert_eq!(content.chars().count(), 48_000);
    let file = record("src/big.rs", &content);

    let chunks = Fragmenter::new(3000)
        .unwrap()
        .fragment("job", [(&file, content.as_str())])
        .unwrap();

    let ranges: Vec<(usize, usize)> = chunks.iter().map(|c| (c.start_line, c.end_line)).collect();
    assert_eq!(ranges, vec![(1, 100), (101, 200), (201, 300), (301, 400)]);
    assert!(chunks.iter().all(|c| c.total_chunks == 4));
    let numbers: Vec<usize> = chunks.iter().map(|c| c.chunk_number).collect();
    assert_eq!(numbers, vec![1, 2, 3, 4]);
}

#[test]
fn test_chunks_partition_every_file() {
    let fragmenter = Fragmenter::new(50).unwrap();
    for (lines, width) in [(1, 10), (7, 90), (33, 5), (250, 40), (999, 13)] {
        let content = text(lines, width);
        let file = record("src/any.rs", &content);
        let chunks = fragmenter
            .fragment("job", [(&file, content.as_str())])
            .unwrap();

        let mut expected_start = 1;
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.start_line, expected_start);
            assert_eq!(chunk.chunk_number, i + 1);
            assert_eq!(chunk.total_chunks, chunks.len());
            expected_start = chunk.end_line + 1;
        }
        assert_eq!(expected_start - 1, lines);
        let covered: usize = chunks.iter().map(|c| c.line_span()).sum();
        assert_eq!(covered, lines);

        let rejoined = chunks
            .iter()
            .map(|c| c.content.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        assert_eq!(rejoined, content);
    }
}

#[tokio::test]
async fn test_failed_chunk_does_not_stop_analysis() {
    let files: Vec<(FileRecord, String)> = (1..=5)
        .map(|i| {
            let content = format!("fn f{}() {{}}", i);
            (record(&format!("src/f{}.rs", i), &content), content)
        })
        .collect();
    let chunks = Fragmenter::new(3000)
        .unwrap()
        .fragment("job", files.iter().map(|(r, c)| (r, c.as_str())))
        .unwrap();
    assert_eq!(chunks.len(), 5);

    let client = std::sync::Arc::new(MockAnalysisClient::new(vec![2]));
    let analyzer = ChunkAnalyzer::new(client.clone(), &fast_config());
    let progress = RecordingProgress::default();
    let report = analyzer
        .analyze(chunks, &ProjectContext::default(), &progress)
        .await
        .unwrap();

    assert_eq!(report.processed(), 5);
    assert_eq!((report.succeeded, report.failed), (4, 1));
    assert_eq!(report.usage.api_calls, 4);
    assert_eq!(report.usage.tokens_used, 40);

    let second = &report.chunks[1];
    assert!(!second.analyzed);
    assert!(second
        .analysis
        .as_deref()
        .unwrap()
        .starts_with("Analysis failed: "));
    for i in [0, 2, 3, 4] {
        assert!(report.chunks[i].analyzed);
        assert!(report.chunks[i]
            .analysis
            .as_deref()
            .unwrap()
            .contains(&format!("src/f{}.rs", i + 1)));
    }

    let updates = progress.updates.lock().unwrap();
    let percentages: Vec<u8> = updates.iter().map(|u| u.1).collect();
    assert_eq!(percentages, vec![20, 40, 60, 80, 100]);
    assert_eq!(updates[2].2, "Analyzed 3/5 code chunks");

    let files_only: Vec<FileRecord> = files.into_iter().map(|(r, _)| r).collect();
    let stats = aggregate(&files_only, &report.chunks).unwrap();
    assert_eq!(stats.processed_chunks, 5);
    assert_eq!(stats.analyzed_chunks, 4);
    assert_eq!(stats.failed_chunks, 1);
}

#[tokio::test]
async fn test_every_chunk_failing_still_completes() {
    let content = text(40, 50);
    let file = record("src/a.rs", &content);
    let chunks = Fragmenter::new(100)
        .unwrap()
        .fragment("job", [(&file, content.as_str())])
        .unwrap();
    let total = chunks.len();

    let client = std::sync::Arc::new(MockAnalysisClient::new((1..=total).collect()));
    let report = ChunkAnalyzer::new(client, &fast_config())
        .analyze(chunks, &ProjectContext::default(), &RecordingProgress::default())
        .await
        .unwrap();

    assert_eq!(report.failed, total);
    assert!(report.chunks.iter().all(|c| c.is_processed()));
    assert_eq!(compile_analysis_text(&report.chunks), "");
}

struct RateLimitedClient;

#[async_trait]
impl AnalysisClient for RateLimitedClient {
    async fn complete(&self, _: Vec<PromptMessage>) -> RepodocResult<Completion> {
        Err(RepodocError::RateLimit {
            message: "429 from provider".to_string(),
            retry_after_ms: Some(u64::MAX),
            context: ErrorContext::new("mock"),
        })
    }
}

#[tokio::test]
async fn test_rate_limited_chunk_is_recorded_as_failed() {
    let file = record("src/a.rs", "fn a() {}");
    let chunks = Fragmenter::new(100)
        .unwrap()
        .fragment("job", [(&file, "fn a() {}")])
        .unwrap();

    let report = ChunkAnalyzer::new(std::sync::Arc::new(RateLimitedClient), &fast_config())
        .analyze(chunks, &ProjectContext::default(), &RecordingProgress::default())
        .await
        .unwrap();

    assert_eq!((report.succeeded, report.failed), (0, 1));
    assert_eq!(report.usage.api_calls, 0);
    assert_eq!(
        report.chunks[0].analysis.as_deref(),
        Some("Analysis failed: Rate limit exceeded: 429 from provider")
    );
}

#[tokio::test]
async fn test_progress_failure_is_fatal() {
    let file = record("a.rs", "fn a() {}");
    let chunks = Fragmenter::new(100)
        .unwrap()
        .fragment("job", [(&file, "fn a() {}")])
        .unwrap();

    let client = std::sync::Arc::new(MockAnalysisClient::new(vec![]));
    let result = ChunkAnalyzer::new(client, &fast_config())
        .analyze(chunks, &ProjectContext::default(), &FailingProgress)
        .await;
    assert!(matches!(result, Err(RepodocError::Storage { .. })));
}

#[tokio::test]
async fn test_concurrent_submission_keeps_order() {
    let files: Vec<(FileRecord, String)> = (1..=6)
        .map(|i| {
            let content = format!("// file {}", i);
            (record(&format!("f{}.rs", i), &content), content)
        })
        .collect();
    let chunks = Fragmenter::new(100)
        .unwrap()
        .fragment("job", files.iter().map(|(r, c)| (r, c.as_str())))
        .unwrap();

    let config = AnalysisConfig {
        max_concurrent_requests: 3,
        ..fast_config()
    };
    let client = std::sync::Arc::new(MockAnalysisClient::new(vec![]));
    let report = ChunkAnalyzer::new(client, &config)
        .analyze(chunks, &ProjectContext::default(), &RecordingProgress::default())
        .await
        .unwrap();

    let paths: Vec<&str> = report.chunks.iter().map(|c| c.file_path.as_str()).collect();
    assert_eq!(paths, vec!["f1.rs", "f2.rs", "f3.rs", "f4.rs", "f5.rs", "f6.rs"]);
}

#[tokio::test]
async fn test_overview_states() {
    let context = ProjectContext {
        full_name: "acme/widgets".to_string(),
        ..ProjectContext::default()
    };

    let ok = OverviewGenerator::new(std::sync::Arc::new(MockAnalysisClient::new(vec![])), 1000, true)
        .generate(&context, "a.rs\ndoes a\n—\n")
        .await;
    match ok.state {
        OverviewState::Generated { overview } => {
            assert!(overview.summary.starts_with("analysis #1"));
        }
        other => panic!("expected overview, got {other:?}"),
    }
    assert_eq!(ok.usage.api_calls, 1);

    let failed = OverviewGenerator::new(std::sync::Arc::new(MockAnalysisClient::new(vec![1])), 1000, true)
        .generate(&context, "")
        .await;
    assert!(matches!(failed.state, OverviewState::Failed { .. }));
    assert_eq!(failed.usage.api_calls, 0);

    let disabled = OverviewGenerator::new(std::sync::Arc::new(MockAnalysisClient::new(vec![])), 1000, false)
        .generate(&context, "")
        .await;
    assert_eq!(disabled.state, OverviewState::NotRequested);
}
