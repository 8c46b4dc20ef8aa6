//! Repodoc Analysis - chunking and AI analysis stages
//!
//! Fragmentation, per-chunk analysis, statistics aggregation and overview
//! generation, plus the siumai-backed analysis client.

pub mod aggregator;
pub mod chunk_analyzer;
pub mod fragmenter;
pub mod llm_client;
pub mod overview;
pub mod prompts;

pub use aggregator::aggregate;
pub use chunk_analyzer::{ChunkAnalysisReport, ChunkAnalyzer};
pub use fragmenter::{estimate_tokens, Fragmenter};
pub use llm_client::SiumaiAnalysisClient;
pub use overview::{compile_analysis_text, OverviewGenerator, OverviewOutcome};
