//! Stage-level error taxonomy for the analysis pipeline
//!
//! Only fatal conditions are represented here. Per-file fetch failures,
//! per-chunk analysis failures and overview failures are recorded as data on
//! the job and never reach the orchestrator as errors.

use repodoc_core::{ErrorContext, RepodocError};
use std::error::Error as StdError;
use thiserror::Error;

pub type PipelineResult<T> = Result<T, PipelineError>;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// Repository, branch or tree could not be resolved
    #[error("Fetch failed: {0}")]
    Fetch(#[source] RepodocError),

    /// A checkpoint or result write failed
    #[error("Persistence failed: {0}")]
    Persistence(#[source] RepodocError),

    /// Malformed file or chunk record at a stage boundary
    #[error("Invalid record: {0}")]
    InvalidRecord(#[source] RepodocError),

    #[error("Internal error: {message}")]
    Internal {
        message: String,
        #[source]
        source: Option<RepodocError>,
    },
}

impl PipelineError {
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal {
            message: message.into(),
            source: None,
        }
    }

    /// Classify an error escaping the chunk analyzer
    pub fn from_analysis(error: RepodocError) -> Self {
        match error {
            RepodocError::Validation { .. } => Self::InvalidRecord(error),
            RepodocError::Storage { .. } => Self::Persistence(error),
            other => Self::Internal {
                message: "Chunk analysis aborted".to_string(),
                source: Some(other),
            },
        }
    }

    /// Get error category for logs
    pub fn category(&self) -> &'static str {
        match self {
            Self::Fetch(_) => "fetch",
            Self::Persistence(_) => "persistence",
            Self::InvalidRecord(_) => "invalid_record",
            Self::Internal { .. } => "internal",
        }
    }

    /// The full error chain, outermost first
    pub fn detail(&self) -> String {
        let mut chain = vec![self.to_string()];
        let mut current = self.source();
        while let Some(cause) = current {
            chain.push(cause.to_string());
            current = cause.source();
        }
        chain.join("\ncaused by: ")
    }
}

impl From<PipelineError> for RepodocError {
    fn from(error: PipelineError) -> Self {
        match error {
            PipelineError::Fetch(e) | PipelineError::Persistence(e) | PipelineError::InvalidRecord(e) => e,
            PipelineError::Internal { message, source } => RepodocError::Internal {
                message,
                source: source.map(|e| Box::new(e) as Box<dyn StdError + Send + Sync>),
                context: ErrorContext::new("analysis_pipeline"),
            },
        }
    }
}
