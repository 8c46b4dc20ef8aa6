//! Core trait definitions
//!
//! Collaborators consumed by the analysis pipeline.

use crate::error::RepodocResult;
use crate::types::{AnalysisEvent, AnalysisStep};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

/// A role-tagged message sent to the analysis collaborator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptMessage {
    pub role: MessageRole,
    pub content: String,
}

impl PromptMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }
}

/// Generated text plus token usage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Completion {
    pub text: String,
    pub tokens_used: u64,
}

/// Remote text-generation capability
///
/// Rate limiting surfaces as `RepodocError::RateLimit`; callers decide whether
/// to retry.
#[async_trait]
pub trait AnalysisClient: Send + Sync {
    async fn complete(&self, messages: Vec<PromptMessage>) -> RepodocResult<Completion>;

    /// Provider/model label for logs
    fn describe(&self) -> String {
        "analysis-client".to_string()
    }
}

/// Per-user, best-effort event publication
pub trait NotificationChannel: Send + Sync {
    /// Publish never fails the caller; undeliverable events are dropped
    fn publish(&self, user_id: &str, event: AnalysisEvent);
}

/// Receives progress updates from long-running stages
#[async_trait]
pub trait ProgressSink: Send + Sync {
    /// `percentage` is local to the reporting stage (0..=100)
    async fn report(&self, step: AnalysisStep, percentage: u8, message: &str) -> RepodocResult<()>;
}

/// Progress sink that discards updates
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopProgress;

#[async_trait]
impl ProgressSink for NoopProgress {
    async fn report(&self, _step: AnalysisStep, _percentage: u8, _message: &str) -> RepodocResult<()> {
        Ok(())
    }
}
