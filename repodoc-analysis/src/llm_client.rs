//! LLM client integration using siumai
//!
//! Adapts any siumai chat provider to the [`AnalysisClient`] collaborator.

use async_trait::async_trait;
use repodoc_core::{
    AnalysisClient, Completion, ErrorContext, LlmConfig, MessageRole, PromptMessage, RepodocError,
    RepodocResult,
};
use siumai::prelude::*;
use std::time::Instant;
use tracing::{debug, info};

/// Analysis client backed by a siumai chat provider
pub struct SiumaiAnalysisClient {
    client: Box<dyn ChatCapability + Send + Sync>,
    provider: String,
    model: String,
}

fn missing_key(provider: &str, variable: &str) -> RepodocError {
    RepodocError::Config {
        message: format!("{} API key not found", provider),
        source: None,
        context: ErrorContext::new("llm_client")
            .with_operation("build_client")
            .with_suggestion(&format!("Set llm.api_key or the {} environment variable", variable)),
    }
}

fn build_error(provider: &str, e: LlmError) -> RepodocError {
    RepodocError::Llm {
        message: format!("Failed to build {} client: {}", provider, e),
        provider: Some(provider.to_string()),
        model: None,
        context: ErrorContext::new("llm_client").with_operation("build_client"),
    }
}

impl SiumaiAnalysisClient {
    pub async fn new(config: &LlmConfig) -> RepodocResult<Self> {
        let client = Self::build_client(config).await?;

        info!(
            provider = %config.provider,
            model = %config.model,
            "Created LLM analysis client"
        );

        Ok(Self {
            client,
            provider: config.provider.clone(),
            model: config.model.clone(),
        })
    }

    /// Wrap an already constructed chat provider
    pub fn from_chat(client: Box<dyn ChatCapability + Send + Sync>, provider: &str, model: &str) -> Self {
        Self {
            client,
            provider: provider.to_string(),
            model: model.to_string(),
        }
    }

    async fn build_client(config: &LlmConfig) -> RepodocResult<Box<dyn ChatCapability + Send + Sync>> {
        let api_key = |variable: &str| {
            config
                .api_key
                .clone()
                .or_else(|| std::env::var(variable).ok())
        };

        match config.provider.as_str() {
            "openai" => {
                let api_key =
                    api_key("OPENAI_API_KEY").ok_or_else(|| missing_key("OpenAI", "OPENAI_API_KEY"))?;

                let mut builder = LlmBuilder::new()
                    .openai()
                    .api_key(&api_key)
                    .model(&config.model)
                    .temperature(config.temperature)
                    .max_tokens(config.max_tokens);

                if let Some(base_url) = &config.base_url {
                    builder = builder.base_url(base_url);
                }

                let client = builder.build().await.map_err(|e| build_error("OpenAI", e))?;
                Ok(Box::new(client))
            }
            "anthropic" => {
                let api_key = api_key("ANTHROPIC_API_KEY")
                    .ok_or_else(|| missing_key("Anthropic", "ANTHROPIC_API_KEY"))?;

                let client = LlmBuilder::new()
                    .anthropic()
                    .api_key(&api_key)
                    .model(&config.model)
                    .temperature(config.temperature)
                    .max_tokens(config.max_tokens)
                    .build()
                    .await
                    .map_err(|e| build_error("Anthropic", e))?;
                Ok(Box::new(client))
            }
            "ollama" => {
                let base_url = config
                    .base_url
                    .clone()
                    .unwrap_or_else(|| "http://localhost:11434".to_string());

                let client = LlmBuilder::new()
                    .ollama()
                    .model(&config.model)
                    .base_url(&base_url)
                    .temperature(config.temperature)
                    .max_tokens(config.max_tokens)
                    .build()
                    .await
                    .map_err(|e| build_error("Ollama", e))?;
                Ok(Box::new(client))
            }
            "groq" => {
                let api_key =
                    api_key("GROQ_API_KEY").ok_or_else(|| missing_key("Groq", "GROQ_API_KEY"))?;

                let client = LlmBuilder::new()
                    .groq()
                    .api_key(&api_key)
                    .model(&config.model)
                    .temperature(config.temperature)
                    .max_tokens(config.max_tokens)
                    .build()
                    .await
                    .map_err(|e| build_error("Groq", e))?;
                Ok(Box::new(client))
            }
            provider => Err(RepodocError::Config {
                message: format!("Unsupported LLM provider: {}", provider),
                source: None,
                context: ErrorContext::new("llm_client")
                    .with_operation("build_client")
                    .with_suggestion("Supported providers: openai, anthropic, ollama, groq"),
            }),
        }
    }

    fn to_chat_message(message: &PromptMessage) -> ChatMessage {
        let content = message.content.as_str();
        match message.role {
            MessageRole::System => system!(content),
            MessageRole::User => user!(content),
            MessageRole::Assistant => assistant!(content),
        }
    }

    fn map_error(&self, error: LlmError) -> RepodocError {
        let context = ErrorContext::new("llm_client")
            .with_operation("complete")
            .with_metadata("provider", &self.provider);
        match error {
            LlmError::RateLimitError(message) => RepodocError::RateLimit {
                message,
                retry_after_ms: None,
                context: context.with_suggestion("Lower analysis.max_concurrent_requests or raise min_request_interval_ms"),
            },
            other => RepodocError::Llm {
                message: format!("LLM generation failed: {}", other),
                provider: Some(self.provider.clone()),
                model: Some(self.model.clone()),
                context,
            },
        }
    }
}

/// Rough token count used when the provider reports no usage
fn estimate_tokens(text: &str) -> u64 {
    (text.chars().count() as u64).div_ceil(4)
}

#[async_trait]
impl AnalysisClient for SiumaiAnalysisClient {
    async fn complete(&self, messages: Vec<PromptMessage>) -> RepodocResult<Completion> {
        let start_time = Instant::now();
        debug!(messages = messages.len(), "Requesting completion");

        let prompt_tokens: u64 = messages.iter().map(|m| estimate_tokens(&m.content)).sum();
        let chat_messages = messages.iter().map(Self::to_chat_message).collect();

        let response = self
            .client
            .chat_with_tools(chat_messages, None)
            .await
            .map_err(|e| self.map_error(e))?;

        let Some(text) = response.content_text() else {
            return Err(RepodocError::Llm {
                message: "No text content in LLM response".to_string(),
                provider: Some(self.provider.clone()),
                model: Some(self.model.clone()),
                context: ErrorContext::new("llm_client").with_operation("complete"),
            });
        };
        let text = text.to_string();

        let tokens_used = response
            .usage
            .as_ref()
            .map(|u| u.total_tokens as u64)
            .unwrap_or_else(|| prompt_tokens + estimate_tokens(&text));

        debug!(
            elapsed_ms = start_time.elapsed().as_millis() as u64,
            chars = text.len(),
            tokens_used,
            "Completion received"
        );

        Ok(Completion { text, tokens_used })
    }

    fn describe(&self) -> String {
        format!("{}/{}", self.provider, self.model)
    }
}
