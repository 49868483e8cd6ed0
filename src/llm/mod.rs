//! LLM — the Answer Provider.
//!
//! DESIGN
//! ======
//! Configured from environment variables. The provider is an explicit enum
//! chosen once at construction; there is no per-request dispatch on model
//! name strings. `OpenAI` and Qwen share the chat completions client.

pub mod anthropic;
pub mod config;
pub mod openai;
pub mod types;

use config::{LlmConfig, LlmProviderKind};
pub use types::AnswerProvider;
use types::{Completion, GenerationParams, LlmError};

// =============================================================================
// CLIENT DISPATCH
// =============================================================================

/// Concrete LLM client that dispatches to an `OpenAI`-compatible or Anthropic API.
///
/// Configured from environment variables by [`LlmClient::from_env`].
pub struct LlmClient {
    inner: LlmProvider,
    kind: LlmProviderKind,
    model: String,
    system_prompt: String,
    params: GenerationParams,
}

enum LlmProvider {
    Anthropic(anthropic::AnthropicClient),
    OpenAiCompatible(openai::OpenAiClient),
}

impl LlmClient {
    /// Build an LLM client from environment variables. See [`LlmConfig::from_env`].
    ///
    /// # Errors
    ///
    /// Returns an error if the config is invalid, the API key is missing,
    /// or the HTTP client fails.
    pub fn from_env() -> Result<Self, LlmError> {
        let config = LlmConfig::from_env()?;
        Self::from_config(config)
    }

    /// Build an LLM client from a parsed typed config.
    ///
    /// # Errors
    ///
    /// Returns an error if the provider HTTP client fails to build.
    pub fn from_config(config: LlmConfig) -> Result<Self, LlmError> {
        let inner = match config.provider {
            LlmProviderKind::Anthropic => LlmProvider::Anthropic(anthropic::AnthropicClient::new(
                config.api_key,
                config.base_url,
                config.timeouts,
            )?),
            LlmProviderKind::OpenAi | LlmProviderKind::Qwen => LlmProvider::OpenAiCompatible(
                openai::OpenAiClient::new(config.api_key, config.base_url, config.timeouts)?,
            ),
        };
        Ok(Self {
            inner,
            kind: config.provider,
            model: config.model,
            system_prompt: config.system_prompt,
            params: config.params,
        })
    }

    /// Return the configured model name (e.g. `"gpt-4.1"`).
    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }

    #[must_use]
    pub fn provider(&self) -> LlmProviderKind {
        self.kind
    }

    /// Sampling parameters configured for this deployment.
    #[must_use]
    pub fn params(&self) -> GenerationParams {
        self.params
    }

    async fn complete(&self, question: &str, params: &GenerationParams) -> Result<Completion, LlmError> {
        match &self.inner {
            LlmProvider::Anthropic(c) => {
                c.complete(&self.model, &self.system_prompt, question, params)
                    .await
            }
            LlmProvider::OpenAiCompatible(c) => {
                c.complete(&self.model, &self.system_prompt, question, params)
                    .await
            }
        }
    }
}

#[async_trait::async_trait]
impl AnswerProvider for LlmClient {
    async fn assist(&self, question: &str, params: &GenerationParams) -> Result<String, LlmError> {
        let completion = self.complete(question, params).await?;
        tracing::debug!(
            provider = self.kind.as_str(),
            model = %completion.model,
            stop_reason = %completion.stop_reason,
            input_tokens = completion.input_tokens,
            output_tokens = completion.output_tokens,
            "llm: completion received"
        );
        let text = completion.text.trim();
        if text.is_empty() {
            return Err(LlmError::EmptyAnswer);
        }
        Ok(text.to_string())
    }
}
