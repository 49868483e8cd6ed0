//! LLM configuration parsed from environment variables.

use super::types::{GenerationParams, LlmError};

pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com/v1";
pub const DEFAULT_QWEN_BASE_URL: &str = "https://dashscope-intl.aliyuncs.com/compatible-mode/v1";
pub const DEFAULT_LLM_REQUEST_TIMEOUT_SECS: u64 = 120;
pub const DEFAULT_LLM_CONNECT_TIMEOUT_SECS: u64 = 10;

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful, smart and pleasant assistant. \
Answer any kind of question kindly, with broad literary erudition and a light futuristic touch. \
Your answer will be read aloud, so keep it conversational.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmProviderKind {
    OpenAi,
    Anthropic,
    /// Alibaba `DashScope`, `OpenAI`-compatible mode.
    Qwen,
}

impl LlmProviderKind {
    /// Guess the provider from a model name.
    ///
    /// `gpt` or `tts` selects `OpenAI`, `claude` Anthropic, `qwen` Qwen.
    #[must_use]
    pub fn infer_from_model(model: &str) -> Option<Self> {
        let lower = model.to_lowercase();
        if lower.contains("gpt") || lower.contains("tts") {
            Some(Self::OpenAi)
        } else if lower.contains("claude") {
            Some(Self::Anthropic)
        } else if lower.contains("qwen") {
            Some(Self::Qwen)
        } else {
            None
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Anthropic => "anthropic",
            Self::Qwen => "qwen",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LlmTimeouts {
    pub request_secs: u64,
    pub connect_secs: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LlmConfig {
    pub provider: LlmProviderKind,
    pub api_key: String,
    pub model: String,
    pub base_url: String,
    pub system_prompt: String,
    pub params: GenerationParams,
    pub timeouts: LlmTimeouts,
}

impl LlmConfig {
    /// Build typed LLM config from environment variables.
    ///
    /// Optional:
    /// - `LLM_PROVIDER`: `openai`, `anthropic` or `qwen`; inferred from `LLM_MODEL` when absent
    /// - `LLM_MODEL`: provider default when absent (`gpt-4.1` for the default provider)
    /// - `LLM_API_KEY_ENV`: names the env var containing the key (provider default otherwise)
    /// - `LLM_BASE_URL`: provider default API base URL
    /// - `LLM_SYSTEM_PROMPT`
    /// - `LLM_TEMPERATURE`, `LLM_MAX_TOKENS`, `LLM_TOP_P`, `LLM_SEED`
    /// - `LLM_REQUEST_TIMEOUT_SECS`: default 120
    /// - `LLM_CONNECT_TIMEOUT_SECS`: default 10
    ///
    /// # Errors
    ///
    /// Returns an error for an unknown provider, an unrecognizable model
    /// name, an unparsable number, or a missing API key.
    pub fn from_env() -> Result<Self, LlmError> {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Build typed LLM config from an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// Same as [`LlmConfig::from_env`].
    pub fn from_vars(var: impl Fn(&str) -> Option<String>) -> Result<Self, LlmError> {
        let model_var = var("LLM_MODEL").filter(|m| !m.trim().is_empty());
        let provider = match (var("LLM_PROVIDER"), model_var.as_deref()) {
            (Some(raw), _) => parse_provider(&raw)?,
            (None, Some(model)) => LlmProviderKind::infer_from_model(model)
                .ok_or_else(|| LlmError::ConfigParse(format!("unrecognized model: {model}")))?,
            (None, None) => LlmProviderKind::OpenAi,
        };
        let model = model_var.unwrap_or_else(|| default_model(provider).to_string());

        let key_var = var("LLM_API_KEY_ENV").unwrap_or_else(|| default_key_var(provider).to_string());
        let api_key = var(&key_var)
            .filter(|k| !k.is_empty())
            .ok_or_else(|| LlmError::MissingApiKey { var: key_var.clone() })?;

        let base_url = var("LLM_BASE_URL")
            .unwrap_or_else(|| default_base_url(provider).to_string())
            .trim_end_matches('/')
            .to_string();
        let system_prompt = var("LLM_SYSTEM_PROMPT").unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string());

        let defaults = GenerationParams::default();
        let params = GenerationParams {
            temperature: parse_or(&var, "LLM_TEMPERATURE", defaults.temperature)?,
            max_tokens: parse_or(&var, "LLM_MAX_TOKENS", defaults.max_tokens)?,
            top_p: parse_or(&var, "LLM_TOP_P", defaults.top_p)?,
            seed: match var("LLM_SEED") {
                Some(raw) if raw.eq_ignore_ascii_case("none") => None,
                Some(raw) => Some(parse_value("LLM_SEED", &raw)?),
                None => defaults.seed,
            },
        };
        let timeouts = LlmTimeouts {
            request_secs: parse_or(&var, "LLM_REQUEST_TIMEOUT_SECS", DEFAULT_LLM_REQUEST_TIMEOUT_SECS)?,
            connect_secs: parse_or(&var, "LLM_CONNECT_TIMEOUT_SECS", DEFAULT_LLM_CONNECT_TIMEOUT_SECS)?,
        };

        Ok(Self { provider, api_key, model, base_url, system_prompt, params, timeouts })
    }
}

fn parse_or<T>(var: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T, LlmError>
where
    T: std::str::FromStr,
{
    match var(key) {
        Some(raw) => parse_value(key, &raw),
        None => Ok(default),
    }
}

fn parse_value<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T, LlmError> {
    raw.trim()
        .parse::<T>()
        .map_err(|_| LlmError::ConfigParse(format!("invalid {key}: '{raw}'")))
}

fn parse_provider(raw: &str) -> Result<LlmProviderKind, LlmError> {
    match raw.trim().to_lowercase().as_str() {
        "openai" => Ok(LlmProviderKind::OpenAi),
        "anthropic" => Ok(LlmProviderKind::Anthropic),
        "qwen" => Ok(LlmProviderKind::Qwen),
        other => Err(LlmError::ConfigParse(format!("unknown LLM_PROVIDER: {other}"))),
    }
}

fn default_model(provider: LlmProviderKind) -> &'static str {
    match provider {
        LlmProviderKind::OpenAi => "gpt-4.1",
        LlmProviderKind::Anthropic => "claude-sonnet-4-5-20250929",
        LlmProviderKind::Qwen => "qwen-plus",
    }
}

fn default_key_var(provider: LlmProviderKind) -> &'static str {
    match provider {
        LlmProviderKind::OpenAi => "OPENAI_API_KEY",
        LlmProviderKind::Anthropic => "ANTHROPIC_API_KEY",
        LlmProviderKind::Qwen => "QWEN_API_KEY",
    }
}

fn default_base_url(provider: LlmProviderKind) -> &'static str {
    match provider {
        LlmProviderKind::OpenAi => DEFAULT_OPENAI_BASE_URL,
        LlmProviderKind::Anthropic => DEFAULT_ANTHROPIC_BASE_URL,
        LlmProviderKind::Qwen => DEFAULT_QWEN_BASE_URL,
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
