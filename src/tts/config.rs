//! TTS configuration parsed from environment variables.

use super::types::{AudioFormat, TtsError, Voice};

pub const DEFAULT_TTS_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_TTS_MODEL: &str = "gpt-4o-mini-tts";
pub const DEFAULT_TTS_KEY_VAR: &str = "OPENAI_API_KEY";
pub const DEFAULT_TTS_REQUEST_TIMEOUT_SECS: u64 = 120;
pub const DEFAULT_TTS_CONNECT_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TtsConfig {
    pub api_key: String,
    pub model: String,
    pub voice: Voice,
    pub format: AudioFormat,
    pub base_url: String,
    pub request_timeout_secs: u64,
    pub connect_timeout_secs: u64,
}

impl TtsConfig {
    /// Build typed TTS config from environment variables.
    ///
    /// Optional:
    /// - `TTS_MODEL`: default `gpt-4o-mini-tts`
    /// - `TTS_VOICE`: default `nova`
    /// - `TTS_FORMAT`: default `mp3`
    /// - `TTS_API_KEY_ENV`: names the env var holding the key (default `OPENAI_API_KEY`)
    /// - `TTS_BASE_URL`: default `OpenAI` API base URL
    /// - `TTS_REQUEST_TIMEOUT_SECS` / `TTS_CONNECT_TIMEOUT_SECS`: default 120 / 10
    ///
    /// # Errors
    ///
    /// Returns an error for an unknown voice or format, an unparsable
    /// timeout, or a missing API key.
    pub fn from_env() -> Result<Self, TtsError> {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Build typed TTS config from an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// Same as [`TtsConfig::from_env`].
    pub fn from_vars(var: impl Fn(&str) -> Option<String>) -> Result<Self, TtsError> {
        let key_var = var("TTS_API_KEY_ENV").unwrap_or_else(|| DEFAULT_TTS_KEY_VAR.to_string());
        let api_key = var(&key_var)
            .filter(|k| !k.is_empty())
            .ok_or_else(|| TtsError::MissingApiKey { var: key_var.clone() })?;

        let voice = var("TTS_VOICE").map_or(Ok(Voice::default()), |v| v.parse())?;
        let format = var("TTS_FORMAT").map_or(Ok(AudioFormat::default()), |v| v.parse())?;

        Ok(Self {
            api_key,
            model: var("TTS_MODEL").unwrap_or_else(|| DEFAULT_TTS_MODEL.to_string()),
            voice,
            format,
            base_url: var("TTS_BASE_URL")
                .unwrap_or_else(|| DEFAULT_TTS_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            request_timeout_secs: parse_secs(&var, "TTS_REQUEST_TIMEOUT_SECS", DEFAULT_TTS_REQUEST_TIMEOUT_SECS)?,
            connect_timeout_secs: parse_secs(&var, "TTS_CONNECT_TIMEOUT_SECS", DEFAULT_TTS_CONNECT_TIMEOUT_SECS)?,
        })
    }
}

fn parse_secs(var: &impl Fn(&str) -> Option<String>, key: &str, default: u64) -> Result<u64, TtsError> {
    match var(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| TtsError::ConfigParse(format!("invalid {key}: '{raw}'"))),
        None => Ok(default),
    }
}
