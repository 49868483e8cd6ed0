//! TTS — the Speech Provider.
//!
//! One backend today: the `OpenAI` `/audio/speech` endpoint, which any
//! compatible server can stand in for through `TTS_BASE_URL`.

pub mod config;
pub mod openai;
pub mod types;

use config::TtsConfig;
pub use types::{SpeechProvider, Voice};
use types::TtsError;

/// Speech client built from [`TtsConfig`].
pub struct TtsClient {
    inner: openai::OpenAiSpeechClient,
    voice: Voice,
}

impl TtsClient {
    /// Build a TTS client from environment variables. See [`TtsConfig::from_env`].
    ///
    /// # Errors
    ///
    /// Returns an error if the config is invalid or the HTTP client fails.
    pub fn from_env() -> Result<Self, TtsError> {
        Self::from_config(&TtsConfig::from_env()?)
    }

    /// # Errors
    ///
    /// Returns an error if the HTTP client fails to build.
    pub fn from_config(config: &TtsConfig) -> Result<Self, TtsError> {
        Ok(Self { inner: openai::OpenAiSpeechClient::new(config)?, voice: config.voice })
    }

    #[must_use]
    pub fn model(&self) -> &str {
        self.inner.model()
    }

    /// The voice configured for this deployment.
    #[must_use]
    pub fn default_voice(&self) -> Voice {
        self.voice
    }
}

#[async_trait::async_trait]
impl SpeechProvider for TtsClient {
    async fn synthesize(&self, text: &str, voice: Voice) -> Result<Vec<u8>, TtsError> {
        let audio = self.inner.speech(text, voice).await?;
        tracing::debug!(model = self.model(), %voice, bytes = audio.len(), "tts: audio received");
        Ok(audio)
    }
}
