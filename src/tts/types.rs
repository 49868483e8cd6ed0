//! TTS types — voices, output formats, errors, and the provider trait.

use std::fmt;
use std::str::FromStr;

// =============================================================================
// ERROR
// =============================================================================

/// Errors produced by speech synthesis.
#[derive(Debug, thiserror::Error)]
pub enum TtsError {
    /// A configuration value could not be parsed.
    #[error("config parse failed: {0}")]
    ConfigParse(String),

    /// The required API key environment variable is not set.
    #[error("missing API key: env var {var} not set")]
    MissingApiKey { var: String },

    /// Nothing to synthesize.
    #[error("cannot synthesize empty text")]
    EmptyInput,

    /// The HTTP request to the TTS provider failed.
    #[error("API request failed: {0}")]
    ApiRequest(String),

    /// The TTS provider returned a non-success HTTP status.
    #[error("API response error: status {status}")]
    ApiResponse { status: u16, body: String },

    /// The provider returned no audio bytes.
    #[error("provider returned empty audio")]
    EmptyAudio,

    /// The underlying HTTP client could not be constructed.
    #[error("HTTP client build failed: {0}")]
    HttpClientBuild(String),
}

impl crate::frame::ErrorCode for TtsError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::ConfigParse(_) => "E_CONFIG_PARSE",
            Self::MissingApiKey { .. } => "E_MISSING_API_KEY",
            Self::EmptyInput => "E_EMPTY_INPUT",
            Self::ApiRequest(_) => "E_TTS_REQUEST",
            Self::ApiResponse { .. } => "E_TTS_RESPONSE",
            Self::EmptyAudio => "E_EMPTY_AUDIO",
            Self::HttpClientBuild(_) => "E_HTTP_CLIENT_BUILD",
        }
    }

    fn retryable(&self) -> bool {
        matches!(self, Self::ApiRequest(_) | Self::ApiResponse { status: 429 | 500..=599, .. })
    }
}

// =============================================================================
// VOICE
// =============================================================================

/// Voice selector accepted by the speech endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Voice {
    Alloy,
    Echo,
    Fable,
    Onyx,
    #[default]
    Nova,
    Shimmer,
}

impl Voice {
    pub const ALL: [Voice; 6] = [Self::Alloy, Self::Echo, Self::Fable, Self::Onyx, Self::Nova, Self::Shimmer];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Alloy => "alloy",
            Self::Echo => "echo",
            Self::Fable => "fable",
            Self::Onyx => "onyx",
            Self::Nova => "nova",
            Self::Shimmer => "shimmer",
        }
    }
}

impl fmt::Display for Voice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Voice {
    type Err = TtsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_lowercase();
        Self::ALL
            .into_iter()
            .find(|v| v.as_str() == lower)
            .ok_or_else(|| TtsError::ConfigParse(format!("unknown voice: {s}")))
    }
}

// =============================================================================
// AUDIO FORMAT
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AudioFormat {
    #[default]
    Mp3,
    Opus,
    Aac,
    Flac,
    Wav,
    Pcm,
}

impl AudioFormat {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Mp3 => "mp3",
            Self::Opus => "opus",
            Self::Aac => "aac",
            Self::Flac => "flac",
            Self::Wav => "wav",
            Self::Pcm => "pcm",
        }
    }
}

impl FromStr for AudioFormat {
    type Err = TtsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "mp3" => Ok(Self::Mp3),
            "opus" => Ok(Self::Opus),
            "aac" => Ok(Self::Aac),
            "flac" => Ok(Self::Flac),
            "wav" => Ok(Self::Wav),
            "pcm" => Ok(Self::Pcm),
            other => Err(TtsError::ConfigParse(format!("unknown audio format: {other}"))),
        }
    }
}

// =============================================================================
// SPEECH PROVIDER TRAIT
// =============================================================================

/// Turns answer text into audio bytes. Enables fakes in relay tests.
#[async_trait::async_trait]
pub trait SpeechProvider: Send + Sync {
    /// Synthesize `text` with `voice`.
    ///
    /// # Errors
    ///
    /// Returns a [`TtsError`] if the input is empty, the request fails, or
    /// the provider returns no audio.
    async fn synthesize(&self, text: &str, voice: Voice) -> Result<Vec<u8>, TtsError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::ErrorCode;

    #[test]
    fn voice_parses_case_insensitively() {
        assert_eq!("Shimmer".parse::<Voice>().unwrap(), Voice::Shimmer);
        assert_eq!(" onyx ".parse::<Voice>().unwrap(), Voice::Onyx);
        assert_eq!(Voice::default(), Voice::Nova);
    }

    #[test]
    fn voice_rejects_unknown() {
        let err = "robot".parse::<Voice>().unwrap_err();
        assert_eq!(err.error_code(), "E_CONFIG_PARSE");
        assert!(err.to_string().contains("robot"));
    }

    #[test]
    fn audio_format_round_trips_names() {
        for name in ["mp3", "opus", "aac", "flac", "wav", "pcm"] {
            assert_eq!(name.parse::<AudioFormat>().unwrap().as_str(), name);
        }
        assert!("ogg".parse::<AudioFormat>().is_err());
    }

    #[test]
    fn retryable_matches_transient_failures() {
        assert!(TtsError::ApiRequest("reset".into()).retryable());
        assert!(TtsError::ApiResponse { status: 502, body: String::new() }.retryable());
        assert!(!TtsError::ApiResponse { status: 400, body: String::new() }.retryable());
        assert!(!TtsError::EmptyInput.retryable());
        assert!(!TtsError::EmptyAudio.retryable());
    }
}
