//! `OpenAI` speech client (`POST /audio/speech`).

use serde::Serialize;
use std::time::Duration;

use super::config::TtsConfig;
use super::types::{AudioFormat, TtsError, Voice};

pub struct OpenAiSpeechClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    format: AudioFormat,
}

impl OpenAiSpeechClient {
    pub fn new(config: &TtsConfig) -> Result<Self, TtsError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .build()
            .map_err(|e| TtsError::HttpClientBuild(e.to_string()))?;
        Ok(Self {
            http,
            api_key: config.api_key.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            format: config.format,
        })
    }

    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }

    pub async fn speech(&self, text: &str, voice: Voice) -> Result<Vec<u8>, TtsError> {
        let body = build_request(&self.model, text, voice, self.format)?;
        let response = self
            .http
            .post(format!("{}/audio/speech", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| TtsError::ApiRequest(e.to_string()))?;

        let status = response.status().as_u16();
        if status != 200 {
            let body = response
                .text()
                .await
                .map_err(|e| TtsError::ApiRequest(e.to_string()))?;
            return Err(TtsError::ApiResponse { status, body });
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| TtsError::ApiRequest(e.to_string()))?;
        if bytes.is_empty() {
            return Err(TtsError::EmptyAudio);
        }
        Ok(bytes.to_vec())
    }
}

// =============================================================================
// WIRE TYPES
// =============================================================================

#[derive(Serialize)]
struct SpeechRequest<'a> {
    model: &'a str,
    input: &'a str,
    voice: &'static str,
    response_format: &'static str,
}

fn build_request<'a>(
    model: &'a str,
    text: &'a str,
    voice: Voice,
    format: AudioFormat,
) -> Result<SpeechRequest<'a>, TtsError> {
    let input = text.trim();
    if input.is_empty() {
        return Err(TtsError::EmptyInput);
    }
    Ok(SpeechRequest { model, input, voice: voice.as_str(), response_format: format.as_str() })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_body_shape() {
        let req = build_request("gpt-4o-mini-tts", " Ten dollars. ", Voice::Nova, AudioFormat::Mp3).unwrap();
        let value = serde_json::to_value(&req).unwrap();
        assert_eq!(value["model"], "gpt-4o-mini-tts");
        assert_eq!(value["input"], "Ten dollars.");
        assert_eq!(value["voice"], "nova");
        assert_eq!(value["response_format"], "mp3");
    }

    #[test]
    fn empty_input_rejected_locally() {
        let err = build_request("tts-1", "   ", Voice::Alloy, AudioFormat::Mp3)
            .err()
            .unwrap();
        assert!(matches!(err, TtsError::EmptyInput));
    }

    // -- against a local endpoint ---------------------------------------------

    use axum::Router;
    use axum::http::StatusCode;
    use axum::routing::post;

    async fn client_for(app: Router) -> OpenAiSpeechClient {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        OpenAiSpeechClient::new(&TtsConfig {
            api_key: "sk-test".into(),
            model: "tts-1".into(),
            voice: Voice::Nova,
            format: AudioFormat::Mp3,
            base_url: format!("http://{addr}/v1/"),
            request_timeout_secs: 5,
            connect_timeout_secs: 5,
        })
        .unwrap()
    }

    #[tokio::test]
    async fn error_status_keeps_response_body() {
        let app = Router::new().route(
            "/v1/audio/speech",
            post(|| async { (StatusCode::SERVICE_UNAVAILABLE, "overloaded") }),
        );
        let err = client_for(app).await.speech("hello", Voice::Nova).await.unwrap_err();
        assert!(matches!(err, TtsError::ApiResponse { status: 503, ref body } if body == "overloaded"));
    }

    #[tokio::test]
    async fn empty_audio_is_an_error() {
        let app = Router::new().route("/v1/audio/speech", post(|| async { Vec::<u8>::new() }));
        let err = client_for(app).await.speech("hello", Voice::Nova).await.unwrap_err();
        assert!(matches!(err, TtsError::EmptyAudio));
    }

    #[tokio::test]
    async fn audio_bytes_are_returned() {
        let app = Router::new().route("/v1/audio/speech", post(|| async { vec![1u8, 2, 3] }));
        let audio = client_for(app).await.speech("hello", Voice::Nova).await.unwrap();
        assert_eq!(audio, vec![1, 2, 3]);
    }
}
