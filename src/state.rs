//! Shared application state.
//!
//! DESIGN
//! ======
//! `AppState` is cloned into every connection task and injected into Axum
//! handlers via the `State` extractor. It holds the two providers behind
//! trait objects, the relay config, and the semaphore that bounds how many
//! requests are processed at once. There is no per-client state.

use std::sync::Arc;

use tokio::sync::Semaphore;

use crate::config::RelayConfig;
use crate::llm::AnswerProvider;
use crate::llm::types::GenerationParams;
use crate::tts::{SpeechProvider, Voice};

// =============================================================================
// APP STATE
// =============================================================================

/// Shared application state. Clone is required by Axum; all inner fields
/// are Arc-wrapped or Copy.
#[derive(Clone)]
pub struct AppState {
    pub answers: Arc<dyn AnswerProvider>,
    pub speech: Arc<dyn SpeechProvider>,
    pub config: Arc<RelayConfig>,
    pub params: GenerationParams,
    pub voice: Voice,
    /// One permit per request being processed.
    pub in_flight: Arc<Semaphore>,
}

impl AppState {
    #[must_use]
    pub fn new(answers: Arc<dyn AnswerProvider>, speech: Arc<dyn SpeechProvider>, config: RelayConfig) -> Self {
        let in_flight = Arc::new(Semaphore::new(config.max_in_flight));
        Self {
            answers,
            speech,
            config: Arc::new(config),
            params: GenerationParams::default(),
            voice: Voice::default(),
            in_flight,
        }
    }

    #[must_use]
    pub fn with_params(mut self, params: GenerationParams) -> Self {
        self.params = params;
        self
    }

    #[must_use]
    pub fn with_voice(mut self, voice: Voice) -> Self {
        self.voice = voice;
        self
    }
}
