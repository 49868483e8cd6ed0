//! Relay service: question in, synthesized audio out.
//!
//! DESIGN
//! ======
//! One request runs two provider calls in sequence: the answer provider
//! turns the question into text, then the speech provider turns that text
//! into audio bytes. Each call gets its own timeout and is retried with
//! bounded exponential backoff when the failure is transient. Nothing is
//! shared between requests besides the providers themselves.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::{debug, info, warn};

use crate::frame::ErrorCode;
use crate::llm::types::LlmError;
use crate::state::AppState;
use crate::tts::types::TtsError;

// =============================================================================
// RETRY POLICY
// =============================================================================

/// Retry policy applied to each provider call.
///
/// A call is attempted at most `max_retries + 1` times.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    /// Delay before the first retry; doubles on each subsequent attempt.
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    /// A policy that never retries.
    #[must_use]
    pub fn none() -> Self {
        Self { max_retries: 0, base_delay: Duration::ZERO, max_delay: Duration::ZERO }
    }

    /// Delay before retry number `attempt` (zero-based):
    /// `min(base * 2^attempt + jitter, max)` with jitter in 0-25% of the base.
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base = self
            .base_delay
            .saturating_mul(2u32.saturating_pow(attempt))
            .min(self.max_delay);
        let jitter = base.mul_f64(rand::rng().random_range(0.0..0.25));
        (base + jitter).min(self.max_delay)
    }
}

// =============================================================================
// ERRORS
// =============================================================================

/// Which provider call a failure belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Answer,
    Speech,
}

impl Stage {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Answer => "answer",
            Self::Speech => "speech",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("answer provider failed: {0}")]
    Answer(#[source] LlmError),

    #[error("speech provider failed: {0}")]
    Speech(#[source] TtsError),

    #[error("{stage} provider timed out after {after:?}")]
    Timeout { stage: Stage, after: Duration },
}

impl RelayError {
    #[must_use]
    pub fn stage(&self) -> Stage {
        match self {
            Self::Answer(_) => Stage::Answer,
            Self::Speech(_) => Stage::Speech,
            Self::Timeout { stage, .. } => *stage,
        }
    }
}

impl ErrorCode for RelayError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Answer(e) => e.error_code(),
            Self::Speech(e) => e.error_code(),
            Self::Timeout { stage: Stage::Answer, .. } => "E_ANSWER_TIMEOUT",
            Self::Timeout { stage: Stage::Speech, .. } => "E_SPEECH_TIMEOUT",
        }
    }

    fn retryable(&self) -> bool {
        match self {
            Self::Answer(e) => e.retryable(),
            Self::Speech(e) => e.retryable(),
            Self::Timeout { .. } => true,
        }
    }
}

// =============================================================================
// PIPELINE
// =============================================================================

/// Answer `question` and synthesize the answer as audio.
///
/// # Errors
///
/// Returns the last [`RelayError`] from whichever stage failed once its
/// retries are exhausted. The speech provider is never called when the
/// answer stage fails.
pub async fn answer_then_speak(state: &AppState, question: &str) -> Result<Vec<u8>, RelayError> {
    let config = &state.config;

    debug!(chars = question.len(), "relay: dispatching answer");
    let answer = call_with_retry(Stage::Answer, config.answer_timeout, &config.retry, RelayError::Answer, || {
        state.answers.assist(question, &state.params)
    })
    .await?;
    info!(chars = answer.len(), "relay: answer ready");

    debug!(voice = %state.voice, "relay: dispatching speech");
    let audio = call_with_retry(Stage::Speech, config.speech_timeout, &config.retry, RelayError::Speech, || {
        state.speech.synthesize(&answer, state.voice)
    })
    .await?;
    info!(bytes = audio.len(), "relay: audio ready");

    Ok(audio)
}

async fn call_with_retry<T, E, F, Fut>(
    stage: Stage,
    timeout: Duration,
    policy: &RetryPolicy,
    wrap: fn(E) -> RelayError,
    mut call: F,
) -> Result<T, RelayError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut attempt = 0;
    loop {
        let err = match tokio::time::timeout(timeout, call()).await {
            Ok(Ok(value)) => return Ok(value),
            Ok(Err(e)) => wrap(e),
            Err(_) => RelayError::Timeout { stage, after: timeout },
        };

        if !err.retryable() || attempt >= policy.max_retries {
            return Err(err);
        }

        let delay = policy.delay_for_attempt(attempt);
        warn!(
            %stage,
            attempt = attempt + 1,
            max_retries = policy.max_retries,
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            error = %err,
            "relay: transient failure, retrying"
        );
        tokio::time::sleep(delay).await;
        attempt += 1;
    }
}

#[cfg(test)]
#[path = "relay_test.rs"]
mod tests;
