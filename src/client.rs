//! Client — send one question, receive one spoken answer.
//!
//! DESIGN
//! ======
//! A `RelayClient` opens a fresh connection per question, writes the request,
//! reads one framed payload, and always shuts the connection down whether or
//! not the exchange succeeded. Connecting and waiting for the response have
//! separate timeouts since synthesis can take far longer than a handshake.

use std::path::Path;
use std::time::Duration;

use futures::{Sink, SinkExt, Stream, StreamExt};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tracing::{debug, info};

use crate::config::{DEFAULT_CLIENT_HOST, DEFAULT_PORT};
use crate::frame::{self, DEFAULT_MAX_PAYLOAD_BYTES, ErrorCode, ErrorFrame, FrameError, Framing};

pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_RESPONSE_TIMEOUT: Duration = Duration::from_secs(300);

// =============================================================================
// ERRORS
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("could not connect to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },
    #[error("timed out {0}")]
    Timeout(&'static str),
    #[error(transparent)]
    Frame(FrameError),
    #[error("server error {}: {}", .0.code, .0.message)]
    Server(ErrorFrame),
    #[error("websocket error: {0}")]
    WebSocket(Box<WsError>),
    #[error("websocket closed before a response arrived")]
    WsClosed,
    #[error("failed to save audio to {path}: {source}")]
    Save {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl From<FrameError> for ClientError {
    fn from(err: FrameError) -> Self {
        match err {
            FrameError::Remote(frame) => Self::Server(frame),
            other => Self::Frame(other),
        }
    }
}

impl From<WsError> for ClientError {
    fn from(err: WsError) -> Self {
        Self::WebSocket(Box::new(err))
    }
}

impl ErrorCode for ClientError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Connect { .. } => "E_CONNECT",
            Self::Timeout(_) => "E_TIMEOUT",
            Self::Frame(e) => e.error_code(),
            Self::Server(_) => "E_REMOTE",
            Self::WebSocket(_) | Self::WsClosed => "E_WEBSOCKET",
            Self::Save { .. } => "E_SAVE",
        }
    }

    fn retryable(&self) -> bool {
        match self {
            Self::Connect { .. } | Self::Timeout(_) | Self::WsClosed => true,
            Self::Frame(e) => e.retryable(),
            Self::Server(frame) => frame.retryable,
            Self::WebSocket(_) | Self::Save { .. } => false,
        }
    }
}

// =============================================================================
// CLIENT
// =============================================================================

#[derive(Debug, Clone)]
pub struct RelayClient {
    pub host: String,
    pub port: u16,
    pub framing: Framing,
    pub connect_timeout: Duration,
    pub response_timeout: Duration,
    pub max_payload_bytes: usize,
}

impl Default for RelayClient {
    fn default() -> Self {
        Self::new(DEFAULT_CLIENT_HOST, DEFAULT_PORT)
    }
}

impl RelayClient {
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            framing: Framing::default(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            response_timeout: DEFAULT_RESPONSE_TIMEOUT,
            max_payload_bytes: DEFAULT_MAX_PAYLOAD_BYTES,
        }
    }

    #[must_use]
    pub fn with_framing(mut self, framing: Framing) -> Self {
        self.framing = framing;
        self
    }

    #[must_use]
    pub fn with_timeouts(mut self, connect: Duration, response: Duration) -> Self {
        self.connect_timeout = connect;
        self.response_timeout = response;
        self
    }

    #[must_use]
    pub fn with_max_payload_bytes(mut self, max: usize) -> Self {
        self.max_payload_bytes = max;
        self
    }

    fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Ask `question` over raw TCP and return the audio bytes.
    ///
    /// # Errors
    ///
    /// - [`ClientError::Connect`] / [`ClientError::Timeout`] if the server is unreachable.
    /// - [`ClientError::Frame`] if the response is cut short or malformed.
    /// - [`ClientError::Server`] if the server sent an error frame.
    pub async fn send_question(&self, question: &str) -> Result<Vec<u8>, ClientError> {
        let addr = self.addr();
        let mut stream = timeout(self.connect_timeout, TcpStream::connect(&addr))
            .await
            .map_err(|_| ClientError::Timeout("connecting"))?
            .map_err(|source| ClientError::Connect { addr: addr.clone(), source })?;
        info!(%addr, framing = %self.framing, "client: connected");

        let result = timeout(self.response_timeout, self.exchange(&mut stream, question))
            .await
            .unwrap_or(Err(ClientError::Timeout("waiting for response")));

        if let Err(e) = stream.shutdown().await {
            debug!(error = %e, "client: shutdown failed");
        }
        result
    }

    async fn exchange(&self, stream: &mut TcpStream, question: &str) -> Result<Vec<u8>, ClientError> {
        frame::write_request(stream, question).await?;
        info!(chars = question.len(), "client: question sent");
        let audio = frame::read_payload(stream, self.framing, self.max_payload_bytes).await?;
        info!(bytes = audio.len(), "client: audio received");
        Ok(audio)
    }

    /// Ask `question` over WebSocket and return the audio bytes.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Server`] when the server replies with an error
    /// frame, [`ClientError::WsClosed`] if it closes first, and
    /// [`ClientError::WebSocket`] for transport failures.
    pub async fn send_question_ws(&self, question: &str) -> Result<Vec<u8>, ClientError> {
        let url = format!("ws://{}/", self.addr());
        let (mut ws, _) = timeout(self.connect_timeout, connect_async(url.as_str()))
            .await
            .map_err(|_| ClientError::Timeout("connecting"))??;
        info!(%url, "client: websocket connected");

        let result = timeout(self.response_timeout, ws_exchange(&mut ws, question))
            .await
            .unwrap_or(Err(ClientError::Timeout("waiting for response")));

        if let Err(e) = ws.close(None).await {
            debug!(error = %e, "client: websocket close failed");
        }
        result
    }
}

async fn ws_exchange<S>(ws: &mut S, question: &str) -> Result<Vec<u8>, ClientError>
where
    S: Sink<Message, Error = WsError> + Stream<Item = Result<Message, WsError>> + Unpin,
{
    ws.send(Message::Text(question.to_string().into())).await?;
    info!(chars = question.len(), "client: question sent");
    while let Some(msg) = ws.next().await {
        match msg? {
            Message::Binary(audio) => {
                info!(bytes = audio.len(), "client: audio received");
                return Ok(audio.to_vec());
            }
            Message::Text(text) => {
                return Err(match ErrorFrame::from_json(text.as_bytes()) {
                    Ok(frame) => ClientError::Server(frame),
                    Err(e) => e.into(),
                });
            }
            Message::Close(_) => break,
            _ => {}
        }
    }
    Err(ClientError::WsClosed)
}

/// Write `audio` to `path`.
///
/// # Errors
///
/// Returns [`ClientError::Save`] when the file cannot be written.
pub async fn save_audio(path: &Path, audio: &[u8]) -> Result<(), ClientError> {
    tokio::fs::write(path, audio)
        .await
        .map_err(|source| ClientError::Save { path: path.display().to_string(), source })?;
    info!(path = %path.display(), bytes = audio.len(), "client: audio saved");
    Ok(())
}

#[cfg(test)]
#[path = "client_test.rs"]
mod tests;
