//! Frame — the wire contract for relay responses.
//!
//! ARCHITECTURE
//! ============
//! A request is raw UTF-8 text. A response is an arbitrary-length audio
//! payload, and raw TCP gives the reader no message boundaries, so the
//! payload is delimited by one of two framings agreed out of band:
//!
//! - `Sentinel`: payload bytes, then the literal `<END_OF_AUDIO>` marker.
//!   Understood by every existing client. Cannot carry errors and
//!   truncates any payload that happens to contain the marker.
//! - `LengthPrefixed`: a single `kind:u8 | length:u64 BE | body` frame.
//!   Binary-safe, and carries an explicit error frame.
//!
//! DESIGN
//! ======
//! - Writers chunk the body at `CHUNK_SIZE` and flush after every chunk.
//! - Readers never report a short payload as success. EOF before the marker
//!   (or before the declared length) is `FrameError::Incomplete`.
//! - Under sentinel framing a failed request is signalled by closing the
//!   connection without the marker, which readers see as `Incomplete`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::warn;

// =============================================================================
// CONSTANTS
// =============================================================================

/// End-of-message marker for sentinel framing (14 ASCII bytes).
pub const END_OF_AUDIO: &[u8] = b"<END_OF_AUDIO>";

/// Write chunk and read buffer size.
pub const CHUNK_SIZE: usize = 1024 * 1024;

/// Default reader limit for a single response payload.
pub const DEFAULT_MAX_PAYLOAD_BYTES: usize = 64 * 1024 * 1024;

/// Length-prefixed frame kind: body is audio.
pub const KIND_AUDIO: u8 = 0x01;

/// Length-prefixed frame kind: body is a JSON [`ErrorFrame`].
pub const KIND_ERROR: u8 = 0x02;

/// `kind` byte plus big-endian `u64` length.
pub const HEADER_LEN: usize = 9;

/// Error frame key for the human-readable message.
pub const FRAME_MESSAGE: &str = "message";

/// Error frame key for grepable error codes.
pub const FRAME_CODE: &str = "code";

/// Error frame key for the retryable flag.
pub const FRAME_RETRYABLE: &str = "retryable";

// =============================================================================
// FRAMING
// =============================================================================

/// How a response payload is delimited on a byte stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Framing {
    /// Payload followed by [`END_OF_AUDIO`].
    #[default]
    Sentinel,
    /// One `kind | length | body` frame.
    LengthPrefixed,
}

impl Framing {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sentinel => "sentinel",
            Self::LengthPrefixed => "length",
        }
    }
}

impl fmt::Display for Framing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Framing {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sentinel" => Ok(Self::Sentinel),
            "length" | "length_prefixed" | "length-prefixed" => Ok(Self::LengthPrefixed),
            other => Err(format!("unknown framing '{other}' (expected 'sentinel' or 'length')")),
        }
    }
}

// =============================================================================
// ERROR CODES
// =============================================================================

/// Grepable error code and retryable flag for structured error frames.
pub trait ErrorCode: fmt::Display {
    fn error_code(&self) -> &'static str;

    fn retryable(&self) -> bool {
        false
    }
}

/// Structured error carried by a `KIND_ERROR` frame or a WebSocket text message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorFrame {
    pub code: String,
    pub message: String,
    #[serde(default)]
    pub retryable: bool,
}

impl ErrorFrame {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self { code: code.into(), message: message.into(), retryable: false }
    }

    /// Build an error frame from any error carrying an [`ErrorCode`].
    pub fn from_error<E: ErrorCode + ?Sized>(err: &E) -> Self {
        Self { code: err.error_code().to_string(), message: err.to_string(), retryable: err.retryable() }
    }

    #[must_use]
    pub fn to_json(&self) -> String {
        serde_json::json!({
            FRAME_CODE: self.code,
            FRAME_MESSAGE: self.message,
            FRAME_RETRYABLE: self.retryable,
        })
        .to_string()
    }

    /// Parse an error frame body.
    ///
    /// # Errors
    ///
    /// Returns [`FrameError::MalformedError`] when the body is not the expected JSON.
    pub fn from_json(bytes: &[u8]) -> Result<Self, FrameError> {
        serde_json::from_slice(bytes).map_err(|e| FrameError::MalformedError(e.to_string()))
    }
}

// =============================================================================
// FRAME ERROR
// =============================================================================

/// Errors produced while reading or writing framed data.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The stream ended before the end marker or declared length was reached.
    #[error("connection closed before end of response ({received} bytes received)")]
    Incomplete { received: usize },

    /// The payload exceeds the reader's limit.
    #[error("response exceeds limit of {limit} bytes")]
    TooLarge { limit: usize },

    /// A length-prefixed header carried an unknown kind byte.
    #[error("unknown frame kind: {0:#04x}")]
    UnknownKind(u8),

    /// An error frame body could not be parsed.
    #[error("malformed error frame: {0}")]
    MalformedError(String),

    /// The peer answered with an explicit error frame.
    #[error("remote error {}: {}", .0.code, .0.message)]
    Remote(ErrorFrame),

    /// A request was not valid UTF-8.
    #[error("request is not valid UTF-8: {0}")]
    InvalidUtf8(#[from] std::str::Utf8Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ErrorCode for FrameError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Incomplete { .. } => "E_INCOMPLETE",
            Self::TooLarge { .. } => "E_TOO_LARGE",
            Self::UnknownKind(_) => "E_UNKNOWN_FRAME",
            Self::MalformedError(_) => "E_MALFORMED_ERROR_FRAME",
            Self::Remote(_) => "E_REMOTE",
            Self::InvalidUtf8(_) => "E_BAD_REQUEST",
            Self::Io(_) => "E_IO",
        }
    }

    fn retryable(&self) -> bool {
        match self {
            Self::Incomplete { .. } | Self::Io(_) => true,
            Self::Remote(frame) => frame.retryable,
            _ => false,
        }
    }
}

// =============================================================================
// REQUEST
// =============================================================================

/// Write a request: raw UTF-8 text, then flush.
///
/// # Errors
///
/// Returns [`FrameError::Io`] when the write fails.
pub async fn write_request<W>(writer: &mut W, text: &str) -> Result<(), FrameError>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(text.as_bytes()).await?;
    writer.flush().await?;
    Ok(())
}

/// Read a request with a single bounded read and trim surrounding whitespace.
///
/// Returns `Ok(None)` when the peer closed without sending anything or sent
/// only whitespace.
///
/// # Errors
///
/// Returns [`FrameError::InvalidUtf8`] for undecodable bytes and
/// [`FrameError::Io`] for read failures.
pub async fn read_request<R>(reader: &mut R, max_bytes: usize) -> Result<Option<String>, FrameError>
where
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; max_bytes.max(1)];
    let n = reader.read(&mut buf).await?;
    if n == 0 {
        return Ok(None);
    }
    let text = std::str::from_utf8(&buf[..n])?.trim();
    if text.is_empty() {
        return Ok(None);
    }
    Ok(Some(text.to_string()))
}

// =============================================================================
// WRITE SIDE
// =============================================================================

/// Write a complete response payload using `framing`.
///
/// # Errors
///
/// Returns [`FrameError::Io`] when any chunk fails to write or flush.
pub async fn write_payload<W>(writer: &mut W, framing: Framing, payload: &[u8]) -> Result<(), FrameError>
where
    W: AsyncWrite + Unpin,
{
    match framing {
        Framing::Sentinel => {
            write_chunked(writer, payload).await?;
            writer.write_all(END_OF_AUDIO).await?;
            writer.flush().await?;
        }
        Framing::LengthPrefixed => {
            writer.write_all(&encode_header(KIND_AUDIO, payload.len())).await?;
            write_chunked(writer, payload).await?;
            writer.flush().await?;
        }
    }
    Ok(())
}

/// Write an explicit error frame.
///
/// Sentinel framing has no in-band error representation; nothing is written
/// and `Ok(false)` is returned so the caller closes the connection without
/// the marker. Returns `Ok(true)` when a frame was written.
///
/// # Errors
///
/// Returns [`FrameError::Io`] when the write fails.
pub async fn write_error<W>(writer: &mut W, framing: Framing, error: &ErrorFrame) -> Result<bool, FrameError>
where
    W: AsyncWrite + Unpin,
{
    match framing {
        Framing::Sentinel => Ok(false),
        Framing::LengthPrefixed => {
            let body = error.to_json();
            writer.write_all(&encode_header(KIND_ERROR, body.len())).await?;
            writer.write_all(body.as_bytes()).await?;
            writer.flush().await?;
            Ok(true)
        }
    }
}

async fn write_chunked<W>(writer: &mut W, payload: &[u8]) -> Result<(), FrameError>
where
    W: AsyncWrite + Unpin,
{
    for chunk in payload.chunks(CHUNK_SIZE) {
        writer.write_all(chunk).await?;
        writer.flush().await?;
    }
    Ok(())
}

fn encode_header(kind: u8, len: usize) -> [u8; HEADER_LEN] {
    let mut header = [0u8; HEADER_LEN];
    header[0] = kind;
    header[1..].copy_from_slice(&(len as u64).to_be_bytes());
    header
}

// =============================================================================
// READ SIDE
// =============================================================================

/// Read one complete response payload using `framing`.
///
/// # Errors
///
/// - [`FrameError::Incomplete`] if the stream ends early.
/// - [`FrameError::TooLarge`] if the payload exceeds `max_bytes`.
/// - [`FrameError::Remote`] if the peer sent an error frame.
/// - [`FrameError::UnknownKind`] / [`FrameError::MalformedError`] for bad frames.
pub async fn read_payload<R>(reader: &mut R, framing: Framing, max_bytes: usize) -> Result<Vec<u8>, FrameError>
where
    R: AsyncRead + Unpin,
{
    match framing {
        Framing::Sentinel => read_until_sentinel(reader, max_bytes).await,
        Framing::LengthPrefixed => read_length_prefixed(reader, max_bytes).await,
    }
}

async fn read_until_sentinel<R>(reader: &mut R, max_bytes: usize) -> Result<Vec<u8>, FrameError>
where
    R: AsyncRead + Unpin,
{
    let mut payload = Vec::new();
    let mut buf = vec![0u8; CHUNK_SIZE];
    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            return Err(FrameError::Incomplete { received: payload.len() });
        }

        // Rewind far enough to catch a marker split across two reads.
        let search_from = payload.len().saturating_sub(END_OF_AUDIO.len() - 1);
        payload.extend_from_slice(&buf[..n]);

        if let Some(pos) = find_subslice(&payload[search_from..], END_OF_AUDIO) {
            let end = search_from + pos;
            let trailing = payload.len() - end - END_OF_AUDIO.len();
            if trailing > 0 {
                warn!(trailing, "frame: discarding bytes after end marker");
            }
            if end > max_bytes {
                return Err(FrameError::TooLarge { limit: max_bytes });
            }
            payload.truncate(end);
            return Ok(payload);
        }

        if payload.len() > max_bytes.saturating_add(END_OF_AUDIO.len()) {
            return Err(FrameError::TooLarge { limit: max_bytes });
        }
    }
}

async fn read_length_prefixed<R>(reader: &mut R, max_bytes: usize) -> Result<Vec<u8>, FrameError>
where
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; HEADER_LEN];
    if let Err(e) = reader.read_exact(&mut header).await {
        return Err(eof_as_incomplete(e, 0));
    }

    let kind = header[0];
    if kind != KIND_AUDIO && kind != KIND_ERROR {
        return Err(FrameError::UnknownKind(kind));
    }

    let mut len_bytes = [0u8; 8];
    len_bytes.copy_from_slice(&header[1..]);
    let declared = u64::from_be_bytes(len_bytes);
    let len = usize::try_from(declared)
        .ok()
        .filter(|len| *len <= max_bytes)
        .ok_or(FrameError::TooLarge { limit: max_bytes })?;

    let mut body = Vec::with_capacity(len.min(CHUNK_SIZE));
    (&mut *reader).take(declared).read_to_end(&mut body).await?;
    if body.len() < len {
        return Err(FrameError::Incomplete { received: body.len() });
    }

    match kind {
        KIND_AUDIO => Ok(body),
        _ => Err(FrameError::Remote(ErrorFrame::from_json(&body)?)),
    }
}

fn eof_as_incomplete(err: std::io::Error, received: usize) -> FrameError {
    if err.kind() == std::io::ErrorKind::UnexpectedEof {
        FrameError::Incomplete { received }
    } else {
        FrameError::Io(err)
    }
}

fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|window| window == needle)
}

#[cfg(test)]
#[path = "frame_test.rs"]
mod tests;
