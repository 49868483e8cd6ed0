//! TCP handler — one question, one spoken answer per connection.
//!
//! DESIGN
//! ======
//! The accept loop waits for an in-flight permit before accepting, so at
//! most `max_in_flight` connections are processed at once and the rest wait
//! in the listen backlog. Each accepted connection runs in its own task and
//! shares nothing with other connections besides the providers.
//!
//! LIFECYCLE
//! =========
//! 1. Accept → assign a `conn_id`
//! 2. Read the request with one bounded read
//! 3. Answer, then speak, while watching for the peer hanging up
//! 4. Write the framed payload (or error) and shut the connection down
//!
//! A peer that hangs up during step 3 cancels the in-flight provider call.
//! Clients must keep their write side open until the response arrives: a
//! half-close (`shutdown(Write)`) after sending the question reads as a
//! hangup, and the request is cancelled without an answer.

use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpListener;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::frame::{self, ErrorCode, ErrorFrame};
use crate::services::relay;
use crate::state::AppState;

/// Back-off after a failed `accept` so a persistent error (e.g. EMFILE)
/// does not spin the loop.
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(100);

// =============================================================================
// ACCEPT LOOP
// =============================================================================

/// Serve connections from `listener` until `shutdown` resolves.
///
/// Connections already accepted keep running after shutdown; only new
/// accepts stop.
///
/// # Errors
///
/// Returns an error only if the listener's local address cannot be read.
pub async fn serve<F>(listener: TcpListener, state: AppState, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send,
{
    let local = listener.local_addr()?;
    info!(
        %local,
        framing = %state.config.framing,
        max_in_flight = state.config.max_in_flight,
        "tcp relay listening"
    );
    tokio::pin!(shutdown);

    loop {
        let permit = tokio::select! {
            () = &mut shutdown => break,
            permit = state.in_flight.clone().acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => break,
            },
        };

        let (stream, peer) = tokio::select! {
            () = &mut shutdown => break,
            accepted = listener.accept() => match accepted {
                Ok(pair) => pair,
                Err(e) => {
                    warn!(error = %e, "tcp: accept failed");
                    tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
                    continue;
                }
            },
        };

        let state = state.clone();
        tokio::spawn(async move {
            let _permit = permit;
            handle_connection(stream, peer, &state).await;
        });
    }

    info!(%local, "tcp relay stopped accepting");
    Ok(())
}

// =============================================================================
// CONNECTION
// =============================================================================

/// Run one request/response cycle on `stream`, then shut it down.
pub async fn handle_connection<S>(mut stream: S, peer: SocketAddr, state: &AppState)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let conn_id = Uuid::new_v4();
    info!(%conn_id, %peer, "tcp: client connected");

    process(&mut stream, conn_id, state).await;

    if let Err(e) = stream.shutdown().await {
        debug!(%conn_id, error = %e, "tcp: shutdown failed");
    }
    info!(%conn_id, "tcp: connection closed");
}

async fn process<S>(stream: &mut S, conn_id: Uuid, state: &AppState)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let framing = state.config.framing;

    let question = match frame::read_request(stream, state.config.max_request_bytes).await {
        Ok(Some(question)) => question,
        Ok(None) => {
            warn!(%conn_id, "tcp: no data received");
            return;
        }
        Err(e) => {
            warn!(%conn_id, code = e.error_code(), error = %e, "tcp: bad request");
            send_error(stream, conn_id, state, &ErrorFrame::from_error(&e)).await;
            return;
        }
    };
    info!(%conn_id, chars = question.len(), "tcp: question received");

    let result = tokio::select! {
        result = relay::answer_then_speak(state, &question) => result,
        () = wait_for_hangup(stream) => {
            warn!(%conn_id, "tcp: client hung up, cancelling request");
            return;
        }
    };

    match result {
        Ok(audio) => match frame::write_payload(stream, framing, &audio).await {
            Ok(()) => info!(%conn_id, bytes = audio.len(), %framing, "tcp: audio sent"),
            Err(e) => warn!(%conn_id, error = %e, "tcp: failed to send audio"),
        },
        Err(e) => {
            warn!(%conn_id, stage = %e.stage(), code = e.error_code(), error = %e, "tcp: request failed");
            send_error(stream, conn_id, state, &ErrorFrame::from_error(&e)).await;
        }
    }
}

async fn send_error<W>(writer: &mut W, conn_id: Uuid, state: &AppState, error: &ErrorFrame)
where
    W: AsyncWrite + Unpin,
{
    match frame::write_error(writer, state.config.framing, error).await {
        Ok(true) => debug!(%conn_id, code = %error.code, "tcp: error frame sent"),
        Ok(false) => debug!(%conn_id, "tcp: closing without end marker"),
        Err(e) => warn!(%conn_id, error = %e, "tcp: failed to send error frame"),
    }
}

/// Resolve once the peer closes its side or the read fails. Bytes that
/// arrive after the request are discarded.
async fn wait_for_hangup<R>(reader: &mut R)
where
    R: AsyncRead + Unpin,
{
    let mut scratch = [0u8; 1024];
    loop {
        match reader.read(&mut scratch).await {
            Ok(0) | Err(_) => return,
            Ok(n) => debug!(bytes = n, "tcp: ignoring bytes after request"),
        }
    }
}

#[cfg(test)]
#[path = "tcp_test.rs"]
mod tests;
