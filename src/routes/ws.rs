//! WebSocket handler — the same request cycle over message boundaries.
//!
//! DESIGN
//! ======
//! WebSocket messages are self-delimiting, so no sentinel or length header
//! is needed. Each inbound text message is one question; the reply is one
//! binary message holding the audio, or one text message holding a JSON
//! error frame. A connection may ask any number of questions in sequence,
//! and each request takes a permit from the shared in-flight semaphore.
//! The socket is read while a request is in flight: further questions are
//! queued in order, and a close cancels the provider calls.
//!
//! LIFECYCLE
//! =========
//! 1. Upgrade → assign a `conn_id`
//! 2. Text message → answer, then speak → binary reply (or error text)
//! 3. Binary message → `E_BAD_REQUEST` error text
//! 4. Close → done (mid-request, the in-flight request is dropped)

use std::collections::VecDeque;

use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::Response;
use serde::Deserialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::frame::{ErrorCode, ErrorFrame};
use crate::services::relay;
use crate::state::AppState;

/// Requests a client may send ahead while one is still being answered.
const MAX_QUEUED_REQUESTS: usize = 16;

// =============================================================================
// UPGRADE
// =============================================================================

pub async fn handle_ws(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    let max_message = state.config.max_request_bytes;
    ws.max_message_size(max_message)
        .on_upgrade(move |socket| run_ws(socket, state))
}

// =============================================================================
// CONNECTION
// =============================================================================

async fn run_ws(mut socket: WebSocket, state: AppState) {
    let conn_id = Uuid::new_v4();
    info!(%conn_id, "ws: client connected");

    // Requests that arrived while an earlier one was being answered.
    let mut queued: VecDeque<Message> = VecDeque::new();

    'conn: loop {
        let msg = match queued.pop_front() {
            Some(msg) => msg,
            None => match socket.recv().await {
                Some(Ok(msg)) => msg,
                Some(Err(e)) => {
                    debug!(%conn_id, error = %e, "ws: receive failed");
                    break;
                }
                None => break,
            },
        };

        let reply = match msg {
            Message::Text(text) => {
                let dispatch = process_inbound_text(&state, conn_id, text.as_str());
                tokio::pin!(dispatch);
                loop {
                    tokio::select! {
                        reply = &mut dispatch => break reply,
                        inbound = socket.recv() => match inbound {
                            Some(Ok(next @ (Message::Text(_) | Message::Binary(_)))) => {
                                if queued.len() >= MAX_QUEUED_REQUESTS {
                                    warn!(%conn_id, "ws: too many queued requests, closing");
                                    break 'conn;
                                }
                                queued.push_back(next);
                            }
                            Some(Ok(Message::Close(_)) | Err(_)) | None => {
                                warn!(%conn_id, "ws: client hung up, cancelling request");
                                break 'conn;
                            }
                            Some(Ok(_)) => {}
                        },
                    }
                }
            }
            Message::Binary(_) => {
                warn!(%conn_id, "ws: binary request rejected");
                Some(error_message(&ErrorFrame::new("E_BAD_REQUEST", "requests must be text messages")))
            }
            Message::Close(_) => break,
            _ => None,
        };
        if let Some(reply) = reply {
            if socket.send(reply).await.is_err() {
                warn!(%conn_id, "ws: client gone before reply was sent");
                break;
            }
        }
    }

    info!(%conn_id, "ws: client disconnected");
}

// =============================================================================
// REQUEST
// =============================================================================

/// Optional JSON envelope: `{"question": "..."}`.
#[derive(Deserialize)]
struct QuestionEnvelope {
    question: String,
}

/// Extract the question from a text message: either the trimmed text
/// itself, or the `question` field when the text is a JSON envelope.
fn extract_question(text: &str) -> Option<String> {
    let text = text.trim();
    let question = match serde_json::from_str::<QuestionEnvelope>(text) {
        Ok(envelope) => envelope.question.trim().to_string(),
        Err(_) => text.to_string(),
    };
    (!question.is_empty()).then_some(question)
}

/// Run one request and build the reply message. Returns `None` for an
/// empty question, which gets no reply.
async fn process_inbound_text(state: &AppState, conn_id: Uuid, text: &str) -> Option<Message> {
    let Some(question) = extract_question(text) else {
        warn!(%conn_id, "ws: empty question ignored");
        return None;
    };
    info!(%conn_id, chars = question.len(), "ws: question received");

    let Ok(_permit) = state.in_flight.acquire().await else {
        return Some(error_message(&ErrorFrame::new("E_SHUTTING_DOWN", "relay is shutting down")));
    };

    match relay::answer_then_speak(state, &question).await {
        Ok(audio) => {
            info!(%conn_id, bytes = audio.len(), "ws: audio sent");
            Some(Message::Binary(audio.into()))
        }
        Err(e) => {
            warn!(%conn_id, stage = %e.stage(), code = e.error_code(), error = %e, "ws: request failed");
            Some(error_message(&ErrorFrame::from_error(&e)))
        }
    }
}

fn error_message(frame: &ErrorFrame) -> Message {
    Message::Text(frame.to_json().into())
}

#[cfg(test)]
#[path = "ws_test.rs"]
mod tests;
