//! Voice relay: a question goes in over TCP or WebSocket, an answer comes
//! back as synthesized speech.
//!
//! ARCHITECTURE
//! ============
//! - [`frame`]: wire framing for requests, audio payloads, and error frames
//! - [`llm`] / [`tts`]: the answer and speech providers behind traits
//! - [`services::relay`]: answer then speak, with timeouts and retries
//! - [`routes`]: the TCP accept loop and the WebSocket router
//! - [`client`]: the matching client used by the `ask` subcommand

pub mod client;
pub mod config;
pub mod frame;
pub mod llm;
pub mod routes;
pub mod services;
pub mod state;
pub mod tts;
