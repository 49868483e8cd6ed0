use super::*;
use std::sync::Arc;
use std::time::Instant;

use tokio::io::duplex;
use tokio::net::TcpStream;
use tokio::sync::oneshot;
use tokio::time::timeout;

use crate::frame::{FrameError, Framing, read_payload, write_request};
use crate::state::test_helpers::{
    BOOM, FISH_AUDIO, FISH_QUESTION, FakeAnswers, FakeSpeech, test_app_state_with, test_config,
};

const MAX: usize = 1024 * 1024;

fn peer() -> SocketAddr {
    "127.0.0.1:40000".parse().unwrap()
}

fn state_with_framing(framing: Framing) -> AppState {
    let mut config = test_config();
    config.framing = framing;
    test_app_state_with(Arc::new(FakeAnswers::default()), Arc::new(FakeSpeech::default()), config)
}

/// Run `handle_connection` on one end of an in-memory pipe and return the other.
fn spawn_connection(state: AppState) -> (tokio::io::DuplexStream, tokio::task::JoinHandle<()>) {
    let (client, server) = duplex(64 * 1024);
    let handle = tokio::spawn(async move { handle_connection(server, peer(), &state).await });
    (client, handle)
}

// =========================================================================
// handle_connection
// =========================================================================

#[tokio::test]
async fn fish_question_gets_audio_and_end_marker() {
    let (mut client, handle) = spawn_connection(state_with_framing(Framing::Sentinel));

    write_request(&mut client, FISH_QUESTION).await.unwrap();
    let audio = read_payload(&mut client, Framing::Sentinel, MAX).await.unwrap();
    assert_eq!(audio, FISH_AUDIO);

    // Server closes after one response.
    let mut rest = Vec::new();
    client.read_to_end(&mut rest).await.unwrap();
    assert!(rest.is_empty());
    handle.await.unwrap();
}

#[tokio::test]
async fn request_is_trimmed_before_dispatch() {
    let (mut client, handle) = spawn_connection(state_with_framing(Framing::Sentinel));

    write_request(&mut client, "  How much is the fish?\n").await.unwrap();
    let audio = read_payload(&mut client, Framing::Sentinel, MAX).await.unwrap();
    assert_eq!(audio, FISH_AUDIO);
    handle.await.unwrap();
}

#[tokio::test]
async fn failure_under_sentinel_closes_without_marker() {
    let (mut client, handle) = spawn_connection(state_with_framing(Framing::Sentinel));

    write_request(&mut client, BOOM).await.unwrap();
    let err = read_payload(&mut client, Framing::Sentinel, MAX).await.unwrap_err();
    assert!(matches!(err, FrameError::Incomplete { received: 0 }));
    handle.await.unwrap();
}

#[tokio::test]
async fn failure_under_length_framing_sends_error_frame() {
    let (mut client, handle) = spawn_connection(state_with_framing(Framing::LengthPrefixed));

    write_request(&mut client, BOOM).await.unwrap();
    let err = read_payload(&mut client, Framing::LengthPrefixed, MAX).await.unwrap_err();
    let FrameError::Remote(frame) = err else { panic!("expected remote error, got {err:?}") };
    assert_eq!(frame.code, "E_API_RESPONSE");
    assert!(!frame.retryable);
    assert!(frame.message.contains("answer provider failed"));
    handle.await.unwrap();
}

#[tokio::test]
async fn length_framing_carries_audio() {
    let (mut client, handle) = spawn_connection(state_with_framing(Framing::LengthPrefixed));

    write_request(&mut client, FISH_QUESTION).await.unwrap();
    let audio = read_payload(&mut client, Framing::LengthPrefixed, MAX).await.unwrap();
    assert_eq!(audio, FISH_AUDIO);
    handle.await.unwrap();
}

#[tokio::test]
async fn invalid_utf8_is_a_bad_request() {
    let (mut client, handle) = spawn_connection(state_with_framing(Framing::LengthPrefixed));

    client.write_all(&[0xff, 0xfe, 0xfd]).await.unwrap();
    let err = read_payload(&mut client, Framing::LengthPrefixed, MAX).await.unwrap_err();
    let FrameError::Remote(frame) = err else { panic!("expected remote error, got {err:?}") };
    assert_eq!(frame.code, "E_BAD_REQUEST");
    handle.await.unwrap();
}

#[tokio::test]
async fn close_without_data_gets_no_response() {
    let answers = Arc::new(FakeAnswers::default());
    let state = test_app_state_with(answers.clone(), Arc::new(FakeSpeech::default()), test_config());
    let (mut client, handle) = spawn_connection(state);

    client.shutdown().await.unwrap();
    let mut rest = Vec::new();
    client.read_to_end(&mut rest).await.unwrap();
    assert!(rest.is_empty());
    handle.await.unwrap();
    assert_eq!(answers.call_count(), 0);
}

#[tokio::test]
async fn hangup_during_dispatch_cancels_request() {
    let answers = Arc::new(FakeAnswers::with_delay(Duration::from_millis(500)));
    let speech = Arc::new(FakeSpeech::default());
    let state = test_app_state_with(answers.clone(), speech.clone(), test_config());
    let (mut client, handle) = spawn_connection(state);

    write_request(&mut client, FISH_QUESTION).await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    drop(client);

    timeout(Duration::from_millis(300), handle)
        .await
        .expect("connection should end promptly after hangup")
        .unwrap();
    assert_eq!(answers.call_count(), 1);
    assert_eq!(speech.call_count(), 0);
}

// =========================================================================
// serve
// =========================================================================

async fn start_server(state: AppState) -> (SocketAddr, oneshot::Sender<()>, tokio::task::JoinHandle<std::io::Result<()>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = oneshot::channel::<()>();
    let handle = tokio::spawn(serve(listener, state, async move {
        let _ = rx.await;
    }));
    (addr, tx, handle)
}

async fn ask(addr: SocketAddr, question: &str) -> Result<Vec<u8>, FrameError> {
    let mut stream = TcpStream::connect(addr).await?;
    write_request(&mut stream, question).await?;
    read_payload(&mut stream, Framing::Sentinel, MAX).await
}

#[tokio::test]
async fn sequential_connections_are_independent() {
    let (addr, shutdown, handle) = start_server(state_with_framing(Framing::Sentinel)).await;

    assert_eq!(ask(addr, FISH_QUESTION).await.unwrap(), FISH_AUDIO);
    assert!(ask(addr, BOOM).await.is_err());
    assert_eq!(ask(addr, "second").await.unwrap(), b"AUDIO[Answer: second]");

    shutdown.send(()).unwrap();
    handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn concurrent_connections_each_get_their_own_answer() {
    let (addr, shutdown, handle) = start_server(state_with_framing(Framing::Sentinel)).await;

    let tasks: Vec<_> = (0..8)
        .map(|i| tokio::spawn(async move { (i, ask(addr, &format!("question {i}")).await) }))
        .collect();
    for task in tasks {
        let (i, result) = task.await.unwrap();
        assert_eq!(result.unwrap(), format!("AUDIO[Answer: question {i}]").into_bytes());
    }

    shutdown.send(()).unwrap();
    handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn in_flight_bound_serializes_excess_connections() {
    let mut config = test_config();
    config.max_in_flight = 1;
    let answers = Arc::new(FakeAnswers::with_delay(Duration::from_millis(100)));
    let state = test_app_state_with(answers.clone(), Arc::new(FakeSpeech::default()), config);
    let (addr, shutdown, handle) = start_server(state).await;

    let started = Instant::now();
    let a = tokio::spawn(async move { ask(addr, "a").await });
    let b = tokio::spawn(async move { ask(addr, "b").await });
    assert_eq!(a.await.unwrap().unwrap(), b"AUDIO[Answer: a]");
    assert_eq!(b.await.unwrap().unwrap(), b"AUDIO[Answer: b]");
    assert!(started.elapsed() >= Duration::from_millis(200));
    assert_eq!(answers.call_count(), 2);

    shutdown.send(()).unwrap();
    handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn shutdown_stops_accept_loop() {
    let (_addr, shutdown, handle) = start_server(state_with_framing(Framing::Sentinel)).await;
    shutdown.send(()).unwrap();
    timeout(Duration::from_secs(1), handle)
        .await
        .expect("serve should return after shutdown")
        .unwrap()
        .unwrap();
}
