/// End-to-end session tests against a loopback WebSocket server
///
/// A local server stands in for the remote agent: it records every frame
/// the client sends and pushes scripted inbound frames, so the full
/// connect / stream / dispatch / teardown path runs without hardware or a
/// real backend.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use base64::{Engine, engine::general_purpose::STANDARD};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;

use vocalink::audio::{MockAudioOutput, MockCaptureDevice, MockCaptureHandle};
use vocalink::auth::StaticTokenProvider;
use vocalink::network::ConnectionConfig;
use vocalink::session::{SessionError, VoiceEvent, VoiceSession};
use vocalink::state::SessionPhase;

/// Sentinel that makes the loopback server send a close frame
const CLOSE_SENTINEL: &str = "__close__";

/// Start a one-connection loopback agent
///
/// Returns the ws:// URL, the frames received from the client (as JSON
/// values, in arrival order), and a sender for scripting inbound frames.
async fn start_agent() -> (
    String,
    Arc<Mutex<Vec<serde_json::Value>>>,
    mpsc::Sender<String>,
) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}/", listener.local_addr().unwrap());

    let frames = Arc::new(Mutex::new(Vec::new()));
    let (out_tx, mut out_rx) = mpsc::channel::<String>(32);

    let frames_srv = Arc::clone(&frames);
    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let ws = accept_async(stream).await.unwrap();
        let (mut write, mut read) = ws.split();

        loop {
            tokio::select! {
                msg = read.next() => match msg {
                    Some(Ok(Message::Text(text))) => {
                        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
                        frames_srv.lock().unwrap().push(value);
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(_)) => break,
                },
                Some(frame) = out_rx.recv() => {
                    if frame == CLOSE_SENTINEL {
                        let _ = write.send(Message::Close(None)).await;
                    } else if write.send(Message::Text(frame.into())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    (url, frames, out_tx)
}

struct TestHarness {
    session: VoiceSession,
    capture: MockCaptureHandle,
    output: Arc<MockAudioOutput>,
    events: Arc<Mutex<Vec<VoiceEvent>>>,
    frames: Arc<Mutex<Vec<serde_json::Value>>>,
    agent_tx: mpsc::Sender<String>,
}

impl TestHarness {
    async fn new() -> Self {
        let (url, frames, agent_tx) = start_agent().await;

        let device = MockCaptureDevice::new(16000);
        let capture = device.handle();
        let output = Arc::new(MockAudioOutput::new());

        let events = Arc::new(Mutex::new(Vec::new()));
        let events_cb = Arc::clone(&events);

        let session = VoiceSession::new(
            ConnectionConfig::new("You are a patient storyteller.").with_endpoint(url),
            Arc::new(StaticTokenProvider::new("tok-loopback")),
            Box::new(device),
            Arc::clone(&output) as Arc<dyn vocalink::audio::AudioOutput>,
            move |event| events_cb.lock().unwrap().push(event),
        );

        Self {
            session,
            capture,
            output,
            events,
            frames,
            agent_tx,
        }
    }

    fn frames_of_type(&self, frame_type: &str) -> usize {
        self.frames
            .lock()
            .unwrap()
            .iter()
            .filter(|f| f["type"] == frame_type)
            .count()
    }

    fn events(&self) -> Vec<VoiceEvent> {
        self.events.lock().unwrap().clone()
    }
}

#[tokio::test]
async fn test_connect_sends_exactly_one_settings_frame_first() {
    println!("\n=== Settings Frame Test ===");

    let mut harness = TestHarness::new().await;

    harness.session.connect().await.unwrap();
    assert!(harness.session.is_connected());

    tokio::time::sleep(Duration::from_millis(200)).await;

    {
        let frames = harness.frames.lock().unwrap();
        assert!(!frames.is_empty(), "no frames reached the agent");
        assert_eq!(frames[0]["type"], "session_settings");
        assert_eq!(frames[0]["system_prompt"], "You are a patient storyteller.");
    }
    assert_eq!(harness.frames_of_type("session_settings"), 1);

    harness.session.disconnect().await.unwrap();
    println!("\n✓ exactly one session_settings frame, sent first");
}

#[tokio::test]
async fn test_microphone_mute_yields_zero_outbound_frames() {
    println!("\n=== Microphone Mute Transport Test ===");

    let mut harness = TestHarness::new().await;
    harness.session.connect().await.unwrap();
    harness.session.start_listening().unwrap();
    assert!(harness.session.is_listening());

    // One 100ms slice while unmuted
    harness.capture.feed(vec![0.3f32; 1600]).await;
    tokio::time::sleep(Duration::from_millis(200)).await;
    let before = harness.frames_of_type("audio_input");
    assert_eq!(before, 1, "unmuted slice must be transmitted");

    // Mute: slices produced but never transmitted
    assert!(harness.session.toggle_mute());
    harness.capture.feed(vec![0.3f32; 1600]).await;
    harness.capture.feed(vec![0.3f32; 1600]).await;
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(
        harness.frames_of_type("audio_input"),
        before,
        "muted slices must generate zero outbound frames"
    );

    // The microphone capability stays acquired across the mute
    assert!(harness.capture.is_acquired());
    assert!(harness.session.is_listening());

    // Unmute: transmission resumes without re-acquisition
    assert!(!harness.session.toggle_mute());
    harness.capture.feed(vec![0.3f32; 1600]).await;
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(harness.frames_of_type("audio_input"), before + 1);

    harness.session.disconnect().await.unwrap();
    assert!(!harness.capture.is_acquired(), "disconnect releases the mic");

    println!("\n✓ mute gates transmission, hardware stays acquired");
}

#[tokio::test]
async fn test_cumulative_transcript_yields_single_callback() {
    println!("\n=== Cumulative Transcript Test ===");

    let mut harness = TestHarness::new().await;
    harness.session.connect().await.unwrap();

    for frame in [
        r#"{"type":"assistant_message","message":{"content":"Hello"}}"#,
        r#"{"type":"assistant_message","message":{"content":"Hello there"}}"#,
        r#"{"type":"assistant_end"}"#,
    ] {
        harness.agent_tx.send(frame.to_string()).await.unwrap();
    }

    tokio::time::sleep(Duration::from_millis(200)).await;

    let events = harness.events();
    let assistant: Vec<_> = events
        .iter()
        .filter(|e| matches!(e, VoiceEvent::AssistantMessage { .. }))
        .collect();
    assert_eq!(assistant.len(), 1, "exactly one assistant callback");
    assert_eq!(
        assistant[0],
        &VoiceEvent::AssistantMessage {
            text: "Hello there".to_string()
        },
        "last cumulative value wins, never a concatenation"
    );

    harness.session.disconnect().await.unwrap();
    println!("\n✓ [\"Hello\", \"Hello there\"] + end => one \"Hello there\"");
}

#[tokio::test]
async fn test_inbound_audio_plays_and_interruption_drops() {
    println!("\n=== Inbound Audio and Barge-in Test ===");

    let mut harness = TestHarness::new().await;
    harness.session.connect().await.unwrap();

    let chunk = STANDARD.encode([1u8, 0, 2, 0]);
    let audio_frame = format!(r#"{{"type":"audio_output","data":"{}"}}"#, chunk);

    harness.agent_tx.send(audio_frame.clone()).await.unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(harness.output.play_count(), 1);

    // Barge-in: queue cleared, speaking false, caller notified
    harness.agent_tx.send(audio_frame.clone()).await.unwrap();
    harness
        .agent_tx
        .send(r#"{"type":"user_interruption"}"#.to_string())
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;

    assert!(!harness.session.is_speaking());
    assert!(harness.events().contains(&VoiceEvent::Interrupted));

    harness.session.disconnect().await.unwrap();
    println!("\n✓ audio rendered in order, interruption dropped the queue");
}

#[tokio::test]
async fn test_user_message_and_error_frames_are_surfaced() {
    println!("\n=== User Message and Error Surfacing Test ===");

    let mut harness = TestHarness::new().await;
    harness.session.connect().await.unwrap();

    harness
        .agent_tx
        .send(r#"{"type":"user_message","message":{"content":"tell me more"}}"#.to_string())
        .await
        .unwrap();
    harness
        .agent_tx
        .send(r#"{"type":"error","message":"model overloaded"}"#.to_string())
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(200)).await;

    let events = harness.events();
    assert!(events.contains(&VoiceEvent::UserMessage {
        text: "tell me more".to_string()
    }));
    assert!(events.contains(&VoiceEvent::Error {
        message: "model overloaded".to_string()
    }));

    // An error frame does not close the session; the caller decides
    assert!(harness.session.is_connected());

    harness.session.disconnect().await.unwrap();
    println!("\n✓ user transcript and error surfaced, session stayed open");
}

#[tokio::test]
async fn test_malformed_frame_does_not_kill_the_session() {
    println!("\n=== Protocol Error Isolation Test ===");

    let mut harness = TestHarness::new().await;
    harness.session.connect().await.unwrap();

    harness
        .agent_tx
        .send("{this is not json".to_string())
        .await
        .unwrap();
    harness
        .agent_tx
        .send(r#"{"type":"user_message","message":{"content":"still alive"}}"#.to_string())
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(200)).await;

    assert!(harness.session.is_connected());
    assert!(harness.events().contains(&VoiceEvent::UserMessage {
        text: "still alive".to_string()
    }));

    harness.session.disconnect().await.unwrap();
    println!("\n✓ one corrupt frame dropped, conversation survived");
}

#[tokio::test]
async fn test_remote_close_surfaces_without_reconnect() {
    println!("\n=== Remote Close Test ===");

    let mut harness = TestHarness::new().await;
    harness.session.connect().await.unwrap();

    harness
        .agent_tx
        .send(CLOSE_SENTINEL.to_string())
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(300)).await;

    assert_eq!(harness.session.phase(), SessionPhase::Closed);
    assert!(!harness.session.is_connected());
    assert!(harness.events().contains(&VoiceEvent::Closed));

    // No silent reconnect
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(harness.session.phase(), SessionPhase::Closed);

    println!("\n✓ remote closure surfaced as Closed, no reconnect");
}

#[tokio::test]
async fn test_disconnect_twice_after_real_connect() {
    println!("\n=== Double Disconnect Test ===");

    let mut harness = TestHarness::new().await;
    harness.session.connect().await.unwrap();
    harness.session.start_listening().unwrap();

    assert!(harness.session.disconnect().await.is_ok());
    assert_eq!(harness.session.phase(), SessionPhase::Closed);
    assert!(!harness.capture.is_acquired());

    assert!(harness.session.disconnect().await.is_ok());
    assert_eq!(harness.session.phase(), SessionPhase::Closed);

    println!("\n✓ second disconnect was a no-op");
}

#[tokio::test]
async fn test_connect_to_dead_endpoint_is_a_transport_error() {
    println!("\n=== Transport Failure Test ===");

    let events = Arc::new(Mutex::new(Vec::<VoiceEvent>::new()));
    let events_cb = Arc::clone(&events);

    let mut session = VoiceSession::new(
        // Reserved port, nothing listening
        ConnectionConfig::new("persona")
            .with_endpoint("ws://127.0.0.1:1/")
            .with_timeout(2000),
        Arc::new(StaticTokenProvider::new("tok")),
        Box::new(MockCaptureDevice::new(16000)),
        Arc::new(MockAudioOutput::new()),
        move |event| events_cb.lock().unwrap().push(event),
    );

    let result = session.connect().await;
    assert!(matches!(result, Err(SessionError::Transport(_))));
    assert_eq!(session.phase(), SessionPhase::Closed);
    assert!(session.last_error().is_some());

    println!("\n✓ unreachable endpoint surfaced as a transport error");
}
