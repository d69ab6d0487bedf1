use std::sync::Arc;

use anyhow::Context;
use tracing::info;

use vocalink::audio::{CpalAudioOutput, CpalCaptureDevice};
use vocalink::auth::{CredentialProvider, HttpTokenProvider, StaticTokenProvider};
use vocalink::network::ConnectionConfig;
use vocalink::session::{VoiceEvent, VoiceSession};
use vocalink::utils::logging::init_logging;

/// Terminal demo: connect, stream the microphone, print transcripts, and
/// play the agent's voice until Ctrl-C.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging();

    let system_prompt = std::env::var("VOCALINK_SYSTEM_PROMPT")
        .unwrap_or_else(|_| "You are a friendly voice assistant.".to_string());

    let mut config = ConnectionConfig::new(system_prompt);
    if let Ok(endpoint) = std::env::var("VOCALINK_ENDPOINT") {
        config = config.with_endpoint(endpoint);
    }
    if let Ok(config_id) = std::env::var("VOCALINK_CONFIG_ID") {
        config = config.with_config_id(config_id);
    }

    // Either a backend that issues short-lived tokens, or a raw token for
    // quick local runs
    let credentials: Arc<dyn CredentialProvider> =
        if let Ok(token_url) = std::env::var("VOCALINK_TOKEN_URL") {
            Arc::new(HttpTokenProvider::new(token_url))
        } else {
            let token = std::env::var("VOCALINK_ACCESS_TOKEN")
                .context("set VOCALINK_TOKEN_URL or VOCALINK_ACCESS_TOKEN")?;
            Arc::new(StaticTokenProvider::new(token))
        };

    let output = Arc::new(
        CpalAudioOutput::new(config.sample_rate).context("failed to open audio output")?,
    );

    let mut session = VoiceSession::new(
        config,
        credentials,
        Box::new(CpalCaptureDevice::new()),
        output,
        |event| match event {
            VoiceEvent::UserMessage { text } => println!("you: {}", text),
            VoiceEvent::AssistantMessage { text } => println!("agent: {}", text),
            VoiceEvent::Interrupted => println!("[interrupted]"),
            VoiceEvent::Error { message } => eprintln!("[error] {}", message),
            VoiceEvent::Closed => println!("[closed]"),
        },
    );

    session.connect().await.context("connect failed")?;
    session.start_listening().context("microphone unavailable")?;

    info!("Conversation running; press Ctrl-C to hang up");
    tokio::signal::ctrl_c().await?;

    session.disconnect().await?;
    Ok(())
}
