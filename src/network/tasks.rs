/// Async tasks for the two halves of the duplex channel
///
/// The sender task drains the outbound audio channel; the receiver task
/// decodes inbound frames and hands them, in arrival order, to the
/// dispatcher.

use crate::network::connection::{WsReader, WsWriter};
use crate::network::error::{NetworkError, NetworkResult};
use crate::network::messages::{AudioInput, ClientMessage, InboundMessage};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Sender task: wraps Base64 audio slices into `audio_input` frames
///
/// Runs until the audio channel closes (capture stopped or session torn
/// down), then closes the write half, which sends the WebSocket close
/// frame.
///
/// # Arguments
/// * `ws_writer` - the write half of the WebSocket stream
/// * `audio_rx` - receiver for Base64-encoded audio slices
pub async fn sender_task(
    mut ws_writer: WsWriter,
    mut audio_rx: mpsc::Receiver<String>,
) -> NetworkResult<()> {
    info!("Sender task started");

    let mut chunk_count = 0u64;

    while let Some(audio_base64) = audio_rx.recv().await {
        chunk_count += 1;
        debug!(chunk = chunk_count, bytes = audio_base64.len(), "Sending audio slice");

        let frame = ClientMessage::AudioInput(AudioInput::new(audio_base64));
        let json = serde_json::to_string(&frame).map_err(NetworkError::SerializationError)?;

        ws_writer
            .send(tokio_tungstenite::tungstenite::Message::Text(json.into()))
            .await
            .map_err(NetworkError::WebSocketError)?;
    }

    info!(chunks = chunk_count, "Sender task completed, channel closed");

    if let Err(e) = ws_writer.close().await {
        warn!("Failed to close WebSocket writer: {}", e);
    }

    Ok(())
}

/// Receiver task: decodes inbound frames and forwards them in order
///
/// Malformed frames are dropped and logged without closing the session;
/// one corrupt frame must not kill a healthy conversation. The task ends
/// when the remote closes the channel (`Ok`) or the transport fails
/// (`Err`).
///
/// # Arguments
/// * `ws_reader` - the read half of the WebSocket stream
/// * `message_tx` - sender feeding the dispatcher, one frame at a time
pub async fn receiver_task(
    mut ws_reader: WsReader,
    message_tx: mpsc::Sender<InboundMessage>,
) -> NetworkResult<()> {
    use tokio_tungstenite::tungstenite::Message;

    info!("Receiver task started");

    let mut frame_count = 0u64;

    while let Some(msg_result) = ws_reader.next().await {
        match msg_result {
            Ok(Message::Text(text)) => {
                match serde_json::from_str::<InboundMessage>(&text) {
                    Ok(inbound) => {
                        frame_count += 1;
                        debug!(frame = frame_count, "Parsed inbound frame");

                        if message_tx.send(inbound).await.is_err() {
                            warn!("Dispatcher dropped, stopping receiver");
                            break;
                        }
                    }
                    Err(e) => {
                        // Isolate-and-continue: drop the single bad frame
                        warn!(error = %e, "Dropping malformed inbound frame");
                    }
                }
            }
            Ok(Message::Close(frame)) => {
                info!("Received close frame: {:?}", frame);
                break;
            }
            Ok(Message::Ping(data)) => {
                debug!(bytes = data.len(), "Received ping");
                // Pong is handled automatically by the underlying library
            }
            Ok(Message::Pong(_)) => {
                debug!("Received pong");
            }
            Ok(Message::Binary(data)) => {
                warn!(bytes = data.len(), "Dropping unexpected binary frame");
            }
            Ok(Message::Frame(_)) => {
                debug!("Received raw frame");
            }
            Err(e) => {
                error!("WebSocket error: {}", e);
                return Err(NetworkError::WebSocketError(e));
            }
        }
    }

    info!(frames = frame_count, "Receiver task completed, stream ended");

    Ok(())
}
