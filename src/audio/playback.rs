use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use base64::{Engine, engine::general_purpose::STANDARD};
use tracing::{debug, warn};

use crate::audio::error::{AudioError, AudioResult};
use crate::audio::output::AudioOutput;
use crate::state::ControlFlags;

/// Inbound playback queue
///
/// Buffers synthesized-speech chunks and renders them strictly in arrival
/// order: chunk N+1 starts only after chunk N's playback has resolved,
/// been skipped, or the queue was cleared wholesale.
///
/// Speaker mute and interruption take different paths:
/// - mute is a graceful stop: the chunk currently rendering finishes,
///   then the rest of the queue is discarded;
/// - interruption is a hard drop: the queue is cleared and `speaking` is
///   forced false the moment the event is processed.
#[derive(Clone)]
pub struct PlaybackQueue {
    inner: Arc<PlaybackInner>,
}

struct PlaybackInner {
    /// Pending Base64 chunks in arrival order
    queue: Mutex<VecDeque<String>>,
    /// True while a drain task owns the queue head
    draining: AtomicBool,
    /// True whenever the queue is non-empty or a chunk is rendering
    speaking: AtomicBool,
    /// Mute flags shared with the session
    flags: Arc<ControlFlags>,
    /// Injected output capability
    output: Arc<dyn AudioOutput>,
}

impl PlaybackQueue {
    /// Create a queue rendering to the given output
    pub fn new(output: Arc<dyn AudioOutput>, flags: Arc<ControlFlags>) -> Self {
        Self {
            inner: Arc::new(PlaybackInner {
                queue: Mutex::new(VecDeque::new()),
                draining: AtomicBool::new(false),
                speaking: AtomicBool::new(false),
                flags,
                output,
            }),
        }
    }

    /// Append a chunk to the tail
    ///
    /// Starts the drain task if none is running and the speaker is not
    /// muted. Draining and the empty-check happen under the queue lock so
    /// a chunk enqueued while the previous drain winds down is never lost.
    pub fn enqueue(&self, data: String) {
        let should_spawn = {
            let mut queue = self.inner.queue.lock().unwrap();
            queue.push_back(data);
            self.inner.speaking.store(true, Ordering::SeqCst);

            !self.inner.flags.speaker_muted()
                && !self.inner.draining.swap(true, Ordering::SeqCst)
        };

        if should_spawn {
            let inner = Arc::clone(&self.inner);
            tokio::spawn(async move {
                PlaybackInner::drain(inner).await;
            });
        }
    }

    /// Apply a speaker mute change
    ///
    /// Muting lets any chunk currently rendering finish; the remainder of
    /// the queue is discarded (immediately if nothing is rendering).
    /// Unmuting does not restart draining by itself; the next enqueued
    /// chunk does.
    pub fn set_speaker_muted(&self, muted: bool) {
        self.inner.flags.set_speaker_muted(muted);

        if muted && !self.inner.draining.load(Ordering::SeqCst) {
            let mut queue = self.inner.queue.lock().unwrap();
            if !queue.is_empty() {
                debug!(discarded = queue.len(), "Speaker muted, discarding queue");
                queue.clear();
            }
            self.inner.speaking.store(false, Ordering::SeqCst);
        }
    }

    /// Hard-drop everything queued (barge-in)
    ///
    /// Clears the queue and forces `speaking` false synchronously. At most
    /// the chunk already mid-render finishes; its result is ignored.
    pub fn interrupt(&self) {
        let mut queue = self.inner.queue.lock().unwrap();
        if !queue.is_empty() {
            debug!(discarded = queue.len(), "Interruption, clearing queue");
        }
        queue.clear();
        self.inner.speaking.store(false, Ordering::SeqCst);
    }

    /// Flush on teardown
    ///
    /// Same hard-drop as an interruption; the drain task winds down on its
    /// own once the in-flight chunk resolves.
    pub fn flush(&self) {
        self.interrupt();
    }

    /// Whether the queue is non-empty or a chunk is rendering
    pub fn is_speaking(&self) -> bool {
        self.inner.speaking.load(Ordering::SeqCst)
    }

    /// Number of chunks currently queued (excluding any mid-render chunk)
    pub fn queued(&self) -> usize {
        self.inner.queue.lock().unwrap().len()
    }
}

impl PlaybackInner {
    /// Serial drain loop
    ///
    /// Pops, decodes, and renders one chunk at a time. A chunk that fails
    /// to decode is skipped and draining continues, so one bad chunk never
    /// wedges the queue.
    async fn drain(inner: Arc<PlaybackInner>) {
        loop {
            let next = {
                let mut queue = inner.queue.lock().unwrap();

                if inner.flags.speaker_muted() {
                    // Graceful stop: the current chunk already finished,
                    // discard whatever is left
                    if !queue.is_empty() {
                        debug!(discarded = queue.len(), "Speaker muted, discarding queue");
                        queue.clear();
                    }
                    inner.speaking.store(false, Ordering::SeqCst);
                    inner.draining.store(false, Ordering::SeqCst);
                    None
                } else {
                    match queue.pop_front() {
                        Some(data) => Some(data),
                        None => {
                            inner.speaking.store(false, Ordering::SeqCst);
                            inner.draining.store(false, Ordering::SeqCst);
                            None
                        }
                    }
                }
            };

            let Some(data) = next else {
                return;
            };

            match decode_chunk(&data) {
                Ok(samples) => {
                    if let Err(e) = inner.output.play(samples).await {
                        warn!("Playback error, skipping chunk: {}", e);
                    }
                }
                Err(e) => {
                    warn!("Skipping undecodable chunk: {}", e);
                }
            }
        }
    }
}

/// Decode one Base64 chunk into mono i16 PCM
fn decode_chunk(data: &str) -> AudioResult<Vec<i16>> {
    let bytes = STANDARD
        .decode(data)
        .map_err(|e| AudioError::DecodeFailed(e.to_string()))?;

    if bytes.len() % 2 != 0 {
        return Err(AudioError::DecodeFailed(format!(
            "odd byte length: {}",
            bytes.len()
        )));
    }

    Ok(bytes
        .chunks_exact(2)
        .map(|b| i16::from_le_bytes([b[0], b[1]]))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::output::MockAudioOutput;
    use std::time::Duration;

    fn encode(samples: &[i16]) -> String {
        let mut bytes = Vec::with_capacity(samples.len() * 2);
        for &s in samples {
            bytes.extend_from_slice(&s.to_le_bytes());
        }
        STANDARD.encode(bytes)
    }

    fn queue_with_mock(delay: Duration) -> (PlaybackQueue, Arc<MockAudioOutput>) {
        let output = Arc::new(MockAudioOutput::new().with_delay(delay));
        let flags = Arc::new(ControlFlags::new());
        let queue = PlaybackQueue::new(
            Arc::clone(&output) as Arc<dyn AudioOutput>,
            flags,
        );
        (queue, output)
    }

    #[test]
    fn test_decode_chunk_round_trip() {
        let samples = vec![0i16, 1, -1, 32767, -32768];
        let decoded = decode_chunk(&encode(&samples)).unwrap();
        assert_eq!(decoded, samples);
    }

    #[test]
    fn test_decode_chunk_rejects_bad_base64() {
        assert!(matches!(
            decode_chunk("not@@base64!"),
            Err(AudioError::DecodeFailed(_))
        ));
    }

    #[test]
    fn test_decode_chunk_rejects_odd_length() {
        let odd = STANDARD.encode([1u8, 2, 3]);
        assert!(matches!(
            decode_chunk(&odd),
            Err(AudioError::DecodeFailed(_))
        ));
    }

    #[tokio::test]
    async fn test_chunks_play_in_enqueue_order() {
        let (queue, output) = queue_with_mock(Duration::from_millis(20));

        let a = vec![1i16; 10];
        let b = vec![2i16; 10];
        let c = vec![3i16; 10];

        queue.enqueue(encode(&a));
        queue.enqueue(encode(&b));
        queue.enqueue(encode(&c));
        assert!(queue.is_speaking());

        tokio::time::sleep(Duration::from_millis(200)).await;

        assert_eq!(output.played(), vec![a, b, c]);
        assert!(!output.overlap_detected(), "playback must never overlap");
        assert!(!queue.is_speaking());
    }

    #[tokio::test]
    async fn test_drain_restarts_after_queue_empties() {
        let (queue, output) = queue_with_mock(Duration::ZERO);

        queue.enqueue(encode(&[1i16; 4]));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!queue.is_speaking());

        queue.enqueue(encode(&[2i16; 4]));
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(output.play_count(), 2);
        assert!(!queue.is_speaking());
    }

    #[tokio::test]
    async fn test_speaker_mute_finishes_current_then_discards() {
        let (queue, output) = queue_with_mock(Duration::from_millis(100));

        let a = vec![1i16; 10];
        queue.enqueue(encode(&a));
        queue.enqueue(encode(&[2i16; 10]));
        queue.enqueue(encode(&[3i16; 10]));

        // A is mid-render when the mute lands
        tokio::time::sleep(Duration::from_millis(30)).await;
        queue.set_speaker_muted(true);

        tokio::time::sleep(Duration::from_millis(300)).await;

        assert_eq!(output.played(), vec![a], "only A may finish");
        assert!(!queue.is_speaking());
        assert_eq!(queue.queued(), 0);
    }

    #[tokio::test]
    async fn test_speaker_mute_with_idle_queue_discards_immediately() {
        let (queue, output) = queue_with_mock(Duration::from_millis(10));

        queue.set_speaker_muted(true);
        queue.enqueue(encode(&[1i16; 4]));

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(output.play_count(), 0, "muted queue must not render");

        // Mute again while idle: queued chunk is discarded at once
        queue.set_speaker_muted(true);
        assert_eq!(queue.queued(), 0);
        assert!(!queue.is_speaking());
    }

    #[tokio::test]
    async fn test_interruption_clears_synchronously() {
        let (queue, output) = queue_with_mock(Duration::from_millis(100));

        queue.enqueue(encode(&[1i16; 10]));
        queue.enqueue(encode(&[2i16; 10]));
        queue.enqueue(encode(&[3i16; 10]));

        tokio::time::sleep(Duration::from_millis(30)).await;
        queue.interrupt();

        // Synchronous effect, before any in-flight render resolves
        assert!(!queue.is_speaking());
        assert_eq!(queue.queued(), 0);

        tokio::time::sleep(Duration::from_millis(300)).await;

        // At most the in-flight chunk finished
        assert!(output.play_count() <= 1, "played: {}", output.play_count());
        assert!(!queue.is_speaking());
    }

    #[tokio::test]
    async fn test_playback_resumes_after_interruption() {
        let (queue, output) = queue_with_mock(Duration::from_millis(20));

        queue.enqueue(encode(&[1i16; 10]));
        queue.interrupt();

        let d = vec![4i16; 10];
        queue.enqueue(encode(&d));
        tokio::time::sleep(Duration::from_millis(200)).await;

        let played = output.played();
        assert_eq!(played.last(), Some(&d));
    }

    #[tokio::test]
    async fn test_undecodable_chunk_is_skipped() {
        let (queue, output) = queue_with_mock(Duration::ZERO);

        let a = vec![1i16; 4];
        let c = vec![3i16; 4];
        queue.enqueue(encode(&a));
        queue.enqueue("!!!not-base64!!!".to_string());
        queue.enqueue(encode(&c));

        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(output.played(), vec![a, c], "bad chunk must be skipped");
        assert!(!queue.is_speaking());
    }

    #[tokio::test]
    async fn test_flush_behaves_like_interruption() {
        let (queue, output) = queue_with_mock(Duration::from_millis(100));

        queue.enqueue(encode(&[1i16; 10]));
        queue.enqueue(encode(&[2i16; 10]));

        tokio::time::sleep(Duration::from_millis(20)).await;
        queue.flush();

        assert!(!queue.is_speaking());
        assert_eq!(queue.queued(), 0);

        tokio::time::sleep(Duration::from_millis(250)).await;
        assert!(output.play_count() <= 1);
    }
}
