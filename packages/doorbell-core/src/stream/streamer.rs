//! WebSocket live-view transport (§4.6, §6).

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::sync::Notify;
use tokio_tungstenite::tungstenite::Message;

use crate::capture::Muxer;
use crate::error::DoorbellResult;
use crate::events::{EventEmitter, StreamEvent};
use crate::model::{AudioFrame, StreamFrameHeader, VideoFrame, WireFrameType};
use crate::queue::BoundedLossyQueue;
use crate::runtime::TaskSpawner;

use super::backoff::Backoff;

const DEFAULT_VIDEO_DEPTH: usize = 24;
const DEFAULT_AUDIO_DEPTH: usize = 50;
const DEFAULT_SOCKET_SEND_TIMEOUT: Duration = Duration::from_secs(2);
const DEFAULT_DISABLE_GRACE: Duration = Duration::from_secs(1);

#[derive(Debug, Clone)]
pub struct StreamerConfig {
    pub endpoint_url: String,
    pub video_queue_depth: usize,
    pub audio_queue_depth: usize,
    pub initial_reconnect_delay: Duration,
    pub send_timeout: Duration,
    pub disable_grace: Duration,
}

impl StreamerConfig {
    #[must_use]
    pub fn new(endpoint_url: String) -> Self {
        Self {
            endpoint_url,
            video_queue_depth: DEFAULT_VIDEO_DEPTH,
            audio_queue_depth: DEFAULT_AUDIO_DEPTH,
            initial_reconnect_delay: Duration::from_secs(1),
            send_timeout: DEFAULT_SOCKET_SEND_TIMEOUT,
            disable_grace: DEFAULT_DISABLE_GRACE,
        }
    }
}

enum QueuedFrame {
    Video(VideoFrame),
    Audio(AudioFrame),
}

/// Bounded, lossy, priority-draining live streamer. Implements [`Muxer`]
/// so it attaches to a capture-engine sink exactly like the recorder.
pub struct LiveStreamer {
    config: StreamerConfig,
    video_queue: BoundedLossyQueue<VideoFrame>,
    audio_queue: BoundedLossyQueue<AudioFrame>,
    enabled: AtomicBool,
    video_seq: AtomicU32,
    audio_seq: AtomicU32,
    notify: Notify,
    events: Arc<dyn EventEmitter>,
}

impl LiveStreamer {
    #[must_use]
    pub fn new(config: StreamerConfig, events: Arc<dyn EventEmitter>) -> Arc<Self> {
        Arc::new(Self {
            video_queue: BoundedLossyQueue::new(config.video_queue_depth),
            audio_queue: BoundedLossyQueue::new(config.audio_queue_depth),
            config,
            enabled: AtomicBool::new(false),
            video_seq: AtomicU32::new(0),
            audio_seq: AtomicU32::new(0),
            notify: Notify::new(),
            events,
        })
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    /// `enable(true)` starts allowing enqueue and kicks off the sender
    /// loop (idempotent if already spawned); `enable(false)` drains and
    /// frees every queued frame after a bounded grace window.
    pub async fn set_enabled(self: &Arc<Self>, enabled: bool, spawner: &dyn TaskSpawner) {
        let was_enabled = self.enabled.swap(enabled, Ordering::SeqCst);
        if enabled && !was_enabled {
            self.video_seq.store(0, Ordering::SeqCst);
            self.audio_seq.store(0, Ordering::SeqCst);
            let this = self.clone();
            spawner.spawn(async move {
                this.run_sender_loop().await;
            });
        } else if !enabled && was_enabled {
            tokio::time::sleep(self.config.disable_grace).await;
            self.video_queue.drain();
            self.audio_queue.drain();
        }
    }

    fn enqueue_video(&self, frame: VideoFrame) {
        if self.video_queue.push(frame).is_some() {
            self.events
                .emit_stream(StreamEvent::FrameDropped { is_video: true });
        }
        self.notify.notify_waiters();
    }

    fn enqueue_audio(&self, frame: AudioFrame) {
        if self.audio_queue.push(frame).is_some() {
            self.events
                .emit_stream(StreamEvent::FrameDropped { is_video: false });
        }
        self.notify.notify_waiters();
    }

    fn next_queued(&self) -> Option<QueuedFrame> {
        // Strict priority: video is drained ahead of audio whenever both
        // have work (§4.6 "Structure").
        if let Some(frame) = self.video_queue.pop() {
            return Some(QueuedFrame::Video(frame));
        }
        self.audio_queue.pop().map(QueuedFrame::Audio)
    }

    async fn run_sender_loop(self: Arc<Self>) {
        let mut backoff = Backoff::new(self.config.initial_reconnect_delay);

        'reconnect: while self.is_enabled() {
            let connect_result =
                tokio_tungstenite::connect_async(&self.config.endpoint_url).await;
            let mut socket = match connect_result {
                Ok((socket, _response)) => {
                    backoff.reset();
                    socket
                }
                Err(_) => {
                    let delay = backoff.next_delay();
                    self.events
                        .emit_stream(StreamEvent::ReconnectScheduled {
                            backoff_ms: delay.as_millis() as u64,
                        });
                    tokio::time::sleep(delay).await;
                    continue 'reconnect;
                }
            };

            while self.is_enabled() {
                let Some(frame) = self.next_queued() else {
                    let wait = self.notify.notified();
                    tokio::select! {
                        () = wait => {}
                        () = tokio::time::sleep(Duration::from_millis(200)) => {}
                    }
                    continue;
                };

                let message = match frame {
                    QueuedFrame::Video(video) => {
                        let seq = self.video_seq.fetch_add(1, Ordering::SeqCst);
                        let header = StreamFrameHeader {
                            frame_type: WireFrameType::Video,
                            sequence: seq,
                            pts_ms: video.pts_ms,
                        };
                        encode_message(&header, &video.data)
                    }
                    QueuedFrame::Audio(audio) => {
                        let seq = self.audio_seq.fetch_add(1, Ordering::SeqCst);
                        let header = StreamFrameHeader {
                            frame_type: WireFrameType::Audio,
                            sequence: seq,
                            pts_ms: audio.pts_ms,
                        };
                        encode_message(&header, &audio.samples)
                    }
                };

                let send_result = tokio::time::timeout(
                    self.config.send_timeout,
                    socket.send(Message::Binary(message)),
                )
                .await;

                match send_result {
                    Ok(Ok(())) => {}
                    Ok(Err(_)) | Err(_) => {
                        // Socket write failed or timed out; mark the
                        // connection down and reconnect. No frame is
                        // retried (§4.6 "Error semantics").
                        let _ = socket.close(None).await;
                        continue 'reconnect;
                    }
                }

                // Drain any control frames the server sends (pings,
                // close) without acting on application payloads; this is
                // a send-mostly channel.
                if let Some(Ok(msg)) =
                    tokio::time::timeout(Duration::from_millis(1), socket.next())
                        .await
                        .ok()
                        .flatten()
                {
                    if msg.is_close() {
                        continue 'reconnect;
                    }
                }
            }

            let _ = socket.close(None).await;
        }
    }
}

fn encode_message(header: &StreamFrameHeader, payload: &[u8]) -> Vec<u8> {
    let mut message = Vec::with_capacity(StreamFrameHeader::WIRE_SIZE + payload.len());
    message.extend_from_slice(&header.encode());
    message.extend_from_slice(payload);
    message
}

#[async_trait]
impl Muxer for LiveStreamer {
    async fn on_audio_frame(&self, frame: &AudioFrame) -> DoorbellResult<()> {
        if self.is_enabled() {
            self.enqueue_audio(frame.clone());
        }
        Ok(())
    }

    async fn on_video_frame(&self, frame: &VideoFrame) -> DoorbellResult<()> {
        if self.is_enabled() {
            self.enqueue_video(frame.clone());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::NoopEventEmitter;

    fn streamer() -> Arc<LiveStreamer> {
        LiveStreamer::new(
            StreamerConfig::new("ws://127.0.0.1:1/dev-null".to_string()),
            Arc::new(NoopEventEmitter),
        )
    }

    #[tokio::test]
    async fn frames_are_dropped_not_enqueued_while_disabled() {
        let s = streamer();
        s.on_video_frame(&VideoFrame {
            pts_ms: 0,
            width: 640,
            height: 480,
            data: bytes::Bytes::new(),
        })
        .await
        .unwrap();
        assert_eq!(s.video_queue.len(), 0);
    }

    #[test]
    fn video_drains_strictly_ahead_of_audio_when_both_have_work() {
        let s = streamer();
        s.audio_queue.push(AudioFrame {
            pts_ms: 0,
            samples: bytes::Bytes::new(),
        });
        s.video_queue.push(VideoFrame {
            pts_ms: 0,
            width: 640,
            height: 480,
            data: bytes::Bytes::new(),
        });
        match s.next_queued() {
            Some(QueuedFrame::Video(_)) => {}
            _ => panic!("expected video to drain first"),
        }
    }

    #[test]
    fn overflow_drops_the_oldest_frame_of_the_same_type() {
        let s = LiveStreamer::new(
            StreamerConfig {
                video_queue_depth: 2,
                ..StreamerConfig::new("ws://127.0.0.1:1/dev-null".to_string())
            },
            Arc::new(NoopEventEmitter),
        );
        s.enabled.store(true, Ordering::SeqCst);
        s.enqueue_video(VideoFrame {
            pts_ms: 0,
            width: 1,
            height: 1,
            data: bytes::Bytes::new(),
        });
        s.enqueue_video(VideoFrame {
            pts_ms: 10,
            width: 1,
            height: 1,
            data: bytes::Bytes::new(),
        });
        s.enqueue_video(VideoFrame {
            pts_ms: 20,
            width: 1,
            height: 1,
            data: bytes::Bytes::new(),
        });
        assert_eq!(s.video_queue.len(), 2);
        match s.next_queued() {
            Some(QueuedFrame::Video(frame)) => assert_eq!(frame.pts_ms, 10),
            _ => panic!("expected oldest surviving frame first"),
        }
    }
}
