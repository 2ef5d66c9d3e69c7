//! A single typed consumer attached to a [`super::CaptureEngine`].

use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tokio::sync::Notify;

use crate::error::{DoorbellError, DoorbellResult};
use crate::model::{AudioFrame, SinkId, VideoFrame};
use crate::queue::BoundedLossyQueue;

use super::{AcquiredFrame, Muxer};

/// Whether a sink currently receives frames from the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkMode {
    Always,
    Disable,
}

/// Construction-time parameters for a sink's queues.
#[derive(Debug, Clone, Copy)]
pub struct SinkConfig {
    pub audio_queue_depth: usize,
    pub video_queue_depth: usize,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            audio_queue_depth: 50,
            video_queue_depth: 24,
        }
    }
}

/// A sink's independent per-type FIFOs plus its optional muxer
/// attachment. A sink can have at most one muxer (§3 "Capture sink").
pub struct Sink {
    pub id: SinkId,
    pub(crate) audio_queue: BoundedLossyQueue<AudioFrame>,
    pub(crate) video_queue: BoundedLossyQueue<VideoFrame>,
    mode: RwLock<SinkMode>,
    muxer: RwLock<Option<Arc<dyn Muxer>>>,
    notify: Notify,
}

impl Sink {
    pub(crate) fn new(id: SinkId, config: SinkConfig) -> Self {
        Self {
            id,
            audio_queue: BoundedLossyQueue::new(config.audio_queue_depth),
            video_queue: BoundedLossyQueue::new(config.video_queue_depth),
            mode: RwLock::new(SinkMode::Disable),
            muxer: RwLock::new(None),
            notify: Notify::new(),
        }
    }

    pub(crate) fn notify_frame_available(&self) {
        self.notify.notify_waiters();
    }

    /// Non-owning loan of the next available frame, audio prioritized
    /// over video (§4.3 rule 3: "non-owning loan; the caller must release
    /// exactly once" — here release is implicit, the frame is owned data
    /// rather than a pooled buffer, so "release" is simply dropping it).
    ///
    /// With `blocking = true`, waits up to `timeout` for a frame to
    /// arrive; returns `Timeout` if none does. With `blocking = false`,
    /// returns `Timeout` immediately if both queues are empty.
    pub async fn acquire_frame(
        &self,
        blocking: bool,
        timeout: Duration,
    ) -> DoorbellResult<AcquiredFrame> {
        if let Some(frame) = self.try_pop() {
            return Ok(frame);
        }
        if !blocking {
            return Err(DoorbellError::Timeout(
                "no frame available on sink".into(),
            ));
        }
        let wait = self.notify.notified();
        tokio::select! {
            () = wait => {
                self.try_pop().ok_or_else(|| {
                    DoorbellError::Timeout("woke with no frame queued".into())
                })
            }
            () = tokio::time::sleep(timeout) => {
                Err(DoorbellError::Timeout("sink_acquire_frame deadline elapsed".into()))
            }
        }
    }

    fn try_pop(&self) -> Option<AcquiredFrame> {
        if let Some(frame) = self.audio_queue.pop() {
            return Some(AcquiredFrame::Audio(frame));
        }
        self.video_queue.pop().map(AcquiredFrame::Video)
    }

    /// Attaches a muxer; replaces any previously attached one.
    pub fn add_muxer(&self, muxer: Arc<dyn Muxer>) {
        *self.muxer.write() = Some(muxer);
    }

    pub(crate) fn muxer(&self) -> Option<Arc<dyn Muxer>> {
        self.muxer.read().clone()
    }

    /// Sets the sink's delivery mode. Transitioning to `Disable` clears
    /// both queues immediately (§4.3 rule 1).
    pub fn set_mode(&self, mode: SinkMode) {
        *self.mode.write() = mode;
        if mode == SinkMode::Disable {
            self.audio_queue.drain();
            self.video_queue.drain();
        }
    }

    #[must_use]
    pub fn mode(&self) -> SinkMode {
        *self.mode.read()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabling_a_sink_clears_both_queues() {
        let sink = Sink::new(1, SinkConfig::default());
        sink.audio_queue.push(AudioFrame {
            pts_ms: 0,
            samples: bytes::Bytes::new(),
        });
        sink.video_queue.push(VideoFrame {
            pts_ms: 0,
            width: 640,
            height: 480,
            data: bytes::Bytes::new(),
        });
        sink.set_mode(SinkMode::Disable);
        assert!(sink.audio_queue.is_empty());
        assert!(sink.video_queue.is_empty());
    }

    #[test]
    fn default_mode_is_disable() {
        let sink = Sink::new(1, SinkConfig::default());
        assert_eq!(sink.mode(), SinkMode::Disable);
    }
}
