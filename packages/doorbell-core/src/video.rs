//! Video source contract (C2): drives the parallel camera interface and
//! emits MJPEG frames with the same lifecycle primitives as the audio
//! source (§4.2).

use async_trait::async_trait;

use crate::audio::SourceState;
use crate::error::DoorbellResult;
use crate::model::VideoFrame;

/// Externally supplied video capture parameters; the doorbell camera has
/// no negotiation path, these are fixed at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoParams {
    pub width: u16,
    pub height: u16,
    pub fps: u8,
}

/// Contract for an MJPEG video source. Bus errors are `Internal`; absent
/// data within the deadline is `Timeout`.
#[async_trait]
pub trait VideoSource: Send + Sync {
    /// Transitions `Idle -> Opened`.
    async fn open(&self) -> DoorbellResult<()>;

    /// Transitions `Opened -> Started` (or `Stopped -> Started`).
    async fn start(&self) -> DoorbellResult<()>;

    /// Reads the next frame, blocking until it is available, the read
    /// timeout elapses, or the bus fails.
    async fn read_frame(&self) -> DoorbellResult<VideoFrame>;

    /// Transitions `Started -> Stopped`.
    async fn stop(&self) -> DoorbellResult<()>;

    /// Transitions to `Closed`; implies `stop` if still started.
    async fn close(&self) -> DoorbellResult<()>;

    /// Current lifecycle state.
    fn state(&self) -> SourceState;

    /// The fixed capture parameters this source was constructed with.
    fn params(&self) -> VideoParams;
}
