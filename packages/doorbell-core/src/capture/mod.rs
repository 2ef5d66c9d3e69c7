//! Capture Engine (C3): owns an audio/video source pair, fans frames out
//! to typed sinks, and enforces audio-clock synchronization.

mod engine;
mod sink;

pub use engine::{CaptureEngine, EngineConfig, EngineState};
pub use sink::{Sink, SinkConfig, SinkMode};

use async_trait::async_trait;

use crate::error::DoorbellResult;
use crate::model::{AudioFrame, VideoFrame};

/// A component that attaches to a sink and consumes its frames as they
/// are released — the Recorder (C4) is the only muxer implementation,
/// but the engine depends only on this trait so it can be tested without
/// a real MP4 writer.
#[async_trait]
pub trait Muxer: Send + Sync {
    /// Called once per delivered audio frame.
    async fn on_audio_frame(&self, frame: &AudioFrame) -> DoorbellResult<()>;
    /// Called once per delivered video frame.
    async fn on_video_frame(&self, frame: &VideoFrame) -> DoorbellResult<()>;
}

/// Outcome of `sink_acquire_frame`.
#[derive(Debug)]
pub enum AcquiredFrame {
    Audio(AudioFrame),
    Video(VideoFrame),
}
