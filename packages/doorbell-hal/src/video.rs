//! Simulated parallel camera interface (C2): emits deterministic
//! MJPEG-shaped frames on a fixed cadence instead of reading a real sensor.

use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use parking_lot::RwLock;

use doorbell_core::audio::SourceState;
use doorbell_core::error::{DoorbellError, DoorbellResult};
use doorbell_core::model::VideoFrame;
use doorbell_core::video::{VideoParams, VideoSource};

/// SOI/EOI JPEG markers, just enough structure that a frame "looks like"
/// MJPEG to anything sniffing the first bytes without a real encoder.
const JPEG_SOI: [u8; 2] = [0xFF, 0xD8];
const JPEG_EOI: [u8; 2] = [0xFF, 0xD9];

pub struct SimVideoSource {
    state: RwLock<SourceState>,
    params: VideoParams,
    frame_count: AtomicU32,
}

impl Default for SimVideoSource {
    fn default() -> Self {
        Self {
            state: RwLock::new(SourceState::Idle),
            params: VideoParams {
                width: 640,
                height: 480,
                fps: 10,
            },
            frame_count: AtomicU32::new(0),
        }
    }
}

impl SimVideoSource {
    #[must_use]
    pub fn new(params: VideoParams) -> Self {
        Self {
            state: RwLock::new(SourceState::Idle),
            params,
            frame_count: AtomicU32::new(0),
        }
    }

    fn frame_interval_ms(&self) -> u32 {
        1000 / u32::from(self.params.fps.max(1))
    }
}

#[async_trait]
impl VideoSource for SimVideoSource {
    async fn open(&self) -> DoorbellResult<()> {
        if *self.state.read() != SourceState::Idle {
            return Err(DoorbellError::InvalidState(
                "open is only valid from Idle".into(),
            ));
        }
        *self.state.write() = SourceState::Opened;
        Ok(())
    }

    async fn start(&self) -> DoorbellResult<()> {
        let state = *self.state.read();
        if state != SourceState::Opened && state != SourceState::Stopped {
            return Err(DoorbellError::InvalidState(
                "start is only valid from Opened or Stopped".into(),
            ));
        }
        *self.state.write() = SourceState::Started;
        Ok(())
    }

    async fn read_frame(&self) -> DoorbellResult<VideoFrame> {
        if *self.state.read() != SourceState::Started {
            return Err(DoorbellError::InvalidState(
                "read_frame is only valid while Started".into(),
            ));
        }
        let index = self.frame_count.fetch_add(1, Ordering::SeqCst);
        let pts_ms = index * self.frame_interval_ms();

        let mut data = Vec::with_capacity(16);
        data.extend_from_slice(&JPEG_SOI);
        data.extend_from_slice(&index.to_be_bytes());
        data.extend_from_slice(&JPEG_EOI);

        Ok(VideoFrame {
            pts_ms,
            width: self.params.width,
            height: self.params.height,
            data: bytes::Bytes::from(data),
        })
    }

    async fn stop(&self) -> DoorbellResult<()> {
        if *self.state.read() != SourceState::Started {
            return Err(DoorbellError::InvalidState(
                "stop is only valid from Started".into(),
            ));
        }
        *self.state.write() = SourceState::Stopped;
        Ok(())
    }

    async fn close(&self) -> DoorbellResult<()> {
        *self.state.write() = SourceState::Closed;
        Ok(())
    }

    fn state(&self) -> SourceState {
        *self.state.read()
    }

    fn params(&self) -> VideoParams {
        self.params
    }
}
