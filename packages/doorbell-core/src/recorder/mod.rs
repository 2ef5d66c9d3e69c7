//! Recorder / MP4 Segmenter (C4) and Retention Reaper (C5).

mod mp4;
mod naming;
mod reaper;

pub use naming::{format_segment_path, parse_segment_name, ParsedSegmentName};
pub use reaper::{OpenSegmentOracle, Reaper, ReaperConfig};

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::io::AsyncWriteExt;

use crate::capture::Muxer;
use crate::error::{DoorbellError, DoorbellResult};
use crate::events::{EventEmitter, RecorderEvent};
use crate::model::{AudioFrame, VideoFrame};

use mp4::Mp4SegmentBuilder;

/// Default bounded write-behind buffer size (§4.4 "RAM cache").
pub const DEFAULT_RAM_CACHE_BYTES: usize = 16 * 1024;

/// Construction-time recorder parameters.
#[derive(Debug, Clone)]
pub struct RecorderConfig {
    pub output_dir: PathBuf,
    pub slice_duration: Duration,
    pub ram_cache_bytes: usize,
    pub audio_timescale: u32,
    pub video_timescale: u32,
}

impl RecorderConfig {
    #[must_use]
    pub fn new(output_dir: PathBuf, slice_duration: Duration) -> Self {
        Self {
            output_dir,
            slice_duration,
            ram_cache_bytes: DEFAULT_RAM_CACHE_BYTES,
            audio_timescale: 16_000,
            video_timescale: 1000,
        }
    }
}

struct OpenSegment {
    builder: Mp4SegmentBuilder,
    path: PathBuf,
    slice_index: u64,
    opened_at: tokio::time::Instant,
    first_pts_ms: Option<u32>,
    last_audio_pts_ms: u32,
}

/// Consumes an AV sink as a [`Muxer`] and writes time-sliced, independently
/// playable MP4 files with a deterministic name pattern.
pub struct Recorder {
    config: RecorderConfig,
    next_slice_index: AtomicU64,
    current: Mutex<Option<OpenSegment>>,
    events: Arc<dyn EventEmitter>,
}

impl Recorder {
    #[must_use]
    pub fn new(config: RecorderConfig, events: Arc<dyn EventEmitter>) -> Self {
        Self {
            config,
            next_slice_index: AtomicU64::new(0),
            current: Mutex::new(None),
            events,
        }
    }

    /// The path of the segment currently being written, if any. Consulted
    /// by the reaper so it never deletes an open segment (§4.5, §8.6).
    #[must_use]
    pub fn current_open_path(&self) -> Option<PathBuf> {
        self.current.lock().as_ref().map(|s| s.path.clone())
    }

    fn ensure_segment_open(&self) -> DoorbellResult<()> {
        let mut guard = self.current.lock();
        if guard.is_some() {
            return Ok(());
        }
        let slice_index = self.next_slice_index.fetch_add(1, Ordering::SeqCst);
        let path = format_segment_path(&self.config.output_dir, slice_index, chrono::Utc::now());
        *guard = Some(OpenSegment {
            builder: Mp4SegmentBuilder::new(self.config.audio_timescale, self.config.video_timescale),
            path: path.clone(),
            slice_index,
            opened_at: tokio::time::Instant::now(),
            first_pts_ms: None,
            last_audio_pts_ms: 0,
        });
        self.events.emit_recorder(RecorderEvent::SegmentOpened {
            path: path.display().to_string(),
        });
        Ok(())
    }

    async fn rotate_if_slice_elapsed(&self) -> DoorbellResult<()> {
        let should_rotate = {
            let guard = self.current.lock();
            guard
                .as_ref()
                .map(|s| s.opened_at.elapsed() >= self.config.slice_duration)
                .unwrap_or(false)
        };
        if should_rotate {
            self.finalize_current().await?;
            self.ensure_segment_open()?;
        }
        Ok(())
    }

    async fn finalize_current(&self) -> DoorbellResult<()> {
        let segment = self.current.lock().take();
        let Some(segment) = segment else {
            return Ok(());
        };
        if segment.builder.is_empty() {
            // Nothing was ever written to this slot; drop it silently
            // rather than emitting an empty, unparseable file.
            return Ok(());
        }

        let result = self.write_segment_to_disk(&segment).await;
        match result {
            Ok(()) => {
                let duration_ms =
                    u64::from(segment.last_audio_pts_ms).saturating_sub(u64::from(
                        segment.first_pts_ms.unwrap_or(0),
                    ));
                self.events.emit_recorder(RecorderEvent::SegmentClosed {
                    path: segment.path.display().to_string(),
                    duration_ms,
                });
                Ok(())
            }
            Err(err) => {
                self.events.emit_recorder(RecorderEvent::SegmentWriteFailed {
                    path: segment.path.display().to_string(),
                    reason: err.to_string(),
                });
                Err(err)
            }
        }
    }

    async fn write_segment_to_disk(&self, segment: &OpenSegment) -> DoorbellResult<()> {
        tokio::fs::create_dir_all(&self.config.output_dir).await?;
        let mut bytes = Vec::new();
        segment.builder.finalize_to(&mut bytes)?;

        let mut file = tokio::fs::File::create(&segment.path).await?;
        file.write_all(&bytes).await?;
        file.flush().await?;
        Ok(())
    }

    /// Finalizes whatever segment is open, without starting a new one.
    /// Called on engine stop / sink disable (§3 invariant 3).
    pub async fn close(&self) -> DoorbellResult<()> {
        self.finalize_current().await
    }
}

#[async_trait]
impl Muxer for Recorder {
    async fn on_audio_frame(&self, frame: &AudioFrame) -> DoorbellResult<()> {
        self.ensure_segment_open()?;
        self.rotate_if_slice_elapsed().await?;

        let mut guard = self.current.lock();
        if let Some(segment) = guard.as_mut() {
            if segment.first_pts_ms.is_none() {
                segment.first_pts_ms = Some(frame.pts_ms);
            }
            segment.last_audio_pts_ms = frame.pts_ms;
            let duration_ms = 20; // fixed 20ms capture chunk, see engine.rs
            segment.builder.push_audio_sample(&frame.samples, duration_ms);
        }
        Ok(())
    }

    async fn on_video_frame(&self, frame: &VideoFrame) -> DoorbellResult<()> {
        self.ensure_segment_open()?;
        self.rotate_if_slice_elapsed().await?;

        let mut guard = self.current.lock();
        if let Some(segment) = guard.as_mut() {
            if segment.first_pts_ms.is_none() {
                segment.first_pts_ms = Some(frame.pts_ms);
            }
            let duration_ms = 100; // nominal 10fps frame spacing
            segment.builder.push_video_sample(&frame.data, duration_ms);
        }
        Ok(())
    }
}

impl OpenSegmentOracle for Recorder {
    fn current_open_path(&self) -> Option<PathBuf> {
        Recorder::current_open_path(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::NoopEventEmitter;

    fn recorder(dir: &std::path::Path) -> Recorder {
        Recorder::new(
            RecorderConfig::new(dir.to_path_buf(), Duration::from_secs(5)),
            Arc::new(NoopEventEmitter),
        )
    }

    #[tokio::test]
    async fn first_frame_opens_a_segment() {
        let tmp = tempfile::tempdir().unwrap();
        let rec = recorder(tmp.path());
        assert!(rec.current_open_path().is_none());
        rec.on_audio_frame(&AudioFrame {
            pts_ms: 0,
            samples: bytes::Bytes::from_static(&[0u8; 320]),
        })
        .await
        .unwrap();
        assert!(rec.current_open_path().is_some());
    }

    #[tokio::test]
    async fn close_finalizes_the_open_segment_to_disk() {
        let tmp = tempfile::tempdir().unwrap();
        let rec = recorder(tmp.path());
        rec.on_audio_frame(&AudioFrame {
            pts_ms: 0,
            samples: bytes::Bytes::from_static(&[0u8; 320]),
        })
        .await
        .unwrap();
        let path = rec.current_open_path().unwrap();
        rec.close().await.unwrap();
        assert!(rec.current_open_path().is_none());
        assert!(path.exists());
    }
}
