//! Simulated I2S audio bus (C1): generates deterministic sine-wave PCM
//! instead of reading a real codec, and accepts writes into a null sink.

use std::f32::consts::PI;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};

use doorbell_core::audio::{
    negotiate_caps, AudioDefaults, AudioFormatKind, AudioFormatProposal, AudioSink, AudioSource,
    NegotiatedAudioCaps, SourceState,
};
use doorbell_core::error::{DoorbellError, DoorbellResult};
use doorbell_core::model::AudioFrame;

/// Amplitude of the generated tone, in `i16` full-scale units. Kept well
/// below clipping so downstream muxers never see saturated samples.
const TONE_AMPLITUDE: f32 = 8_000.0;
/// Frequency of the generated sine wave, matching a typical test-tone pitch.
const TONE_FREQUENCY_HZ: f32 = 440.0;

/// Simulated PCM source. Samples emitted are a running count, not wall-clock
/// driven, so `pts_ms` advances exactly with the bytes a caller has actually
/// consumed (§4.1 "PTS stamped at read time").
pub struct SimAudioSource {
    state: RwLock<SourceState>,
    fixed_caps: Mutex<Option<NegotiatedAudioCaps>>,
    samples_emitted: AtomicU64,
}

impl Default for SimAudioSource {
    fn default() -> Self {
        Self {
            state: RwLock::new(SourceState::Idle),
            fixed_caps: Mutex::new(None),
            samples_emitted: AtomicU64::new(0),
        }
    }
}

impl SimAudioSource {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn require_state(&self, expected: SourceState) -> DoorbellResult<()> {
        if *self.state.read() != expected {
            return Err(DoorbellError::InvalidState(format!(
                "expected {expected:?}, found {:?}",
                *self.state.read()
            )));
        }
        Ok(())
    }

    fn active_caps(&self) -> NegotiatedAudioCaps {
        (*self.fixed_caps.lock()).unwrap_or_else(|| {
            negotiate_caps(AudioFormatProposal::default(), AudioDefaults::default(), None)
                .expect("default proposal always negotiates")
        })
    }

    fn generate_samples(&self, caps: NegotiatedAudioCaps, frame_count: usize) -> Vec<u8> {
        let stride = caps.frame_stride();
        let mut buf = Vec::with_capacity(frame_count * stride);
        let start_sample = self.samples_emitted.load(Ordering::SeqCst);
        for i in 0..frame_count {
            let t = (start_sample + i as u64) as f32 / caps.sample_rate_hz as f32;
            let value = (TONE_AMPLITUDE * (2.0 * PI * TONE_FREQUENCY_HZ * t).sin()) as i16;
            for _ in 0..caps.channels {
                buf.extend_from_slice(&value.to_le_bytes());
            }
        }
        buf
    }
}

#[async_trait]
impl AudioSource for SimAudioSource {
    async fn open(&self) -> DoorbellResult<()> {
        self.require_state(SourceState::Idle)?;
        *self.state.write() = SourceState::Opened;
        Ok(())
    }

    fn get_supported_formats(&self) -> Vec<AudioFormatKind> {
        vec![AudioFormatKind::Pcm, AudioFormatKind::Any]
    }

    async fn negotiate_caps(
        &self,
        proposed: AudioFormatProposal,
    ) -> DoorbellResult<NegotiatedAudioCaps> {
        let fixed = *self.fixed_caps.lock();
        negotiate_caps(proposed, AudioDefaults::default(), fixed)
    }

    async fn set_fixed_caps(&self, caps: NegotiatedAudioCaps) -> DoorbellResult<()> {
        *self.fixed_caps.lock() = Some(caps);
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

    async fn read_frame(&self, size: usize) -> DoorbellResult<AudioFrame> {
        self.require_state(SourceState::Started)?;
        let caps = self.active_caps();
        let pts_ms =
            (self.samples_emitted.load(Ordering::SeqCst) * 1000 / u64::from(caps.sample_rate_hz)) as u32;

        if size == 0 {
            return Ok(AudioFrame {
                pts_ms,
                samples: bytes::Bytes::new(),
            });
        }

        let stride = caps.frame_stride().max(1);
        let frame_count = size / stride;
        let samples = self.generate_samples(caps, frame_count);
        self.samples_emitted
            .fetch_add(frame_count as u64, Ordering::SeqCst);
        Ok(AudioFrame {
            pts_ms,
            samples: bytes::Bytes::from(samples),
        })
    }

    async fn stop(&self) -> DoorbellResult<()> {
        self.require_state(SourceState::Started)?;
        *self.state.write() = SourceState::Stopped;
        Ok(())
    }

    async fn close(&self) -> DoorbellResult<()> {
        if *self.state.read() == SourceState::Started {
            *self.state.write() = SourceState::Stopped;
        }
        *self.state.write() = SourceState::Closed;
        Ok(())
    }

    fn state(&self) -> SourceState {
        *self.state.read()
    }
}

/// Simulated I2S output: accepts writes and discards them. Stands in for
/// a real speaker driver on dev hardware with no audio output wired up.
#[derive(Default)]
pub struct SimAudioSink {
    bytes_written: AtomicU64,
}

impl SimAudioSink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AudioSink for SimAudioSink {
    async fn write(&self, samples: &[u8], _timeout: Duration) -> DoorbellResult<()> {
        self.bytes_written
            .fetch_add(samples.len() as u64, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn read_frame_before_start_fails_invalid_state() {
        let source = SimAudioSource::new();
        source.open().await.unwrap();
        let result = source.read_frame(640).await;
        assert!(matches!(result, Err(DoorbellError::InvalidState(_))));
    }

    #[tokio::test]
    async fn read_frame_advances_pts_with_samples_consumed() {
        let source = SimAudioSource::new();
        source.open().await.unwrap();
        source.start().await.unwrap();

        let first = source.read_frame(640).await.unwrap();
        let second = source.read_frame(640).await.unwrap();
        assert!(second.pts_ms > first.pts_ms);
        assert_eq!(first.samples.len(), 640);
    }

    #[tokio::test]
    async fn zero_size_probe_does_not_consume_samples() {
        let source = SimAudioSource::new();
        source.open().await.unwrap();
        source.start().await.unwrap();

        let probe_a = source.read_frame(0).await.unwrap();
        let probe_b = source.read_frame(0).await.unwrap();
        assert_eq!(probe_a.pts_ms, probe_b.pts_ms);
        assert!(probe_a.samples.is_empty());
    }

    #[tokio::test]
    async fn sink_write_always_succeeds_and_counts_bytes() {
        let sink = SimAudioSink::new();
        sink.write(&[0u8; 128], Duration::from_millis(10)).await.unwrap();
        assert_eq!(sink.bytes_written(), 128);
    }
}
