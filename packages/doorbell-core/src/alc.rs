//! Automatic Level Control: per-channel static gain applied in place to a
//! PCM-s16le buffer after each successful audio read.
//!
//! ALC failures are logged and bypassed by the caller, never propagated as
//! a read failure (§4.1) — this module therefore never returns `Err` for a
//! malformed buffer, it simply declines to touch the odd trailing byte.

use std::sync::Arc;

use async_trait::async_trait;

use crate::audio::{
    AudioFormatKind, AudioFormatProposal, AudioSource, NegotiatedAudioCaps, SourceState,
};
use crate::error::DoorbellResult;
use crate::model::AudioFrame;

/// Static per-channel gain applied after every successful read (§4.1
/// "Automatic Level Control").
#[derive(Debug, Clone, Copy)]
pub struct AlcConfig {
    pub enabled: bool,
    pub gain_db: f32,
}

impl Default for AlcConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            gain_db: 0.0,
        }
    }
}

/// Wraps any [`AudioSource`] and applies [`apply_alc`] to every
/// successfully read frame's samples, in place, when enabled. A zero-length
/// probe read is left untouched since there is nothing to gain-adjust.
pub struct AlcAudioSource {
    inner: Arc<dyn AudioSource>,
    config: AlcConfig,
}

impl AlcAudioSource {
    #[must_use]
    pub fn new(inner: Arc<dyn AudioSource>, config: AlcConfig) -> Self {
        Self { inner, config }
    }
}

#[async_trait]
impl AudioSource for AlcAudioSource {
    async fn open(&self) -> DoorbellResult<()> {
        self.inner.open().await
    }

    fn get_supported_formats(&self) -> Vec<AudioFormatKind> {
        self.inner.get_supported_formats()
    }

    async fn negotiate_caps(
        &self,
        proposed: AudioFormatProposal,
    ) -> DoorbellResult<NegotiatedAudioCaps> {
        self.inner.negotiate_caps(proposed).await
    }

    async fn set_fixed_caps(&self, caps: NegotiatedAudioCaps) -> DoorbellResult<()> {
        self.inner.set_fixed_caps(caps).await
    }

    async fn start(&self) -> DoorbellResult<()> {
        self.inner.start().await
    }

    async fn read_frame(&self, size: usize) -> DoorbellResult<AudioFrame> {
        let mut frame = self.inner.read_frame(size).await?;
        if self.config.enabled && !frame.samples.is_empty() {
            let mut buf = frame.samples.to_vec();
            apply_alc(&mut buf, self.config.gain_db);
            frame.samples = bytes::Bytes::from(buf);
        }
        Ok(frame)
    }

    async fn stop(&self) -> DoorbellResult<()> {
        self.inner.stop().await
    }

    async fn close(&self) -> DoorbellResult<()> {
        self.inner.close().await
    }

    fn state(&self) -> SourceState {
        self.inner.state()
    }
}

/// Applies a gain in decibels to every sample of an interleaved
/// PCM-s16le buffer, in place.
///
/// `buf.len()` need not be a multiple of 2; any trailing odd byte is left
/// untouched. Samples are clamped to `i16` range on overflow rather than
/// wrapping.
pub fn apply_alc(buf: &mut [u8], gain_db: f32) {
    let usable_len = buf.len() - (buf.len() % 2);
    let samples: &mut [i16] = bytemuck::cast_slice_mut(&mut buf[..usable_len]);
    let gain_linear = 10f32.powf(gain_db / 20.0);
    for sample in samples.iter_mut() {
        let scaled = f32::from(*sample) * gain_linear;
        *sample = scaled.clamp(f32::from(i16::MIN), f32::from(i16::MAX)) as i16;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_db_gain_is_a_no_op() {
        let mut buf = 1000i16.to_le_bytes().repeat(4);
        let original = buf.clone();
        apply_alc(&mut buf, 0.0);
        assert_eq!(buf, original);
    }

    #[test]
    fn positive_gain_increases_magnitude() {
        let mut buf = 1000i16.to_le_bytes().to_vec();
        apply_alc(&mut buf, 6.0);
        let sample = i16::from_le_bytes([buf[0], buf[1]]);
        assert!(sample > 1000);
    }

    #[test]
    fn gain_clamps_instead_of_wrapping() {
        let mut buf = i16::MAX.to_le_bytes().to_vec();
        apply_alc(&mut buf, 20.0);
        let sample = i16::from_le_bytes([buf[0], buf[1]]);
        assert_eq!(sample, i16::MAX);
    }

    #[test]
    fn trailing_odd_byte_is_left_untouched() {
        let mut buf = vec![0u8, 0u8, 0xAB];
        apply_alc(&mut buf, 6.0);
        assert_eq!(buf[2], 0xAB);
    }

    #[test]
    fn stride_matches_frame_stride_for_stereo_16_bit() {
        // Guards against the open question in the source about the ALC
        // cast assuming buf.len() / (bits/8 * channels) sample frames;
        // cast_slice_mut must see exactly that many i16 elements.
        let channels = 2usize;
        let bytes_per_sample = 2usize;
        let buf = vec![0u8; 64];
        let expected_sample_frames = buf.len() / (bytes_per_sample * channels);
        let samples: &[i16] = bytemuck::cast_slice(&buf);
        assert_eq!(samples.len() / channels, expected_sample_frames);
    }

    struct FixedToneSource;

    #[async_trait]
    impl AudioSource for FixedToneSource {
        async fn open(&self) -> DoorbellResult<()> {
            Ok(())
        }
        fn get_supported_formats(&self) -> Vec<AudioFormatKind> {
            vec![AudioFormatKind::Pcm]
        }
        async fn negotiate_caps(
            &self,
            _proposed: AudioFormatProposal,
        ) -> DoorbellResult<NegotiatedAudioCaps> {
            Ok(NegotiatedAudioCaps {
                sample_rate_hz: 16_000,
                channels: 1,
                bits_per_sample: 16,
            })
        }
        async fn set_fixed_caps(&self, _caps: NegotiatedAudioCaps) -> DoorbellResult<()> {
            Ok(())
        }
        async fn start(&self) -> DoorbellResult<()> {
            Ok(())
        }
        async fn read_frame(&self, size: usize) -> DoorbellResult<AudioFrame> {
            if size == 0 {
                return Ok(AudioFrame {
                    pts_ms: 0,
                    samples: bytes::Bytes::new(),
                });
            }
            let samples = 1000i16.to_le_bytes().repeat(size / 2);
            Ok(AudioFrame {
                pts_ms: 0,
                samples: bytes::Bytes::from(samples),
            })
        }
        async fn stop(&self) -> DoorbellResult<()> {
            Ok(())
        }
        async fn close(&self) -> DoorbellResult<()> {
            Ok(())
        }
        fn state(&self) -> SourceState {
            SourceState::Started
        }
    }

    #[tokio::test]
    async fn alc_source_applies_gain_to_wrapped_reads() {
        let wrapped = AlcAudioSource::new(
            Arc::new(FixedToneSource),
            AlcConfig {
                enabled: true,
                gain_db: 6.0,
            },
        );
        let frame = wrapped.read_frame(4).await.unwrap();
        let sample = i16::from_le_bytes([frame.samples[0], frame.samples[1]]);
        assert!(sample > 1000);
    }

    #[tokio::test]
    async fn disabled_alc_source_passes_samples_through_unchanged() {
        let wrapped = AlcAudioSource::new(
            Arc::new(FixedToneSource),
            AlcConfig {
                enabled: false,
                gain_db: 6.0,
            },
        );
        let frame = wrapped.read_frame(4).await.unwrap();
        let sample = i16::from_le_bytes([frame.samples[0], frame.samples[1]]);
        assert_eq!(sample, 1000);
    }

    #[tokio::test]
    async fn zero_size_probe_is_left_untouched() {
        let wrapped = AlcAudioSource::new(
            Arc::new(FixedToneSource),
            AlcConfig {
                enabled: true,
                gain_db: 6.0,
            },
        );
        let frame = wrapped.read_frame(0).await.unwrap();
        assert!(frame.samples.is_empty());
    }
}
