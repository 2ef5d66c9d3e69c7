//! Audio source contract (C1): pulls PCM frames from an I2S-like bus,
//! applies ALC, and stamps PTS.

use async_trait::async_trait;

use crate::error::{DoorbellError, DoorbellResult};
use crate::model::AudioFrame;

/// Proposed or preferred audio format tuple used during negotiation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AudioFormatProposal {
    pub format_id: Option<AudioFormatKind>,
    pub sample_rate_hz: Option<u32>,
    pub channels: Option<u8>,
}

/// Sample format a source may be asked for. Only `Pcm` (or `Any`, meaning
/// "whatever the source's default is") is negotiable against a capture
/// source; the compressed kinds exist so a caller proposing one gets a
/// real `NotSupported` rejection instead of a silently-ignored guard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioFormatKind {
    Pcm,
    Any,
    Aac,
    Opus,
}

/// Fully negotiated audio format; `bits_per_sample` is always 16 (§4.1 rule 3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NegotiatedAudioCaps {
    pub sample_rate_hz: u32,
    pub channels: u8,
    pub bits_per_sample: u8,
}

impl NegotiatedAudioCaps {
    /// Byte length of one interleaved sample frame across all channels.
    #[must_use]
    pub fn frame_stride(&self) -> usize {
        (self.bits_per_sample as usize / 8) * self.channels as usize
    }
}

const MIN_SAMPLE_RATE_HZ: u32 = 8_000;
const MAX_SAMPLE_RATE_HZ: u32 = 48_000;

/// Default preferred tuple used to fill in unspecified proposal fields.
#[derive(Debug, Clone, Copy)]
pub struct AudioDefaults {
    pub sample_rate_hz: u32,
    pub channels: u8,
}

impl Default for AudioDefaults {
    fn default() -> Self {
        Self {
            sample_rate_hz: 16_000,
            channels: 1,
        }
    }
}

/// Negotiates a proposed format against a source's defaults and, if
/// present, a previously pinned fixed format (§4.1 "Caps negotiation").
pub fn negotiate_caps(
    proposed: AudioFormatProposal,
    defaults: AudioDefaults,
    fixed: Option<NegotiatedAudioCaps>,
) -> DoorbellResult<NegotiatedAudioCaps> {
    if let Some(kind) = proposed.format_id {
        if kind != AudioFormatKind::Pcm && kind != AudioFormatKind::Any {
            return Err(DoorbellError::NotSupported(
                "only PCM is negotiable".into(),
            ));
        }
    }

    let sample_rate_hz = proposed.sample_rate_hz.unwrap_or(defaults.sample_rate_hz);
    let channels = proposed.channels.unwrap_or(defaults.channels);

    if !(MIN_SAMPLE_RATE_HZ..=MAX_SAMPLE_RATE_HZ).contains(&sample_rate_hz) {
        return Err(DoorbellError::NotSupported(format!(
            "sample_rate_hz {sample_rate_hz} out of [{MIN_SAMPLE_RATE_HZ},{MAX_SAMPLE_RATE_HZ}]"
        )));
    }
    if channels != 1 && channels != 2 {
        return Err(DoorbellError::NotSupported(format!(
            "channels {channels} not in {{1,2}}"
        )));
    }

    let negotiated = NegotiatedAudioCaps {
        sample_rate_hz,
        channels,
        bits_per_sample: 16,
    };

    if let Some(pinned) = fixed {
        if pinned != negotiated {
            return Err(DoorbellError::NotSupported(
                "proposal does not match the pinned fixed caps".into(),
            ));
        }
    }

    Ok(negotiated)
}

/// Lifecycle states an [`AudioSource`] moves through. Reads outside
/// `Started` fail `INVALID_STATE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceState {
    Idle,
    Opened,
    Started,
    Stopped,
    Closed,
}

/// Contract for a PCM audio source (§4.1). Implemented by the simulated
/// I2S backend in `doorbell-hal` and, on real hardware, by a driver-backed
/// equivalent that satisfies the same state machine.
#[async_trait]
pub trait AudioSource: Send + Sync {
    /// Transitions `Idle -> Opened`.
    async fn open(&self) -> DoorbellResult<()>;

    /// Returns the formats this source can negotiate.
    fn get_supported_formats(&self) -> Vec<AudioFormatKind>;

    /// Negotiates a format; does not require the source to be started.
    async fn negotiate_caps(
        &self,
        proposed: AudioFormatProposal,
    ) -> DoorbellResult<NegotiatedAudioCaps>;

    /// Pins a fixed caps tuple; subsequent negotiations must match exactly.
    async fn set_fixed_caps(&self, caps: NegotiatedAudioCaps) -> DoorbellResult<()>;

    /// Transitions `Opened -> Started` (or `Stopped -> Started`).
    async fn start(&self) -> DoorbellResult<()>;

    /// Reads one frame of `size` bytes (a multiple of the frame stride).
    /// `size == 0` probes the next PTS without consuming bytes. Blocks
    /// until `size` bytes are available, the read timeout elapses
    /// (`Timeout`), or the bus fails (`Internal`). Fails `InvalidState`
    /// unless the source is `Started`.
    async fn read_frame(&self, size: usize) -> DoorbellResult<AudioFrame>;

    /// Transitions `Started -> Stopped`.
    async fn stop(&self) -> DoorbellResult<()>;

    /// Transitions to `Closed`; implies `stop` if still started.
    async fn close(&self) -> DoorbellResult<()>;

    /// Current lifecycle state, for tests and diagnostics.
    fn state(&self) -> SourceState;
}

/// Output I2S-like contract, owned exclusively by the Audio Player once
/// initialized (§5 "Shared resources").
#[async_trait]
pub trait AudioSink: Send + Sync {
    /// Writes PCM samples to the output, blocking up to `timeout` until
    /// the full buffer is accepted.
    async fn write(&self, samples: &[u8], timeout: std::time::Duration) -> DoorbellResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negotiation_fills_unspecified_fields_from_defaults() {
        let caps = negotiate_caps(
            AudioFormatProposal::default(),
            AudioDefaults::default(),
            None,
        )
        .unwrap();
        assert_eq!(caps.sample_rate_hz, 16_000);
        assert_eq!(caps.channels, 1);
        assert_eq!(caps.bits_per_sample, 16);
    }

    #[test]
    fn negotiation_rejects_non_pcm_format() {
        let proposed = AudioFormatProposal {
            format_id: Some(AudioFormatKind::Aac),
            ..Default::default()
        };
        let result = negotiate_caps(proposed, AudioDefaults::default(), None);
        assert!(matches!(result, Err(DoorbellError::NotSupported(_))));
    }

    #[test]
    fn negotiation_allows_pcm_and_any() {
        let pcm = AudioFormatProposal {
            format_id: Some(AudioFormatKind::Pcm),
            ..Default::default()
        };
        let any = AudioFormatProposal {
            format_id: Some(AudioFormatKind::Any),
            ..Default::default()
        };
        assert!(negotiate_caps(pcm, AudioDefaults::default(), None).is_ok());
        assert!(negotiate_caps(any, AudioDefaults::default(), None).is_ok());
    }

    #[test]
    fn negotiation_rejects_out_of_range_sample_rate() {
        let proposed = AudioFormatProposal {
            sample_rate_hz: Some(96_000),
            ..Default::default()
        };
        let result = negotiate_caps(proposed, AudioDefaults::default(), None);
        assert!(matches!(result, Err(DoorbellError::NotSupported(_))));
    }

    #[test]
    fn negotiation_rejects_unsupported_channel_count() {
        let proposed = AudioFormatProposal {
            channels: Some(5),
            ..Default::default()
        };
        let result = negotiate_caps(proposed, AudioDefaults::default(), None);
        assert!(matches!(result, Err(DoorbellError::NotSupported(_))));
    }

    #[test]
    fn negotiation_is_idempotent_against_fixed_caps() {
        let defaults = AudioDefaults::default();
        let first = negotiate_caps(AudioFormatProposal::default(), defaults, None).unwrap();
        let second =
            negotiate_caps(AudioFormatProposal::default(), defaults, Some(first)).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn negotiation_rejects_mismatch_against_fixed_caps() {
        let defaults = AudioDefaults::default();
        let fixed = negotiate_caps(AudioFormatProposal::default(), defaults, None).unwrap();
        let mismatched = AudioFormatProposal {
            channels: Some(2),
            ..Default::default()
        };
        let result = negotiate_caps(mismatched, defaults, Some(fixed));
        assert!(matches!(result, Err(DoorbellError::NotSupported(_))));
    }
}
