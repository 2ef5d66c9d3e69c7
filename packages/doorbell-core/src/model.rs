//! Plain data types shared by every subsystem: frames, capabilities, wire
//! structures, and control-plane payloads.

use serde::{Deserialize, Serialize};

/// Audio sample format identifier used in caps negotiation. The source
/// only ever speaks PCM; `Any` exists so a caller can propose "whatever
/// you have" without committing to a format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioFormatId {
    Pcm,
    Any,
}

/// Proposed or negotiated audio capture format. `bits_per_sample` is
/// always forced to 16 by negotiation ([`AudioFormatId`] doc comment);
/// it is kept here rather than hardcoded so a negotiated [`AudioCaps`]
/// fully describes the frame stride.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioCaps {
    pub format_id: AudioFormatId,
    pub sample_rate_hz: u32,
    pub channels: u8,
    pub bits_per_sample: u8,
}

impl AudioCaps {
    /// Byte length of one interleaved sample frame (all channels).
    #[must_use]
    pub fn frame_stride(&self) -> usize {
        (self.bits_per_sample as usize / 8) * self.channels as usize
    }
}

/// Negotiated video capture format. The doorbell camera only ever produces
/// one resolution/framerate pair per deployment, but the type is still
/// explicit so capture-engine negotiation has something to check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoCaps {
    pub width: u16,
    pub height: u16,
    pub fps_hint: u8,
}

/// A single PCM-s16le audio frame and its presentation timestamp.
///
/// `samples` length is always a multiple of the negotiated frame stride;
/// `pts_ms` is monotonically non-decreasing across consecutive reads from
/// the same source.
#[derive(Debug, Clone)]
pub struct AudioFrame {
    pub pts_ms: u32,
    pub samples: bytes::Bytes,
}

/// A single MJPEG video frame (opaque byte sequence) and its PTS, carried
/// through unchanged from the source.
#[derive(Debug, Clone)]
pub struct VideoFrame {
    pub pts_ms: u32,
    pub width: u16,
    pub height: u16,
    pub data: bytes::Bytes,
}

/// Identifies a capture-engine sink for attach/detach bookkeeping.
pub type SinkId = u64;

/// Describes one finalized (or in-progress) recording segment on disk.
#[derive(Debug, Clone)]
pub struct SegmentDescriptor {
    pub path: std::path::PathBuf,
    pub slice_index: u64,
    pub open_time_ms: u64,
}

/// Wire-level frame kind carried in [`StreamFrameHeader::frame_type`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireFrameType {
    Video = 0x01,
    Audio = 0x02,
}

/// Fixed 12-byte big-endian header prefixed to every frame sent over the
/// live-view websocket: `magic(u16) | type(u8) | reserved(u8) | seq(u32) |
/// pts(u32)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamFrameHeader {
    pub frame_type: WireFrameType,
    pub sequence: u32,
    pub pts_ms: u32,
}

impl StreamFrameHeader {
    /// `"AV"` as a big-endian u16.
    pub const MAGIC: u16 = 0x4156;
    pub const WIRE_SIZE: usize = 12;

    /// Encodes the header into its 12-byte wire representation.
    #[must_use]
    pub fn encode(&self) -> [u8; Self::WIRE_SIZE] {
        let mut buf = [0u8; Self::WIRE_SIZE];
        buf[0..2].copy_from_slice(&Self::MAGIC.to_be_bytes());
        buf[2] = self.frame_type as u8;
        buf[3] = 0; // reserved
        buf[4..8].copy_from_slice(&self.sequence.to_be_bytes());
        buf[8..12].copy_from_slice(&self.pts_ms.to_be_bytes());
        buf
    }

    /// Decodes a 12-byte wire header, validating the magic number.
    pub fn decode(buf: &[u8]) -> Option<Self> {
        if buf.len() < Self::WIRE_SIZE {
            return None;
        }
        let magic = u16::from_be_bytes([buf[0], buf[1]]);
        if magic != Self::MAGIC {
            return None;
        }
        let frame_type = match buf[2] {
            0x01 => WireFrameType::Video,
            0x02 => WireFrameType::Audio,
            _ => return None,
        };
        let sequence = u32::from_be_bytes([buf[4], buf[5], buf[6], buf[7]]);
        let pts_ms = u32::from_be_bytes([buf[8], buf[9], buf[10], buf[11]]);
        Some(Self {
            frame_type,
            sequence,
            pts_ms,
        })
    }
}

/// Inbound control-plane message, tagged by `action` in the JSON payload.
/// Any other shape — unknown action, malformed JSON — is rejected by the
/// deserializer and discarded by the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ControlMessage {
    StartStream,
    StopStream,
    SetChime { chime_index: i32 },
}

/// Outbound heartbeat payload, published every tick by the scheduler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatPayload {
    pub device_id: String,
    pub device_key: String,
    pub timestamp: i64,
    pub battery_level: u8,
    pub signal_strength: i16,
    pub uptime: u64,
    pub fw_ver: String,
    pub is_active: bool,
}

/// Outbound bell-press notification payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BellEventPayload {
    pub device_id: String,
    pub device_key: String,
    pub timestamp: i64,
    pub event: String,
}

impl BellEventPayload {
    /// Builds a bell-press payload with the fixed `event` discriminant.
    #[must_use]
    pub fn new(device_id: String, device_key: String, timestamp: i64) -> Self {
        Self {
            device_id,
            device_key,
            timestamp,
            event: "bell_pressed".to_string(),
        }
    }
}

/// Commands accepted by the audio player's single worker task.
#[derive(Debug, Clone)]
pub enum PlayerCommand {
    PlayIndex(u32),
    Stop,
    Exit,
}
