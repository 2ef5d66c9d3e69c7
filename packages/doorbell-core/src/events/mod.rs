//! Typed domain events shared across every subsystem.
//!
//! Each subsystem defines its own small event enum; [`BroadcastEvent`] wraps
//! all of them into the single type that travels over the in-process
//! broadcast channel so a single subscriber (the control router's status
//! publisher, a diagnostics tap, a test harness) can observe the whole
//! system without depending on every subsystem's crate module directly.

mod bridge;
mod emitter;

pub use bridge::BroadcastEventBridge;
pub use emitter::{EventEmitter, LoggingEventEmitter, NoopEventEmitter};

use std::time::SystemTime;

/// Capture engine lifecycle events (C3).
#[derive(Debug, Clone)]
pub enum CaptureEvent {
    /// The engine transitioned from `Idle` to `Running`.
    Started,
    /// The engine transitioned back to `Idle`.
    Stopped,
    /// A sink was starved for more than its configured grace window.
    SinkStalled { sink_id: u64 },
    /// Audio/video PTS drift exceeded the sync tolerance.
    SyncDriftDetected { drift_ms: i64 },
}

/// Recorder / segmenter events (C4, C5).
#[derive(Debug, Clone)]
pub enum RecorderEvent {
    /// A new segment file was opened for writing.
    SegmentOpened { path: String },
    /// A segment was finalized (moov box written, file closed).
    SegmentClosed { path: String, duration_ms: u64 },
    /// The reaper deleted a segment to satisfy the retention budget.
    SegmentReaped { path: String },
    /// A segment write failed; the segment was abandoned.
    SegmentWriteFailed { path: String, reason: String },
}

/// Live streamer events (C6).
#[derive(Debug, Clone)]
pub enum StreamEvent {
    /// A viewer connection was accepted and the streamer began sending frames.
    ViewerConnected { viewer_id: u64 },
    /// A viewer connection closed, cleanly or otherwise.
    ViewerDisconnected { viewer_id: u64 },
    /// The bounded queue dropped a frame to stay within its depth budget.
    FrameDropped { is_video: bool },
    /// A reconnect attempt is scheduled after the given backoff.
    ReconnectScheduled { backoff_ms: u64 },
}

/// Audio player events (C7).
#[derive(Debug, Clone)]
pub enum PlayerEvent {
    /// Playback of a chime index began.
    PlaybackStarted { index: u32 },
    /// Playback finished normally.
    PlaybackFinished { index: u32 },
    /// Playback was preempted by a newer command.
    PlaybackPreempted { index: u32 },
    /// Decode failed and playback was aborted.
    PlaybackFailed { index: u32, reason: String },
}

/// Button / bell-press events (C2, C1 wiring).
#[derive(Debug, Clone)]
pub enum ButtonEvent {
    /// A debounced press was detected.
    Pressed { at: SystemTime },
}

/// Control router events (C9).
#[derive(Debug, Clone)]
pub enum ControlEvent {
    /// The MQTT client completed its connect handshake.
    Connected,
    /// The MQTT connection was lost; a reconnect will be attempted.
    Disconnected { reason: String },
    /// An inbound control message was accepted and dispatched.
    MessageDispatched { action: String },
    /// An inbound payload failed to parse and was discarded.
    MessageDiscarded { reason: String },
}

/// Heartbeat scheduler events (C11).
#[derive(Debug, Clone)]
pub enum HeartbeatEvent {
    /// A heartbeat payload was published.
    Published { battery_pct: u8, rssi_dbm: i16 },
}

/// Provisioning handoff events (C12).
#[derive(Debug, Clone)]
pub enum ProvisioningEvent {
    /// Device identity and network credentials became available.
    Provisioned,
    /// The device is unprovisioned and awaiting BLE handoff.
    AwaitingProvisioning,
}

/// The union of every subsystem's events, as carried on the broadcast bus.
#[derive(Debug, Clone)]
pub enum BroadcastEvent {
    Capture(CaptureEvent),
    Recorder(RecorderEvent),
    Stream(StreamEvent),
    Player(PlayerEvent),
    Button(ButtonEvent),
    Control(ControlEvent),
    Heartbeat(HeartbeatEvent),
    Provisioning(ProvisioningEvent),
}

impl From<CaptureEvent> for BroadcastEvent {
    fn from(event: CaptureEvent) -> Self {
        Self::Capture(event)
    }
}

impl From<RecorderEvent> for BroadcastEvent {
    fn from(event: RecorderEvent) -> Self {
        Self::Recorder(event)
    }
}

impl From<StreamEvent> for BroadcastEvent {
    fn from(event: StreamEvent) -> Self {
        Self::Stream(event)
    }
}

impl From<PlayerEvent> for BroadcastEvent {
    fn from(event: PlayerEvent) -> Self {
        Self::Player(event)
    }
}

impl From<ButtonEvent> for BroadcastEvent {
    fn from(event: ButtonEvent) -> Self {
        Self::Button(event)
    }
}

impl From<ControlEvent> for BroadcastEvent {
    fn from(event: ControlEvent) -> Self {
        Self::Control(event)
    }
}

impl From<HeartbeatEvent> for BroadcastEvent {
    fn from(event: HeartbeatEvent) -> Self {
        Self::Heartbeat(event)
    }
}

impl From<ProvisioningEvent> for BroadcastEvent {
    fn from(event: ProvisioningEvent) -> Self {
        Self::Provisioning(event)
    }
}
