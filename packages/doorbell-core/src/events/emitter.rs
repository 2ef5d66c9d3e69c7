//! Domain-facing event emission trait.

use super::{
    ButtonEvent, CaptureEvent, ControlEvent, HeartbeatEvent, PlayerEvent, ProvisioningEvent,
    RecorderEvent, StreamEvent,
};

/// Trait for domain services to emit events without knowing the transport.
///
/// The default (and, for this firmware, only) transport is the in-process
/// broadcast bridge ([`super::bridge::BroadcastEventBridge`]); the trait
/// exists so services depend on an interface rather than a concrete
/// channel, matching the teacher's `EventEmitter` boundary.
pub trait EventEmitter: Send + Sync {
    /// Emits a capture-engine lifecycle event.
    fn emit_capture(&self, event: CaptureEvent);
    /// Emits a recorder/segmenter event.
    fn emit_recorder(&self, event: RecorderEvent);
    /// Emits a live-streamer event.
    fn emit_stream(&self, event: StreamEvent);
    /// Emits an audio player event.
    fn emit_player(&self, event: PlayerEvent);
    /// Emits a button-press event.
    fn emit_button(&self, event: ButtonEvent);
    /// Emits a control-router event.
    fn emit_control(&self, event: ControlEvent);
    /// Emits a heartbeat-publish event.
    fn emit_heartbeat(&self, event: HeartbeatEvent);
    /// Emits a provisioning-status event.
    fn emit_provisioning(&self, event: ProvisioningEvent);
}

/// No-op emitter for tests and standalone component use.
#[derive(Default, Clone, Copy)]
pub struct NoopEventEmitter;

impl EventEmitter for NoopEventEmitter {
    fn emit_capture(&self, _event: CaptureEvent) {}
    fn emit_recorder(&self, _event: RecorderEvent) {}
    fn emit_stream(&self, _event: StreamEvent) {}
    fn emit_player(&self, _event: PlayerEvent) {}
    fn emit_button(&self, _event: ButtonEvent) {}
    fn emit_control(&self, _event: ControlEvent) {}
    fn emit_heartbeat(&self, _event: HeartbeatEvent) {}
    fn emit_provisioning(&self, _event: ProvisioningEvent) {}
}

/// Emitter that logs every event at debug level; useful while wiring a
/// component up before its real transport exists.
#[derive(Default, Clone, Copy)]
pub struct LoggingEventEmitter;

macro_rules! impl_log_emit {
    ($method:ident, $event_ty:ty) => {
        fn $method(&self, event: $event_ty) {
            log::debug!("[Event] {:?}", event);
        }
    };
}

impl EventEmitter for LoggingEventEmitter {
    impl_log_emit!(emit_capture, CaptureEvent);
    impl_log_emit!(emit_recorder, RecorderEvent);
    impl_log_emit!(emit_stream, StreamEvent);
    impl_log_emit!(emit_player, PlayerEvent);
    impl_log_emit!(emit_button, ButtonEvent);
    impl_log_emit!(emit_control, ControlEvent);
    impl_log_emit!(emit_heartbeat, HeartbeatEvent);
    impl_log_emit!(emit_provisioning, ProvisioningEvent);
}
