//! Broadcast-channel transport for [`super::BroadcastEvent`].

use tokio::sync::broadcast;

use super::{
    BroadcastEvent, ButtonEvent, CaptureEvent, ControlEvent, EventEmitter, HeartbeatEvent,
    PlayerEvent, ProvisioningEvent, RecorderEvent, StreamEvent,
};

/// Default channel depth; slow subscribers (a diagnostics tap, a test) fall
/// behind and start missing the oldest events rather than back-pressuring
/// the emitting subsystem.
const DEFAULT_CHANNEL_DEPTH: usize = 256;

/// Fan-out event bus backed by [`tokio::sync::broadcast`].
///
/// Cloning a bridge clones the sender handle, so every subsystem holds its
/// own cheap `Arc`-backed clone rather than sharing a `&BroadcastEventBridge`.
#[derive(Clone)]
pub struct BroadcastEventBridge {
    sender: broadcast::Sender<BroadcastEvent>,
}

impl BroadcastEventBridge {
    /// Creates a bridge with the default channel depth.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_DEPTH)
    }

    /// Creates a bridge with an explicit channel depth.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Subscribes to the event stream.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<BroadcastEvent> {
        self.sender.subscribe()
    }

    fn publish(&self, event: BroadcastEvent) {
        // A send error just means there are currently no subscribers; events
        // are fire-and-forget, not a delivery guarantee.
        let _ = self.sender.send(event);
    }
}

impl Default for BroadcastEventBridge {
    fn default() -> Self {
        Self::new()
    }
}

macro_rules! impl_emit {
    ($method:ident, $event_ty:ty) => {
        fn $method(&self, event: $event_ty) {
            self.publish(event.into());
        }
    };
}

impl EventEmitter for BroadcastEventBridge {
    impl_emit!(emit_capture, CaptureEvent);
    impl_emit!(emit_recorder, RecorderEvent);
    impl_emit!(emit_stream, StreamEvent);
    impl_emit!(emit_player, PlayerEvent);
    impl_emit!(emit_button, ButtonEvent);
    impl_emit!(emit_control, ControlEvent);
    impl_emit!(emit_heartbeat, HeartbeatEvent);
    impl_emit!(emit_provisioning, ProvisioningEvent);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscriber_receives_published_event() {
        let bridge = BroadcastEventBridge::new();
        let mut rx = bridge.subscribe();

        bridge.emit_button(ButtonEvent::Pressed {
            at: std::time::SystemTime::now(),
        });

        match rx.recv().await.unwrap() {
            BroadcastEvent::Button(ButtonEvent::Pressed { .. }) => {}
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn publish_without_subscribers_does_not_panic() {
        let bridge = BroadcastEventBridge::new();
        bridge.emit_heartbeat(HeartbeatEvent::Published {
            battery_pct: 90,
            rssi_dbm: -55,
        });
    }
}
