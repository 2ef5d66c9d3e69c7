//! Control Router (C9): MQTT session, per-device topic subscriptions, and
//! dispatch of inbound control messages into pipeline state transitions
//! (§4.9, §6).

use std::sync::Arc;
use std::time::Duration;

use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, QoS, Transport};

use crate::capture::CaptureEngine;
use crate::error::{DoorbellError, DoorbellResult};
use crate::events::{ControlEvent, EventEmitter};
use crate::model::{BellEventPayload, ControlMessage, HeartbeatPayload};
use crate::runtime::TaskSpawner;
use crate::settings::SettingsStore;
use crate::stream::LiveStreamer;

/// The identity a device presents on the control plane, read once at
/// Provisioning time and shared read-only thereafter (§0 "NVS-backed
/// device identity").
#[derive(Debug, Clone)]
pub struct DeviceIdentity {
    pub device_id: String,
    pub device_key_hex: String,
}

impl DeviceIdentity {
    /// Identity used when the KV store has never been provisioned; the
    /// router still comes up so heartbeats and logs are diagnosable
    /// (§4.9 "Identity").
    #[must_use]
    pub fn compile_time_default() -> Self {
        Self {
            device_id: "unprovisioned-doorbell".to_string(),
            device_key_hex: "00".repeat(32),
        }
    }
}

/// Authentication material for the broker session (§4.9 "Security"): a
/// root CA plus client certificate, OR a username/password pair, OR an
/// access token, chosen once at configure time.
#[derive(Debug, Clone)]
pub enum Credentials {
    TlsCertificate {
        ca_pem: Vec<u8>,
        client_cert_pem: Vec<u8>,
        client_key_pem: Vec<u8>,
    },
    UsernamePassword { username: String, password: String },
    AccessToken { token: String },
}

#[derive(Debug, Clone)]
pub struct ControlRouterConfig {
    pub broker_host: String,
    pub broker_port: u16,
    pub client_id: String,
    pub credentials: Credentials,
    /// MQTT protocol version knob, carried from `original_source` (§0).
    pub protocol_version_5: bool,
    pub reconnect_timeout: Duration,
    pub keep_alive: Duration,
    pub inflight_mailbox_capacity: usize,
}

impl ControlRouterConfig {
    #[must_use]
    pub fn new(broker_host: String, broker_port: u16, client_id: String, credentials: Credentials) -> Self {
        Self {
            broker_host,
            broker_port,
            client_id,
            credentials,
            protocol_version_5: true,
            reconnect_timeout: Duration::from_millis(5_000),
            keep_alive: Duration::from_secs(30),
            inflight_mailbox_capacity: 32,
        }
    }
}

fn stream_control_topic(device_id: &str) -> String {
    format!("doorbell/stream_control/{device_id}")
}

fn settings_topic(device_id: &str) -> String {
    format!("doorbell/settings/{device_id}")
}

fn heartbeat_topic(device_id: &str) -> String {
    format!("doorbell/heartbeat/{device_id}")
}

fn bell_event_topic(device_id: &str) -> String {
    format!("doorbell/bell_event/{device_id}")
}

/// Collaborators the router dispatches inbound messages to. Held as trait
/// objects / concrete `Arc`s so `ControlRouter` doesn't need to know how
/// capture, streaming, or settings are wired internally.
pub struct ControlTargets {
    pub capture: Arc<CaptureEngine>,
    pub streamer: Arc<LiveStreamer>,
    pub settings: Arc<SettingsStore>,
}

/// MQTT client mediating between the broker and the rest of the pipeline.
/// Owns the `rumqttc` `AsyncClient` handle for publishing; the `EventLoop`
/// is driven by a background task spawned from [`Self::start`].
pub struct ControlRouter {
    identity: DeviceIdentity,
    client: AsyncClient,
    events: Arc<dyn EventEmitter>,
}

impl ControlRouter {
    /// Builds the MQTT client and connects it, subscribing to this
    /// device's control topics. The event loop is not yet running; call
    /// [`Self::start`] to spawn the dispatch task.
    pub async fn connect(
        config: ControlRouterConfig,
        identity: DeviceIdentity,
        events: Arc<dyn EventEmitter>,
    ) -> DoorbellResult<(Arc<Self>, EventLoop)> {
        let mut options = MqttOptions::new(
            config.client_id.clone(),
            config.broker_host.clone(),
            config.broker_port,
        );
        options.set_keep_alive(config.keep_alive);

        match &config.credentials {
            Credentials::TlsCertificate {
                ca_pem,
                client_cert_pem,
                client_key_pem,
            } => {
                options.set_transport(Transport::tls(
                    ca_pem.clone(),
                    Some((client_cert_pem.clone(), client_key_pem.clone())),
                    None,
                ));
            }
            Credentials::UsernamePassword { username, password } => {
                options.set_credentials(username.clone(), password.clone());
            }
            Credentials::AccessToken { token } => {
                options.set_credentials(config.client_id.clone(), token.clone());
            }
        }

        let (client, event_loop) = AsyncClient::new(options, config.inflight_mailbox_capacity);

        client
            .subscribe(stream_control_topic(&identity.device_id), QoS::AtLeastOnce)
            .await
            .map_err(|err| DoorbellError::Internal(format!("mqtt subscribe failed: {err}")))?;
        client
            .subscribe(settings_topic(&identity.device_id), QoS::AtLeastOnce)
            .await
            .map_err(|err| DoorbellError::Internal(format!("mqtt subscribe failed: {err}")))?;

        let router = Arc::new(Self {
            identity,
            client,
            events,
        });
        Ok((router, event_loop))
    }

    #[must_use]
    pub fn identity(&self) -> &DeviceIdentity {
        &self.identity
    }

    /// Spawns the task that drives `event_loop.poll()` and dispatches
    /// every inbound publish to `targets`, via `spawner` so the
    /// composition root remains the only caller of `tokio::spawn`.
    pub fn start(
        self: &Arc<Self>,
        mut event_loop: EventLoop,
        targets: ControlTargets,
        spawner: &dyn TaskSpawner,
    ) {
        let router = self.clone();
        spawner.spawn(async move {
            loop {
                match event_loop.poll().await {
                    Ok(Event::Incoming(Packet::Publish(publish))) => {
                        router.dispatch(&publish.topic, &publish.payload, &targets).await;
                    }
                    Ok(Event::Incoming(Packet::ConnAck(_))) => {
                        router.events.emit_control(ControlEvent::Connected);
                    }
                    Ok(_) => {}
                    Err(err) => {
                        router
                            .events
                            .emit_control(ControlEvent::Disconnected { reason: err.to_string() });
                        tokio::time::sleep(Duration::from_millis(500)).await;
                    }
                }
            }
        });
    }

    async fn dispatch(&self, topic: &str, payload: &[u8], targets: &ControlTargets) {
        let message: ControlMessage = match serde_json::from_slice(payload) {
            Ok(message) => message,
            Err(err) => {
                log::warn!("[ControlRouter] discarding malformed payload on {topic}: {err}");
                self.events
                    .emit_control(ControlEvent::MessageDiscarded { reason: err.to_string() });
                return;
            }
        };

        let action = match &message {
            ControlMessage::StartStream => "start_stream",
            ControlMessage::StopStream => "stop_stream",
            ControlMessage::SetChime { .. } => "set_chime",
        };

        match message {
            ControlMessage::StartStream => {
                let spawner = crate::runtime::TokioSpawner::current();
                if targets.capture.state() == crate::capture::EngineState::Idle {
                    if let Err(err) = targets.capture.start(&spawner).await {
                        log::warn!("[ControlRouter] start_stream capture start failed: {err}");
                    }
                }
                targets.streamer.set_enabled(true, &spawner).await;
            }
            ControlMessage::StopStream => {
                // Capture keeps running; only the streamer's enable flag
                // flips, pushing streaming to the background (§4.9).
                targets
                    .streamer
                    .set_enabled(false, &crate::runtime::TokioSpawner::current())
                    .await;
            }
            ControlMessage::SetChime { chime_index } => {
                if let Err(err) = targets.settings.set(chime_index).await {
                    log::warn!("[ControlRouter] set_chime({chime_index}) rejected: {err}");
                    self.events
                        .emit_control(ControlEvent::MessageDiscarded { reason: err.to_string() });
                    return;
                }
            }
        }

        log::info!("[ControlRouter] dispatched {action} from {topic}");
        self.events
            .emit_control(ControlEvent::MessageDispatched { action: action.to_string() });
    }

    /// Publishes a heartbeat at QoS 1 (§4.9 "Publishes").
    pub async fn publish_heartbeat(&self, payload: &HeartbeatPayload) -> DoorbellResult<()> {
        let body = serde_json::to_vec(payload)
            .map_err(|err| DoorbellError::Internal(format!("heartbeat encode failed: {err}")))?;
        self.client
            .publish(heartbeat_topic(&self.identity.device_id), QoS::AtLeastOnce, false, body)
            .await
            .map_err(|err| DoorbellError::Internal(format!("heartbeat publish failed: {err}")))
    }

    /// Publishes a bell-press notification at QoS 1.
    pub async fn publish_bell_event(&self, payload: &BellEventPayload) -> DoorbellResult<()> {
        let body = serde_json::to_vec(payload)
            .map_err(|err| DoorbellError::Internal(format!("bell event encode failed: {err}")))?;
        self.client
            .publish(bell_event_topic(&self.identity.device_id), QoS::AtLeastOnce, false, body)
            .await
            .map_err(|err| DoorbellError::Internal(format!("bell event publish failed: {err}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topic_templates_substitute_device_id() {
        assert_eq!(
            stream_control_topic("abc123"),
            "doorbell/stream_control/abc123"
        );
        assert_eq!(settings_topic("abc123"), "doorbell/settings/abc123");
        assert_eq!(heartbeat_topic("abc123"), "doorbell/heartbeat/abc123");
        assert_eq!(bell_event_topic("abc123"), "doorbell/bell_event/abc123");
    }

    #[test]
    fn compile_time_default_identity_is_stable() {
        let identity = DeviceIdentity::compile_time_default();
        assert_eq!(identity.device_id, "unprovisioned-doorbell");
        assert_eq!(identity.device_key_hex.len(), 64);
    }
}
