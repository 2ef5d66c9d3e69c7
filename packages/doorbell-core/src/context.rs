//! Composition root types: the raw collaborators Lifecycle wires together,
//! and the resulting handle bundle the rest of the running firmware reads
//! from (§4.13, §9 "Design Notes").

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::audio::AudioSink;
use crate::audio::AudioSource;
use crate::button::ButtonInput;
use crate::capture::CaptureEngine;
use crate::control::{Credentials, DeviceIdentity};
use crate::events::EventEmitter;
use crate::heartbeat::{HeartbeatScheduler, RssiSource};
use crate::kv::KvStore;
use crate::player::AudioPlayer;
use crate::provisioning::BleProvisioner;
use crate::recorder::{Reaper, Recorder};
use crate::runtime::TaskSpawner;
use crate::settings::SettingsStore;
use crate::storage::StorageBackend;
use crate::stream::LiveStreamer;
use crate::video::VideoSource;

/// Every externally-supplied collaborator and configuration knob Lifecycle
/// needs to bring the system up (§6 "Configuration knobs"). `apps/firmware`
/// constructs the `doorbell-hal` implementations and config, then hands
/// them to [`crate::lifecycle::Lifecycle::run`] as this bundle.
pub struct LifecycleInputs {
    pub storage: Arc<dyn StorageBackend>,
    pub kv: Arc<dyn KvStore>,
    pub audio_source: Arc<dyn AudioSource>,
    pub video_source: Arc<dyn VideoSource>,
    pub audio_sink: Arc<dyn AudioSink>,
    pub button: Arc<dyn ButtonInput>,
    pub ble: Arc<dyn BleProvisioner>,
    pub rssi: Arc<dyn RssiSource>,
    pub time_sync: Arc<dyn crate::lifecycle::TimeSync>,
    pub events: Arc<dyn EventEmitter>,

    pub mqtt_broker_host: String,
    pub mqtt_broker_port: u16,
    pub mqtt_client_id: String,
    pub mqtt_credentials: Credentials,
    pub compile_time_device_id: Option<String>,

    pub retention_hours: u64,
    pub heartbeat_interval: Duration,
    pub stream_endpoint_url: String,
    pub recording_dir: PathBuf,
    pub audio_dir: PathBuf,
    pub chime_count: u32,
    pub slice_duration: Duration,
    pub ntp_deadline: Duration,
    pub provisioning_poll_interval: Duration,
}

/// The fully wired, running system. Every background task has already
/// been spawned by the time [`crate::lifecycle::Lifecycle::run`] returns
/// this; callers (the bell-press callback, a future diagnostics surface)
/// read handles off it rather than reaching back into Lifecycle.
pub struct SystemContext {
    pub capture: Arc<CaptureEngine>,
    pub recorder: Arc<Recorder>,
    pub reaper: Arc<Reaper>,
    pub streamer: Arc<LiveStreamer>,
    pub player: Arc<AudioPlayer>,
    pub settings: Arc<SettingsStore>,
    pub control: Arc<crate::control::ControlRouter>,
    pub heartbeat: Arc<HeartbeatScheduler>,
    pub identity: DeviceIdentity,
    pub events: Arc<dyn EventEmitter>,
    pub spawner: crate::runtime::TokioSpawner,
}

impl SystemContext {
    /// Emits the bell-press side effects Lifecycle step 10 wires up as the
    /// button callback: publish bell event, ensure capture is running,
    /// play the selected chime (§4.13 "bell callback").
    pub async fn handle_bell_press(&self) {
        let timestamp = chrono::Utc::now().timestamp_millis();
        let payload = crate::model::BellEventPayload::new(
            self.identity.device_id.clone(),
            self.identity.device_key_hex.clone(),
            timestamp,
        );
        if let Err(err) = self.control.publish_bell_event(&payload).await {
            log::warn!("[Lifecycle] bell event publish failed: {err}");
        }

        if self.capture.state() == crate::capture::EngineState::Idle {
            if let Err(err) = self.capture.start(&self.spawner).await {
                log::warn!("[Lifecycle] bell-triggered capture start failed: {err}");
            }
        }

        let selected_index = (self.settings.get() - 1).max(0) as u32;
        if let Err(err) = self.player.play_index(selected_index).await {
            log::warn!("[Lifecycle] bell chime playback failed: {err}");
        }
    }
}
