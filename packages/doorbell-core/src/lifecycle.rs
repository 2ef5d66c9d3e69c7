//! Lifecycle (C13): startup ordering, provisioning fallback, and the
//! composition root that wires every other component into a running
//! [`SystemContext`] (§4.13).
//!
//! Mirrors the teacher's `bootstrap_services` — a single function that
//! instantiates every service in dependency order and hands back one
//! struct the rest of the binary reads from — generalized from a flat
//! function into an explicit 12-step sequence because, unlike the
//! teacher's Sonos services, these steps have real gating dependencies
//! (no control-plane session before the clock is synchronized, no
//! heartbeat before there's an identity to publish under).

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::audio::AudioSource;
use crate::capture::{CaptureEngine, EngineConfig, SinkConfig, SinkMode};
use crate::context::{LifecycleInputs, SystemContext};
use crate::control::{ControlRouter, ControlRouterConfig, ControlTargets, DeviceIdentity};
use crate::error::{DoorbellError, DoorbellResult};
use crate::events::{EventEmitter, ProvisioningEvent};
use crate::heartbeat::{HeartbeatConfig, HeartbeatScheduler};
use crate::player::{AudioPlayer, PlayerConfig};
use crate::provisioning::{ProvisioningHandoff, StoredIdentity};
use crate::recorder::{Reaper, ReaperConfig, Recorder, RecorderConfig};
use crate::runtime::{TaskSpawner, TokioSpawner};
use crate::settings::SettingsStore;
use crate::stream::{LiveStreamer, StreamerConfig};
use crate::video::VideoSource;

/// Narrow collaborator that synchronizes the device's wall clock against
/// stratum-1 NTP peers (§4.13 step 6: "two stratum-1 NTP peers with a 30s
/// deadline"). Out of scope per §1 ("Network link bring-up … SNTP"); only
/// the contract Lifecycle drives is specified here, implemented by
/// `doorbell-hal`.
#[async_trait]
pub trait TimeSync: Send + Sync {
    /// Synchronizes the wall clock, failing `Timeout` if `deadline`
    /// elapses before any peer responds.
    async fn sync(&self, deadline: Duration) -> DoorbellResult<()>;
}

/// Startup order and supervision for the whole firmware (§4.13).
pub struct Lifecycle;

impl Lifecycle {
    /// Runs the 12-step startup sequence and returns the fully wired,
    /// running [`SystemContext`]. Each step gates the next; a failure
    /// before step 7 aborts startup entirely, matching "failures at step
    /// 6 are fatal for the normal path" — everything through NTP sync is
    /// a precondition for a coherent control-plane session.
    pub async fn run(inputs: LifecycleInputs) -> DoorbellResult<Arc<SystemContext>> {
        let spawner = TokioSpawner::current();

        // Step 1: mount storage.
        inputs.storage.mount().await?;
        inputs.storage.self_check().await?;
        log::info!("[Lifecycle] storage mounted at {}", inputs.storage.root().display());

        // Step 2: KV is already initialized by the caller (handles are
        // opened per-transaction, §5 "Shared resources" — there is no
        // long-lived handle to construct here).

        // Step 3: load settings.
        let settings = Arc::new(SettingsStore::new(inputs.kv.clone()));
        settings.load().await?;
        log::info!("[Lifecycle] settings loaded, chime_index={}", settings.get());

        // Step 4: network + event dispatch. The event bridge is supplied
        // by the caller; nothing else to initialize until credentials
        // exist (step 5) and the clock is sane (step 6).

        // Step 5: connect with stored credentials, or provision.
        let provisioning = ProvisioningHandoff::new(inputs.kv.clone(), inputs.events.clone());
        let identity = Self::resolve_identity(&provisioning, &inputs).await?;
        log::info!("[Lifecycle] identity resolved: device_id={}", identity.device_id);

        // Step 6: synchronize wall clock; fatal on failure.
        inputs.time_sync.sync(inputs.ntp_deadline).await.map_err(|err| {
            log::error!("[Lifecycle] NTP sync failed, aborting startup: {err}");
            err
        })?;
        log::info!("[Lifecycle] wall clock synchronized");

        let device_identity = DeviceIdentity {
            device_id: identity.device_id.clone(),
            device_key_hex: identity.device_key_hex.clone(),
        };

        // Capture engine and its sinks are constructed now (but not
        // opened/started) so the control router can hold references to
        // them; they are opened and started at steps 11-12.
        let capture = Arc::new(CaptureEngine::new(
            inputs.audio_source.clone(),
            inputs.video_source.clone(),
            EngineConfig::default(),
            inputs.events.clone(),
        ));
        let streamer = LiveStreamer::new(
            StreamerConfig::new(inputs.stream_endpoint_url.clone()),
            inputs.events.clone(),
        );

        // Step 7: initialize control router.
        let router_config = ControlRouterConfig::new(
            inputs.mqtt_broker_host.clone(),
            inputs.mqtt_broker_port,
            inputs.mqtt_client_id.clone(),
            inputs.mqtt_credentials.clone(),
        );
        let (control, event_loop) =
            ControlRouter::connect(router_config, device_identity.clone(), inputs.events.clone())
                .await?;
        control.start(
            event_loop,
            ControlTargets {
                capture: capture.clone(),
                streamer: streamer.clone(),
                settings: settings.clone(),
            },
            &spawner,
        );
        log::info!("[Lifecycle] control router connected");

        // Step 8: start heartbeat.
        let heartbeat = HeartbeatScheduler::new(
            HeartbeatConfig {
                interval: inputs.heartbeat_interval,
            },
            device_identity.clone(),
            control.clone(),
            inputs.rssi.clone(),
            inputs.events.clone(),
        );
        heartbeat.start(&spawner);
        log::info!("[Lifecycle] heartbeat scheduler started");

        // Step 9: initialize audio I/O common layer, audio player.
        let player = AudioPlayer::new(
            PlayerConfig::new(inputs.audio_dir.clone(), inputs.chime_count),
            inputs.audio_sink.clone(),
            inputs.events.clone(),
            &spawner,
        );
        log::info!("[Lifecycle] audio player ready");

        // Step 10: initialize button, register the bell callback. The
        // callback closure only has the pieces of SystemContext it needs
        // so it never has to wait for SystemContext to fully exist; the
        // real wiring (publish bell event, ensure capture running, play
        // chime) lives on SystemContext::handle_bell_press and is
        // installed once the context is assembled, just below.

        // Step 11: setup capture and live streamer.
        capture.open().await?;
        let recorder = Arc::new(Recorder::new(
            RecorderConfig::new(inputs.recording_dir.clone(), inputs.slice_duration),
            inputs.events.clone(),
        ));
        let recording_sink = capture.sink_setup(SinkConfig::default())?;
        capture.sink_add_muxer(&recording_sink, recorder.clone());
        capture.sink_enable(&recording_sink, SinkMode::Always);

        let streaming_sink = capture.sink_setup(SinkConfig::default())?;
        capture.sink_add_muxer(&streaming_sink, streamer.clone());
        capture.sink_enable(&streaming_sink, SinkMode::Always);
        log::info!("[Lifecycle] capture sinks wired: recorder + streamer");

        // Step 12: start the always-on capture task and the retention
        // reaper.
        capture.start(&spawner).await?;
        let reaper = Arc::new(Reaper::new(
            ReaperConfig::new(inputs.recording_dir.clone(), inputs.retention_hours),
            recorder.clone(),
            inputs.events.clone(),
        ));
        reaper.clone().spawn_periodic(&spawner);
        log::info!("[Lifecycle] capture running, retention reaper scheduled");

        let ctx = Arc::new(SystemContext {
            capture,
            recorder,
            reaper,
            streamer,
            player,
            settings,
            control,
            heartbeat,
            identity: device_identity,
            events: inputs.events.clone(),
            spawner,
        });

        let bell_ctx = ctx.clone();
        inputs
            .button
            .register_callback(Arc::new(move || {
                let ctx = bell_ctx.clone();
                tokio::spawn(async move {
                    ctx.handle_bell_press().await;
                });
            }))
            .await?;
        inputs.button.start().await?;
        log::info!("[Lifecycle] button input armed");

        Ok(ctx)
    }

    /// Step 5: either loads stored credentials (provisioned path) or
    /// runs the BLE handoff loop until they exist (§4.12).
    async fn resolve_identity(
        provisioning: &ProvisioningHandoff,
        inputs: &LifecycleInputs,
    ) -> DoorbellResult<StoredIdentity> {
        if provisioning.is_provisioned().await? {
            return provisioning.load_identity().await;
        }

        provisioning
            .run_until_provisioned(inputs.ble.as_ref(), inputs.provisioning_poll_interval, None)
            .await
    }
}

/// Convenience used by tests and `doorbell-hal`'s simulated sources: a
/// trivial `TimeSync` that always succeeds immediately.
pub struct InstantTimeSync;

#[async_trait]
impl TimeSync for InstantTimeSync {
    async fn sync(&self, _deadline: Duration) -> DoorbellResult<()> {
        Ok(())
    }
}

/// A `TimeSync` that always fails, for exercising Lifecycle's fatal path
/// in tests without a real network.
pub struct FailingTimeSync;

#[async_trait]
impl TimeSync for FailingTimeSync {
    async fn sync(&self, _deadline: Duration) -> DoorbellResult<()> {
        Err(DoorbellError::Timeout("simulated NTP failure".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{AudioFormatKind, AudioSink};
    use crate::button::ButtonInput;
    use crate::events::NoopEventEmitter;
    use crate::kv::test_support::InMemoryKvStore;
    use crate::kv::{NAMESPACE_WIFI_CREDS};
    use crate::model::{AudioFrame, VideoFrame};
    use crate::provisioning::{BleProvisioner, ProvisioningStatus};
    use crate::storage::StorageBackend;
    use async_trait::async_trait;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct NullAudioSource;
    #[async_trait]
    impl AudioSource for NullAudioSource {
        async fn open(&self) -> DoorbellResult<()> {
            Ok(())
        }
        fn get_supported_formats(&self) -> Vec<AudioFormatKind> {
            vec![AudioFormatKind::Pcm]
        }
        async fn negotiate_caps(
            &self,
            _proposed: crate::audio::AudioFormatProposal,
        ) -> DoorbellResult<crate::audio::NegotiatedAudioCaps> {
            Ok(crate::audio::NegotiatedAudioCaps {
                sample_rate_hz: 16_000,
                channels: 1,
                bits_per_sample: 16,
            })
        }
        async fn set_fixed_caps(&self, _caps: crate::audio::NegotiatedAudioCaps) -> DoorbellResult<()> {
            Ok(())
        }
        async fn start(&self) -> DoorbellResult<()> {
            Ok(())
        }
        async fn read_frame(&self, _size: usize) -> DoorbellResult<AudioFrame> {
            tokio::time::sleep(Duration::from_millis(5)).await;
            Err(DoorbellError::Timeout("no data from null source".into()))
        }
        async fn stop(&self) -> DoorbellResult<()> {
            Ok(())
        }
        async fn close(&self) -> DoorbellResult<()> {
            Ok(())
        }
        fn state(&self) -> crate::audio::SourceState {
            crate::audio::SourceState::Started
        }
    }

    struct NullVideoSource;
    #[async_trait]
    impl VideoSource for NullVideoSource {
        async fn open(&self) -> DoorbellResult<()> {
            Ok(())
        }
        async fn start(&self) -> DoorbellResult<()> {
            Ok(())
        }
        async fn read_frame(&self) -> DoorbellResult<VideoFrame> {
            tokio::time::sleep(Duration::from_millis(5)).await;
            Err(DoorbellError::Timeout("no data from null source".into()))
        }
        async fn stop(&self) -> DoorbellResult<()> {
            Ok(())
        }
        async fn close(&self) -> DoorbellResult<()> {
            Ok(())
        }
        fn state(&self) -> crate::audio::SourceState {
            crate::audio::SourceState::Started
        }
        fn params(&self) -> crate::video::VideoParams {
            crate::video::VideoParams {
                width: 640,
                height: 480,
                fps: 10,
            }
        }
    }

    struct NullAudioSink;
    #[async_trait]
    impl AudioSink for NullAudioSink {
        async fn write(&self, _samples: &[u8], _timeout: Duration) -> DoorbellResult<()> {
            Ok(())
        }
    }

    struct NullButton {
        callback: parking_lot::Mutex<Option<crate::button::PressCallback>>,
    }
    impl Default for NullButton {
        fn default() -> Self {
            Self {
                callback: parking_lot::Mutex::new(None),
            }
        }
    }
    #[async_trait]
    impl ButtonInput for NullButton {
        async fn register_callback(&self, callback: crate::button::PressCallback) -> DoorbellResult<()> {
            *self.callback.lock() = Some(callback);
            Ok(())
        }
        async fn start(&self) -> DoorbellResult<()> {
            Ok(())
        }
        async fn stop(&self) -> DoorbellResult<()> {
            Ok(())
        }
    }

    struct AutoProvisionBle {
        kv: Arc<InMemoryKvStore>,
        started: AtomicBool,
    }
    #[async_trait]
    impl BleProvisioner for AutoProvisionBle {
        async fn start(&self) -> DoorbellResult<()> {
            self.started.store(true, Ordering::SeqCst);
            self.kv
                .set_str(NAMESPACE_WIFI_CREDS, "ssid", "test-ssid")
                .await?;
            self.kv
                .set_str(NAMESPACE_WIFI_CREDS, "password", "test-pass")
                .await?;
            self.kv
                .set_str(NAMESPACE_WIFI_CREDS, "device_id", "doorbell-test")
                .await?;
            self.kv
                .set_str(NAMESPACE_WIFI_CREDS, "device_key", "ab".repeat(32).as_str())
                .await?;
            self.kv
                .set_str(NAMESPACE_WIFI_CREDS, "provisioned", "1")
                .await?;
            Ok(())
        }
        async fn stop(&self) -> DoorbellResult<()> {
            Ok(())
        }
        async fn set_status(&self, _status: ProvisioningStatus) -> DoorbellResult<()> {
            Ok(())
        }
    }

    struct TestStorage(PathBuf);
    #[async_trait]
    impl StorageBackend for TestStorage {
        async fn mount(&self) -> DoorbellResult<()> {
            Ok(())
        }
        async fn self_check(&self) -> DoorbellResult<()> {
            Ok(())
        }
        fn root(&self) -> PathBuf {
            self.0.clone()
        }
    }

    struct FixedRssi;
    impl crate::heartbeat::RssiSource for FixedRssi {
        fn rssi_dbm(&self) -> i16 {
            -50
        }
    }

    fn test_inputs(tmp: &std::path::Path, kv: Arc<InMemoryKvStore>) -> LifecycleInputs {
        LifecycleInputs {
            storage: Arc::new(TestStorage(tmp.to_path_buf())),
            kv: kv.clone(),
            audio_source: Arc::new(NullAudioSource),
            video_source: Arc::new(NullVideoSource),
            audio_sink: Arc::new(NullAudioSink),
            button: Arc::new(NullButton::default()),
            ble: Arc::new(AutoProvisionBle {
                kv,
                started: AtomicBool::new(false),
            }),
            rssi: Arc::new(FixedRssi),
            time_sync: Arc::new(InstantTimeSync),
            events: Arc::new(NoopEventEmitter),
            mqtt_broker_host: "127.0.0.1".to_string(),
            mqtt_broker_port: 1, // nothing listens; control router connects lazily
            mqtt_client_id: "test-doorbell".to_string(),
            mqtt_credentials: crate::control::Credentials::UsernamePassword {
                username: "u".to_string(),
                password: "p".to_string(),
            },
            compile_time_device_id: None,
            retention_hours: 24,
            heartbeat_interval: Duration::from_secs(60),
            stream_endpoint_url: "ws://127.0.0.1:1/dev-null".to_string(),
            recording_dir: tmp.join("video"),
            audio_dir: tmp.join("audio"),
            chime_count: 4,
            slice_duration: Duration::from_secs(5),
            ntp_deadline: Duration::from_secs(1),
            provisioning_poll_interval: Duration::from_millis(10),
        }
    }

    #[tokio::test]
    async fn unprovisioned_device_runs_ble_handoff_then_boots() {
        let tmp = tempfile::tempdir().unwrap();
        let kv = Arc::new(InMemoryKvStore::default());
        let inputs = test_inputs(tmp.path(), kv);

        let ctx = Lifecycle::run(inputs).await.unwrap();
        assert_eq!(ctx.identity.device_id, "doorbell-test");
        assert_eq!(
            ctx.capture.state(),
            crate::capture::EngineState::Running
        );
    }

    #[tokio::test]
    async fn already_provisioned_device_skips_ble_handoff() {
        let tmp = tempfile::tempdir().unwrap();
        let kv = Arc::new(InMemoryKvStore::default());
        kv.set_str(NAMESPACE_WIFI_CREDS, "ssid", "home").await.unwrap();
        kv.set_str(NAMESPACE_WIFI_CREDS, "password", "secret").await.unwrap();
        kv.set_str(NAMESPACE_WIFI_CREDS, "device_id", "doorbell-42").await.unwrap();
        kv.set_str(NAMESPACE_WIFI_CREDS, "device_key", "cd".repeat(32).as_str())
            .await
            .unwrap();
        kv.set_str(NAMESPACE_WIFI_CREDS, "provisioned", "1").await.unwrap();

        let inputs = test_inputs(tmp.path(), kv);
        let ctx = Lifecycle::run(inputs).await.unwrap();
        assert_eq!(ctx.identity.device_id, "doorbell-42");
    }

    #[tokio::test]
    async fn fatal_ntp_failure_aborts_startup() {
        let tmp = tempfile::tempdir().unwrap();
        let kv = Arc::new(InMemoryKvStore::default());
        let mut inputs = test_inputs(tmp.path(), kv);
        inputs.time_sync = Arc::new(FailingTimeSync);

        let result = Lifecycle::run(inputs).await;
        assert!(matches!(result, Err(DoorbellError::Timeout(_))));
    }
}
