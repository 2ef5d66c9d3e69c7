//! Firmware configuration.
//!
//! Supports loading from YAML files with environment variable overrides,
//! the same two-layer scheme as the original server binary's config.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

/// Firmware configuration loaded from YAML with environment overrides.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct FirmwareConfig {
    /// Root directory storage is mounted under; `video/` and `audio/`
    /// subdirectories are created beneath it.
    /// Override: `DOORBELL_STORAGE_ROOT`
    pub storage_root: PathBuf,

    /// Number of hours a recorded segment is kept before the retention
    /// reaper deletes it.
    /// Override: `DOORBELL_RETENTION_HOURS`
    pub retention_hours: u64,

    /// Seconds between heartbeat publishes.
    /// Override: `DOORBELL_HEARTBEAT_INTERVAL_SECS`
    pub heartbeat_interval_secs: u64,

    /// Seconds per recorded MP4 segment before rotation.
    /// Override: `DOORBELL_SLICE_DURATION_SECS`
    pub slice_duration_secs: u64,

    /// Number of selectable `bell_<n>.aac` chime files.
    pub chime_count: u32,

    /// WebSocket endpoint the live streamer connects outbound to.
    /// Override: `DOORBELL_STREAM_ENDPOINT_URL`
    pub stream_endpoint_url: String,

    /// MQTT broker host.
    /// Override: `DOORBELL_MQTT_HOST`
    pub mqtt_broker_host: String,

    /// MQTT broker port.
    /// Override: `DOORBELL_MQTT_PORT`
    pub mqtt_broker_port: u16,

    /// MQTT client id; defaults to the device id once provisioned.
    pub mqtt_client_id: String,

    /// MQTT username, paired with `mqtt_password` (§4.9 "Security").
    /// Override: `DOORBELL_MQTT_USERNAME`
    pub mqtt_username: Option<String>,

    /// MQTT password.
    /// Override: `DOORBELL_MQTT_PASSWORD`
    pub mqtt_password: Option<String>,

    /// Deadline for NTP synchronization at boot, in seconds.
    pub ntp_deadline_secs: u64,

    /// Poll interval while waiting for BLE provisioning to complete, in
    /// milliseconds.
    pub provisioning_poll_interval_millis: u64,

    /// Delay before the simulated BLE collaborator completes pairing, in
    /// seconds. Only meaningful for the simulated backend.
    pub simulated_provisioning_delay_secs: u64,

    /// Whether the audio source's Automatic Level Control stage runs.
    pub alc_enabled: bool,

    /// Static per-channel gain applied by ALC, in decibels.
    /// Override: `DOORBELL_ALC_GAIN_DB`
    pub alc_gain_db: f32,
}

impl Default for FirmwareConfig {
    fn default() -> Self {
        Self {
            storage_root: PathBuf::from("./doorbell-storage"),
            retention_hours: 72,
            heartbeat_interval_secs: 60,
            slice_duration_secs: 300,
            chime_count: 4,
            stream_endpoint_url: "ws://127.0.0.1:9443/live".to_string(),
            mqtt_broker_host: "127.0.0.1".to_string(),
            mqtt_broker_port: 1883,
            mqtt_client_id: "doorbell-sim".to_string(),
            mqtt_username: None,
            mqtt_password: None,
            ntp_deadline_secs: 30,
            provisioning_poll_interval_millis: 500,
            simulated_provisioning_delay_secs: 5,
            alc_enabled: true,
            alc_gain_db: 0.0,
        }
    }
}

impl FirmwareConfig {
    /// Loads configuration from a YAML file, then applies environment
    /// overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = if let Some(path) = path {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            serde_yaml::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?
        } else {
            Self::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("DOORBELL_STORAGE_ROOT") {
            self.storage_root = PathBuf::from(val);
        }
        if let Ok(val) = std::env::var("DOORBELL_RETENTION_HOURS") {
            if let Ok(hours) = val.parse() {
                self.retention_hours = hours;
            }
        }
        if let Ok(val) = std::env::var("DOORBELL_HEARTBEAT_INTERVAL_SECS") {
            if let Ok(secs) = val.parse() {
                self.heartbeat_interval_secs = secs;
            }
        }
        if let Ok(val) = std::env::var("DOORBELL_SLICE_DURATION_SECS") {
            if let Ok(secs) = val.parse() {
                self.slice_duration_secs = secs;
            }
        }
        if let Ok(val) = std::env::var("DOORBELL_STREAM_ENDPOINT_URL") {
            self.stream_endpoint_url = val;
        }
        if let Ok(val) = std::env::var("DOORBELL_MQTT_HOST") {
            self.mqtt_broker_host = val;
        }
        if let Ok(val) = std::env::var("DOORBELL_MQTT_PORT") {
            if let Ok(port) = val.parse() {
                self.mqtt_broker_port = port;
            }
        }
        if let Ok(val) = std::env::var("DOORBELL_MQTT_USERNAME") {
            self.mqtt_username = Some(val);
        }
        if let Ok(val) = std::env::var("DOORBELL_MQTT_PASSWORD") {
            self.mqtt_password = Some(val);
        }
        if let Ok(val) = std::env::var("DOORBELL_ALC_GAIN_DB") {
            if let Ok(gain) = val.parse() {
                self.alc_gain_db = gain;
            }
        }
    }
}
