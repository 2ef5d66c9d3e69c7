//! Doorbell Firmware - standalone headless binary running the doorbell
//! pipeline against simulated hardware backends.
//!
//! Mirrors the original server binary's composition: parse args, load
//! config, build the collaborators, hand everything to the core crate's
//! lifecycle entry point, then wait for a shutdown signal.

mod config;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use doorbell_core::alc::{AlcAudioSource, AlcConfig};
use doorbell_core::control::Credentials;
use doorbell_core::context::LifecycleInputs;
use doorbell_core::events::LoggingEventEmitter;
use doorbell_core::Lifecycle;
use doorbell_hal::ble::{SimBleProvisioner, SimulatedIdentity};
use doorbell_hal::{
    FilesystemStorage, JsonFileKvStore, SimAudioSink, SimAudioSource, SimButton, SimRssiSource,
    SimVideoSource, SntpTimeSync,
};
use tokio::signal;

use crate::config::FirmwareConfig;

/// Doorbell Firmware - headless smart doorbell pipeline on simulated hardware.
#[derive(Parser, Debug)]
#[command(name = "doorbell-firmware")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file (YAML).
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(short, long, default_value = "info", env = "DOORBELL_LOG_LEVEL")]
    log_level: log::LevelFilter,

    /// Storage mount root (overrides config file).
    #[arg(short = 'd', long, env = "DOORBELL_STORAGE_ROOT")]
    storage_root: Option<PathBuf>,

    /// MQTT broker host (overrides config file).
    #[arg(short = 'm', long, env = "DOORBELL_MQTT_HOST")]
    mqtt_host: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    env_logger::Builder::new()
        .filter_level(args.log_level)
        .format_timestamp_millis()
        .init();

    log::info!("Doorbell Firmware v{}", env!("CARGO_PKG_VERSION"));

    let mut config =
        FirmwareConfig::load(args.config.as_deref()).context("Failed to load configuration")?;

    if let Some(storage_root) = args.storage_root {
        config.storage_root = storage_root;
    }
    if let Some(mqtt_host) = args.mqtt_host {
        config.mqtt_broker_host = mqtt_host;
    }

    log::info!(
        "Configuration: storage_root={}, mqtt_broker={}:{}, stream_endpoint={}",
        config.storage_root.display(),
        config.mqtt_broker_host,
        config.mqtt_broker_port,
        config.stream_endpoint_url,
    );

    let storage = Arc::new(FilesystemStorage::new(config.storage_root.clone()));
    let kv = Arc::new(
        JsonFileKvStore::open(config.storage_root.join("kv.json"))
            .await
            .context("Failed to open kv store")?,
    );

    let credentials = match (&config.mqtt_username, &config.mqtt_password) {
        (Some(username), Some(password)) => Credentials::UsernamePassword {
            username: username.clone(),
            password: password.clone(),
        },
        _ => Credentials::AccessToken {
            token: String::new(),
        },
    };

    let ble_identity = SimulatedIdentity {
        ssid: "doorbell-sim-network".to_string(),
        password: "doorbell-sim-password".to_string(),
        device_id: config.mqtt_client_id.clone(),
        device_key_hex: "ab".repeat(32),
    };

    let inputs = LifecycleInputs {
        storage: storage.clone(),
        kv: kv.clone(),
        audio_source: Arc::new(AlcAudioSource::new(
            Arc::new(SimAudioSource::new()),
            AlcConfig {
                enabled: config.alc_enabled,
                gain_db: config.alc_gain_db,
            },
        )),
        video_source: Arc::new(SimVideoSource::default()),
        audio_sink: Arc::new(SimAudioSink::new()),
        button: Arc::new(SimButton::new()),
        ble: Arc::new(SimBleProvisioner::new(
            kv.clone(),
            ble_identity,
            Duration::from_secs(config.simulated_provisioning_delay_secs),
        )),
        rssi: Arc::new(SimRssiSource::default()),
        time_sync: Arc::new(SntpTimeSync::with_default_servers()),
        events: Arc::new(LoggingEventEmitter),

        mqtt_broker_host: config.mqtt_broker_host.clone(),
        mqtt_broker_port: config.mqtt_broker_port,
        mqtt_client_id: config.mqtt_client_id.clone(),
        mqtt_credentials: credentials,
        compile_time_device_id: None,

        retention_hours: config.retention_hours,
        heartbeat_interval: Duration::from_secs(config.heartbeat_interval_secs),
        stream_endpoint_url: config.stream_endpoint_url.clone(),
        recording_dir: config.storage_root.join("video"),
        audio_dir: config.storage_root.join("audio"),
        chime_count: config.chime_count,
        slice_duration: Duration::from_secs(config.slice_duration_secs),
        ntp_deadline: Duration::from_secs(config.ntp_deadline_secs),
        provisioning_poll_interval: Duration::from_millis(config.provisioning_poll_interval_millis),
    };

    let _system = Lifecycle::run(inputs)
        .await
        .context("Failed to bring up the doorbell pipeline")?;

    log::info!("Doorbell pipeline running");

    shutdown_signal().await;
    log::info!("Shutdown signal received, exiting");

    Ok(())
}

/// Waits for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
