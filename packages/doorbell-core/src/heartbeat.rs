//! Heartbeat Scheduler (C11): periodic timer that builds and publishes the
//! device's status payload (§4.11, §6).

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::control::{ControlRouter, DeviceIdentity};
use crate::events::{EventEmitter, HeartbeatEvent};
use crate::model::HeartbeatPayload;
use crate::runtime::TaskSpawner;

/// Default tick interval, matching the ESP timer default in
/// `original_source/main/timer/heartbeat.c`.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(60);

const FIRMWARE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Narrow collaborator exposing the network link's signal strength; the
/// heartbeat payload's `signal_strength` needs a source the same way the
/// battery gauge does (§0 "Wi-Fi RSSI accessor"). Implemented by
/// `doorbell-hal`'s network backend.
pub trait RssiSource: Send + Sync {
    fn rssi_dbm(&self) -> i16;
}

/// `// stub: no real battery sensor on sim hardware` — simulates a slow
/// discharge from 100 with an occasional reset, carried over in spirit
/// from the original's own documented TODO (§4.11, §0).
pub struct SimulatedBattery {
    level: AtomicI64,
    ticks: AtomicU64,
}

impl Default for SimulatedBattery {
    fn default() -> Self {
        Self {
            level: AtomicI64::new(100),
            ticks: AtomicU64::new(0),
        }
    }
}

impl SimulatedBattery {
    /// Advances the simulated drift by one tick and returns the new
    /// percentage. Resets to 100 every 500 ticks, mimicking a recharge.
    pub fn tick(&self) -> u8 {
        let ticks = self.ticks.fetch_add(1, Ordering::SeqCst) + 1;
        if ticks % 500 == 0 {
            self.level.store(100, Ordering::SeqCst);
            return 100;
        }
        let level = self
            .level
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |v| Some((v - 1).max(1)))
            .unwrap_or(1);
        (level - 1).max(1) as u8
    }
}

#[derive(Clone)]
pub struct HeartbeatConfig {
    pub interval: Duration,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_INTERVAL,
        }
    }
}

/// Builds heartbeat payloads from its collaborators and publishes them
/// through the control router on a fixed interval. Does no JSON work in
/// an interrupt context since Tokio has none; the interval fires on a
/// plain task (§4.11 "does no JSON work in interrupt context").
pub struct HeartbeatScheduler {
    config: HeartbeatConfig,
    identity: DeviceIdentity,
    router: Arc<ControlRouter>,
    battery: SimulatedBattery,
    rssi: Arc<dyn RssiSource>,
    started_at: Instant,
    events: Arc<dyn EventEmitter>,
}

impl HeartbeatScheduler {
    #[must_use]
    pub fn new(
        config: HeartbeatConfig,
        identity: DeviceIdentity,
        router: Arc<ControlRouter>,
        rssi: Arc<dyn RssiSource>,
        events: Arc<dyn EventEmitter>,
    ) -> Arc<Self> {
        Arc::new(Self {
            config,
            identity,
            router,
            battery: SimulatedBattery::default(),
            rssi,
            started_at: Instant::now(),
            events,
        })
    }

    /// Spawns the interval-driven publish loop via `spawner`.
    pub fn start(self: &Arc<Self>, spawner: &dyn TaskSpawner) {
        let scheduler = self.clone();
        spawner.spawn(async move {
            let mut interval = tokio::time::interval(scheduler.config.interval);
            loop {
                interval.tick().await;
                scheduler.tick_once().await;
            }
        });
    }

    async fn tick_once(&self) {
        let battery_level = self.battery.tick();
        let signal_strength = self.rssi.rssi_dbm();
        let payload = HeartbeatPayload {
            device_id: self.identity.device_id.clone(),
            device_key: self.identity.device_key_hex.clone(),
            timestamp: chrono::Utc::now().timestamp_millis(),
            battery_level,
            signal_strength,
            uptime: self.started_at.elapsed().as_secs(),
            fw_ver: FIRMWARE_VERSION.to_string(),
            is_active: true,
        };

        match self.router.publish_heartbeat(&payload).await {
            Ok(()) => {
                log::info!("[Heartbeat] published battery={battery_level}% rssi={signal_strength}dBm");
                self.events.emit_heartbeat(HeartbeatEvent::Published {
                    battery_pct: battery_level,
                    rssi_dbm: signal_strength,
                });
            }
            Err(err) => log::warn!("[Heartbeat] publish failed: {err}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simulated_battery_drifts_downward_and_resets() {
        let battery = SimulatedBattery::default();
        let mut last = 100u8;
        for _ in 0..499 {
            let level = battery.tick();
            assert!(level <= last);
            last = level;
        }
        assert_eq!(battery.tick(), 100);
    }
}
