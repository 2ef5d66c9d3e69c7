//! Simulated BLE GATT provisioning collaborator (C12 counterpart): after
//! a configurable handoff delay, writes a canned Wi-Fi/device identity
//! into the `wifi_creds` KV namespace, standing in for a phone completing
//! the pairing flow over Bluetooth.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use doorbell_core::error::DoorbellResult;
use doorbell_core::kv::{KvStore, NAMESPACE_WIFI_CREDS};
use doorbell_core::provisioning::{BleProvisioner, ProvisioningStatus};

/// The identity a simulated phone hands off once it "pairs".
#[derive(Debug, Clone)]
pub struct SimulatedIdentity {
    pub ssid: String,
    pub password: String,
    pub device_id: String,
    pub device_key_hex: String,
}

pub struct SimBleProvisioner {
    kv: Arc<dyn KvStore>,
    identity: SimulatedIdentity,
    handoff_delay: Duration,
    status: Mutex<ProvisioningStatus>,
    advertising: AtomicBool,
}

impl SimBleProvisioner {
    #[must_use]
    pub fn new(kv: Arc<dyn KvStore>, identity: SimulatedIdentity, handoff_delay: Duration) -> Self {
        Self {
            kv,
            identity,
            handoff_delay,
            status: Mutex::new(ProvisioningStatus::Idle),
            advertising: AtomicBool::new(false),
        }
    }

    #[must_use]
    pub fn status(&self) -> ProvisioningStatus {
        *self.status.lock()
    }
}

#[async_trait]
impl BleProvisioner for SimBleProvisioner {
    async fn start(&self) -> DoorbellResult<()> {
        self.advertising.store(true, Ordering::SeqCst);

        let kv = self.kv.clone();
        let identity = self.identity.clone();
        let delay = self.handoff_delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Err(err) = write_identity(&*kv, &identity).await {
                log::warn!("[SimBleProvisioner] simulated handoff write failed: {err}");
            }
        });
        Ok(())
    }

    async fn stop(&self) -> DoorbellResult<()> {
        self.advertising.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn set_status(&self, status: ProvisioningStatus) -> DoorbellResult<()> {
        *self.status.lock() = status;
        log::info!("[SimBleProvisioner] status -> {status:?}");
        Ok(())
    }
}

async fn write_identity(kv: &dyn KvStore, identity: &SimulatedIdentity) -> DoorbellResult<()> {
    kv.set_str(NAMESPACE_WIFI_CREDS, "ssid", &identity.ssid).await?;
    kv.set_str(NAMESPACE_WIFI_CREDS, "password", &identity.password).await?;
    kv.set_str(NAMESPACE_WIFI_CREDS, "device_id", &identity.device_id).await?;
    kv.set_str(NAMESPACE_WIFI_CREDS, "device_key", &identity.device_key_hex).await?;
    kv.set_str(NAMESPACE_WIFI_CREDS, "provisioned", "1").await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::JsonFileKvStore;

    fn identity() -> SimulatedIdentity {
        SimulatedIdentity {
            ssid: "home-network".to_string(),
            password: "hunter2".to_string(),
            device_id: "doorbell-sim-1".to_string(),
            device_key_hex: "ab".repeat(32),
        }
    }

    #[tokio::test]
    async fn start_writes_provisioning_flag_after_the_handoff_delay() {
        let tmp = tempfile::tempdir().unwrap();
        let kv: Arc<dyn KvStore> = Arc::new(JsonFileKvStore::open(tmp.path().join("kv.json")).await.unwrap());
        let ble = SimBleProvisioner::new(kv.clone(), identity(), Duration::from_millis(10));
        ble.start().await.unwrap();

        assert_eq!(kv.get_str(NAMESPACE_WIFI_CREDS, "provisioned").await.unwrap(), None);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(
            kv.get_str(NAMESPACE_WIFI_CREDS, "provisioned").await.unwrap(),
            Some("1".to_string())
        );
    }

    #[tokio::test]
    async fn set_status_is_observable_via_status_accessor() {
        let tmp = tempfile::tempdir().unwrap();
        let kv: Arc<dyn KvStore> = Arc::new(JsonFileKvStore::open(tmp.path().join("kv.json")).await.unwrap());
        let ble = SimBleProvisioner::new(kv, identity(), Duration::from_secs(3600));
        ble.set_status(ProvisioningStatus::Connecting).await.unwrap();
        assert_eq!(ble.status(), ProvisioningStatus::Connecting);
    }
}
