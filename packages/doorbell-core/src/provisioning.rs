//! Provisioning Handoff (C12): reads stored Wi-Fi/device identity out of
//! the `wifi_creds` KV namespace, and hands control to the BLE
//! collaborator when none exists yet (§4.12, §6).

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{DoorbellError, DoorbellResult};
use crate::events::{EventEmitter, ProvisioningEvent};
use crate::kv::{KvStore, NAMESPACE_WIFI_CREDS};

const KEY_SSID: &str = "ssid";
const KEY_PASSWORD: &str = "password";
const KEY_DEVICE_ID: &str = "device_id";
const KEY_DEVICE_KEY: &str = "device_key";
const KEY_PROVISIONED: &str = "provisioned";

/// Stored credentials and identity read back from `wifi_creds` (§6 "KV
/// namespaces").
#[derive(Debug, Clone)]
pub struct StoredIdentity {
    pub ssid: String,
    pub password: String,
    pub device_id: String,
    pub device_key_hex: String,
}

/// Status reflected back to the phone over the BLE status characteristic
/// (§6 "BLE provisioning").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvisioningStatus {
    Idle,
    Connecting,
    Connected,
    Failed,
    Timeout,
    WrongPassword,
}

/// Narrow contract for the BLE GATT collaborator; its internals (service
/// UUID, characteristic handles, pairing) are out of scope (§1) and owned
/// entirely by `doorbell-hal::ble`.
#[async_trait]
pub trait BleProvisioner: Send + Sync {
    /// Starts advertising and accepting provisioning writes.
    async fn start(&self) -> DoorbellResult<()>;
    /// Stops advertising once Wi-Fi has associated.
    async fn stop(&self) -> DoorbellResult<()>;
    /// Reflects a Wi-Fi association outcome back to the phone via the
    /// status characteristic.
    async fn set_status(&self, status: ProvisioningStatus) -> DoorbellResult<()>;
}

/// Polls the KV store for stored credentials and coordinates the BLE
/// handoff when none exist. Lifecycle drives [`Self::is_provisioned`] /
/// [`Self::load_identity`] directly, then polls during the unprovisioned
/// branch (§4.12).
pub struct ProvisioningHandoff {
    kv: Arc<dyn KvStore>,
    events: Arc<dyn EventEmitter>,
}

impl ProvisioningHandoff {
    #[must_use]
    pub fn new(kv: Arc<dyn KvStore>, events: Arc<dyn EventEmitter>) -> Self {
        Self { kv, events }
    }

    /// True once `wifi_creds/provisioned` has been written by the BLE
    /// collaborator (§4.12 "asks C12 whether the device is provisioned").
    pub async fn is_provisioned(&self) -> DoorbellResult<bool> {
        Ok(self
            .kv
            .get_str(NAMESPACE_WIFI_CREDS, KEY_PROVISIONED)
            .await?
            .map(|v| v == "1")
            .unwrap_or(false))
    }

    /// Returns the stored identity. Fails `InvalidState` if called before
    /// provisioning completed.
    pub async fn load_identity(&self) -> DoorbellResult<StoredIdentity> {
        let ssid = self.require_str(KEY_SSID).await?;
        let password = self.require_str(KEY_PASSWORD).await?;
        let device_id = self.require_str(KEY_DEVICE_ID).await?;
        let device_key_hex = self.require_str(KEY_DEVICE_KEY).await?;
        Ok(StoredIdentity {
            ssid,
            password,
            device_id,
            device_key_hex,
        })
    }

    async fn require_str(&self, key: &str) -> DoorbellResult<String> {
        self.kv
            .get_str(NAMESPACE_WIFI_CREDS, key)
            .await?
            .ok_or_else(|| {
                DoorbellError::InvalidState(format!("wifi_creds/{key} missing while provisioned"))
            })
    }

    /// Starts the BLE collaborator and polls `is_provisioned` until it
    /// becomes true or `deadline` elapses, as Lifecycle step 5 requires.
    /// A `None` deadline polls forever (the normal boot path: there is no
    /// time limit on a human pairing a phone).
    pub async fn run_until_provisioned(
        &self,
        ble: &dyn BleProvisioner,
        poll_interval: Duration,
        deadline: Option<Duration>,
    ) -> DoorbellResult<StoredIdentity> {
        self.events
            .emit_provisioning(ProvisioningEvent::AwaitingProvisioning);
        ble.start().await?;
        ble.set_status(ProvisioningStatus::Idle).await?;

        let start = tokio::time::Instant::now();
        loop {
            if self.is_provisioned().await? {
                break;
            }
            if let Some(deadline) = deadline {
                if start.elapsed() >= deadline {
                    ble.set_status(ProvisioningStatus::Timeout).await?;
                    return Err(DoorbellError::Timeout(
                        "provisioning deadline elapsed".into(),
                    ));
                }
            }
            tokio::time::sleep(poll_interval).await;
        }

        let identity = self.load_identity().await?;
        ble.set_status(ProvisioningStatus::Connected).await?;
        ble.stop().await?;
        self.events
            .emit_provisioning(ProvisioningEvent::Provisioned);
        Ok(identity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::NoopEventEmitter;
    use crate::kv::test_support::InMemoryKvStore;

    #[tokio::test]
    async fn is_provisioned_false_when_flag_unset() {
        let handoff = ProvisioningHandoff::new(
            Arc::new(InMemoryKvStore::default()),
            Arc::new(NoopEventEmitter),
        );
        assert!(!handoff.is_provisioned().await.unwrap());
    }

    #[tokio::test]
    async fn load_identity_fails_invalid_state_when_incomplete() {
        let kv = Arc::new(InMemoryKvStore::default());
        kv.set_str(NAMESPACE_WIFI_CREDS, KEY_SSID, "home-wifi")
            .await
            .unwrap();
        let handoff = ProvisioningHandoff::new(kv, Arc::new(NoopEventEmitter));
        let result = handoff.load_identity().await;
        assert!(matches!(result, Err(DoorbellError::InvalidState(_))));
    }

    #[tokio::test]
    async fn load_identity_succeeds_once_all_keys_present() {
        let kv = Arc::new(InMemoryKvStore::default());
        kv.set_str(NAMESPACE_WIFI_CREDS, KEY_SSID, "home-wifi")
            .await
            .unwrap();
        kv.set_str(NAMESPACE_WIFI_CREDS, KEY_PASSWORD, "hunter2")
            .await
            .unwrap();
        kv.set_str(NAMESPACE_WIFI_CREDS, KEY_DEVICE_ID, "doorbell-42")
            .await
            .unwrap();
        kv.set_str(NAMESPACE_WIFI_CREDS, KEY_DEVICE_KEY, "ab".repeat(32).as_str())
            .await
            .unwrap();
        let handoff = ProvisioningHandoff::new(kv, Arc::new(NoopEventEmitter));
        let identity = handoff.load_identity().await.unwrap();
        assert_eq!(identity.ssid, "home-wifi");
        assert_eq!(identity.device_id, "doorbell-42");
    }
}
