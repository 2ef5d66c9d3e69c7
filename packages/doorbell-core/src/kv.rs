//! Key-value persistence contract, modeling ESP-IDF's NVS namespaces.
//!
//! Two namespaces are used by this firmware: `wifi_creds` (provisioning
//! identity, written once by the BLE handoff) and `chime` (user-adjustable
//! settings, read at startup and written by the control router). The trait
//! is namespace-scoped the same way NVS handles are, so callers can't
//! accidentally collide keys across concerns.

use async_trait::async_trait;

use crate::error::DoorbellResult;

/// A namespaced key-value store.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Reads a string value, or `None` if the key is unset.
    async fn get_str(&self, namespace: &str, key: &str) -> DoorbellResult<Option<String>>;

    /// Writes a string value.
    async fn set_str(&self, namespace: &str, key: &str, value: &str) -> DoorbellResult<()>;

    /// Reads an integer value, or `None` if the key is unset.
    async fn get_i32(&self, namespace: &str, key: &str) -> DoorbellResult<Option<i32>>;

    /// Writes an integer value.
    async fn set_i32(&self, namespace: &str, key: &str, value: i32) -> DoorbellResult<()>;

    /// Erases a key. No-op if the key was unset.
    async fn erase(&self, namespace: &str, key: &str) -> DoorbellResult<()>;
}

/// The NVS namespace holding provisioning identity written by the BLE
/// handoff (`device_key`, plus the Wi-Fi `ssid`/`psk` pair it hands off).
pub const NAMESPACE_WIFI_CREDS: &str = "wifi_creds";

/// The NVS namespace holding the user-adjustable chime selection
/// (`chime_idx`).
pub const NAMESPACE_CHIME: &str = "chime";

/// An in-memory [`KvStore`] for tests, backed by a `Mutex<HashMap>`.
#[cfg(test)]
pub mod test_support {
    use std::collections::HashMap;

    use async_trait::async_trait;
    use parking_lot::Mutex;

    use super::KvStore;
    use crate::error::DoorbellResult;

    #[derive(Default)]
    pub struct InMemoryKvStore {
        strings: Mutex<HashMap<(String, String), String>>,
        ints: Mutex<HashMap<(String, String), i32>>,
    }

    #[async_trait]
    impl KvStore for InMemoryKvStore {
        async fn get_str(&self, namespace: &str, key: &str) -> DoorbellResult<Option<String>> {
            Ok(self
                .strings
                .lock()
                .get(&(namespace.to_string(), key.to_string()))
                .cloned())
        }

        async fn set_str(&self, namespace: &str, key: &str, value: &str) -> DoorbellResult<()> {
            self.strings
                .lock()
                .insert((namespace.to_string(), key.to_string()), value.to_string());
            Ok(())
        }

        async fn get_i32(&self, namespace: &str, key: &str) -> DoorbellResult<Option<i32>> {
            Ok(self
                .ints
                .lock()
                .get(&(namespace.to_string(), key.to_string()))
                .copied())
        }

        async fn set_i32(&self, namespace: &str, key: &str, value: i32) -> DoorbellResult<()> {
            self.ints
                .lock()
                .insert((namespace.to_string(), key.to_string()), value);
            Ok(())
        }

        async fn erase(&self, namespace: &str, key: &str) -> DoorbellResult<()> {
            let k = (namespace.to_string(), key.to_string());
            self.strings.lock().remove(&k);
            self.ints.lock().remove(&k);
            Ok(())
        }
    }
}
