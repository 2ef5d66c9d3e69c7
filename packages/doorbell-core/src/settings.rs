//! Settings Store (C10): a bounded, validated chime index persisted in the
//! KV store's `chime` namespace (§4.10, §6).

use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;

use crate::error::{DoorbellError, DoorbellResult};
use crate::kv::{KvStore, NAMESPACE_CHIME};

/// Minimum valid chime index (inclusive).
pub const CHIME_MIN: i32 = 1;
/// Maximum valid chime index (inclusive), a.k.a. `MAX` in §4.7.
pub const CHIME_MAX: i32 = 4;
/// Value used when the KV store has never been written.
pub const DEFAULT_CHIME_INDEX: i32 = 1;

const KEY_CHIME_INDEX: &str = "chime_idx";

/// Thread-safe accessor for the chime index. `get()` is a cheap atomic
/// read of the value cached at `load()`; `set()` validates against
/// `[CHIME_MIN, CHIME_MAX]` and only writes through to KV if it passes.
pub struct SettingsStore {
    kv: Arc<dyn KvStore>,
    cached_chime_index: AtomicI32,
}

impl SettingsStore {
    /// Constructs a store with a provisional default; call [`Self::load`]
    /// once at startup before relying on [`Self::get`].
    #[must_use]
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self {
            kv,
            cached_chime_index: AtomicI32::new(DEFAULT_CHIME_INDEX),
        }
    }

    /// Loads the persisted chime index into the cache, falling back to
    /// [`DEFAULT_CHIME_INDEX`] if absent (§3 "Settings store").
    pub async fn load(&self) -> DoorbellResult<()> {
        let value = self
            .kv
            .get_i32(NAMESPACE_CHIME, KEY_CHIME_INDEX)
            .await?
            .filter(|v| (CHIME_MIN..=CHIME_MAX).contains(v))
            .unwrap_or(DEFAULT_CHIME_INDEX);
        self.cached_chime_index.store(value, Ordering::SeqCst);
        Ok(())
    }

    /// Returns the cached value; never touches KV (§4.10).
    #[must_use]
    pub fn get(&self) -> i32 {
        self.cached_chime_index.load(Ordering::SeqCst)
    }

    /// Validates `index` and, if valid, writes it to KV and updates the
    /// cache. Invalid values fail `InvalidArg` and leave state unchanged
    /// (§4.10, §8.9, S6).
    pub async fn set(&self, index: i32) -> DoorbellResult<()> {
        if !(CHIME_MIN..=CHIME_MAX).contains(&index) {
            return Err(DoorbellError::InvalidArg(format!(
                "chime_index {index} out of range [{CHIME_MIN},{CHIME_MAX}]"
            )));
        }
        self.kv
            .set_i32(NAMESPACE_CHIME, KEY_CHIME_INDEX, index)
            .await?;
        self.cached_chime_index.store(index, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::test_support::InMemoryKvStore;

    #[tokio::test]
    async fn load_falls_back_to_default_when_unset() {
        let store = SettingsStore::new(Arc::new(InMemoryKvStore::default()));
        store.load().await.unwrap();
        assert_eq!(store.get(), DEFAULT_CHIME_INDEX);
    }

    #[tokio::test]
    async fn set_rejects_out_of_range_and_leaves_cache_unchanged() {
        let store = SettingsStore::new(Arc::new(InMemoryKvStore::default()));
        store.load().await.unwrap();
        let result = store.set(CHIME_MAX + 3).await;
        assert!(matches!(result, Err(DoorbellError::InvalidArg(_))));
        assert_eq!(store.get(), DEFAULT_CHIME_INDEX);
    }

    #[tokio::test]
    async fn set_persists_and_updates_cache() {
        let kv = Arc::new(InMemoryKvStore::default());
        let store = SettingsStore::new(kv.clone());
        store.load().await.unwrap();
        store.set(3).await.unwrap();
        assert_eq!(store.get(), 3);

        let reloaded = SettingsStore::new(kv);
        reloaded.load().await.unwrap();
        assert_eq!(reloaded.get(), 3);
    }
}
