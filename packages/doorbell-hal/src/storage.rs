//! Filesystem-backed storage mount (generalizes the original firmware's
//! SD card self-test into a plain directory on the host filesystem).

use std::path::PathBuf;

use async_trait::async_trait;

use doorbell_core::error::{DoorbellError, DoorbellResult};
use doorbell_core::storage::StorageBackend;

/// Mounts `root` (creating it and its `video`/`audio` subdirectories if
/// absent) and self-checks it with a throwaway read/write round trip.
pub struct FilesystemStorage {
    root: PathBuf,
}

impl FilesystemStorage {
    #[must_use]
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }
}

#[async_trait]
impl StorageBackend for FilesystemStorage {
    async fn mount(&self) -> DoorbellResult<()> {
        for dir in [self.root.clone(), self.root.join("video"), self.root.join("audio")] {
            tokio::fs::create_dir_all(&dir)
                .await
                .map_err(|err| DoorbellError::NoResources(format!("mount {}: {err}", dir.display())))?;
        }
        Ok(())
    }

    async fn self_check(&self) -> DoorbellResult<()> {
        let probe_path = self.root.join(format!(".mount_check_{}", probe_id()));
        tokio::fs::write(&probe_path, b"doorbell-mount-check")
            .await
            .map_err(|err| DoorbellError::NoResources(format!("self_check write: {err}")))?;
        let read_back = tokio::fs::read(&probe_path)
            .await
            .map_err(|err| DoorbellError::NoResources(format!("self_check read: {err}")))?;
        let _ = tokio::fs::remove_file(&probe_path).await;

        if read_back != b"doorbell-mount-check" {
            return Err(DoorbellError::NoResources(
                "self_check read back mismatched content".into(),
            ));
        }
        Ok(())
    }

    fn root(&self) -> PathBuf {
        self.root.clone()
    }
}

/// A probe filename unique enough that concurrent `self_check` calls
/// against the same root never collide.
fn probe_id() -> String {
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::time::{SystemTime, UNIX_EPOCH};

    static COUNTER: AtomicU64 = AtomicU64::new(0);

    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    let count = COUNTER.fetch_add(1, Ordering::SeqCst);
    format!("{nanos:x}-{count:x}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mount_creates_video_and_audio_subdirectories() {
        let tmp = tempfile::tempdir().unwrap();
        let storage = FilesystemStorage::new(tmp.path().to_path_buf());
        storage.mount().await.unwrap();
        assert!(tmp.path().join("video").is_dir());
        assert!(tmp.path().join("audio").is_dir());
    }

    #[tokio::test]
    async fn self_check_round_trips_and_cleans_up() {
        let tmp = tempfile::tempdir().unwrap();
        let storage = FilesystemStorage::new(tmp.path().to_path_buf());
        storage.mount().await.unwrap();
        storage.self_check().await.unwrap();

        let mut entries = tokio::fs::read_dir(tmp.path()).await.unwrap();
        let mut leftover_probe_files = 0;
        while let Some(entry) = entries.next_entry().await.unwrap() {
            if entry.file_name().to_string_lossy().starts_with(".mount_check_") {
                leftover_probe_files += 1;
            }
        }
        assert_eq!(leftover_probe_files, 0);
    }
}
