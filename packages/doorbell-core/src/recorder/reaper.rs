//! Retention Reaper (C5): periodically deletes recorded segments older
//! than a configured horizon by parsing filenames.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;

use super::naming::parse_segment_name;
use crate::error::DoorbellResult;
use crate::events::{EventEmitter, RecorderEvent};
use crate::runtime::TaskSpawner;

/// Default sweep interval (§4.5).
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, Clone)]
pub struct ReaperConfig {
    pub recording_dir: PathBuf,
    pub retention: Duration,
    pub sweep_interval: Duration,
}

impl ReaperConfig {
    #[must_use]
    pub fn new(recording_dir: PathBuf, retention_hours: u64) -> Self {
        Self {
            recording_dir,
            retention: Duration::from_secs(retention_hours * 3600),
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
        }
    }
}

/// A callback into the recorder so the reaper never deletes the
/// currently-open segment (§4.5, §8.6), without depending on the
/// recorder's concrete type.
pub trait OpenSegmentOracle: Send + Sync {
    fn current_open_path(&self) -> Option<PathBuf>;
}

/// Walks the recording directory and deletes expired, parseable segment
/// files. A mutex guards the sweep so two concurrent invocations never
/// double-delete (§4.5 "Properties").
pub struct Reaper {
    config: ReaperConfig,
    oracle: Arc<dyn OpenSegmentOracle>,
    sweeping: Mutex<()>,
    events: Arc<dyn EventEmitter>,
}

impl Reaper {
    #[must_use]
    pub fn new(
        config: ReaperConfig,
        oracle: Arc<dyn OpenSegmentOracle>,
        events: Arc<dyn EventEmitter>,
    ) -> Self {
        Self {
            config,
            oracle,
            sweeping: Mutex::new(()),
            events,
        }
    }

    /// Runs one idempotent sweep.
    pub async fn sweep_once(&self) -> DoorbellResult<()> {
        let _guard = self.sweeping.lock().await;

        let open_path = self.oracle.current_open_path();
        let mut entries = match tokio::fs::read_dir(&self.config.recording_dir).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(err) => return Err(err.into()),
        };

        let now = chrono::Utc::now();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            let Some(parsed) = parse_segment_name(file_name) else {
                continue;
            };
            if Some(&path) == open_path.as_ref() {
                continue;
            }

            let age = now.signed_duration_since(parsed.wall_clock);
            let age = age.to_std().unwrap_or(Duration::ZERO);
            if age > self.config.retention {
                match tokio::fs::remove_file(&path).await {
                    Ok(()) => {
                        self.events.emit_recorder(RecorderEvent::SegmentReaped {
                            path: path.display().to_string(),
                        });
                    }
                    Err(err) => {
                        log::warn!("reaper failed to delete {}: {err}", path.display());
                    }
                }
            }
        }
        Ok(())
    }

    /// Spawns the periodic sweep loop via the given spawner.
    pub fn spawn_periodic(self: Arc<Self>, spawner: &dyn TaskSpawner) {
        spawner.spawn(async move {
            let mut interval = tokio::time::interval(self.config.sweep_interval);
            loop {
                interval.tick().await;
                if let Err(err) = self.sweep_once().await {
                    log::warn!("retention sweep failed: {err}");
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NoOpenSegment;
    impl OpenSegmentOracle for NoOpenSegment {
        fn current_open_path(&self) -> Option<PathBuf> {
            None
        }
    }

    struct FixedOpenSegment(PathBuf);
    impl OpenSegmentOracle for FixedOpenSegment {
        fn current_open_path(&self) -> Option<PathBuf> {
            Some(self.0.clone())
        }
    }

    #[tokio::test]
    async fn expired_segment_is_deleted_fresh_one_survives() {
        let tmp = tempfile::tempdir().unwrap();
        let old_path = tmp.path().join("capture-20200101_000000_UTC-0.mp4");
        let fresh_name = format!(
            "capture-{}_UTC-1.mp4",
            chrono::Utc::now().format("%Y%m%d_%H%M%S")
        );
        let fresh_path = tmp.path().join(&fresh_name);
        let unrelated_path = tmp.path().join("not-a-capture.mp4");

        tokio::fs::write(&old_path, b"x").await.unwrap();
        tokio::fs::write(&fresh_path, b"x").await.unwrap();
        tokio::fs::write(&unrelated_path, b"x").await.unwrap();

        let reaper = Reaper::new(
            ReaperConfig::new(tmp.path().to_path_buf(), 1),
            Arc::new(NoOpenSegment),
            Arc::new(crate::events::NoopEventEmitter),
        );
        reaper.sweep_once().await.unwrap();

        assert!(!old_path.exists());
        assert!(fresh_path.exists());
        assert!(unrelated_path.exists());
    }

    #[tokio::test]
    async fn never_deletes_the_currently_open_segment() {
        let tmp = tempfile::tempdir().unwrap();
        let open_path = tmp.path().join("capture-20200101_000000_UTC-0.mp4");
        tokio::fs::write(&open_path, b"x").await.unwrap();

        let reaper = Reaper::new(
            ReaperConfig::new(tmp.path().to_path_buf(), 1),
            Arc::new(FixedOpenSegment(open_path.clone())),
            Arc::new(crate::events::NoopEventEmitter),
        );
        reaper.sweep_once().await.unwrap();

        assert!(open_path.exists());
    }
}
