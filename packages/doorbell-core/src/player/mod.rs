//! Audio Player (C7): decodes a stored or in-memory encoded buffer and
//! writes PCM to the output I2S, serialized by a single cooperative
//! worker with a command mailbox (§4.7).

mod decode;

pub use decode::{detect_file_format, DecodedPcm, SourceFormat};

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex as SyncMutex;
use tokio::sync::{mpsc, Mutex as AsyncMutex, OwnedMutexGuard};

use crate::audio::AudioSink;
use crate::error::{DoorbellError, DoorbellResult};
use crate::events::{EventEmitter, PlayerEvent};
use crate::model::PlayerCommand;
use crate::runtime::TaskSpawner;

/// Default chunked read size from the decode loop (§4.7 step 2).
pub const DEFAULT_READ_CHUNK_BYTES: usize = 2 * 1024;
/// How long a direct synchronous caller waits to acquire the session
/// mutex before giving up (§4.7 "Overlap policy").
pub const MUTEX_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(1);
/// Depth of the command mailbox (§4.7 "Structure").
pub const COMMAND_MAILBOX_DEPTH: usize = 8;

#[derive(Debug, Clone)]
pub struct PlayerConfig {
    /// Directory holding `bell_<1..MAX>.aac` files (§6 "Audio file layout").
    pub audio_dir: PathBuf,
    /// Number of selectable chimes; bounds `PlayIndex` (§4.7 "Index-to-path").
    pub chime_count: u32,
    /// Bytes read per decode-loop iteration.
    pub read_chunk_bytes: usize,
    /// Deadline for each full write to the output sink.
    pub write_timeout: Duration,
}

impl PlayerConfig {
    #[must_use]
    pub fn new(audio_dir: PathBuf, chime_count: u32) -> Self {
        Self {
            audio_dir,
            chime_count,
            read_chunk_bytes: DEFAULT_READ_CHUNK_BYTES,
            write_timeout: Duration::from_secs(1),
        }
    }
}

/// Maps a zero-based player index to its on-disk chime path
/// (`bell_<i+1>.aac`); out-of-range indices are rejected rather than
/// clamped (§4.7 "Index-to-path mapping").
pub fn index_to_path(audio_dir: &Path, index: u32, chime_count: u32) -> DoorbellResult<PathBuf> {
    if index >= chime_count {
        return Err(DoorbellError::InvalidArg(format!(
            "chime index {index} out of range [0,{chime_count})"
        )));
    }
    Ok(audio_dir.join(format!("bell_{}.aac", index + 1)))
}

/// A single playback session's cooperative stop switch, checked between
/// write chunks so a preempting command can unwind it promptly without
/// waiting for the whole buffer to drain.
type StopFlag = Arc<AtomicBool>;

/// Plays decoded PCM to the output I2S. A single worker task drains the
/// command mailbox; direct synchronous `play_index`/`play_buffer` calls
/// from other contexts (the bell callback, a test) are serialized against
/// the worker by the same session mutex (§4.7 "Structure").
pub struct AudioPlayer {
    config: PlayerConfig,
    sink: Arc<dyn AudioSink>,
    events: Arc<dyn EventEmitter>,
    command_tx: mpsc::Sender<PlayerCommand>,
    session_lock: Arc<AsyncMutex<()>>,
    current_stop: SyncMutex<Option<StopFlag>>,
}

impl AudioPlayer {
    /// Builds the player and spawns its worker task via `spawner`.
    #[must_use]
    pub fn new(
        config: PlayerConfig,
        sink: Arc<dyn AudioSink>,
        events: Arc<dyn EventEmitter>,
        spawner: &dyn TaskSpawner,
    ) -> Arc<Self> {
        let (command_tx, command_rx) = mpsc::channel(COMMAND_MAILBOX_DEPTH);
        let player = Arc::new(Self {
            config,
            sink,
            events,
            command_tx,
            session_lock: Arc::new(AsyncMutex::new(())),
            current_stop: SyncMutex::new(None),
        });

        let worker = player.clone();
        spawner.spawn(async move {
            worker.run_worker(command_rx).await;
        });
        player
    }

    /// Posts a command to the mailbox without blocking (§5 "player command
    /// post (10ms)" deadline); a full mailbox drops the command and logs.
    pub async fn post(&self, command: PlayerCommand) -> DoorbellResult<()> {
        match tokio::time::timeout(Duration::from_millis(10), self.command_tx.send(command)).await
        {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) => Err(DoorbellError::Internal("player worker has exited".into())),
            Err(_) => Err(DoorbellError::Timeout(
                "player command mailbox is full".into(),
            )),
        }
    }

    async fn run_worker(self: Arc<Self>, mut command_rx: mpsc::Receiver<PlayerCommand>) {
        while let Some(command) = command_rx.recv().await {
            match command {
                PlayerCommand::PlayIndex(index) => {
                    if let Err(err) = self.play_index(index).await {
                        log::warn!("[AudioPlayer] play_index({index}) failed: {err}");
                    }
                }
                PlayerCommand::Stop => self.signal_stop(),
                PlayerCommand::Exit => {
                    self.signal_stop();
                    break;
                }
            }
        }
    }

    fn signal_stop(&self) {
        if let Some(flag) = self.current_stop.lock().as_ref() {
            flag.store(true, Ordering::SeqCst);
        }
    }

    /// Preempts any in-flight session (signals it to stop, then waits for
    /// it to unwind) and acquires the session lock for a new one. Used by
    /// the worker, which waits unconditionally rather than timing out
    /// (§4.7 "Overlap policy").
    async fn preempt_and_acquire(self: &Arc<Self>) -> OwnedMutexGuard<()> {
        self.signal_stop();
        self.session_lock.clone().lock_owned().await
    }

    /// Plays the chime at `index` (§4.7 "Index-to-path mapping"),
    /// preempting any session already in flight. This is the path the
    /// worker takes for `PlayerCommand::PlayIndex`.
    pub async fn play_index(self: &Arc<Self>, index: u32) -> DoorbellResult<()> {
        let path = index_to_path(&self.config.audio_dir, index, self.config.chime_count)?;
        let guard = self.preempt_and_acquire().await;
        self.run_session(guard, Some(index), SessionSource::File(path))
            .await
    }

    /// Synchronous entry point for playing a file directly, bypassing the
    /// mailbox. Waits up to [`MUTEX_ACQUIRE_TIMEOUT`] for the session lock
    /// rather than preempting; times out if a session is already running.
    pub async fn play_file(self: &Arc<Self>, path: PathBuf) -> DoorbellResult<()> {
        let guard = self.acquire_with_timeout().await?;
        self.run_session(guard, None, SessionSource::File(path))
            .await
    }

    /// Synchronous entry point for playing an in-memory encoded buffer
    /// (AAC or Opus; §4.7 "Supported formats").
    pub async fn play_buffer(
        self: &Arc<Self>,
        data: Vec<u8>,
        format: SourceFormat,
    ) -> DoorbellResult<()> {
        let guard = self.acquire_with_timeout().await?;
        self.run_session(guard, None, SessionSource::Buffer(data, format))
            .await
    }

    async fn acquire_with_timeout(&self) -> DoorbellResult<OwnedMutexGuard<()>> {
        tokio::time::timeout(MUTEX_ACQUIRE_TIMEOUT, self.session_lock.clone().lock_owned())
            .await
            .map_err(|_| DoorbellError::Timeout("playback mutex acquire".into()))
    }

    async fn run_session(
        self: &Arc<Self>,
        guard: OwnedMutexGuard<()>,
        index_for_events: Option<u32>,
        source: SessionSource,
    ) -> DoorbellResult<()> {
        let stop_flag: StopFlag = Arc::new(AtomicBool::new(false));
        *self.current_stop.lock() = Some(stop_flag.clone());

        if let Some(index) = index_for_events {
            self.events
                .emit_player(PlayerEvent::PlaybackStarted { index });
        }

        let chunk_bytes = self.config.read_chunk_bytes;
        let write_timeout = self.config.write_timeout;
        let sink = self.sink.clone();

        let decode_result = tokio::task::spawn_blocking(move || match source {
            SessionSource::File(path) => {
                let format = detect_file_format(&path).ok_or_else(|| {
                    DoorbellError::NotSupported(format!(
                        "no decoder for file extension: {}",
                        path.display()
                    ))
                })?;
                decode::decode_file_to_pcm(&path, format)
            }
            SessionSource::Buffer(data, format) => decode::decode_buffer_to_pcm(&data, format),
        })
        .await
        .map_err(|err| DoorbellError::Internal(format!("decode task panicked: {err}")))?;

        let outcome = match decode_result {
            Ok(decoded) => self.write_pcm(&decoded, &stop_flag, chunk_bytes, write_timeout).await,
            Err(err) => Err(err),
        };

        *self.current_stop.lock() = None;
        drop(guard);

        match (&outcome, index_for_events) {
            (Ok(()), Some(index)) if !stop_flag.load(Ordering::SeqCst) => {
                self.events
                    .emit_player(PlayerEvent::PlaybackFinished { index });
            }
            (Ok(()), Some(index)) => {
                self.events
                    .emit_player(PlayerEvent::PlaybackPreempted { index });
            }
            (Err(err), Some(index)) => {
                self.events.emit_player(PlayerEvent::PlaybackFailed {
                    index,
                    reason: err.to_string(),
                });
            }
            _ => {}
        }

        outcome
    }

    async fn write_pcm(
        &self,
        decoded: &DecodedPcm,
        stop_flag: &StopFlag,
        chunk_bytes: usize,
        write_timeout: Duration,
    ) -> DoorbellResult<()> {
        for chunk in decoded.samples.chunks(chunk_bytes.max(1)) {
            if stop_flag.load(Ordering::SeqCst) {
                return Ok(());
            }
            self.sink.write(chunk, write_timeout).await?;
        }
        Ok(())
    }
}

enum SessionSource {
    File(PathBuf),
    Buffer(Vec<u8>, SourceFormat),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_to_path_maps_zero_based_index_to_one_based_filename() {
        let dir = Path::new("/storage/audio");
        let path = index_to_path(dir, 0, 4).unwrap();
        assert_eq!(path, dir.join("bell_1.aac"));
        let path = index_to_path(dir, 3, 4).unwrap();
        assert_eq!(path, dir.join("bell_4.aac"));
    }

    #[test]
    fn index_to_path_rejects_out_of_range_index() {
        let dir = Path::new("/storage/audio");
        assert!(matches!(
            index_to_path(dir, 4, 4),
            Err(DoorbellError::InvalidArg(_))
        ));
    }

    #[tokio::test]
    async fn concurrent_play_requests_serialize_through_the_session_lock() {
        use crate::events::NoopEventEmitter;
        use crate::runtime::TokioSpawner;

        struct NullSink;
        #[async_trait::async_trait]
        impl AudioSink for NullSink {
            async fn write(&self, _samples: &[u8], _timeout: Duration) -> DoorbellResult<()> {
                tokio::time::sleep(Duration::from_millis(5)).await;
                Ok(())
            }
        }

        let tmp = tempfile::tempdir().unwrap();
        let config = PlayerConfig::new(tmp.path().to_path_buf(), 1);
        let spawner = TokioSpawner::current();
        let player = AudioPlayer::new(config, Arc::new(NullSink), Arc::new(NoopEventEmitter), &spawner);

        // No real chime file exists, so both calls fail fast on decode;
        // the point of this test is that the second waits for the first
        // to release the session lock rather than running concurrently.
        let a = player.clone();
        let b = player.clone();
        let (r1, r2) = tokio::join!(
            tokio::spawn(async move { a.play_index(0).await }),
            tokio::spawn(async move { b.play_index(0).await }),
        );
        assert!(r1.is_ok());
        assert!(r2.is_ok());
    }
}
