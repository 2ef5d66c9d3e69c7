//! Storage mount contract: generalizes the original firmware's SD
//! card self-test (§0 "SD card test/self-check surface") into a narrow
//! trait so Lifecycle can fail fast on a bad mount instead of discovering
//! it on the recorder's first write.

use async_trait::async_trait;

use crate::error::DoorbellResult;

/// Backing storage the recorder and audio player read/write through.
/// `doorbell-hal::storage` implements this against a real filesystem
/// mount (or, in the simulated backend, a plain directory).
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Mounts the backing volume, failing `NoResources` if it is absent
    /// or unformatted.
    async fn mount(&self) -> DoorbellResult<()>;

    /// Performs a lightweight read/write self-check against the mounted
    /// volume, failing `NoResources` rather than letting a bad mount
    /// surface later as an opaque recorder write failure (Lifecycle step 1).
    async fn self_check(&self) -> DoorbellResult<()>;

    /// Root directory video segments and chime audio files are written
    /// under (`<storage>/video`, `<storage>/audio`).
    fn root(&self) -> std::path::PathBuf;
}
