//! Hardware abstraction layer for the doorbell firmware.
//!
//! Implements every trait `doorbell-core` defines for a peripheral
//! (audio bus, camera bus, GPIO button, BLE GATT, KV namespaces, storage
//! mount, Wi-Fi RSSI, wall-clock sync) against simulated or
//! non-ESP32-specific backends, so the firmware binary runs the same
//! control flow on a development machine that it runs on target
//! hardware.

pub mod audio;
pub mod ble;
pub mod button;
pub mod kv;
pub mod network;
pub mod storage;
pub mod video;

pub use audio::{SimAudioSink, SimAudioSource};
pub use ble::SimBleProvisioner;
pub use button::SimButton;
pub use kv::JsonFileKvStore;
pub use network::{SimRssiSource, SntpTimeSync};
pub use storage::FilesystemStorage;
pub use video::SimVideoSource;
