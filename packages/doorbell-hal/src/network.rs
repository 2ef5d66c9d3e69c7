//! Simulated Wi-Fi signal-strength accessor and a minimal real-protocol
//! SNTP client for wall-clock synchronization (§4.13 step 6).

use std::sync::atomic::{AtomicI32, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::UdpSocket;
use tokio::time::Instant;

use doorbell_core::error::{DoorbellError, DoorbellResult};
use doorbell_core::heartbeat::RssiSource;
use doorbell_core::lifecycle::TimeSync;

/// `// stub: no real radio on sim hardware` — drifts within a plausible
/// indoor Wi-Fi range, mirroring [`doorbell_core::heartbeat::SimulatedBattery`]'s
/// drift-and-reset shape rather than returning a constant.
pub struct SimRssiSource {
    level_dbm: AtomicI32,
    ticks: AtomicU64,
}

impl Default for SimRssiSource {
    fn default() -> Self {
        Self {
            level_dbm: AtomicI32::new(-55),
            ticks: AtomicU64::new(0),
        }
    }
}

impl RssiSource for SimRssiSource {
    fn rssi_dbm(&self) -> i16 {
        let ticks = self.ticks.fetch_add(1, Ordering::SeqCst);
        let direction: i32 = if ticks % 2 == 0 { -1 } else { 1 };
        let updated = self
            .level_dbm
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |v| {
                Some((v + direction).clamp(-90, -40))
            })
            .unwrap_or(-55);
        updated as i16
    }
}

/// NTP v3/v4 client/server mode request: a 48-byte packet with the first
/// byte selecting LI=0, VN=3, Mode=3 (client).
const NTP_PACKET_SIZE: usize = 48;
const NTP_CLIENT_REQUEST_HEADER: u8 = 0b00_011_011;
/// Seconds between the NTP epoch (1900) and the Unix epoch (1970).
const NTP_UNIX_EPOCH_OFFSET: u64 = 2_208_988_800;
const PER_SERVER_TIMEOUT: Duration = Duration::from_secs(3);

/// Synchronizes the wall clock against a list of NTP servers. Doesn't
/// actually set the system clock (no privilege to do so, and out of
/// scope for a dev/simulated backend); treats a parsed, plausible
/// response within `deadline` as a successful sync.
pub struct SntpTimeSync {
    servers: Vec<String>,
}

impl SntpTimeSync {
    #[must_use]
    pub fn new(servers: Vec<String>) -> Self {
        Self { servers }
    }

    /// Default to well-known public stratum-1/2 pools, matching "two
    /// stratum-1 NTP peers" (§4.13 step 6).
    #[must_use]
    pub fn with_default_servers() -> Self {
        Self::new(vec![
            "pool.ntp.org:123".to_string(),
            "time.google.com:123".to_string(),
        ])
    }

    async fn query_one(&self, server: &str) -> DoorbellResult<u64> {
        let socket = UdpSocket::bind("0.0.0.0:0")
            .await
            .map_err(|err| DoorbellError::Internal(format!("ntp socket bind failed: {err}")))?;
        socket
            .connect(server)
            .await
            .map_err(|err| DoorbellError::Internal(format!("ntp connect to {server} failed: {err}")))?;

        let mut request = [0u8; NTP_PACKET_SIZE];
        request[0] = NTP_CLIENT_REQUEST_HEADER;

        socket
            .send(&request)
            .await
            .map_err(|err| DoorbellError::Internal(format!("ntp send to {server} failed: {err}")))?;

        let mut response = [0u8; NTP_PACKET_SIZE];
        let len = tokio::time::timeout(PER_SERVER_TIMEOUT, socket.recv(&mut response))
            .await
            .map_err(|_| DoorbellError::Timeout(format!("ntp response from {server} timed out")))?
            .map_err(|err| DoorbellError::Internal(format!("ntp recv from {server} failed: {err}")))?;

        if len < NTP_PACKET_SIZE {
            return Err(DoorbellError::Internal(format!(
                "ntp response from {server} was truncated ({len} bytes)"
            )));
        }

        // Transmit timestamp is the big-endian u32 seconds field at
        // offset 40, NTP epoch (1900).
        let ntp_seconds = u32::from_be_bytes([response[40], response[41], response[42], response[43]]);
        let unix_seconds = (u64::from(ntp_seconds)).saturating_sub(NTP_UNIX_EPOCH_OFFSET);
        Ok(unix_seconds)
    }
}

#[async_trait]
impl TimeSync for SntpTimeSync {
    async fn sync(&self, deadline: Duration) -> DoorbellResult<()> {
        let start = Instant::now();
        let mut last_err = DoorbellError::Timeout("no ntp servers configured".into());

        for server in &self.servers {
            let remaining = deadline.saturating_sub(start.elapsed());
            if remaining.is_zero() {
                break;
            }
            match tokio::time::timeout(remaining, self.query_one(server)).await {
                Ok(Ok(unix_seconds)) => {
                    log::info!("[SntpTimeSync] synchronized against {server}: unix_seconds={unix_seconds}");
                    return Ok(());
                }
                Ok(Err(err)) => {
                    log::warn!("[SntpTimeSync] {server} failed: {err}");
                    last_err = err;
                }
                Err(_) => {
                    last_err = DoorbellError::Timeout(format!("ntp deadline elapsed contacting {server}"));
                }
            }
        }

        Err(last_err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rssi_stays_within_plausible_indoor_range() {
        let source = SimRssiSource::default();
        for _ in 0..200 {
            let rssi = source.rssi_dbm();
            assert!((-90..=-40).contains(&rssi));
        }
    }

    #[tokio::test]
    async fn sync_against_unroutable_address_times_out_within_deadline() {
        // 192.0.2.0/24 is reserved for documentation (RFC 5737); nothing
        // ever answers, so this exercises the deadline path deterministically.
        let time_sync = SntpTimeSync::new(vec!["192.0.2.1:123".to_string()]);
        let result = time_sync.sync(Duration::from_millis(200)).await;
        assert!(result.is_err());
    }
}
