//! Simulated GPIO button input (C8): a debounced press pipeline fed by an
//! internal channel instead of a real interrupt line. Tests and a future
//! diagnostics surface can call [`SimButton::simulate_press`] to trigger
//! one the same way a real press would.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use doorbell_core::button::{should_accept_press, ButtonInput, PressCallback};
use doorbell_core::error::{DoorbellError, DoorbellResult};

const EDGE_CHANNEL_DEPTH: usize = 16;

/// Debounces raw press edges from [`Self::simulate_press`] through
/// [`should_accept_press`] before invoking the registered callback.
pub struct SimButton {
    callback: Mutex<Option<PressCallback>>,
    running: AtomicBool,
    edge_tx: mpsc::Sender<()>,
    edge_rx: Mutex<Option<mpsc::Receiver<()>>>,
}

impl Default for SimButton {
    fn default() -> Self {
        let (edge_tx, edge_rx) = mpsc::channel(EDGE_CHANNEL_DEPTH);
        Self {
            callback: Mutex::new(None),
            running: AtomicBool::new(false),
            edge_tx,
            edge_rx: Mutex::new(Some(edge_rx)),
        }
    }
}

impl SimButton {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Raises a raw press edge, as a GPIO interrupt handler would. Dropped
    /// silently if the debounce task isn't running yet.
    pub async fn simulate_press(&self) {
        let _ = self.edge_tx.send(()).await;
    }
}

#[async_trait]
impl ButtonInput for SimButton {
    async fn register_callback(&self, callback: PressCallback) -> DoorbellResult<()> {
        *self.callback.lock() = Some(callback);
        Ok(())
    }

    async fn start(&self) -> DoorbellResult<()> {
        let callback = self
            .callback
            .lock()
            .clone()
            .ok_or_else(|| DoorbellError::InvalidState("no callback registered".into()))?;

        let mut edge_rx = self
            .edge_rx
            .lock()
            .take()
            .ok_or_else(|| DoorbellError::InvalidState("button already started".into()))?;

        self.running.store(true, Ordering::SeqCst);
        let running_flag = std::sync::Arc::new(AtomicBool::new(true));
        let task_flag = running_flag.clone();

        tokio::spawn(async move {
            let mut last_accepted: Option<Duration> = None;
            let start = tokio::time::Instant::now();
            while task_flag.load(Ordering::SeqCst) {
                match edge_rx.recv().await {
                    Some(()) => {
                        let now = start.elapsed();
                        if should_accept_press(last_accepted, now) {
                            last_accepted = Some(now);
                            callback();
                        }
                    }
                    None => break,
                }
            }
        });

        Ok(())
    }

    async fn stop(&self) -> DoorbellResult<()> {
        self.running.store(false, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;
    use std::sync::Arc;

    #[tokio::test]
    async fn rapid_presses_within_debounce_window_collapse_to_one_callback() {
        let button = Arc::new(SimButton::new());
        let count = Arc::new(AtomicU32::new(0));
        let counted = count.clone();
        button
            .register_callback(Arc::new(move || {
                counted.fetch_add(1, Ordering::SeqCst);
            }))
            .await
            .unwrap();
        button.start().await.unwrap();

        button.simulate_press().await;
        button.simulate_press().await;
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn start_without_a_registered_callback_fails() {
        let button = SimButton::new();
        let result = button.start().await;
        assert!(matches!(result, Err(DoorbellError::InvalidState(_))));
    }
}
