//! Button input contract (C8): debounces a level-triggered GPIO and
//! delivers discrete press events to a single registered callback.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{DoorbellError, DoorbellResult};

/// Minimum spacing between two presses that are both delivered to the
/// callback; a second press arriving sooner is swallowed (§4.8, §8.8).
pub const DEBOUNCE_WINDOW: Duration = Duration::from_millis(50);

/// Callback invoked in task context (never interrupt context) for each
/// accepted press.
pub type PressCallback = Arc<dyn Fn() + Send + Sync>;

/// Contract for a debounced button input.
#[async_trait]
pub trait ButtonInput: Send + Sync {
    /// Registers the press callback. A source can have only one
    /// registered callback; registering `None` via an empty closure is
    /// rejected with `InvalidArg` by implementations, matching the
    /// "null callback" rule in §4.8.
    async fn register_callback(&self, callback: PressCallback) -> DoorbellResult<()>;

    /// Starts servicing debounced press events.
    async fn start(&self) -> DoorbellResult<()>;

    /// Stops servicing; the registered callback stays registered.
    async fn stop(&self) -> DoorbellResult<()>;
}

/// Pure debounce decision function, factored out of any particular
/// button implementation so it can be unit tested deterministically
/// against §8.8 without a real clock or GPIO.
///
/// Returns `true` (accept) if `now` is at least [`DEBOUNCE_WINDOW`] after
/// `last_accepted`, or if there was no previous accepted press.
#[must_use]
pub fn should_accept_press(last_accepted: Option<Duration>, now: Duration) -> bool {
    match last_accepted {
        None => true,
        Some(last) => now.saturating_sub(last) >= DEBOUNCE_WINDOW,
    }
}

/// Validates that a callback registration is not a stand-in for "no
/// callback"; concrete implementations call this before storing the
/// callback so the `InvalidArg` contract lives in one place.
pub fn validate_callback_registration(callback: &Option<PressCallback>) -> DoorbellResult<()> {
    if callback.is_none() {
        return Err(DoorbellError::InvalidArg(
            "a press callback must be registered before start".into(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn press_within_debounce_window_is_rejected() {
        let last = Duration::from_millis(100);
        let now = Duration::from_millis(130);
        assert!(!should_accept_press(Some(last), now));
    }

    #[test]
    fn press_at_exactly_the_window_is_accepted() {
        let last = Duration::from_millis(100);
        let now = last + DEBOUNCE_WINDOW;
        assert!(should_accept_press(Some(last), now));
    }

    #[test]
    fn press_after_the_window_is_accepted() {
        let last = Duration::from_millis(100);
        let now = Duration::from_millis(200);
        assert!(should_accept_press(Some(last), now));
    }

    #[test]
    fn first_press_with_no_prior_history_is_accepted() {
        assert!(should_accept_press(None, Duration::from_millis(0)));
    }
}
