//! Exponential-backoff reconnect schedule for the live streamer (§4.6).

use std::time::Duration;

/// Ceiling on the reconnect delay, regardless of consecutive failures.
pub const BACKOFF_CEILING: Duration = Duration::from_secs(30);

/// Doubles on each failed attempt up to [`BACKOFF_CEILING`]; resets to
/// the initial delay on success.
pub struct Backoff {
    initial: Duration,
    current: Duration,
}

impl Backoff {
    #[must_use]
    pub fn new(initial: Duration) -> Self {
        Self {
            initial,
            current: initial,
        }
    }

    /// The delay to wait before the next reconnect attempt, then advances
    /// the schedule for the attempt after that.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = (self.current * 2).min(BACKOFF_CEILING);
        delay
    }

    /// Resets the schedule after a successful connection.
    pub fn reset(&mut self) {
        self.current = self.initial;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_doubles_each_attempt_up_to_the_ceiling() {
        let mut backoff = Backoff::new(Duration::from_secs(1));
        assert_eq!(backoff.next_delay(), Duration::from_secs(1));
        assert_eq!(backoff.next_delay(), Duration::from_secs(2));
        assert_eq!(backoff.next_delay(), Duration::from_secs(4));
        assert_eq!(backoff.next_delay(), Duration::from_secs(8));
        assert_eq!(backoff.next_delay(), Duration::from_secs(16));
        assert_eq!(backoff.next_delay(), Duration::from_secs(30));
        assert_eq!(backoff.next_delay(), Duration::from_secs(30));
    }

    #[test]
    fn reset_returns_to_the_initial_delay() {
        let mut backoff = Backoff::new(Duration::from_secs(2));
        backoff.next_delay();
        backoff.next_delay();
        backoff.reset();
        assert_eq!(backoff.next_delay(), Duration::from_secs(2));
    }
}
