//! # Fibonacci Backoff
//!
//! Per-object retry delays for failed reconciles. The sequence grows more
//! slowly than exponential backoff: 1s, 1s, 2s, 3s, 5s, 8s, ... capped at
//! 300s. A successful reconcile resets the object's sequence.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use tracing::warn;

/// Shortest delay, in seconds
pub const MIN_BACKOFF_SECONDS: u64 = 1;

/// Longest delay, in seconds
pub const MAX_BACKOFF_SECONDS: u64 = 300;

/// Fibonacci backoff calculator
#[derive(Debug, Clone)]
pub struct FibonacciBackoff {
    min_seconds: u64,
    prev_seconds: u64,
    current_seconds: u64,
    max_seconds: u64,
}

impl FibonacciBackoff {
    /// Create a backoff starting at `min_seconds` and capped at `max_seconds`
    #[must_use]
    pub fn new(min_seconds: u64, max_seconds: u64) -> Self {
        Self {
            min_seconds,
            prev_seconds: 0,
            current_seconds: min_seconds,
            max_seconds,
        }
    }

    /// Get the next backoff duration and advance the sequence
    pub fn next_backoff(&mut self) -> Duration {
        let result = self.current_seconds;
        let next = self.prev_seconds + self.current_seconds;
        self.prev_seconds = self.current_seconds;
        self.current_seconds = std::cmp::min(next, self.max_seconds);
        Duration::from_secs(result)
    }

    /// Reset the backoff to the initial state
    pub fn reset(&mut self) {
        self.prev_seconds = 0;
        self.current_seconds = self.min_seconds;
    }
}

impl Default for FibonacciBackoff {
    fn default() -> Self {
        Self::new(MIN_BACKOFF_SECONDS, MAX_BACKOFF_SECONDS)
    }
}

/// Backoff state keyed by `namespace/name`
#[derive(Debug, Default)]
pub struct BackoffTracker {
    states: Mutex<HashMap<String, FibonacciBackoff>>,
}

impl BackoffTracker {
    /// Create an empty tracker
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay before retrying `key`, advancing its sequence
    pub fn next_delay(&self, key: &str) -> Duration {
        match self.states.lock() {
            Ok(mut states) => states.entry(key.to_string()).or_default().next_backoff(),
            Err(e) => {
                warn!("Failed to lock backoff states: {}, using default backoff", e);
                Duration::from_secs(MAX_BACKOFF_SECONDS)
            }
        }
    }

    /// Forget `key`'s failures after a successful reconcile
    pub fn reset(&self, key: &str) {
        if let Ok(mut states) = self.states.lock() {
            states.remove(key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secs(backoff: &mut FibonacciBackoff) -> u64 {
        backoff.next_backoff().as_secs()
    }

    #[test]
    fn test_fibonacci_backoff_sequence() {
        let mut backoff = FibonacciBackoff::default();
        let sequence: Vec<u64> = (0..8).map(|_| secs(&mut backoff)).collect();
        assert_eq!(sequence, vec![1, 1, 2, 3, 5, 8, 13, 21]);
    }

    #[test]
    fn test_fibonacci_backoff_max_cap() {
        let mut backoff = FibonacciBackoff::new(1, 10);
        let sequence: Vec<u64> = (0..9).map(|_| secs(&mut backoff)).collect();
        assert_eq!(sequence, vec![1, 1, 2, 3, 5, 8, 10, 10, 10]);
    }

    #[test]
    fn test_fibonacci_backoff_reset() {
        let mut backoff = FibonacciBackoff::default();
        secs(&mut backoff);
        secs(&mut backoff);
        secs(&mut backoff);
        backoff.reset();
        assert_eq!(secs(&mut backoff), 1);
        assert_eq!(secs(&mut backoff), 1);
        assert_eq!(secs(&mut backoff), 2);
    }

    #[test]
    fn test_tracker_is_per_key() {
        let tracker = BackoffTracker::new();
        assert_eq!(tracker.next_delay("ns/a").as_secs(), 1);
        assert_eq!(tracker.next_delay("ns/a").as_secs(), 1);
        assert_eq!(tracker.next_delay("ns/a").as_secs(), 2);
        assert_eq!(tracker.next_delay("ns/b").as_secs(), 1);

        tracker.reset("ns/a");
        assert_eq!(tracker.next_delay("ns/a").as_secs(), 1);
    }
}
