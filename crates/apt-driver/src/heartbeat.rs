//! Connection Monitor - tracks incoming messages to detect whether the controller still talks
//!
//! Time is measured relative to a process-wide monotonic anchor so the last-message
//! timestamp fits in an `AtomicU64` and is unaffected by wall clock changes.

use std::sync::OnceLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

static APP_START: OnceLock<Instant> = OnceLock::new();

fn monotonic_micros() -> u64 {
    let start = APP_START.get_or_init(Instant::now);
    start.elapsed().as_micros() as u64
}

/// Connection health monitor
///
/// The reader thread calls [`register_message`](Self::register_message) for every decoded
/// message. With the keepalive running, USB controllers report status about ten times per
/// second, so a silence of a second or more means the controller stopped responding.
#[derive(Debug)]
pub struct ConnectionMonitor {
    last_message: AtomicU64,
    seen_any: AtomicU64,
    timeout: Duration,
}

impl ConnectionMonitor {
    /// # Example
    /// ```
    /// # use apt_driver::heartbeat::ConnectionMonitor;
    /// # use std::time::Duration;
    /// let monitor = ConnectionMonitor::new(Duration::from_secs(1));
    /// assert!(monitor.is_responding());
    /// ```
    pub fn new(timeout: Duration) -> Self {
        Self {
            last_message: AtomicU64::new(monotonic_micros()),
            seen_any: AtomicU64::new(0),
            timeout,
        }
    }

    /// True if a message arrived within the timeout window (or the window since creation
    /// has not elapsed yet)
    pub fn is_responding(&self) -> bool {
        self.last_message_age() < self.timeout
    }

    /// Record that a message was decoded
    pub fn register_message(&self) {
        self.last_message.store(monotonic_micros(), Ordering::Relaxed);
        self.seen_any.fetch_add(1, Ordering::Relaxed);
    }

    /// Time since the last decoded message (or since creation)
    pub fn last_message_age(&self) -> Duration {
        let last_us = self.last_message.load(Ordering::Relaxed);
        Duration::from_micros(monotonic_micros().saturating_sub(last_us))
    }

    /// Whether any message was ever received
    pub fn has_heard_from_device(&self) -> bool {
        self.seen_any.load(Ordering::Relaxed) > 0
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_monotonic_time_always_increases() {
        let t1 = monotonic_micros();
        thread::sleep(Duration::from_millis(10));
        assert!(monotonic_micros() > t1);
    }

    #[test]
    fn test_initially_responding() {
        let monitor = ConnectionMonitor::new(Duration::from_secs(1));
        assert!(monitor.is_responding());
        assert!(!monitor.has_heard_from_device());
    }

    #[test]
    fn test_silence_then_recovery() {
        let monitor = ConnectionMonitor::new(Duration::from_millis(50));
        thread::sleep(Duration::from_millis(100));
        assert!(!monitor.is_responding());
        assert!(monitor.last_message_age() >= Duration::from_millis(50));

        monitor.register_message();
        assert!(monitor.is_responding());
        assert!(monitor.has_heard_from_device());
    }
}
