//! Sliding-window throttle for IMDb requests
//!
//! Best-effort and per process: every worker process keeps its own window, so
//! with N processes the effective ceiling is N times the configured one. The
//! [`RateWindow`] trait is the seam for a shared store.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Calls allowed inside one window before throttling kicks in
pub const DEFAULT_MAX_CALLS: usize = 10;
/// Sliding window length
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(60);
/// Pause applied when the window is full
pub const DEFAULT_PAUSE: Duration = Duration::from_secs(2);

/// Record of recent outbound calls
pub trait RateWindow: Send + Sync {
    /// How long the caller should pause before the next call
    ///
    /// `None` when the window has room. The call is not recorded here.
    fn throttle_delay(&self) -> Option<Duration>;

    /// Record a completed call
    fn record_call(&self);
}

/// In-process sliding window of call timestamps
pub struct SlidingRateWindow {
    calls: Mutex<VecDeque<Instant>>,
    max_calls: usize,
    window: Duration,
    pause: Duration,
}

impl SlidingRateWindow {
    pub fn new(max_calls: usize, window: Duration, pause: Duration) -> Self {
        Self {
            calls: Mutex::new(VecDeque::with_capacity(max_calls + 1)),
            max_calls,
            window,
            pause,
        }
    }

    /// Calls recorded within the window
    pub fn recent_calls(&self) -> usize {
        let mut calls = self.calls.lock().unwrap_or_else(|e| e.into_inner());
        prune(&mut calls, self.window);
        calls.len()
    }
}

impl Default for SlidingRateWindow {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_CALLS, DEFAULT_WINDOW, DEFAULT_PAUSE)
    }
}

impl RateWindow for SlidingRateWindow {
    fn throttle_delay(&self) -> Option<Duration> {
        if self.recent_calls() >= self.max_calls {
            Some(self.pause)
        } else {
            None
        }
    }

    fn record_call(&self) {
        let mut calls = self.calls.lock().unwrap_or_else(|e| e.into_inner());
        prune(&mut calls, self.window);
        calls.push_back(Instant::now());
    }
}

fn prune(calls: &mut VecDeque<Instant>, window: Duration) {
    while let Some(oldest) = calls.front() {
        if oldest.elapsed() >= window {
            calls.pop_front();
        } else {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_throttles_at_ceiling() {
        let window = SlidingRateWindow::new(3, Duration::from_secs(60), Duration::from_millis(50));

        for _ in 0..2 {
            window.record_call();
            assert!(window.throttle_delay().is_none());
        }

        window.record_call();
        assert_eq!(window.throttle_delay(), Some(Duration::from_millis(50)));
        assert_eq!(window.recent_calls(), 3);
    }

    #[test]
    fn test_old_calls_slide_out() {
        let window = SlidingRateWindow::new(2, Duration::from_millis(100), Duration::from_millis(10));
        window.record_call();
        window.record_call();
        assert!(window.throttle_delay().is_some());

        std::thread::sleep(Duration::from_millis(150));
        assert_eq!(window.recent_calls(), 0);
        assert!(window.throttle_delay().is_none());
    }

    #[test]
    fn test_defaults() {
        let window = SlidingRateWindow::default();
        assert_eq!(window.max_calls, 10);
        assert_eq!(window.window, Duration::from_secs(60));
        assert_eq!(window.pause, Duration::from_secs(2));
    }
}
