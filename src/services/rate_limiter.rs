//! Fixed-window throttle shared by every outbound market data request.
//!
//! The window is coarse, not sliding: a burst straddling a window boundary
//! can briefly reach twice the nominal rate.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};
use tracing::debug;

/// Counter state for one window
#[derive(Debug)]
pub struct FixedWindow {
    limit: u32,
    window: Duration,
    window_start: Instant,
    count: u32,
}

impl FixedWindow {
    pub fn new(limit: u32, window: Duration, now: Instant) -> Self {
        Self {
            limit: limit.max(1),
            window,
            window_start: now,
            count: 0,
        }
    }

    /// Record one request at `now`, or return how long the caller must wait
    /// before the current window expires.
    pub fn try_acquire(&mut self, now: Instant) -> Result<(), Duration> {
        let elapsed = now.saturating_duration_since(self.window_start);
        if elapsed >= self.window {
            self.count = 0;
            self.window_start = now;
        }

        if self.count >= self.limit {
            return Err(self.window.saturating_sub(elapsed));
        }

        self.count += 1;
        Ok(())
    }

    /// Start a fresh window after the caller has slept out the old one
    fn reset(&mut self, now: Instant) {
        self.count = 0;
        self.window_start = now;
    }

    pub fn count(&self) -> u32 {
        self.count
    }
}

/// Async-safe limiter; clones share one window.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    state: Arc<Mutex<FixedWindow>>,
}

impl RateLimiter {
    pub fn new(limit: u32, window: Duration) -> Self {
        Self {
            state: Arc::new(Mutex::new(FixedWindow::new(limit, window, Instant::now()))),
        }
    }

    /// Wait until one more request may be issued.
    ///
    /// The lock is held while sleeping so queued callers are released in
    /// order once the new window opens.
    pub async fn acquire(&self) {
        let mut window = self.state.lock().await;

        if let Err(wait) = window.try_acquire(Instant::now()) {
            debug!(
                wait_ms = wait.as_millis() as u64,
                limit = window.limit,
                "Rate limit reached, waiting for next window"
            );
            sleep(wait).await;
            window.reset(Instant::now());
            window.count += 1;
        }
    }

    /// Requests issued in the current window
    pub async fn used(&self) -> u32 {
        self.state.lock().await.count()
    }
}
