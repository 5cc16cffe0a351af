//! Rolling-window limiter for outbound remote calls
//!
//! Calls over the ceiling are not rejected: `acquire` suspends until the
//! oldest call in the window ages out, then takes its slot.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

use crate::config::RateLimitConfig;

/// Point-in-time view of the window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RateWindowSnapshot {
    /// Calls started within the current window
    pub in_window: usize,
    /// Calls currently waiting for a slot
    pub waiting: usize,
    pub max_requests: usize,
    pub window_secs: u64,
}

/// Shared limiter; one instance per routing layer
#[derive(Debug)]
pub struct RateWindow {
    max_requests: usize,
    window: Duration,
    /// Start times of calls inside the window, oldest first
    starts: Mutex<VecDeque<Instant>>,
    waiting: AtomicUsize,
}

impl RateWindow {
    pub fn new(max_requests: usize, window: Duration) -> Self {
        let max_requests = max_requests.max(1);
        Self {
            max_requests,
            window,
            starts: Mutex::new(VecDeque::with_capacity(max_requests)),
            waiting: AtomicUsize::new(0),
        }
    }

    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self::new(config.max_requests, config.window())
    }

    /// Wait for a slot and claim it. Returns how long the caller waited.
    ///
    /// The check and the claim happen under one lock, so concurrent callers
    /// never both observe a stale count.
    pub async fn acquire(&self) -> Duration {
        let requested = Instant::now();
        let mut queued: Option<WaitingGuard<'_>> = None;

        loop {
            let wait = {
                let mut starts = self.starts.lock().await;
                let now = Instant::now();
                while starts
                    .front()
                    .is_some_and(|start| now.duration_since(*start) >= self.window)
                {
                    starts.pop_front();
                }

                if starts.len() < self.max_requests {
                    starts.push_back(now);
                    return now.duration_since(requested);
                }

                // Full: the oldest start frees the next slot
                match starts.front() {
                    Some(oldest) => (*oldest + self.window).saturating_duration_since(now),
                    None => Duration::ZERO,
                }
            };

            if queued.is_none() {
                queued = Some(WaitingGuard::enter(&self.waiting));
            }
            debug!(wait_ms = wait.as_millis() as u64, "Rate window full, waiting");
            tokio::time::sleep(wait).await;
        }
    }

    pub async fn snapshot(&self) -> RateWindowSnapshot {
        let starts = self.starts.lock().await;
        let now = Instant::now();
        let in_window = starts
            .iter()
            .filter(|start| now.duration_since(**start) < self.window)
            .count();
        RateWindowSnapshot {
            in_window,
            waiting: self.waiting.load(Ordering::SeqCst),
            max_requests: self.max_requests,
            window_secs: self.window.as_secs(),
        }
    }

    pub fn max_requests(&self) -> usize {
        self.max_requests
    }

    pub fn window(&self) -> Duration {
        self.window
    }
}

/// Counts one waiter for as long as it lives, including when the waiting
/// future is dropped before it gets a slot
struct WaitingGuard<'a>(&'a AtomicUsize);

impl<'a> WaitingGuard<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for WaitingGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl Default for RateWindow {
    fn default() -> Self {
        Self::from_config(&RateLimitConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_sixteenth_call_waits_for_window() {
        let window = Arc::new(RateWindow::default());
        let start = Instant::now();

        let mut handles = Vec::new();
        for _ in 0..16 {
            let window = window.clone();
            handles.push(tokio::spawn(async move {
                window.acquire().await;
                start.elapsed()
            }));
        }

        let mut elapsed = Vec::new();
        for handle in handles {
            elapsed.push(handle.await.unwrap());
        }
        elapsed.sort();

        assert!(elapsed[..15].iter().all(|e| *e < Duration::from_secs(1)));
        assert!(elapsed[15] >= Duration::from_secs(60));
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_rolls() {
        let window = RateWindow::new(2, Duration::from_secs(10));
        window.acquire().await;
        tokio::time::advance(Duration::from_secs(4)).await;
        window.acquire().await;

        // Full until the first call ages out at t=10
        let waited = window.acquire().await;
        assert_eq!(waited, Duration::from_secs(6));

        // Second call (t=4) still in window at t=10, so one more must wait
        let waited = window.acquire().await;
        assert_eq!(waited, Duration::from_secs(4));
    }

    #[tokio::test(start_paused = true)]
    async fn test_snapshot_counts() {
        let window = Arc::new(RateWindow::new(1, Duration::from_secs(5)));
        window.acquire().await;

        let waiter = {
            let window = window.clone();
            tokio::spawn(async move { window.acquire().await })
        };
        while window.snapshot().await.waiting == 0 {
            tokio::task::yield_now().await;
        }

        let snapshot = window.snapshot().await;
        assert_eq!(snapshot.in_window, 1);
        assert_eq!(snapshot.waiting, 1);

        let waited = waiter.await.unwrap();
        assert_eq!(waited, Duration::from_secs(5));
        assert_eq!(window.snapshot().await.waiting, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_abandoned_wait_is_not_counted() {
        let window = RateWindow::new(1, Duration::from_secs(60));
        window.acquire().await;

        let abandoned = tokio::time::timeout(Duration::from_secs(1), window.acquire()).await;
        assert!(abandoned.is_err());
        assert_eq!(window.snapshot().await.waiting, 0);

        tokio::time::advance(Duration::from_secs(120)).await;
        let snapshot = window.snapshot().await;
        assert_eq!(snapshot.in_window, 0);
        assert_eq!(snapshot.waiting, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_ceiling_is_clamped() {
        let window = RateWindow::new(0, Duration::from_secs(60));
        assert_eq!(window.max_requests(), 1);
        assert_eq!(window.acquire().await, Duration::ZERO);
    }
}
