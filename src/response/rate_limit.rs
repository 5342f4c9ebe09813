use std::collections::VecDeque;

use tokio::time::{Duration, Instant};

pub const RATE_LIMIT: usize = 5;
pub const RATE_WINDOW_MS: u64 = 60_000;

/// Sliding window of request timestamps. Stale entries are pruned on each check.
#[derive(Debug, Clone)]
pub struct RateLimitWindow {
    limit: usize,
    window: Duration,
    requests: VecDeque<Instant>,
}

impl Default for RateLimitWindow {
    fn default() -> Self {
        Self::new(RATE_LIMIT, RATE_WINDOW_MS)
    }
}

impl RateLimitWindow {
    pub fn new(limit: usize, window_ms: u64) -> Self {
        Self {
            limit: limit.max(1),
            window: Duration::from_millis(window_ms),
            requests: VecDeque::new(),
        }
    }

    fn prune(&mut self, now: Instant) {
        while let Some(oldest) = self.requests.front() {
            if now.saturating_duration_since(*oldest) >= self.window {
                self.requests.pop_front();
            } else {
                break;
            }
        }
    }

    /// Records `now` and returns `Ok(())` if under the limit, otherwise the
    /// whole seconds (at least 1) until the oldest entry expires.
    pub fn try_acquire(&mut self, now: Instant) -> Result<(), u64> {
        self.prune(now);
        if self.requests.len() >= self.limit {
            let oldest = self.requests.front().copied().unwrap_or(now);
            let expires_at = oldest + self.window;
            let wait_ms = expires_at.saturating_duration_since(now).as_millis() as u64;
            return Err(wait_ms.div_ceil(1000).max(1));
        }
        self.requests.push_back(now);
        Ok(())
    }

    pub fn recent(&mut self, now: Instant) -> usize {
        self.prune(now);
        self.requests.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sixth_request_in_window_waits_for_oldest() {
        let start = Instant::now();
        let mut window = RateLimitWindow::default();
        for i in 0..5 {
            assert!(window.try_acquire(start + Duration::from_secs(i * 2)).is_ok());
        }

        let wait = window
            .try_acquire(start + Duration::from_secs(15))
            .expect_err("sixth request must be rejected");
        assert_eq!(wait, 45);
        assert_eq!(window.recent(start + Duration::from_secs(15)), 5);

        assert!(window.try_acquire(start + Duration::from_secs(60)).is_ok());
    }

    #[test]
    fn wait_estimate_is_strictly_positive() {
        let start = Instant::now();
        let mut window = RateLimitWindow::new(1, 1_000);
        window.try_acquire(start).unwrap();
        let wait = window
            .try_acquire(start + Duration::from_millis(999))
            .unwrap_err();
        assert_eq!(wait, 1);
    }
}
