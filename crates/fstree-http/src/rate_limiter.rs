//! A token-bucket rate limiter over `tokio`'s monotonic clock, safe for
//! concurrent waiters. `rate == 0.0` disables limiting entirely.

use tokio::sync::Mutex;
use tokio::time::Instant;
use std::time::Duration;

pub struct RateLimiter {
    rate: f64,
    next_slot: Mutex<Option<Instant>>,
}

impl RateLimiter {
    pub fn new(rate: f64) -> Self {
        Self {
            rate,
            next_slot: Mutex::new(None),
        }
    }

    /// Blocks the caller until it is that waiter's turn. Waiters are
    /// served in the order they call `acquire`, one slot apart.
    pub async fn acquire(&self) {
        if self.rate <= 0.0 {
            return;
        }
        let interval = Duration::from_secs_f64(1.0 / self.rate);
        let now = Instant::now();
        let wait_until = {
            let mut slot = self.next_slot.lock().await;
            let target = slot.map_or(now, |t| t.max(now));
            *slot = Some(target + interval);
            target
        };
        let remaining = wait_until.saturating_duration_since(now);
        if !remaining.is_zero() {
            tokio::time::sleep(remaining).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn disabled_limiter_never_waits() {
        let limiter = RateLimiter::new(0.0);
        let start = Instant::now();
        for _ in 0..1000 {
            limiter.acquire().await;
        }
        assert_eq!(Instant::now(), start);
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_waiters_are_spaced_by_the_interval() {
        let limiter = Arc::new(RateLimiter::new(10.0));
        let start = Instant::now();
        let mut handles = Vec::new();
        for _ in 0..5 {
            let limiter = limiter.clone();
            handles.push(tokio::spawn(async move {
                limiter.acquire().await;
                Instant::now()
            }));
        }
        let mut elapsed = Vec::new();
        for h in handles {
            elapsed.push(h.await.unwrap().duration_since(start));
        }
        elapsed.sort();
        // Five waiters at 10/s must span at least 400ms (4 intervals).
        assert!(elapsed[4] >= Duration::from_millis(400));
    }
}
