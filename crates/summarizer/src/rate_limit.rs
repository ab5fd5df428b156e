use crate::error::{Result, SummarizerError};
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug)]
struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

/// Token bucket shared by every outbound completion call.
///
/// Uses `tokio::time::Instant` so that paused-clock tests see refills.
#[derive(Debug)]
pub struct TokenBucket {
    capacity: f64,
    refill_per_sec: f64,
    state: Mutex<BucketState>,
}

impl TokenBucket {
    pub fn new(requests_per_minute: u32, burst: u32) -> Self {
        let capacity = f64::from(burst.max(1));
        Self {
            capacity,
            refill_per_sec: f64::from(requests_per_minute.max(1)) / 60.0,
            state: Mutex::new(BucketState {
                tokens: capacity,
                last_refill: Instant::now(),
            }),
        }
    }

    /// Takes a token now, or reports how long until one is available.
    fn take_or_wait(&self) -> std::result::Result<(), Duration> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let now = Instant::now();
        let elapsed = now.saturating_duration_since(state.last_refill).as_secs_f64();
        state.tokens = (state.tokens + elapsed * self.refill_per_sec).min(self.capacity);
        state.last_refill = now;
        if state.tokens >= 1.0 {
            state.tokens -= 1.0;
            return Ok(());
        }
        let missing = 1.0 - state.tokens;
        Err(Duration::from_secs_f64(missing / self.refill_per_sec))
    }

    pub fn try_acquire(&self) -> bool {
        self.take_or_wait().is_ok()
    }

    /// Suspends until a token is available. Gives up with
    /// [`SummarizerError::RateLimitExceeded`] once the next token would
    /// arrive after `deadline`.
    pub async fn acquire(&self, deadline: Duration) -> Result<()> {
        let give_up_at = Instant::now() + deadline;
        loop {
            let wait = match self.take_or_wait() {
                Ok(()) => return Ok(()),
                Err(wait) => wait,
            };
            if Instant::now() + wait > give_up_at {
                log::warn!("rate limiter: next token in {wait:?}, past the acquire deadline");
                return Err(SummarizerError::RateLimitExceeded {
                    attempts: 0,
                    retry_after: Some(wait),
                });
            }
            log::debug!("rate limiter: waiting {wait:?} for a token");
            tokio::time::sleep(wait).await;
        }
    }

    pub fn available(&self) -> f64 {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let elapsed = Instant::now()
            .saturating_duration_since(state.last_refill)
            .as_secs_f64();
        (state.tokens + elapsed * self.refill_per_sec).min(self.capacity)
    }
}
