use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use tracing::warn;

/// Token bucket shared by the tools that call the guidance service.
///
/// Holds at most `rps` tokens and refills continuously at `rps` tokens per second.
#[derive(Clone)]
pub struct RateLimiter {
    rps: u32,
    bucket: Arc<Mutex<Bucket>>,
}

#[derive(Debug)]
struct Bucket {
    tokens: f64,
    refilled_at: Instant,
}

impl Bucket {
    fn refill(&mut self, now: Instant, rps: f64) {
        let elapsed = now.saturating_duration_since(self.refilled_at);
        self.tokens = (self.tokens + elapsed.as_secs_f64() * rps).min(rps);
        self.refilled_at = now;
    }
}

/// A request was turned away; `retry_after` is when the next token is due.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimited {
    pub rps: u32,
    pub retry_after: Duration,
}

impl fmt::Display for RateLimited {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "rate limit exceeded (CARENAV_RATE_LIMIT_RPS={}): try again in ~{}ms",
            self.rps,
            self.retry_after.as_millis()
        )
    }
}

impl RateLimiter {
    /// `None` for zero, which means no limit.
    pub fn new(rps: u32) -> Option<Self> {
        (rps > 0).then(|| Self {
            rps,
            bucket: Arc::new(Mutex::new(Bucket {
                tokens: f64::from(rps),
                refilled_at: Instant::now(),
            })),
        })
    }

    pub async fn check(&self) -> Result<(), RateLimited> {
        self.check_at(Instant::now()).await
    }

    async fn check_at(&self, now: Instant) -> Result<(), RateLimited> {
        let rps = f64::from(self.rps);
        let mut bucket = self.bucket.lock().await;
        bucket.refill(now, rps);

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            return Ok(());
        }

        let limited = RateLimited {
            rps: self.rps,
            retry_after: Duration::from_secs_f64((1.0 - bucket.tokens) / rps),
        };
        warn!(
            rps = self.rps,
            retry_after_ms = limited.retry_after.as_millis(),
            "guidance rate limit exceeded"
        );
        Err(limited)
    }
}
