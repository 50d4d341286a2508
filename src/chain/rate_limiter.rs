//! Token-bucket rate limiter, one instance per configured RPC provider.
//!
//! Hand-rolled rather than pulled from a crate — the teacher's own
//! dependency list has nothing for this, and a bucket is a handful of
//! lines on top of `tokio::sync::Mutex`, which the teacher already
//! depends on via `tokio`'s `full` feature.

use std::time::{Duration, Instant};
use tokio::sync::Mutex;

struct Bucket {
    tokens: f64,
    capacity: f64,
    refill_per_sec: f64,
    last_refill: Instant,
}

/// Bounds request rate to a provider. `capacity` is the burst size,
/// `refill_per_sec` the steady-state rate.
pub struct RateLimiter {
    bucket: Mutex<Bucket>,
}

impl RateLimiter {
    pub fn new(capacity: f64, refill_per_sec: f64) -> Self {
        Self {
            bucket: Mutex::new(Bucket {
                tokens: capacity,
                capacity,
                refill_per_sec,
                last_refill: Instant::now(),
            }),
        }
    }

    /// Blocks until a single token is available, refilling based on
    /// elapsed wall-clock time since the last call.
    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut bucket = self.bucket.lock().await;
                let now = Instant::now();
                let elapsed = now.duration_since(bucket.last_refill).as_secs_f64();
                bucket.tokens = (bucket.tokens + elapsed * bucket.refill_per_sec).min(bucket.capacity);
                bucket.last_refill = now;

                if bucket.tokens >= 1.0 {
                    bucket.tokens -= 1.0;
                    None
                } else {
                    let deficit = 1.0 - bucket.tokens;
                    Some(Duration::from_secs_f64(deficit / bucket.refill_per_sec))
                }
            };

            match wait {
                None => return,
                Some(d) => tokio::time::sleep(d).await,
            }
        }
    }
}
