//! Minimum spacing between outbound catalog calls, shared by every holder of the same instance.
use std::sync::Mutex;
use std::thread;
use std::time::{Duration, Instant};
use tracing::debug;

pub struct RateLimiter {
    last_call: Mutex<Option<Instant>>,
    min_interval: Duration,
}

impl RateLimiter {
    pub fn new(min_interval: Duration) -> Self {
        Self { last_call: Mutex::new(None), min_interval }
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Block until at least `min_interval` has passed since the previous `acquire` returned. The
    /// lock is held while sleeping, so callers are released one at a time.
    pub fn acquire(&self) {
        let mut last = self.last_call.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(last_time) = *last {
            let elapsed = last_time.elapsed();
            if elapsed < self.min_interval {
                let wait_time = self.min_interval - elapsed;
                debug!("Rate limiting: waiting {:?}", wait_time);
                thread::sleep(wait_time);
            }
        }
        *last = Some(Instant::now());
    }
}
