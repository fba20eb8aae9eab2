//! Concurrency ceiling and per-message idle deadline.
//!
//! The semaphore is process-wide for one server instance; callers past the
//! ceiling wait cooperatively. Each admitted message gets its own
//! [`TimeLimiter`] whose deadline can be pushed forward by outbound activity
//! (the responder resets it on every notification), so a handler stays alive
//! for as long as it keeps showing progress.

use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use tokio::sync::OwnedSemaphorePermit;
use tokio::sync::Semaphore;
use tokio::time::Instant;

use crate::error::Error;

#[derive(Debug)]
pub struct TimeLimiter {
    timeout: Duration,
    deadline: Mutex<Instant>,
}

impl TimeLimiter {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            deadline: Mutex::new(Instant::now() + timeout),
        }
    }

    /// Pushes the deadline back to `now + idle_timeout`.
    pub fn reset(&self) {
        *self.lock_deadline() = Instant::now() + self.timeout;
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn lock_deadline(&self) -> std::sync::MutexGuard<'_, Instant> {
        self.deadline
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn deadline(&self) -> Instant {
        *self.lock_deadline()
    }

    /// Runs `fut` to completion unless the idle deadline expires first. The
    /// sleep re-arms whenever it fires against a deadline that has since
    /// moved, which is what makes `reset` effective mid-flight.
    pub async fn limit<F: Future>(&self, fut: F) -> Result<F::Output, Error> {
        tokio::pin!(fut);
        loop {
            let deadline = self.deadline();
            tokio::select! {
                output = &mut fut => return Ok(output),
                _ = tokio::time::sleep_until(deadline) => {
                    if self.deadline() <= Instant::now() {
                        return Err(Error::Timeout { seconds: self.timeout.as_secs() });
                    }
                }
            }
        }
    }
}

pub struct Limiter {
    semaphore: Arc<Semaphore>,
    idle_timeout: Duration,
}

pub struct LimiterGuard {
    time_limiter: Arc<TimeLimiter>,
    _permit: OwnedSemaphorePermit,
}

impl LimiterGuard {
    pub fn time_limiter(&self) -> Arc<TimeLimiter> {
        self.time_limiter.clone()
    }
}

impl Limiter {
    pub fn new(idle_timeout: Duration, max_concurrency: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(max_concurrency)),
            idle_timeout,
        }
    }

    pub async fn acquire(&self) -> Result<LimiterGuard, Error> {
        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| Error::Runtime("concurrency limiter is closed".to_string()))?;
        Ok(LimiterGuard {
            time_limiter: Arc::new(TimeLimiter::new(self.idle_timeout)),
            _permit: permit,
        })
    }
}
