//! Bounded retry with a fixed interval.
//!
//! The policy only decides *when* to try again. What counts as "not yet",
//! "done" or "give up now" is decided by the attempt closure through
//! [`Attempt`]. Compensation for a failed run is left to the caller.

use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tracing::trace;

/// Outcome of a single attempt.
#[derive(Debug)]
pub enum Attempt<T, E> {
    /// The attempt produced a value; stop.
    Ready(T),
    /// Nothing yet; try again after the interval.
    Pending,
    /// The attempt failed in a way retrying cannot fix; stop.
    Fatal(E),
}

/// Why a retried operation did not produce a value.
#[derive(Debug, Error)]
pub enum RetryError<E> {
    /// Every attempt was pending.
    #[error("gave up after {attempts} attempts")]
    Exhausted {
        /// Number of attempts made.
        attempts: u32,
    },
    /// An attempt failed fatally.
    #[error(transparent)]
    Fatal(E),
}

/// Maximum number of attempts and the pause between them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts before giving up. Zero is treated as one.
    pub max_attempts: u32,
    /// Pause between two attempts.
    pub interval: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            interval: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Create a policy.
    #[must_use]
    pub const fn new(max_attempts: u32, interval: Duration) -> Self {
        Self {
            max_attempts,
            interval,
        }
    }

    /// Run `attempt` until it is ready, fails fatally, or the attempts run out.
    ///
    /// The closure receives the 1-based attempt number. The policy sleeps
    /// between attempts, never after the last one.
    ///
    /// # Errors
    ///
    /// Returns [`RetryError::Fatal`] with the attempt's error, or
    /// [`RetryError::Exhausted`] when every attempt was pending.
    pub async fn run<T, E, F, Fut>(&self, mut attempt: F) -> Result<T, RetryError<E>>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Attempt<T, E>>,
    {
        let attempts = self.max_attempts.max(1);

        for n in 1..=attempts {
            match attempt(n).await {
                Attempt::Ready(value) => return Ok(value),
                Attempt::Fatal(e) => return Err(RetryError::Fatal(e)),
                Attempt::Pending => {
                    trace!(attempt = n, max_attempts = attempts, "Attempt pending");
                    if n < attempts {
                        tokio::time::sleep(self.interval).await;
                    }
                }
            }
        }

        Err(RetryError::Exhausted { attempts })
    }
}
