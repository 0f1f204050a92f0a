//! Bounded retry with backoff.
//!
//! Navigation, LLM calls and intermediate-host fetches all share this loop.
//! The operation receives the 1-based attempt number so callers can log or
//! report progress per attempt.

use std::future::Future;
use std::time::Duration;

use tracing::debug;

/// Retry policy: attempt ceiling plus a linear delay schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    /// The wait after failed attempt `n` is `n × unit`.
    pub unit: Duration,
}

/// Final error after the policy gave up.
#[derive(Debug)]
pub struct RetryError<E> {
    pub last_error: E,
    pub attempts: u32,
}

impl<E: std::fmt::Display> std::fmt::Display for RetryError<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} (after {} attempt(s))", self.last_error, self.attempts)
    }
}

impl<E: std::fmt::Debug + std::fmt::Display> std::error::Error for RetryError<E> {}

impl RetryPolicy {
    pub fn linear(max_attempts: u32, unit: Duration) -> Self {
        Self { max_attempts, unit }
    }

    /// Delay to wait after `attempt` (1-based) has failed.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.unit.saturating_mul(attempt)
    }

    /// Run `op` until it succeeds or the attempt ceiling is reached.
    ///
    /// Returns the value together with the number of attempts used.
    pub async fn run<T, E, F, Fut>(&self, op: F) -> Result<(T, u32), RetryError<E>>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        self.run_if(op, |_| true).await
    }

    /// Like [`run`](Self::run), but stops early when `retryable` rejects an error.
    pub async fn run_if<T, E, F, Fut, P>(
        &self,
        mut op: F,
        retryable: P,
    ) -> Result<(T, u32), RetryError<E>>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        P: Fn(&E) -> bool,
        E: std::fmt::Display,
    {
        let max = self.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            match op(attempt).await {
                Ok(value) => return Ok((value, attempt)),
                Err(e) if attempt >= max || !retryable(&e) => {
                    return Err(RetryError {
                        last_error: e,
                        attempts: attempt,
                    });
                }
                Err(e) => {
                    let delay = self.delay_after(attempt);
                    debug!(
                        "Attempt {}/{} failed: {}; retrying in {:?}",
                        attempt, max, e, delay
                    );
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    attempt += 1;
                }
            }
        }
    }
}
