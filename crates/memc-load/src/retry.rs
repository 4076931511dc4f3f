//! Capped exponential backoff

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::debug;

/// How many times to retry a failed operation and how long to wait between tries
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Retries after the first attempt (total attempts = max_retries + 1)
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub multiplier: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(100),
            multiplier: 2,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, initial_delay: Duration, multiplier: u32) -> Self {
        Self {
            max_retries,
            initial_delay,
            multiplier,
        }
    }

    /// Policy that gives up after the first failure
    pub fn no_retry() -> Self {
        Self::new(0, Duration::ZERO, 1)
    }

    /// First attempt plus retries
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Delays slept before each retry, in order
    pub fn delays(&self) -> impl Iterator<Item = Duration> {
        let multiplier = self.multiplier;
        std::iter::successors(Some(self.initial_delay), move |d| {
            Some(d.saturating_mul(multiplier))
        })
        .take(self.max_retries as usize)
    }

    /// Run `op` until it succeeds or the retries are used up
    ///
    /// Returns the value together with the number of attempts made, or the
    /// error of the last attempt. Sleeping happens on the calling task only.
    pub async fn run<T, E, F, Fut>(&self, mut op: F) -> Result<(T, u32), E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        let mut attempts = 1;
        let mut delays = self.delays();

        loop {
            match op().await {
                Ok(value) => return Ok((value, attempts)),
                Err(err) => match delays.next() {
                    Some(delay) => {
                        debug!(
                            attempt = attempts,
                            max_attempts = self.max_attempts(),
                            delay_ms = delay.as_millis() as u64,
                            error = %err,
                            "Attempt failed, retrying after backoff"
                        );
                        sleep(delay).await;
                        attempts = attempts.saturating_add(1);
                    },
                    None => return Err(err),
                },
            }
        }
    }
}
