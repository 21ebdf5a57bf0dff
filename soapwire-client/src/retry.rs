//! Whole-exchange retry with exponential backoff.
//!
//! The transport never retries a failed connect, a timeout or a dropped
//! connection on its own: those surface as errors and the session must be
//! reopened. [`retry_with_policy`] is the layer above that does so, repeating
//! a blocking operation while it fails with a
//! [retryable](TransportError::is_retryable) error.
//!
//! ```ignore
//! use soapwire_client::{RetryPolicy, exchange, retry_with_policy};
//!
//! let policy = RetryPolicy::new().max_retries(4);
//! let response = retry_with_policy(&policy, |_attempt| {
//!     exchange(&mut transport, "https://example.com/calc", &request)
//! })?;
//! ```
//!
//! Authentication and certificate challenges are not retried here; they are
//! handled per message by the transport's resolver.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::TransportError;

/// Default values of [`RetryPolicy`].
pub mod defaults {
    use std::time::Duration;

    /// Delay before the first retry.
    pub const BASE_DELAY: Duration = Duration::from_millis(500);

    /// Growth factor between consecutive delays.
    pub const MULTIPLIER: f64 = 2.0;

    /// Random spread around each delay; 0.2 means +/- 20%.
    pub const JITTER: f64 = 0.2;

    /// Upper bound on any single delay.
    pub const MAX_DELAY: Duration = Duration::from_secs(30);

    /// Retries after the first attempt.
    pub const MAX_RETRIES: u32 = 3;
}

/// How often and how patiently to repeat a failed exchange.
///
/// Out-of-range values are clamped when the policy is used: the multiplier to
/// at least 1, the jitter to `0.0..=1.0`, and the base delay to the maximum.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Growth factor between consecutive delays.
    pub multiplier: f64,
    /// Random spread around each delay, as a fraction of it.
    pub jitter: f64,
    /// Upper bound on any single delay.
    pub max_delay: Duration,
    /// Retries after the first attempt.
    pub max_retries: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay: defaults::BASE_DELAY,
            multiplier: defaults::MULTIPLIER,
            jitter: defaults::JITTER,
            max_delay: defaults::MAX_DELAY,
            max_retries: defaults::MAX_RETRIES,
        }
    }
}

impl RetryPolicy {
    /// A policy with the [`defaults`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Run once, never retry.
    pub fn no_retry() -> Self {
        Self {
            max_retries: 0,
            ..Default::default()
        }
    }

    /// Set the number of retries after the first attempt.
    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Set the delay before the first retry.
    pub fn base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    /// Set the upper bound on any single delay.
    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Set the growth factor between delays. Values below 1 count as 1.
    pub fn multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    /// Set the random spread, clamped to `0.0..=1.0`.
    pub fn jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter;
        self
    }

    /// A fresh delay sequence for one run of the policy.
    pub fn backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff::new(self.clone())
    }

    fn clamped(mut self) -> Self {
        if !(self.multiplier >= 1.0) {
            self.multiplier = 1.0;
        }
        self.jitter = if self.jitter.is_nan() {
            0.0
        } else {
            self.jitter.clamp(0.0, 1.0)
        };
        self.base_delay = self.base_delay.min(self.max_delay);
        self
    }
}

/// Sleep durations growing by the policy's multiplier, with jitter.
#[derive(Clone, Debug)]
pub struct ExponentialBackoff {
    policy: RetryPolicy,
    current_secs: f64,
    attempts: u32,
}

impl ExponentialBackoff {
    /// Start the delay sequence of `policy`.
    pub fn new(policy: RetryPolicy) -> Self {
        let policy = policy.clamped();
        Self {
            current_secs: policy.base_delay.as_secs_f64(),
            policy,
            attempts: 0,
        }
    }

    /// Delays handed out so far.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Whether the policy allows another retry.
    pub fn can_retry(&self) -> bool {
        self.attempts < self.policy.max_retries
    }

    /// The next delay. Never exceeds the policy's maximum.
    pub fn next_delay(&mut self) -> Duration {
        let max_secs = self.policy.max_delay.as_secs_f64();
        let jitter = self.policy.jitter;
        let factor = if jitter > 0.0 {
            1.0 + (rand::random::<f64>() * 2.0 - 1.0) * jitter
        } else {
            1.0
        };
        let delay = (self.current_secs * factor).clamp(0.0, max_secs);

        self.current_secs = (self.current_secs * self.policy.multiplier).min(max_secs);
        self.attempts += 1;
        Duration::from_secs_f64(delay)
    }
}

/// Repeat `f` while it fails with a retryable error and the policy allows.
///
/// `f` receives the attempt number, starting at 0. It is expected to reopen
/// the transport itself, as [`exchange`](crate::exchange) does.
pub fn retry_with_policy<T, F>(policy: &RetryPolicy, mut f: F) -> Result<T, TransportError>
where
    F: FnMut(u32) -> Result<T, TransportError>,
{
    let mut backoff = policy.backoff();
    let mut attempt = 0;
    loop {
        match f(attempt) {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() && backoff.can_retry() => {
                let delay = backoff.next_delay();
                #[cfg(feature = "tracing")]
                tracing::debug!(
                    error = %e,
                    attempt,
                    delay_ms = delay.as_millis(),
                    "exchange failed, retrying"
                );
                std::thread::sleep(delay);
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
