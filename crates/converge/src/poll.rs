//! Waiting on remote work with exponential backoff.
//!
//! A check is retried with growing sleeps until it reports done, the
//! deadline passes, or the cancel token fires. Sleeps are sliced so a
//! cancellation is noticed promptly even during a long backoff.

use crate::context::CancelToken;
use crate::error::{Error, Result};
use log::trace;
use std::thread;
use std::time::{Duration, Instant};

const SLEEP_SLICE: Duration = Duration::from_millis(50);

/// Backoff settings for [`poll_until`].
#[derive(Debug, Clone, PartialEq)]
pub struct PollConfig {
    /// Delay after the first unsuccessful check
    pub initial_delay: Duration,
    /// Multiplier for exponential backoff
    pub backoff_factor: f64,
    /// Maximum delay between checks
    pub max_delay: Duration,
    /// Give up after this long
    pub timeout: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(100),
            backoff_factor: 2.0,
            max_delay: Duration::from_secs(5),
            timeout: Duration::from_secs(300),
        }
    }
}

impl PollConfig {
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout,
            ..Default::default()
        }
    }

    /// Calculate the delay for a given attempt number (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let delay = self.initial_delay.as_secs_f64() * self.backoff_factor.powi(attempt as i32);
        let capped = delay.min(self.max_delay.as_secs_f64());
        Duration::from_secs_f64(capped)
    }
}

/// Call `check` until it returns `Ok(true)`.
///
/// Errors from `check` are returned immediately. Returns
/// [`Error::Timeout`] once `config.timeout` has elapsed and
/// [`Error::Cancelled`] when `cancel` fires.
pub fn poll_until<F>(config: &PollConfig, cancel: &CancelToken, what: &str, mut check: F) -> Result<()>
where
    F: FnMut() -> Result<bool>,
{
    let started = Instant::now();
    let mut attempt = 0;

    loop {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        if check()? {
            trace!("{what} done after {} checks", attempt + 1);
            return Ok(());
        }

        let elapsed = started.elapsed();
        if elapsed >= config.timeout {
            return Err(Error::Timeout {
                what: what.to_string(),
                elapsed,
            });
        }

        let delay = config
            .delay_for_attempt(attempt)
            .min(config.timeout - elapsed);
        trace!("{what} not done, checking again in {delay:?}");
        sleep(delay, cancel)?;
        attempt += 1;
    }
}

fn sleep(total: Duration, cancel: &CancelToken) -> Result<()> {
    let deadline = Instant::now() + total;
    loop {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        let now = Instant::now();
        if now >= deadline {
            return Ok(());
        }
        thread::sleep(SLEEP_SLICE.min(deadline - now));
    }
}
