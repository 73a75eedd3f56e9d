//! Exponential backoff with jitter, bounded by a total elapsed time.

use std::future::Future;
use std::time::Duration;

use log::debug;
use rand::Rng;
use tokio::time::Instant;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub initial_interval: Duration,
    pub multiplier: f64,
    /// Each delay is drawn from `interval * [1 - factor, 1 + factor]`.
    pub randomization_factor: f64,
    pub max_interval: Duration,
    pub max_elapsed_time: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        // The cap sits below the seed: the first retry waits about a second,
        // later ones are short.
        Self {
            initial_interval: Duration::from_secs(1),
            multiplier: 2.0,
            randomization_factor: 0.5,
            max_interval: Duration::from_millis(300),
            max_elapsed_time: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    pub fn start(&self) -> Backoff<'_> {
        Backoff {
            policy: self,
            current: self.initial_interval,
            started: Instant::now(),
        }
    }
}

/// One retry envelope. Create a new one per attempt.
pub struct Backoff<'a> {
    policy: &'a RetryPolicy,
    current: Duration,
    started: Instant,
}

impl Backoff<'_> {
    /// The delay before the next try, or `None` once waiting would overrun
    /// `max_elapsed_time`.
    pub fn next_delay(&mut self) -> Option<Duration> {
        let delay = randomize(self.current, self.policy.randomization_factor);
        self.grow();

        if self.started.elapsed() + delay > self.policy.max_elapsed_time {
            return None;
        }
        Some(delay)
    }

    fn grow(&mut self) {
        let max = self.policy.max_interval.as_secs_f64();
        let next = self.current.as_secs_f64() * self.policy.multiplier;
        self.current = Duration::from_secs_f64(next.min(max));
    }
}

fn randomize(interval: Duration, factor: f64) -> Duration {
    if factor <= 0.0 {
        return interval;
    }
    let secs = interval.as_secs_f64();
    let delta = secs * factor;
    let lo = (secs - delta).max(0.0);
    let hi = secs + delta;
    Duration::from_secs_f64(rand::thread_rng().gen_range(lo..=hi))
}

/// Runs `op` until it succeeds or the policy gives up, returning the last error.
pub async fn retry<T, E, F, Fut>(policy: &RetryPolicy, mut op: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut backoff = policy.start();
    loop {
        match op().await {
            Ok(v) => return Ok(v),
            Err(e) => match backoff.next_delay() {
                Some(delay) => {
                    debug!("Attempt failed ({}), retrying in {:?}", e, delay);
                    tokio::time::sleep(delay).await;
                }
                None => return Err(e),
            },
        }
    }
}
