use std::time::Duration;

/// Initial polling delay.
pub const INITIAL_DELAY: Duration = Duration::from_micros(5);

/// Upper bound on the polling delay.
pub const MAX_DELAY: Duration = Duration::from_micros(10_000);

/// Elapsed time spent on rapid fixed-delay checks before the delay grows.
pub const FAST_PHASE: Duration = Duration::from_micros(20);

/// Default bound on one exchange's busy wait.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(1);

/// Outcome of a bounded wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitStatus {
    /// The predicate became true.
    Ready,
    /// Accumulated sleep reached the timeout first.
    TimedOut,
}

/// Sleep primitive used between polls.
pub trait Sleeper {
    fn sleep(&mut self, duration: Duration);
}

/// Blocks the calling thread.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&mut self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

impl<S: Sleeper + ?Sized> Sleeper for &mut S {
    fn sleep(&mut self, duration: Duration) {
        (**self).sleep(duration);
    }
}

/// Configuration for busy-flag polling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackoffConfig {
    /// First delay between polls.
    pub initial_delay: Duration,
    /// Cap for the doubling delay.
    pub max_delay: Duration,
    /// Once a poll starts with more than this elapsed, the delay doubles.
    pub fast_phase: Duration,
    /// Total time budget for one wait.
    pub timeout: Duration,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_delay: INITIAL_DELAY,
            max_delay: MAX_DELAY,
            fast_phase: FAST_PHASE,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

/// Bounded polling with exponential delay growth.
///
/// Elapsed time is the sum of requested sleeps, so the timeout bound holds
/// exactly regardless of the platform's sleep granularity.
#[derive(Debug, Clone)]
pub struct Backoff<S = ThreadSleeper> {
    config: BackoffConfig,
    sleeper: S,
}

impl Backoff<ThreadSleeper> {
    /// Create a waiter that sleeps the calling thread.
    pub fn new(config: BackoffConfig) -> Self {
        Self::with_sleeper(config, ThreadSleeper)
    }
}

impl Default for Backoff<ThreadSleeper> {
    fn default() -> Self {
        Self::new(BackoffConfig::default())
    }
}

impl<S: Sleeper> Backoff<S> {
    /// Create a waiter with an explicit sleep primitive.
    pub fn with_sleeper(config: BackoffConfig, sleeper: S) -> Self {
        Self { config, sleeper }
    }

    /// Current configuration.
    pub fn config(&self) -> &BackoffConfig {
        &self.config
    }

    /// Borrow the sleep primitive.
    pub fn sleeper(&self) -> &S {
        &self.sleeper
    }

    /// Poll `predicate` until it returns true or the configured timeout passes.
    pub fn wait<E, F>(&mut self, predicate: F) -> Result<WaitStatus, E>
    where
        F: FnMut() -> Result<bool, E>,
    {
        let timeout = self.config.timeout;
        self.wait_until(timeout, predicate)
    }

    /// Poll `predicate` until it returns true or `timeout` of accumulated
    /// sleep passes. Sleeps before the first check. An `Err` from the
    /// predicate ends the wait immediately.
    pub fn wait_until<E, F>(&mut self, timeout: Duration, mut predicate: F) -> Result<WaitStatus, E>
    where
        F: FnMut() -> Result<bool, E>,
    {
        let mut elapsed = Duration::ZERO;
        let mut delay = self.config.initial_delay;

        while elapsed < timeout {
            let step = delay.min(timeout - elapsed);
            self.sleeper.sleep(step);

            if predicate()? {
                return Ok(WaitStatus::Ready);
            }

            // The fast phase is judged on time spent before this poll's sleep.
            if elapsed > self.config.fast_phase {
                delay = delay.saturating_mul(2).min(self.config.max_delay);
            }
            elapsed += step;
        }

        Ok(WaitStatus::TimedOut)
    }
}
