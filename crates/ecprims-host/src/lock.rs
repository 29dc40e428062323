//! Process-level mutual exclusion around EC exchanges.
//!
//! Other processes (firmware tools, daemons) may drive the same EC through
//! the same ports. Every exchange, memory-map read and negotiation runs with
//! the exchange lock held.

use std::time::{Duration, Instant};

use tracing::trace;

/// How long [`ExchangeLock::acquire`] may wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LockTimeout {
    /// Block until the lock is free.
    #[default]
    Forever,
    /// Fail immediately if the lock is taken.
    NoWait,
    /// Wait at most this long.
    Within(Duration),
}

impl LockTimeout {
    /// Negative waits forever, zero does not wait, positive waits that many
    /// milliseconds.
    pub fn from_millis(ms: i64) -> Self {
        match ms.cmp(&0) {
            std::cmp::Ordering::Less => LockTimeout::Forever,
            std::cmp::Ordering::Equal => LockTimeout::NoWait,
            std::cmp::Ordering::Greater => {
                LockTimeout::Within(Duration::from_millis(ms.unsigned_abs()))
            }
        }
    }
}

/// Outcome of a successful acquire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireStatus {
    /// This call took the lock.
    Acquired,
    /// The lock was already held by this handle.
    AlreadyHeld,
}

/// Outcome of a release.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseStatus {
    Released,
    NotHeld,
}

/// Errors that can occur while taking an exchange lock.
#[derive(Debug, thiserror::Error)]
pub enum LockError {
    /// The lock object could not be opened or created.
    #[error("failed to open lock {name}: {source}")]
    Open {
        name: String,
        source: std::io::Error,
    },

    /// Someone else holds the lock and the timeout ran out.
    #[error("lock {name} is held by another process (waited {waited:?})")]
    Busy { name: String, waited: Duration },

    /// The operating system refused the lock operation.
    #[error("lock {name} failed: {source}")]
    Failed {
        name: String,
        source: std::io::Error,
    },
}

/// Mutual exclusion for EC exchanges.
pub trait ExchangeLock {
    /// Take the lock, waiting as `timeout` allows.
    fn acquire(&mut self, timeout: LockTimeout) -> Result<AcquireStatus, LockError>;

    /// Give the lock back.
    fn release(&mut self) -> ReleaseStatus;

    /// Whether this handle currently holds the lock.
    fn is_held(&self) -> bool;

    /// Lock name for diagnostics.
    fn name(&self) -> &str {
        "lock"
    }
}

impl<L: ExchangeLock + ?Sized> ExchangeLock for &mut L {
    fn acquire(&mut self, timeout: LockTimeout) -> Result<AcquireStatus, LockError> {
        (**self).acquire(timeout)
    }

    fn release(&mut self) -> ReleaseStatus {
        (**self).release()
    }

    fn is_held(&self) -> bool {
        (**self).is_held()
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

impl<L: ExchangeLock + ?Sized> ExchangeLock for Box<L> {
    fn acquire(&mut self, timeout: LockTimeout) -> Result<AcquireStatus, LockError> {
        (**self).acquire(timeout)
    }

    fn release(&mut self) -> ReleaseStatus {
        (**self).release()
    }

    fn is_held(&self) -> bool {
        (**self).is_held()
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

/// A lock that never contends. For single-process use.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoLock {
    held: bool,
}

impl NoLock {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ExchangeLock for NoLock {
    fn acquire(&mut self, _timeout: LockTimeout) -> Result<AcquireStatus, LockError> {
        if self.held {
            return Ok(AcquireStatus::AlreadyHeld);
        }
        self.held = true;
        Ok(AcquireStatus::Acquired)
    }

    fn release(&mut self) -> ReleaseStatus {
        if std::mem::take(&mut self.held) {
            ReleaseStatus::Released
        } else {
            ReleaseStatus::NotHeld
        }
    }

    fn is_held(&self) -> bool {
        self.held
    }

    fn name(&self) -> &str {
        "none"
    }
}

/// Holds an exchange lock for a scope.
///
/// Releases on drop only if this guard took the lock; a lock that was
/// already held when the guard was created stays held.
pub(crate) struct LockGuard<'a, L: ExchangeLock + ?Sized> {
    lock: &'a mut L,
    owned: bool,
}

impl<'a, L: ExchangeLock + ?Sized> LockGuard<'a, L> {
    pub(crate) fn acquire(lock: &'a mut L, timeout: LockTimeout) -> Result<Self, LockError> {
        let status = lock.acquire(timeout)?;
        trace!(lock = lock.name(), ?status, "exchange lock taken");
        Ok(Self {
            lock,
            owned: status == AcquireStatus::Acquired,
        })
    }
}

impl<L: ExchangeLock + ?Sized> Drop for LockGuard<'_, L> {
    fn drop(&mut self) {
        if self.owned {
            self.lock.release();
        }
    }
}

/// Retry a non-blocking attempt until it succeeds or `limit` elapses.
///
/// `attempt` returns `Ok(true)` once the lock is taken and `Ok(false)` while
/// it is contended.
#[cfg_attr(not(unix), allow(dead_code))]
pub(crate) fn poll_acquire<F>(
    name: &str,
    limit: Duration,
    interval: Duration,
    mut attempt: F,
) -> Result<(), LockError>
where
    F: FnMut() -> Result<bool, LockError>,
{
    let start = Instant::now();
    loop {
        if attempt()? {
            return Ok(());
        }
        let waited = start.elapsed();
        if waited >= limit {
            return Err(LockError::Busy {
                name: name.to_string(),
                waited,
            });
        }
        std::thread::sleep(interval.min(limit - waited));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_from_millis_follows_sign() {
        assert_eq!(LockTimeout::from_millis(-1), LockTimeout::Forever);
        assert_eq!(LockTimeout::from_millis(i64::MIN), LockTimeout::Forever);
        assert_eq!(LockTimeout::from_millis(0), LockTimeout::NoWait);
        assert_eq!(
            LockTimeout::from_millis(250),
            LockTimeout::Within(Duration::from_millis(250))
        );
    }

    #[test]
    fn no_lock_reports_already_held() {
        let mut lock = NoLock::new();
        assert_eq!(
            lock.acquire(LockTimeout::NoWait).unwrap(),
            AcquireStatus::Acquired
        );
        assert_eq!(
            lock.acquire(LockTimeout::NoWait).unwrap(),
            AcquireStatus::AlreadyHeld
        );
        assert_eq!(lock.release(), ReleaseStatus::Released);
        assert_eq!(lock.release(), ReleaseStatus::NotHeld);
    }

    #[test]
    fn guard_releases_what_it_acquired() {
        let mut lock = NoLock::new();
        {
            let _guard = LockGuard::acquire(&mut lock, LockTimeout::Forever).unwrap();
        }
        assert!(!lock.is_held());
    }

    #[test]
    fn guard_leaves_preexisting_hold_in_place() {
        let mut lock = NoLock::new();
        lock.acquire(LockTimeout::Forever).unwrap();
        {
            let _guard = LockGuard::acquire(&mut lock, LockTimeout::Forever).unwrap();
        }
        assert!(lock.is_held());
    }

    #[test]
    fn boxed_lock_delegates() {
        let mut lock: Box<dyn ExchangeLock> = Box::new(NoLock::new());
        assert_eq!(
            lock.acquire(LockTimeout::NoWait).unwrap(),
            AcquireStatus::Acquired
        );
        assert!(lock.is_held());
        assert_eq!(lock.name(), "none");
    }

    #[test]
    fn poll_acquire_retries_until_free() {
        let mut attempts = 0;
        poll_acquire(
            "test",
            Duration::from_secs(1),
            Duration::from_millis(1),
            || {
                attempts += 1;
                Ok(attempts == 3)
            },
        )
        .unwrap();
        assert_eq!(attempts, 3);
    }

    #[test]
    fn poll_acquire_gives_up_after_limit() {
        let err = poll_acquire(
            "test",
            Duration::from_millis(5),
            Duration::from_millis(1),
            || Ok(false),
        )
        .unwrap_err();
        assert!(
            matches!(err, LockError::Busy { ref name, waited } if name == "test" && waited >= Duration::from_millis(5))
        );
    }
}
