//! Deadline guard: race an operation against a timeout exactly once.
//!
//! A [`DeadlineGuard`] instance belongs to one request. It races one
//! operation against one deadline; once the deadline fires the instance is
//! spent and refuses further races. The `on_timeout` hook runs
//! synchronously before the caller unblocks, which is where the timeout
//! outcome gets committed — so by the time the guard's error propagates,
//! the terminal state is already decided and a draining reply cannot
//! overwrite it.

use std::future::Future;
use std::time::Duration;
use thiserror::Error;

/// Errors produced by [`DeadlineGuard::run`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeadlineError {
    /// A race on this instance is still outstanding.
    #[error("deadline guard is already running")]
    AlreadyRunning,

    /// A prior race on this instance timed out; instances are single-use
    /// after firing.
    #[error("deadline guard has already elapsed")]
    AlreadyElapsed,

    /// The deadline fired before the operation completed.
    #[error("operation timed out after {0:?}")]
    Elapsed(Duration),
}

/// Races an operation against a deadline, at most once.
#[derive(Debug, Default)]
pub struct DeadlineGuard {
    running: bool,
    elapsed: bool,
}

impl DeadlineGuard {
    /// A fresh, unfired guard.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            running: false,
            elapsed: false,
        }
    }

    /// Whether this instance's deadline has fired.
    ///
    /// Used downstream to suppress duplicate logging: a failure that
    /// surfaces after the deadline fired was already reported as a
    /// timeout.
    #[must_use]
    pub const fn has_elapsed(&self) -> bool {
        self.elapsed
    }

    /// Race `operation` against `deadline`.
    ///
    /// If the operation completes first its output is returned and the
    /// timer is dropped. If the deadline fires first, `on_timeout` is
    /// invoked synchronously, the guard is marked spent, and
    /// [`DeadlineError::Elapsed`] is returned; the operation is dropped
    /// without being polled further.
    ///
    /// # Errors
    ///
    /// - [`DeadlineError::AlreadyRunning`] if a race is outstanding
    /// - [`DeadlineError::AlreadyElapsed`] if a prior race timed out
    /// - [`DeadlineError::Elapsed`] if this race timed out
    pub async fn run<T, F, Fut>(
        &mut self,
        deadline: Duration,
        on_timeout: F,
        operation: Fut,
    ) -> Result<T, DeadlineError>
    where
        F: FnOnce(),
        Fut: Future<Output = T>,
    {
        if self.running {
            return Err(DeadlineError::AlreadyRunning);
        }
        if self.elapsed {
            return Err(DeadlineError::AlreadyElapsed);
        }
        self.running = true;

        tokio::pin!(operation);
        let result = tokio::select! {
            output = &mut operation => Ok(output),
            () = tokio::time::sleep(deadline) => {
                self.elapsed = true;
                on_timeout();
                Err(DeadlineError::Elapsed(deadline))
            }
        };
        self.running = false;
        result
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Test code can use unwrap
mod tests {
    use super::*;
    use std::cell::Cell;

    #[tokio::test(start_paused = true)]
    async fn test_operation_wins_the_race() {
        let mut guard = DeadlineGuard::new();
        let fired = Cell::new(false);
        let result = guard
            .run(Duration::from_millis(50), || fired.set(true), async { 7 })
            .await;
        assert_eq!(result, Ok(7));
        assert!(!fired.get());
        assert!(!guard.has_elapsed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_fires_and_hook_runs_first() {
        let mut guard = DeadlineGuard::new();
        let fired = Cell::new(false);
        let result: Result<(), _> = guard
            .run(
                Duration::from_millis(50),
                || fired.set(true),
                std::future::pending(),
            )
            .await;
        assert_eq!(result, Err(DeadlineError::Elapsed(Duration::from_millis(50))));
        assert!(fired.get());
        assert!(guard.has_elapsed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_guard_is_single_use_after_firing() {
        let mut guard = DeadlineGuard::new();
        let _: Result<(), _> = guard
            .run(Duration::from_millis(10), || {}, std::future::pending())
            .await;

        let again = guard
            .run(Duration::from_millis(10), || {}, async { 1 })
            .await;
        assert_eq!(again, Err(DeadlineError::AlreadyElapsed));
    }

    #[tokio::test(start_paused = true)]
    async fn test_guard_is_reusable_when_operation_won() {
        let mut guard = DeadlineGuard::new();
        let first = guard
            .run(Duration::from_millis(10), || {}, async { 1 })
            .await;
        let second = guard
            .run(Duration::from_millis(10), || {}, async { 2 })
            .await;
        assert_eq!(first, Ok(1));
        assert_eq!(second, Ok(2));
    }
}
