//! Time source and polling primitive for the capacity and readiness waits.
//!
//! Both waits are unbounded by design: they keep polling until the provider
//! reports the state the caller needs. Cancelling a wait means dropping its
//! future, which the workflow does when the operator interrupts the run.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use chrono::{DateTime, Utc};

/// Future returned by [`Clock::sleep`].
pub type SleepFuture<'a> = Pin<Box<dyn Future<Output = ()> + Send + 'a>>;

/// Source of wall-clock time and delays, injectable for tests.
pub trait Clock {
    /// Returns the current UTC time.
    fn now(&self) -> DateTime<Utc>;

    /// Suspends the caller for `duration`.
    fn sleep(&self, duration: Duration) -> SleepFuture<'_>;
}

/// Clock backed by the system time and the Tokio timer.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn sleep(&self, duration: Duration) -> SleepFuture<'_> {
        Box::pin(tokio::time::sleep(duration))
    }
}

/// Evaluates `check` until it yields a value, sleeping `interval` on the
/// supplied clock between attempts. The first check runs immediately.
///
/// # Errors
///
/// Returns the first error produced by `check`; errors are never retried.
pub async fn poll_until<C, T, E, F, Fut>(
    clock: &C,
    interval: Duration,
    mut check: F,
) -> Result<T, E>
where
    C: Clock + ?Sized,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<T>, E>>,
{
    loop {
        if let Some(value) = check().await? {
            return Ok(value);
        }
        clock.sleep(interval).await;
    }
}
