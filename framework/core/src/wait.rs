use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;

use crate::shutdown::{DelegatedShutdownListener, ShutdownSignalError};

/// Retry interval used by the polling waits unless the caller chooses another one.
pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_secs(1);

/// Poll `predicate` until it returns `true`, `timeout` elapses or the shutdown signal is raised.
///
/// - `Ok(true)` when the predicate was satisfied.
/// - `Ok(false)` when the timeout elapsed first. Turning that into an error is up to the caller.
/// - `Err(_)` wrapping [ShutdownSignalError] when the shutdown signal was observed, which callers
///   can detect with `err.is::<ShutdownSignalError>()`.
/// - `Err(_)` with the predicate's own error, which stops the wait immediately.
///
/// The shutdown signal is checked before every poll and raced against every retry sleep.
pub async fn wait_until_true<F, Fut>(
    mut predicate: F,
    timeout: Duration,
    retry_interval: Duration,
    shutdown_listener: &mut DelegatedShutdownListener,
) -> anyhow::Result<bool>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = anyhow::Result<bool>>,
{
    let deadline = Instant::now() + timeout;

    loop {
        shutdown_listener.check()?;

        if predicate().await? {
            return Ok(true);
        }

        let now = Instant::now();
        if now >= deadline {
            return Ok(false);
        }
        let next_poll = std::cmp::min(now + retry_interval, deadline);

        tokio::select! {
            _ = shutdown_listener.wait_for_shutdown() => {
                return Err(ShutdownSignalError::default().into());
            }
            _ = tokio::time::sleep_until(next_poll) => {}
        }
    }
}

/// Sleep for `duration` unless the shutdown signal arrives first.
///
/// Returns `Err(ShutdownSignalError)` when the sleep was cut short.
pub async fn sleep_or_shutdown(
    duration: Duration,
    shutdown_listener: &mut DelegatedShutdownListener,
) -> Result<(), ShutdownSignalError> {
    shutdown_listener.check()?;

    tokio::select! {
        _ = shutdown_listener.wait_for_shutdown() => Err(ShutdownSignalError::default()),
        _ = tokio::time::sleep(duration) => Ok(()),
    }
}
