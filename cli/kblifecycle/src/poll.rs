//! Poll-with-deadline: the single wait primitive behind every wait.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

/// Outcome of one poll attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Tick<T, S> {
    /// Condition met; stop with this value
    Ready(T),
    /// Not yet; `S` is the last observed state, reported on timeout
    Pending(S),
}

/// Why polling stopped without a ready value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollError<S, E> {
    /// Deadline passed; carries the last pending state seen
    TimedOut { elapsed: Duration, last: Option<S> },
    /// The check itself failed; polling stops immediately
    Failed(E),
}

/// Call `check` every `interval` until it returns [`Tick::Ready`], returns an
/// error, or `timeout` elapses. `check` always runs at least once, and only
/// one check is in flight at a time.
///
/// # Errors
///
/// [`PollError::Failed`] with the check's error, or [`PollError::TimedOut`].
pub async fn poll_until<T, S, E, F, Fut>(
    description: &str,
    timeout: Duration,
    interval: Duration,
    mut check: F,
) -> Result<T, PollError<S, E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Tick<T, S>, E>>,
{
    let start = Instant::now();
    let deadline = start + timeout;
    let mut attempts = 0u32;

    loop {
        attempts += 1;
        let last = match check().await.map_err(PollError::Failed)? {
            Tick::Ready(value) => {
                debug!(description, attempts, elapsed = ?start.elapsed(), "Poll condition met");
                return Ok(value);
            }
            Tick::Pending(state) => state,
        };

        let now = Instant::now();
        if now >= deadline {
            return Err(PollError::TimedOut {
                elapsed: now - start,
                last: Some(last),
            });
        }
        debug!(description, attempts, "Waiting");
        tokio::time::sleep(interval.min(deadline - now)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_ready_after_a_few_ticks() {
        let mut calls = 0;
        let result: Result<u32, PollError<u32, ()>> =
            poll_until("counter", Duration::from_secs(60), Duration::from_secs(5), || {
                calls += 1;
                let seen = calls;
                async move { Ok(if seen >= 3 { Tick::Ready(seen) } else { Tick::Pending(seen) }) }
            })
            .await;
        assert_eq!(result, Ok(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_reports_last_state() {
        let start = Instant::now();
        let result: Result<(), PollError<&str, ()>> =
            poll_until("never", Duration::from_secs(12), Duration::from_secs(5), || async {
                Ok(Tick::Pending("Enabling"))
            })
            .await;
        match result {
            Err(PollError::TimedOut { last, .. }) => assert_eq!(last, Some("Enabling")),
            other => panic!("expected timeout, got {other:?}"),
        }
        assert_eq!(start.elapsed(), Duration::from_secs(12));
    }

    #[tokio::test(start_paused = true)]
    async fn test_error_stops_immediately() {
        let start = Instant::now();
        let result: Result<(), PollError<(), &str>> =
            poll_until("failing", Duration::from_secs(60), Duration::from_secs(5), || async {
                Err("boom")
            })
            .await;
        assert_eq!(result, Err(PollError::Failed("boom")));
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_timeout_checks_once() {
        let result: Result<(), PollError<(), ()>> =
            poll_until("once", Duration::ZERO, Duration::from_secs(5), || async { Ok(Tick::Ready(())) }).await;
        assert_eq!(result, Ok(()));
    }
}
