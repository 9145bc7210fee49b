//! A single generic retry combinator: linear back-off, bounded attempts.
//! Used by the version-control adapter's `fetch` and by the repository
//! watcher's `Pushing` phase (spec.md §4.1, §4.3, §9 "Retry as a first-class
//! combinator").
use crate::error::WatcherError;
use std::future::Future;
use std::time::Duration;

/// Runs `attempt` up to `max_attempts` times, sleeping `5s * attempt_index`
/// between tries (attempt_index is 1-based: the wait before the second try
/// is 5s, before the third is 10s, ...). Reports only the last error.
pub async fn with_linear_backoff<F, Fut, T>(
    operation: &'static str,
    max_attempts: u32,
    mut attempt: F,
) -> Result<T, WatcherError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, WatcherError>>,
{
    let mut last_err = None;
    for attempt_index in 1..=max_attempts {
        match attempt().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                last_err = Some(err);
                if attempt_index < max_attempts {
                    tokio::time::sleep(Duration::from_secs(5 * attempt_index as u64)).await;
                }
            }
        }
    }
    Err(WatcherError::RetriesExhausted {
        operation,
        attempts: max_attempts,
        source: Box::new(last_err.expect("at least one attempt runs when max_attempts > 0")),
    })
}
