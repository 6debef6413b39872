//! Hand-rolled retry/backoff for embedding calls (spec §4.2: "up to 3
//! attempts with exponential backoff 250 ms -> 2 s"). No crate in the
//! retrieved corpus wraps a concrete retry policy in reusable form, so
//! this mirrors the corpus's general style of resilience logic inlined
//! at the call site rather than imported from a dedicated crate.

use kb_core::KbError;
use std::time::Duration;

const INITIAL_BACKOFF: Duration = Duration::from_millis(250);
const MAX_BACKOFF: Duration = Duration::from_secs(2);

/// The outcome of one attempt: `Transient` errors are retried up to the
/// attempt budget; `Fatal` errors (e.g. a dimension mismatch) abort
/// immediately regardless of remaining attempts.
pub enum Attempt<T> {
    Transient(T),
    Fatal(T),
}

pub async fn with_backoff<T, F, Fut>(max_attempts: u32, mut op: F) -> Result<T, KbError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, Attempt<KbError>>>,
{
    let mut backoff = INITIAL_BACKOFF;
    let mut last_err = None;
    for attempt in 1..=max_attempts {
        match op().await {
            Ok(value) => return Ok(value),
            Err(Attempt::Fatal(e)) => return Err(e),
            Err(Attempt::Transient(e)) => {
                last_err = Some(e);
                if attempt < max_attempts {
                    tokio::time::sleep(backoff).await;
                    backoff = (backoff * 2).min(MAX_BACKOFF);
                }
            }
        }
    }
    Err(last_err.unwrap_or_else(|| KbError::Dependency("retry exhausted with no recorded error".to_string())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fatal_error_aborts_without_retrying() {
        let mut calls = 0;
        let result: Result<(), KbError> = with_backoff(3, || {
            calls += 1;
            async { Err(Attempt::Fatal(KbError::Dimension("bad".to_string()))) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls, 1);
    }

    #[tokio::test]
    async fn transient_error_retries_up_to_budget() {
        let mut calls = 0;
        let result: Result<(), KbError> = with_backoff(3, || {
            calls += 1;
            async { Err(Attempt::Transient(KbError::Dependency("down".to_string()))) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls, 3);
    }

    #[tokio::test]
    async fn success_short_circuits() {
        let mut calls = 0;
        let result = with_backoff(3, || {
            calls += 1;
            async { Ok::<_, Attempt<KbError>>(42) }
        })
        .await
        .unwrap();
        assert_eq!(result, 42);
        assert_eq!(calls, 1);
    }
}
