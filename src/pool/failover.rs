//! Failover executor.
//!
//! Walks an ordered candidate list with an attempt function. Retryable
//! failures consume the retry budget; non-retryable failures skip to the
//! next candidate without consuming it (the next candidate is a different
//! adapter and may not share the limitation). When nothing succeeds the
//! last error is wrapped as `FAILOVER_EXHAUSTED`.

use std::future::Future;

use crate::core::error::GatewayError;

/// Try `candidates` in order. `max_retries == 0` means "try every candidate
/// once"; otherwise at most `max_retries + 1` retryable attempts are made.
/// `on_retry` fires between attempts for logging.
///
/// Candidates are handed to the attempt function by value (they are cheap
/// clones) so the returned future owns its candidate.
pub async fn run_failover<C, T, F, Fut>(
    candidates: &[C],
    max_retries: usize,
    mut attempt: F,
    mut on_retry: impl FnMut(&C, &GatewayError, usize),
) -> Result<T, GatewayError>
where
    C: Clone,
    F: FnMut(C) -> Fut,
    Fut: Future<Output = Result<T, GatewayError>>,
{
    if candidates.is_empty() {
        return Err(GatewayError::internal("failover invoked with no candidates"));
    }

    let budget = if max_retries > 0 {
        max_retries + 1
    } else {
        usize::MAX
    };
    let mut retryable_used = 0usize;
    let mut last_error: Option<GatewayError> = None;

    for (index, candidate) in candidates.iter().enumerate() {
        match attempt(candidate.clone()).await {
            Ok(value) => return Ok(value),
            Err(error) => {
                if error.is_retryable() {
                    retryable_used += 1;
                }
                let budget_left = retryable_used < budget;
                let more_candidates = index + 1 < candidates.len();
                if more_candidates && budget_left {
                    on_retry(candidate, &error, index);
                    last_error = Some(error);
                    continue;
                }
                last_error = Some(error);
                break;
            }
        }
    }

    let last = last_error.expect("at least one attempt was made");
    Err(GatewayError::failover_exhausted(&last))
}
