//! Retry with exponential back-off and jitter for classifier calls.

use std::future::Future;
use std::time::Duration;

use crate::error::MappingError;

const MAX_DELAY_MS: u64 = 60_000;

/// Delay before retry `attempt` (1-based), before jitter.
fn base_delay_ms(backoff_base_ms: u64, attempt: u32) -> u64 {
    backoff_base_ms
        .saturating_mul(1u64 << attempt.saturating_sub(1).min(10))
        .min(MAX_DELAY_MS)
}

/// Longest total sleep [`retry_with_backoff`] can spend over `max_retries`
/// retries, with every step at the top of its jitter range.
pub(crate) fn max_total_delay(max_retries: u32, backoff_base_ms: u64) -> Duration {
    let total = (1..=max_retries)
        .map(|attempt| base_delay_ms(backoff_base_ms, attempt))
        .fold(0u64, u64::saturating_add);
    Duration::from_millis(total.saturating_add(total / 4))
}

fn is_transient_status(status: u16) -> bool {
    status == 429 || (500..600).contains(&status)
}

/// Returns `true` for errors that are worth retrying after a back-off delay:
/// connection failures, request timeouts, HTTP 429 and 5xx.
pub(crate) fn is_retriable(err: &MappingError) -> bool {
    match err {
        MappingError::Http(e) => {
            e.is_timeout()
                || e.is_connect()
                || e.status().is_some_and(|s| is_transient_status(s.as_u16()))
        }
        MappingError::UnexpectedStatus { status, .. } => is_transient_status(*status),
        MappingError::Deserialize { .. }
        | MappingError::Timeout { .. }
        | MappingError::InvalidBaseUrl { .. }
        | MappingError::EmptyCategoryPath
        | MappingError::UnknownCategory(_)
        | MappingError::Store(_) => false,
    }
}

/// Runs `operation` with up to `max_retries` additional attempts on
/// transient errors.
///
/// The delay before retry `n` is `backoff_base_ms * 2^(n-1)`, capped at 60 s
/// and scaled by a random factor in `[0.75, 1.25)`.
pub(crate) async fn retry_with_backoff<T, F, Fut>(
    max_retries: u32,
    backoff_base_ms: u64,
    mut operation: F,
) -> Result<T, MappingError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, MappingError>>,
{
    let mut attempt = 0u32;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if !is_retriable(&err) || attempt >= max_retries {
                    return Err(err);
                }
                attempt += 1;
                let capped = base_delay_ms(backoff_base_ms, attempt);
                #[allow(
                    clippy::cast_possible_truncation,
                    clippy::cast_sign_loss,
                    clippy::cast_precision_loss
                )]
                let delay_ms = (capped as f64 * (rand::random::<f64>() * 0.5 + 0.75)) as u64;
                tracing::warn!(
                    attempt,
                    max_retries,
                    delay_ms,
                    error = %err,
                    "category detector transient error, retrying after back-off"
                );
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            }
        }
    }
}
