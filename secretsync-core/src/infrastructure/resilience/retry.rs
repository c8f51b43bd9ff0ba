// secretsync-core/src/infrastructure/resilience/retry.rs

use crate::context::RequestContext;
use crate::error::EngineError;
use crate::infrastructure::error::retry_after_hint;
use crate::infrastructure::resilience::CircuitBreaker;
use std::time::Duration;
use tracing::warn;

const INITIAL_BACKOFF: Duration = Duration::from_millis(100);
const MAX_BACKOFF: Duration = Duration::from_secs(30);
const BACKOFF_FACTOR: u32 = 2;
const MAX_ATTEMPTS: u32 = 3;

/// Retries an idempotent operation with exponential backoff (100ms -> 30s,
/// factor 2, up to 3 attempts) on `EngineError::is_retryable()`. A
/// rate-limit response that names a server wait hint (`retry_after`)
/// overrides the computed backoff for that attempt. Returns the final
/// error together with the number of retries attempted, so the caller can
/// feed it into `ErrorBuilder::retry_count`.
pub async fn retry_with_backoff<F, Fut, T>(ctx: &RequestContext, mut operation: F) -> Result<T, (EngineError, u32)>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, (EngineError, Option<Duration>)>>,
{
    let mut backoff = INITIAL_BACKOFF;
    let mut attempt = 0;

    loop {
        attempt += 1;

        match operation().await {
            Ok(value) => return Ok(value),
            Err((err, retry_after)) => {
                if attempt >= MAX_ATTEMPTS || !err.is_retryable() {
                    return Err((err, attempt - 1));
                }
                let wait = retry_after.unwrap_or(backoff);
                warn!(request_id = %ctx.request_id, attempt, ?wait, "retrying after transient failure");
                tokio::time::sleep(wait).await;
                backoff = (backoff * BACKOFF_FACTOR).min(MAX_BACKOFF);
            }
        }
    }
}

/// Wraps one SDK call in `breaker` and retries the whole breaker-guarded
/// attempt with backoff when the call comes back `Transient` (§4.4, §7:
/// "Transient is resolved by the retry layer inside ClientStore
/// invocations"). `operation` runs once per attempt, including inside the
/// breaker, so a half-open breaker sees each retry as its own trial call.
/// Any server-provided wait hint embedded in the error (`retry_after_hint`)
/// overrides that attempt's computed backoff.
pub async fn retrying_call<F, Fut, T>(ctx: &RequestContext, breaker: &CircuitBreaker, mut operation: F) -> Result<T, EngineError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, EngineError>>,
{
    let outcome = retry_with_backoff(ctx, || async {
        match breaker.call(|| operation()).await {
            Ok(value) => Ok(value),
            Err(err) => {
                let retry_after = retry_after_hint(&err);
                Err((err, retry_after))
            }
        }
    })
    .await;

    outcome.map_err(|(err, _retries)| err)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::infrastructure::error::InfrastructureError;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn succeeds_without_retry_on_first_try() {
        let ctx = RequestContext::new();
        let calls = AtomicU32::new(0);
        let result: Result<u32, (EngineError, u32)> = retry_with_backoff(&ctx, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok(42) }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retries_transient_errors_up_to_max_attempts() {
        let ctx = RequestContext::new();
        let calls = AtomicU32::new(0);
        let result: Result<(), (EngineError, u32)> = retry_with_backoff(&ctx, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async {
                Err((
                    EngineError::Infrastructure(InfrastructureError::Transient("timeout".into())),
                    Some(Duration::from_millis(1)),
                ))
            }
        })
        .await;
        let (_, retries) = result.unwrap_err();
        assert_eq!(calls.load(Ordering::SeqCst), MAX_ATTEMPTS);
        assert_eq!(retries, MAX_ATTEMPTS - 1);
    }

    #[tokio::test]
    async fn non_retryable_errors_stop_immediately() {
        let ctx = RequestContext::new();
        let calls = AtomicU32::new(0);
        let result: Result<(), (EngineError, u32)> = retry_with_backoff(&ctx, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err((EngineError::Infrastructure(InfrastructureError::AuthFailed("denied".into())), None)) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retrying_call_retries_through_the_breaker_on_transient_errors() {
        let ctx = RequestContext::new();
        let breaker = CircuitBreaker::new("test-endpoint", 10, Duration::from_secs(60), std::sync::Arc::new(crate::metrics::MetricsRegistry::new()));
        let calls = AtomicU32::new(0);

        let result = retrying_call(&ctx, &breaker, || {
            let attempt = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if attempt < 2 {
                    Err(EngineError::Infrastructure(InfrastructureError::Transient("503".into())))
                } else {
                    Ok(42)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn retrying_call_does_not_retry_auth_failures() {
        let ctx = RequestContext::new();
        let breaker = CircuitBreaker::new("test-endpoint", 10, Duration::from_secs(60), std::sync::Arc::new(crate::metrics::MetricsRegistry::new()));
        let calls = AtomicU32::new(0);

        let result: Result<(), EngineError> = retrying_call(&ctx, &breaker, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(EngineError::Infrastructure(InfrastructureError::AuthFailed("denied".into()))) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
