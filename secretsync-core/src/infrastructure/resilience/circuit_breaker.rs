// secretsync-core/src/infrastructure/resilience/circuit_breaker.rs

use crate::error::EngineError;
use crate::infrastructure::error::InfrastructureError;
use crate::metrics::MetricsRegistry;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{RwLock, Semaphore};
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

struct Inner {
    state: CircuitState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
}

/// Per-endpoint failure isolation (§4.2). Each logical external endpoint
/// (Vault, AWS SM, S3, Organizations, Identity Center) owns its own
/// instance; breakers are never shared across endpoints.
///
/// Transition table: Closed -> Open at `failure_threshold` consecutive
/// failures. Open -> HalfOpen after `timeout` elapses. HalfOpen -> Closed
/// on the *first* success. HalfOpen -> Open on any failure. HalfOpen
/// admits at most `max_requests` concurrent trial calls; excess callers
/// are rejected the same as Open.
pub struct CircuitBreaker {
    endpoint: String,
    inner: RwLock<Inner>,
    half_open_permits: Semaphore,
    failure_threshold: u32,
    timeout: Duration,
    max_requests: usize,
    metrics: Arc<MetricsRegistry>,
}

impl CircuitBreaker {
    pub fn new(endpoint: impl Into<String>, failure_threshold: u32, timeout: Duration, metrics: Arc<MetricsRegistry>) -> Self {
        Self::with_max_requests(endpoint, failure_threshold, timeout, 1, metrics)
    }

    pub fn with_max_requests(
        endpoint: impl Into<String>,
        failure_threshold: u32,
        timeout: Duration,
        max_requests: usize,
        metrics: Arc<MetricsRegistry>,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            inner: RwLock::new(Inner {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                opened_at: None,
            }),
            half_open_permits: Semaphore::new(max_requests.max(1)),
            failure_threshold: failure_threshold.max(1),
            timeout,
            max_requests: max_requests.max(1),
            metrics,
        }
    }

    pub async fn state(&self) -> CircuitState {
        self.inner.read().await.state
    }

    /// Runs `operation` through the breaker. Rejects immediately with
    /// `CircuitOpen` if the breaker is Open (and its timeout hasn't
    /// elapsed) or if HalfOpen trial slots are exhausted.
    pub async fn call<F, Fut, T>(&self, operation: F) -> Result<T, EngineError>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<T, EngineError>>,
    {
        self.admit().await?;

        let result = operation().await;

        match &result {
            Ok(_) => self.on_success().await,
            Err(_) => self.on_failure().await,
        }

        result
    }

    /// Admits the call, or rejects with `CircuitOpen` if the breaker is
    /// Open (and its timeout hasn't elapsed) or if HalfOpen trial slots
    /// are exhausted. A forgotten HalfOpen permit is always restored by
    /// `on_success`/`on_failure`'s state transition out of HalfOpen, since
    /// every trial ends in exactly one of those two transitions.
    async fn admit(&self) -> Result<(), EngineError> {
        let mut guard = self.inner.write().await;
        match guard.state {
            CircuitState::Closed => Ok(()),
            CircuitState::Open => {
                let elapsed = guard.opened_at.map(|t| t.elapsed()).unwrap_or_default();
                if elapsed >= self.timeout {
                    guard.state = CircuitState::HalfOpen;
                    info!(endpoint = %self.endpoint, "circuit breaker half-opening after timeout");
                    drop(guard);
                    self.try_acquire_trial()
                } else {
                    Err(self.circuit_open_error())
                }
            }
            CircuitState::HalfOpen => {
                drop(guard);
                self.try_acquire_trial()
            }
        }
    }

    fn try_acquire_trial(&self) -> Result<(), EngineError> {
        match self.half_open_permits.try_acquire() {
            Ok(permit) => {
                permit.forget();
                Ok(())
            }
            Err(_) => Err(self.circuit_open_error()),
        }
    }

    async fn on_success(&self) {
        let mut guard = self.inner.write().await;
        guard.consecutive_failures = 0;
        if guard.state == CircuitState::HalfOpen {
            guard.state = CircuitState::Closed;
            guard.opened_at = None;
            self.half_open_permits.add_permits(self.max_requests.saturating_sub(self.half_open_permits.available_permits()));
            info!(endpoint = %self.endpoint, "circuit breaker closed after recovery");
            self.record_transition("closed");
        }
    }

    async fn on_failure(&self) {
        let mut guard = self.inner.write().await;
        match guard.state {
            CircuitState::HalfOpen => {
                guard.state = CircuitState::Open;
                guard.opened_at = Some(Instant::now());
                self.half_open_permits.add_permits(self.max_requests.saturating_sub(self.half_open_permits.available_permits()));
                warn!(endpoint = %self.endpoint, "circuit breaker re-opened after half-open trial failure");
            }
            CircuitState::Closed => {
                guard.consecutive_failures += 1;
                if guard.consecutive_failures >= self.failure_threshold {
                    guard.state = CircuitState::Open;
                    guard.opened_at = Some(Instant::now());
                    warn!(endpoint = %self.endpoint, failures = guard.consecutive_failures, "circuit breaker opened");
                    self.record_transition("open");
                }
            }
            CircuitState::Open => {}
        }
    }

    fn record_transition(&self, to_state: &str) {
        self.metrics.incr_counter(
            "circuit_breaker_state_transitions",
            &vec![("endpoint", self.endpoint.clone()), ("state", to_state.to_string())],
        );
    }

    fn circuit_open_error(&self) -> EngineError {
        self.metrics.incr_counter(
            "circuit_breaker_rejections",
            &vec![("endpoint", self.endpoint.clone())],
        );
        EngineError::Infrastructure(InfrastructureError::CircuitOpen {
            endpoint: self.endpoint.clone(),
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn breaker(threshold: u32, timeout: Duration) -> CircuitBreaker {
        CircuitBreaker::new("test-endpoint", threshold, timeout, Arc::new(MetricsRegistry::new()))
    }

    fn failing() -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<(), EngineError>> + Send>> {
        Box::pin(async { Err(EngineError::Infrastructure(InfrastructureError::Transient("boom".into()))) })
    }

    fn succeeding() -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<(), EngineError>> + Send>> {
        Box::pin(async { Ok(()) })
    }

    #[tokio::test]
    async fn opens_after_threshold_consecutive_failures() {
        let cb = breaker(3, Duration::from_millis(50));
        for _ in 0..3 {
            let _ = cb.call(failing).await;
        }
        assert_eq!(cb.state().await, CircuitState::Open);

        let result = cb.call(succeeding).await;
        assert!(matches!(
            result,
            Err(EngineError::Infrastructure(InfrastructureError::CircuitOpen { .. }))
        ));
    }

    #[tokio::test]
    async fn half_open_closes_on_first_success() {
        let cb = breaker(3, Duration::from_millis(20));
        for _ in 0..3 {
            let _ = cb.call(failing).await;
        }
        tokio::time::sleep(Duration::from_millis(30)).await;

        let result = cb.call(succeeding).await;
        assert!(result.is_ok());
        assert_eq!(cb.state().await, CircuitState::Closed);
    }

    #[tokio::test]
    async fn half_open_reopens_on_any_failure() {
        let cb = breaker(3, Duration::from_millis(20));
        for _ in 0..3 {
            let _ = cb.call(failing).await;
        }
        tokio::time::sleep(Duration::from_millis(30)).await;

        let _ = cb.call(failing).await;
        assert_eq!(cb.state().await, CircuitState::Open);
    }

    #[tokio::test]
    async fn closed_state_does_not_trip_below_threshold() {
        let cb = breaker(5, Duration::from_millis(50));
        for _ in 0..4 {
            let _ = cb.call(failing).await;
        }
        assert_eq!(cb.state().await, CircuitState::Closed);
    }
}
