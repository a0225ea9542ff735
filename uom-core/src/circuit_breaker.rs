use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;

use uom_model::breaker::{BreakerConfig, CircuitBreakerState, CircuitState};
use uom_contracts::circuit_breaker::CircuitBreaker;
use uom_contracts::error::{ContractError, Result};

/// Per-service circuit breaker. Single-writer semantics on the
/// state transitions themselves; reads never block behind a full `Execute`.
pub struct TokioCircuitBreaker {
    service: String,
    config: BreakerConfig,
    state: Mutex<CircuitBreakerState>,
}

impl TokioCircuitBreaker {
    pub fn new(service: impl Into<String>, config: BreakerConfig) -> Self {
        Self {
            service: service.into(),
            config,
            state: Mutex::new(CircuitBreakerState::closed()),
        }
    }
}

#[async_trait]
impl CircuitBreaker for TokioCircuitBreaker {
    fn service_name(&self) -> &str {
        &self.service
    }

    fn state(&self) -> CircuitBreakerState {
        *self.state.lock().unwrap()
    }

    async fn reset(&self) {
        let mut guard = self.state.lock().unwrap();
        *guard = CircuitBreakerState::closed();
    }

    async fn before_call(&self) -> Result<()> {
        let mut guard = self.state.lock().unwrap();
        match guard.state {
            CircuitState::Closed | CircuitState::HalfOpen => Ok(()),
            CircuitState::Open => {
                let elapsed = guard
                    .last_failure_at
                    .map(|at| Utc::now().signed_duration_since(at))
                    .and_then(|d| d.to_std().ok());
                if elapsed.map(|e| e > self.config.open_timeout).unwrap_or(false) {
                    guard.state = CircuitState::HalfOpen;
                    guard.success_count = 0;
                    Ok(())
                } else {
                    Err(ContractError::BreakerOpen {
                        service: self.service.clone(),
                    })
                }
            }
        }
    }

    async fn record_success(&self) {
        let mut guard = self.state.lock().unwrap();
        match guard.state {
            CircuitState::Closed => {
                guard.failure_count = 0;
            }
            CircuitState::HalfOpen => {
                guard.success_count += 1;
                if guard.success_count >= self.config.success_threshold {
                    *guard = CircuitBreakerState::closed();
                }
            }
            CircuitState::Open => {}
        }
    }

    async fn record_failure(&self) {
        let mut guard = self.state.lock().unwrap();
        match guard.state {
            CircuitState::Closed => {
                guard.failure_count += 1;
                guard.last_failure_at = Some(Utc::now());
                if guard.failure_count >= self.config.failure_threshold {
                    guard.state = CircuitState::Open;
                }
            }
            CircuitState::HalfOpen => {
                guard.state = CircuitState::Open;
                guard.last_failure_at = Some(Utc::now());
                guard.success_count = 0;
            }
            CircuitState::Open => {
                guard.last_failure_at = Some(Utc::now());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uom_contracts::circuit_breaker::execute;

    fn config() -> BreakerConfig {
        BreakerConfig {
            failure_threshold: 2,
            success_threshold: 1,
            open_timeout: std::time::Duration::from_millis(10),
        }
    }

    #[tokio::test]
    async fn trips_open_after_failure_threshold_and_fails_fast() {
        let breaker = TokioCircuitBreaker::new("cyberagent", config());
        for _ in 0..2 {
            let _ = execute(&breaker, async { Err::<(), _>(ContractError::Fatal {
                service: "cyberagent".into(),
                message: "boom".into(),
            }) })
            .await;
        }
        assert_eq!(breaker.state().state, CircuitState::Open);
        let result = execute(&breaker, async { Ok::<_, ContractError>(()) }).await;
        assert!(matches!(result, Err(ContractError::BreakerOpen { .. })));
    }

    #[tokio::test]
    async fn half_open_closes_after_success_threshold() {
        let breaker = TokioCircuitBreaker::new("cyberagent", config());
        for _ in 0..2 {
            let _ = execute(&breaker, async { Err::<(), _>(ContractError::Fatal {
                service: "cyberagent".into(),
                message: "boom".into(),
            }) })
            .await;
        }
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        let result = execute(&breaker, async { Ok::<_, ContractError>(()) }).await;
        assert!(result.is_ok());
        assert_eq!(breaker.state().state, CircuitState::Closed);
    }

    #[tokio::test]
    async fn breaker_open_errors_are_not_recorded_as_failures() {
        let breaker = TokioCircuitBreaker::new("cyberagent", config());
        for _ in 0..2 {
            let _ = execute(&breaker, async { Err::<(), _>(ContractError::Fatal {
                service: "cyberagent".into(),
                message: "boom".into(),
            }) })
            .await;
        }
        let before = breaker.state().failure_count;
        let _ = execute(&breaker, async { Ok::<_, ContractError>(()) }).await;
        assert_eq!(breaker.state().failure_count, before);
    }
}
