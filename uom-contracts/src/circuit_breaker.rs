use async_trait::async_trait;
use std::future::Future;

use uom_model::breaker::CircuitBreakerState;

use crate::error::{ContractError, Result};

/// Per-service fast-fail guard. One instance exists per downstream service
/// (CyberAgent, VideoAgent, GeoAgent, GitHubManager, MageAgent). The trait
/// only exposes the state transitions themselves so it stays object-safe
/// (`Arc<dyn CircuitBreaker>`); wrap an actual call with [`execute`].
#[async_trait]
pub trait CircuitBreaker: Send + Sync {
    /// Name of the service this breaker guards, used in `BreakerOpen`
    /// errors and in log fields.
    fn service_name(&self) -> &str;

    fn state(&self) -> CircuitBreakerState;

    /// Forces the breaker back to `closed` with cleared counters.
    async fn reset(&self);

    /// Admission check. Returns `Err(BreakerOpen)` without side effects if
    /// the breaker is fast-failing; transitions `open -> half_open` here
    /// when `open_timeout` has elapsed, per the breaker's own clock.
    async fn before_call(&self) -> Result<()>;

    async fn record_success(&self);

    async fn record_failure(&self);
}

/// Runs `op` through `breaker`'s admission check, then records the outcome.
/// `BreakerOpen` itself is never recorded as a failure, since `op` never ran.
pub async fn execute<T, F>(breaker: &dyn CircuitBreaker, op: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    breaker.before_call().await?;
    match op.await {
        Ok(value) => {
            breaker.record_success().await;
            Ok(value)
        }
        Err(error) => {
            if counts_as_failure(&error) {
                breaker.record_failure().await;
            }
            Err(error)
        }
    }
}

/// Whether a failure should count against a breaker's `failureCount`.
pub fn counts_as_failure(error: &ContractError) -> bool {
    !matches!(error, ContractError::BreakerOpen { .. })
}
