#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// The three states of a per-service circuit breaker.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

/// Tuning for a single breaker instance. One of these exists per external
/// service (CyberAgent, VideoAgent, GeoAgent, GitHubManager, MageAgent).
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct BreakerConfig {
    /// Consecutive failures in `Closed` before tripping to `Open`.
    pub failure_threshold: u32,
    /// Consecutive successes in `HalfOpen` before closing again.
    pub success_threshold: u32,
    /// How long an `Open` breaker waits before allowing a trial call
    /// (`HalfOpen`).
    pub open_timeout: std::time::Duration,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 2,
            open_timeout: std::time::Duration::from_secs(30),
        }
    }
}

/// Observable state of one breaker, as returned by status endpoints.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CircuitBreakerState {
    pub state: CircuitState,
    pub failure_count: u32,
    pub success_count: u32,
    pub last_failure_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl CircuitBreakerState {
    pub fn closed() -> Self {
        Self {
            state: CircuitState::Closed,
            failure_count: 0,
            success_count: 0,
            last_failure_at: None,
        }
    }
}

impl Default for CircuitBreakerState {
    fn default() -> Self {
        Self::closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_state_is_closed_with_zero_counters() {
        let state = CircuitBreakerState::default();
        assert_eq!(state.state, CircuitState::Closed);
        assert_eq!(state.failure_count, 0);
        assert!(state.last_failure_at.is_none());
    }

    #[test]
    fn default_config_matches_documented_defaults() {
        let config = BreakerConfig::default();
        assert_eq!(config.failure_threshold, 5);
        assert_eq!(config.success_threshold, 2);
        assert_eq!(config.open_timeout, std::time::Duration::from_secs(30));
    }
}
