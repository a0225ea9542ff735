use uom_model::breaker::BreakerConfig;

use crate::error::{ConfigLoadError, Result};

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 8080,
        }
    }
}

/// Wall-clock bounds and backpressure hints for the orchestrator.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub job_timeout_ms: u64,
    pub sandbox_timeout_ms: u64,
    pub max_concurrent_jobs: usize,
    pub janitor_interval_secs: u64,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            job_timeout_ms: 5 * 60 * 1_000,
            sandbox_timeout_ms: 2 * 60 * 1_000,
            max_concurrent_jobs: 50,
            janitor_interval_secs: 60,
        }
    }
}

/// Base URLs and the shared internal API key for every downstream service
/// the dispatch gate/orchestrator can route to.
#[derive(Clone)]
pub struct DownstreamServicesConfig {
    pub cyberagent_url: Option<String>,
    pub videoagent_url: Option<String>,
    pub geoagent_url: Option<String>,
    pub github_manager_url: Option<String>,
    pub mageagent_url: Option<String>,
    pub internal_api_key: Option<String>,
}

impl std::fmt::Debug for DownstreamServicesConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DownstreamServicesConfig")
            .field("cyberagent_url", &self.cyberagent_url)
            .field("videoagent_url", &self.videoagent_url)
            .field("geoagent_url", &self.geoagent_url)
            .field("github_manager_url", &self.github_manager_url)
            .field("mageagent_url", &self.mageagent_url)
            .field("internal_api_key", &self.internal_api_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl Default for DownstreamServicesConfig {
    fn default() -> Self {
        Self {
            cyberagent_url: None,
            videoagent_url: None,
            geoagent_url: None,
            github_manager_url: None,
            mageagent_url: None,
            internal_api_key: None,
        }
    }
}

/// Opaque post-processing destinations.
#[derive(Debug, Clone, Default)]
pub struct StorageConfig {
    pub postgres_url: Option<String>,
    pub qdrant_url: Option<String>,
    pub graphrag_url: Option<String>,
}

/// Tuning for the pattern cache / learner.
#[derive(Debug, Clone)]
pub struct PatternCacheConfig {
    pub database_url: Option<String>,
    pub min_success_rate: f64,
}

impl Default for PatternCacheConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            min_success_rate: 0.80,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct UomConfig {
    pub server: ServerConfig,
    pub orchestrator: OrchestratorConfig,
    /// The breaker tuning triple shared as a baseline across every
    /// downstream service's circuit breaker. Per-service
    /// `open_timeout` defaults vary by criticality in `uom-core`; this is
    /// the operator-configurable override applied to all of them.
    pub breaker: BreakerConfig,
    pub services: DownstreamServicesConfig,
    pub storage: StorageConfig,
    pub pattern_cache: PatternCacheConfig,
}

impl UomConfig {
    /// Guards against nonsensical combinations the `config` crate's type
    /// coercion wouldn't itself catch.
    pub fn validate(&self) -> Result<()> {
        if self.orchestrator.max_concurrent_jobs == 0 {
            return Err(ConfigLoadError::Invalid {
                field: "orchestrator.max_concurrent_jobs".into(),
                message: "must be greater than zero".into(),
            });
        }
        if self.orchestrator.sandbox_timeout_ms > self.orchestrator.job_timeout_ms {
            return Err(ConfigLoadError::Invalid {
                field: "orchestrator.sandbox_timeout_ms".into(),
                message: "must not exceed orchestrator.job_timeout_ms".into(),
            });
        }
        if !(0.0..=1.0).contains(&self.pattern_cache.min_success_rate) {
            return Err(ConfigLoadError::Invalid {
                field: "pattern_cache.min_success_rate".into(),
                message: "must be within [0, 1]".into(),
            });
        }
        Ok(())
    }
}
