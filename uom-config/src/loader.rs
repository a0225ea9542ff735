use std::time::Duration;

use config::{Config as RawConfig, Environment};
use uom_model::breaker::BreakerConfig;

use crate::error::Result;
use crate::model::{
    DownstreamServicesConfig, OrchestratorConfig, PatternCacheConfig, ServerConfig, StorageConfig,
    UomConfig,
};

/// Loads [`UomConfig`] from environment variables, falling back to the
/// documented defaults for anything unset. All fields are optional; a bare
/// environment with nothing set yields a fully-functional fallback-only
/// configuration (no downstream service URLs, fallback heuristics only).
pub struct ConfigLoader {
    prefix: String,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self { prefix: "UOM".into() }
    }

    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self { prefix: prefix.into() }
    }

    pub fn load(&self) -> Result<UomConfig> {
        let raw = RawConfig::builder()
            .add_source(Environment::with_prefix(&self.prefix).separator("__"))
            .build()?;

        let config = UomConfig {
            server: ServerConfig {
                host: raw.get_string("server.host").unwrap_or_else(|_| ServerConfig::default().host),
                port: raw.get_int("server.port").map(|p| p as u16).unwrap_or_else(|_| ServerConfig::default().port),
            },
            orchestrator: OrchestratorConfig {
                job_timeout_ms: raw
                    .get_int("orchestrator.job_timeout_ms")
                    .map(|v| v as u64)
                    .unwrap_or_else(|_| OrchestratorConfig::default().job_timeout_ms),
                sandbox_timeout_ms: raw
                    .get_int("orchestrator.sandbox_timeout_ms")
                    .map(|v| v as u64)
                    .unwrap_or_else(|_| OrchestratorConfig::default().sandbox_timeout_ms),
                max_concurrent_jobs: raw
                    .get_int("orchestrator.max_concurrent_jobs")
                    .map(|v| v as usize)
                    .unwrap_or_else(|_| OrchestratorConfig::default().max_concurrent_jobs),
                janitor_interval_secs: raw
                    .get_int("orchestrator.janitor_interval_secs")
                    .map(|v| v as u64)
                    .unwrap_or_else(|_| OrchestratorConfig::default().janitor_interval_secs),
            },
            breaker: BreakerConfig {
                failure_threshold: raw
                    .get_int("breaker.failure_threshold")
                    .map(|v| v as u32)
                    .unwrap_or_else(|_| BreakerConfig::default().failure_threshold),
                success_threshold: raw
                    .get_int("breaker.success_threshold")
                    .map(|v| v as u32)
                    .unwrap_or_else(|_| BreakerConfig::default().success_threshold),
                open_timeout: raw
                    .get_int("breaker.open_timeout_secs")
                    .map(|v| Duration::from_secs(v as u64))
                    .unwrap_or_else(|_| BreakerConfig::default().open_timeout),
            },
            services: DownstreamServicesConfig {
                cyberagent_url: raw.get_string("services.cyberagent_url").ok(),
                videoagent_url: raw.get_string("services.videoagent_url").ok(),
                geoagent_url: raw.get_string("services.geoagent_url").ok(),
                github_manager_url: raw.get_string("services.github_manager_url").ok(),
                mageagent_url: raw.get_string("services.mageagent_url").ok(),
                internal_api_key: raw.get_string("services.internal_api_key").ok(),
            },
            storage: StorageConfig {
                postgres_url: raw.get_string("storage.postgres_url").ok(),
                qdrant_url: raw.get_string("storage.qdrant_url").ok(),
                graphrag_url: raw.get_string("storage.graphrag_url").ok(),
            },
            pattern_cache: PatternCacheConfig {
                database_url: raw.get_string("pattern_cache.database_url").ok(),
                min_success_rate: raw
                    .get_float("pattern_cache.min_success_rate")
                    .unwrap_or_else(|_| PatternCacheConfig::default().min_success_rate),
            },
        };

        config.validate()?;
        Ok(config)
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_documented_defaults_when_environment_is_empty() {
        let loader = ConfigLoader::with_prefix("UOM_TEST_EMPTY_PREFIX_DOES_NOT_EXIST");
        let config = loader.load().expect("defaults alone must validate");
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.orchestrator.max_concurrent_jobs, 50);
        assert_eq!(config.breaker.failure_threshold, 3);
        assert!(config.services.cyberagent_url.is_none());
    }
}
