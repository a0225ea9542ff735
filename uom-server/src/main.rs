//! # UOM Server
//!
//! HTTP API for the Unified Orchestration Monitor: a sandbox-first file
//! processing orchestrator that sequences uploaded or referenced files
//! through triage, sandbox analysis, security assessment, routing,
//! processing, and post-processing, consulting an LLM-backed decision
//! engine and a learned pattern cache along the way.
//!
//! ## Architecture
//!
//! Built on Axum, backed by:
//! - PostgreSQL for the pattern cache
//! - CyberAgent/VideoAgent/GeoAgent/GitHubManager/MageAgent as downstream
//!   analysis services, reached over HTTP with per-service circuit breakers

pub mod errors;
pub mod handlers;
pub mod infra;
pub mod routes;

#[cfg(test)]
mod tests;

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use uom_config::{ConfigLoader, UomConfig};
use uom_contracts::external_client::{PollPolicy, ScanProtocolClient, StorageSinkClient, SyncAnalyzeClient};
use uom_contracts::pattern_cache::{PatternCache, PatternExecutor};
use uom_core::clients::{HttpStorageSink, RemoteAnalyzeClient, RemoteScanClient};
use uom_core::decision_engine::LlmDecisionEngine;
use uom_core::orchestrator::{Orchestrator, OrchestratorServices, OrchestratorTimeouts};
use uom_core::pattern_cache::SqlxPatternCache;
use uom_core::pattern_executor::MageAgentPatternExecutor;
use uom_model::decision::{RouteTarget, StorageSink};

use infra::app_state::AppState;

#[derive(Parser, Debug)]
#[command(name = "uom-server")]
#[command(about = "Sandbox-first file processing orchestrator")]
struct Args {
    #[arg(short, long, env = "UOM_SERVER__PORT")]
    port: Option<u16>,

    #[arg(long, env = "UOM_SERVER__HOST")]
    host: Option<String>,
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "uom_server=info,uom_core=info,tower_http=info".into()))
        .with(tracing_subscriber::fmt::layer().json())
        .init();
}

/// Builds the scan-protocol clients for the four services that share that
/// contract; a service with no configured URL is simply absent from the map,
/// and the route/dispatch fallbacks already handle that gracefully.
fn build_scan_targets(config: &UomConfig) -> HashMap<RouteTarget, Arc<dyn ScanProtocolClient>> {
    let mut targets: HashMap<RouteTarget, Arc<dyn ScanProtocolClient>> = HashMap::new();
    let key = config.services.internal_api_key.clone();
    if let Some(url) = &config.services.cyberagent_url {
        targets.insert(RouteTarget::CyberAgent, Arc::new(RemoteScanClient::cyberagent(url, key.clone())));
    }
    if let Some(url) = &config.services.videoagent_url {
        targets.insert(RouteTarget::VideoAgent, Arc::new(RemoteScanClient::videoagent(url, key.clone())));
    }
    if let Some(url) = &config.services.geoagent_url {
        targets.insert(RouteTarget::GeoAgent, Arc::new(RemoteScanClient::geoagent(url, key.clone())));
    }
    if let Some(url) = &config.services.github_manager_url {
        targets.insert(RouteTarget::GitHubManager, Arc::new(RemoteScanClient::github_manager(url, key.clone())));
    }
    targets
}

fn build_sync_targets(config: &UomConfig) -> HashMap<RouteTarget, Arc<dyn SyncAnalyzeClient>> {
    let mut targets: HashMap<RouteTarget, Arc<dyn SyncAnalyzeClient>> = HashMap::new();
    if let Some(url) = &config.services.mageagent_url {
        targets.insert(
            RouteTarget::MageAgent,
            Arc::new(RemoteAnalyzeClient::mageagent(url, config.services.internal_api_key.clone())),
        );
    }
    targets
}

fn build_storage_sinks(config: &UomConfig) -> HashMap<StorageSink, Arc<dyn StorageSinkClient>> {
    let mut sinks: HashMap<StorageSink, Arc<dyn StorageSinkClient>> = HashMap::new();
    let key = config.services.internal_api_key.clone();
    if let Some(url) = &config.storage.postgres_url {
        sinks.insert(StorageSink::Postgres, Arc::new(HttpStorageSink::postgres(url, key.clone())));
    }
    if let Some(url) = &config.storage.qdrant_url {
        sinks.insert(StorageSink::Qdrant, Arc::new(HttpStorageSink::qdrant(url, key.clone())));
    }
    if let Some(url) = &config.storage.graphrag_url {
        sinks.insert(StorageSink::GraphRag, Arc::new(HttpStorageSink::graphrag(url, key.clone())));
    }
    sinks
}

/// Falls back to a CyberAgent-less sandbox client only when no sandbox
/// service is configured at all; every deployment should set
/// `UOM_SERVICES__CYBERAGENT_URL` in practice since Stage 2 always invokes it.
fn sandbox_client(scan_targets: &HashMap<RouteTarget, Arc<dyn ScanProtocolClient>>) -> Option<Arc<dyn ScanProtocolClient>> {
    scan_targets.get(&RouteTarget::CyberAgent).cloned()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    init_tracing();
    let args = Args::parse();

    let mut config = ConfigLoader::new().load()?;
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(host) = args.host {
        config.server.host = host;
    }
    let config = Arc::new(config);

    let scan_targets = build_scan_targets(&config);
    let sync_targets = build_sync_targets(&config);
    let storage_sinks = build_storage_sinks(&config);

    let sandbox_client = sandbox_client(&scan_targets)
        .ok_or_else(|| anyhow::anyhow!("UOM_SERVICES__CYBERAGENT_URL must be set: Stage 2 (Sandbox) has no client to call"))?;

    let pattern_cache: Option<Arc<dyn PatternCache>> = match &config.pattern_cache.database_url {
        Some(url) => {
            let pool = sqlx::postgres::PgPoolOptions::new().max_connections(10).connect(url).await?;
            let cache = SqlxPatternCache::new(pool);
            cache.migrate().await.map_err(|e| anyhow::anyhow!(e))?;
            Some(Arc::new(cache))
        }
        None => {
            info!("no pattern_cache.database_url configured; running without a pattern cache");
            None
        }
    };

    let pattern_executor: Option<Arc<dyn PatternExecutor>> = sync_targets
        .get(&RouteTarget::MageAgent)
        .cloned()
        .map(|client| Arc::new(MageAgentPatternExecutor::new(client)) as Arc<dyn PatternExecutor>);

    let primary_llm = sync_targets.get(&RouteTarget::MageAgent).cloned();
    let decision_engine = Arc::new(LlmDecisionEngine::new(primary_llm, None, pattern_cache.clone()));

    let gate_services = uom_core::dispatch_gate::GateServices {
        pattern_cache: pattern_cache.clone(),
        pattern_executor: pattern_executor.clone(),
    };

    let timeouts = OrchestratorTimeouts::from(&config.orchestrator);
    let services = OrchestratorServices {
        decision_engine,
        sandbox_client,
        sandbox_poll_policy: PollPolicy::scan_default(),
        scan_targets,
        sync_targets,
        pattern_cache,
        pattern_executor,
        storage_sinks,
    };
    let orchestrator = Arc::new(Orchestrator::new(services, timeouts, config.orchestrator.max_concurrent_jobs));
    orchestrator.spawn_janitor();

    let state = AppState { orchestrator, config: config.clone(), gate_services };

    let app = routes::create_api_router().with_state(state).layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    info!(%addr, "uom-server listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
