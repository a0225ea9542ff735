use std::fmt;
use std::sync::Arc;

use uom_config::UomConfig;
use uom_core::dispatch_gate::GateServices;
use uom_core::orchestrator::Orchestrator;

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    pub config: Arc<UomConfig>,
    /// Pattern cache/executor handles the dispatch gate consults for its
    /// unknown-MIME cache-hit short circuit, ahead of any `Job` existing.
    pub gate_services: GateServices,
}

impl fmt::Debug for AppState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppState").finish_non_exhaustive()
    }
}
