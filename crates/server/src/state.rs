use std::sync::Arc;
use scribe_core::{BatchOrchestrator, Config, SanitizedConfig};

/// Shared application state
pub struct AppState {
    config: Config,
    orchestrator: Arc<BatchOrchestrator>,
}

impl AppState {
    pub fn new(config: Config, orchestrator: Arc<BatchOrchestrator>) -> Self {
        Self {
            config,
            orchestrator,
        }
    }

    pub fn sanitized_config(&self) -> SanitizedConfig {
        SanitizedConfig::from(&self.config)
    }

    pub fn orchestrator(&self) -> &BatchOrchestrator {
        self.orchestrator.as_ref()
    }
}
