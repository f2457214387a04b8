use crate::orchestrator::ReplicasetOrchestrator;
use crate::topology::Orchestrator;

/// CustomOrchestrator covers clusters assembled without an orchestrator. Their topology can be
/// discovered, but there is nothing to drive actions through.
pub struct CustomOrchestrator {
    _logger: slog::Logger,
}

impl CustomOrchestrator {
    pub fn new(logger: slog::Logger) -> Self {
        CustomOrchestrator { _logger: logger }
    }
}

#[async_trait::async_trait]
impl ReplicasetOrchestrator for CustomOrchestrator {
    fn orchestrator(&self) -> Orchestrator {
        Orchestrator::Custom
    }
}
