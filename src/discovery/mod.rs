//! Topology discovery for each supported orchestrator, and the façade that picks one.
mod application;
mod cache;
mod cartridge;
mod cconfig;
mod custom;
mod facade;

pub use application::discover_application_with;
pub use cache::TopologyCache;
pub use cartridge::CartridgeDiscoverer;
pub use cconfig::CConfigDiscoverer;
pub use custom::CustomDiscoverer;
pub use facade::discover_application;
pub use facade::DiscoveryOptions;
pub use facade::discover_cached;
pub use facade::discover_instance;
pub use facade::get_application_orchestrator;
pub use facade::get_instance_orchestrator;

use crate::connect::{Evaluator, FanoutError};
use crate::scripts::QueryError;
use crate::topology::Replicasets;

/// InstanceDiscoverer knows the one topology query of an orchestrator and how to decode its
/// response into the canonical model.
#[async_trait::async_trait]
pub trait InstanceDiscoverer: Send + Sync {
    async fn discover_instance(&self, evaluator: &dyn Evaluator) -> Result<Replicasets, DiscoveryError>;
}

#[derive(Debug, thiserror::Error)]
pub enum DiscoveryError {
    #[error(transparent)]
    Fanout(#[from] FanoutError),

    #[error(transparent)]
    Query(#[from] QueryError),

    #[error("unknown orchestrator {0:?}")]
    UnknownOrchestrator(String),
}
