//! Topology actions, implemented once per orchestrator.
mod cartridge;
mod cconfig;
mod custom;
mod requests;
mod target;

pub use cartridge::CartridgeOrchestrator;
pub use cartridge::ReplicasetTemplate;
pub use cconfig::CConfigOrchestrator;
pub use cconfig::ChangeStrategy;
pub use custom::CustomOrchestrator;
pub use requests::BootstrapRequest;
pub use requests::DemoteRequest;
pub use requests::ExpelRequest;
pub use requests::PromoteRequest;
pub use requests::RolesChangeRequest;
pub use requests::VShardBootstrapRequest;
pub use target::Scope;
pub use target::Target;

use crate::connect::{ConnectError, FanoutError};
use crate::discovery::DiscoveryError;
use crate::patch::PatchError;
use crate::scripts::QueryError;
use crate::topology::{Failover, Orchestrator, Replicasets, RolesError};
use std::io;
use std::path::PathBuf;
use tokio::time::Duration;

/// ReplicasetOrchestrator is the capability set shared by every orchestrator. An orchestrator
/// overrides the actions it supports, the rest report `ActionError::Unsupported`.
#[async_trait::async_trait]
pub trait ReplicasetOrchestrator: Send + Sync {
    fn orchestrator(&self) -> Orchestrator;

    async fn discover(&self, target: &Target<'_>, timeout: Option<Duration>) -> Result<Replicasets, ActionError> {
        Ok(target.discover(self.orchestrator(), timeout).await?)
    }

    async fn promote(&self, target: &Target<'_>, _req: &PromoteRequest) -> Result<(), ActionError> {
        Err(unsupported(self.orchestrator(), target, "promote"))
    }

    async fn demote(&self, target: &Target<'_>, _req: &DemoteRequest) -> Result<(), ActionError> {
        Err(unsupported(self.orchestrator(), target, "demote"))
    }

    async fn expel(&self, target: &Target<'_>, _req: &ExpelRequest) -> Result<(), ActionError> {
        Err(unsupported(self.orchestrator(), target, "expel"))
    }

    async fn roles_change(&self, target: &Target<'_>, _req: &RolesChangeRequest) -> Result<(), ActionError> {
        Err(unsupported(self.orchestrator(), target, "roles change"))
    }

    async fn bootstrap_vshard(&self, target: &Target<'_>, _req: &VShardBootstrapRequest) -> Result<(), ActionError> {
        Err(unsupported(self.orchestrator(), target, "vshard bootstrap"))
    }

    async fn bootstrap(&self, target: &Target<'_>, _req: &BootstrapRequest) -> Result<(), ActionError> {
        Err(unsupported(self.orchestrator(), target, "bootstrap"))
    }
}

pub(crate) fn unsupported(orchestrator: Orchestrator, target: &Target<'_>, action: &'static str) -> ActionError {
    ActionError::Unsupported {
        orchestrator,
        scope: target.scope(),
        action,
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ActionError {
    #[error("{action} is not supported by {orchestrator} orchestrator for {scope}")]
    Unsupported {
        orchestrator: Orchestrator,
        scope: Scope,
        action: &'static str,
    },

    #[error("{action} is not supported for failover {failover}")]
    UnsupportedFailover { action: &'static str, failover: Failover },

    #[error("unknown orchestrator {0}")]
    UnknownOrchestrator(Orchestrator),

    #[error("instance {0:?} not found")]
    InstanceNotFound(String),

    #[error("replicaset {0:?} not found")]
    ReplicasetNotFound(String),

    #[error("instance {0:?} is not running locally")]
    InstanceNotLocal(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("no router instance bootstrapped vshard")]
    NoVShardRouter,

    #[error("failed to read {path:?}")]
    ReplicasetsFile {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse {path:?}")]
    ReplicasetsFileFormat {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to connect to instance {instance}")]
    Connect {
        instance: String,
        #[source]
        source: ConnectError,
    },

    #[error(transparent)]
    Discovery(#[from] DiscoveryError),

    #[error(transparent)]
    Query(#[from] QueryError),

    #[error(transparent)]
    Fanout(#[from] FanoutError),

    #[error(transparent)]
    Patch(#[from] PatchError),

    #[error(transparent)]
    Roles(#[from] RolesError),
}

/// `new_orchestrator()` picks the implementation for an orchestrator tag. Only the centralized
/// config orchestrator uses `strategy`.
pub fn new_orchestrator(
    logger: slog::Logger,
    orchestrator: Orchestrator,
    strategy: ChangeStrategy,
) -> Result<Box<dyn ReplicasetOrchestrator>, ActionError> {
    match orchestrator {
        Orchestrator::Cartridge => Ok(Box::new(CartridgeOrchestrator::new(logger))),
        Orchestrator::CentralizedConfig => Ok(Box::new(CConfigOrchestrator::new(logger, strategy))),
        Orchestrator::Custom => Ok(Box::new(CustomOrchestrator::new(logger))),
        Orchestrator::Unknown => Err(ActionError::UnknownOrchestrator(orchestrator)),
    }
}
