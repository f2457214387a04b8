mod master;
mod merge;
mod roles;
mod types;

pub use master::recalculate_master;
pub use master::recalculate_masters;
pub use merge::merge_replicasets;
pub use merge::TopologyMerger;
pub use types::Failover;
pub use types::Instance;
pub use types::Master;
pub use types::Mode;
pub use types::Orchestrator;
pub use types::Replicaset;
pub use types::Replicasets;
pub use types::State;
pub use types::StateProvider;
pub use roles::change_roles;
pub use roles::RoleOp;
pub use roles::RolesError;
