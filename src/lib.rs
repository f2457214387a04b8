mod connect;
mod discovery;
mod orchestrator;
mod patch;
mod scripts;
mod topology;
mod upgrade;

#[cfg(test)]
mod test_utils;

pub use connect::ConnectError;
pub use connect::Connector;
pub use connect::EvalError;
pub use connect::EvalFanout;
pub use connect::EvalOptions;
pub use connect::Evaluator;
pub use connect::FanoutError;
pub use connect::Flow;
pub use connect::InstanceCtx;
pub use connect::InstanceEval;
pub use connect::PushCallback;
pub use discovery::discover_application;
pub use discovery::discover_application_with;
pub use discovery::discover_cached;
pub use discovery::discover_instance;
pub use discovery::get_application_orchestrator;
pub use discovery::get_instance_orchestrator;
pub use discovery::CConfigDiscoverer;
pub use discovery::CartridgeDiscoverer;
pub use discovery::CustomDiscoverer;
pub use discovery::DiscoveryError;
pub use discovery::DiscoveryOptions;
pub use discovery::InstanceDiscoverer;
pub use discovery::TopologyCache;
pub use orchestrator::new_orchestrator;
pub use orchestrator::ActionError;
pub use orchestrator::BootstrapRequest;
pub use orchestrator::CConfigOrchestrator;
pub use orchestrator::CartridgeOrchestrator;
pub use orchestrator::ChangeStrategy;
pub use orchestrator::CustomOrchestrator;
pub use orchestrator::DemoteRequest;
pub use orchestrator::ExpelRequest;
pub use orchestrator::PromoteRequest;
pub use orchestrator::ReplicasetOrchestrator;
pub use orchestrator::ReplicasetTemplate;
pub use orchestrator::RolesChangeRequest;
pub use orchestrator::Scope;
pub use orchestrator::Target;
pub use orchestrator::VShardBootstrapRequest;
pub use patch::get_cconfig_path_depth;
pub use patch::sort_patch_targets;
pub use patch::CollectError;
pub use patch::DataCollector;
pub use patch::DataPublisher;
pub use patch::FileConfigStore;
pub use patch::KeyPicker;
pub use patch::PatchAction;
pub use patch::PatchEngine;
pub use patch::PatchError;
pub use patch::PatchOutcome;
pub use patch::PatchTarget;
pub use patch::PickError;
pub use patch::PublishError;
pub use patch::RawDocument;
pub use patch::RolesScope;
pub use patch::TopCandidatePicker;
pub use scripts::Query;
pub use scripts::QueryError;
pub use topology::change_roles;
pub use topology::merge_replicasets;
pub use topology::recalculate_master;
pub use topology::recalculate_masters;
pub use topology::Failover;
pub use topology::Instance;
pub use topology::Master;
pub use topology::Mode;
pub use topology::Orchestrator;
pub use topology::Replicaset;
pub use topology::Replicasets;
pub use topology::RoleOp;
pub use topology::RolesError;
pub use topology::State;
pub use topology::StateProvider;
pub use topology::TopologyMerger;
pub use upgrade::validate_version;
pub use upgrade::SchemaChange;
pub use upgrade::UpgradeError;
pub use upgrade::UpgradeOptions;
pub use upgrade::Upgrader;

// `crate::{root_mod}` holds only `mod` and `pub use` statements, and no `mod` is `pub`. Each
// module exports its types individually, which leaves its internal layout free to change.
