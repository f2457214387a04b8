use crate::topology::RoleOp;
use std::path::PathBuf;
use tokio::time::Duration;

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct PromoteRequest {
    pub instance_name: String,
    /// Skips confirmations, e.g. the choice of a configuration source or cartridge's
    /// consistency check.
    pub force: bool,
    pub timeout: Option<Duration>,
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct DemoteRequest {
    pub instance_name: String,
    pub force: bool,
    pub timeout: Option<Duration>,
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ExpelRequest {
    pub instance_name: String,
    pub force: bool,
}

/// RolesChangeRequest adds or removes one role. The most general scope given wins:
/// `global`, then `instance_name`, then `replicaset_name`, then `group_name`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RolesChangeRequest {
    pub instance_name: String,
    pub group_name: String,
    pub replicaset_name: String,
    pub global: bool,
    pub role_name: String,
    pub op: RoleOp,
    pub force: bool,
    pub timeout: Option<Duration>,
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct VShardBootstrapRequest {
    pub timeout: Option<Duration>,
}

/// BootstrapRequest either creates the replicasets listed in `replicasets_file`, or joins
/// `instance_name` to the existing replicaset `replicaset_name` when both are set.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct BootstrapRequest {
    pub replicasets_file: Option<PathBuf>,
    pub timeout: Option<Duration>,
    pub bootstrap_vshard: bool,
    pub instance_name: String,
    pub replicaset_name: String,
}
