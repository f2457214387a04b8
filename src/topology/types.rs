use crate::connect::InstanceCtx;
use std::fmt;

/// Mode is the read-write mode of a single instance as observed during discovery.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum Mode {
    Unknown,
    Read,
    RW,
}

impl Default for Mode {
    fn default() -> Self {
        Mode::Unknown
    }
}

impl Mode {
    pub fn from_rw(rw: bool) -> Self {
        if rw {
            Mode::RW
        } else {
            Mode::Read
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Unknown => write!(f, "unknown"),
            Mode::Read => write!(f, "read"),
            Mode::RW => write!(f, "rw"),
        }
    }
}

/// Master is the aggregated leadership status of a replicaset. It is derived from the members'
/// modes by `recalculate_master()` and never assigned directly.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum Master {
    Unknown,
    No,
    Single,
    Multi,
}

impl Default for Master {
    fn default() -> Self {
        Master::Unknown
    }
}

/// Failover is the policy by which a replicaset's leadership changes.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum Failover {
    Unknown,
    Off,
    Manual,
    Eventual,
    Election,
    Stateful,
    Supervised,
}

impl Default for Failover {
    fn default() -> Self {
        Failover::Unknown
    }
}

impl Failover {
    /// Parses a failover name as reported by the centralized configuration scheme.
    pub fn from_cconfig(name: &str) -> Self {
        match name {
            "off" => Failover::Off,
            "manual" => Failover::Manual,
            "election" => Failover::Election,
            "supervised" => Failover::Supervised,
            _ => Failover::Unknown,
        }
    }

    /// Parses a failover name as reported by cartridge.
    pub fn from_cartridge(name: &str) -> Self {
        match name {
            "disabled" => Failover::Off,
            "eventual" => Failover::Eventual,
            "stateful" => Failover::Stateful,
            "raft" => Failover::Election,
            _ => Failover::Unknown,
        }
    }
}

impl fmt::Display for Failover {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Failover::Unknown => "unknown",
            Failover::Off => "off",
            Failover::Manual => "manual",
            Failover::Eventual => "eventual",
            Failover::Election => "election",
            Failover::Stateful => "stateful",
            Failover::Supervised => "supervised",
        };
        write!(f, "{}", name)
    }
}

/// StateProvider is the external state storage used by stateful failover.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum StateProvider {
    Unknown,
    None,
    Tarantool,
    Etcd2,
}

impl Default for StateProvider {
    fn default() -> Self {
        StateProvider::Unknown
    }
}

impl StateProvider {
    pub fn from_name(name: &str) -> Self {
        match name {
            "none" => StateProvider::None,
            "tarantool" => StateProvider::Tarantool,
            "etcd2" => StateProvider::Etcd2,
            _ => StateProvider::Unknown,
        }
    }
}

/// Orchestrator identifies the cluster-management scheme used by the managed instances.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum Orchestrator {
    Unknown,
    Cartridge,
    CentralizedConfig,
    Custom,
}

impl Default for Orchestrator {
    fn default() -> Self {
        Orchestrator::Unknown
    }
}

impl Orchestrator {
    /// Parses the name returned by the orchestrator probe query.
    pub fn from_probe(name: &str) -> Self {
        match name {
            "cartridge" => Orchestrator::Cartridge,
            "centralized config" => Orchestrator::CentralizedConfig,
            "custom" => Orchestrator::Custom,
            _ => Orchestrator::Unknown,
        }
    }
}

impl fmt::Display for Orchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Orchestrator::Unknown => "unknown",
            Orchestrator::Cartridge => "cartridge",
            Orchestrator::CentralizedConfig => "centralized config",
            Orchestrator::Custom => "custom",
        };
        write!(f, "{}", name)
    }
}

/// State is the overall bootstrap state of the cluster.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum State {
    Unknown,
    Uninitialized,
    Bootstrapped,
}

impl Default for State {
    fn default() -> Self {
        State::Unknown
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Instance {
    pub alias: String,
    pub uuid: String,
    pub uri: String,
    pub mode: Mode,
    /// Present only when the instance is reachable through a local runtime descriptor.
    pub ctx: Option<InstanceCtx>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Replicaset {
    pub uuid: String,
    pub leader_uuid: String,
    pub alias: String,
    pub roles: Vec<String>,
    pub vshard_group: String,
    pub master: Master,
    pub failover: Failover,
    pub state_provider: StateProvider,
    pub instances: Vec<Instance>,
}

impl Replicaset {
    pub fn instance_by_alias(&self, alias: &str) -> Option<&Instance> {
        self.instances.iter().find(|inst| inst.alias == alias)
    }
}

/// Replicasets is the canonical output of discovery and the input of every action.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Replicasets {
    pub state: State,
    pub orchestrator: Orchestrator,
    pub replicasets: Vec<Replicaset>,
}

impl Replicasets {
    /// Returns the replicaset and instance with the given alias.
    pub fn find_instance(&self, alias: &str) -> Option<(&Replicaset, &Instance)> {
        self.replicasets
            .iter()
            .find_map(|rs| rs.instance_by_alias(alias).map(|inst| (rs, inst)))
    }

    pub fn replicaset_by_alias(&self, alias: &str) -> Option<&Replicaset> {
        self.replicasets.iter().find(|rs| rs.alias == alias)
    }
}
