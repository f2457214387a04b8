use crate::connect::{EvalOptions, Evaluator};
use crate::discovery::{DiscoveryError, InstanceDiscoverer};
use crate::scripts::{self, lua_array};
use crate::topology::{
    recalculate_masters, Failover, Instance, Mode, Orchestrator, Replicaset, Replicasets, State, StateProvider,
};
use serde::Deserialize;
use tokio::time::Duration;

#[derive(Deserialize)]
struct CartridgeTopology {
    #[serde(default)]
    failover: String,
    #[serde(default)]
    provider: String,
    #[serde(default, deserialize_with = "lua_array")]
    replicasets: Vec<CartridgeReplicaset>,
}

#[derive(Deserialize)]
struct CartridgeReplicaset {
    uuid: String,
    #[serde(default)]
    leaderuuid: String,
    #[serde(default)]
    alias: String,
    #[serde(default, deserialize_with = "lua_array")]
    roles: Vec<String>,
    #[serde(default)]
    vshard_group: String,
    #[serde(default, deserialize_with = "lua_array")]
    instances: Vec<CartridgeInstance>,
}

#[derive(Deserialize)]
struct CartridgeInstance {
    #[serde(default)]
    alias: String,
    uuid: String,
    #[serde(default)]
    uri: String,
}

#[derive(Deserialize)]
struct InstanceProbe {
    uuid: String,
    rw: bool,
}

/// CartridgeDiscoverer reads the whole cluster topology from any one cartridge instance. Only the
/// queried instance's own mode is known from a single view.
#[derive(Clone, Default)]
pub struct CartridgeDiscoverer {
    pub timeout: Option<Duration>,
}

#[async_trait::async_trait]
impl InstanceDiscoverer for CartridgeDiscoverer {
    async fn discover_instance(&self, evaluator: &dyn Evaluator) -> Result<Replicasets, DiscoveryError> {
        let opts = EvalOptions::with_timeout(self.timeout);
        let topology: CartridgeTopology = scripts::CARTRIDGE_TOPOLOGY
            .eval_decode(evaluator, vec![], opts.clone())
            .await?;
        let probe: InstanceProbe = scripts::CARTRIDGE_INSTANCE.eval_decode(evaluator, vec![], opts).await?;

        Ok(decode_topology(topology, &probe))
    }
}

fn decode_topology(topology: CartridgeTopology, probe: &InstanceProbe) -> Replicasets {
    let failover = Failover::from_cartridge(&topology.failover);
    let state_provider = StateProvider::from_name(&topology.provider);

    let state = if topology.replicasets.is_empty() {
        State::Uninitialized
    } else {
        State::Bootstrapped
    };

    let replicasets = topology
        .replicasets
        .into_iter()
        .map(|rs| Replicaset {
            uuid: rs.uuid,
            leader_uuid: rs.leaderuuid,
            alias: rs.alias,
            roles: rs.roles,
            vshard_group: rs.vshard_group,
            failover,
            state_provider,
            instances: rs
                .instances
                .into_iter()
                .map(|inst| {
                    let mode = if inst.uuid == probe.uuid {
                        Mode::from_rw(probe.rw)
                    } else {
                        Mode::Unknown
                    };
                    Instance {
                        alias: inst.alias,
                        uuid: inst.uuid,
                        uri: inst.uri,
                        mode,
                        ctx: None,
                    }
                })
                .collect(),
            ..Replicaset::default()
        })
        .collect();

    let mut discovered = Replicasets {
        state,
        orchestrator: Orchestrator::Cartridge,
        replicasets,
    };
    recalculate_masters(&mut discovered);
    discovered
}
