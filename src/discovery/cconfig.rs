use crate::connect::{EvalOptions, Evaluator};
use crate::discovery::{DiscoveryError, InstanceDiscoverer};
use crate::scripts::{self, lua_array};
use crate::topology::{recalculate_masters, Failover, Instance, Mode, Orchestrator, Replicaset, Replicasets, State};
use serde::Deserialize;
use tokio::time::Duration;

/// The view an instance reports about its own replicaset. Shared by the centralized config and
/// custom orchestrators.
#[derive(Deserialize)]
pub(super) struct ReplicasetView {
    uuid: String,
    #[serde(default)]
    leaderuuid: String,
    #[serde(default)]
    alias: String,
    #[serde(default)]
    failover: Option<String>,
    #[serde(default, deserialize_with = "lua_array")]
    instances: Vec<ViewInstance>,
    #[serde(default)]
    instanceuuid: String,
    #[serde(default)]
    instancerw: bool,
}

#[derive(Deserialize)]
struct ViewInstance {
    #[serde(default)]
    alias: String,
    uuid: String,
    #[serde(default)]
    uri: String,
}

pub(super) fn decode_replicaset_view(view: ReplicasetView, orchestrator: Orchestrator) -> Replicasets {
    let failover = view
        .failover
        .as_deref()
        .map(Failover::from_cconfig)
        .unwrap_or(Failover::Unknown);

    let instance_uuid = view.instanceuuid;
    let instance_rw = view.instancerw;
    let instances = view
        .instances
        .into_iter()
        .map(|inst| {
            let mode = if !inst.uuid.is_empty() && inst.uuid == instance_uuid {
                Mode::from_rw(instance_rw)
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
        .collect();

    let mut discovered = Replicasets {
        state: State::Bootstrapped,
        orchestrator,
        replicasets: vec![Replicaset {
            uuid: view.uuid,
            leader_uuid: view.leaderuuid,
            alias: view.alias,
            failover,
            instances,
            ..Replicaset::default()
        }],
    };
    recalculate_masters(&mut discovered);
    discovered
}

/// CConfigDiscoverer discovers the replicaset of an instance managed by a centralized
/// configuration.
#[derive(Clone, Default)]
pub struct CConfigDiscoverer {
    pub timeout: Option<Duration>,
}

#[async_trait::async_trait]
impl InstanceDiscoverer for CConfigDiscoverer {
    async fn discover_instance(&self, evaluator: &dyn Evaluator) -> Result<Replicasets, DiscoveryError> {
        let view: ReplicasetView = scripts::CCONFIG_TOPOLOGY
            .eval_decode(evaluator, vec![], EvalOptions::with_timeout(self.timeout))
            .await?;

        Ok(decode_replicaset_view(view, Orchestrator::CentralizedConfig))
    }
}
