use crate::connect::{EvalOptions, Evaluator};
use crate::discovery::cconfig::{decode_replicaset_view, ReplicasetView};
use crate::discovery::{DiscoveryError, InstanceDiscoverer};
use crate::scripts;
use crate::topology::{Orchestrator, Replicasets};
use tokio::time::Duration;

/// CustomDiscoverer discovers the replicaset of an instance configured without any orchestrator.
#[derive(Clone, Default)]
pub struct CustomDiscoverer {
    pub timeout: Option<Duration>,
}

#[async_trait::async_trait]
impl InstanceDiscoverer for CustomDiscoverer {
    async fn discover_instance(&self, evaluator: &dyn Evaluator) -> Result<Replicasets, DiscoveryError> {
        let view: ReplicasetView = scripts::CUSTOM_TOPOLOGY
            .eval_decode(evaluator, vec![], EvalOptions::with_timeout(self.timeout))
            .await?;

        Ok(decode_replicaset_view(view, Orchestrator::Custom))
    }
}
