use crate::connect::{EvalFanout, Evaluator, Flow, InstanceCtx, InstanceEval};
use crate::discovery::{DiscoveryError, InstanceDiscoverer};
use crate::topology::{Replicasets, TopologyMerger};

struct ViewCollector<'a> {
    discoverer: &'a dyn InstanceDiscoverer,
    merger: TopologyMerger,
}

#[async_trait::async_trait]
impl<'a> InstanceEval for ViewCollector<'a> {
    type Error = DiscoveryError;

    async fn eval(&mut self, _ctx: &InstanceCtx, evaluator: &dyn Evaluator) -> Result<Flow, DiscoveryError> {
        let view = self.discoverer.discover_instance(evaluator).await?;
        self.merger.add(view);
        Ok(Flow::Continue)
    }
}

/// `discover_application_with()` queries every reachable instance of an application with the
/// given discoverer and merges the partial views. Discovered instances get the runtime
/// descriptor with the same name attached.
pub async fn discover_application_with(
    fanout: &EvalFanout<'_>,
    instances: &[InstanceCtx],
    discoverer: &dyn InstanceDiscoverer,
) -> Result<Replicasets, DiscoveryError> {
    let mut collector = ViewCollector {
        discoverer,
        merger: TopologyMerger::new(),
    };
    fanout.for_each_reachable(instances, &mut collector).await?;

    let mut discovered = collector.merger.finish();
    attach_contexts(&mut discovered, instances);
    Ok(discovered)
}

fn attach_contexts(discovered: &mut Replicasets, instances: &[InstanceCtx]) {
    for replicaset in discovered.replicasets.iter_mut() {
        for instance in replicaset.instances.iter_mut() {
            if instance.ctx.is_some() {
                continue;
            }
            instance.ctx = instances
                .iter()
                .find(|ctx| ctx.instance_name == instance.alias)
                .cloned();
        }
    }
}
