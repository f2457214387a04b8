use crate::connect::{EvalFanout, EvalOptions, Evaluator, Flow, InstanceCtx, InstanceEval};
use crate::discovery::{
    discover_application_with, CConfigDiscoverer, CartridgeDiscoverer, CustomDiscoverer, DiscoveryError,
    InstanceDiscoverer, TopologyCache,
};
use crate::scripts;
use crate::topology::{Orchestrator, Replicasets};
use tokio::time::Duration;

#[derive(Clone, Debug, Default)]
pub struct DiscoveryOptions {
    /// `Orchestrator::Unknown` probes the instances for the orchestrator in use.
    pub orchestrator: Orchestrator,
    pub timeout: Option<Duration>,
}

/// `get_instance_orchestrator()` asks an instance which orchestrator manages it.
pub async fn get_instance_orchestrator(
    evaluator: &dyn Evaluator,
    timeout: Option<Duration>,
) -> Result<Orchestrator, DiscoveryError> {
    let name: String = scripts::ORCHESTRATOR
        .eval_decode(evaluator, vec![], EvalOptions::with_timeout(timeout))
        .await?;

    match Orchestrator::from_probe(&name) {
        Orchestrator::Unknown => Err(DiscoveryError::UnknownOrchestrator(name)),
        orchestrator => Ok(orchestrator),
    }
}

struct OrchestratorProbe {
    timeout: Option<Duration>,
    found: Orchestrator,
}

#[async_trait::async_trait]
impl InstanceEval for OrchestratorProbe {
    type Error = DiscoveryError;

    async fn eval(&mut self, _ctx: &InstanceCtx, evaluator: &dyn Evaluator) -> Result<Flow, DiscoveryError> {
        self.found = get_instance_orchestrator(evaluator, self.timeout).await?;
        Ok(Flow::Stop)
    }
}

/// `get_application_orchestrator()` probes any one reachable instance of the application.
pub async fn get_application_orchestrator(
    fanout: &EvalFanout<'_>,
    instances: &[InstanceCtx],
    timeout: Option<Duration>,
) -> Result<Orchestrator, DiscoveryError> {
    let mut probe = OrchestratorProbe {
        timeout,
        found: Orchestrator::Unknown,
    };
    fanout.any(instances, &mut probe).await?;
    Ok(probe.found)
}

fn discoverer_for(
    orchestrator: Orchestrator,
    timeout: Option<Duration>,
) -> Result<Box<dyn InstanceDiscoverer>, DiscoveryError> {
    match orchestrator {
        Orchestrator::Cartridge => Ok(Box::new(CartridgeDiscoverer { timeout })),
        Orchestrator::CentralizedConfig => Ok(Box::new(CConfigDiscoverer { timeout })),
        Orchestrator::Custom => Ok(Box::new(CustomDiscoverer { timeout })),
        Orchestrator::Unknown => Err(DiscoveryError::UnknownOrchestrator(orchestrator.to_string())),
    }
}

/// `discover_instance()` discovers the topology visible from a single instance.
pub async fn discover_instance(
    evaluator: &dyn Evaluator,
    opts: &DiscoveryOptions,
) -> Result<Replicasets, DiscoveryError> {
    let orchestrator = match opts.orchestrator {
        Orchestrator::Unknown => get_instance_orchestrator(evaluator, opts.timeout).await?,
        forced => forced,
    };

    discoverer_for(orchestrator, opts.timeout)?
        .discover_instance(evaluator)
        .await
}

/// `discover_application()` discovers and merges the topology of every reachable instance.
pub async fn discover_application(
    fanout: &EvalFanout<'_>,
    instances: &[InstanceCtx],
    opts: &DiscoveryOptions,
) -> Result<Replicasets, DiscoveryError> {
    let orchestrator = match opts.orchestrator {
        Orchestrator::Unknown => get_application_orchestrator(fanout, instances, opts.timeout).await?,
        forced => forced,
    };

    let discoverer = discoverer_for(orchestrator, opts.timeout)?;
    discover_application_with(fanout, instances, discoverer.as_ref()).await
}

/// `discover_cached()` returns the application's cached topology unless `force` is set or
/// nothing has been cached yet. A fresh result replaces the cached one.
pub async fn discover_cached(
    cache: &mut TopologyCache,
    fanout: &EvalFanout<'_>,
    instances: &[InstanceCtx],
    opts: &DiscoveryOptions,
    force: bool,
) -> Result<Replicasets, DiscoveryError> {
    let app_name = instances.first().map(|ctx| ctx.app_name.as_str()).unwrap_or_default();
    if !force {
        if let Some(cached) = cache.get(app_name) {
            return Ok(cached.clone());
        }
    }

    let discovered = discover_application(fanout, instances, opts).await?;
    cache.insert(app_name, discovered.clone());
    Ok(discovered)
}
