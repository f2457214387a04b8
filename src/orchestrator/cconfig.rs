use crate::connect::{EvalOptions, Evaluator, Flow, InstanceCtx, InstanceEval};
use crate::orchestrator::{
    unsupported, ActionError, DemoteRequest, ExpelRequest, PromoteRequest, ReplicasetOrchestrator, RolesChangeRequest,
    Target, VShardBootstrapRequest,
};
use crate::patch::{PatchAction, PatchEngine, PatchOutcome, RolesScope};
use crate::scripts;
use crate::topology::{Failover, Orchestrator};
use tokio::time::Duration;

/// ChangeStrategy selects how leadership and membership changes reach a centrally configured
/// cluster.
pub enum ChangeStrategy {
    /// Leadership changes run directly on the instances. Only election failover allows it, and
    /// membership and roles cannot be changed this way.
    Direct,
    /// Every change is written to the cluster configuration.
    ConfigPatch(PatchEngine),
}

/// CConfigOrchestrator manages clusters whose topology comes from a centralized configuration.
pub struct CConfigOrchestrator {
    logger: slog::Logger,
    strategy: ChangeStrategy,
}

struct RouterBootstrap {
    timeout: Option<Duration>,
    bootstrapped: bool,
}

#[async_trait::async_trait]
impl InstanceEval for RouterBootstrap {
    type Error = ActionError;

    async fn eval(&mut self, _ctx: &InstanceCtx, evaluator: &dyn Evaluator) -> Result<Flow, ActionError> {
        self.bootstrapped = scripts::CCONFIG_BOOTSTRAP_VSHARD
            .eval_decode(evaluator, vec![], EvalOptions::with_timeout(self.timeout))
            .await?;
        Ok(if self.bootstrapped { Flow::Stop } else { Flow::Continue })
    }
}

fn roles_scope(req: &RolesChangeRequest) -> Result<RolesScope, ActionError> {
    let non_empty = |name: &str| if name.is_empty() { None } else { Some(name.to_string()) };

    if req.global {
        Ok(RolesScope::Global)
    } else if let Some(instance) = non_empty(&req.instance_name) {
        Ok(RolesScope::Instance(instance))
    } else if let Some(replicaset) = non_empty(&req.replicaset_name) {
        Ok(RolesScope::Replicaset {
            group: non_empty(&req.group_name),
            replicaset,
        })
    } else if let Some(group) = non_empty(&req.group_name) {
        Ok(RolesScope::Group(group))
    } else {
        Err(ActionError::InvalidRequest(
            "a roles change needs the global flag, an instance, a replicaset or a group".to_string(),
        ))
    }
}

impl CConfigOrchestrator {
    pub fn new(logger: slog::Logger, strategy: ChangeStrategy) -> Self {
        CConfigOrchestrator { logger, strategy }
    }

    async fn patch(
        &self,
        target: &Target<'_>,
        action: PatchAction,
        force: bool,
    ) -> Result<PatchOutcome, ActionError> {
        match &self.strategy {
            ChangeStrategy::ConfigPatch(engine) => {
                let outcome = engine.patch(&action, force).await?;
                slog::info!(
                    self.logger,
                    "Published {:?} to {} at revision {}",
                    action,
                    outcome.key,
                    outcome.revision
                );
                Ok(outcome)
            }
            ChangeStrategy::Direct => {
                let action = match action {
                    PatchAction::Expel { .. } => "expel",
                    PatchAction::Roles { .. } => "roles change",
                    PatchAction::Promote { .. } => "promote",
                    PatchAction::Demote { .. } => "demote",
                };
                Err(unsupported(self.orchestrator(), target, action))
            }
        }
    }

    /// Changes leadership on the instance itself, legal only while the replicaset elects its
    /// leader.
    async fn change_leader_directly(
        &self,
        target: &Target<'_>,
        instance_name: &str,
        promote: bool,
        timeout: Option<Duration>,
    ) -> Result<(), ActionError> {
        let action = if promote { "promote" } else { "demote" };
        let topology = target.discover(Orchestrator::CentralizedConfig, timeout).await?;
        let (replicaset, instance) = topology
            .find_instance(instance_name)
            .ok_or_else(|| ActionError::InstanceNotFound(instance_name.to_string()))?;

        if replicaset.failover != Failover::Election {
            return Err(ActionError::UnsupportedFailover {
                action,
                failover: replicaset.failover,
            });
        }

        let query = if promote {
            &scripts::BOX_PROMOTE
        } else {
            &scripts::BOX_DEMOTE
        };
        target
            .eval_on(instance, query, vec![], EvalOptions::with_timeout(timeout))
            .await?;
        slog::info!(self.logger, "{} {} done on the instance", action, instance.alias);
        Ok(())
    }
}

#[async_trait::async_trait]
impl ReplicasetOrchestrator for CConfigOrchestrator {
    fn orchestrator(&self) -> Orchestrator {
        Orchestrator::CentralizedConfig
    }

    async fn promote(&self, target: &Target<'_>, req: &PromoteRequest) -> Result<(), ActionError> {
        match self.strategy {
            ChangeStrategy::Direct => {
                self.change_leader_directly(target, &req.instance_name, true, req.timeout)
                    .await
            }
            ChangeStrategy::ConfigPatch(_) => {
                let action = PatchAction::Promote {
                    instance: req.instance_name.clone(),
                };
                self.patch(target, action, req.force).await.map(|_| ())
            }
        }
    }

    async fn demote(&self, target: &Target<'_>, req: &DemoteRequest) -> Result<(), ActionError> {
        match self.strategy {
            ChangeStrategy::Direct => {
                self.change_leader_directly(target, &req.instance_name, false, req.timeout)
                    .await
            }
            ChangeStrategy::ConfigPatch(_) => {
                let action = PatchAction::Demote {
                    instance: req.instance_name.clone(),
                };
                self.patch(target, action, req.force).await.map(|_| ())
            }
        }
    }

    async fn expel(&self, target: &Target<'_>, req: &ExpelRequest) -> Result<(), ActionError> {
        let action = PatchAction::Expel {
            instance: req.instance_name.clone(),
        };
        self.patch(target, action, req.force).await.map(|_| ())
    }

    async fn roles_change(&self, target: &Target<'_>, req: &RolesChangeRequest) -> Result<(), ActionError> {
        let action = PatchAction::Roles {
            scope: roles_scope(req)?,
            op: req.op,
            role: req.role_name.clone(),
        };
        self.patch(target, action, req.force).await.map(|_| ())
    }

    async fn bootstrap_vshard(&self, target: &Target<'_>, req: &VShardBootstrapRequest) -> Result<(), ActionError> {
        let mut bootstrap = RouterBootstrap {
            timeout: req.timeout,
            bootstrapped: false,
        };
        match target {
            Target::Instance(evaluator) => {
                let ctx = InstanceCtx::default();
                bootstrap.eval(&ctx, *evaluator).await?;
            }
            Target::Application { fanout, instances } => {
                fanout.for_each_reachable(instances, &mut bootstrap).await?;
            }
        }

        if bootstrap.bootstrapped {
            slog::info!(self.logger, "Bootstrapped vshard");
            Ok(())
        } else {
            Err(ActionError::NoVShardRouter)
        }
    }
}
