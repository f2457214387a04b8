use crate::connect::{EvalFanout, EvalOptions, Evaluator, FanoutError, Flow, InstanceCtx, InstanceEval};
use crate::discovery::{discover_application, discover_instance, DiscoveryError, DiscoveryOptions};
use crate::orchestrator::ActionError;
use crate::scripts::Query;
use crate::topology::{Instance, Orchestrator, Replicasets};
use serde_json::Value;
use std::fmt;
use tokio::time::Duration;

/// Target is what an action is applied to.
///
/// In instance scope the evaluator is an open channel to the instance the request names. In
/// application scope channels are opened on demand to the application's local instances.
pub enum Target<'a> {
    Instance(&'a dyn Evaluator),
    Application {
        fanout: &'a EvalFanout<'a>,
        instances: &'a [InstanceCtx],
    },
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Scope {
    Instance,
    Application,
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::Instance => write!(f, "a single instance"),
            Scope::Application => write!(f, "an application"),
        }
    }
}

struct QueryRunner {
    query: Query,
    args: Vec<Value>,
    opts: EvalOptions,
    result: Option<Vec<Value>>,
}

#[async_trait::async_trait]
impl InstanceEval for QueryRunner {
    type Error = ActionError;

    async fn eval(&mut self, _ctx: &InstanceCtx, evaluator: &dyn Evaluator) -> Result<Flow, ActionError> {
        let values = self.query.eval(evaluator, self.args.clone(), self.opts.clone()).await?;
        self.result = Some(values);
        Ok(Flow::Stop)
    }
}

impl<'a> Target<'a> {
    pub fn scope(&self) -> Scope {
        match self {
            Target::Instance(_) => Scope::Instance,
            Target::Application { .. } => Scope::Application,
        }
    }

    pub(crate) async fn discover(
        &self,
        orchestrator: Orchestrator,
        timeout: Option<Duration>,
    ) -> Result<Replicasets, DiscoveryError> {
        let opts = DiscoveryOptions { orchestrator, timeout };
        match self {
            Target::Instance(evaluator) => discover_instance(*evaluator, &opts).await,
            Target::Application { fanout, instances } => discover_application(fanout, instances, &opts).await,
        }
    }

    /// Evaluates `query` on the target instance, or on any one reachable instance of the
    /// application other than `exclude`.
    pub(crate) async fn eval_any(
        &self,
        query: &Query,
        args: Vec<Value>,
        opts: EvalOptions,
        exclude: Option<&str>,
    ) -> Result<Vec<Value>, ActionError> {
        match self {
            Target::Instance(evaluator) => Ok(query.eval(*evaluator, args, opts).await?),
            Target::Application { fanout, instances } => {
                let candidates: Vec<InstanceCtx> = instances
                    .iter()
                    .filter(|ctx| Some(ctx.instance_name.as_str()) != exclude)
                    .cloned()
                    .collect();

                let mut runner = QueryRunner {
                    query: *query,
                    args,
                    opts,
                    result: None,
                };
                fanout.any(&candidates, &mut runner).await?;
                runner.result.ok_or_else(|| FanoutError::NoReachableInstance.into())
            }
        }
    }

    /// Evaluates `query` on the discovered `instance` itself.
    pub(crate) async fn eval_on(
        &self,
        instance: &Instance,
        query: &Query,
        args: Vec<Value>,
        opts: EvalOptions,
    ) -> Result<Vec<Value>, ActionError> {
        match self {
            Target::Instance(evaluator) => Ok(query.eval(*evaluator, args, opts).await?),
            Target::Application { fanout, .. } => {
                let ctx = instance
                    .ctx
                    .as_ref()
                    .ok_or_else(|| ActionError::InstanceNotLocal(instance.alias.clone()))?;
                let evaluator = fanout
                    .connector()
                    .connect(ctx)
                    .await
                    .map_err(|e| ActionError::Connect {
                        instance: instance.alias.clone(),
                        source: e,
                    })?;
                Ok(query.eval(evaluator.as_ref(), args, opts).await?)
            }
        }
    }
}
