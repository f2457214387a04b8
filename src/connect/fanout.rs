use crate::connect::{ConnectError, Connector, Evaluator, InstanceCtx};

/// Flow lets a per-instance evaluation end the iteration early.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Flow {
    Continue,
    Stop,
}

/// InstanceEval is applied to every instance an `EvalFanout` manages to connect to.
#[async_trait::async_trait]
pub trait InstanceEval: Send {
    type Error: From<FanoutError> + Send;

    async fn eval(&mut self, ctx: &InstanceCtx, evaluator: &dyn Evaluator) -> Result<Flow, Self::Error>;
}

#[derive(Debug, thiserror::Error)]
pub enum FanoutError {
    #[error("failed to connect to instance {instance}")]
    Connect {
        instance: String,
        #[source]
        source: ConnectError,
    },

    #[error("no reachable instance found")]
    NoReachableInstance,
}

/// EvalFanout applies an evaluation to a list of instances, one short-lived channel at a time.
/// Each channel is dropped (and so closed) before the next instance is visited, on every path.
pub struct EvalFanout<'a> {
    logger: slog::Logger,
    connector: &'a dyn Connector,
}

impl<'a> EvalFanout<'a> {
    pub fn new(logger: slog::Logger, connector: &'a dyn Connector) -> Self {
        EvalFanout { logger, connector }
    }

    pub fn connector(&self) -> &'a dyn Connector {
        self.connector
    }

    /// Visits every instance. Any connection failure aborts the iteration.
    pub async fn for_each<V>(&self, instances: &[InstanceCtx], visitor: &mut V) -> Result<(), V::Error>
    where
        V: InstanceEval,
    {
        for ctx in instances {
            let evaluator = self.connector.connect(ctx).await.map_err(|e| FanoutError::Connect {
                instance: ctx.instance_name.clone(),
                source: e,
            })?;

            let flow = visitor.eval(ctx, evaluator.as_ref()).await?;
            drop(evaluator);

            if flow == Flow::Stop {
                break;
            }
        }

        Ok(())
    }

    /// Visits every reachable instance. Connection failures are logged and skipped, but at least
    /// one instance must be reachable.
    pub async fn for_each_reachable<V>(&self, instances: &[InstanceCtx], visitor: &mut V) -> Result<(), V::Error>
    where
        V: InstanceEval,
    {
        self.visit_reachable(instances, visitor, false).await
    }

    /// Visits exactly one reachable instance.
    pub async fn any<V>(&self, instances: &[InstanceCtx], visitor: &mut V) -> Result<(), V::Error>
    where
        V: InstanceEval,
    {
        self.visit_reachable(instances, visitor, true).await
    }

    async fn visit_reachable<V>(&self, instances: &[InstanceCtx], visitor: &mut V, only_one: bool) -> Result<(), V::Error>
    where
        V: InstanceEval,
    {
        let mut reached = false;
        for ctx in instances {
            let evaluator = match self.connector.connect(ctx).await {
                Ok(evaluator) => evaluator,
                Err(e) => {
                    slog::warn!(self.logger, "Skipping unreachable instance {}: {}", ctx.instance_name, e);
                    continue;
                }
            };
            reached = true;

            let flow = visitor.eval(ctx, evaluator.as_ref()).await?;
            drop(evaluator);

            if only_one || flow == Flow::Stop {
                break;
            }
        }

        if reached {
            Ok(())
        } else {
            Err(FanoutError::NoReachableInstance.into())
        }
    }
}
