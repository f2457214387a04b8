use crate::connect::{EvalOptions, InstanceCtx};
use crate::orchestrator::{
    unsupported, ActionError, BootstrapRequest, DemoteRequest, ExpelRequest, PromoteRequest, ReplicasetOrchestrator,
    RolesChangeRequest, Scope, Target, VShardBootstrapRequest,
};
use crate::scripts;
use crate::topology::{change_roles, Failover, Orchestrator, Replicasets};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::path::Path;
use tokio::time::Duration;

/// ReplicasetTemplate is one entry of a replicasets file, the cluster layout created by a
/// bootstrap.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct ReplicasetTemplate {
    pub alias: String,
    #[serde(default)]
    pub roles: Vec<String>,
    /// Instance names, the first one becomes the leader.
    pub instances: Vec<String>,
    #[serde(default)]
    pub weight: Option<f64>,
    #[serde(default)]
    pub all_rw: Option<bool>,
    #[serde(default)]
    pub vshard_group: Option<String>,
}

async fn read_replicasets_file(path: &Path) -> Result<Vec<ReplicasetTemplate>, ActionError> {
    let data = tokio::fs::read(path).await.map_err(|e| ActionError::ReplicasetsFile {
        path: path.to_path_buf(),
        source: e,
    })?;
    serde_json::from_slice(&data).map_err(|e| ActionError::ReplicasetsFileFormat {
        path: path.to_path_buf(),
        source: e,
    })
}

fn advertise_uri<'a>(instances: &'a [InstanceCtx], name: &str) -> Result<&'a str, ActionError> {
    instances
        .iter()
        .find(|ctx| ctx.instance_name == name)
        .and_then(|ctx| ctx.advertise_uri.as_deref())
        .ok_or_else(|| ActionError::InstanceNotLocal(name.to_string()))
}

fn join_servers(instances: &[InstanceCtx], names: &[String]) -> Result<Vec<Value>, ActionError> {
    let mut servers = Vec::with_capacity(names.len());
    for name in names {
        servers.push(json!({ "uri": advertise_uri(instances, name)? }));
    }
    Ok(servers)
}

fn replicaset_edit(template: &ReplicasetTemplate, instances: &[InstanceCtx]) -> Result<Value, ActionError> {
    let mut edit = Map::new();
    edit.insert("alias".to_string(), json!(template.alias));
    edit.insert("roles".to_string(), json!(template.roles));
    edit.insert("join_servers".to_string(), Value::from(join_servers(instances, &template.instances)?));
    if let Some(weight) = template.weight {
        edit.insert("weight".to_string(), json!(weight));
    }
    if let Some(all_rw) = template.all_rw {
        edit.insert("all_rw".to_string(), json!(all_rw));
    }
    if let Some(vshard_group) = &template.vshard_group {
        edit.insert("vshard_group".to_string(), json!(vshard_group));
    }
    Ok(Value::Object(edit))
}

/// CartridgeOrchestrator drives a cartridge cluster through its cluster-wide administration
/// calls. Any member may accept them, so most actions run on one reachable instance.
pub struct CartridgeOrchestrator {
    logger: slog::Logger,
}

impl CartridgeOrchestrator {
    pub fn new(logger: slog::Logger) -> Self {
        CartridgeOrchestrator { logger }
    }

    async fn edit_topology(
        &self,
        target: &Target<'_>,
        opts: Value,
        timeout: Option<Duration>,
        exclude: Option<&str>,
    ) -> Result<(), ActionError> {
        target
            .eval_any(
                &scripts::CARTRIDGE_EDIT_TOPOLOGY,
                vec![opts],
                EvalOptions::with_timeout(timeout),
                exclude,
            )
            .await?;
        Ok(())
    }

    async fn discover_topology(&self, target: &Target<'_>, timeout: Option<Duration>) -> Result<Replicasets, ActionError> {
        Ok(target.discover(Orchestrator::Cartridge, timeout).await?)
    }

    async fn bootstrap_from_file(&self, target: &Target<'_>, path: &Path, timeout: Option<Duration>) -> Result<(), ActionError> {
        let instances = match target {
            Target::Application { instances, .. } => *instances,
            Target::Instance(_) => return Err(unsupported(self.orchestrator(), target, "bootstrap")),
        };

        let templates = read_replicasets_file(path).await?;
        let edits = templates
            .iter()
            .map(|template| replicaset_edit(template, instances))
            .collect::<Result<Vec<Value>, ActionError>>()?;

        self.edit_topology(target, json!({ "replicasets": edits }), timeout, None)
            .await?;
        slog::info!(self.logger, "Bootstrapped {} replicasets from {:?}", templates.len(), path);
        Ok(())
    }

    async fn join_instance(&self, target: &Target<'_>, req: &BootstrapRequest) -> Result<(), ActionError> {
        let instances = match target {
            Target::Application { instances, .. } => *instances,
            Target::Instance(_) => return Err(unsupported(self.orchestrator(), target, "bootstrap")),
        };
        let uri = advertise_uri(instances, &req.instance_name)?;

        let topology = self.discover_topology(target, req.timeout).await?;
        let replicaset = topology
            .replicaset_by_alias(&req.replicaset_name)
            .ok_or_else(|| ActionError::ReplicasetNotFound(req.replicaset_name.clone()))?;

        let edit = json!({
            "replicasets": [{
                "uuid": replicaset.uuid,
                "join_servers": [{ "uri": uri }],
            }],
        });
        self.edit_topology(target, edit, req.timeout, Some(&req.instance_name))
            .await?;
        slog::info!(
            self.logger,
            "Joined {} to replicaset {}",
            req.instance_name,
            req.replicaset_name
        );
        Ok(())
    }
}

#[async_trait::async_trait]
impl ReplicasetOrchestrator for CartridgeOrchestrator {
    fn orchestrator(&self) -> Orchestrator {
        Orchestrator::Cartridge
    }

    async fn promote(&self, target: &Target<'_>, req: &PromoteRequest) -> Result<(), ActionError> {
        let topology = self.discover_topology(target, req.timeout).await?;
        let (replicaset, instance) = topology
            .find_instance(&req.instance_name)
            .ok_or_else(|| ActionError::InstanceNotFound(req.instance_name.clone()))?;
        let opts = EvalOptions::with_timeout(req.timeout);

        match replicaset.failover {
            Failover::Off | Failover::Eventual => {
                let edit = json!({
                    "replicasets": [{
                        "uuid": replicaset.uuid,
                        "failover_priority": [instance.uuid],
                    }],
                });
                self.edit_topology(target, edit, req.timeout, None).await?;
            }
            Failover::Stateful => {
                let args = vec![json!(replicaset.uuid), json!(instance.uuid), json!(req.force)];
                target
                    .eval_any(&scripts::CARTRIDGE_FAILOVER_PROMOTE, args, opts, None)
                    .await?;
            }
            Failover::Election => {
                target.eval_on(instance, &scripts::BOX_PROMOTE, vec![], opts).await?;
            }
            failover => {
                return Err(ActionError::UnsupportedFailover {
                    action: "promote",
                    failover,
                })
            }
        }

        slog::info!(
            self.logger,
            "Promoted {} in replicaset {} with {} failover",
            instance.alias,
            replicaset.alias,
            replicaset.failover
        );
        Ok(())
    }

    async fn demote(&self, target: &Target<'_>, req: &DemoteRequest) -> Result<(), ActionError> {
        let topology = self.discover_topology(target, req.timeout).await?;
        let (replicaset, instance) = topology
            .find_instance(&req.instance_name)
            .ok_or_else(|| ActionError::InstanceNotFound(req.instance_name.clone()))?;

        if replicaset.failover != Failover::Election {
            return Err(ActionError::UnsupportedFailover {
                action: "demote",
                failover: replicaset.failover,
            });
        }

        target
            .eval_on(
                instance,
                &scripts::BOX_DEMOTE,
                vec![],
                EvalOptions::with_timeout(req.timeout),
            )
            .await?;
        slog::info!(self.logger, "Demoted {}", instance.alias);
        Ok(())
    }

    async fn expel(&self, target: &Target<'_>, req: &ExpelRequest) -> Result<(), ActionError> {
        if target.scope() != Scope::Application {
            return Err(unsupported(self.orchestrator(), target, "expel"));
        }

        let topology = self.discover_topology(target, None).await?;
        let (_, instance) = topology
            .find_instance(&req.instance_name)
            .ok_or_else(|| ActionError::InstanceNotFound(req.instance_name.clone()))?;

        let edit = json!({
            "servers": [{ "uuid": instance.uuid, "expelled": true }],
        });
        self.edit_topology(target, edit, None, Some(&req.instance_name))
            .await?;
        slog::info!(self.logger, "Expelled {}", instance.alias);
        Ok(())
    }

    async fn roles_change(&self, target: &Target<'_>, req: &RolesChangeRequest) -> Result<(), ActionError> {
        if target.scope() != Scope::Application {
            return Err(unsupported(self.orchestrator(), target, "roles change"));
        }
        if req.replicaset_name.is_empty() {
            return Err(ActionError::InvalidRequest(
                "cartridge roles are assigned per replicaset, a replicaset name is required".to_string(),
            ));
        }

        let topology = self.discover_topology(target, req.timeout).await?;
        let replicaset = topology
            .replicaset_by_alias(&req.replicaset_name)
            .ok_or_else(|| ActionError::ReplicasetNotFound(req.replicaset_name.clone()))?;
        let roles = change_roles(&replicaset.roles, req.op, &req.role_name)?;

        let edit = json!({
            "replicasets": [{ "uuid": replicaset.uuid, "roles": roles }],
        });
        self.edit_topology(target, edit, req.timeout, None).await?;
        slog::info!(self.logger, "Replicaset {} roles: {:?}", replicaset.alias, roles);
        Ok(())
    }

    async fn bootstrap_vshard(&self, target: &Target<'_>, req: &VShardBootstrapRequest) -> Result<(), ActionError> {
        target
            .eval_any(
                &scripts::CARTRIDGE_BOOTSTRAP_VSHARD,
                vec![],
                EvalOptions::with_timeout(req.timeout),
                None,
            )
            .await?;
        slog::info!(self.logger, "Bootstrapped vshard");
        Ok(())
    }

    async fn bootstrap(&self, target: &Target<'_>, req: &BootstrapRequest) -> Result<(), ActionError> {
        let joining = !req.instance_name.is_empty() || !req.replicaset_name.is_empty();
        match (&req.replicasets_file, joining) {
            (_, true) if req.instance_name.is_empty() || req.replicaset_name.is_empty() => {
                return Err(ActionError::InvalidRequest(
                    "joining an instance requires both an instance and a replicaset name".to_string(),
                ))
            }
            (_, true) => self.join_instance(target, req).await?,
            (Some(path), false) => self.bootstrap_from_file(target, path, req.timeout).await?,
            (None, false) => {
                return Err(ActionError::InvalidRequest(
                    "either a replicasets file or an instance to join is required".to_string(),
                ))
            }
        }

        if req.bootstrap_vshard {
            self.bootstrap_vshard(target, &VShardBootstrapRequest { timeout: req.timeout })
                .await?;
        }
        Ok(())
    }
}
