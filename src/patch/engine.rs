use crate::patch::document::{locate_instance, locate_replicaset, merge_documents, InstanceLocation};
use crate::patch::path::{get_at_path, set_at_path};
use crate::patch::target::select_candidates;
use crate::patch::{CollectError, DataCollector, DataPublisher, KeyPicker, PickError, PublishError};
use crate::topology::{change_roles, Failover, RoleOp, RolesError};
use bytes::Bytes;
use serde_json::Value;

/// RolesScope is the configuration level at which a role list is changed.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum RolesScope {
    Global,
    Group(String),
    /// A replicaset name, optionally with the group it belongs to.
    Replicaset {
        group: Option<String>,
        replicaset: String,
    },
    Instance(String),
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum PatchAction {
    Promote { instance: String },
    Demote { instance: String },
    Expel { instance: String },
    Roles { scope: RolesScope, op: RoleOp, role: String },
}

impl PatchAction {
    fn name(&self) -> &'static str {
        match self {
            PatchAction::Promote { .. } => "promote",
            PatchAction::Demote { .. } => "demote",
            PatchAction::Expel { .. } => "expel",
            PatchAction::Roles { .. } => "roles change",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
enum Mutation {
    Set(Value),
    Roles(RoleOp, String),
}

/// PatchPlan is the path from the configuration root to the field that changes, the minimum
/// depth a document must reach along it to be patched, and the change itself.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct PatchPlan {
    path: Vec<String>,
    min_depth: usize,
    mutation: Mutation,
}

#[derive(Debug, thiserror::Error)]
pub enum PatchError {
    #[error(transparent)]
    Collect(#[from] CollectError),

    #[error("failed to parse configuration {key}")]
    Parse {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("instance {0:?} not found in the cluster configuration")]
    InstanceNotFound(String),

    #[error("replicaset {0:?} not found in the cluster configuration")]
    ReplicasetNotFound(String),

    #[error("{action} is not supported for failover {failover:?}")]
    UnsupportedFailover { action: &'static str, failover: String },

    #[error("no configuration source contains the target path {0:?}")]
    NoPatchTarget(Vec<String>),

    #[error(transparent)]
    Pick(#[from] PickError),

    #[error(transparent)]
    Roles(#[from] RolesError),

    #[error("unexpected value at {0:?}, expected a list of strings")]
    UnexpectedValue(Vec<String>),

    #[error("failed to serialize patched configuration {key}")]
    Serialize {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("{key} was modified concurrently, expected revision {expected}")]
    PublishConflict { key: String, expected: i64 },

    #[error(transparent)]
    Publish(PublishError),
}

/// PatchOutcome reports which source was patched.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PatchOutcome {
    pub key: String,
    pub revision: i64,
}

fn keys(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|p| p.to_string()).collect()
}

fn instance_path(location: &InstanceLocation, tail: &[&str]) -> Vec<String> {
    let mut path = keys(&[
        "groups",
        location.group.as_str(),
        "replicasets",
        location.replicaset.as_str(),
        "instances",
        location.instance.as_str(),
    ]);
    path.extend(keys(tail));
    path
}

fn plan_leader_change(location: &InstanceLocation, promote: bool) -> Result<PatchPlan, PatchError> {
    let action = if promote { "promote" } else { "demote" };
    match (Failover::from_cconfig(&location.failover), promote) {
        (Failover::Off, _) => {
            let path = instance_path(location, &["database", "mode"]);
            let mode = if promote { "rw" } else { "ro" };
            Ok(PatchPlan {
                min_depth: path.len() - 2,
                path,
                mutation: Mutation::Set(Value::from(mode)),
            })
        }
        (Failover::Manual, true) => {
            let path = keys(&[
                "groups",
                location.group.as_str(),
                "replicasets",
                location.replicaset.as_str(),
                "leader",
            ]);
            Ok(PatchPlan {
                min_depth: path.len() - 1,
                path,
                mutation: Mutation::Set(Value::from(location.instance.as_str())),
            })
        }
        _ => Err(PatchError::UnsupportedFailover {
            action,
            failover: location.failover.clone(),
        }),
    }
}

/// `plan_patch()` computes the target path and minimum depth of an action against the merged
/// configuration of the cluster.
pub(crate) fn plan_patch(action: &PatchAction, config: &Value) -> Result<PatchPlan, PatchError> {
    let locate = |instance: &str| {
        locate_instance(config, instance).ok_or_else(|| PatchError::InstanceNotFound(instance.to_string()))
    };

    match action {
        PatchAction::Promote { instance } => plan_leader_change(&locate(instance)?, true),
        PatchAction::Demote { instance } => plan_leader_change(&locate(instance)?, false),
        PatchAction::Expel { instance } => {
            let path = instance_path(&locate(instance)?, &["iproto", "listen"]);
            Ok(PatchPlan {
                min_depth: path.len() - 2,
                path,
                mutation: Mutation::Set(Value::Array(vec![])),
            })
        }
        PatchAction::Roles { scope, op, role } => {
            let path = match scope {
                RolesScope::Global => keys(&["roles"]),
                RolesScope::Group(group) => keys(&["groups", group.as_str(), "roles"]),
                RolesScope::Replicaset { group, replicaset } => {
                    let group = match group {
                        Some(group) => group.clone(),
                        None => locate_replicaset(config, replicaset)
                            .ok_or_else(|| PatchError::ReplicasetNotFound(replicaset.clone()))?,
                    };
                    keys(&["groups", group.as_str(), "replicasets", replicaset.as_str(), "roles"])
                }
                RolesScope::Instance(instance) => instance_path(&locate(instance)?, &["roles"]),
            };
            Ok(PatchPlan {
                min_depth: path.len() - 1,
                path,
                mutation: Mutation::Roles(*op, role.clone()),
            })
        }
    }
}

fn apply_mutation(document: &mut Value, plan: &PatchPlan) -> Result<(), PatchError> {
    let value = match &plan.mutation {
        Mutation::Set(value) => value.clone(),
        Mutation::Roles(op, role) => {
            let current: Vec<String> = match get_at_path(document, &plan.path) {
                None | Some(Value::Null) => vec![],
                Some(value) => serde_json::from_value(value.clone())
                    .map_err(|_| PatchError::UnexpectedValue(plan.path.clone()))?,
            };
            Value::from(change_roles(&current, *op, role)?)
        }
    };
    set_at_path(document, &plan.path, value);
    Ok(())
}

/// PatchEngine applies topology mutations to the configuration documents of a centrally
/// configured cluster.
///
/// Every call collects all documents, picks the one that describes the target most specifically
/// and publishes it back guarded by the revision it was read at. A stale revision is reported as
/// `PublishConflict` and never retried.
pub struct PatchEngine {
    logger: slog::Logger,
    collector: Box<dyn DataCollector>,
    publisher: Box<dyn DataPublisher>,
    picker: Box<dyn KeyPicker>,
}

impl PatchEngine {
    pub fn new(
        logger: slog::Logger,
        collector: Box<dyn DataCollector>,
        publisher: Box<dyn DataPublisher>,
        picker: Box<dyn KeyPicker>,
    ) -> Self {
        PatchEngine {
            logger,
            collector,
            publisher,
            picker,
        }
    }

    pub async fn patch(&self, action: &PatchAction, force: bool) -> Result<PatchOutcome, PatchError> {
        let raw_documents = self.collector.collect().await?;

        let mut documents = Vec::with_capacity(raw_documents.len());
        for raw in raw_documents {
            let document = if raw.data.iter().all(u8::is_ascii_whitespace) {
                Value::Null
            } else {
                serde_json::from_slice(&raw.data).map_err(|e| PatchError::Parse {
                    key: raw.key.clone(),
                    source: e,
                })?
            };
            documents.push((raw.key, raw.revision, document));
        }

        let merged = merge_documents(documents.iter().map(|(_, _, document)| document));
        let plan = plan_patch(action, &merged)?;

        let mut targets = select_candidates(documents, &plan.path, plan.min_depth);
        if targets.is_empty() {
            return Err(PatchError::NoPatchTarget(plan.path));
        }

        let selected = if targets.len() > 1 {
            let candidate_keys: Vec<String> = targets.iter().map(|t| t.key.clone()).collect();
            let idx = self.picker.pick(&candidate_keys, force)?;
            if idx >= targets.len() {
                return Err(PickError::OutOfRange(idx).into());
            }
            idx
        } else {
            0
        };
        let mut target = targets.swap_remove(selected);
        slog::info!(
            self.logger,
            "Patching {} for {} at depth {} of {:?}",
            target.key,
            action.name(),
            target.priority,
            plan.path
        );

        apply_mutation(&mut target.document, &plan)?;
        let data = serde_json::to_vec_pretty(&target.document).map_err(|e| PatchError::Serialize {
            key: target.key.clone(),
            source: e,
        })?;

        self.publisher
            .publish(&target.key, target.revision, Bytes::from(data))
            .await
            .map_err(|e| match e {
                PublishError::RevisionMismatch { key, expected, .. } => PatchError::PublishConflict { key, expected },
                e => PatchError::Publish(e),
            })?;

        Ok(PatchOutcome {
            key: target.key,
            revision: target.revision,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::patch::{RawDocument, TopCandidatePicker};
    use crate::test_utils::test_logger;
    use serde_json::json;
    use std::collections::BTreeMap;
    use std::sync::{Arc, Mutex};

    /// MemoryStore keeps documents with etcd-like revisions, bumped on every publish.
    #[derive(Clone, Default)]
    struct MemoryStore {
        documents: Arc<Mutex<BTreeMap<String, (i64, Value)>>>,
    }

    impl MemoryStore {
        fn with(documents: Vec<(&str, Value)>) -> Self {
            let store = MemoryStore::default();
            for (key, document) in documents {
                store.documents.lock().unwrap().insert(key.to_string(), (1, document));
            }
            store
        }

        fn get(&self, key: &str) -> Value {
            self.documents.lock().unwrap()[key].1.clone()
        }

        fn bump(&self, key: &str) {
            self.documents.lock().unwrap().get_mut(key).unwrap().0 += 1;
        }
    }

    #[async_trait::async_trait]
    impl DataCollector for MemoryStore {
        async fn collect(&self) -> Result<Vec<RawDocument>, CollectError> {
            Ok(self
                .documents
                .lock()
                .unwrap()
                .iter()
                .map(|(key, (revision, document))| RawDocument {
                    key: key.clone(),
                    data: Bytes::from(serde_json::to_vec(document).unwrap()),
                    revision: *revision,
                })
                .collect())
        }
    }

    #[async_trait::async_trait]
    impl DataPublisher for MemoryStore {
        async fn publish(&self, key: &str, expected_revision: i64, data: Bytes) -> Result<(), PublishError> {
            let mut documents = self.documents.lock().unwrap();
            let entry = documents
                .get_mut(key)
                .ok_or_else(|| PublishError::UnknownKey(key.to_string()))?;
            if entry.0 != expected_revision {
                return Err(PublishError::RevisionMismatch {
                    key: key.to_string(),
                    expected: expected_revision,
                    actual: entry.0,
                });
            }
            *entry = (entry.0 + 1, serde_json::from_slice(&data).unwrap());
            Ok(())
        }
    }

    struct FixedPicker(usize);

    impl KeyPicker for FixedPicker {
        fn pick(&self, _keys: &[String], _force: bool) -> Result<usize, PickError> {
            Ok(self.0)
        }
    }

    fn engine(store: &MemoryStore) -> PatchEngine {
        PatchEngine::new(
            test_logger(),
            Box::new(store.clone()),
            Box::new(store.clone()),
            Box::new(TopCandidatePicker),
        )
    }

    fn two_instance_config(failover: &str) -> Value {
        json!({
            "replication": {"failover": failover},
            "groups": {
                "group-001": {
                    "replicasets": {
                        "replicaset-001": {
                            "instances": {
                                "instance-001": {"iproto": {"listen": [{"uri": "127.0.0.1:3301"}]}},
                                "instance-002": {"iproto": {"listen": [{"uri": "127.0.0.1:3302"}]}},
                            }
                        }
                    }
                }
            }
        })
    }

    fn promote(instance: &str) -> PatchAction {
        PatchAction::Promote {
            instance: instance.to_string(),
        }
    }

    #[test]
    fn test_plan_promote_off() {
        let plan = plan_patch(&promote("instance-002"), &two_instance_config("off")).unwrap();
        assert_eq!(
            plan.path,
            keys(&[
                "groups",
                "group-001",
                "replicasets",
                "replicaset-001",
                "instances",
                "instance-002",
                "database",
                "mode"
            ])
        );
        assert_eq!(plan.min_depth, plan.path.len() - 2);
        assert_eq!(plan.mutation, Mutation::Set(json!("rw")));
    }

    #[test]
    fn test_plan_promote_manual() {
        let plan = plan_patch(&promote("instance-002"), &two_instance_config("manual")).unwrap();
        assert_eq!(
            plan.path,
            keys(&["groups", "group-001", "replicasets", "replicaset-001", "leader"])
        );
        assert_eq!(plan.min_depth, plan.path.len() - 1);
        assert_eq!(plan.mutation, Mutation::Set(json!("instance-002")));
    }

    #[test]
    fn test_plan_rejects_failover() {
        fn rejected(action: PatchAction, failover: &str) {
            match plan_patch(&action, &two_instance_config(failover)) {
                Err(PatchError::UnsupportedFailover { failover: f, .. }) => assert_eq!(f, failover),
                other => panic!("Unexpected result: {:?}", other),
            }
        }

        let demote = PatchAction::Demote {
            instance: "instance-001".to_string(),
        };
        rejected(promote("instance-002"), "election");
        rejected(promote("instance-002"), "supervised");
        rejected(promote("instance-002"), "whatever");
        rejected(demote.clone(), "manual");
        rejected(demote, "election");
    }

    #[test]
    fn test_plan_expel_ignores_failover() {
        let expel = PatchAction::Expel {
            instance: "instance-001".to_string(),
        };
        for failover in &["off", "manual", "election"] {
            let plan = plan_patch(&expel, &two_instance_config(failover)).unwrap();
            assert_eq!(plan.path.last().unwrap(), "listen");
            assert_eq!(plan.min_depth, plan.path.len() - 2);
        }
    }

    #[test]
    fn test_plan_unknown_instance() {
        let result = plan_patch(&promote("instance-003"), &two_instance_config("off"));
        assert!(matches!(result, Err(PatchError::InstanceNotFound(name)) if name == "instance-003"));
    }

    #[tokio::test]
    async fn promote_off_sets_rw_mode_of_one_instance() {
        let store = MemoryStore::with(vec![("/cluster.json", two_instance_config("off"))]);

        let outcome = engine(&store).patch(&promote("instance-002"), false).await.unwrap();

        assert_eq!(outcome.key, "/cluster.json");
        let mut expected = two_instance_config("off");
        expected["groups"]["group-001"]["replicasets"]["replicaset-001"]["instances"]["instance-002"]["database"] =
            json!({"mode": "rw"});
        assert_eq!(store.get("/cluster.json"), expected);
    }

    #[tokio::test]
    async fn most_specific_source_is_patched() {
        let store = MemoryStore::with(vec![
            ("/a/common.json", json!({"replication": {"failover": "manual"}})),
            ("/b/topology.json", two_instance_config("manual")),
            (
                "/c/leaders.json",
                json!({"groups": {"group-001": {"replicasets": {"replicaset-001": {"leader": "instance-001"}}}}}),
            ),
        ]);

        let outcome = engine(&store).patch(&promote("instance-002"), true).await.unwrap();

        assert_eq!(outcome.key, "/c/leaders.json");
        assert_eq!(
            store.get("/c/leaders.json")["groups"]["group-001"]["replicasets"]["replicaset-001"]["leader"],
            json!("instance-002")
        );
        assert_eq!(store.get("/b/topology.json"), two_instance_config("manual"));
    }

    #[tokio::test]
    async fn ambiguous_candidates_require_selection() {
        let store = MemoryStore::with(vec![
            ("/b.json", two_instance_config("manual")),
            ("/a.json", two_instance_config("manual")),
        ]);

        match engine(&store).patch(&promote("instance-002"), false).await {
            Err(PatchError::Pick(PickError::SelectionRequired(offered))) => {
                assert_eq!(offered, vec!["/a.json".to_string(), "/b.json".to_string()])
            }
            other => panic!("Unexpected result: {:?}", other),
        }

        let picking_engine = PatchEngine::new(
            test_logger(),
            Box::new(store.clone()),
            Box::new(store.clone()),
            Box::new(FixedPicker(1)),
        );
        let outcome = picking_engine.patch(&promote("instance-002"), false).await.unwrap();
        assert_eq!(outcome.key, "/b.json");
    }

    #[tokio::test]
    async fn stale_revision_is_a_conflict() {
        let store = MemoryStore::with(vec![("/cluster.json", two_instance_config("off"))]);

        struct RacingPublisher(MemoryStore);

        #[async_trait::async_trait]
        impl DataPublisher for RacingPublisher {
            async fn publish(&self, key: &str, expected_revision: i64, data: Bytes) -> Result<(), PublishError> {
                self.0.bump(key);
                self.0.publish(key, expected_revision, data).await
            }
        }

        let racing_engine = PatchEngine::new(
            test_logger(),
            Box::new(store.clone()),
            Box::new(RacingPublisher(store.clone())),
            Box::new(TopCandidatePicker),
        );

        match racing_engine.patch(&promote("instance-002"), false).await {
            Err(PatchError::PublishConflict { key, expected }) => {
                assert_eq!(key, "/cluster.json");
                assert_eq!(expected, 1);
            }
            other => panic!("Unexpected result: {:?}", other),
        }
        assert_eq!(store.get("/cluster.json"), two_instance_config("off"));
    }

    #[tokio::test]
    async fn expel_clears_listen_uris() {
        let store = MemoryStore::with(vec![("/cluster.json", two_instance_config("election"))]);
        let expel = PatchAction::Expel {
            instance: "instance-001".to_string(),
        };

        engine(&store).patch(&expel, false).await.unwrap();

        let document = store.get("/cluster.json");
        let instances = &document["groups"]["group-001"]["replicasets"]["replicaset-001"]["instances"];
        assert_eq!(instances["instance-001"]["iproto"]["listen"], json!([]));
        assert_eq!(instances["instance-002"]["iproto"]["listen"], json!([{"uri": "127.0.0.1:3302"}]));
    }

    #[tokio::test]
    async fn roles_change_at_each_scope() {
        let store = MemoryStore::with(vec![("/cluster.json", two_instance_config("off"))]);
        let engine = engine(&store);
        let add = |scope: RolesScope| PatchAction::Roles {
            scope,
            op: RoleOp::Add,
            role: "roles.metrics".to_string(),
        };

        engine.patch(&add(RolesScope::Global), false).await.unwrap();
        engine
            .patch(&add(RolesScope::Group("group-001".to_string())), false)
            .await
            .unwrap();
        engine
            .patch(
                &add(RolesScope::Replicaset {
                    group: None,
                    replicaset: "replicaset-001".to_string(),
                }),
                false,
            )
            .await
            .unwrap();
        engine
            .patch(&add(RolesScope::Instance("instance-001".to_string())), false)
            .await
            .unwrap();

        let document = store.get("/cluster.json");
        let group = &document["groups"]["group-001"];
        assert_eq!(document["roles"], json!(["roles.metrics"]));
        assert_eq!(group["roles"], json!(["roles.metrics"]));
        assert_eq!(group["replicasets"]["replicaset-001"]["roles"], json!(["roles.metrics"]));
        assert_eq!(
            group["replicasets"]["replicaset-001"]["instances"]["instance-001"]["roles"],
            json!(["roles.metrics"])
        );

        let duplicate = engine.patch(&add(RolesScope::Global), false).await;
        assert!(matches!(duplicate, Err(PatchError::Roles(RolesError::AlreadyExists(_)))));

        let remove = PatchAction::Roles {
            scope: RolesScope::Global,
            op: RoleOp::Remove,
            role: "roles.metrics".to_string(),
        };
        engine.patch(&remove, false).await.unwrap();
        assert_eq!(store.get("/cluster.json")["roles"], json!([]));
    }

    #[tokio::test]
    async fn blank_document_is_not_a_global_roles_target() {
        let store = MemoryStore::with(vec![
            ("/a-blank.json", Value::Null),
            ("/cluster.json", two_instance_config("off")),
        ]);
        let add = PatchAction::Roles {
            scope: RolesScope::Global,
            op: RoleOp::Add,
            role: "roles.metrics".to_string(),
        };

        let outcome = engine(&store).patch(&add, false).await.unwrap();

        assert_eq!(outcome.key, "/cluster.json");
        assert_eq!(store.get("/cluster.json")["roles"], json!(["roles.metrics"]));
        assert_eq!(store.get("/a-blank.json"), Value::Null);

        let blank_only = MemoryStore::with(vec![("/a-blank.json", Value::Null)]);
        let result = engine(&blank_only).patch(&add, false).await;
        assert!(matches!(result, Err(PatchError::NoPatchTarget(path)) if path == keys(&["roles"])));
    }

    #[test]
    fn test_serialize_error_names_the_source() {
        let source = serde_json::from_str::<Value>("{").unwrap_err();
        let err = PatchError::Serialize {
            key: "/cluster.json".to_string(),
            source,
        };
        assert_eq!(err.to_string(), "failed to serialize patched configuration /cluster.json");
    }
}
