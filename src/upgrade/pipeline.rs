use crate::connect::{ConnectError, Connector, EvalOptions, Evaluator};
use crate::scripts::{self, QueryError};
use crate::topology::{Mode, Replicaset, Replicasets};
use crate::upgrade::options::{UpgradeOptions, UpgradeOptionsValidated};
use crate::upgrade::time::{Clock, RealClock};
use serde::Deserialize;
use serde_json::json;
use std::convert::TryFrom;
use tokio::time::Instant;

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum SchemaChange {
    Upgrade,
    /// Downgrade to the given `X.Y.Z` schema version.
    Downgrade(String),
}

#[derive(Debug, thiserror::Error)]
pub enum UpgradeError {
    #[error("illegal upgrade options: {0}")]
    IllegalOptions(String),

    #[error("invalid schema version {0:?}, expected X.Y.Z")]
    InvalidVersion(String),

    #[error("replicaset {0:?} not found")]
    ReplicasetNotFound(String),

    #[error("instance {0:?} is not running locally")]
    InstanceNotLocal(String),

    #[error("failed to connect to instance {instance}")]
    Connect {
        instance: String,
        #[source]
        source: ConnectError,
    },

    #[error("mode of instance {0} is unknown")]
    UnknownMode(String),

    #[error("replicaset {0} has no read-write instance")]
    NoLeader(String),

    #[error("replicaset {replicaset} has several read-write instances: {leaders:?}")]
    MultipleLeaders { replicaset: String, leaders: Vec<String> },

    #[error("schema change failed on {instance}: {message}")]
    Script { instance: String, message: String },

    #[error("{instance} did not reach lsn {lsn} of replication stream {iid} in time, last seen {reached}")]
    LsnWaitTimeout {
        instance: String,
        iid: u64,
        lsn: u64,
        reached: u64,
    },

    #[error("snapshot on {instance} was not acknowledged: {response:?}")]
    Snapshot { instance: String, response: String },

    #[error(transparent)]
    Query(#[from] QueryError),

    #[error("replicaset {alias} failed, completed before it: {completed:?}")]
    Replicaset {
        alias: String,
        completed: Vec<String>,
        #[source]
        source: Box<UpgradeError>,
    },
}

/// Reply of the schema change on the leader. Any other shape is a decode error.
#[derive(Deserialize)]
#[serde(untagged)]
enum SyncInfo {
    Failed { err: String },
    Synced { lsn: u64, iid: u64 },
}

struct Member {
    alias: String,
    mode: Mode,
    evaluator: Box<dyn Evaluator>,
}

/// `validate_version()` accepts `X.Y.Z` with numeric parts only.
pub fn validate_version(version: &str) -> Result<(), UpgradeError> {
    let parts: Vec<&str> = version.split('.').collect();
    let numeric = |part: &&str| !part.is_empty() && part.chars().all(|c| c.is_ascii_digit());

    if parts.len() == 3 && parts.iter().all(numeric) {
        Ok(())
    } else {
        Err(UpgradeError::InvalidVersion(version.to_string()))
    }
}

/// Picks the replicasets named in `filter` by alias or uuid, in topology order. An empty filter
/// picks all of them.
fn select_replicasets<'a>(topology: &'a Replicasets, filter: &[String]) -> Result<Vec<&'a Replicaset>, UpgradeError> {
    if filter.is_empty() {
        return Ok(topology.replicasets.iter().collect());
    }

    for name in filter {
        if !topology.replicasets.iter().any(|rs| &rs.alias == name || &rs.uuid == name) {
            return Err(UpgradeError::ReplicasetNotFound(name.clone()));
        }
    }
    Ok(topology
        .replicasets
        .iter()
        .filter(|rs| filter.iter().any(|name| name == &rs.alias || name == &rs.uuid))
        .collect())
}

fn display_name(replicaset: &Replicaset) -> &str {
    if replicaset.alias.is_empty() {
        &replicaset.uuid
    } else {
        &replicaset.alias
    }
}

/// Upgrader changes the schema version of replicasets one at a time. The change runs on the
/// leader, then every follower must replay it up to the leader's LSN and take a snapshot.
pub struct Upgrader {
    logger: slog::Logger,
    options: UpgradeOptionsValidated,
    clock: Box<dyn Clock>,
}

impl Upgrader {
    pub fn new(logger: slog::Logger, options: UpgradeOptions) -> Result<Self, UpgradeError> {
        Self::with_clock(logger, options, Box::new(RealClock))
    }

    pub(crate) fn with_clock(
        logger: slog::Logger,
        options: UpgradeOptions,
        clock: Box<dyn Clock>,
    ) -> Result<Self, UpgradeError> {
        let options = UpgradeOptionsValidated::try_from(options)
            .map_err(|e| UpgradeError::IllegalOptions(e.to_string()))?;

        Ok(Upgrader { logger, options, clock })
    }

    /// Upgrades the selected replicasets of `topology`, stopping at the first failure. Returns the
    /// replicasets done, in order.
    pub async fn upgrade(
        &self,
        connector: &dyn Connector,
        topology: &Replicasets,
        filter: &[String],
    ) -> Result<Vec<String>, UpgradeError> {
        self.apply(connector, topology, filter, &SchemaChange::Upgrade).await
    }

    /// Like `upgrade()`, to the schema version `version`.
    pub async fn downgrade(
        &self,
        connector: &dyn Connector,
        topology: &Replicasets,
        filter: &[String],
        version: &str,
    ) -> Result<Vec<String>, UpgradeError> {
        validate_version(version)?;
        let change = SchemaChange::Downgrade(version.to_string());
        self.apply(connector, topology, filter, &change).await
    }

    async fn apply(
        &self,
        connector: &dyn Connector,
        topology: &Replicasets,
        filter: &[String],
        change: &SchemaChange,
    ) -> Result<Vec<String>, UpgradeError> {
        let replicasets = select_replicasets(topology, filter)?;

        let mut completed = Vec::with_capacity(replicasets.len());
        for replicaset in replicasets {
            let alias = display_name(replicaset).to_string();
            if let Err(e) = self.change_replicaset(connector, replicaset, change).await {
                slog::warn!(self.logger, "Schema change of {} failed: {}", alias, e);
                return Err(UpgradeError::Replicaset {
                    alias,
                    completed,
                    source: Box::new(e),
                });
            }

            slog::info!(self.logger, "Replicaset {} done: {:?}", alias, change);
            completed.push(alias);
        }

        Ok(completed)
    }

    async fn connect_members(
        &self,
        connector: &dyn Connector,
        replicaset: &Replicaset,
    ) -> Result<Vec<Member>, UpgradeError> {
        let mut members = Vec::with_capacity(replicaset.instances.len());
        for instance in &replicaset.instances {
            let ctx = instance
                .ctx
                .as_ref()
                .ok_or_else(|| UpgradeError::InstanceNotLocal(instance.alias.clone()))?;
            let evaluator = connector.connect(ctx).await.map_err(|e| UpgradeError::Connect {
                instance: instance.alias.clone(),
                source: e,
            })?;

            members.push(Member {
                alias: instance.alias.clone(),
                mode: instance.mode,
                evaluator,
            });
        }
        Ok(members)
    }

    async fn change_replicaset(
        &self,
        connector: &dyn Connector,
        replicaset: &Replicaset,
        change: &SchemaChange,
    ) -> Result<(), UpgradeError> {
        let deadline = self.clock.now() + self.options.timeout;
        let members = self.connect_members(connector, replicaset).await?;

        if let Some(unknown) = members.iter().find(|m| m.mode == Mode::Unknown) {
            return Err(UpgradeError::UnknownMode(unknown.alias.clone()));
        }
        let (leaders, followers): (Vec<&Member>, Vec<&Member>) = members.iter().partition(|m| m.mode == Mode::RW);
        let leader = match leaders.as_slice() {
            [leader] => *leader,
            [] => return Err(UpgradeError::NoLeader(display_name(replicaset).to_string())),
            _ => {
                return Err(UpgradeError::MultipleLeaders {
                    replicaset: display_name(replicaset).to_string(),
                    leaders: leaders.iter().map(|m| m.alias.clone()).collect(),
                })
            }
        };

        let opts = EvalOptions::with_timeout(Some(self.options.timeout));
        let reply: SyncInfo = match change {
            SchemaChange::Upgrade => {
                scripts::SCHEMA_UPGRADE
                    .eval_decode(leader.evaluator.as_ref(), vec![], opts.clone())
                    .await?
            }
            SchemaChange::Downgrade(version) => {
                scripts::SCHEMA_DOWNGRADE
                    .eval_decode(leader.evaluator.as_ref(), vec![json!(version)], opts.clone())
                    .await?
            }
        };
        let (iid, lsn) = match reply {
            SyncInfo::Synced { lsn, iid } => (iid, lsn),
            SyncInfo::Failed { err } => {
                return Err(UpgradeError::Script {
                    instance: leader.alias.clone(),
                    message: err,
                })
            }
        };
        slog::info!(
            self.logger,
            "Schema changed on leader {} at lsn {} of stream {}",
            leader.alias,
            lsn,
            iid
        );

        for follower in followers {
            self.wait_lsn(follower, iid, lsn, deadline).await?;

            let response: String = scripts::SNAPSHOT
                .eval_decode(follower.evaluator.as_ref(), vec![], opts.clone())
                .await?;
            if response != "ok" {
                return Err(UpgradeError::Snapshot {
                    instance: follower.alias.clone(),
                    response,
                });
            }
            slog::info!(self.logger, "Follower {} caught up and took a snapshot", follower.alias);
        }

        Ok(())
    }

    async fn wait_lsn(&self, follower: &Member, iid: u64, lsn: u64, deadline: Instant) -> Result<(), UpgradeError> {
        let opts = EvalOptions::with_timeout(Some(self.options.timeout));
        loop {
            let reached: u64 = scripts::REPLICATION_LSN
                .eval_decode(follower.evaluator.as_ref(), vec![json!(iid)], opts.clone())
                .await?;
            if reached >= lsn {
                return Ok(());
            }
            if self.clock.now() >= deadline {
                return Err(UpgradeError::LsnWaitTimeout {
                    instance: follower.alias.clone(),
                    iid,
                    lsn,
                    reached,
                });
            }

            self.clock.sleep(self.options.poll_interval).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{test_logger, MockCluster};
    use crate::topology::Instance;
    use crate::upgrade::time::MockClock;
    use tokio::time::Duration;

    fn member(cluster: &MockCluster, name: &str, mode: Mode) -> Instance {
        cluster.add_instance(name);
        Instance {
            alias: name.to_string(),
            uuid: format!("{}-uuid", name),
            uri: format!("{}.local:3301", name),
            mode,
            ctx: Some(cluster.ctx(name)),
        }
    }

    fn replicaset(alias: &str, instances: Vec<Instance>) -> Replicaset {
        Replicaset {
            uuid: format!("{}-uuid", alias),
            alias: alias.to_string(),
            instances,
            ..Replicaset::default()
        }
    }

    fn topology(replicasets: Vec<Replicaset>) -> Replicasets {
        Replicasets {
            replicasets,
            ..Replicasets::default()
        }
    }

    fn upgrader(clock: &MockClock) -> Upgrader {
        let options = UpgradeOptions {
            timeout: Some(Duration::from_secs(5)),
            poll_interval: Some(Duration::from_secs(1)),
        };
        Upgrader::with_clock(test_logger(), options, Box::new(clock.clone())).unwrap()
    }

    fn healthy(cluster: &MockCluster, leader: &str, follower: &str) {
        cluster
            .instance(leader)
            .respond(&scripts::SCHEMA_UPGRADE, json!({"lsn": 10, "iid": 1}));
        cluster
            .instance(follower)
            .respond(&scripts::REPLICATION_LSN, json!(10))
            .respond(&scripts::SNAPSHOT, json!("ok"));
    }

    #[tokio::test]
    async fn follower_catches_up_on_third_poll() {
        let cluster = MockCluster::new();
        let topology = topology(vec![replicaset(
            "storage",
            vec![member(&cluster, "s1", Mode::RW), member(&cluster, "s2", Mode::Read)],
        )]);
        cluster
            .instance("s1")
            .respond(&scripts::SCHEMA_UPGRADE, json!({"lsn": 10, "iid": 1}));
        cluster
            .instance("s2")
            .respond_seq(&scripts::REPLICATION_LSN, vec![json!(4), json!(9), json!(10)])
            .respond(&scripts::SNAPSHOT, json!("ok"));
        let clock = MockClock::new();

        let completed = upgrader(&clock).upgrade(&cluster, &topology, &[]).await.unwrap();

        assert_eq!(completed, vec!["storage".to_string()]);
        let polls = cluster.instance("s2").calls(&scripts::REPLICATION_LSN);
        assert_eq!(polls, vec![vec![json!(1)]; 3]);
        assert_eq!(cluster.instance("s2").calls(&scripts::SNAPSHOT).len(), 1);
        assert!(cluster.instance("s1").calls(&scripts::SNAPSHOT).is_empty());
        assert_eq!(clock.elapsed_time(), Duration::from_secs(2));
        assert!(clock.elapsed_time() < Duration::from_secs(5));
        assert_eq!(cluster.open_channels(), 0);
    }

    #[tokio::test]
    async fn follower_never_catches_up() {
        let cluster = MockCluster::new();
        let topology = topology(vec![replicaset(
            "storage",
            vec![member(&cluster, "s1", Mode::RW), member(&cluster, "s2", Mode::Read)],
        )]);
        cluster
            .instance("s1")
            .respond(&scripts::SCHEMA_UPGRADE, json!({"lsn": 10, "iid": 1}));
        cluster
            .instance("s2")
            .respond(&scripts::REPLICATION_LSN, json!(7))
            .respond(&scripts::SNAPSHOT, json!("ok"));
        let clock = MockClock::new();

        let result = upgrader(&clock).upgrade(&cluster, &topology, &[]).await;

        match result {
            Err(UpgradeError::Replicaset {
                alias,
                completed,
                source,
            }) => {
                assert_eq!(alias, "storage");
                assert!(completed.is_empty());
                match *source {
                    UpgradeError::LsnWaitTimeout { instance, reached, .. } => {
                        assert_eq!(instance, "s2");
                        assert_eq!(reached, 7);
                    }
                    other => panic!("Unexpected error: {:?}", other),
                }
            }
            other => panic!("Unexpected result: {:?}", other),
        }
        assert_eq!(clock.elapsed_time(), Duration::from_secs(5));
        assert!(cluster.instance("s2").calls(&scripts::SNAPSHOT).is_empty());
        assert_eq!(cluster.open_channels(), 0);
    }

    #[tokio::test]
    async fn leader_must_be_unique_and_known() {
        let cluster = MockCluster::new();
        let unknown = topology(vec![replicaset(
            "a",
            vec![member(&cluster, "a1", Mode::RW), member(&cluster, "a2", Mode::Unknown)],
        )]);
        let no_leader = topology(vec![replicaset(
            "b",
            vec![member(&cluster, "b1", Mode::Read), member(&cluster, "b2", Mode::Read)],
        )]);
        let two_leaders = topology(vec![replicaset(
            "c",
            vec![member(&cluster, "c1", Mode::RW), member(&cluster, "c2", Mode::RW)],
        )]);
        let clock = MockClock::new();
        let upgrader = upgrader(&clock);

        let source = |result: Result<Vec<String>, UpgradeError>| match result {
            Err(UpgradeError::Replicaset { source, .. }) => *source,
            other => panic!("Unexpected result: {:?}", other),
        };

        let err = source(upgrader.upgrade(&cluster, &unknown, &[]).await);
        assert!(matches!(err, UpgradeError::UnknownMode(name) if name == "a2"));

        let err = source(upgrader.upgrade(&cluster, &no_leader, &[]).await);
        assert!(matches!(err, UpgradeError::NoLeader(name) if name == "b"));

        let err = source(upgrader.upgrade(&cluster, &two_leaders, &[]).await);
        match err {
            UpgradeError::MultipleLeaders { leaders, .. } => assert_eq!(leaders, vec!["c1", "c2"]),
            other => panic!("Unexpected error: {:?}", other),
        }

        assert_eq!(cluster.open_channels(), 0);
        for name in &["a1", "b1", "c1"] {
            assert!(cluster.instance(name).calls(&scripts::SCHEMA_UPGRADE).is_empty());
        }
    }

    #[tokio::test]
    async fn batch_stops_at_first_failure() {
        let cluster = MockCluster::new();
        let topology = topology(vec![
            replicaset("a", vec![member(&cluster, "a1", Mode::RW), member(&cluster, "a2", Mode::Read)]),
            replicaset("b", vec![member(&cluster, "b1", Mode::RW), member(&cluster, "b2", Mode::Read)]),
            replicaset("c", vec![member(&cluster, "c1", Mode::RW), member(&cluster, "c2", Mode::Read)]),
        ]);
        healthy(&cluster, "a1", "a2");
        healthy(&cluster, "c1", "c2");
        cluster
            .instance("b1")
            .respond(&scripts::SCHEMA_UPGRADE, json!({"err": "box.schema.upgrade failed"}));
        let clock = MockClock::new();

        let result = upgrader(&clock).upgrade(&cluster, &topology, &[]).await;

        match result {
            Err(UpgradeError::Replicaset {
                alias,
                completed,
                source,
            }) => {
                assert_eq!(alias, "b");
                assert_eq!(completed, vec!["a".to_string()]);
                assert!(matches!(*source, UpgradeError::Script { ref instance, .. } if instance == "b1"));
            }
            other => panic!("Unexpected result: {:?}", other),
        }
        assert_eq!(cluster.instance("a2").calls(&scripts::SNAPSHOT).len(), 1);
        assert_eq!(cluster.instance("c1").total_calls(), 0);
    }

    #[tokio::test]
    async fn downgrade_selected_replicaset() {
        let cluster = MockCluster::new();
        let topology = topology(vec![
            replicaset("a", vec![member(&cluster, "a1", Mode::RW)]),
            replicaset("b", vec![member(&cluster, "b1", Mode::RW), member(&cluster, "b2", Mode::Read)]),
        ]);
        cluster
            .instance("b1")
            .respond(&scripts::SCHEMA_DOWNGRADE, json!({"lsn": 3, "iid": 2}));
        cluster
            .instance("b2")
            .respond(&scripts::REPLICATION_LSN, json!(3))
            .respond(&scripts::SNAPSHOT, json!("ok"));
        let clock = MockClock::new();
        let upgrader = upgrader(&clock);

        let completed = upgrader
            .downgrade(&cluster, &topology, &["b-uuid".to_string()], "2.10.0")
            .await
            .unwrap();

        assert_eq!(completed, vec!["b".to_string()]);
        assert_eq!(
            cluster.instance("b1").calls(&scripts::SCHEMA_DOWNGRADE),
            vec![vec![json!("2.10.0")]]
        );
        assert_eq!(cluster.instance("b2").calls(&scripts::REPLICATION_LSN), vec![vec![json!(2)]]);
        assert_eq!(cluster.instance("a1").total_calls(), 0);

        let result = upgrader.downgrade(&cluster, &topology, &[], "2.10").await;
        assert!(matches!(result, Err(UpgradeError::InvalidVersion(_))));

        let result = upgrader
            .downgrade(&cluster, &topology, &["missing".to_string()], "2.10.0")
            .await;
        assert!(matches!(result, Err(UpgradeError::ReplicasetNotFound(name)) if name == "missing"));
    }

    #[tokio::test]
    async fn malformed_leader_reply_is_rejected() {
        let cluster = MockCluster::new();
        let topology = topology(vec![replicaset(
            "storage",
            vec![member(&cluster, "s1", Mode::RW), member(&cluster, "s2", Mode::Read)],
        )]);
        cluster
            .instance("s1")
            .respond_seq(&scripts::SCHEMA_UPGRADE, vec![json!({"unexpected": "shape"})]);
        cluster
            .instance("s2")
            .respond(&scripts::REPLICATION_LSN, json!(0))
            .respond(&scripts::SNAPSHOT, json!("ok"));
        let clock = MockClock::new();
        let upgrader = upgrader(&clock);

        let result = upgrader.upgrade(&cluster, &topology, &[]).await;
        match result {
            Err(UpgradeError::Replicaset { source, .. }) => {
                assert!(matches!(*source, UpgradeError::Query(QueryError::Decode(..))));
            }
            other => panic!("Unexpected result: {:?}", other),
        }

        cluster
            .instance("s1")
            .respond(&scripts::SCHEMA_UPGRADE, json!({"lsn": 10}));
        let result = upgrader.upgrade(&cluster, &topology, &[]).await;
        match result {
            Err(UpgradeError::Replicaset { source, .. }) => {
                assert!(matches!(*source, UpgradeError::Query(QueryError::Decode(..))));
            }
            other => panic!("Unexpected result: {:?}", other),
        }

        assert!(cluster.instance("s2").calls(&scripts::REPLICATION_LSN).is_empty());
        assert!(cluster.instance("s2").calls(&scripts::SNAPSHOT).is_empty());
        assert_eq!(cluster.open_channels(), 0);
    }

    #[tokio::test]
    async fn failed_lsn_poll_stops_the_replicaset() {
        let cluster = MockCluster::new();
        let topology = topology(vec![replicaset(
            "storage",
            vec![member(&cluster, "s1", Mode::RW), member(&cluster, "s2", Mode::Read)],
        )]);
        cluster
            .instance("s1")
            .respond(&scripts::SCHEMA_UPGRADE, json!({"lsn": 10, "iid": 1}));
        cluster
            .instance("s2")
            .fail(&scripts::REPLICATION_LSN, "box.info is not available")
            .respond(&scripts::SNAPSHOT, json!("ok"));
        let clock = MockClock::new();

        let result = upgrader(&clock).upgrade(&cluster, &topology, &[]).await;

        match result {
            Err(UpgradeError::Replicaset { alias, source, .. }) => {
                assert_eq!(alias, "storage");
                assert!(matches!(*source, UpgradeError::Query(QueryError::Eval(..))));
            }
            other => panic!("Unexpected result: {:?}", other),
        }
        assert_eq!(cluster.instance("s2").calls(&scripts::REPLICATION_LSN).len(), 1);
        assert!(cluster.instance("s2").calls(&scripts::SNAPSHOT).is_empty());
        assert_eq!(clock.elapsed_time(), Duration::from_secs(0));
    }

    #[test]
    fn test_validate_version() {
        assert!(validate_version("2.11.1").is_ok());
        assert!(validate_version("3.0.0").is_ok());
        for version in &["", "2.11", "2.11.1.0", "2.x.1", "v2.11.1", "2..1"] {
            assert!(validate_version(version).is_err(), "{:?} accepted", version);
        }
    }
}
