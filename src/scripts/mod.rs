//! Remote queries evaluated on managed instances.
//!
//! Each query is a versioned asset. The Lua body can change independently of the code that
//! consumes its response, as long as the documented response shape is kept.

use crate::connect::{EvalError, EvalOptions, Evaluator};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::fmt;

#[derive(Copy, Clone, Eq, PartialEq)]
pub struct Query {
    pub name: &'static str,
    pub version: u32,
    pub body: &'static str,
}

impl fmt::Debug for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@v{}", self.name, self.version)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    #[error("failed to evaluate {0:?}")]
    Eval(Query, #[source] EvalError),

    #[error("{0:?} returned an empty response")]
    EmptyResponse(Query),

    #[error("{0:?} returned an unexpectedly shaped response")]
    Decode(Query, #[source] serde_json::Error),
}

impl Query {
    pub async fn eval(&self, evaluator: &dyn Evaluator, args: Vec<Value>, opts: EvalOptions) -> Result<Vec<Value>, QueryError> {
        evaluator
            .eval(self.body, args, opts)
            .await
            .map_err(|e| QueryError::Eval(*self, e))
    }

    /// `eval_decode()` evaluates the query and decodes its first returned value. A missing or
    /// `null` value is reported as `EmptyResponse`, never decoded.
    pub async fn eval_decode<T>(&self, evaluator: &dyn Evaluator, args: Vec<Value>, opts: EvalOptions) -> Result<T, QueryError>
    where
        T: DeserializeOwned,
    {
        let mut values = self.eval(evaluator, args, opts).await?;
        if values.is_empty() || values[0].is_null() {
            return Err(QueryError::EmptyResponse(*self));
        }

        serde_json::from_value(values.swap_remove(0)).map_err(|e| QueryError::Decode(*self, e))
    }
}

/// Lua encodes an empty array as an empty map. Accepts both as an empty `Vec`.
pub(crate) fn lua_array<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Value::deserialize(deserializer)?;
    match value {
        Value::Null => Ok(Vec::new()),
        Value::Object(map) if map.is_empty() => Ok(Vec::new()),
        other => serde_json::from_value(other).map_err(serde::de::Error::custom),
    }
}

/// Returns `"cartridge"`, `"centralized config"` or `"custom"`.
pub const ORCHESTRATOR: Query = Query {
    name: "orchestrator",
    version: 1,
    body: include_str!("orchestrator.lua"),
};

/// Returns `{failover, provider, replicasets: [{uuid, leaderuuid, alias, roles, vshard_group,
/// instances: [{alias, uuid, uri}]}]}`.
pub const CARTRIDGE_TOPOLOGY: Query = Query {
    name: "cartridge_topology",
    version: 1,
    body: include_str!("cartridge_topology.lua"),
};

/// Returns `{uuid, rw}` of the queried instance.
pub const CARTRIDGE_INSTANCE: Query = Query {
    name: "cartridge_instance",
    version: 1,
    body: include_str!("cartridge_instance.lua"),
};

/// Returns `{uuid, leaderuuid, alias, failover, instances: [{alias, uuid, uri}], instanceuuid,
/// instancerw}` for the queried instance's own replicaset.
pub const CCONFIG_TOPOLOGY: Query = Query {
    name: "cconfig_topology",
    version: 1,
    body: include_str!("cconfig_topology.lua"),
};

/// Same shape as `CCONFIG_TOPOLOGY`, `failover` is absent.
pub const CUSTOM_TOPOLOGY: Query = Query {
    name: "custom_topology",
    version: 1,
    body: include_str!("custom_topology.lua"),
};

/// Args: replicaset uuid, instance uuid, force. Raises on failure.
pub const CARTRIDGE_FAILOVER_PROMOTE: Query = Query {
    name: "cartridge_failover_promote",
    version: 1,
    body: include_str!("cartridge_failover_promote.lua"),
};

/// Args: edit_topology options table. Raises on failure.
pub const CARTRIDGE_EDIT_TOPOLOGY: Query = Query {
    name: "cartridge_edit_topology",
    version: 1,
    body: include_str!("cartridge_edit_topology.lua"),
};

pub const BOX_PROMOTE: Query = Query {
    name: "box_promote",
    version: 1,
    body: include_str!("box_promote.lua"),
};

pub const BOX_DEMOTE: Query = Query {
    name: "box_demote",
    version: 1,
    body: include_str!("box_demote.lua"),
};

pub const CARTRIDGE_BOOTSTRAP_VSHARD: Query = Query {
    name: "cartridge_bootstrap_vshard",
    version: 1,
    body: include_str!("cartridge_bootstrap_vshard.lua"),
};

/// Returns `true` when the instance is a router and bootstrapped the shard layer, `false` when
/// the instance is not a router.
pub const CCONFIG_BOOTSTRAP_VSHARD: Query = Query {
    name: "cconfig_bootstrap_vshard",
    version: 1,
    body: include_str!("cconfig_bootstrap_vshard.lua"),
};

/// Returns `{lsn, iid}` or `{err}`.
pub const SCHEMA_UPGRADE: Query = Query {
    name: "schema_upgrade",
    version: 1,
    body: include_str!("schema_upgrade.lua"),
};

/// Args: target version. Returns `{lsn, iid}` or `{err}`.
pub const SCHEMA_DOWNGRADE: Query = Query {
    name: "schema_downgrade",
    version: 1,
    body: include_str!("schema_downgrade.lua"),
};

/// Args: replication stream id. Returns the applied LSN of that stream.
pub const REPLICATION_LSN: Query = Query {
    name: "replication_lsn",
    version: 1,
    body: include_str!("replication_lsn.lua"),
};

/// Returns `"ok"`.
pub const SNAPSHOT: Query = Query {
    name: "snapshot",
    version: 1,
    body: include_str!("snapshot.lua"),
};
