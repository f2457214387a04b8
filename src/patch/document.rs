use crate::patch::path::get_at_path;
use serde_json::Value;

/// Where an instance lives in the cluster configuration.
#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) struct InstanceLocation {
    pub(crate) group: String,
    pub(crate) replicaset: String,
    pub(crate) instance: String,
    /// Effective `replication.failover`, as written in the configuration.
    pub(crate) failover: String,
}

/// Deep-merges documents in order. Maps are merged key by key, any other value of a later
/// document replaces the earlier one.
pub(crate) fn merge_documents<'a, I>(documents: I) -> Value
where
    I: IntoIterator<Item = &'a Value>,
{
    let mut merged = Value::Null;
    for document in documents {
        merge_into(&mut merged, document);
    }
    merged
}

fn merge_into(dst: &mut Value, src: &Value) {
    match (dst, src) {
        (Value::Object(dst_obj), Value::Object(src_obj)) => {
            for (key, src_value) in src_obj {
                match dst_obj.get_mut(key) {
                    Some(dst_value) => merge_into(dst_value, src_value),
                    None => {
                        dst_obj.insert(key.clone(), src_value.clone());
                    }
                }
            }
        }
        (_, Value::Null) => {}
        (dst, src) => *dst = src.clone(),
    }
}

fn keys(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|p| p.to_string()).collect()
}

fn failover_at(node: &Value) -> Option<&str> {
    get_at_path(node, &keys(&["replication", "failover"])).and_then(Value::as_str)
}

fn effective_failover(config: &Value, group: &Value, replicaset: &Value) -> String {
    failover_at(replicaset)
        .or_else(|| failover_at(group))
        .or_else(|| failover_at(config))
        .unwrap_or("off")
        .to_string()
}

/// Finds the group and replicaset of the instance named `instance`.
pub(crate) fn locate_instance(config: &Value, instance: &str) -> Option<InstanceLocation> {
    let groups = config.get("groups")?.as_object()?;
    for (group_name, group) in groups {
        let replicasets = match group.get("replicasets").and_then(Value::as_object) {
            Some(replicasets) => replicasets,
            None => continue,
        };
        for (replicaset_name, replicaset) in replicasets {
            let found = replicaset
                .get("instances")
                .and_then(Value::as_object)
                .map(|instances| instances.contains_key(instance))
                .unwrap_or(false);
            if found {
                return Some(InstanceLocation {
                    group: group_name.clone(),
                    replicaset: replicaset_name.clone(),
                    instance: instance.to_string(),
                    failover: effective_failover(config, group, replicaset),
                });
            }
        }
    }
    None
}

/// Finds the group of the replicaset named `replicaset`.
pub(crate) fn locate_replicaset(config: &Value, replicaset: &str) -> Option<String> {
    let groups = config.get("groups")?.as_object()?;
    groups
        .iter()
        .find(|(_, group)| {
            group
                .get("replicasets")
                .and_then(Value::as_object)
                .map(|replicasets| replicasets.contains_key(replicaset))
                .unwrap_or(false)
        })
        .map(|(group_name, _)| group_name.clone())
}
