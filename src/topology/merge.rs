use crate::topology::master::recalculate_masters;
use crate::topology::{Failover, Instance, Mode, Orchestrator, Replicaset, Replicasets, State, StateProvider};
use std::collections::HashMap;

/// TopologyMerger folds per-instance partial views of a cluster into one canonical model.
///
/// Replicasets are owned by a flat arena and addressed through a UUID index, so merging never
/// holds a reference into the arena while mutating it. The first view of a replicaset creates the
/// record. Later views only fill fields that are still unset and append instances that are not
/// yet known.
#[derive(Default)]
pub struct TopologyMerger {
    state: State,
    orchestrator: Orchestrator,
    replicasets: Vec<Replicaset>,
    replicaset_index: HashMap<String, usize>,
    // Parallel to `replicasets`.
    instance_index: Vec<HashMap<String, usize>>,
}

impl TopologyMerger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, view: Replicasets) {
        self.state = merge_state(self.state, view.state);
        if self.orchestrator == Orchestrator::Unknown {
            self.orchestrator = view.orchestrator;
        }

        for replicaset in view.replicasets {
            self.add_replicaset(replicaset);
        }
    }

    fn add_replicaset(&mut self, replicaset: Replicaset) {
        let rs_idx = match self.replicaset_index.get(&replicaset.uuid) {
            Some(idx) => *idx,
            None => {
                let idx = self.replicasets.len();
                self.replicaset_index.insert(replicaset.uuid.clone(), idx);
                self.replicasets.push(Replicaset {
                    instances: Vec::with_capacity(replicaset.instances.len()),
                    ..replicaset.clone_without_instances()
                });
                self.instance_index.push(HashMap::with_capacity(replicaset.instances.len()));
                idx
            }
        };

        fill_replicaset(&mut self.replicasets[rs_idx], &replicaset);

        for instance in replicaset.instances {
            let key = instance_key(&instance);
            match self.instance_index[rs_idx].get(&key) {
                Some(inst_idx) => {
                    let inst_idx = *inst_idx;
                    fill_instance(&mut self.replicasets[rs_idx].instances[inst_idx], instance);
                }
                None => {
                    let inst_idx = self.replicasets[rs_idx].instances.len();
                    self.instance_index[rs_idx].insert(key, inst_idx);
                    self.replicasets[rs_idx].instances.push(instance);
                }
            }
        }
    }

    /// `finish()` returns the merged model with every replicaset's master status recomputed.
    pub fn finish(self) -> Replicasets {
        let mut merged = Replicasets {
            state: self.state,
            orchestrator: self.orchestrator,
            replicasets: self.replicasets,
        };
        recalculate_masters(&mut merged);
        merged
    }
}

/// Merges partial views in order. See `TopologyMerger`.
pub fn merge_replicasets<I>(views: I) -> Replicasets
where
    I: IntoIterator<Item = Replicasets>,
{
    let mut merger = TopologyMerger::new();
    for view in views {
        merger.add(view);
    }
    merger.finish()
}

impl Replicaset {
    fn clone_without_instances(&self) -> Replicaset {
        Replicaset {
            uuid: self.uuid.clone(),
            leader_uuid: String::new(),
            alias: String::new(),
            roles: Vec::new(),
            vshard_group: String::new(),
            master: self.master,
            failover: Failover::Unknown,
            state_provider: StateProvider::Unknown,
            instances: Vec::new(),
        }
    }
}

fn instance_key(instance: &Instance) -> String {
    if instance.uuid.is_empty() {
        instance.alias.clone()
    } else {
        instance.uuid.clone()
    }
}

fn merge_state(current: State, other: State) -> State {
    match (current, other) {
        (State::Bootstrapped, _) | (_, State::Bootstrapped) => State::Bootstrapped,
        (State::Uninitialized, _) | (_, State::Uninitialized) => State::Uninitialized,
        _ => State::Unknown,
    }
}

fn fill_string(dst: &mut String, src: &str) {
    if dst.is_empty() {
        *dst = src.to_string();
    }
}

fn fill_replicaset(dst: &mut Replicaset, src: &Replicaset) {
    fill_string(&mut dst.leader_uuid, &src.leader_uuid);
    fill_string(&mut dst.alias, &src.alias);
    fill_string(&mut dst.vshard_group, &src.vshard_group);
    if dst.roles.is_empty() {
        dst.roles = src.roles.clone();
    }
    if dst.failover == Failover::Unknown {
        dst.failover = src.failover;
    }
    if dst.state_provider == StateProvider::Unknown {
        dst.state_provider = src.state_provider;
    }
}

fn fill_instance(dst: &mut Instance, src: Instance) {
    fill_string(&mut dst.alias, &src.alias);
    fill_string(&mut dst.uuid, &src.uuid);
    fill_string(&mut dst.uri, &src.uri);
    if dst.mode == Mode::Unknown {
        dst.mode = src.mode;
    }
    if dst.ctx.is_none() {
        dst.ctx = src.ctx;
    }
}
