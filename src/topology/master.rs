use crate::topology::{Master, Mode, Replicaset, Replicasets};

/// `recalculate_master()` derives the aggregate leadership state from the members' modes.
pub fn recalculate_master(replicaset: &mut Replicaset) {
    replicaset.master = master_for_modes(replicaset.instances.iter().map(|inst| inst.mode));
}

/// Applies `recalculate_master()` to every replicaset.
pub fn recalculate_masters(replicasets: &mut Replicasets) {
    for replicaset in replicasets.replicasets.iter_mut() {
        recalculate_master(replicaset);
    }
}

pub(crate) fn master_for_modes<I>(modes: I) -> Master
where
    I: IntoIterator<Item = Mode>,
{
    let mut masters = 0;
    let mut unknown = 0;
    for mode in modes {
        match mode {
            Mode::RW => masters += 1,
            Mode::Unknown => unknown += 1,
            Mode::Read => {}
        }
    }

    match (masters, unknown) {
        (m, _) if m > 1 => Master::Multi,
        (1, 0) => Master::Single,
        (0, 0) => Master::No,
        _ => Master::Unknown,
    }
}
