use crate::patch::get_cconfig_path_depth;
use serde_json::Value;
use std::cmp::Ordering;

/// PatchTarget is one candidate configuration document for a topology mutation.
#[derive(Clone, Debug, PartialEq)]
pub struct PatchTarget {
    pub key: String,
    pub revision: i64,
    pub document: Value,
    /// Depth of the longest existing prefix of the target path in `document`.
    pub priority: usize,
}

/// Orders candidates by priority, highest first, then by source key. The sort is stable.
pub fn sort_patch_targets(targets: &mut [PatchTarget]) {
    targets.sort_by(compare_targets);
}

fn compare_targets(a: &PatchTarget, b: &PatchTarget) -> Ordering {
    b.priority.cmp(&a.priority).then_with(|| a.key.cmp(&b.key))
}

/// Keeps the documents in which the target path exists at least down to `min_depth`. Blank
/// documents are never candidates.
pub(crate) fn select_candidates(
    documents: Vec<(String, i64, Value)>,
    path: &[String],
    min_depth: usize,
) -> Vec<PatchTarget> {
    let mut targets: Vec<PatchTarget> = documents
        .into_iter()
        .filter(|(_, _, document)| !document.is_null())
        .filter_map(|(key, revision, document)| {
            get_cconfig_path_depth(&document, path, min_depth).map(|priority| PatchTarget {
                key,
                revision,
                document,
                priority,
            })
        })
        .collect();
    sort_patch_targets(&mut targets);
    targets
}
