//! Configuration patch engine for clusters whose source of truth is a set of configuration
//! documents rather than the live instances.
mod document;
mod engine;
mod path;
mod store;
mod target;

pub use engine::PatchAction;
pub use engine::PatchEngine;
pub use engine::PatchError;
pub use engine::PatchOutcome;
pub use engine::RolesScope;
pub use path::get_cconfig_path_depth;
pub use store::CollectError;
pub use store::DataCollector;
pub use store::DataPublisher;
pub use store::FileConfigStore;
pub use store::KeyPicker;
pub use store::PickError;
pub use store::PublishError;
pub use store::RawDocument;
pub use store::TopCandidatePicker;
pub use target::sort_patch_targets;
pub use target::PatchTarget;
