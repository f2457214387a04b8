mod options;
mod pipeline;
mod time;

pub use options::UpgradeOptions;
pub use pipeline::validate_version;
pub use pipeline::SchemaChange;
pub use pipeline::UpgradeError;
pub use pipeline::Upgrader;
