use bytes::Bytes;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::io;
use std::path::PathBuf;

/// RawDocument is a configuration document as read from its source.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RawDocument {
    pub key: String,
    pub data: Bytes,
    pub revision: i64,
}

/// DataCollector reads every configuration document of the cluster.
#[async_trait::async_trait]
pub trait DataCollector: Send + Sync {
    async fn collect(&self) -> Result<Vec<RawDocument>, CollectError>;
}

/// DataPublisher writes a document back to its source, iff the source is still at
/// `expected_revision`.
#[async_trait::async_trait]
pub trait DataPublisher: Send + Sync {
    async fn publish(&self, key: &str, expected_revision: i64, data: Bytes) -> Result<(), PublishError>;
}

/// KeyPicker chooses which of several ordered candidate documents receives a mutation.
pub trait KeyPicker: Send + Sync {
    fn pick(&self, keys: &[String], force: bool) -> Result<usize, PickError>;
}

#[derive(Debug, thiserror::Error)]
pub enum CollectError {
    #[error("failed to read {path:?}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("configuration storage failure: {0}")]
    Storage(String),
}

#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("{key} changed since it was read: expected revision {expected}, found {actual}")]
    RevisionMismatch { key: String, expected: i64, actual: i64 },

    #[error("unknown configuration source {0}")]
    UnknownKey(String),

    #[error("failed to write {key}")]
    Io {
        key: String,
        #[source]
        source: io::Error,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum PickError {
    #[error("several configuration sources may be patched, choose one of: {0:?}")]
    SelectionRequired(Vec<String>),

    #[error("selected index {0} is out of range")]
    OutOfRange(usize),

    #[error("selection cancelled")]
    Cancelled,
}

/// TopCandidatePicker takes the highest priority candidate when forced, and otherwise asks for an
/// explicit choice.
#[derive(Copy, Clone, Debug, Default)]
pub struct TopCandidatePicker;

impl KeyPicker for TopCandidatePicker {
    fn pick(&self, keys: &[String], force: bool) -> Result<usize, PickError> {
        if force && !keys.is_empty() {
            Ok(0)
        } else {
            Err(PickError::SelectionRequired(keys.to_vec()))
        }
    }
}

/// FileConfigStore collects and publishes configuration documents kept in local files. The
/// source key of a document is its path. Files have no native revision, so the revision is a hash
/// of the content, re-checked right before writing.
#[derive(Clone, Debug)]
pub struct FileConfigStore {
    paths: Vec<PathBuf>,
}

impl FileConfigStore {
    pub fn new(paths: Vec<PathBuf>) -> Self {
        FileConfigStore { paths }
    }

    fn path_for(&self, key: &str) -> Option<&PathBuf> {
        self.paths.iter().find(|p| p.to_string_lossy() == key)
    }
}

pub(crate) fn content_revision(data: &[u8]) -> i64 {
    let mut hasher = DefaultHasher::new();
    data.hash(&mut hasher);
    hasher.finish() as i64
}

#[async_trait::async_trait]
impl DataCollector for FileConfigStore {
    async fn collect(&self) -> Result<Vec<RawDocument>, CollectError> {
        let mut documents = Vec::with_capacity(self.paths.len());
        for path in &self.paths {
            let data = tokio::fs::read(path).await.map_err(|e| CollectError::Io {
                path: path.clone(),
                source: e,
            })?;
            documents.push(RawDocument {
                key: path.to_string_lossy().into_owned(),
                revision: content_revision(&data),
                data: Bytes::from(data),
            });
        }
        Ok(documents)
    }
}

#[async_trait::async_trait]
impl DataPublisher for FileConfigStore {
    async fn publish(&self, key: &str, expected_revision: i64, data: Bytes) -> Result<(), PublishError> {
        let path = self
            .path_for(key)
            .ok_or_else(|| PublishError::UnknownKey(key.to_string()))?;

        let current = tokio::fs::read(path).await.map_err(|e| PublishError::Io {
            key: key.to_string(),
            source: e,
        })?;
        let actual = content_revision(&current);
        if actual != expected_revision {
            return Err(PublishError::RevisionMismatch {
                key: key.to_string(),
                expected: expected_revision,
                actual,
            });
        }

        tokio::fs::write(path, &data).await.map_err(|e| PublishError::Io {
            key: key.to_string(),
            source: e,
        })
    }
}
