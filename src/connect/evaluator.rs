use serde_json::Value;
use std::error::Error;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::time::Duration;

/// InstanceCtx describes a locally managed instance: where its control socket lives and how the
/// rest of the cluster reaches it.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct InstanceCtx {
    pub app_name: String,
    pub instance_name: String,
    pub console_socket: PathBuf,
    pub advertise_uri: Option<String>,
}

pub type PushCallback = Arc<dyn Fn(&Value) + Send + Sync>;

#[derive(Clone, Default)]
pub struct EvalOptions {
    /// Receives intermediate values pushed by the remote side before the final result.
    pub push_callback: Option<PushCallback>,
    pub read_timeout: Option<Duration>,
}

impl EvalOptions {
    pub fn with_timeout(read_timeout: Option<Duration>) -> Self {
        EvalOptions {
            push_callback: None,
            read_timeout,
        }
    }
}

impl fmt::Debug for EvalOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EvalOptions")
            .field("push_callback", &self.push_callback.is_some())
            .field("read_timeout", &self.read_timeout)
            .finish()
    }
}

/// Evaluator is an open control channel to one instance. It is the only way this crate talks to
/// a managed instance. The channel is closed when the value is dropped.
#[async_trait::async_trait]
pub trait Evaluator: Send + Sync {
    async fn eval(&self, expr: &str, args: Vec<Value>, opts: EvalOptions) -> Result<Vec<Value>, EvalError>;
}

/// Connector opens control channels to locally managed instances.
#[async_trait::async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, ctx: &InstanceCtx) -> Result<Box<dyn Evaluator>, ConnectError>;
}

#[derive(Debug, thiserror::Error)]
pub enum EvalError {
    #[error("remote evaluation failed: {0}")]
    Remote(String),

    #[error("timed out waiting for a response")]
    Timeout,

    #[error("transport failure")]
    Transport(#[source] Box<dyn Error + Send + Sync>),
}

#[derive(Debug, thiserror::Error)]
pub enum ConnectError {
    #[error("failed to connect to {socket:?}")]
    Unreachable {
        socket: PathBuf,
        #[source]
        source: Box<dyn Error + Send + Sync>,
    },

    #[error("unable to detect the protocol of {0:?}")]
    UnknownProtocol(PathBuf),
}
