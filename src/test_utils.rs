use crate::connect::{ConnectError, Connector, EvalError, EvalOptions, Evaluator, InstanceCtx};
use crate::scripts::Query;
use serde_json::Value;
use std::collections::{HashMap, HashSet, VecDeque};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

pub(crate) fn test_logger() -> slog::Logger {
    slog::Logger::root(slog::Discard, slog::o!())
}

enum Reply {
    Value(Vec<Value>),
    Error(String),
}

#[derive(Default)]
struct InstanceState {
    // The last queued reply for a query repeats forever.
    replies: HashMap<&'static str, VecDeque<Reply>>,
    calls: Vec<(&'static str, Vec<Value>)>,
    bodies: HashMap<String, &'static str>,
}

/// MockInstance answers registered queries with scripted replies and records every call.
#[derive(Clone, Default)]
pub(crate) struct MockInstance {
    state: Arc<Mutex<InstanceState>>,
}

impl MockInstance {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn respond(&self, query: &Query, value: Value) -> &Self {
        self.respond_seq(query, vec![value])
    }

    pub(crate) fn respond_seq(&self, query: &Query, values: Vec<Value>) -> &Self {
        let mut state = self.state.lock().unwrap();
        state.bodies.insert(query.body.to_string(), query.name);
        let replies = state.replies.entry(query.name).or_default();
        replies.clear();
        replies.extend(values.into_iter().map(|v| Reply::Value(vec![v])));
        self
    }

    pub(crate) fn respond_many(&self, query: &Query, values: Vec<Value>) -> &Self {
        let mut state = self.state.lock().unwrap();
        state.bodies.insert(query.body.to_string(), query.name);
        let replies = state.replies.entry(query.name).or_default();
        replies.clear();
        replies.push_back(Reply::Value(values));
        self
    }

    pub(crate) fn fail(&self, query: &Query, message: &str) -> &Self {
        let mut state = self.state.lock().unwrap();
        state.bodies.insert(query.body.to_string(), query.name);
        let replies = state.replies.entry(query.name).or_default();
        replies.clear();
        replies.push_back(Reply::Error(message.to_string()));
        self
    }

    pub(crate) fn calls(&self, query: &Query) -> Vec<Vec<Value>> {
        self.state
            .lock()
            .unwrap()
            .calls
            .iter()
            .filter(|(name, _)| *name == query.name)
            .map(|(_, args)| args.clone())
            .collect()
    }

    pub(crate) fn total_calls(&self) -> usize {
        self.state.lock().unwrap().calls.len()
    }
}

#[async_trait::async_trait]
impl Evaluator for MockInstance {
    async fn eval(&self, expr: &str, args: Vec<Value>, _opts: EvalOptions) -> Result<Vec<Value>, EvalError> {
        let mut state = self.state.lock().unwrap();
        let name = match state.bodies.get(expr) {
            Some(name) => *name,
            None => return Err(EvalError::Remote("unexpected expression".to_string())),
        };
        state.calls.push((name, args));

        let replies = state.replies.get_mut(name).expect("registered query has replies");
        let reply = if replies.len() > 1 {
            replies.pop_front().expect("non-empty")
        } else {
            match replies.front().expect("non-empty") {
                Reply::Value(v) => Reply::Value(v.clone()),
                Reply::Error(e) => Reply::Error(e.clone()),
            }
        };

        match reply {
            Reply::Value(v) => Ok(v),
            Reply::Error(e) => Err(EvalError::Remote(e)),
        }
    }
}

struct MockChannel {
    instance: MockInstance,
    open_channels: Arc<AtomicUsize>,
}

#[async_trait::async_trait]
impl Evaluator for MockChannel {
    async fn eval(&self, expr: &str, args: Vec<Value>, opts: EvalOptions) -> Result<Vec<Value>, EvalError> {
        self.instance.eval(expr, args, opts).await
    }
}

impl Drop for MockChannel {
    fn drop(&mut self) {
        self.open_channels.fetch_sub(1, Ordering::SeqCst);
    }
}

#[derive(Default)]
struct ClusterState {
    order: Vec<String>,
    instances: HashMap<String, MockInstance>,
    unreachable: HashSet<String>,
}

/// MockCluster is a `Connector` over a set of named `MockInstance`s.
#[derive(Clone, Default)]
pub(crate) struct MockCluster {
    state: Arc<Mutex<ClusterState>>,
    open_channels: Arc<AtomicUsize>,
}

impl MockCluster {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn add_instance(&self, name: &str) -> MockInstance {
        let instance = MockInstance::new();
        let mut state = self.state.lock().unwrap();
        state.order.push(name.to_string());
        state.instances.insert(name.to_string(), instance.clone());
        instance
    }

    pub(crate) fn instance(&self, name: &str) -> MockInstance {
        self.state.lock().unwrap().instances[name].clone()
    }

    pub(crate) fn set_unreachable(&self, name: &str) {
        self.state.lock().unwrap().unreachable.insert(name.to_string());
    }

    pub(crate) fn ctx(&self, name: &str) -> InstanceCtx {
        InstanceCtx {
            app_name: "app".to_string(),
            instance_name: name.to_string(),
            console_socket: PathBuf::from(format!("/var/run/app/{}.control", name)),
            advertise_uri: Some(format!("{}.local:3301", name)),
        }
    }

    pub(crate) fn contexts(&self) -> Vec<InstanceCtx> {
        let order = self.state.lock().unwrap().order.clone();
        order.iter().map(|name| self.ctx(name)).collect()
    }

    pub(crate) fn open_channels(&self) -> usize {
        self.open_channels.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl Connector for MockCluster {
    async fn connect(&self, ctx: &InstanceCtx) -> Result<Box<dyn Evaluator>, ConnectError> {
        let state = self.state.lock().unwrap();
        if state.unreachable.contains(&ctx.instance_name) {
            return Err(ConnectError::Unreachable {
                socket: ctx.console_socket.clone(),
                source: "connection refused".into(),
            });
        }
        let instance = match state.instances.get(&ctx.instance_name) {
            Some(instance) => instance.clone(),
            None => return Err(ConnectError::UnknownProtocol(ctx.console_socket.clone())),
        };

        self.open_channels.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockChannel {
            instance,
            open_channels: self.open_channels.clone(),
        }))
    }
}
