mod evaluator;
mod fanout;

pub use evaluator::ConnectError;
pub use evaluator::Connector;
pub use evaluator::EvalError;
pub use evaluator::EvalOptions;
pub use evaluator::Evaluator;
pub use evaluator::InstanceCtx;
pub use evaluator::PushCallback;
pub use fanout::EvalFanout;
pub use fanout::FanoutError;
pub use fanout::Flow;
pub use fanout::InstanceEval;
