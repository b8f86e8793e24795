// Remote piping node and the busy-wait primitive it is built on.
pub mod pipe;
pub mod waiting;

pub use pipe::{NodeConfig, NodeError, NodeState, PipeNode, DEFAULT_CONNECTION_TIMEOUT};
pub use waiting::{await_condition, Clock, SystemClock, TimeoutError};
