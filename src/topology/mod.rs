mod channel;
mod graph;
mod pool;

pub use graph::ComputationGraph;
pub(crate) use pool::GraphPool;
