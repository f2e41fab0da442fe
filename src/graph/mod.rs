mod arena;
mod node_array;

pub use arena::{TensorArena, TensorId};
pub use node_array::{NodeArray, Output};
