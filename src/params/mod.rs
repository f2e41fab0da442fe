mod handle;
mod layout;
mod model;
mod store;
mod units;

pub use handle::ParameterHandle;
pub use layout::{ParameterLayout, Shape, TensorEntry, TensorRef};
pub use model::{LayerParams, ModelParams};
pub use store::{Gradients, ParameterStore};
pub use units::{GateParams, GrnnParams, LookupTable, ParamUnit, RnnParams, UniParams};
