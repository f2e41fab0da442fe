mod hyper;
mod topology;
mod variant;

pub use hyper::{HyperParams, ModelConfig, VocabDims};
pub use topology::{CharWidths, LayerWidths, Stage, TopologyConfig, WindowWidths};
pub use variant::{LayerKind, Variant};
