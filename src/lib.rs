pub mod config;
pub mod graph;
pub mod initialization;
pub mod nodes;
pub mod optimization;
pub mod params;
pub mod persist;

mod error;
mod feature;
mod labeler;
mod topology;

pub use error::{LabelerErr, Result};
pub use feature::{Feature, Vocabulary};
pub use labeler::Labeler;
pub use topology::ComputationGraph;
