#![allow(dead_code)]

use neural_labeler::{
    ComputationGraph, Feature,
    config::{HyperParams, TopologyConfig, Variant, VocabDims},
    params::{ModelParams, ParameterStore},
};
use rand::{SeedableRng, rngs::StdRng};

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn hyper(layers: usize, hidden_size: usize) -> HyperParams {
    HyperParams {
        word_context: 1,
        char_context: 1,
        hidden_size,
        char_hidden_size: 3,
        layers,
        seed: Some(5),
        ..Default::default()
    }
}

pub fn dims(word_dim: usize) -> VocabDims {
    VocabDims {
        word_vocab: 16,
        word_dim,
        char_vocab: 10,
        char_dim: 2,
        labels: 3,
    }
}

/// A graph together with an initialized store for it.
pub struct Fixture {
    pub config: TopologyConfig,
    pub params: ModelParams,
    pub store: ParameterStore,
    pub graph: ComputationGraph,
}

impl Fixture {
    pub fn new(variant: Variant, hyper: HyperParams, dims: VocabDims) -> Self {
        init_logger();

        let config = TopologyConfig::derive(variant, hyper, dims).unwrap();
        let (params, layout) = ModelParams::new(&config).unwrap();
        let mut store = ParameterStore::new(layout);
        params.initialize(&mut store, StdRng::seed_from_u64(17)).unwrap();
        let graph = ComputationGraph::new(&config, &params).unwrap();

        Self {
            config,
            params,
            store,
            graph,
        }
    }

    pub fn small(variant: Variant) -> Self {
        Self::new(variant, hyper(2, 4), dims(3))
    }

    /// A new graph over the same units.
    pub fn fresh_graph(&self) -> ComputationGraph {
        ComputationGraph::new(&self.config, &self.params).unwrap()
    }
}

pub fn feature(words: &[usize], chars: &[usize]) -> Feature {
    Feature::new(words.to_vec(), chars.to_vec())
}
