use log::{debug, info};
use ndarray::ArrayView1;
use rand::{SeedableRng, rngs::StdRng};

use super::channel::Channel;
use crate::{
    LabelerErr, Result,
    config::TopologyConfig,
    feature::Feature,
    graph::{Output, TensorArena, TensorId},
    nodes::{ActFn, AffineNode, ConcatNode, SoftmaxLoss},
    params::{Gradients, ModelParams, ParameterStore},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Cleared,
    Evaluated,
    Differentiated,
}

/// The preallocated graph of one topology variant.
///
/// Every node is created once, sized to the configured maxima, and reused for every example:
/// [`ComputationGraph::forward`] clears the state left by the previous example, evaluates the
/// active prefix of each node array and leaves every intermediate output readable until the
/// next call.
#[derive(Debug)]
pub struct ComputationGraph {
    config: TopologyConfig,
    params: ModelParams,
    arena: TensorArena,
    words: Channel,
    chars: Option<Channel>,
    concat: ConcatNode,
    output: AffineNode,
    loss: SoftmaxLoss,
    rng: StdRng,
    phase: Phase,
}

impl ComputationGraph {
    /// Creates a new `ComputationGraph`.
    ///
    /// # Arguments
    /// * `config` - The derived topology.
    /// * `params` - The units every node will be bound to.
    ///
    /// # Returns
    /// The graph, or a configuration error if the units don't fit the topology.
    pub fn new(config: &TopologyConfig, params: &ModelParams) -> Result<Self> {
        config.verify()?;
        params.check(config)?;

        let mut arena = TensorArena::new();
        let drop_prob = config.drop_prob();

        let layers: Vec<_> = params
            .layers
            .iter()
            .copied()
            .zip(config.layers().iter().copied())
            .collect();
        let words = Channel::words(
            &mut arena,
            params.words,
            &layers,
            drop_prob,
            config.max_words(),
        );

        let chars = match (params.chars, params.char_hidden, config.chars()) {
            (Some(table), Some(hidden), Some(widths)) => Some(Channel::chars(
                &mut arena,
                table,
                hidden,
                widths,
                drop_prob,
                config.max_chars(),
            )),
            _ => None,
        };

        let concat = ConcatNode::new(&mut arena, config.concat_width());
        let output = AffineNode::new(&mut arena, config.labels(), 0.);

        let rng = match config.hyper().seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };

        info!(
            variant = config.variant().name(),
            tensors = arena.len(),
            max_words = config.max_words(),
            max_chars = config.max_chars();
            "preallocated computation graph"
        );

        Ok(Self {
            config: config.clone(),
            params: params.clone(),
            arena,
            words,
            chars,
            concat,
            output,
            loss: SoftmaxLoss::new(config.labels()),
            rng,
            phase: Phase::Cleared,
        })
    }

    /// Resets every node touched by the previous example.
    pub fn clear(&mut self) {
        self.arena.clear();
        self.words.reset();
        if let Some(chars) = &mut self.chars {
            chars.reset();
        }
        self.phase = Phase::Cleared;
    }

    /// Reseeds the dropout mask generator.
    pub fn reseed(&mut self, seed: u64) {
        self.rng = StdRng::seed_from_u64(seed);
    }

    fn check(&self, feature: &Feature) -> Result<()> {
        if feature.words.is_empty() {
            return Err(LabelerErr::EmptySequence { channel: "words" });
        }
        if self.chars.is_some() && feature.chars.is_empty() {
            return Err(LabelerErr::EmptySequence { channel: "chars" });
        }
        Ok(())
    }

    /// Evaluates the graph over one example.
    ///
    /// Sequences longer than the configured maxima are truncated to their prefix.
    ///
    /// # Arguments
    /// * `store` - The store the graph's units live in.
    /// * `feature` - The example to evaluate.
    /// * `train` - Whether dropout is applied.
    ///
    /// # Returns
    /// The output scores, or an `EmptySequence` error, in which case no node state is touched.
    pub fn forward(
        &mut self,
        store: &ParameterStore,
        feature: &Feature,
        train: bool,
    ) -> Result<ArrayView1<'_, f32>> {
        self.check(feature)?;
        self.clear();

        if feature.words.len() > self.config.max_words() {
            debug!(got = feature.words.len(), kept = self.config.max_words(); "truncating words");
        }

        let w = self
            .words
            .forward(&mut self.arena, store, &feature.words, &mut self.rng, train);

        match &mut self.chars {
            Some(chars) => {
                if feature.chars.len() > self.config.max_chars() {
                    debug!(
                        got = feature.chars.len(),
                        kept = self.config.max_chars();
                        "truncating chars"
                    );
                }
                let c = chars.forward(&mut self.arena, store, &feature.chars, &mut self.rng, train);
                self.concat.forward(&mut self.arena, &[w, c]);
            }
            None => self.concat.forward(&mut self.arena, &[w]),
        }

        self.output.forward(
            &mut self.arena,
            store,
            &self.params.output,
            ActFn::Identity,
            self.concat.output(),
            &mut self.rng,
            train,
        );
        self.loss.forward(self.arena.val(self.output.output()));
        self.phase = Phase::Evaluated;

        Ok(self.arena.val(self.output.output()))
    }

    fn check_label(&self, gold: usize) -> Result<()> {
        let labels = self.config.labels();
        if gold >= labels {
            return Err(LabelerErr::LabelOutOfRange { label: gold, labels });
        }
        Ok(())
    }

    fn expect_evaluated(&self) {
        assert_ne!(self.phase, Phase::Cleared, "graph read before forward");
    }

    /// The negative log-likelihood of `gold` under the last evaluated example.
    ///
    /// # Panics
    /// If no example was evaluated since the last clear.
    pub fn cost(&self, gold: usize) -> Result<f32> {
        self.check_label(gold)?;
        self.expect_evaluated();
        Ok(self.loss.loss(gold))
    }

    /// Backpropagates the loss of `gold` through the last evaluated example.
    ///
    /// # Arguments
    /// * `store` - The store the forward pass read.
    /// * `gold` - The expected label.
    /// * `grads` - Where the gradient of every unit is accumulated.
    ///
    /// # Returns
    /// The loss.
    ///
    /// # Panics
    /// If the last example was not evaluated or was already backpropagated.
    pub fn backward(
        &mut self,
        store: &ParameterStore,
        gold: usize,
        grads: &mut Gradients,
    ) -> Result<f32> {
        self.check_label(gold)?;
        if grads.layout() != store.layout() {
            return Err(LabelerErr::SizeMismatch {
                what: "gradient layout",
                got: grads.layout().size(),
                expected: store.layout().size(),
            });
        }
        assert_eq!(self.phase, Phase::Evaluated, "backward needs exactly one forward pass");

        self.loss.backward(gold, self.arena.grad_mut(self.output.output()));
        self.output
            .backward(&mut self.arena, store, grads, &self.params.output, ActFn::Identity);
        self.concat.backward(&mut self.arena);

        if let Some(chars) = &mut self.chars {
            chars.backward(&mut self.arena, store, grads);
        }
        self.words.backward(&mut self.arena, store, grads);

        self.phase = Phase::Differentiated;
        Ok(self.loss.loss(gold))
    }

    /// The highest scoring label of the last evaluated example.
    pub fn predict(&self) -> usize {
        self.expect_evaluated();
        SoftmaxLoss::predict(self.arena.val(self.output.output()))
    }

    /// The label distribution of the last evaluated example.
    pub fn probs(&self) -> ArrayView1<'_, f32> {
        self.expect_evaluated();
        self.loss.probs()
    }

    pub fn config(&self) -> &TopologyConfig {
        &self.config
    }

    pub fn arena(&self) -> &TensorArena {
        &self.arena
    }

    /// The value of any intermediate tensor of the last evaluated example.
    pub fn value(&self, id: TensorId) -> ArrayView1<'_, f32> {
        self.arena.val(id)
    }

    /// The amount of word positions evaluated, after truncation.
    pub fn word_len(&self) -> usize {
        self.words.len()
    }

    pub fn char_len(&self) -> usize {
        self.chars.as_ref().map_or(0, Channel::len)
    }

    pub fn word_lookups(&self) -> &[TensorId] {
        self.words.lookup_outputs()
    }

    /// The windows feeding word layer `k`, `None` if the layer doesn't re-window.
    pub fn word_windows(&self, k: usize) -> Option<&[TensorId]> {
        self.words.layer(k)?.window_outputs()
    }

    /// The per-position outputs of word layer `k`.
    pub fn word_layer(&self, k: usize) -> Option<&[TensorId]> {
        self.words.layer(k).map(|layer| layer.outputs())
    }

    /// The avg, max and min pooled word outputs.
    pub fn word_pooled(&self) -> [TensorId; 3] {
        self.words.pooled()
    }

    pub fn char_windows(&self) -> Option<&[TensorId]> {
        self.chars.as_ref()?.layer(0)?.window_outputs()
    }

    pub fn char_hidden(&self) -> Option<&[TensorId]> {
        self.chars.as_ref()?.layer(0).map(|layer| layer.outputs())
    }

    pub fn char_pooled(&self) -> Option<[TensorId; 3]> {
        self.chars.as_ref().map(Channel::pooled)
    }

    pub fn word_output(&self) -> TensorId {
        self.words.output()
    }

    pub fn char_output(&self) -> Option<TensorId> {
        self.chars.as_ref().map(Channel::output)
    }

    pub fn concat_output(&self) -> TensorId {
        self.concat.output()
    }

    pub fn scores(&self) -> TensorId {
        self.output.output()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        config::{HyperParams, Variant, VocabDims},
        params::ParameterLayout,
    };

    fn setup(
        variant: Variant,
        seed: u64,
    ) -> (ComputationGraph, ParameterStore, Arc<ParameterLayout>) {
        let hyper = HyperParams {
            word_context: 1,
            char_context: 1,
            hidden_size: 4,
            char_hidden_size: 3,
            layers: 2,
            max_sentence_length: 6,
            max_char_length: 8,
            seed: Some(seed),
            ..Default::default()
        };
        let dims = VocabDims {
            word_vocab: 10,
            word_dim: 3,
            char_vocab: 6,
            char_dim: 2,
            labels: 4,
        };
        let config = TopologyConfig::derive(variant, hyper, dims).unwrap();
        let (params, layout) = ModelParams::new(&config).unwrap();
        let mut store = ParameterStore::new(layout.clone());
        params.initialize(&mut store, StdRng::seed_from_u64(seed)).unwrap();

        (ComputationGraph::new(&config, &params).unwrap(), store, layout)
    }

    #[test]
    fn empty_chars_are_rejected_before_any_node_runs() {
        let (mut graph, store, _) = setup(Variant::CnnChar, 1);
        let tensors = graph.arena().len();

        let err = graph.forward(&store, &Feature::words(vec![1, 2]), false).unwrap_err();
        assert!(matches!(err, LabelerErr::EmptySequence { channel: "chars" }));
        assert_eq!(graph.word_len(), 0);
        assert_eq!(graph.arena().len(), tensors);

        let err = graph.forward(&store, &Feature::new(vec![], vec![1]), false).unwrap_err();
        assert!(matches!(err, LabelerErr::EmptySequence { channel: "words" }));
    }

    #[test]
    fn word_only_variants_ignore_chars() {
        let (mut graph, store, _) = setup(Variant::CnnMl, 1);

        let scores = graph.forward(&store, &Feature::words(vec![1, 2, 3]), false).unwrap();
        assert_eq!(scores.len(), 4);
        assert_eq!(graph.char_len(), 0);
        assert!(graph.char_output().is_none());
        assert!((graph.probs().sum() - 1.).abs() < 1e-5);
    }

    #[test]
    fn long_examples_are_truncated() {
        let (mut graph, store, _) = setup(Variant::BiGrnnMlChar, 1);
        let feature = Feature::new((0..9).collect(), vec![1; 20]);

        graph.forward(&store, &feature, false).unwrap();
        assert_eq!(graph.word_len(), 6);
        assert_eq!(graph.char_len(), 8);
        assert_eq!(graph.word_layer(1).unwrap().len(), 6);
    }

    #[test]
    fn out_of_range_labels_are_rejected() {
        let (mut graph, store, layout) = setup(Variant::RnnMl, 1);
        graph.forward(&store, &Feature::words(vec![1, 2]), true).unwrap();

        let mut grads = Gradients::new(layout);
        assert!(matches!(
            graph.backward(&store, 4, &mut grads),
            Err(LabelerErr::LabelOutOfRange { label: 4, labels: 4 })
        ));
        assert!(graph.cost(7).is_err());
    }

    #[test]
    fn backward_accumulates_every_unit() {
        let (mut graph, store, layout) = setup(Variant::BiGrnnMlChar, 2);
        let feature = Feature::new(vec![1, 2, 3], vec![1, 2, 3, 4]);
        let mut grads = Gradients::new(layout.clone());

        graph.forward(&store, &feature, true).unwrap();
        let loss = graph.backward(&store, 1, &mut grads).unwrap();
        assert!(loss > 0.);

        for (tensor, entry) in layout.iter() {
            let weight = [".E", ".W", ".Wx"].iter().any(|&s| entry.name.ends_with(s));
            if weight {
                assert!(
                    grads.tensor(tensor).iter().any(|&g| g != 0.),
                    "no gradient reached {}",
                    entry.name
                );
            }
        }
    }

    #[test]
    #[should_panic(expected = "exactly one forward pass")]
    fn backward_twice_panics() {
        let (mut graph, store, layout) = setup(Variant::CnnMl, 1);
        let mut grads = Gradients::new(layout);

        graph.forward(&store, &Feature::words(vec![1]), false).unwrap();
        graph.backward(&store, 0, &mut grads).unwrap();
        graph.backward(&store, 0, &mut grads).unwrap();
    }
}
