use rand::Rng;

use crate::{
    config::{CharWidths, LayerWidths},
    graph::{NodeArray, Output, TensorArena, TensorId},
    nodes::{
        ActFn, AffineLayer, Cell, ConcatNode, Direction, LookupLayer, PoolKind, PoolingNode,
        RecurrentBuilder, WindowBuilder,
    },
    params::{Gradients, LayerParams, LookupTable, ParameterStore, UniParams},
};

/// One stacked layer of a channel.
#[derive(Debug)]
pub(super) enum LayerStage {
    Cnn {
        window: WindowBuilder,
        hidden: AffineLayer,
    },
    Rnn {
        window: WindowBuilder,
        rnn: RecurrentBuilder,
    },
    BiGrnn {
        window: Option<WindowBuilder>,
        left: RecurrentBuilder,
        right: RecurrentBuilder,
        concats: NodeArray<ConcatNode>,
    },
}

impl LayerStage {
    fn new(
        arena: &mut TensorArena,
        params: &LayerParams,
        widths: &LayerWidths,
        drop_prob: f32,
        capacity: usize,
    ) -> Self {
        let window = |arena: &mut TensorArena| {
            widths
                .window
                .map(|w| WindowBuilder::new(arena, w.input, w.context, capacity))
        };

        match *params {
            LayerParams::Cnn(unit) => LayerStage::Cnn {
                window: window(arena).expect("cnn layers are always windowed"),
                hidden: AffineLayer::new(arena, unit, ActFn::Tanh, drop_prob, capacity),
            },
            LayerParams::Rnn(unit) => LayerStage::Rnn {
                window: window(arena).expect("rnn layers are always windowed"),
                rnn: RecurrentBuilder::new(
                    arena,
                    Cell::Plain(unit),
                    Direction::LeftToRight,
                    drop_prob,
                    capacity,
                ),
            },
            LayerParams::BiGrnn { left, right } => LayerStage::BiGrnn {
                window: window(arena),
                left: RecurrentBuilder::new(
                    arena,
                    Cell::Gated(left),
                    Direction::LeftToRight,
                    drop_prob,
                    capacity,
                ),
                right: RecurrentBuilder::new(
                    arena,
                    Cell::Gated(right),
                    Direction::RightToLeft,
                    drop_prob,
                    capacity,
                ),
                concats: NodeArray::new(capacity, |_| ConcatNode::new(arena, widths.output)),
            },
        }
    }

    fn forward<R: Rng>(
        &mut self,
        arena: &mut TensorArena,
        store: &ParameterStore,
        inputs: &[TensorId],
        rng: &mut R,
        train: bool,
    ) {
        match self {
            LayerStage::Cnn { window, hidden } => {
                let x = window.forward(arena, inputs);
                hidden.forward(arena, store, x, rng, train);
            }
            LayerStage::Rnn { window, rnn } => {
                let x = window.forward(arena, inputs);
                rnn.forward(arena, store, x, rng, train);
            }
            LayerStage::BiGrnn {
                window,
                left,
                right,
                concats,
            } => {
                let x = match window {
                    Some(window) => window.forward(arena, inputs),
                    None => inputs,
                };
                let lefts = left.forward(arena, store, x, rng, train);
                let rights = right.forward(arena, store, x, rng, train);

                concats.activate(x.len());
                for ((node, &l), &r) in concats.nodes_mut().iter_mut().zip(lefts).zip(rights) {
                    node.forward(arena, &[l, r]);
                }
            }
        }
    }

    fn backward(&mut self, arena: &mut TensorArena, store: &ParameterStore, grads: &mut Gradients) {
        match self {
            LayerStage::Cnn { window, hidden } => {
                hidden.backward(arena, store, grads);
                window.backward(arena);
            }
            LayerStage::Rnn { window, rnn } => {
                rnn.backward(arena, store, grads);
                window.backward(arena);
            }
            LayerStage::BiGrnn {
                window,
                left,
                right,
                concats,
            } => {
                for node in concats.nodes() {
                    node.backward(arena);
                }
                left.backward(arena, store, grads);
                right.backward(arena, store, grads);
                if let Some(window) = window {
                    window.backward(arena);
                }
            }
        }
    }

    /// The windows feeding the layer, if it re-windows its input.
    pub(super) fn window_outputs(&self) -> Option<&[TensorId]> {
        match self {
            LayerStage::Cnn { window, .. } | LayerStage::Rnn { window, .. } => {
                Some(window.outputs())
            }
            LayerStage::BiGrnn { window, .. } => window.as_ref().map(WindowBuilder::outputs),
        }
    }

    pub(super) fn outputs(&self) -> &[TensorId] {
        match self {
            LayerStage::Cnn { hidden, .. } => hidden.outputs(),
            LayerStage::Rnn { rnn, .. } => rnn.outputs(),
            LayerStage::BiGrnn { concats, .. } => concats.outputs(),
        }
    }

    fn reset(&mut self) {
        match self {
            LayerStage::Cnn { window, hidden } => {
                window.reset();
                hidden.reset();
            }
            LayerStage::Rnn { window, rnn } => {
                window.reset();
                rnn.reset();
            }
            LayerStage::BiGrnn {
                window,
                left,
                right,
                concats,
            } => {
                if let Some(window) = window {
                    window.reset();
                }
                left.reset();
                right.reset();
                concats.reset();
            }
        }
    }
}

/// Avg, max and min pooling over a sequence, concatenated in that order.
#[derive(Debug)]
struct Pooling {
    avg: PoolingNode,
    max: PoolingNode,
    min: PoolingNode,
    concat: ConcatNode,
}

impl Pooling {
    fn new(arena: &mut TensorArena, width: usize, capacity: usize) -> Self {
        Self {
            avg: PoolingNode::new(arena, PoolKind::Avg, width, capacity),
            max: PoolingNode::new(arena, PoolKind::Max, width, capacity),
            min: PoolingNode::new(arena, PoolKind::Min, width, capacity),
            concat: ConcatNode::new(arena, 3 * width),
        }
    }

    fn forward(&mut self, arena: &mut TensorArena, inputs: &[TensorId]) -> TensorId {
        self.avg.forward(arena, inputs);
        self.max.forward(arena, inputs);
        self.min.forward(arena, inputs);
        self.concat.forward(arena, &[self.avg.output(), self.max.output(), self.min.output()]);
        self.concat.output()
    }

    fn backward(&self, arena: &mut TensorArena) {
        self.concat.backward(arena);
        self.avg.backward(arena);
        self.max.backward(arena);
        self.min.backward(arena);
    }
}

/// `Lookup -> stacked layers -> pooling` over one token sequence.
#[derive(Debug)]
pub(super) struct Channel {
    lookups: LookupLayer,
    layers: Vec<LayerStage>,
    pooling: Pooling,
}

impl Channel {
    /// Builds the word channel of a model.
    pub(super) fn words(
        arena: &mut TensorArena,
        table: LookupTable,
        layers: &[(LayerParams, LayerWidths)],
        drop_prob: f32,
        capacity: usize,
    ) -> Self {
        let lookups = LookupLayer::new(arena, table, drop_prob, capacity);
        let stages: Vec<_> = layers
            .iter()
            .map(|(params, widths)| LayerStage::new(arena, params, widths, drop_prob, capacity))
            .collect();
        let width = layers.last().map_or(table.dim, |(_, w)| w.output);

        Self {
            lookups,
            layers: stages,
            pooling: Pooling::new(arena, width, capacity),
        }
    }

    /// Builds the char channel, a single windowed tanh layer.
    pub(super) fn chars(
        arena: &mut TensorArena,
        table: LookupTable,
        hidden: UniParams,
        widths: &CharWidths,
        drop_prob: f32,
        capacity: usize,
    ) -> Self {
        let lookups = LookupLayer::new(arena, table, drop_prob, capacity);
        let stage = LayerStage::Cnn {
            window: WindowBuilder::new(arena, widths.dim, widths.window.context, capacity),
            hidden: AffineLayer::new(arena, hidden, ActFn::Tanh, drop_prob, capacity),
        };

        Self {
            lookups,
            layers: vec![stage],
            pooling: Pooling::new(arena, widths.hidden, capacity),
        }
    }

    /// Evaluates the channel over `ids`, truncated to the capacity.
    ///
    /// # Returns
    /// The concatenated pooling output.
    pub(super) fn forward<R: Rng>(
        &mut self,
        arena: &mut TensorArena,
        store: &ParameterStore,
        ids: &[usize],
        rng: &mut R,
        train: bool,
    ) -> TensorId {
        self.lookups.forward(arena, store, ids, rng, train);

        for k in 0..self.layers.len() {
            let (done, rest) = self.layers.split_at_mut(k);
            let inputs = done.last().map_or(self.lookups.outputs(), LayerStage::outputs);
            rest[0].forward(arena, store, inputs, rng, train);
        }

        let last = self.layers.last().map_or(self.lookups.outputs(), LayerStage::outputs);
        self.pooling.forward(arena, last)
    }

    pub(super) fn backward(
        &mut self,
        arena: &mut TensorArena,
        store: &ParameterStore,
        grads: &mut Gradients,
    ) {
        self.pooling.backward(arena);
        for layer in self.layers.iter_mut().rev() {
            layer.backward(arena, store, grads);
        }
        self.lookups.backward(arena, grads);
    }

    pub(super) fn reset(&mut self) {
        self.lookups.reset();
        self.layers.iter_mut().for_each(LayerStage::reset);
    }

    /// The amount of positions evaluated in the last forward pass.
    pub(super) fn len(&self) -> usize {
        self.lookups.outputs().len()
    }

    pub(super) fn lookup_outputs(&self) -> &[TensorId] {
        self.lookups.outputs()
    }

    pub(super) fn layer(&self, k: usize) -> Option<&LayerStage> {
        self.layers.get(k)
    }

    pub(super) fn pooled(&self) -> [TensorId; 3] {
        [self.pooling.avg.output(), self.pooling.max.output(), self.pooling.min.output()]
    }

    pub(super) fn output(&self) -> TensorId {
        self.pooling.concat.output()
    }
}
