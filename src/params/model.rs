use std::{cell::RefCell, collections::BTreeMap, rc::Rc, sync::Arc};

use log::info;
use rand::Rng;

use super::{
    GrnnParams, LookupTable, ParamUnit, ParameterLayout, ParameterStore, RnnParams, TensorRef,
    UniParams,
};
use crate::{
    LabelerErr, Result,
    config::{LayerKind, TopologyConfig},
};

/// The unit(s) of one stacked word layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayerParams {
    Cnn(UniParams),
    Rnn(RnnParams),
    BiGrnn { left: GrnnParams, right: GrnnParams },
}

impl LayerParams {
    pub fn input_width(&self) -> usize {
        match self {
            LayerParams::Cnn(uni) => uni.input,
            LayerParams::Rnn(rnn) => rnn.input,
            LayerParams::BiGrnn { left, .. } => left.input,
        }
    }

    pub fn output_width(&self) -> usize {
        match self {
            LayerParams::Cnn(uni) => uni.output,
            LayerParams::Rnn(rnn) => rnn.hidden,
            LayerParams::BiGrnn { left, right } => left.hidden + right.hidden,
        }
    }
}

/// Every parameter unit of a labeler.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelParams {
    pub words: LookupTable,
    pub chars: Option<LookupTable>,
    pub layers: Vec<LayerParams>,
    pub char_hidden: Option<UniParams>,
    pub output: UniParams,
}

impl ModelParams {
    /// Registers every unit of the topology in a new layout.
    ///
    /// Units are registered in export order: word table, char table, word layers (left before
    /// right), char hidden layer and output layer.
    ///
    /// # Arguments
    /// * `config` - The derived topology.
    ///
    /// # Returns
    /// The model's units and the layout of its store, or a `WidthMismatch` if a unit doesn't
    /// agree with the width of its stage.
    pub fn new(config: &TopologyConfig) -> Result<(Self, Arc<ParameterLayout>)> {
        let dims = config.dims();
        let mut layout = ParameterLayout::new();

        let words = LookupTable::register(&mut layout, "words", dims.word_vocab, dims.word_dim);
        let chars = config
            .chars()
            .map(|c| LookupTable::register(&mut layout, "chars", dims.char_vocab, c.dim));

        let mut layers = Vec::with_capacity(config.layers().len());
        for (k, widths) in config.layers().iter().enumerate() {
            let name = format!("layer{k}");
            let layer = match config.layer_kind() {
                LayerKind::Cnn => LayerParams::Cnn(UniParams::register(
                    &mut layout,
                    &name,
                    widths.input,
                    widths.hidden,
                    true,
                )),
                LayerKind::Rnn => LayerParams::Rnn(RnnParams::register(
                    &mut layout,
                    &name,
                    widths.input,
                    widths.hidden,
                )),
                LayerKind::BiGrnn => LayerParams::BiGrnn {
                    left: GrnnParams::register(
                        &mut layout,
                        &format!("{name}.left"),
                        widths.input,
                        widths.hidden,
                    ),
                    right: GrnnParams::register(
                        &mut layout,
                        &format!("{name}.right"),
                        widths.input,
                        widths.hidden,
                    ),
                },
            };
            layers.push(layer);
        }

        let char_hidden = config.chars().map(|c| {
            UniParams::register(&mut layout, "char_hidden", c.window.output, c.hidden, true)
        });
        let output = UniParams::register(
            &mut layout,
            "output",
            config.concat_width(),
            config.labels(),
            false,
        );

        let params = Self {
            words,
            chars,
            layers,
            char_hidden,
            output,
        };
        params.check(config)?;

        info!(tensors = layout.tensors(), params = layout.size(); "registered model parameters");
        Ok((params, Arc::new(layout)))
    }

    pub(crate) fn check(&self, config: &TopologyConfig) -> Result<()> {
        expect_width("word_lookup", self.words.dim, config.dims().word_dim)?;

        if self.layers.len() != config.layers().len() {
            return Err(LabelerErr::SizeMismatch {
                what: "word layers",
                got: self.layers.len(),
                expected: config.layers().len(),
            });
        }

        for (k, (layer, widths)) in self.layers.iter().zip(config.layers()).enumerate() {
            let stage = format!("word_layer[{k}]");
            expect_width(&stage, layer.input_width(), widths.input)?;
            expect_width(&stage, layer.output_width(), widths.output)?;
        }

        if let (Some(widths), Some(chars), Some(hidden)) =
            (config.chars(), self.chars, self.char_hidden)
        {
            expect_width("char_lookup", chars.dim, widths.dim)?;
            expect_width("char_hidden", hidden.input, widths.window.output)?;
            expect_width("char_hidden", hidden.output, widths.hidden)?;
        }

        expect_width("output", self.output.input, config.concat_width())?;
        expect_width("output", self.output.output, config.labels())
    }

    /// Randomly initializes every unit: embeddings uniformly, weight matrices with Xavier
    /// uniform and biases with zeros.
    ///
    /// # Arguments
    /// * `store` - A store with this model's layout.
    /// * `rng` - The random number generator to sample from.
    pub fn initialize<R: Rng>(&self, store: &mut ParameterStore, rng: R) -> Result<()> {
        let rng = Rc::new(RefCell::new(rng));

        for unit in self.export_units() {
            match unit {
                ParamUnit::Lookup(lookup) => lookup.initialize(store, &rng)?,
                ParamUnit::Uni(uni) => uni.initialize(store, &rng)?,
                ParamUnit::Rnn(rnn) => rnn.initialize(store, &rng)?,
                ParamUnit::Grnn(grnn) => grnn.initialize(store, &rng)?,
            }
        }

        Ok(())
    }

    /// Enumerates every unit in export order.
    pub fn export_units(&self) -> Vec<ParamUnit> {
        let mut units = vec![ParamUnit::Lookup(self.words)];
        units.extend(self.chars.map(ParamUnit::Lookup));

        for layer in &self.layers {
            match *layer {
                LayerParams::Cnn(uni) => units.push(ParamUnit::Uni(uni)),
                LayerParams::Rnn(rnn) => units.push(ParamUnit::Rnn(rnn)),
                LayerParams::BiGrnn { left, right } => {
                    units.push(ParamUnit::Grnn(left));
                    units.push(ParamUnit::Grnn(right));
                }
            }
        }

        units.extend(self.char_hidden.map(ParamUnit::Uni));
        units.push(ParamUnit::Uni(self.output));
        units
    }

    /// The tensors worth checking with finite differences, by name.
    ///
    /// These are the embedding tables, the input weights of every layer unit and the output
    /// weights, which together cover every node kind's backward pass.
    pub fn check_grad_params(&self, layout: &ParameterLayout) -> BTreeMap<String, TensorRef> {
        let mut tensors = vec![self.words.table];
        tensors.extend(self.chars.map(|c| c.table));

        for layer in &self.layers {
            match layer {
                LayerParams::Cnn(uni) => tensors.push(uni.w),
                LayerParams::Rnn(rnn) => tensors.extend([rnn.cell.wx, rnn.cell.wh]),
                LayerParams::BiGrnn { left, right } => {
                    for grnn in [left, right] {
                        tensors.extend([grnn.update.wx, grnn.reset.wh, grnn.candidate.wh]);
                    }
                }
            }
        }

        tensors.extend(self.char_hidden.map(|c| c.w));
        tensors.push(self.output.w);

        tensors
            .into_iter()
            .map(|t| (layout.entry(t).name.clone(), t))
            .collect()
    }
}

fn expect_width(stage: &str, got: usize, expected: usize) -> Result<()> {
    if got != expected {
        return Err(LabelerErr::WidthMismatch {
            stage: stage.to_string(),
            got,
            expected,
        });
    }
    Ok(())
}
