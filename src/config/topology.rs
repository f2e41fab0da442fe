use log::{info, warn};

use super::{HyperParams, LayerKind, Variant, VocabDims};
use crate::{LabelerErr, Result};

/// Widths of a window builder stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowWidths {
    pub input: usize,
    pub context: usize,
    pub output: usize,
}

impl WindowWidths {
    fn new(input: usize, context: usize) -> Self {
        Self {
            input,
            context,
            output: input * (2 * context + 1),
        }
    }
}

/// Widths of one stacked word layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayerWidths {
    /// The window applied before the layer's unit, if any.
    pub window: Option<WindowWidths>,
    /// Input width of the layer's unit.
    pub input: usize,
    /// Hidden size of the unit, per direction.
    pub hidden: usize,
    /// Per-position output width of the layer.
    pub output: usize,
}

/// Widths of the character channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CharWidths {
    pub dim: usize,
    pub window: WindowWidths,
    pub hidden: usize,
}

/// A named stage of the graph together with its input and output widths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stage {
    pub name: String,
    pub input: usize,
    pub output: usize,
}

impl Stage {
    fn new(name: impl Into<String>, input: usize, output: usize) -> Self {
        Self {
            name: name.into(),
            input,
            output,
        }
    }
}

/// The derived widths of a topology variant.
///
/// Can only be obtained through [`TopologyConfig::derive`], so holding one means every stage
/// agrees with the next one.
#[derive(Debug, Clone, PartialEq)]
pub struct TopologyConfig {
    variant: Variant,
    hyper: HyperParams,
    dims: VocabDims,
    layers: Vec<LayerWidths>,
    chars: Option<CharWidths>,
    concat: usize,
}

impl TopologyConfig {
    /// Derives every width of the graph bottom-up.
    ///
    /// # Arguments
    /// * `variant` - The composition recipe.
    /// * `hyper` - The hyperparameters.
    /// * `dims` - The vocabulary and embedding sizes.
    ///
    /// # Returns
    /// The derived configuration, or a configuration error if any size is invalid or two
    /// adjacent stages disagree.
    pub fn derive(variant: Variant, hyper: HyperParams, dims: VocabDims) -> Result<Self> {
        hyper.validate(variant)?;
        dims.validate(variant)?;

        let kind = variant.layer_kind();
        let n_layers = if variant.is_multi_layer() {
            hyper.layers
        } else {
            if hyper.layers > 1 {
                warn!(
                    variant = variant.name(),
                    layers = hyper.layers;
                    "variant is single layer, ignoring configured layers"
                );
            }
            1
        };

        let mut layers = Vec::with_capacity(n_layers);
        let mut width = dims.word_dim;
        for k in 0..n_layers {
            let window =
                (k == 0 || kind.rewindows()).then(|| WindowWidths::new(width, hyper.word_context));
            let input = window.map_or(width, |w| w.output);
            let output = kind.output_width(hyper.hidden_size);

            layers.push(LayerWidths {
                window,
                input,
                hidden: hyper.hidden_size,
                output,
            });
            width = output;
        }

        let chars = variant.has_chars().then(|| CharWidths {
            dim: dims.char_dim,
            window: WindowWidths::new(dims.char_dim, hyper.char_context),
            hidden: hyper.char_hidden_size,
        });

        let concat = 3 * width + chars.map_or(0, |c| 3 * c.hidden);

        if hyper.max_sentence_length < 2 * hyper.word_context + 1 {
            warn!(
                capacity = hyper.max_sentence_length,
                context = hyper.word_context;
                "sentence capacity is smaller than the word window"
            );
        }
        if chars.is_some() && hyper.max_char_length < 2 * hyper.char_context + 1 {
            warn!(
                capacity = hyper.max_char_length,
                context = hyper.char_context;
                "char capacity is smaller than the char window"
            );
        }

        let config = Self {
            variant,
            hyper,
            dims,
            layers,
            chars,
            concat,
        };
        config.verify()?;

        info!(
            variant = variant.name(),
            layers = n_layers,
            concat = config.concat,
            labels = config.dims.labels,
            max_words = config.hyper.max_sentence_length,
            max_chars = config.hyper.max_char_length;
            "derived topology"
        );

        Ok(config)
    }

    /// Checks that every stage's output width is the next stage's input width.
    ///
    /// # Returns
    /// A `WidthMismatch` naming the first stage whose input disagrees with what it receives.
    pub fn verify(&self) -> Result<()> {
        let words = self.word_stages();
        check_chain(&words)?;
        let mut joined = words.last().map_or(0, |s| s.output);

        if let Some(chars) = self.char_stages() {
            check_chain(&chars)?;
            joined += chars.last().map_or(0, |s| s.output);
        }

        expect_width("concat", joined, self.concat)?;
        Ok(())
    }

    /// Every stage of the graph, word channel first, then the char channel, concat and output.
    pub fn stages(&self) -> Vec<Stage> {
        let mut stages = self.word_stages();
        stages.extend(self.char_stages().unwrap_or_default());
        stages.push(Stage::new("concat", self.concat, self.concat));
        stages.push(Stage::new("output", self.concat, self.dims.labels));
        stages
    }

    fn word_stages(&self) -> Vec<Stage> {
        let dim = self.dims.word_dim;
        let mut stages = vec![Stage::new("word_lookup", dim, dim)];

        for (k, layer) in self.layers.iter().enumerate() {
            if let Some(window) = layer.window {
                stages.push(Stage::new(
                    format!("word_window[{k}]"),
                    window.input,
                    window.output,
                ));
            }
            stages.push(Stage::new(
                format!("word_layer[{k}]"),
                layer.input,
                layer.output,
            ));
        }

        let pooled = self.word_pooled();
        stages.push(Stage::new("word_pooling", pooled, 3 * pooled));
        stages
    }

    fn char_stages(&self) -> Option<Vec<Stage>> {
        let chars = self.chars?;
        Some(vec![
            Stage::new("char_lookup", chars.dim, chars.dim),
            Stage::new("char_window", chars.window.input, chars.window.output),
            Stage::new("char_hidden", chars.window.output, chars.hidden),
            Stage::new("char_pooling", chars.hidden, 3 * chars.hidden),
        ])
    }

    pub fn variant(&self) -> Variant {
        self.variant
    }

    pub fn hyper(&self) -> &HyperParams {
        &self.hyper
    }

    pub fn dims(&self) -> &VocabDims {
        &self.dims
    }

    pub fn layer_kind(&self) -> LayerKind {
        self.variant.layer_kind()
    }

    pub fn layers(&self) -> &[LayerWidths] {
        &self.layers
    }

    pub fn chars(&self) -> Option<&CharWidths> {
        self.chars.as_ref()
    }

    /// Width of each of the word channel's pooled tensors.
    pub fn word_pooled(&self) -> usize {
        self.layers.last().map_or(self.dims.word_dim, |l| l.output)
    }

    pub fn concat_width(&self) -> usize {
        self.concat
    }

    pub fn labels(&self) -> usize {
        self.dims.labels
    }

    pub fn max_words(&self) -> usize {
        self.hyper.max_sentence_length
    }

    pub fn max_chars(&self) -> usize {
        self.hyper.max_char_length
    }

    pub fn drop_prob(&self) -> f32 {
        self.hyper.drop_prob
    }
}

fn check_chain(stages: &[Stage]) -> Result<()> {
    for pair in stages.windows(2) {
        let (prev, next) = (&pair[0], &pair[1]);
        expect_width(&next.name, prev.output, next.input)?;
    }
    Ok(())
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
