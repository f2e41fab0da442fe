use serde::{Deserialize, Serialize};

/// The unit stacked in every word layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayerKind {
    /// A window followed by a position-wise affine + tanh.
    Cnn,
    /// A window followed by a left-to-right plain recurrent pass.
    Rnn,
    /// Left-to-right and right-to-left gated recurrent passes, concatenated per position.
    BiGrnn,
}

impl LayerKind {
    /// Whether a window builder precedes every layer or only the first one.
    pub fn rewindows(self) -> bool {
        match self {
            LayerKind::Cnn | LayerKind::Rnn => true,
            LayerKind::BiGrnn => false,
        }
    }

    /// Width of the per-position output of a layer.
    ///
    /// # Arguments
    /// * `hidden` - The hidden size of the layer's unit.
    pub fn output_width(self, hidden: usize) -> usize {
        match self {
            LayerKind::Cnn | LayerKind::Rnn => hidden,
            LayerKind::BiGrnn => 2 * hidden,
        }
    }
}

/// The fixed composition recipes of the labeler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Variant {
    CnnChar,
    CnnMlChar,
    CnnMl,
    RnnMl,
    BiGrnnChar,
    BiGrnnMlChar,
}

use Variant::*;

impl Variant {
    pub const ALL: [Variant; 6] = [CnnChar, CnnMlChar, CnnMl, RnnMl, BiGrnnChar, BiGrnnMlChar];

    pub fn layer_kind(self) -> LayerKind {
        match self {
            CnnChar | CnnMlChar | CnnMl => LayerKind::Cnn,
            RnnMl => LayerKind::Rnn,
            BiGrnnChar | BiGrnnMlChar => LayerKind::BiGrnn,
        }
    }

    pub fn has_chars(self) -> bool {
        !matches!(self, CnnMl | RnnMl)
    }

    /// Whether the configured amount of layers is honored, single layer variants always use 1.
    pub fn is_multi_layer(self) -> bool {
        !matches!(self, CnnChar | BiGrnnChar)
    }

    pub fn name(self) -> &'static str {
        match self {
            CnnChar => "cnn_char",
            CnnMlChar => "cnn_ml_char",
            CnnMl => "cnn_ml",
            RnnMl => "rnn_ml",
            BiGrnnChar => "bi_grnn_char",
            BiGrnnMlChar => "bi_grnn_ml_char",
        }
    }

    /// Stable numeric tag used by the model files.
    pub fn tag(self) -> u8 {
        match self {
            CnnChar => 0,
            CnnMlChar => 1,
            CnnMl => 2,
            RnnMl => 3,
            BiGrnnChar => 4,
            BiGrnnMlChar => 5,
        }
    }

    pub fn from_tag(tag: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|v| v.tag() == tag)
    }
}
