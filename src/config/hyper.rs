use serde::{Deserialize, Serialize};

use super::Variant;
use crate::{LabelerErr, Result};

/// Raw hyperparameters of a labeler.
///
/// Every width of the graph is derived from these together with the [`VocabDims`], see
/// [`super::TopologyConfig::derive`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HyperParams {
    /// Context radius of the word window, a window spans `2 * word_context + 1` positions.
    pub word_context: usize,
    /// Context radius of the character window.
    pub char_context: usize,
    /// Hidden size of every word layer (per direction for bidirectional layers).
    pub hidden_size: usize,
    /// Hidden size of the character affine layer.
    pub char_hidden_size: usize,
    /// Amount of stacked word layers, only honored by the multi-layer variants.
    pub layers: usize,
    /// Dropout probability applied during training-mode evaluation.
    pub drop_prob: f32,
    /// Maximum amount of words evaluated per example, the rest is truncated.
    pub max_sentence_length: usize,
    /// Maximum amount of characters evaluated per example, the rest is truncated.
    pub max_char_length: usize,
    /// Seed for the dropout masks and the parameter initialization.
    pub seed: Option<u64>,
}

impl Default for HyperParams {
    fn default() -> Self {
        Self {
            word_context: 2,
            char_context: 2,
            hidden_size: 100,
            char_hidden_size: 50,
            layers: 1,
            drop_prob: 0.,
            max_sentence_length: 2048,
            max_char_length: 4096,
            seed: None,
        }
    }
}

impl HyperParams {
    /// Checks the hyperparameters make sense for the given variant.
    ///
    /// # Arguments
    /// * `variant` - The topology these hyperparameters will be used for.
    ///
    /// # Returns
    /// An `InvalidConfig` error naming the first offending field.
    pub fn validate(&self, variant: Variant) -> Result<()> {
        let invalid = |what, reason| Err(LabelerErr::InvalidConfig { what, reason });

        if self.hidden_size == 0 {
            return invalid("hidden_size", "must be positive");
        }
        if self.layers == 0 {
            return invalid("layers", "must be at least 1");
        }
        if self.max_sentence_length == 0 {
            return invalid("max_sentence_length", "must be positive");
        }
        if !self.drop_prob.is_finite() || !(0. ..1.).contains(&self.drop_prob) {
            return invalid("drop_prob", "must be in [0, 1)");
        }

        if variant.has_chars() {
            if self.char_hidden_size == 0 {
                return invalid("char_hidden_size", "must be positive");
            }
            if self.max_char_length == 0 {
                return invalid("max_char_length", "must be positive");
            }
        }

        Ok(())
    }
}

/// Vocabulary and embedding sizes, supplied by whoever built the alphabets and embedding tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct VocabDims {
    pub word_vocab: usize,
    pub word_dim: usize,
    pub char_vocab: usize,
    pub char_dim: usize,
    pub labels: usize,
}

impl VocabDims {
    /// Checks no vocabulary, embedding or label set is empty.
    ///
    /// # Arguments
    /// * `variant` - The topology, character sizes are only checked if it has a char channel.
    pub fn validate(&self, variant: Variant) -> Result<()> {
        if self.word_vocab == 0 {
            return Err(LabelerErr::EmptyVocabulary { what: "word" });
        }
        if self.word_dim == 0 {
            return Err(LabelerErr::InvalidConfig {
                what: "word_dim",
                reason: "must be positive",
            });
        }
        if self.labels == 0 {
            return Err(LabelerErr::NoLabels);
        }

        if variant.has_chars() {
            if self.char_vocab == 0 {
                return Err(LabelerErr::EmptyVocabulary { what: "char" });
            }
            if self.char_dim == 0 {
                return Err(LabelerErr::InvalidConfig {
                    what: "char_dim",
                    reason: "must be positive",
                });
            }
        }

        Ok(())
    }
}

/// Everything needed to build a labeler, as read from a JSON file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    pub variant: Variant,
    #[serde(default)]
    pub hyper: HyperParams,
    pub dims: VocabDims,
}

impl ModelConfig {
    /// Parses a `ModelConfig` from its JSON representation.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| LabelerErr::Format(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let json = r#"{
            "variant": "bi_grnn_ml_char",
            "hyper": { "hidden_size": 10, "layers": 2 },
            "dims": {
                "word_vocab": 30, "word_dim": 4, "char_vocab": 20, "char_dim": 3, "labels": 2
            }
        }"#;

        let config = ModelConfig::from_json(json).unwrap();
        assert_eq!(config.variant, Variant::BiGrnnMlChar);
        assert_eq!(config.hyper.hidden_size, 10);
        assert_eq!(config.hyper.layers, 2);
        assert_eq!(config.hyper.max_sentence_length, 2048);
        assert_eq!(config.hyper.max_char_length, 4096);
        assert_eq!(config.dims.char_dim, 3);
    }

    #[test]
    fn unknown_variant_is_a_format_error() {
        let json = r#"{ "variant": "transformer", "dims": {} }"#;
        assert!(matches!(
            ModelConfig::from_json(json),
            Err(LabelerErr::Format(_))
        ));
    }

    #[test]
    fn dropout_must_be_a_probability() {
        let hyper = HyperParams {
            drop_prob: 1.,
            ..Default::default()
        };

        assert!(matches!(
            hyper.validate(Variant::CnnMl),
            Err(LabelerErr::InvalidConfig {
                what: "drop_prob",
                ..
            })
        ));
    }

    #[test]
    fn char_sizes_are_only_checked_with_a_char_channel() {
        let hyper = HyperParams {
            char_hidden_size: 0,
            ..Default::default()
        };

        assert!(hyper.validate(Variant::CnnMl).is_ok());
        assert!(hyper.validate(Variant::CnnChar).is_err());

        let dims = VocabDims {
            word_vocab: 10,
            word_dim: 2,
            labels: 3,
            ..Default::default()
        };

        assert!(dims.validate(Variant::RnnMl).is_ok());
        assert!(matches!(
            dims.validate(Variant::BiGrnnChar),
            Err(LabelerErr::EmptyVocabulary { what: "char" })
        ));
    }

    #[test]
    fn empty_label_set_is_rejected() {
        let dims = VocabDims {
            word_vocab: 10,
            word_dim: 2,
            ..Default::default()
        };

        assert!(matches!(
            dims.validate(Variant::CnnMl),
            Err(LabelerErr::NoLabels)
        ));
    }
}
