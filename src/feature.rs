use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Maps tokens to ids, implemented by whoever builds the alphabets.
pub trait Vocabulary {
    fn index_of(&self, token: &str) -> Option<usize>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maps every token to its id.
    ///
    /// # Returns
    /// `None` if any token is unknown, out of vocabulary handling belongs to the caller.
    fn encode<'t, I>(&self, tokens: I) -> Option<Vec<usize>>
    where
        I: IntoIterator<Item = &'t str>,
        Self: Sized,
    {
        tokens.into_iter().map(|t| self.index_of(t)).collect()
    }
}

impl Vocabulary for HashMap<String, usize> {
    fn index_of(&self, token: &str) -> Option<usize> {
        self.get(token).copied()
    }

    fn len(&self) -> usize {
        HashMap::len(self)
    }
}

/// The ids of one example, read only for the graph.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Feature {
    pub words: Vec<usize>,
    #[serde(default)]
    pub chars: Vec<usize>,
}

impl Feature {
    pub fn new(words: Vec<usize>, chars: Vec<usize>) -> Self {
        Self { words, chars }
    }

    /// A feature without characters, for word only topologies.
    pub fn words(words: Vec<usize>) -> Self {
        Self {
            words,
            chars: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_maps_known_tokens() {
        let vocab: HashMap<String, usize> = [("the", 0), ("cat", 1)]
            .into_iter()
            .map(|(t, i)| (t.to_string(), i))
            .collect();

        assert_eq!(vocab.encode(["cat", "the", "cat"]), Some(vec![1, 0, 1]));
        assert_eq!(vocab.encode(["dog"]), None);
        assert_eq!(Vocabulary::len(&vocab), 2);
    }

    #[test]
    fn chars_default_to_empty() {
        let feature: Feature = serde_json::from_str(r#"{ "words": [1, 2] }"#).unwrap();
        assert_eq!(feature, Feature::words(vec![1, 2]));
    }
}
