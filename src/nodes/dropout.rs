use ndarray::Array1;
use rand::Rng;

/// Inverted dropout: every entry is independently zeroed with probability `p` and survivors are
/// scaled by `1 / (1 - p)`, so evaluation in inference mode is the identity.
#[derive(Debug, Clone)]
pub struct Dropout {
    drop_prob: f32,
    mask: Array1<f32>,
    applied: bool,
}

impl Dropout {
    /// Creates a new `Dropout`.
    ///
    /// # Arguments
    /// * `width` - The width of the tensors it applies to.
    /// * `drop_prob` - The probability of dropping each entry.
    pub fn new(width: usize, drop_prob: f32) -> Self {
        Self {
            drop_prob,
            mask: Array1::zeros(width),
            applied: false,
        }
    }

    /// Applies dropout in place, drawing a new mask.
    ///
    /// # Arguments
    /// * `x` - The tensor to drop entries from.
    /// * `rng` - The source of the mask.
    /// * `train` - Whether this is a training-mode evaluation, otherwise nothing is done.
    pub fn forward<R: Rng>(&mut self, x: &mut Array1<f32>, rng: &mut R, train: bool) {
        self.applied = train && self.drop_prob > 0.;
        if !self.applied {
            return;
        }

        let keep = 1. - self.drop_prob;
        let scale = 1. / keep;
        self.mask
            .iter_mut()
            .for_each(|m| *m = if rng.random_bool(keep as f64) { scale } else { 0. });

        *x *= &self.mask;
    }

    /// Applies the last drawn mask to a gradient.
    pub fn backward(&self, d: &mut Array1<f32>) {
        if self.applied {
            *d *= &self.mask;
        }
    }
}
