use ndarray::{Array1, ArrayView1, ArrayViewMut1, Zip};

/// Softmax over the output scores followed by the negative log-likelihood of the gold label.
#[derive(Debug)]
pub struct SoftmaxLoss {
    probs: Array1<f32>,
}

impl SoftmaxLoss {
    pub fn new(labels: usize) -> Self {
        Self {
            probs: Array1::zeros(labels),
        }
    }

    /// Computes the label distribution, shifting by the maximum score for stability.
    pub fn forward(&mut self, scores: ArrayView1<'_, f32>) {
        let max = scores.fold(f32::NEG_INFINITY, |m, &s| m.max(s));

        self.probs.zip_mut_with(&scores, |p, &s| *p = (s - max).exp());
        let total = self.probs.sum();
        self.probs /= total;
    }

    /// # Panics
    /// If `gold` is not a label.
    pub fn loss(&self, gold: usize) -> f32 {
        -self.probs[gold].max(f32::MIN_POSITIVE).ln()
    }

    /// Adds the gradient of the loss with respect to the scores, `p - onehot(gold)`.
    pub fn backward(&self, gold: usize, mut d_scores: ArrayViewMut1<'_, f32>) {
        Zip::indexed(&mut d_scores)
            .and(&self.probs)
            .for_each(|k, d, &p| *d += p - (k == gold) as u8 as f32);
    }

    pub fn probs(&self) -> ArrayView1<'_, f32> {
        self.probs.view()
    }

    /// The label with the highest score, the first one on ties.
    pub fn predict(scores: ArrayView1<'_, f32>) -> usize {
        scores
            .iter()
            .enumerate()
            .fold((0, f32::NEG_INFINITY), |(best, max), (k, &s)| {
                if s > max { (k, s) } else { (best, max) }
            })
            .0
    }
}

#[cfg(test)]
mod tests {
    use ndarray::{Array1, array};

    use super::*;

    #[test]
    fn probabilities_sum_to_one() {
        let mut loss = SoftmaxLoss::new(3);
        loss.forward(array![1000., 1001., 999.].view());

        assert!((loss.probs().sum() - 1.).abs() < 1e-6);
        assert!(loss.probs().iter().all(|p| p.is_finite()));
        assert_eq!(SoftmaxLoss::predict(array![1000., 1001., 999.].view()), 1);
    }

    #[test]
    fn uniform_scores() {
        let mut loss = SoftmaxLoss::new(4);
        loss.forward(Array1::zeros(4).view());

        assert!((loss.loss(2) - 4f32.ln()).abs() < 1e-6);

        let mut d = Array1::zeros(4);
        loss.backward(2, d.view_mut());
        assert_eq!(d, array![0.25, 0.25, -0.75, 0.25]);
    }

    #[test]
    fn ties_predict_the_first_label() {
        assert_eq!(SoftmaxLoss::predict(array![0.5, 2., 2.].view()), 1);
    }
}
