use std::{cell::RefCell, rc::Rc};

use rand::Rng;
use rand_distr::{Distribution, Uniform};

use super::ParamGen;
use crate::Result;

/// Draws values from a distribution.
///
/// Every tensor of a model shares the same seeded rng, so the initialization order fixes the
/// values each tensor receives.
pub struct Sampled<R, D> {
    rng: Rc<RefCell<R>>,
    dist: D,
    remaining: usize,
}

impl<R: Rng, D: Distribution<f32>> Sampled<R, D> {
    pub fn new(rng: Rc<RefCell<R>>, dist: D, limit: usize) -> Self {
        Self {
            rng,
            dist,
            remaining: limit,
        }
    }
}

impl<R: Rng> Sampled<R, Uniform<f32>> {
    /// Uniform in `[-bound, bound)`.
    ///
    /// # Errors
    /// `LabelerErr::Rand` when the bound is not a finite positive number.
    pub fn symmetric(rng: Rc<RefCell<R>>, limit: usize, bound: f32) -> Result<Self> {
        Ok(Self::new(rng, Uniform::new(-bound, bound)?, limit))
    }

    /// A `vocab x dim` embedding table, uniform in `[-sqrt(3 / dim), sqrt(3 / dim))`.
    pub fn embedding(rng: Rc<RefCell<R>>, vocab: usize, dim: usize) -> Result<Self> {
        Self::symmetric(rng, vocab * dim, (3. / dim as f32).sqrt())
    }

    /// A `fan_out x fan_in` weight matrix with Xavier-uniform bounds.
    pub fn xavier(rng: Rc<RefCell<R>>, fan_in: usize, fan_out: usize) -> Result<Self> {
        let bound = (6. / (fan_in + fan_out) as f32).sqrt();
        Self::symmetric(rng, fan_in * fan_out, bound)
    }
}

impl<R: Rng, D: Distribution<f32>> ParamGen for Sampled<R, D> {
    fn fill(&mut self, dst: &mut [f32]) -> usize {
        let n = dst.len().min(self.remaining);
        let mut rng = self.rng.borrow_mut();

        for x in &mut dst[..n] {
            *x = self.dist.sample(&mut *rng);
        }

        self.remaining -= n;
        n
    }

    fn remaining(&self) -> usize {
        self.remaining
    }
}
