use super::ParamGen;

/// Repeats a single value, biases start from `Constant::zeros`.
#[derive(Debug, Clone, Copy)]
pub struct Constant {
    value: f32,
    remaining: usize,
}

impl Constant {
    pub fn new(value: f32, limit: usize) -> Self {
        Self {
            value,
            remaining: limit,
        }
    }

    pub fn zeros(limit: usize) -> Self {
        Self::new(0., limit)
    }
}

impl ParamGen for Constant {
    fn fill(&mut self, dst: &mut [f32]) -> usize {
        let n = dst.len().min(self.remaining);
        dst[..n].fill(self.value);
        self.remaining -= n;
        n
    }

    fn remaining(&self) -> usize {
        self.remaining
    }
}
