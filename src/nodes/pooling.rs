use ndarray::{Array1, Zip};

use crate::graph::{Output, TensorArena, TensorId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolKind {
    Avg,
    Max,
    Min,
}

/// Reduces a sequence of equally wide tensors channel by channel.
///
/// Only the given inputs take part, gradients flow back to them alone: evenly for `Avg`, to the
/// winning position of every channel for `Max` and `Min`.
#[derive(Debug)]
pub struct PoolingNode {
    kind: PoolKind,
    out: TensorId,
    inputs: Vec<TensorId>,
    winners: Array1<usize>,
}

impl Output for PoolingNode {
    fn output(&self) -> TensorId {
        self.out
    }
}

impl PoolingNode {
    /// # Arguments
    /// * `arena` - The arena to allocate the output in.
    /// * `kind` - The reduction.
    /// * `width` - The width of every input and of the output.
    /// * `capacity` - The maximum amount of inputs.
    pub fn new(arena: &mut TensorArena, kind: PoolKind, width: usize, capacity: usize) -> Self {
        Self {
            kind,
            out: arena.alloc(width),
            inputs: Vec::with_capacity(capacity),
            winners: Array1::from_elem(width, 0),
        }
    }

    /// # Panics
    /// If `inputs` is empty, empty sequences are rejected before evaluating the graph.
    pub fn forward(&mut self, arena: &mut TensorArena, inputs: &[TensorId]) {
        assert!(!inputs.is_empty(), "pooling over an empty sequence");

        self.inputs.clear();
        self.inputs.extend_from_slice(inputs);

        let mut out = arena.take(self.out);
        match self.kind {
            PoolKind::Avg => {
                out.fill(0.);
                for &id in inputs {
                    out += &arena.val(id);
                }
                out /= inputs.len() as f32;
            }
            PoolKind::Max | PoolKind::Min => {
                let max = self.kind == PoolKind::Max;

                out.assign(&arena.val(inputs[0]));
                self.winners.fill(0);

                for (k, &id) in inputs.iter().enumerate().skip(1) {
                    Zip::from(&mut out)
                        .and(&mut self.winners)
                        .and(&arena.val(id))
                        .for_each(|best, winner, &v| {
                            if (max && v > *best) || (!max && v < *best) {
                                *best = v;
                                *winner = k;
                            }
                        });
                }
            }
        }
        arena.put(self.out, out);
    }

    pub fn backward(&self, arena: &mut TensorArena) {
        let d = arena.take_grad(self.out);

        match self.kind {
            PoolKind::Avg => {
                let scale = 1. / self.inputs.len() as f32;
                for &id in &self.inputs {
                    arena.grad_mut(id).scaled_add(scale, &d);
                }
            }
            PoolKind::Max | PoolKind::Min => {
                for (c, &k) in self.winners.iter().enumerate() {
                    arena.grad_mut(self.inputs[k])[c] += d[c];
                }
            }
        }

        arena.put_grad(self.out, d);
    }
}
