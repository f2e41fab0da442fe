use ndarray::{Zip, s};

use crate::graph::{Output, TensorArena, TensorId};

/// Concatenates its inputs in argument order.
#[derive(Debug)]
pub struct ConcatNode {
    out: TensorId,
    inputs: Vec<TensorId>,
}

impl Output for ConcatNode {
    fn output(&self) -> TensorId {
        self.out
    }
}

impl ConcatNode {
    /// # Arguments
    /// * `arena` - The arena to allocate the output in.
    /// * `width` - The sum of the widths of the inputs.
    pub fn new(arena: &mut TensorArena, width: usize) -> Self {
        Self {
            out: arena.alloc(width),
            inputs: Vec::new(),
        }
    }

    /// # Panics
    /// If the widths of `inputs` don't add up to the output width.
    pub fn forward(&mut self, arena: &mut TensorArena, inputs: &[TensorId]) {
        let total: usize = inputs.iter().map(|&id| arena.width(id)).sum();
        assert_eq!(total, arena.width(self.out), "concat input widths don't add up");

        self.inputs.clear();
        self.inputs.extend_from_slice(inputs);

        let mut out = arena.take(self.out);
        let mut offset = 0;
        for &id in inputs {
            let val = arena.val(id);
            out.slice_mut(s![offset..offset + val.len()]).assign(&val);
            offset += val.len();
        }
        arena.put(self.out, out);
    }

    pub fn backward(&self, arena: &mut TensorArena) {
        let d = arena.take_grad(self.out);

        let mut offset = 0;
        for &id in &self.inputs {
            let width = arena.width(id);
            Zip::from(arena.grad_mut(id))
                .and(d.slice(s![offset..offset + width]))
                .for_each(|g, &x| *g += x);
            offset += width;
        }

        arena.put_grad(self.out, d);
    }
}
