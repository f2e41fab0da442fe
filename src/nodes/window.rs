use ndarray::{Zip, s};

use crate::graph::{NodeArray, Output, TensorArena, TensorId};

#[derive(Debug)]
struct WindowNode {
    out: TensorId,
    inputs: Vec<TensorId>,
}

impl Output for WindowNode {
    fn output(&self) -> TensorId {
        self.out
    }
}

/// Concatenates, for every position `i`, the inputs at positions `i - c..=i + c` in increasing
/// order. Positions outside the sequence read a zero padding tensor.
#[derive(Debug)]
pub struct WindowBuilder {
    width: usize,
    context: usize,
    padding: TensorId,
    nodes: NodeArray<WindowNode>,
}

impl WindowBuilder {
    /// Creates a new `WindowBuilder`.
    ///
    /// # Arguments
    /// * `arena` - The arena to allocate the outputs and the padding in.
    /// * `width` - The width of every input.
    /// * `context` - The window radius `c`.
    /// * `capacity` - The maximum sequence length.
    pub fn new(arena: &mut TensorArena, width: usize, context: usize, capacity: usize) -> Self {
        let span = 2 * context + 1;
        let padding = arena.alloc_constant(width);

        Self {
            width,
            context,
            padding,
            nodes: NodeArray::new(capacity, |_| WindowNode {
                out: arena.alloc(width * span),
                inputs: Vec::with_capacity(span),
            }),
        }
    }

    /// # Returns
    /// The outputs of the active prefix, one per input up to the capacity.
    pub fn forward(&mut self, arena: &mut TensorArena, inputs: &[TensorId]) -> &[TensorId] {
        let n = self.nodes.activate(inputs.len());
        let (w, c, padding) = (self.width, self.context, self.padding);

        for (i, node) in self.nodes.nodes_mut().iter_mut().enumerate() {
            node.inputs.clear();
            node.inputs.extend((0..2 * c + 1).map(|k| {
                (i + k)
                    .checked_sub(c)
                    .filter(|&j| j < n)
                    .map_or(padding, |j| inputs[j])
            }));

            let mut out = arena.take(node.out);
            for (k, &src) in node.inputs.iter().enumerate() {
                out.slice_mut(s![k * w..(k + 1) * w]).assign(&arena.val(src));
            }
            arena.put(node.out, out);
        }

        self.nodes.outputs()
    }

    /// Routes every output gradient back to the inputs it was copied from.
    pub fn backward(&self, arena: &mut TensorArena) {
        let w = self.width;

        for node in self.nodes.nodes() {
            let d = arena.take_grad(node.out);
            for (k, &src) in node.inputs.iter().enumerate() {
                if src == self.padding {
                    continue;
                }
                Zip::from(arena.grad_mut(src))
                    .and(d.slice(s![k * w..(k + 1) * w]))
                    .for_each(|g, &x| *g += x);
            }
            arena.put_grad(node.out, d);
        }
    }

    pub fn outputs(&self) -> &[TensorId] {
        self.nodes.outputs()
    }

    pub fn reset(&mut self) {
        self.nodes.reset();
    }
}
