use std::mem;

use ndarray::{Array1, ArrayView1, ArrayViewMut1};

/// Index of a tensor inside a [`TensorArena`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TensorId(usize);

/// Owns every intermediate tensor of a graph together with its gradient.
///
/// Tensors are allocated once when the graph is built and reused for every example. A tensor
/// becomes active when a node writes it and inactive again on [`TensorArena::clear`], reading an
/// inactive tensor is a bug in the graph and panics.
#[derive(Debug, Default)]
pub struct TensorArena {
    vals: Vec<Array1<f32>>,
    grads: Vec<Array1<f32>>,
    active: Vec<bool>,
    constant: Vec<bool>,
    touched: Vec<TensorId>,
}

impl TensorArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates a new zeroed tensor of the given width.
    pub fn alloc(&mut self, width: usize) -> TensorId {
        self.vals.push(Array1::zeros(width));
        self.grads.push(Array1::zeros(width));
        self.active.push(false);
        self.constant.push(false);
        TensorId(self.vals.len() - 1)
    }

    /// Allocates a zero tensor that is always active and never written, used for padding.
    pub fn alloc_constant(&mut self, width: usize) -> TensorId {
        let id = self.alloc(width);
        self.active[id.0] = true;
        self.constant[id.0] = true;
        id
    }

    pub fn width(&self, id: TensorId) -> usize {
        self.vals[id.0].len()
    }

    pub fn is_active(&self, id: TensorId) -> bool {
        self.active[id.0]
    }

    /// The amount of allocated tensors.
    pub fn len(&self) -> usize {
        self.vals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vals.is_empty()
    }

    /// # Panics
    /// If the tensor has not been written since the last clear.
    pub fn val(&self, id: TensorId) -> ArrayView1<'_, f32> {
        assert!(self.active[id.0], "read of inactive tensor {}", id.0);
        self.vals[id.0].view()
    }

    pub fn grad(&self, id: TensorId) -> ArrayView1<'_, f32> {
        assert!(self.active[id.0], "read of inactive tensor gradient {}", id.0);
        self.grads[id.0].view()
    }

    /// Mutable access to a gradient so that consumers can accumulate into it.
    pub fn grad_mut(&mut self, id: TensorId) -> ArrayViewMut1<'_, f32> {
        assert!(self.active[id.0], "write of inactive tensor gradient {}", id.0);
        self.grads[id.0].view_mut()
    }

    /// Takes a tensor's buffer out of the arena so it can be written while other tensors are
    /// read, it must be given back with [`TensorArena::put`].
    pub fn take(&mut self, id: TensorId) -> Array1<f32> {
        assert!(!self.constant[id.0], "write of constant tensor {}", id.0);
        mem::take(&mut self.vals[id.0])
    }

    /// Gives back a buffer previously taken and marks the tensor active.
    pub fn put(&mut self, id: TensorId, val: Array1<f32>) {
        debug_assert_eq!(val.len(), self.grads[id.0].len());
        self.vals[id.0] = val;

        if !self.active[id.0] {
            self.active[id.0] = true;
            self.touched.push(id);
        }
    }

    /// Takes a tensor's gradient buffer out of the arena, see [`TensorArena::take`].
    pub fn take_grad(&mut self, id: TensorId) -> Array1<f32> {
        assert!(self.active[id.0], "read of inactive tensor gradient {}", id.0);
        mem::take(&mut self.grads[id.0])
    }

    pub fn put_grad(&mut self, id: TensorId, grad: Array1<f32>) {
        self.grads[id.0] = grad;
    }

    /// Deactivates every tensor written since the last clear and zeroes its gradient.
    ///
    /// Cost is proportional to the previous example, not to the graph's capacity.
    pub fn clear(&mut self) {
        for id in self.touched.drain(..) {
            self.active[id.0] = false;
            self.grads[id.0].fill(0.);
        }
    }
}

#[cfg(test)]
mod tests {
    use ndarray::array;

    use super::*;

    #[test]
    fn take_put_activates() {
        let mut arena = TensorArena::new();
        let id = arena.alloc(2);
        assert!(!arena.is_active(id));

        let mut val = arena.take(id);
        val.assign(&array![1., 2.]);
        arena.put(id, val);

        assert_eq!(arena.val(id), array![1., 2.]);
    }

    #[test]
    #[should_panic(expected = "inactive")]
    fn reading_inactive_tensor_panics() {
        let mut arena = TensorArena::new();
        let id = arena.alloc(2);
        arena.val(id);
    }

    #[test]
    fn clear_deactivates_and_zeroes_gradients() {
        let mut arena = TensorArena::new();
        let id = arena.alloc(3);
        let padding = arena.alloc_constant(3);

        let val = arena.take(id);
        arena.put(id, val);
        arena.grad_mut(id).fill(1.);

        arena.clear();
        assert!(!arena.is_active(id));
        assert!(arena.is_active(padding));
        assert_eq!(arena.grads[id.0], array![0., 0., 0.]);
    }

    #[test]
    #[should_panic(expected = "constant")]
    fn constants_are_read_only() {
        let mut arena = TensorArena::new();
        let padding = arena.alloc_constant(1);
        arena.take(padding);
    }
}
