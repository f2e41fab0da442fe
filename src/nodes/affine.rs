use ndarray::{Array1, linalg};
use rand::Rng;

use super::{ActFn, Dropout, outer_add};
use crate::{
    graph::{NodeArray, Output, TensorArena, TensorId},
    params::{Gradients, ParameterStore, UniParams},
};

/// Computes `act(W x + b)`, followed by dropout when training.
#[derive(Debug)]
pub struct AffineNode {
    out: TensorId,
    input: Option<TensorId>,
    pre: Array1<f32>,
    delta: Array1<f32>,
    dropout: Dropout,
}

impl Output for AffineNode {
    fn output(&self) -> TensorId {
        self.out
    }
}

impl AffineNode {
    /// Creates a new `AffineNode`.
    ///
    /// # Arguments
    /// * `arena` - The arena to allocate the output in.
    /// * `output` - The output width of the unit it will be bound to.
    /// * `drop_prob` - The dropout probability, 0 disables dropout.
    pub fn new(arena: &mut TensorArena, output: usize, drop_prob: f32) -> Self {
        Self {
            out: arena.alloc(output),
            input: None,
            pre: Array1::zeros(output),
            delta: Array1::zeros(output),
            dropout: Dropout::new(output, drop_prob),
        }
    }

    pub fn forward<R: Rng>(
        &mut self,
        arena: &mut TensorArena,
        store: &ParameterStore,
        unit: &UniParams,
        act: ActFn,
        input: TensorId,
        rng: &mut R,
        train: bool,
    ) {
        self.input = Some(input);

        linalg::general_mat_vec_mul(
            1.,
            &store.matrix(unit.w),
            &arena.val(input),
            0.,
            &mut self.pre,
        );
        if let Some(b) = unit.b {
            self.pre += &store.vector(b);
        }

        let mut out = arena.take(self.out);
        out.zip_mut_with(&self.pre, |a, &z| *a = act.f(z));
        self.dropout.forward(&mut out, rng, train);
        arena.put(self.out, out);
    }

    /// # Panics
    /// If the node was not evaluated since it was created.
    pub fn backward(
        &mut self,
        arena: &mut TensorArena,
        store: &ParameterStore,
        grads: &mut Gradients,
        unit: &UniParams,
        act: ActFn,
    ) {
        let input = self.input.expect("backward of an affine node that never ran forward");

        self.delta.assign(&arena.grad(self.out));
        self.dropout.backward(&mut self.delta);
        self.delta.zip_mut_with(&self.pre, |d, &z| *d *= act.df(z));

        outer_add(grads.matrix_mut(unit.w), self.delta.view(), arena.val(input));
        if let Some(b) = unit.b {
            let mut db = grads.vector_mut(b);
            db += &self.delta;
        }

        linalg::general_mat_vec_mul(
            1.,
            &store.matrix(unit.w).t(),
            &self.delta,
            1.,
            &mut arena.grad_mut(input),
        );
    }
}

/// One affine node per position, all bound to the same unit.
#[derive(Debug)]
pub struct AffineLayer {
    unit: UniParams,
    act: ActFn,
    nodes: NodeArray<AffineNode>,
}

impl AffineLayer {
    pub fn new(
        arena: &mut TensorArena,
        unit: UniParams,
        act: ActFn,
        drop_prob: f32,
        capacity: usize,
    ) -> Self {
        Self {
            unit,
            act,
            nodes: NodeArray::new(capacity, |_| AffineNode::new(arena, unit.output, drop_prob)),
        }
    }

    pub fn forward<R: Rng>(
        &mut self,
        arena: &mut TensorArena,
        store: &ParameterStore,
        inputs: &[TensorId],
        rng: &mut R,
        train: bool,
    ) -> &[TensorId] {
        let n = self.nodes.activate(inputs.len());

        for (node, &input) in self.nodes.nodes_mut().iter_mut().zip(&inputs[..n]) {
            node.forward(arena, store, &self.unit, self.act, input, rng, train);
        }

        self.nodes.outputs()
    }

    pub fn backward(
        &mut self,
        arena: &mut TensorArena,
        store: &ParameterStore,
        grads: &mut Gradients,
    ) {
        let (unit, act) = (self.unit, self.act);
        for node in self.nodes.nodes_mut() {
            node.backward(arena, store, grads, &unit, act);
        }
    }

    pub fn outputs(&self) -> &[TensorId] {
        self.nodes.outputs()
    }

    pub fn reset(&mut self) {
        self.nodes.reset();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use ndarray::array;
    use rand::{SeedableRng, rngs::StdRng};

    use super::*;
    use crate::params::ParameterLayout;

    fn unit(bias: bool) -> (ParameterStore, UniParams) {
        let mut layout = ParameterLayout::new();
        let unit = UniParams::register(&mut layout, "hidden", 3, 2, bias);
        let mut store = ParameterStore::new(Arc::new(layout));
        store.set(unit.w, &[1., 0., -1., 0.5, 0.5, 0.5]).unwrap();
        if let Some(b) = unit.b {
            store.set(b, &[0.5, -1.]).unwrap();
        }
        (store, unit)
    }

    fn input(arena: &mut TensorArena) -> TensorId {
        let id = arena.alloc(3);
        let mut val = arena.take(id);
        val.assign(&array![1., 2., 3.]);
        arena.put(id, val);
        id
    }

    #[test]
    fn identity_affine() {
        let (store, unit) = unit(true);
        let mut arena = TensorArena::new();
        let x = input(&mut arena);
        let mut node = AffineNode::new(&mut arena, 2, 0.);

        let mut rng = StdRng::seed_from_u64(0);
        node.forward(&mut arena, &store, &unit, ActFn::Identity, x, &mut rng, true);
        assert_eq!(arena.val(node.output()), array![-1.5, 2.]);
    }

    #[test]
    fn backward_accumulates_weights_and_inputs() {
        let (store, unit) = unit(false);
        let mut arena = TensorArena::new();
        let x = input(&mut arena);
        let mut node = AffineNode::new(&mut arena, 2, 0.);
        let mut grads = Gradients::new(store.layout().clone());

        let mut rng = StdRng::seed_from_u64(0);
        node.forward(&mut arena, &store, &unit, ActFn::Identity, x, &mut rng, false);
        arena.grad_mut(node.output()).assign(&array![1., 2.]);
        node.backward(&mut arena, &store, &mut grads, &unit, ActFn::Identity);

        assert_eq!(grads.tensor(unit.w), [1., 2., 3., 2., 4., 6.]);
        assert_eq!(arena.grad(x), array![2., 1., 0.]);
    }

    #[test]
    fn layer_shares_its_unit() {
        let (store, unit) = unit(true);
        let mut arena = TensorArena::new();
        let x = input(&mut arena);
        let mut rng = StdRng::seed_from_u64(0);
        let mut layer = AffineLayer::new(&mut arena, unit, ActFn::Tanh, 0., 4);

        let outputs = layer.forward(&mut arena, &store, &[x, x], &mut rng, false).to_vec();
        assert_eq!(outputs.len(), 2);
        assert_eq!(arena.val(outputs[0]), arena.val(outputs[1]));
        assert!(arena.val(outputs[0]).iter().all(|v| v.abs() < 1.));
    }
}
