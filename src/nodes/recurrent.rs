use ndarray::{Array1, ArrayView1, Zip, linalg};
use rand::Rng;

use super::{ActFn, Dropout, outer_add};
use crate::{
    graph::{NodeArray, Output, TensorArena, TensorId},
    params::{GateParams, Gradients, GrnnParams, ParameterStore, RnnParams},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    LeftToRight,
    RightToLeft,
}

impl Direction {
    /// The position evaluated at step `t` of a sequence of length `n`.
    fn position(self, t: usize, n: usize) -> usize {
        match self {
            Direction::LeftToRight => t,
            Direction::RightToLeft => n - 1 - t,
        }
    }

    /// The position whose state feeds position `i`, if any.
    fn prev(self, i: usize, n: usize) -> Option<usize> {
        match self {
            Direction::LeftToRight => i.checked_sub(1),
            Direction::RightToLeft => (i + 1 < n).then_some(i + 1),
        }
    }
}

/// The recurrence shared by every step of a builder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cell {
    /// `h = tanh(Wx x + Wh h_prev + b)`.
    Plain(RnnParams),
    /// Update gate `z`, reset gate `r` and candidate `c = tanh(Wx x + Wh (r * h_prev) + b)`,
    /// `h = (1 - z) * h_prev + z * c`.
    Gated(GrnnParams),
}

impl Cell {
    fn hidden(&self) -> usize {
        match self {
            Cell::Plain(rnn) => rnn.hidden,
            Cell::Gated(grnn) => grnn.hidden,
        }
    }
}

#[derive(Debug)]
struct RecurrentStep {
    out: TensorId,
    input: Option<TensorId>,
    h: Array1<f32>,
    // Plain cells only use `pre`, gated cells use the rest.
    pre: Array1<f32>,
    z: Array1<f32>,
    r: Array1<f32>,
    c: Array1<f32>,
    rh: Array1<f32>,
    dropout: Dropout,
}

impl Output for RecurrentStep {
    fn output(&self) -> TensorId {
        self.out
    }
}

/// Per builder buffers for the backward pass.
#[derive(Debug)]
struct Scratch {
    delta: Array1<f32>,
    dh: Array1<f32>,
    carry: Array1<f32>,
    d_cand: Array1<f32>,
    d_update: Array1<f32>,
    d_rh: Array1<f32>,
}

impl Scratch {
    fn new(hidden: usize) -> Self {
        Self {
            delta: Array1::zeros(hidden),
            dh: Array1::zeros(hidden),
            carry: Array1::zeros(hidden),
            d_cand: Array1::zeros(hidden),
            d_update: Array1::zeros(hidden),
            d_rh: Array1::zeros(hidden),
        }
    }
}

/// `pre = Wx x + Wh h + b`.
fn gate_pre(
    store: &ParameterStore,
    gate: &GateParams,
    x: &ArrayView1<'_, f32>,
    h: &ArrayView1<'_, f32>,
    pre: &mut Array1<f32>,
) {
    linalg::general_mat_vec_mul(1., &store.matrix(gate.wx), x, 0., pre);
    linalg::general_mat_vec_mul(1., &store.matrix(gate.wh), h, 1., pre);
    *pre += &store.vector(gate.b);
}

/// Accumulates the gradients of a gate given the gradient of its pre-activation.
///
/// The gradient with respect to the gate's input is added to the arena, the one with respect
/// to its state input is added to `dh`.
fn gate_backward(
    arena: &mut TensorArena,
    store: &ParameterStore,
    grads: &mut Gradients,
    gate: &GateParams,
    dpre: &Array1<f32>,
    input: TensorId,
    h: ArrayView1<'_, f32>,
    dh: &mut Array1<f32>,
) {
    outer_add(grads.matrix_mut(gate.wx), dpre.view(), arena.val(input));
    outer_add(grads.matrix_mut(gate.wh), dpre.view(), h);
    let mut db = grads.vector_mut(gate.b);
    db += dpre;

    linalg::general_mat_vec_mul(1., &store.matrix(gate.wh).t(), dpre, 1., dh);
    linalg::general_mat_vec_mul(
        1.,
        &store.matrix(gate.wx).t(),
        dpre,
        1.,
        &mut arena.grad_mut(input),
    );
}

impl RecurrentStep {
    fn new(arena: &mut TensorArena, cell: &Cell, drop_prob: f32) -> Self {
        let hidden = cell.hidden();
        let gated = match cell {
            Cell::Plain(_) => 0,
            Cell::Gated(_) => hidden,
        };

        Self {
            out: arena.alloc(hidden),
            input: None,
            h: Array1::zeros(hidden),
            pre: Array1::zeros(hidden - gated),
            z: Array1::zeros(gated),
            r: Array1::zeros(gated),
            c: Array1::zeros(gated),
            rh: Array1::zeros(gated),
            dropout: Dropout::new(hidden, drop_prob),
        }
    }

    fn forward<R: Rng>(
        &mut self,
        arena: &mut TensorArena,
        store: &ParameterStore,
        cell: &Cell,
        input: TensorId,
        h_prev: ArrayView1<'_, f32>,
        rng: &mut R,
        train: bool,
    ) {
        self.input = Some(input);
        let x = arena.val(input);

        match cell {
            Cell::Plain(rnn) => {
                gate_pre(store, &rnn.cell, &x, &h_prev, &mut self.pre);
                self.h.zip_mut_with(&self.pre, |h, &p| *h = p.tanh());
            }
            Cell::Gated(grnn) => {
                gate_pre(store, &grnn.update, &x, &h_prev, &mut self.z);
                self.z.mapv_inplace(|v| ActFn::Sigmoid.f(v));
                gate_pre(store, &grnn.reset, &x, &h_prev, &mut self.r);
                self.r.mapv_inplace(|v| ActFn::Sigmoid.f(v));

                Zip::from(&mut self.rh)
                    .and(&self.r)
                    .and(&h_prev)
                    .for_each(|rh, &r, &hp| *rh = r * hp);
                gate_pre(store, &grnn.candidate, &x, &self.rh.view(), &mut self.c);
                self.c.mapv_inplace(f32::tanh);

                Zip::from(&mut self.h)
                    .and(&self.z)
                    .and(&self.c)
                    .and(&h_prev)
                    .for_each(|h, &z, &c, &hp| *h = (1. - z) * hp + z * c);
            }
        }

        let mut out = arena.take(self.out);
        out.assign(&self.h);
        self.dropout.forward(&mut out, rng, train);
        arena.put(self.out, out);
    }

    /// Backpropagates one step, `scratch.carry` holds the gradient flowing into this step's
    /// state from the next step and is replaced by the gradient of `h_prev`.
    fn backward(
        &self,
        arena: &mut TensorArena,
        store: &ParameterStore,
        grads: &mut Gradients,
        cell: &Cell,
        h_prev: ArrayView1<'_, f32>,
        scratch: &mut Scratch,
    ) {
        let input = self.input.expect("backward of a recurrent step that never ran forward");

        scratch.delta.assign(&arena.grad(self.out));
        self.dropout.backward(&mut scratch.delta);
        scratch.dh.assign(&scratch.carry);
        scratch.dh += &scratch.delta;
        scratch.carry.fill(0.);

        match cell {
            Cell::Plain(rnn) => {
                Zip::from(&mut scratch.d_cand)
                    .and(&scratch.dh)
                    .and(&self.h)
                    .for_each(|dp, &dh, &h| *dp = dh * (1. - h * h));
                gate_backward(
                    arena,
                    store,
                    grads,
                    &rnn.cell,
                    &scratch.d_cand,
                    input,
                    h_prev,
                    &mut scratch.carry,
                );
            }
            Cell::Gated(grnn) => {
                Zip::from(&mut scratch.d_cand)
                    .and(&scratch.dh)
                    .and(&self.z)
                    .and(&self.c)
                    .for_each(|dc, &dh, &z, &c| *dc = dh * z * (1. - c * c));
                Zip::from(&mut scratch.d_update)
                    .and(&scratch.dh)
                    .and(&self.z)
                    .and(&self.c)
                    .and(&h_prev)
                    .for_each(|dz, &dh, &z, &c, &hp| *dz = dh * (c - hp) * z * (1. - z));
                Zip::from(&mut scratch.carry)
                    .and(&scratch.dh)
                    .and(&self.z)
                    .for_each(|dhp, &dh, &z| *dhp = dh * (1. - z));

                scratch.d_rh.fill(0.);
                gate_backward(
                    arena,
                    store,
                    grads,
                    &grnn.candidate,
                    &scratch.d_cand,
                    input,
                    self.rh.view(),
                    &mut scratch.d_rh,
                );

                // d_cand is free again, reuse it for the reset gate
                Zip::from(&mut scratch.d_cand)
                    .and(&scratch.d_rh)
                    .and(&self.r)
                    .and(&h_prev)
                    .for_each(|dr, &drh, &r, &hp| *dr = drh * hp * r * (1. - r));
                Zip::from(&mut scratch.carry)
                    .and(&scratch.d_rh)
                    .and(&self.r)
                    .for_each(|dhp, &drh, &r| *dhp += drh * r);

                gate_backward(
                    arena,
                    store,
                    grads,
                    &grnn.update,
                    &scratch.d_update,
                    input,
                    h_prev,
                    &mut scratch.carry,
                );
                gate_backward(
                    arena,
                    store,
                    grads,
                    &grnn.reset,
                    &scratch.d_cand,
                    input,
                    h_prev,
                    &mut scratch.carry,
                );
            }
        }
    }
}

/// One recurrent step per position, all sharing a single cell, evaluated in one direction.
#[derive(Debug)]
pub struct RecurrentBuilder {
    cell: Cell,
    direction: Direction,
    zero: Array1<f32>,
    steps: NodeArray<RecurrentStep>,
    scratch: Scratch,
}

impl RecurrentBuilder {
    /// Creates a new `RecurrentBuilder`.
    ///
    /// # Arguments
    /// * `arena` - The arena to allocate the outputs in.
    /// * `cell` - The unit shared by every step.
    /// * `direction` - The evaluation order.
    /// * `drop_prob` - Dropout applied to every exposed output, never to the carried state.
    /// * `capacity` - The maximum sequence length.
    pub fn new(
        arena: &mut TensorArena,
        cell: Cell,
        direction: Direction,
        drop_prob: f32,
        capacity: usize,
    ) -> Self {
        let hidden = cell.hidden();

        Self {
            cell,
            direction,
            zero: Array1::zeros(hidden),
            steps: NodeArray::new(capacity, |_| RecurrentStep::new(arena, &cell, drop_prob)),
            scratch: Scratch::new(hidden),
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
        let n = self.steps.activate(inputs.len());

        for t in 0..n {
            let i = self.direction.position(t, n);
            let prev = self.direction.prev(i, n);

            let (step, prev_step) = split_step(self.steps.nodes_mut(), i, prev);
            let h_prev = prev_step.map_or(self.zero.view(), |s| s.h.view());
            step.forward(arena, store, &self.cell, inputs[i], h_prev, rng, train);
        }

        self.steps.outputs()
    }

    /// Backpropagates through time, in the reverse of the evaluation order.
    pub fn backward(
        &mut self,
        arena: &mut TensorArena,
        store: &ParameterStore,
        grads: &mut Gradients,
    ) {
        let n = self.steps.active();
        let steps = self.steps.nodes();
        self.scratch.carry.fill(0.);

        for t in (0..n).rev() {
            let i = self.direction.position(t, n);
            let h_prev = self
                .direction
                .prev(i, n)
                .map_or(self.zero.view(), |p| steps[p].h.view());

            steps[i].backward(arena, store, grads, &self.cell, h_prev, &mut self.scratch);
        }
    }

    pub fn outputs(&self) -> &[TensorId] {
        self.steps.outputs()
    }

    pub fn reset(&mut self) {
        self.steps.reset();
    }

    /// The hidden state at position `i` before dropout.
    pub fn state(&self, i: usize) -> ArrayView1<'_, f32> {
        self.steps.get(i).h.view()
    }
}

/// Borrows the step at `i` mutably together with the step feeding it.
fn split_step<T>(steps: &mut [T], i: usize, prev: Option<usize>) -> (&mut T, Option<&T>) {
    match prev {
        None => (&mut steps[i], None),
        Some(p) if p < i => {
            let (before, rest) = steps.split_at_mut(i);
            (&mut rest[0], Some(&before[p]))
        }
        Some(p) => {
            let (before, rest) = steps.split_at_mut(p);
            (&mut before[i], Some(&rest[0]))
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use ndarray::Array1;
    use rand::{SeedableRng, rngs::StdRng};

    use super::*;
    use crate::params::ParameterLayout;

    fn plain() -> (ParameterStore, RnnParams) {
        let mut layout = ParameterLayout::new();
        let rnn = RnnParams::register(&mut layout, "rnn", 1, 1);
        let mut store = ParameterStore::new(Arc::new(layout));
        store.set(rnn.cell.wx, &[1.]).unwrap();
        store.set(rnn.cell.wh, &[0.5]).unwrap();
        (store, rnn)
    }

    fn inputs(arena: &mut TensorArena, values: &[f32]) -> Vec<TensorId> {
        values
            .iter()
            .map(|&v| {
                let id = arena.alloc(1);
                let mut val = arena.take(id);
                val.assign(&Array1::from_elem(1, v));
                arena.put(id, val);
                id
            })
            .collect()
    }

    #[test]
    fn directions_see_opposite_contexts() {
        let (store, rnn) = plain();
        let mut arena = TensorArena::new();
        let mut rng = StdRng::seed_from_u64(0);
        let xs = inputs(&mut arena, &[1., 0., 0.]);

        let mut left =
            RecurrentBuilder::new(&mut arena, Cell::Plain(rnn), Direction::LeftToRight, 0., 4);
        let mut right =
            RecurrentBuilder::new(&mut arena, Cell::Plain(rnn), Direction::RightToLeft, 0., 4);
        left.forward(&mut arena, &store, &xs, &mut rng, false);
        right.forward(&mut arena, &store, &xs, &mut rng, false);

        let h0 = 1f32.tanh();
        assert!((left.state(0)[0] - h0).abs() < 1e-6);
        assert!((left.state(1)[0] - (0.5 * h0).tanh()).abs() < 1e-6);
        assert!(left.state(2)[0] > 0.);

        assert_eq!(right.state(2)[0], 0.);
        assert_eq!(right.state(1)[0], 0.);
        assert!((right.state(0)[0] - h0).abs() < 1e-6);
    }

    #[test]
    fn gated_state_interpolates() {
        let mut layout = ParameterLayout::new();
        let grnn = GrnnParams::register(&mut layout, "grnn", 2, 3);
        let mut store = ParameterStore::new(Arc::new(layout));
        for (k, value) in store.as_mut_slice().iter_mut().enumerate() {
            *value = ((k * 7 % 11) as f32 - 5.) * 0.3;
        }

        let mut arena = TensorArena::new();
        let mut rng = StdRng::seed_from_u64(0);
        let xs: Vec<_> = (0..6)
            .map(|k| {
                let id = arena.alloc(2);
                let mut val = arena.take(id);
                val.assign(&Array1::from(vec![k as f32 - 2., 1.5]));
                arena.put(id, val);
                id
            })
            .collect();

        let mut builder =
            RecurrentBuilder::new(&mut arena, Cell::Gated(grnn), Direction::LeftToRight, 0., 8);
        builder.forward(&mut arena, &store, &xs, &mut rng, false);

        // every state lies between the previous state and a candidate in [-1, 1]
        for i in 0..6 {
            assert!(builder.state(i).iter().all(|h| h.abs() <= 1.));
        }
    }

    #[test]
    fn plain_backward_through_time() {
        let (store, rnn) = plain();
        let mut arena = TensorArena::new();
        let mut rng = StdRng::seed_from_u64(0);
        let xs = inputs(&mut arena, &[1., 0.]);

        let mut builder =
            RecurrentBuilder::new(&mut arena, Cell::Plain(rnn), Direction::LeftToRight, 0., 4);
        let outputs = builder.forward(&mut arena, &store, &xs, &mut rng, false).to_vec();
        arena.grad_mut(outputs[1]).fill(1.);

        let mut grads = Gradients::new(store.layout().clone());
        builder.backward(&mut arena, &store, &mut grads);

        let h0 = 1f32.tanh();
        let h1 = (0.5 * h0).tanh();
        let dpre1 = 1. - h1 * h1;
        let dpre0 = dpre1 * 0.5 * (1. - h0 * h0);

        assert!((arena.grad(xs[1])[0] - dpre1).abs() < 1e-6);
        assert!((arena.grad(xs[0])[0] - dpre0).abs() < 1e-6);
        assert!((grads.tensor(rnn.cell.wh)[0] - dpre1 * h0).abs() < 1e-6);
        assert!((grads.tensor(rnn.cell.b)[0] - (dpre0 + dpre1)).abs() < 1e-6);
    }

    #[test]
    fn split_step_borrows_both_neighbours() {
        let mut steps = [0, 1, 2, 3];

        let (cur, prev) = split_step(&mut steps, 2, Some(1));
        assert_eq!((*cur, prev.copied()), (2, Some(1)));

        let (cur, prev) = split_step(&mut steps, 2, Some(3));
        assert_eq!((*cur, prev.copied()), (2, Some(3)));
    }
}
