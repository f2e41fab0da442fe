use ndarray::{Array1, Zip};
use rand::Rng;

use super::Dropout;
use crate::{
    graph::{NodeArray, Output, TensorArena, TensorId},
    params::{Gradients, LookupTable, ParameterStore},
};

/// Copies one row of an embedding table.
#[derive(Debug)]
pub struct LookupNode {
    out: TensorId,
    index: usize,
    delta: Array1<f32>,
    dropout: Dropout,
}

impl Output for LookupNode {
    fn output(&self) -> TensorId {
        self.out
    }
}

impl LookupNode {
    pub fn new(arena: &mut TensorArena, dim: usize, drop_prob: f32) -> Self {
        Self {
            out: arena.alloc(dim),
            index: 0,
            delta: Array1::zeros(dim),
            dropout: Dropout::new(dim, drop_prob),
        }
    }

    /// # Panics
    /// If `index` is not a row of the table.
    pub fn forward<R: Rng>(
        &mut self,
        arena: &mut TensorArena,
        store: &ParameterStore,
        table: &LookupTable,
        index: usize,
        rng: &mut R,
        train: bool,
    ) {
        assert!(
            index < table.vocab,
            "id {index} out of range for a vocabulary of {}",
            table.vocab
        );
        self.index = index;

        let mut out = arena.take(self.out);
        out.assign(&store.matrix(table.table).row(index));
        self.dropout.forward(&mut out, rng, train);
        arena.put(self.out, out);
    }

    pub fn backward(&mut self, arena: &TensorArena, grads: &mut Gradients, table: &LookupTable) {
        self.delta.assign(&arena.grad(self.out));
        self.dropout.backward(&mut self.delta);

        let mut dw = grads.matrix_mut(table.table);
        Zip::from(dw.row_mut(self.index))
            .and(&self.delta)
            .for_each(|g, &d| *g += d);
    }
}

/// One lookup per position of a sequence, all bound to the same table.
#[derive(Debug)]
pub struct LookupLayer {
    table: LookupTable,
    nodes: NodeArray<LookupNode>,
}

impl LookupLayer {
    pub fn new(
        arena: &mut TensorArena,
        table: LookupTable,
        drop_prob: f32,
        capacity: usize,
    ) -> Self {
        Self {
            table,
            nodes: NodeArray::new(capacity, |_| LookupNode::new(arena, table.dim, drop_prob)),
        }
    }

    /// Looks up every id of the sequence, ids past the capacity are dropped.
    ///
    /// # Returns
    /// The outputs of the active prefix.
    pub fn forward<R: Rng>(
        &mut self,
        arena: &mut TensorArena,
        store: &ParameterStore,
        ids: &[usize],
        rng: &mut R,
        train: bool,
    ) -> &[TensorId] {
        let n = self.nodes.activate(ids.len());

        for (node, &id) in self.nodes.nodes_mut().iter_mut().zip(&ids[..n]) {
            node.forward(arena, store, &self.table, id, rng, train);
        }

        self.nodes.outputs()
    }

    pub fn backward(&mut self, arena: &TensorArena, grads: &mut Gradients) {
        let table = self.table;
        for node in self.nodes.nodes_mut() {
            node.backward(arena, grads, &table);
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

    fn table() -> (ParameterStore, LookupTable) {
        let mut layout = ParameterLayout::new();
        let table = LookupTable::register(&mut layout, "words", 3, 2);
        let mut store = ParameterStore::new(Arc::new(layout));
        store.set(table.table, &[0., 1., 2., 3., 4., 5.]).unwrap();
        (store, table)
    }

    #[test]
    fn rows_are_copied_and_gradients_scattered() {
        let (store, table) = table();
        let mut arena = TensorArena::new();
        let mut rng = StdRng::seed_from_u64(0);
        let mut layer = LookupLayer::new(&mut arena, table, 0., 4);

        let outputs = layer.forward(&mut arena, &store, &[2, 0, 2], &mut rng, true).to_vec();
        assert_eq!(arena.val(outputs[0]), array![4., 5.]);
        assert_eq!(arena.val(outputs[1]), array![0., 1.]);

        for &out in &outputs {
            arena.grad_mut(out).fill(1.);
        }
        let mut grads = Gradients::new(store.layout().clone());
        layer.backward(&arena, &mut grads);

        assert_eq!(grads.tensor(table.table), [1., 1., 0., 0., 2., 2.]);
    }

    #[test]
    fn excess_ids_are_truncated() {
        let (store, table) = table();
        let mut arena = TensorArena::new();
        let mut rng = StdRng::seed_from_u64(0);
        let mut layer = LookupLayer::new(&mut arena, table, 0., 2);

        let outputs = layer.forward(&mut arena, &store, &[1, 1, 1, 1], &mut rng, false);
        assert_eq!(outputs.len(), 2);
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn unknown_id_panics() {
        let (store, table) = table();
        let mut arena = TensorArena::new();
        let mut rng = StdRng::seed_from_u64(0);
        let mut layer = LookupLayer::new(&mut arena, table, 0., 2);

        layer.forward(&mut arena, &store, &[3], &mut rng, false);
    }
}
