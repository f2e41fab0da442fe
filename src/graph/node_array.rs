use super::TensorId;

/// Any node that writes a single output tensor.
pub trait Output {
    fn output(&self) -> TensorId;
}

/// A fixed capacity array of preallocated nodes with an active-length cursor.
///
/// Only the first `active` nodes take part in an evaluation, `0 <= active <= capacity` always.
#[derive(Debug)]
pub struct NodeArray<T> {
    nodes: Vec<T>,
    outputs: Vec<TensorId>,
    active: usize,
}

impl<T: Output> NodeArray<T> {
    /// Preallocates `capacity` nodes.
    ///
    /// # Arguments
    /// * `capacity` - The maximum amount of active nodes.
    /// * `make` - Builds the node at the given position.
    pub fn new<F>(capacity: usize, make: F) -> Self
    where
        F: FnMut(usize) -> T,
    {
        let nodes: Vec<T> = (0..capacity).map(make).collect();
        let outputs = nodes.iter().map(Output::output).collect();

        Self {
            nodes,
            outputs,
            active: 0,
        }
    }

    /// Activates the first `len` nodes, truncating to the capacity.
    ///
    /// # Returns
    /// The new active length.
    pub fn activate(&mut self, len: usize) -> usize {
        self.active = len.min(self.nodes.len());
        self.active
    }

    pub fn reset(&mut self) {
        self.active = 0;
    }

    pub fn capacity(&self) -> usize {
        self.nodes.len()
    }

    pub fn active(&self) -> usize {
        self.active
    }

    /// The output tensors of the active prefix, in position order.
    pub fn outputs(&self) -> &[TensorId] {
        &self.outputs[..self.active]
    }

    /// The active prefix.
    pub fn nodes(&self) -> &[T] {
        &self.nodes[..self.active]
    }

    pub fn nodes_mut(&mut self) -> &mut [T] {
        &mut self.nodes[..self.active]
    }

    /// # Panics
    /// If `i` is past the active length.
    pub fn get(&self, i: usize) -> &T {
        assert!(
            i < self.active,
            "node {i} accessed past active length {}",
            self.active
        );
        &self.nodes[i]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::TensorArena;

    struct Leaf(TensorId);

    impl Output for Leaf {
        fn output(&self) -> TensorId {
            self.0
        }
    }

    fn array(capacity: usize) -> NodeArray<Leaf> {
        let mut arena = TensorArena::new();
        NodeArray::new(capacity, |_| Leaf(arena.alloc(1)))
    }

    #[test]
    fn activation_truncates_to_capacity() {
        let mut nodes = array(4);

        assert_eq!(nodes.activate(3), 3);
        assert_eq!(nodes.outputs().len(), 3);
        assert_eq!(nodes.activate(10), nodes.capacity());
        assert_eq!(nodes.nodes().len(), 4);

        nodes.reset();
        assert!(nodes.outputs().is_empty());
    }

    #[test]
    #[should_panic(expected = "past active length")]
    fn access_past_active_length_panics() {
        let mut nodes = array(4);
        nodes.activate(2);
        nodes.get(2);
    }
}
