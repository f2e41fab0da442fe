use std::sync::Arc;

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::{Gradients, ParameterStore};
use crate::{LabelerErr, Result, optimization::Optimizer};

/// A cheaply clonable handle to a shared [`ParameterStore`].
///
/// Any amount of graphs may read the store at once, updates take the write lock so no forward
/// pass ever observes a partially updated tensor.
#[derive(Debug, Clone)]
pub struct ParameterHandle {
    store: Arc<RwLock<ParameterStore>>,
}

impl ParameterHandle {
    pub fn new(store: ParameterStore) -> Self {
        Self {
            store: Arc::new(RwLock::new(store)),
        }
    }

    /// Acquires shared read access to the store.
    pub fn read(&self) -> RwLockReadGuard<'_, ParameterStore> {
        self.store.read()
    }

    /// Acquires exclusive access to the store, for loading externally supplied values.
    pub fn write(&self) -> RwLockWriteGuard<'_, ParameterStore> {
        self.store.write()
    }

    /// Applies a gradient to the store with the given optimizer.
    ///
    /// # Arguments
    /// * `optimizer` - The update rule.
    /// * `grads` - Gradients computed against a store with the same layout.
    pub fn apply<O: Optimizer + ?Sized>(&self, optimizer: &mut O, grads: &Gradients) -> Result<()> {
        let mut store = self.store.write();

        if store.layout() != grads.layout() {
            return Err(LabelerErr::SizeMismatch {
                what: "gradient layout",
                got: grads.layout().tensors(),
                expected: store.layout().tensors(),
            });
        }

        optimizer.update_params(grads.as_slice(), store.as_mut_slice())
    }

    /// Copies the current state of the store.
    pub fn snapshot(&self) -> ParameterStore {
        self.store.read().clone()
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;
    use crate::{optimization::GradientDescent, params::ParameterLayout};

    struct AddOptimizer;

    impl Optimizer for AddOptimizer {
        fn update_params(&mut self, grad: &[f32], params: &mut [f32]) -> Result<()> {
            params.iter_mut().zip(grad).for_each(|(w, g)| *w += g);
            Ok(())
        }
    }

    fn handle() -> (ParameterHandle, Arc<ParameterLayout>) {
        let mut layout = ParameterLayout::new();
        layout.push_vector("v", 4);
        let layout = Arc::new(layout);
        (ParameterHandle::new(ParameterStore::new(layout.clone())), layout)
    }

    #[test]
    fn apply_updates_every_clone() {
        let (handle, layout) = handle();
        let other = handle.clone();

        let v = layout.find("v").unwrap();
        let mut grads = Gradients::new(layout);
        grads.tensor_mut(v).fill(1.);

        handle.apply(&mut AddOptimizer, &grads).unwrap();
        assert_eq!(other.read().as_slice(), [1.; 4]);

        handle.apply(&mut GradientDescent::new(2.), &grads).unwrap();
        assert_eq!(other.snapshot().as_slice(), [-1.; 4]);
    }

    #[test]
    fn foreign_layout_is_rejected() {
        let (handle, _) = handle();
        let mut layout = ParameterLayout::new();
        layout.push_vector("v", 3);

        let grads = Gradients::new(Arc::new(layout));
        assert!(handle.apply(&mut AddOptimizer, &grads).is_err());
    }

    #[test]
    fn concurrent_readers() {
        let (handle, _) = handle();

        thread::scope(|s| {
            for _ in 0..4 {
                let handle = handle.clone();
                s.spawn(move || assert_eq!(handle.read().len(), 4));
            }
        });
    }
}
