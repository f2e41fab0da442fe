use std::sync::Arc;

use ndarray::{ArrayView1, ArrayView2, ArrayViewMut1, ArrayViewMut2};

use super::{ParameterLayout, Shape, TensorRef};
use crate::{LabelerErr, Result, initialization::ParamGen};

/// Owns the values of every learned tensor of a model in a single flat buffer.
///
/// Nodes never own parameters, they hold [`TensorRef`]s and view the store while evaluating.
#[derive(Debug, Clone)]
pub struct ParameterStore {
    layout: Arc<ParameterLayout>,
    params: Box<[f32]>,
}

impl ParameterStore {
    /// Creates a new zeroed `ParameterStore`.
    ///
    /// # Arguments
    /// * `layout` - The layout of the tensors in the store.
    pub fn new(layout: Arc<ParameterLayout>) -> Self {
        let params = vec![0.; layout.size()].into_boxed_slice();
        Self { layout, params }
    }

    pub fn layout(&self) -> &Arc<ParameterLayout> {
        &self.layout
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.params
    }

    pub fn as_mut_slice(&mut self) -> &mut [f32] {
        &mut self.params
    }

    /// The flat values of a single tensor.
    pub fn tensor(&self, tensor: TensorRef) -> &[f32] {
        &self.params[self.layout.entry(tensor).range.clone()]
    }

    pub fn tensor_mut(&mut self, tensor: TensorRef) -> &mut [f32] {
        let range = self.layout.entry(tensor).range.clone();
        &mut self.params[range]
    }

    /// Views a matrix tensor.
    ///
    /// # Panics
    /// If `tensor` is not a matrix.
    pub fn matrix(&self, tensor: TensorRef) -> ArrayView2<'_, f32> {
        let dim = matrix_dim(&self.layout, tensor);
        // SAFETY: The layout guarantees the range has exactly rows * cols entries.
        ArrayView2::from_shape(dim, self.tensor(tensor)).unwrap()
    }

    /// Views a vector tensor.
    pub fn vector(&self, tensor: TensorRef) -> ArrayView1<'_, f32> {
        ArrayView1::from(self.tensor(tensor))
    }

    /// Overwrites a tensor with the values of a parameter generator.
    ///
    /// # Errors
    /// `SizeMismatch` if the generator runs dry before the tensor is full.
    pub fn fill<G: ParamGen + ?Sized>(
        &mut self,
        tensor: TensorRef,
        param_gen: &mut G,
    ) -> Result<()> {
        let dst = self.tensor_mut(tensor);
        let expected = dst.len();
        let mut filled = 0;

        while filled < expected {
            match param_gen.fill(&mut dst[filled..]) {
                0 => {
                    return Err(LabelerErr::SizeMismatch {
                        what: "parameter generator",
                        got: filled,
                        expected,
                    });
                }
                n => filled += n,
            }
        }

        Ok(())
    }

    /// Overwrites a tensor with the given values.
    pub fn set(&mut self, tensor: TensorRef, values: &[f32]) -> Result<()> {
        let dst = self.tensor_mut(tensor);
        if dst.len() != values.len() {
            return Err(LabelerErr::SizeMismatch {
                what: "tensor values",
                got: values.len(),
                expected: dst.len(),
            });
        }

        dst.copy_from_slice(values);
        Ok(())
    }

    /// Overwrites a single row of a matrix tensor, typically a pretrained embedding.
    ///
    /// # Arguments
    /// * `tensor` - A matrix tensor.
    /// * `row` - The row index.
    /// * `values` - The new row, must have as many entries as the matrix has columns.
    pub fn set_row(&mut self, tensor: TensorRef, row: usize, values: &[f32]) -> Result<()> {
        let (rows, cols) = matrix_dim(&self.layout, tensor);
        if row >= rows {
            return Err(LabelerErr::SizeMismatch {
                what: "row index",
                got: row,
                expected: rows,
            });
        }
        if values.len() != cols {
            return Err(LabelerErr::SizeMismatch {
                what: "row values",
                got: values.len(),
                expected: cols,
            });
        }

        self.tensor_mut(tensor)[row * cols..(row + 1) * cols].copy_from_slice(values);
        Ok(())
    }
}

/// Accumulated gradients, laid out exactly like the store they were computed against.
#[derive(Debug, Clone)]
pub struct Gradients {
    layout: Arc<ParameterLayout>,
    grad: Box<[f32]>,
}

impl Gradients {
    /// Creates a new zeroed gradient buffer.
    pub fn new(layout: Arc<ParameterLayout>) -> Self {
        let grad = vec![0.; layout.size()].into_boxed_slice();
        Self { layout, grad }
    }

    pub fn layout(&self) -> &Arc<ParameterLayout> {
        &self.layout
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.grad
    }

    pub fn tensor(&self, tensor: TensorRef) -> &[f32] {
        &self.grad[self.layout.entry(tensor).range.clone()]
    }

    pub fn tensor_mut(&mut self, tensor: TensorRef) -> &mut [f32] {
        let range = self.layout.entry(tensor).range.clone();
        &mut self.grad[range]
    }

    /// Mutably views a matrix tensor's gradient.
    ///
    /// # Panics
    /// If `tensor` is not a matrix.
    pub fn matrix_mut(&mut self, tensor: TensorRef) -> ArrayViewMut2<'_, f32> {
        let dim = matrix_dim(&self.layout, tensor);
        // SAFETY: The layout guarantees the range has exactly rows * cols entries.
        ArrayViewMut2::from_shape(dim, self.tensor_mut(tensor)).unwrap()
    }

    pub fn vector_mut(&mut self, tensor: TensorRef) -> ArrayViewMut1<'_, f32> {
        ArrayViewMut1::from(self.tensor_mut(tensor))
    }

    /// Zeros out every gradient.
    pub fn zero(&mut self) {
        self.grad.fill(0.);
    }

    /// Adds another gradient buffer into this one.
    ///
    /// # Returns
    /// A `SizeMismatch` error if both buffers have a different amount of parameters.
    pub fn accumulate(&mut self, other: &Gradients) -> Result<()> {
        if other.grad.len() != self.grad.len() {
            return Err(LabelerErr::SizeMismatch {
                what: "gradient",
                got: other.grad.len(),
                expected: self.grad.len(),
            });
        }

        self.grad
            .iter_mut()
            .zip(other.grad.iter())
            .for_each(|(acc, g)| *acc += g);
        Ok(())
    }

    /// Multiplies every gradient by `factor`.
    pub fn scale(&mut self, factor: f32) {
        self.grad.iter_mut().for_each(|g| *g *= factor);
    }
}

fn matrix_dim(layout: &ParameterLayout, tensor: TensorRef) -> (usize, usize) {
    match layout.entry(tensor).shape {
        Shape::Matrix(rows, cols) => (rows, cols),
        Shape::Vector(_) => panic!("tensor {} is not a matrix", layout.entry(tensor).name),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::initialization::Constant;

    fn layout() -> (Arc<ParameterLayout>, TensorRef, TensorRef) {
        let mut layout = ParameterLayout::new();
        let w = layout.push_matrix("w", 2, 3);
        let b = layout.push_vector("b", 2);
        (Arc::new(layout), w, b)
    }

    #[test]
    fn matrix_views_are_row_major() {
        let (layout, w, b) = layout();
        let mut store = ParameterStore::new(layout);
        store.set(w, &[1., 2., 3., 4., 5., 6.]).unwrap();

        let m = store.matrix(w);
        assert_eq!(m[(0, 2)], 3.);
        assert_eq!(m[(1, 0)], 4.);
        assert_eq!(store.vector(b).to_vec(), [0., 0.]);
    }

    #[test]
    fn fill_consumes_the_generator() {
        let (layout, w, b) = layout();
        let mut store = ParameterStore::new(layout);

        store.fill(b, &mut Constant::new(0.5, 2)).unwrap();
        assert_eq!(store.tensor(b), [0.5, 0.5]);

        assert!(matches!(
            store.fill(w, &mut Constant::new(1., 4)),
            Err(LabelerErr::SizeMismatch { got: 4, expected: 6, .. })
        ));
    }

    #[test]
    fn set_row_overwrites_a_single_row() {
        let (layout, w, _) = layout();
        let mut store = ParameterStore::new(layout);

        store.set_row(w, 1, &[7., 8., 9.]).unwrap();
        assert_eq!(store.tensor(w), [0., 0., 0., 7., 8., 9.]);
        assert!(store.set_row(w, 2, &[0.; 3]).is_err());
        assert!(store.set_row(w, 0, &[0.; 2]).is_err());
    }

    #[test]
    fn gradients_accumulate_and_scale() {
        let (layout, w, b) = layout();
        let mut a = Gradients::new(layout.clone());
        let mut other = Gradients::new(layout);

        a.matrix_mut(w)[(1, 1)] = 1.;
        other.matrix_mut(w)[(1, 1)] = 2.;
        other.vector_mut(b)[0] = 4.;

        a.accumulate(&other).unwrap();
        a.scale(0.5);
        assert_eq!(a.tensor(w)[4], 1.5);
        assert_eq!(a.tensor(b), [2., 0.]);

        a.zero();
        assert!(a.as_slice().iter().all(|&g| g == 0.));
    }
}
