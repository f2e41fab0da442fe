use std::ops::Range;

use crate::{LabelerErr, Result};

/// A handle to one tensor of a [`ParameterLayout`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TensorRef(usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    /// `(rows, cols)`, stored row major.
    Matrix(usize, usize),
    Vector(usize),
}

impl Shape {
    pub fn len(&self) -> usize {
        match *self {
            Shape::Matrix(rows, cols) => rows * cols,
            Shape::Vector(n) => n,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TensorEntry {
    pub name: String,
    pub shape: Shape,
    pub range: Range<usize>,
}

/// Describes how the named tensors of a model are packed in a single flat buffer.
///
/// Tensors are laid out contiguously in registration order, which is also the order in which
/// they are persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParameterLayout {
    entries: Vec<TensorEntry>,
    size: usize,
}

impl ParameterLayout {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new `rows x cols` matrix.
    pub fn push_matrix(&mut self, name: impl Into<String>, rows: usize, cols: usize) -> TensorRef {
        self.push(name.into(), Shape::Matrix(rows, cols))
    }

    /// Registers a new vector of `n` entries.
    pub fn push_vector(&mut self, name: impl Into<String>, n: usize) -> TensorRef {
        self.push(name.into(), Shape::Vector(n))
    }

    fn push(&mut self, name: String, shape: Shape) -> TensorRef {
        debug_assert!(self.find(&name).is_err(), "tensor {name} registered twice");

        let start = self.size;
        self.size += shape.len();
        self.entries.push(TensorEntry {
            name,
            shape,
            range: start..self.size,
        });

        TensorRef(self.entries.len() - 1)
    }

    /// # Panics
    /// If `tensor` was not created by this layout.
    pub fn entry(&self, tensor: TensorRef) -> &TensorEntry {
        &self.entries[tensor.0]
    }

    /// Looks up a tensor by name.
    ///
    /// # Returns
    /// An `UnknownTensor` error if no tensor has that name.
    pub fn find(&self, name: &str) -> Result<TensorRef> {
        self.entries
            .iter()
            .position(|e| e.name == name)
            .map(TensorRef)
            .ok_or_else(|| LabelerErr::UnknownTensor(name.to_string()))
    }

    /// Iterates every tensor in layout order.
    pub fn iter(&self) -> impl Iterator<Item = (TensorRef, &TensorEntry)> {
        self.entries.iter().enumerate().map(|(i, e)| (TensorRef(i), e))
    }

    /// The amount of tensors.
    pub fn tensors(&self) -> usize {
        self.entries.len()
    }

    /// The total amount of parameters.
    pub fn size(&self) -> usize {
        self.size
    }
}
