use crate::Result;

/// Defines the strategy for updating the model's parameters based on calculated gradients.
pub trait Optimizer {
    /// Updates the provided slice of parameters using the accumulated gradients.
    ///
    /// # Arguments
    /// * `grad` - The accumulated gradients, laid out like `params`.
    /// * `params` - A mutable slice of the current parameter values.
    ///
    /// # Returns
    /// A `SizeMismatch` error if both slices differ in length.
    fn update_params(&mut self, grad: &[f32], params: &mut [f32]) -> Result<()>;
}
