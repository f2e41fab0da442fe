//! Initial values for the tensors of a parameter store.

mod constant;
mod sampled;

pub use constant::Constant;
pub use sampled::Sampled;

/// A bounded source of initial values for a tensor.
pub trait ParamGen {
    /// Writes the next values into the front of `dst`.
    ///
    /// # Returns
    /// How many values were written, zero once the generator is exhausted.
    fn fill(&mut self, dst: &mut [f32]) -> usize;

    /// The amount of values the generator can still produce.
    fn remaining(&self) -> usize;
}
