mod act_fn;
mod affine;
mod concat;
mod dropout;
mod loss;
mod lookup;
mod pooling;
mod recurrent;
mod window;

pub use act_fn::ActFn;
pub use affine::{AffineLayer, AffineNode};
pub use concat::ConcatNode;
pub use dropout::Dropout;
pub use loss::SoftmaxLoss;
pub use lookup::{LookupLayer, LookupNode};
pub use pooling::{PoolKind, PoolingNode};
pub use recurrent::{Cell, Direction, RecurrentBuilder};
pub use window::WindowBuilder;

use ndarray::{ArrayView1, ArrayViewMut2, Axis, linalg};

/// Accumulates the outer product `d x^T` into `dw`.
fn outer_add(mut dw: ArrayViewMut2<'_, f32>, d: ArrayView1<'_, f32>, x: ArrayView1<'_, f32>) {
    linalg::general_mat_mul(
        1.,
        &d.insert_axis(Axis(1)),
        &x.insert_axis(Axis(0)),
        1.,
        &mut dw,
    );
}
