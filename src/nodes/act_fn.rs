/// Element-wise nonlinearities of the affine and recurrent nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActFn {
    Identity,
    Tanh,
    Sigmoid,
}

use ActFn::*;

impl ActFn {
    pub fn f(&self, z: f32) -> f32 {
        match self {
            Identity => z,
            Tanh => z.tanh(),
            Sigmoid => sigmoid(z),
        }
    }

    /// The derivative, evaluated at the pre-activation `z`.
    pub fn df(&self, z: f32) -> f32 {
        match self {
            Identity => 1.,
            Tanh => {
                let a = z.tanh();
                1. - a * a
            }
            Sigmoid => {
                let a = sigmoid(z);
                a * (1. - a)
            }
        }
    }
}

fn sigmoid(z: f32) -> f32 {
    1. / (1. + (-z).exp())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derivatives_match_finite_differences() {
        const EPS: f32 = 1e-3;

        for act_fn in [Identity, Tanh, Sigmoid] {
            for z in [-2., -0.3, 0., 0.7, 1.5] {
                let numeric = (act_fn.f(z + EPS) - act_fn.f(z - EPS)) / (2. * EPS);
                assert!((numeric - act_fn.df(z)).abs() < 1e-3, "{act_fn:?} at {z}");
            }
        }
    }

    #[test]
    fn sigmoid_is_a_gate() {
        assert_eq!(Sigmoid.f(0.), 0.5);
        assert!(Sigmoid.f(-50.) >= 0. && Sigmoid.f(50.) <= 1.);
    }
}
