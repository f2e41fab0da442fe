use std::{cell::RefCell, rc::Rc};

use rand::Rng;

use super::{ParameterLayout, ParameterStore, TensorRef};
use crate::{
    Result,
    initialization::{Constant, Sampled},
};

/// An embedding table, one row per vocabulary entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LookupTable {
    pub table: TensorRef,
    pub vocab: usize,
    pub dim: usize,
}

impl LookupTable {
    pub(crate) fn register(
        layout: &mut ParameterLayout,
        name: &str,
        vocab: usize,
        dim: usize,
    ) -> Self {
        Self {
            table: layout.push_matrix(format!("{name}.E"), vocab, dim),
            vocab,
            dim,
        }
    }

    /// Samples every row uniformly in `[-sqrt(3 / dim), sqrt(3 / dim))`.
    pub(crate) fn initialize<R: Rng>(
        &self,
        store: &mut ParameterStore,
        rng: &Rc<RefCell<R>>,
    ) -> Result<()> {
        store.fill(self.table, &mut Sampled::embedding(rng.clone(), self.vocab, self.dim)?)
    }
}

/// An affine unit `W x + b`, the bias is optional.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UniParams {
    pub w: TensorRef,
    pub b: Option<TensorRef>,
    pub input: usize,
    pub output: usize,
}

impl UniParams {
    pub(crate) fn register(
        layout: &mut ParameterLayout,
        name: &str,
        input: usize,
        output: usize,
        bias: bool,
    ) -> Self {
        Self {
            w: layout.push_matrix(format!("{name}.W"), output, input),
            b: bias.then(|| layout.push_vector(format!("{name}.b"), output)),
            input,
            output,
        }
    }

    pub(crate) fn initialize<R: Rng>(
        &self,
        store: &mut ParameterStore,
        rng: &Rc<RefCell<R>>,
    ) -> Result<()> {
        init_matrix(store, rng, self.w, self.input, self.output)?;
        if let Some(b) = self.b {
            store.fill(b, &mut Constant::zeros(self.output))?;
        }
        Ok(())
    }
}

/// The tensors of one recurrent gate, `Wx x + Wh h + b`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GateParams {
    pub wx: TensorRef,
    pub wh: TensorRef,
    pub b: TensorRef,
}

impl GateParams {
    fn register(layout: &mut ParameterLayout, name: &str, input: usize, hidden: usize) -> Self {
        Self {
            wx: layout.push_matrix(format!("{name}.Wx"), hidden, input),
            wh: layout.push_matrix(format!("{name}.Wh"), hidden, hidden),
            b: layout.push_vector(format!("{name}.b"), hidden),
        }
    }

    fn initialize<R: Rng>(
        &self,
        store: &mut ParameterStore,
        rng: &Rc<RefCell<R>>,
        input: usize,
        hidden: usize,
    ) -> Result<()> {
        init_matrix(store, rng, self.wx, input, hidden)?;
        init_matrix(store, rng, self.wh, hidden, hidden)?;
        store.fill(self.b, &mut Constant::zeros(hidden))
    }

    fn tensors(&self) -> [TensorRef; 3] {
        [self.wx, self.wh, self.b]
    }
}

/// A plain recurrent unit, `h = tanh(Wx x + Wh h_prev + b)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RnnParams {
    pub cell: GateParams,
    pub input: usize,
    pub hidden: usize,
}

impl RnnParams {
    pub(crate) fn register(
        layout: &mut ParameterLayout,
        name: &str,
        input: usize,
        hidden: usize,
    ) -> Self {
        Self {
            cell: GateParams::register(layout, name, input, hidden),
            input,
            hidden,
        }
    }

    pub(crate) fn initialize<R: Rng>(
        &self,
        store: &mut ParameterStore,
        rng: &Rc<RefCell<R>>,
    ) -> Result<()> {
        self.cell.initialize(store, rng, self.input, self.hidden)
    }
}

/// A gated recurrent unit with update and reset gates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GrnnParams {
    pub update: GateParams,
    pub reset: GateParams,
    pub candidate: GateParams,
    pub input: usize,
    pub hidden: usize,
}

impl GrnnParams {
    pub(crate) fn register(
        layout: &mut ParameterLayout,
        name: &str,
        input: usize,
        hidden: usize,
    ) -> Self {
        Self {
            update: GateParams::register(layout, &format!("{name}.update"), input, hidden),
            reset: GateParams::register(layout, &format!("{name}.reset"), input, hidden),
            candidate: GateParams::register(layout, &format!("{name}.candidate"), input, hidden),
            input,
            hidden,
        }
    }

    pub(crate) fn initialize<R: Rng>(
        &self,
        store: &mut ParameterStore,
        rng: &Rc<RefCell<R>>,
    ) -> Result<()> {
        for gate in [self.update, self.reset, self.candidate] {
            gate.initialize(store, rng, self.input, self.hidden)?;
        }
        Ok(())
    }
}

/// Any parameter unit of a model, as enumerated for an optimizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamUnit {
    Lookup(LookupTable),
    Uni(UniParams),
    Rnn(RnnParams),
    Grnn(GrnnParams),
}

impl ParamUnit {
    /// Every tensor owned by the unit, in layout order.
    pub fn tensors(&self) -> Vec<TensorRef> {
        match self {
            ParamUnit::Lookup(lookup) => vec![lookup.table],
            ParamUnit::Uni(uni) => [Some(uni.w), uni.b].into_iter().flatten().collect(),
            ParamUnit::Rnn(rnn) => rnn.cell.tensors().to_vec(),
            ParamUnit::Grnn(grnn) => [grnn.update, grnn.reset, grnn.candidate]
                .iter()
                .flat_map(GateParams::tensors)
                .collect(),
        }
    }

    /// Width of the input the unit consumes, the embedding width for lookups.
    pub fn input_width(&self) -> usize {
        match self {
            ParamUnit::Lookup(lookup) => lookup.dim,
            ParamUnit::Uni(uni) => uni.input,
            ParamUnit::Rnn(rnn) => rnn.input,
            ParamUnit::Grnn(grnn) => grnn.input,
        }
    }

    pub fn output_width(&self) -> usize {
        match self {
            ParamUnit::Lookup(lookup) => lookup.dim,
            ParamUnit::Uni(uni) => uni.output,
            ParamUnit::Rnn(rnn) => rnn.hidden,
            ParamUnit::Grnn(grnn) => grnn.hidden,
        }
    }
}

fn init_matrix<R: Rng>(
    store: &mut ParameterStore,
    rng: &Rc<RefCell<R>>,
    tensor: TensorRef,
    fan_in: usize,
    fan_out: usize,
) -> Result<()> {
    store.fill(tensor, &mut Sampled::xavier(rng.clone(), fan_in, fan_out)?)
}
