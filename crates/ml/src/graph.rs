use std::sync::Arc;

use crate::nonlinearity::Nonlinearity;
use crate::recorder::Recorder;

/// Operation vocabulary understood by the tape.
#[derive(Clone, Debug)]
pub enum EOp {
    Add,
    Sub,
    Mul,
    /// `b` holds a single scalar.
    MulScalar,
    /// `b` holds a single exponent.
    Pow,
    /// `W[out,in]` times `X[batch,in]` (or `X[in]`), i.e. `X Wᵀ`.
    MatMul,
    AddBroadcast,
    MulBroadcast,
    Act(Nonlinearity),
    ActGrad(Nonlinearity),
    ReduceSum,
    ReduceMean,
    /// `out[i] = a[index[i]]`, zero where the index is `None`.
    Gather(Arc<[Option<usize>]>),
    Concat,
    /// Concatenation of the listed tensor ids, in order.
    ConcatAll(Arc<[usize]>),
    /// `[cos a, sin a]`.
    AngleEmbed,
    /// `out = a⁻¹ b` for a square `a`.
    Solve,
}

#[derive(Clone, Debug)]
pub struct Node {
    pub op: EOp,
    pub a: usize,
    pub b: usize,
    pub out: usize,
}

/// Recorder for forward-only evaluation: nothing is kept.
#[derive(Default)]
pub struct NoGrad;

impl Recorder for NoGrad {
    fn record(&mut self, _node: Node) {}

    fn is_recording(&self) -> bool {
        false
    }
}

impl NoGrad {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}
