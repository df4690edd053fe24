//! Dense `f32` tensors and their differentiable operations.
//!
//! Every op computes its result eagerly on the CPU. When the supplied
//! [`Recorder`] is recording, the op also stores its output (and any inputs the
//! store has not seen yet, such as parameters and constants) in the
//! [`TensorStore`] and records a [`Node`], so a [`Tape`](crate::tape::Tape) can
//! later run the backward pass.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::graph::{EOp, Node};
use crate::nonlinearity::Nonlinearity;
use crate::recorder::Recorder;

/// Values of every tensor touched by a recorded computation, keyed by id.
pub type TensorStore = HashMap<usize, Tensor>;

static NEXT_ID: AtomicUsize = AtomicUsize::new(0);

fn next_id() -> usize {
    NEXT_ID.fetch_add(1, Ordering::Relaxed)
}

#[derive(Clone, Debug)]
pub struct Tensor {
    pub id: usize,
    pub data: Vec<f32>,
    pub shape: Vec<usize>,
    pub requires_grad: bool,
    pub grad: Option<Vec<f32>>,
}

impl Tensor {
    pub fn from_vec(shape: Vec<usize>, data: Vec<f32>) -> Self {
        assert_eq!(shape.iter().product::<usize>(), data.len());
        Self { id: next_id(), data, shape, requires_grad: false, grad: None }
    }

    #[must_use]
    pub fn scalar(value: f32) -> Self {
        Self::from_vec(vec![1], vec![value])
    }

    #[must_use]
    pub fn zeros(shape: Vec<usize>) -> Self {
        let len = shape.iter().product();
        Self::from_vec(shape, vec![0.0; len])
    }

    /// `n × n` identity.
    #[must_use]
    pub fn eye(n: usize) -> Self {
        let mut data = vec![0.0; n * n];
        for i in 0..n {
            data[i * n + i] = 1.0;
        }
        Self::from_vec(vec![n, n], data)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[must_use]
    pub fn with_grad(mut self) -> Self {
        self.requires_grad = true;
        self
    }

    pub fn set_requires_grad(&mut self) {
        self.requires_grad = true;
    }

    fn emit(
        &self,
        other: Option<&Tensor>,
        op: EOp,
        out: Tensor,
        recorder: &mut impl Recorder,
        tensors: &mut TensorStore,
    ) -> Tensor {
        if recorder.is_recording() {
            tensors.entry(self.id).or_insert_with(|| self.clone());
            if let Some(other) = other {
                tensors.entry(other.id).or_insert_with(|| other.clone());
            }
            tensors.insert(out.id, out.clone());
            recorder.record(Node {
                op,
                a: self.id,
                b: other.map_or(self.id, |o| o.id),
                out: out.id,
            });
        }
        out
    }

    fn zip_map(&self, other: &Tensor, f: impl Fn(f32, f32) -> f32) -> Tensor {
        assert_eq!(self.shape, other.shape, "elementwise op on mismatched shapes");
        let data = self.data.iter().zip(&other.data).map(|(&a, &b)| f(a, b)).collect();
        Tensor::from_vec(self.shape.clone(), data)
    }

    pub fn add(
        &self,
        other: &Tensor,
        recorder: &mut impl Recorder,
        tensors: &mut TensorStore,
    ) -> Tensor {
        let out = self.zip_map(other, |a, b| a + b);
        self.emit(Some(other), EOp::Add, out, recorder, tensors)
    }

    pub fn sub(
        &self,
        other: &Tensor,
        recorder: &mut impl Recorder,
        tensors: &mut TensorStore,
    ) -> Tensor {
        let out = self.zip_map(other, |a, b| a - b);
        self.emit(Some(other), EOp::Sub, out, recorder, tensors)
    }

    pub fn mul(
        &self,
        other: &Tensor,
        recorder: &mut impl Recorder,
        tensors: &mut TensorStore,
    ) -> Tensor {
        let out = self.zip_map(other, |a, b| a * b);
        self.emit(Some(other), EOp::Mul, out, recorder, tensors)
    }

    pub fn mul_scalar(
        &self,
        scalar: f32,
        recorder: &mut impl Recorder,
        tensors: &mut TensorStore,
    ) -> Tensor {
        let s = Tensor::scalar(scalar);
        let data = self.data.iter().map(|&v| v * scalar).collect();
        let out = Tensor::from_vec(self.shape.clone(), data);
        self.emit(Some(&s), EOp::MulScalar, out, recorder, tensors)
    }

    pub fn pow(
        &self,
        exponent: f32,
        recorder: &mut impl Recorder,
        tensors: &mut TensorStore,
    ) -> Tensor {
        let e = Tensor::scalar(exponent);
        let data = self.data.iter().map(|&v| v.powf(exponent)).collect();
        let out = Tensor::from_vec(self.shape.clone(), data);
        self.emit(Some(&e), EOp::Pow, out, recorder, tensors)
    }

    /// `self` is a weight matrix `[out, in]`; `x` is `[in]` or `[batch, in]`.
    pub fn matmul(
        &self,
        x: &Tensor,
        recorder: &mut impl Recorder,
        tensors: &mut TensorStore,
    ) -> Tensor {
        assert_eq!(self.shape.len(), 2, "matmul weight must be 2-D");
        let out_dim = self.shape[0];
        let in_dim = self.shape[1];
        assert_eq!(x.len() % in_dim, 0, "matmul input does not match weight columns");
        let batch = x.len() / in_dim;
        let mut y = vec![0f32; batch * out_dim];
        for k in 0..batch {
            let row = &x.data[k * in_dim..(k + 1) * in_dim];
            for o in 0..out_dim {
                let w = &self.data[o * in_dim..(o + 1) * in_dim];
                y[k * out_dim + o] = w.iter().zip(row).map(|(a, b)| a * b).sum();
            }
        }
        let shape = if x.shape.len() == 1 { vec![out_dim] } else { vec![batch, out_dim] };
        let out = Tensor::from_vec(shape, y);
        self.emit(Some(x), EOp::MatMul, out, recorder, tensors)
    }

    /// Adds `b[dim]` to every row of `self[batch, dim]`.
    pub fn add_broadcast(
        &self,
        b: &Tensor,
        recorder: &mut impl Recorder,
        tensors: &mut TensorStore,
    ) -> Tensor {
        assert_eq!(self.len() % b.len(), 0, "broadcast operand does not divide tensor");
        let dim = b.len();
        let data = self.data.iter().enumerate().map(|(i, &v)| v + b.data[i % dim]).collect();
        let out = Tensor::from_vec(self.shape.clone(), data);
        self.emit(Some(b), EOp::AddBroadcast, out, recorder, tensors)
    }

    /// Multiplies every row of `self[batch, dim]` elementwise by `b[dim]`.
    pub fn mul_broadcast(
        &self,
        b: &Tensor,
        recorder: &mut impl Recorder,
        tensors: &mut TensorStore,
    ) -> Tensor {
        assert_eq!(self.len() % b.len(), 0, "broadcast operand does not divide tensor");
        let dim = b.len();
        let data = self.data.iter().enumerate().map(|(i, &v)| v * b.data[i % dim]).collect();
        let out = Tensor::from_vec(self.shape.clone(), data);
        self.emit(Some(b), EOp::MulBroadcast, out, recorder, tensors)
    }

    pub fn activate(
        &self,
        nl: Nonlinearity,
        recorder: &mut impl Recorder,
        tensors: &mut TensorStore,
    ) -> Tensor {
        let data = self.data.iter().map(|&v| nl.apply(v)).collect();
        let out = Tensor::from_vec(self.shape.clone(), data);
        self.emit(None, EOp::Act(nl), out, recorder, tensors)
    }

    /// Elementwise σ'(x).
    pub fn activate_grad(
        &self,
        nl: Nonlinearity,
        recorder: &mut impl Recorder,
        tensors: &mut TensorStore,
    ) -> Tensor {
        let data = self.data.iter().map(|&v| nl.derivative(v)).collect();
        let out = Tensor::from_vec(self.shape.clone(), data);
        self.emit(None, EOp::ActGrad(nl), out, recorder, tensors)
    }

    pub fn reduce_sum(&self, recorder: &mut impl Recorder, tensors: &mut TensorStore) -> Tensor {
        let out = Tensor::scalar(self.data.iter().sum());
        self.emit(None, EOp::ReduceSum, out, recorder, tensors)
    }

    pub fn reduce_mean(&self, recorder: &mut impl Recorder, tensors: &mut TensorStore) -> Tensor {
        let n = self.len() as f32;
        let out = Tensor::scalar(self.data.iter().sum::<f32>() / n);
        self.emit(None, EOp::ReduceMean, out, recorder, tensors)
    }

    pub fn gather(
        &self,
        index: Arc<[Option<usize>]>,
        shape: Vec<usize>,
        recorder: &mut impl Recorder,
        tensors: &mut TensorStore,
    ) -> Tensor {
        let data = index.iter().map(|i| i.map_or(0.0, |j| self.data[j])).collect();
        let out = Tensor::from_vec(shape, data);
        self.emit(None, EOp::Gather(index), out, recorder, tensors)
    }

    /// Contiguous 1-D slice `[start, start + len)`.
    pub fn slice(
        &self,
        start: usize,
        len: usize,
        recorder: &mut impl Recorder,
        tensors: &mut TensorStore,
    ) -> Tensor {
        assert!(start + len <= self.len(), "slice out of bounds");
        let index: Arc<[Option<usize>]> = (start..start + len).map(Some).collect();
        self.gather(index, vec![len], recorder, tensors)
    }

    /// Same data under a new shape.
    pub fn reshape(
        &self,
        shape: Vec<usize>,
        recorder: &mut impl Recorder,
        tensors: &mut TensorStore,
    ) -> Tensor {
        let index: Arc<[Option<usize>]> = (0..self.len()).map(Some).collect();
        self.gather(index, shape, recorder, tensors)
    }

    /// 1-D concatenation of the flattened operands.
    pub fn concat(
        &self,
        other: &Tensor,
        recorder: &mut impl Recorder,
        tensors: &mut TensorStore,
    ) -> Tensor {
        let mut data = self.data.clone();
        data.extend_from_slice(&other.data);
        let out = Tensor::from_vec(vec![data.len()], data);
        self.emit(Some(other), EOp::Concat, out, recorder, tensors)
    }

    /// Concatenates `parts` in order; a single part is returned unchanged.
    ///
    /// # Panics
    ///
    /// Panics if `parts` is empty.
    pub fn concat_all(
        parts: &[Tensor],
        recorder: &mut impl Recorder,
        tensors: &mut TensorStore,
    ) -> Tensor {
        assert!(!parts.is_empty(), "concat_all needs at least one tensor");
        if parts.len() == 1 {
            return parts[0].clone();
        }
        let data: Vec<f32> = parts.iter().flat_map(|p| p.data.iter().copied()).collect();
        let out = Tensor::from_vec(vec![data.len()], data);
        if recorder.is_recording() {
            for part in parts {
                tensors.entry(part.id).or_insert_with(|| part.clone());
            }
            tensors.insert(out.id, out.clone());
            recorder.record(Node {
                op: EOp::ConcatAll(parts.iter().map(|p| p.id).collect()),
                a: parts[0].id,
                b: parts[0].id,
                out: out.id,
            });
        }
        out
    }

    /// `[cos x, sin x]` of the flattened tensor.
    pub fn angle_embed(&self, recorder: &mut impl Recorder, tensors: &mut TensorStore) -> Tensor {
        let mut data: Vec<f32> = self.data.iter().map(|v| v.cos()).collect();
        data.extend(self.data.iter().map(|v| v.sin()));
        let out = Tensor::from_vec(vec![data.len()], data);
        self.emit(None, EOp::AngleEmbed, out, recorder, tensors)
    }

    /// Solves `self · x = b` for a square `self`.
    ///
    /// A singular matrix is not guarded against; the result then contains
    /// non-finite values.
    pub fn solve(
        &self,
        b: &Tensor,
        recorder: &mut impl Recorder,
        tensors: &mut TensorStore,
    ) -> Tensor {
        let n = b.len();
        assert_eq!(self.shape, vec![n, n], "solve needs a square matrix matching the rhs");
        let out = Tensor::from_vec(vec![n], solve_dense(&self.data, n, &b.data, false));
        self.emit(Some(b), EOp::Solve, out, recorder, tensors)
    }
}

/// Gaussian elimination with partial pivoting, accumulated in `f64`.
///
/// With `transpose` the system `aᵀ x = b` is solved instead.
#[must_use]
pub fn solve_dense(a: &[f32], n: usize, b: &[f32], transpose: bool) -> Vec<f32> {
    let mut m: Vec<f64> = (0..n * n)
        .map(|idx| {
            let (r, c) = (idx / n, idx % n);
            f64::from(if transpose { a[c * n + r] } else { a[r * n + c] })
        })
        .collect();
    let mut x: Vec<f64> = b.iter().map(|&v| f64::from(v)).collect();

    for col in 0..n {
        let pivot = (col..n)
            .max_by(|&i, &j| m[i * n + col].abs().total_cmp(&m[j * n + col].abs()))
            .unwrap_or(col);
        if pivot != col {
            for c in 0..n {
                m.swap(col * n + c, pivot * n + c);
            }
            x.swap(col, pivot);
        }
        let diag = m[col * n + col];
        for r in col + 1..n {
            let factor = m[r * n + col] / diag;
            if factor == 0.0 {
                continue;
            }
            for c in col..n {
                m[r * n + c] -= factor * m[col * n + c];
            }
            x[r] -= factor * x[col];
        }
    }
    for col in (0..n).rev() {
        let tail: f64 = (col + 1..n).map(|c| m[col * n + c] * x[c]).sum();
        x[col] = (x[col] - tail) / m[col * n + col];
    }
    #[allow(clippy::cast_possible_truncation)]
    x.into_iter().map(|v| v as f32).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::NoGrad;

    #[test]
    fn ids_are_unique() {
        let a = Tensor::scalar(1.0);
        let b = Tensor::scalar(1.0);
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn solve_recovers_known_solution() {
        // pivoting needed: zero in the top-left corner
        let a = [0.0, 2.0, 1.0, 1.0, 1.0, 0.0, 2.0, 0.0, 3.0];
        let x = [1.0f32, -2.0, 0.5];
        let b: Vec<f32> = (0..3).map(|r| (0..3).map(|c| a[r * 3 + c] * x[c]).sum()).collect();
        let got = solve_dense(&a, 3, &b, false);
        for (g, e) in got.iter().zip(&x) {
            assert!((g - e).abs() < 1e-5, "{got:?}");
        }
    }

    #[test]
    fn transposed_solve() {
        let a = [2.0, 1.0, 0.0, 3.0];
        // aᵀ = [[2,0],[1,3]]; aᵀ [1, 1] = [2, 4]
        let got = solve_dense(&a, 2, &[2.0, 4.0], true);
        assert!((got[0] - 1.0).abs() < 1e-6 && (got[1] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn no_grad_stores_nothing() {
        let mut tensors = TensorStore::new();
        let a = Tensor::from_vec(vec![2], vec![1.0, 2.0]);
        let b = a.add(&a, &mut NoGrad::new(), &mut tensors);
        assert_eq!(b.data, vec![2.0, 4.0]);
        assert!(tensors.is_empty());
    }

    #[test]
    fn concat_all_stores_only_parts_and_result() {
        let mut tensors = TensorStore::new();
        let mut tape = crate::tape::Tape::new();
        let parts: Vec<Tensor> =
            (0..50).map(|i| Tensor::from_vec(vec![4], vec![i as f32; 4])).collect();
        let out = Tensor::concat_all(&parts, &mut tape, &mut tensors);
        assert_eq!(out.len(), 200);
        assert_eq!(&out.data[196..], &[49.0; 4]);
        let stored: usize = tensors.values().map(Tensor::len).sum();
        assert_eq!(stored, 2 * 200);
    }

    #[test]
    fn gather_fills_missing_with_zero() {
        let mut tensors = TensorStore::new();
        let a = Tensor::from_vec(vec![3], vec![1.0, 2.0, 3.0]);
        let idx: Arc<[Option<usize>]> = vec![Some(2), None, Some(0), Some(0)].into();
        let g = a.gather(idx, vec![2, 2], &mut NoGrad::new(), &mut tensors);
        assert_eq!(g.data, vec![3.0, 0.0, 1.0, 1.0]);
        assert_eq!(g.shape, vec![2, 2]);
    }
}
