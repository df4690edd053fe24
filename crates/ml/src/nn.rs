use std::sync::Arc;

use crate::nonlinearity::Nonlinearity;
use crate::recorder::Recorder;
use crate::tensor::{Tensor, TensorStore};

/// Anything that owns trainable tensors.
pub trait Module {
    fn params(&self) -> Vec<&Tensor>;
    fn params_mut(&mut self) -> Vec<&mut Tensor>;

    fn num_params(&self) -> usize {
        self.params().iter().map(|p| p.len()).sum()
    }
}

/// A fully connected neural network layer.
#[derive(Clone)]
pub struct Dense {
    /// The weight matrix for the layer.
    pub w: Tensor,
    /// The bias vector for the layer.
    pub b: Tensor,
    /// The number of input dimensions.
    pub in_dim: usize,
    /// The number of output dimensions.
    pub out_dim: usize,
}

impl Dense {
    /// Creates a new `Dense` layer with the given weights and biases.
    pub fn new(weights: Vec<f32>, bias: Vec<f32>, in_d: usize, out_d: usize) -> Self {
        assert_eq!(weights.len(), in_d * out_d);
        assert_eq!(bias.len(), out_d);
        Self {
            w: Tensor::from_vec(vec![out_d, in_d], weights).with_grad(),
            b: Tensor::from_vec(vec![out_d], bias).with_grad(),
            in_dim: in_d,
            out_dim: out_d,
        }
    }

    /// Glorot-uniform weights, zero bias.
    pub fn random(in_d: usize, out_d: usize, rng: &mut fastrand::Rng) -> Self {
        let limit = (6.0 / (in_d + out_d) as f32).sqrt();
        let weights = (0..in_d * out_d)
            .map(|_| rng.f32() * 2.0 * limit - limit)
            .collect();
        let bias = vec![0.0; out_d];
        Self::new(weights, bias, in_d, out_d)
    }

    /// Performs the forward pass through the layer.
    pub fn forward(
        &self,
        x: &Tensor,
        recorder: &mut impl Recorder,
        tensors: &mut TensorStore,
    ) -> Tensor {
        let wx = self.w.matmul(x, recorder, tensors);
        wx.add_broadcast(&self.b, recorder, tensors)
    }
}

impl Module for Dense {
    fn params(&self) -> Vec<&Tensor> {
        vec![&self.w, &self.b]
    }

    fn params_mut(&mut self) -> Vec<&mut Tensor> {
        vec![&mut self.w, &mut self.b]
    }
}

/// Feed-forward network: dense layers with a nonlinearity between them and a
/// linear output layer.
#[derive(Clone)]
pub struct Mlp {
    pub layers: Vec<Dense>,
    pub nonlinearity: Nonlinearity,
}

impl Mlp {
    /// `input → hidden → hidden → output`.
    pub fn new(
        input_dim: usize,
        hidden_dim: usize,
        output_dim: usize,
        nonlinearity: Nonlinearity,
        rng: &mut fastrand::Rng,
    ) -> Self {
        Self::with_depth(input_dim, hidden_dim, output_dim, 2, nonlinearity, rng)
    }

    /// `hidden_layers` hidden layers of width `hidden_dim`.
    pub fn with_depth(
        input_dim: usize,
        hidden_dim: usize,
        output_dim: usize,
        hidden_layers: usize,
        nonlinearity: Nonlinearity,
        rng: &mut fastrand::Rng,
    ) -> Self {
        assert!(hidden_layers >= 1);
        let mut layers = vec![Dense::random(input_dim, hidden_dim, rng)];
        for _ in 1..hidden_layers {
            layers.push(Dense::random(hidden_dim, hidden_dim, rng));
        }
        layers.push(Dense::random(hidden_dim, output_dim, rng));
        Self { layers, nonlinearity }
    }

    #[must_use]
    pub fn input_dim(&self) -> usize {
        self.layers[0].in_dim
    }

    #[must_use]
    pub fn output_dim(&self) -> usize {
        self.layers[self.layers.len() - 1].out_dim
    }

    pub fn forward(
        &self,
        x: &Tensor,
        recorder: &mut impl Recorder,
        tensors: &mut TensorStore,
    ) -> Tensor {
        let last = self.layers.len() - 1;
        let mut h = x.clone();
        for (i, layer) in self.layers.iter().enumerate() {
            h = layer.forward(&h, recorder, tensors);
            if i < last {
                h = h.activate(self.nonlinearity, recorder, tensors);
            }
        }
        h
    }

    /// Forward pass that also pushes `directions[k, in]` through the network.
    ///
    /// Returns `(y, j)` where row `k` of `j[k, out]` is the derivative of `y`
    /// along direction `k`; with `directions = I` it is the transposed
    /// Jacobian. Both outputs are ordinary tape tensors, so parameter gradients
    /// of anything built from `j` come out of a single backward pass.
    pub fn forward_with_jacobian(
        &self,
        x: &Tensor,
        directions: &Tensor,
        recorder: &mut impl Recorder,
        tensors: &mut TensorStore,
    ) -> (Tensor, Tensor) {
        let last = self.layers.len() - 1;
        let mut h = x.clone();
        let mut dh = directions.clone();
        for (i, layer) in self.layers.iter().enumerate() {
            let z = layer.forward(&h, recorder, tensors);
            let dz = layer.w.matmul(&dh, recorder, tensors);
            if i < last {
                let slope = z.activate_grad(self.nonlinearity, recorder, tensors);
                dh = dz.mul_broadcast(&slope, recorder, tensors);
                h = z.activate(self.nonlinearity, recorder, tensors);
            } else {
                h = z;
                dh = dz;
            }
        }
        (h, dh)
    }
}

impl Module for Mlp {
    fn params(&self) -> Vec<&Tensor> {
        self.layers.iter().flat_map(Module::params).collect()
    }

    fn params_mut(&mut self) -> Vec<&mut Tensor> {
        self.layers.iter_mut().flat_map(Module::params_mut).collect()
    }
}

/// Symmetric positive-definite matrix field `M(q) = L(q) L(q)ᵀ + ε I`.
///
/// The network emits the `n` diagonal entries of `L` followed by its
/// `n(n-1)/2` strictly-lower entries in row-major order.
#[derive(Clone)]
pub struct Psd {
    pub net: Mlp,
    pub dim: usize,
    pub eps: f32,
    factor_index: Arc<[Option<usize>]>,
}

pub const PSD_EPS: f32 = 0.01;

impl Psd {
    pub fn new(input_dim: usize, hidden_dim: usize, dim: usize, rng: &mut fastrand::Rng) -> Self {
        let outputs = dim * (dim + 1) / 2;
        let net = Mlp::with_depth(input_dim, hidden_dim, outputs, 3, Nonlinearity::Tanh, rng);
        Self { net, dim, eps: PSD_EPS, factor_index: tril_index(dim) }
    }

    fn offset_index(&self, offset: usize) -> Arc<[Option<usize>]> {
        self.factor_index.iter().map(|i| i.map(|j| j + offset)).collect()
    }

    fn assemble(
        &self,
        l: &Tensor,
        recorder: &mut impl Recorder,
        tensors: &mut TensorStore,
    ) -> Tensor {
        let n = self.dim;
        let llt = l.matmul(l, recorder, tensors);
        let mut ridge = Tensor::eye(n);
        for v in &mut ridge.data {
            *v *= self.eps;
        }
        llt.add(&ridge, recorder, tensors)
    }

    /// `M(q)` as an `[n, n]` tensor.
    pub fn forward(
        &self,
        q: &Tensor,
        recorder: &mut impl Recorder,
        tensors: &mut TensorStore,
    ) -> Tensor {
        let y = self.net.forward(q, recorder, tensors);
        let l = y.gather(self.factor_index.clone(), vec![self.dim, self.dim], recorder, tensors);
        self.assemble(&l, recorder, tensors)
    }

    /// `M(q)` together with `∂M/∂q_k` for every input coordinate `k`.
    pub fn forward_with_derivative(
        &self,
        q: &Tensor,
        recorder: &mut impl Recorder,
        tensors: &mut TensorStore,
    ) -> (Tensor, Vec<Tensor>) {
        let eye = Tensor::eye(self.net.input_dim());
        self.forward_along(q, &eye, recorder, tensors)
    }

    /// `M(x)` together with its derivative along each row of
    /// `directions[k, in]`.
    pub fn forward_along(
        &self,
        x: &Tensor,
        directions: &Tensor,
        recorder: &mut impl Recorder,
        tensors: &mut TensorStore,
    ) -> (Tensor, Vec<Tensor>) {
        let n = self.dim;
        let outputs = self.net.output_dim();
        let count = directions.len() / self.net.input_dim();
        let (y, jac) = self.net.forward_with_jacobian(x, directions, recorder, tensors);
        let l = y.gather(self.factor_index.clone(), vec![n, n], recorder, tensors);
        let m = self.assemble(&l, recorder, tensors);
        let dm = (0..count)
            .map(|k| {
                let dl = jac.gather(self.offset_index(k * outputs), vec![n, n], recorder, tensors);
                // ∂(L Lᵀ) = ∂L Lᵀ + L ∂Lᵀ
                let left = l.matmul(&dl, recorder, tensors);
                let right = dl.matmul(&l, recorder, tensors);
                left.add(&right, recorder, tensors)
            })
            .collect();
        (m, dm)
    }
}

impl Module for Psd {
    fn params(&self) -> Vec<&Tensor> {
        self.net.params()
    }

    fn params_mut(&mut self) -> Vec<&mut Tensor> {
        self.net.params_mut()
    }
}

fn tril_index(n: usize) -> Arc<[Option<usize>]> {
    let mut index = vec![None; n * n];
    let mut next = n;
    for r in 0..n {
        index[r * n + r] = Some(r);
        for c in 0..r {
            index[r * n + c] = Some(next);
            next += 1;
        }
    }
    index.into()
}

/// Replaces the leading `num_angle` entries of a 1-D `x` by their
/// `[cos, sin]` embedding, keeping the remaining entries as they are.
pub fn angle_embedding(
    x: &Tensor,
    num_angle: usize,
    recorder: &mut impl Recorder,
    tensors: &mut TensorStore,
) -> Tensor {
    let q = x.slice(0, num_angle, recorder, tensors);
    let trig = q.angle_embed(recorder, tensors);
    if x.len() == num_angle {
        return trig;
    }
    let rest = x.slice(num_angle, x.len() - num_angle, recorder, tensors);
    trig.concat(&rest, recorder, tensors)
}

/// Derivatives of an [`angle_embedding`] with respect to each entry of the
/// original input, as directions `[len(x), len(embedding)]` for
/// [`Mlp::forward_with_jacobian`].
///
/// Row `k < N` is `-sin q_k` at column `k` and `cos q_k` at column `N + k`;
/// the remaining rows are unit vectors on the pass-through columns.
pub fn angle_tangents(
    embedding: &Tensor,
    num_angle: usize,
    recorder: &mut impl Recorder,
    tensors: &mut TensorStore,
) -> Tensor {
    let n = num_angle;
    let width = embedding.len();
    let rows = width - n;
    let mut index = vec![None; rows * width];
    let mut sign = vec![0.0; rows * width];
    let mut unit = vec![0.0; rows * width];
    for k in 0..n {
        index[k * width + k] = Some(n + k);
        sign[k * width + k] = -1.0;
        index[k * width + n + k] = Some(k);
        sign[k * width + n + k] = 1.0;
    }
    for j in 0..rows - n {
        unit[(n + j) * width + 2 * n + j] = 1.0;
    }
    let picked = embedding.gather(index.into(), vec![rows, width], recorder, tensors);
    let signed = picked.mul(&Tensor::from_vec(vec![rows, width], sign), recorder, tensors);
    signed.add(&Tensor::from_vec(vec![rows, width], unit), recorder, tensors)
}

/// Collects parameter gradients from one or more tape stores.
///
/// Parameters are matched by tensor id, so the accumulator stays valid while
/// the parameter values change between tapes.
pub struct GradAccumulator {
    ids: Vec<usize>,
    grads: Vec<Option<Vec<f32>>>,
}

impl GradAccumulator {
    #[must_use]
    pub fn new(params: &[&Tensor]) -> Self {
        Self { ids: params.iter().map(|p| p.id).collect(), grads: vec![None; params.len()] }
    }

    /// Adds the gradients found in `tensors` after a backward pass.
    pub fn absorb(&mut self, tensors: &TensorStore) {
        for (id, acc) in self.ids.iter().zip(&mut self.grads) {
            let Some(grad) = tensors.get(id).and_then(|t| t.grad.as_ref()) else {
                continue;
            };
            match acc {
                Some(sum) => {
                    for (s, g) in sum.iter_mut().zip(grad) {
                        *s += g;
                    }
                }
                None => *acc = Some(grad.clone()),
            }
        }
    }

    /// Installs the accumulated gradients; parameters that received none get `None`.
    pub fn apply(self, params: &mut [&mut Tensor]) {
        for (p, grad) in params.iter_mut().zip(self.grads) {
            p.grad = grad;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::NoGrad;

    #[test]
    fn tril_layout_is_row_major() {
        let idx = tril_index(3);
        let expected = [
            Some(0), None, None,
            Some(3), Some(1), None,
            Some(4), Some(5), Some(2),
        ];
        assert_eq!(&idx[..], &expected);
    }

    #[test]
    fn dense_forward_matches_manual() {
        let layer = Dense::new(vec![1.0, 2.0, -3.0, 0.5], vec![0.1, -0.2], 2, 2);
        let x = Tensor::from_vec(vec![2], vec![0.5, -1.0]);
        let y = layer.forward(&x, &mut NoGrad::new(), &mut TensorStore::new());
        assert_eq!(y.shape, vec![2]);
        assert!((y.data[0] - (0.5 - 2.0 + 0.1)).abs() < 1e-6);
        assert!((y.data[1] - (-1.5 - 0.5 - 0.2)).abs() < 1e-6);
    }

    #[test]
    fn parameter_count() {
        let mut rng = fastrand::Rng::with_seed(0);
        let mlp = Mlp::new(3, 5, 2, Nonlinearity::Tanh, &mut rng);
        assert_eq!(mlp.num_params(), 3 * 5 + 5 + 5 * 5 + 5 + 5 * 2 + 2);
    }
}
