#![allow(dead_code)]

use ml::{Mlp, Module, Nonlinearity, Recorder, Tensor, TensorStore, VectorField};

/// Central finite differences of a scalar function.
pub fn fd_grad(f: impl Fn(&[f32]) -> f32, x: &[f32], eps: f32) -> Vec<f32> {
    let mut perturbed = x.to_vec();
    (0..x.len())
        .map(|i| {
            perturbed[i] = x[i] + eps;
            let plus = f(&perturbed);
            perturbed[i] = x[i] - eps;
            let minus = f(&perturbed);
            perturbed[i] = x[i];
            (plus - minus) / (2.0 * eps)
        })
        .collect()
}

pub fn assert_grad_close(analytical: &[f32], numerical: &[f32], tol: f32) {
    assert_eq!(analytical.len(), numerical.len());
    for (i, (a, n)) in analytical.iter().zip(numerical).enumerate() {
        let scale = n.abs().max(1.0);
        assert!(
            (a - n).abs() <= tol * scale,
            "Grad check failed for element {i}. Numerical: {n}, Analytical: {a}"
        );
    }
}

/// `dx/dt = A x`
pub struct LinearField {
    pub a: Tensor,
}

impl LinearField {
    pub fn new(dim: usize, data: Vec<f32>) -> Self {
        Self { a: Tensor::from_vec(vec![dim, dim], data).with_grad() }
    }
}

impl VectorField for LinearField {
    fn state_dim(&self) -> usize {
        self.a.shape[0]
    }

    fn derivative(
        &self,
        _t: f32,
        state: &Tensor,
        _control: f32,
        recorder: &mut impl Recorder,
        tensors: &mut TensorStore,
    ) -> Tensor {
        self.a.matmul(state, recorder, tensors)
    }
}

/// `dx/dt = mlp(x) + u`
pub struct NeuralField {
    pub net: Mlp,
}

impl NeuralField {
    pub fn new(dim: usize, hidden: usize, seed: u64) -> Self {
        let mut rng = fastrand::Rng::with_seed(seed);
        Self { net: Mlp::new(dim, hidden, dim, Nonlinearity::Tanh, &mut rng) }
    }
}

impl Module for NeuralField {
    fn params(&self) -> Vec<&Tensor> {
        self.net.params()
    }

    fn params_mut(&mut self) -> Vec<&mut Tensor> {
        self.net.params_mut()
    }
}

impl VectorField for NeuralField {
    fn state_dim(&self) -> usize {
        self.net.input_dim()
    }

    fn derivative(
        &self,
        _t: f32,
        state: &Tensor,
        control: f32,
        recorder: &mut impl Recorder,
        tensors: &mut TensorStore,
    ) -> Tensor {
        let y = self.net.forward(state, recorder, tensors);
        let u = Tensor::from_vec(vec![y.len()], vec![control; y.len()]);
        y.add(&u, recorder, tensors)
    }
}
