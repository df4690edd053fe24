use std::collections::HashMap;

use crate::error::MlError;
use crate::graph::{EOp, Node};
use crate::recorder::Recorder;
use crate::tensor::{solve_dense, Tensor, TensorStore};

/// A tape that records operations for automatic differentiation.
#[derive(Default)]
pub struct Tape {
    nodes: Vec<Node>,
}

impl Recorder for Tape {
    fn record(&mut self, node: Node) {
        self.nodes.push(node);
    }
}

fn lookup(tensors: &TensorStore, id: usize) -> Result<&Tensor, MlError> {
    tensors.get(&id).ok_or(MlError::MissingTensor(id))
}

fn slot<'g>(grads: &'g mut HashMap<usize, Vec<f32>>, t: &Tensor) -> &'g mut Vec<f32> {
    grads.entry(t.id).or_insert_with(|| vec![0.0; t.data.len()])
}

impl Tape {
    /// Creates a new, empty tape.
    #[must_use]
    pub fn new() -> Self {
        Self { nodes: Vec::new() }
    }

    /// Computes the gradients of a scalar loss with respect to every stored
    /// tensor that requires them.
    ///
    /// # Errors
    ///
    /// Returns [`MlError::MissingTensor`] if a recorded operand is absent from
    /// `tensors`.
    pub fn backward(&mut self, loss: &Tensor, tensors: &mut TensorStore) -> Result<(), MlError> {
        self.backward_from(loss, vec![1.0; loss.data.len()], tensors)
    }

    /// Vector-Jacobian product: propagates `seed` (the gradient of some outer
    /// objective with respect to `out`) back through the recorded operations.
    ///
    /// The gradients are computed by traversing the recorded operations in
    /// reverse order. Nodes whose output never received a gradient are skipped.
    ///
    /// # Errors
    ///
    /// Returns [`MlError::SeedMismatch`] if `seed` and `out` differ in length,
    /// or [`MlError::MissingTensor`] if a recorded operand is absent.
    pub fn backward_from(
        &mut self,
        out: &Tensor,
        seed: Vec<f32>,
        tensors: &mut TensorStore,
    ) -> Result<(), MlError> {
        if seed.len() != out.data.len() {
            return Err(MlError::SeedMismatch { expected: out.data.len(), got: seed.len() });
        }
        let mut grads: HashMap<usize, Vec<f32>> = HashMap::new();
        grads.insert(out.id, seed);

        for node in self.nodes.iter().rev() {
            let Some(out_grad) = grads.get(&node.out).cloned() else {
                continue;
            };
            let a = lookup(tensors, node.a)?;

            match &node.op {
                EOp::Add => {
                    let b = lookup(tensors, node.b)?;
                    for (g, og) in slot(&mut grads, a).iter_mut().zip(&out_grad) {
                        *g += og;
                    }
                    for (g, og) in slot(&mut grads, b).iter_mut().zip(&out_grad) {
                        *g += og;
                    }
                }
                EOp::Sub => {
                    let b = lookup(tensors, node.b)?;
                    for (g, og) in slot(&mut grads, a).iter_mut().zip(&out_grad) {
                        *g += og;
                    }
                    for (g, og) in slot(&mut grads, b).iter_mut().zip(&out_grad) {
                        *g -= og;
                    }
                }
                EOp::Mul => {
                    let b = lookup(tensors, node.b)?;
                    let a_grad = slot(&mut grads, a);
                    for (g, (d, og)) in a_grad.iter_mut().zip(b.data.iter().zip(&out_grad)) {
                        *g += d * og;
                    }
                    let b_grad = slot(&mut grads, b);
                    for (g, (d, og)) in b_grad.iter_mut().zip(a.data.iter().zip(&out_grad)) {
                        *g += d * og;
                    }
                }
                EOp::MulScalar => {
                    let scalar = lookup(tensors, node.b)?.data[0];
                    for (g, og) in slot(&mut grads, a).iter_mut().zip(&out_grad) {
                        *g += scalar * og;
                    }
                }
                EOp::Pow => {
                    let exp = lookup(tensors, node.b)?.data[0];
                    let a_grad = slot(&mut grads, a);
                    for (g, (d, og)) in a_grad.iter_mut().zip(a.data.iter().zip(&out_grad)) {
                        *g += exp * d.powf(exp - 1.0) * og;
                    }
                }
                EOp::MatMul => {
                    let b = lookup(tensors, node.b)?;
                    let out_dim = a.shape[0];
                    let in_dim = a.shape[1];
                    let batch_size = b.data.len() / in_dim;

                    {
                        let w_grad = slot(&mut grads, a);
                        for i in 0..out_dim {
                            for j in 0..in_dim {
                                for k in 0..batch_size {
                                    w_grad[i * in_dim + j] +=
                                        out_grad[k * out_dim + i] * b.data[k * in_dim + j];
                                }
                            }
                        }
                    }

                    {
                        let x_grad = slot(&mut grads, b);
                        for k in 0..batch_size {
                            for j in 0..in_dim {
                                for i in 0..out_dim {
                                    x_grad[k * in_dim + j] +=
                                        out_grad[k * out_dim + i] * a.data[i * in_dim + j];
                                }
                            }
                        }
                    }
                }
                EOp::AddBroadcast => {
                    let b = lookup(tensors, node.b)?;
                    for (g, og) in slot(&mut grads, a).iter_mut().zip(&out_grad) {
                        *g += og;
                    }
                    let dim = b.data.len();
                    let b_grad = slot(&mut grads, b);
                    for (i, og) in out_grad.iter().enumerate() {
                        b_grad[i % dim] += og;
                    }
                }
                EOp::MulBroadcast => {
                    let b = lookup(tensors, node.b)?;
                    let dim = b.data.len();
                    {
                        let a_grad = slot(&mut grads, a);
                        for (i, og) in out_grad.iter().enumerate() {
                            a_grad[i] += og * b.data[i % dim];
                        }
                    }
                    {
                        let b_grad = slot(&mut grads, b);
                        for (i, og) in out_grad.iter().enumerate() {
                            b_grad[i % dim] += og * a.data[i];
                        }
                    }
                }
                EOp::Act(nl) => {
                    let a_grad = slot(&mut grads, a);
                    for (g, (d, og)) in a_grad.iter_mut().zip(a.data.iter().zip(&out_grad)) {
                        *g += nl.derivative(*d) * og;
                    }
                }
                EOp::ActGrad(nl) => {
                    let a_grad = slot(&mut grads, a);
                    for (g, (d, og)) in a_grad.iter_mut().zip(a.data.iter().zip(&out_grad)) {
                        *g += nl.second_derivative(*d) * og;
                    }
                }
                EOp::ReduceSum => {
                    for g in slot(&mut grads, a).iter_mut() {
                        *g += out_grad[0];
                    }
                }
                EOp::ReduceMean => {
                    let n = a.data.len() as f32;
                    for g in slot(&mut grads, a).iter_mut() {
                        *g += out_grad[0] / n;
                    }
                }
                EOp::Gather(index) => {
                    let a_grad = slot(&mut grads, a);
                    for (i, og) in index.iter().zip(&out_grad) {
                        if let Some(j) = i {
                            a_grad[*j] += og;
                        }
                    }
                }
                EOp::Concat => {
                    let b = lookup(tensors, node.b)?;
                    let split = a.data.len();
                    for (g, og) in slot(&mut grads, a).iter_mut().zip(&out_grad[..split]) {
                        *g += og;
                    }
                    for (g, og) in slot(&mut grads, b).iter_mut().zip(&out_grad[split..]) {
                        *g += og;
                    }
                }
                EOp::ConcatAll(ids) => {
                    let mut offset = 0;
                    for id in ids.iter() {
                        let part = lookup(tensors, *id)?;
                        let len = part.data.len();
                        let chunk = &out_grad[offset..offset + len];
                        for (g, og) in slot(&mut grads, part).iter_mut().zip(chunk) {
                            *g += og;
                        }
                        offset += len;
                    }
                }
                EOp::AngleEmbed => {
                    let n = a.data.len();
                    for (i, g) in slot(&mut grads, a).iter_mut().enumerate() {
                        let x = a.data[i];
                        *g += x.cos() * out_grad[n + i] - x.sin() * out_grad[i];
                    }
                }
                EOp::Solve => {
                    // x = A⁻¹ b  =>  ∂b = A⁻ᵀ ḡ,  ∂A = -∂b xᵀ
                    let b = lookup(tensors, node.b)?;
                    let x = lookup(tensors, node.out)?;
                    let n = b.data.len();
                    let b_adj = solve_dense(&a.data, n, &out_grad, true);
                    {
                        let a_grad = slot(&mut grads, a);
                        for r in 0..n {
                            for c in 0..n {
                                a_grad[r * n + c] -= b_adj[r] * x.data[c];
                            }
                        }
                    }
                    for (g, adj) in slot(&mut grads, b).iter_mut().zip(&b_adj) {
                        *g += adj;
                    }
                }
            }
        }

        for (id, grad) in grads {
            if let Some(tensor) = tensors.get_mut(&id) {
                if tensor.requires_grad {
                    tensor.grad = Some(grad);
                }
            }
        }

        Ok(())
    }
}
