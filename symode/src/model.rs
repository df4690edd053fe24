//! # Vector-field models
//!
//! [`DynamicsModel`] is the learned right-hand side `d/dt [q, q̇] = f(q, q̇; u)`
//! handed to the ODE integrator. Which networks it owns and how they combine
//! is fixed by a [`ModelKind`] at construction:
//!
//! -   **Naive** and **Baseline** regress the derivative directly from
//!     `[cos q, sin q, q̇, u]`. Baseline additionally owns a mass-matrix network that is
//!     trained alongside but never enters the derivative.
//! -   **Hamiltonian** learns a scalar `H(q, p)` and follows Hamilton's
//!     equations with a learned input matrix `g(q)`.
//! -   **Structured** learns `M(q)`, `V(q)` and `g(q)` and solves the
//!     Euler–Lagrange equations
//!     `M q̈ = g u − ∇V − Ṁ q̇ + ½ ∇_q(q̇ᵀ M q̇)`.
//!
//! Every network sees the angles only through `[cos q, sin q]`, so the
//! learned dynamics are `2π`-periodic in each coordinate. Input gradients are
//! carried through the embedding by [`angle_tangents`].

use std::cell::Cell;
use std::fmt;

use ml::{
    angle_embedding, angle_tangents, Mlp, Module, NoGrad, Nonlinearity, Psd, Recorder, Tensor,
    TensorStore, VectorField,
};

use crate::error::ConfigError;

/// The model variant, resolved once from the command-line flags.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ModelKind {
    Naive,
    Baseline,
    Hamiltonian,
    Structured,
}

impl ModelKind {
    /// Resolves the three mutually exclusive mode flags.
    ///
    /// # Errors
    ///
    /// [`ConfigError::BaselineAndNaive`] and
    /// [`ConfigError::StructureWithUnstructured`] for conflicting flags.
    pub fn from_flags(baseline: bool, naive: bool, structure: bool) -> Result<Self, ConfigError> {
        match (baseline, naive, structure) {
            (true, true, false) => Err(ConfigError::BaselineAndNaive),
            (_, _, true) if baseline || naive => Err(ConfigError::StructureWithUnstructured),
            (_, _, true) => Ok(ModelKind::Structured),
            (true, false, false) => Ok(ModelKind::Baseline),
            (false, true, false) => Ok(ModelKind::Naive),
            (false, false, false) => Ok(ModelKind::Hamiltonian),
        }
    }

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            ModelKind::Naive => "naive",
            ModelKind::Baseline => "baseline",
            ModelKind::Hamiltonian => "hamiltonian",
            ModelKind::Structured => "structured",
        }
    }

    /// Label used in artifact file names.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            ModelKind::Naive => "-naive_ode",
            ModelKind::Baseline => "-baseline_ode",
            ModelKind::Hamiltonian | ModelKind::Structured => "-hnn_ode",
        }
    }

    #[must_use]
    pub fn struct_suffix(self) -> &'static str {
        if self == ModelKind::Structured {
            "-struct"
        } else {
            ""
        }
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Hidden-layer widths of every network a model may own.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HiddenWidths {
    pub naive: usize,
    pub baseline: usize,
    pub hamiltonian: usize,
    pub mass: usize,
    pub potential: usize,
    pub force: usize,
}

impl Default for HiddenWidths {
    fn default() -> Self {
        Self { naive: 1200, baseline: 800, hamiltonian: 600, mass: 400, potential: 300, force: 300 }
    }
}

impl HiddenWidths {
    /// Every network with the same width.
    #[must_use]
    pub fn uniform(width: usize) -> Self {
        Self {
            naive: width,
            baseline: width,
            hamiltonian: width,
            mass: width,
            potential: width,
            force: width,
        }
    }
}

#[derive(Clone, Debug)]
pub struct ModelConfig {
    /// Number of generalized coordinates `N`; the state has `2N` entries.
    pub num_angle: usize,
    pub kind: ModelKind,
    /// Nonlinearity of the main network. `M`, `V` and `g` always use tanh.
    pub nonlinearity: Nonlinearity,
    pub hidden: HiddenWidths,
    /// Seeds parameter initialization.
    pub seed: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            num_angle: 2,
            kind: ModelKind::Structured,
            nonlinearity: Nonlinearity::Tanh,
            hidden: HiddenWidths::default(),
            seed: 0,
        }
    }
}

enum Networks {
    Naive { net: Mlp },
    Baseline { net: Mlp, mass: Psd },
    Hamiltonian { hamiltonian: Mlp, force: Mlp },
    Structured { mass: Psd, potential: Mlp, force: Mlp },
}

pub struct DynamicsModel {
    num_angle: usize,
    kind: ModelKind,
    nets: Networks,
    nfe: Cell<usize>,
}

impl DynamicsModel {
    /// Allocates and initializes the networks of `config.kind`.
    ///
    /// # Errors
    ///
    /// [`ConfigError::NoCoordinates`] for `num_angle == 0`.
    pub fn new(config: &ModelConfig) -> Result<Self, ConfigError> {
        let n = config.num_angle;
        if n == 0 {
            return Err(ConfigError::NoCoordinates);
        }
        let mut rng = fastrand::Rng::with_seed(config.seed);
        let widths = config.hidden;
        let nl = config.nonlinearity;
        // [cos q, sin q] for the coordinate networks, plus q̇ (or p) and u for the rest
        let embedded = 2 * n;
        let tanh = Nonlinearity::Tanh;
        let nets = match config.kind {
            ModelKind::Naive => Networks::Naive {
                net: Mlp::new(3 * n + 1, widths.naive, 2 * n, nl, &mut rng),
            },
            ModelKind::Baseline => Networks::Baseline {
                net: Mlp::new(3 * n + 1, widths.baseline, 2 * n, nl, &mut rng),
                mass: Psd::new(embedded, widths.mass, n, &mut rng),
            },
            ModelKind::Hamiltonian => Networks::Hamiltonian {
                hamiltonian: Mlp::new(3 * n, widths.hamiltonian, 1, nl, &mut rng),
                force: Mlp::new(embedded, widths.force, n, tanh, &mut rng),
            },
            ModelKind::Structured => Networks::Structured {
                mass: Psd::new(embedded, widths.mass, n, &mut rng),
                potential: Mlp::new(embedded, widths.potential, 1, tanh, &mut rng),
                force: Mlp::new(embedded, widths.force, n, tanh, &mut rng),
            },
        };
        tracing::debug!(kind = %config.kind, num_angle = n, "model allocated");
        Ok(Self { num_angle: n, kind: config.kind, nets, nfe: Cell::new(0) })
    }

    #[must_use]
    pub fn kind(&self) -> ModelKind {
        self.kind
    }

    #[must_use]
    pub fn num_angle(&self) -> usize {
        self.num_angle
    }

    /// Vector-field evaluations since the last [`reset_nfe`](Self::reset_nfe).
    #[must_use]
    pub fn nfe(&self) -> usize {
        self.nfe.get()
    }

    pub fn reset_nfe(&self) {
        self.nfe.set(0);
    }

    fn components(&self) -> Vec<(&'static str, &Mlp)> {
        match &self.nets {
            Networks::Naive { net } => vec![("net", net)],
            Networks::Baseline { net, mass } => vec![("net", net), ("mass", &mass.net)],
            Networks::Hamiltonian { hamiltonian, force } => {
                vec![("hamiltonian", hamiltonian), ("force", force)]
            }
            Networks::Structured { mass, potential, force } => {
                vec![("mass", &mass.net), ("potential", potential), ("force", force)]
            }
        }
    }

    fn components_mut(&mut self) -> Vec<&mut Mlp> {
        match &mut self.nets {
            Networks::Naive { net } => vec![net],
            Networks::Baseline { net, mass } => vec![net, &mut mass.net],
            Networks::Hamiltonian { hamiltonian, force } => vec![hamiltonian, force],
            Networks::Structured { mass, potential, force } => {
                vec![&mut mass.net, potential, force]
            }
        }
    }

    /// Parameters with stable names such as `mass.0.w`, in [`Module::params`] order.
    #[must_use]
    pub fn named_params(&self) -> Vec<(String, &Tensor)> {
        self.components()
            .into_iter()
            .flat_map(|(name, mlp)| {
                mlp.layers.iter().enumerate().flat_map(move |(i, layer)| {
                    [(format!("{name}.{i}.w"), &layer.w), (format!("{name}.{i}.b"), &layer.b)]
                })
            })
            .collect()
    }

    /// Learned mass matrix `M(q)` (row-major), for the structured model.
    #[must_use]
    pub fn mass_matrix(&self, q: &[f32]) -> Option<Vec<f32>> {
        let Networks::Structured { mass, .. } = &self.nets else {
            return None;
        };
        let mut tensors = TensorStore::new();
        let q = Tensor::from_vec(vec![q.len()], q.to_vec());
        let e = angle_embedding(&q, self.num_angle, &mut NoGrad::new(), &mut tensors);
        Some(mass.forward(&e, &mut NoGrad::new(), &mut tensors).data)
    }

    /// Learned potential energy `V(q)`, for the structured model.
    #[must_use]
    pub fn potential(&self, q: &[f32]) -> Option<f32> {
        let Networks::Structured { potential, .. } = &self.nets else {
            return None;
        };
        let mut tensors = TensorStore::new();
        let q = Tensor::from_vec(vec![q.len()], q.to_vec());
        let e = angle_embedding(&q, self.num_angle, &mut NoGrad::new(), &mut tensors);
        Some(potential.forward(&e, &mut NoGrad::new(), &mut tensors).data[0])
    }

    /// Learned Hamiltonian `H(q, p)`, for the Hamiltonian model.
    #[must_use]
    pub fn hamiltonian(&self, state: &[f32]) -> Option<f32> {
        let Networks::Hamiltonian { hamiltonian, .. } = &self.nets else {
            return None;
        };
        let mut tensors = TensorStore::new();
        let x = Tensor::from_vec(vec![state.len()], state.to_vec());
        let e = angle_embedding(&x, self.num_angle, &mut NoGrad::new(), &mut tensors);
        Some(hamiltonian.forward(&e, &mut NoGrad::new(), &mut tensors).data[0])
    }

    /// `[∂H/∂p, −∂H/∂q + g(q) u]`
    #[allow(clippy::too_many_arguments)]
    fn hamiltonian_derivative(
        &self,
        hamiltonian: &Mlp,
        force: &Mlp,
        state: &Tensor,
        control: f32,
        recorder: &mut impl Recorder,
        tensors: &mut TensorStore,
    ) -> Tensor {
        let n = self.num_angle;
        let e = angle_embedding(state, n, recorder, tensors);
        let directions = angle_tangents(&e, n, recorder, tensors);
        let (_, jac) = hamiltonian.forward_with_jacobian(&e, &directions, recorder, tensors);
        let grad = jac.reshape(vec![2 * n], recorder, tensors);
        let dh_dq = grad.slice(0, n, recorder, tensors);
        let dh_dp = grad.slice(n, n, recorder, tensors);

        let trig = e.slice(0, 2 * n, recorder, tensors);
        let gu = force.forward(&trig, recorder, tensors);
        let gu = gu.mul_scalar(control, recorder, tensors);
        let p_dot = gu.sub(&dh_dq, recorder, tensors);
        dh_dp.concat(&p_dot, recorder, tensors)
    }

    /// `[q̇, M⁻¹ (g u − ∇V − Ṁ q̇ + ½ ∇_q(q̇ᵀ M q̇))]`
    fn structured_derivative(
        &self,
        (mass, potential, force): (&Psd, &Mlp, &Mlp),
        state: &Tensor,
        control: f32,
        recorder: &mut impl Recorder,
        tensors: &mut TensorStore,
    ) -> Tensor {
        let n = self.num_angle;
        let q = state.slice(0, n, recorder, tensors);
        let v = state.slice(n, n, recorder, tensors);

        let e = angle_embedding(&q, n, recorder, tensors);
        let directions = angle_tangents(&e, n, recorder, tensors);

        let (m, dm) = mass.forward_along(&e, &directions, recorder, tensors);
        let (_, dv) = potential.forward_with_jacobian(&e, &directions, recorder, tensors);
        let grad_v = dv.reshape(vec![n], recorder, tensors);
        let gu = force.forward(&e, recorder, tensors);
        let gu = gu.mul_scalar(control, recorder, tensors);

        // Ṁ q̇ = Σ_k q̇_k (∂M/∂q_k) q̇ and (∇_q q̇ᵀ M q̇)_k = q̇ᵀ (∂M/∂q_k) q̇
        let mut coriolis = Tensor::zeros(vec![n]);
        let mut quadratic = Vec::with_capacity(n);
        for (k, dm_k) in dm.iter().enumerate() {
            let dm_v = dm_k.matmul(&v, recorder, tensors);
            let v_k = v.slice(k, 1, recorder, tensors);
            let scaled = dm_v.mul_broadcast(&v_k, recorder, tensors);
            coriolis = coriolis.add(&scaled, recorder, tensors);
            let vt_dm_v = v.mul(&dm_v, recorder, tensors).reduce_sum(recorder, tensors);
            quadratic.push(vt_dm_v);
        }
        let quadratic = Tensor::concat_all(&quadratic, recorder, tensors);
        let half_grad = quadratic.mul_scalar(0.5, recorder, tensors);

        let rhs = gu.sub(&grad_v, recorder, tensors);
        let rhs = rhs.sub(&coriolis, recorder, tensors);
        let rhs = rhs.add(&half_grad, recorder, tensors);
        let accel = m.solve(&rhs, recorder, tensors);
        v.concat(&accel, recorder, tensors)
    }
}

impl VectorField for DynamicsModel {
    fn state_dim(&self) -> usize {
        2 * self.num_angle
    }

    fn derivative(
        &self,
        _t: f32,
        state: &Tensor,
        control: f32,
        recorder: &mut impl Recorder,
        tensors: &mut TensorStore,
    ) -> Tensor {
        self.nfe.set(self.nfe.get() + 1);
        match &self.nets {
            Networks::Naive { net } | Networks::Baseline { net, .. } => {
                let u = Tensor::from_vec(vec![1], vec![control]);
                let e = angle_embedding(state, self.num_angle, recorder, tensors);
                let input = e.concat(&u, recorder, tensors);
                net.forward(&input, recorder, tensors)
            }
            Networks::Hamiltonian { hamiltonian, force } => {
                self.hamiltonian_derivative(hamiltonian, force, state, control, recorder, tensors)
            }
            Networks::Structured { mass, potential, force } => {
                let nets = (mass, potential, force);
                self.structured_derivative(nets, state, control, recorder, tensors)
            }
        }
    }
}

impl Module for DynamicsModel {
    fn params(&self) -> Vec<&Tensor> {
        self.components().into_iter().flat_map(|(_, mlp)| mlp.params()).collect()
    }

    fn params_mut(&mut self) -> Vec<&mut Tensor> {
        self.components_mut().into_iter().flat_map(Module::params_mut).collect()
    }
}
