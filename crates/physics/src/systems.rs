//! Controlled systems in generalized coordinates.

use std::f64::consts::{FRAC_PI_2, PI};
use std::fmt;
use std::str::FromStr;

use crate::error::PhysicsError;

/// A mechanical system `q̈ = f(q, q̇, u)` driven by one scalar control.
pub trait ControlledSystem {
    /// Number of generalized coordinates (all of them angles).
    fn num_angle(&self) -> usize;

    /// Generalized accelerations at `(q, q̇)` under control `u`.
    fn acceleration(&self, q: &[f64], qdot: &[f64], u: f64) -> Vec<f64>;

    /// Length of the `[q, q̇]` state vector.
    fn state_dim(&self) -> usize {
        2 * self.num_angle()
    }
}

/// Single rigid rod pivoting about one end, torque applied at the pivot.
///
/// `θ = 0` is the upright position.
#[derive(Clone, Debug)]
pub struct Pendulum {
    /// Gravitational acceleration in m/s²
    pub gravity: f64,
    /// Rod mass in kg
    pub mass: f64,
    /// Rod length in meters
    pub length: f64,
}

impl Default for Pendulum {
    fn default() -> Self {
        Self { gravity: 10.0, mass: 1.0, length: 1.0 }
    }
}

impl ControlledSystem for Pendulum {
    fn num_angle(&self) -> usize {
        1
    }

    fn acceleration(&self, q: &[f64], _qdot: &[f64], u: f64) -> Vec<f64> {
        let Self { gravity: g, mass: m, length: l } = *self;
        vec![-3.0 * g / (2.0 * l) * (q[0] + PI).sin() + 3.0 / (m * l * l) * u]
    }
}

/// Two-link planar arm with the torque on the elbow joint.
///
/// `θ₁` is measured from the hanging position, `θ₂` relative to the first link.
#[derive(Clone, Debug)]
pub struct Acrobot {
    pub link_mass_1: f64,
    pub link_mass_2: f64,
    pub link_length_1: f64,
    /// Distance from each joint to its link's centre of mass
    pub link_com_1: f64,
    pub link_com_2: f64,
    /// Moment of inertia of each link about its centre of mass
    pub link_moi: f64,
    pub gravity: f64,
}

impl Default for Acrobot {
    fn default() -> Self {
        Self {
            link_mass_1: 1.0,
            link_mass_2: 1.0,
            link_length_1: 1.0,
            link_com_1: 0.5,
            link_com_2: 0.5,
            link_moi: 1.0,
            gravity: 9.8,
        }
    }
}

impl ControlledSystem for Acrobot {
    fn num_angle(&self) -> usize {
        2
    }

    fn acceleration(&self, q: &[f64], qdot: &[f64], u: f64) -> Vec<f64> {
        let (m1, m2) = (self.link_mass_1, self.link_mass_2);
        let (l1, lc1, lc2) = (self.link_length_1, self.link_com_1, self.link_com_2);
        let (i1, i2, g) = (self.link_moi, self.link_moi, self.gravity);
        let (theta1, theta2) = (q[0], q[1]);
        let (dtheta1, dtheta2) = (qdot[0], qdot[1]);

        let d1 = m1 * lc1 * lc1
            + m2 * (l1 * l1 + lc2 * lc2 + 2.0 * l1 * lc2 * theta2.cos())
            + i1
            + i2;
        let d2 = m2 * (lc2 * lc2 + l1 * lc2 * theta2.cos()) + i2;
        let phi2 = m2 * lc2 * g * (theta1 + theta2 - FRAC_PI_2).cos();
        let phi1 = -m2 * l1 * lc2 * dtheta2 * dtheta2 * theta2.sin()
            - 2.0 * m2 * l1 * lc2 * dtheta2 * dtheta1 * theta2.sin()
            + (m1 * lc1 + m2 * l1) * g * (theta1 - FRAC_PI_2).cos()
            + phi2;
        let ddtheta2 = (u + d2 / d1 * phi1
            - m2 * l1 * lc2 * dtheta1 * dtheta1 * theta2.sin()
            - phi2)
            / (m2 * lc2 * lc2 + i2 - d2 * d2 / d1);
        let ddtheta1 = -(d2 * ddtheta2 + phi1) / d1;
        vec![ddtheta1, ddtheta2]
    }
}

/// Selects one of the built-in systems by name.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum SystemKind {
    #[default]
    Pendulum,
    Acrobot,
}

impl SystemKind {
    pub fn name(self) -> &'static str {
        match self {
            SystemKind::Pendulum => "pendulum",
            SystemKind::Acrobot => "acrobot",
        }
    }

    /// The system with its default constants.
    pub fn build(self) -> Box<dyn ControlledSystem> {
        match self {
            SystemKind::Pendulum => Box::new(Pendulum::default()),
            SystemKind::Acrobot => Box::new(Acrobot::default()),
        }
    }
}

impl FromStr for SystemKind {
    type Err = PhysicsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pendulum" => Ok(SystemKind::Pendulum),
            "acrobot" => Ok(SystemKind::Acrobot),
            other => Err(PhysicsError::UnknownSystem(other.to_string())),
        }
    }
}

impl fmt::Display for SystemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pendulum_torque_scaling() {
        let p = Pendulum::default();
        let at_rest = p.acceleration(&[0.0], &[0.0], 0.0)[0];
        let pushed = p.acceleration(&[0.0], &[0.0], 1.0)[0];
        assert!(at_rest.abs() < 1e-12);
        assert!((pushed - 3.0).abs() < 1e-12);
    }

    #[test]
    fn system_names_round_trip() {
        for kind in [SystemKind::Pendulum, SystemKind::Acrobot] {
            assert_eq!(kind.name().parse::<SystemKind>(), Ok(kind));
            assert_eq!(kind.build().state_dim(), 2 * kind.build().num_angle());
        }
        assert_eq!(
            "cartpole".parse::<SystemKind>(),
            Err(PhysicsError::UnknownSystem("cartpole".into()))
        );
    }
}
