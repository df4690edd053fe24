//! Scalar activation functions selectable by name.
//!
//! A [`Nonlinearity`] is resolved once (usually from a command-line string) and
//! then evaluated elementwise by the tensor ops. Besides the value, every variant
//! knows its first and second derivative: the first is needed to propagate input
//! tangents through a network, the second to backpropagate through those tangents.

use std::fmt;
use std::str::FromStr;

use crate::error::MlError;

const SELU_ALPHA: f32 = 1.673_263_2;
const SELU_SCALE: f32 = 1.050_701;

/// Supported activation functions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Nonlinearity {
    Tanh,
    Relu,
    Sigmoid,
    Softplus,
    Selu,
    Elu,
    Swish,
}

fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

impl Nonlinearity {
    pub const ALL: [Nonlinearity; 7] = [
        Nonlinearity::Tanh,
        Nonlinearity::Relu,
        Nonlinearity::Sigmoid,
        Nonlinearity::Softplus,
        Nonlinearity::Selu,
        Nonlinearity::Elu,
        Nonlinearity::Swish,
    ];

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Nonlinearity::Tanh => "tanh",
            Nonlinearity::Relu => "relu",
            Nonlinearity::Sigmoid => "sigmoid",
            Nonlinearity::Softplus => "softplus",
            Nonlinearity::Selu => "selu",
            Nonlinearity::Elu => "elu",
            Nonlinearity::Swish => "swish",
        }
    }

    /// σ(x)
    #[must_use]
    pub fn apply(self, x: f32) -> f32 {
        match self {
            Nonlinearity::Tanh => x.tanh(),
            Nonlinearity::Relu => x.max(0.0),
            Nonlinearity::Sigmoid => sigmoid(x),
            // max(x, 0) + ln(1 + e^-|x|) avoids overflow for large |x|
            Nonlinearity::Softplus => x.max(0.0) + (-x.abs()).exp().ln_1p(),
            Nonlinearity::Selu => {
                if x > 0.0 {
                    SELU_SCALE * x
                } else {
                    SELU_SCALE * SELU_ALPHA * x.exp_m1()
                }
            }
            Nonlinearity::Elu => {
                if x > 0.0 {
                    x
                } else {
                    x.exp_m1()
                }
            }
            Nonlinearity::Swish => x * sigmoid(x),
        }
    }

    /// σ'(x)
    #[must_use]
    pub fn derivative(self, x: f32) -> f32 {
        match self {
            Nonlinearity::Tanh => {
                let t = x.tanh();
                1.0 - t * t
            }
            Nonlinearity::Relu => {
                if x > 0.0 {
                    1.0
                } else {
                    0.0
                }
            }
            Nonlinearity::Sigmoid => {
                let s = sigmoid(x);
                s * (1.0 - s)
            }
            Nonlinearity::Softplus => sigmoid(x),
            Nonlinearity::Selu => {
                if x > 0.0 {
                    SELU_SCALE
                } else {
                    SELU_SCALE * SELU_ALPHA * x.exp()
                }
            }
            Nonlinearity::Elu => {
                if x > 0.0 {
                    1.0
                } else {
                    x.exp()
                }
            }
            Nonlinearity::Swish => {
                let s = sigmoid(x);
                s + x * s * (1.0 - s)
            }
        }
    }

    /// σ''(x)
    #[must_use]
    pub fn second_derivative(self, x: f32) -> f32 {
        match self {
            Nonlinearity::Tanh => {
                let t = x.tanh();
                -2.0 * t * (1.0 - t * t)
            }
            Nonlinearity::Relu => 0.0,
            Nonlinearity::Sigmoid => {
                let s = sigmoid(x);
                s * (1.0 - s) * (1.0 - 2.0 * s)
            }
            Nonlinearity::Softplus => {
                let s = sigmoid(x);
                s * (1.0 - s)
            }
            Nonlinearity::Selu => {
                if x > 0.0 {
                    0.0
                } else {
                    SELU_SCALE * SELU_ALPHA * x.exp()
                }
            }
            Nonlinearity::Elu => {
                if x > 0.0 {
                    0.0
                } else {
                    x.exp()
                }
            }
            Nonlinearity::Swish => {
                let s = sigmoid(x);
                s * (1.0 - s) * (2.0 + x * (1.0 - 2.0 * s))
            }
        }
    }
}

impl FromStr for Nonlinearity {
    type Err = MlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Nonlinearity::ALL
            .into_iter()
            .find(|nl| nl.name() == s)
            .ok_or_else(|| MlError::UnknownNonlinearity(s.to_string()))
    }
}

impl fmt::Display for Nonlinearity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
