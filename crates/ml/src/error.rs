use thiserror::Error;

#[derive(Error, Debug)]
pub enum MlError {
    #[error("tensor {0} is not in the tensor store")]
    MissingTensor(usize),
    #[error("seed gradient has {got} elements, output has {expected}")]
    SeedMismatch { expected: usize, got: usize },
    #[error("time grid must be non-empty and strictly increasing")]
    InvalidTimeGrid,
    #[error("state has {got} elements, vector field expects {expected}")]
    StateDimension { expected: usize, got: usize },
    #[error("nonlinearity not recognized: {0}")]
    UnknownNonlinearity(String),
    #[error("ODE solver not recognized: {0}")]
    UnknownSolver(String),
}
