use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum PhysicsError {
    #[error("system not recognized: {0}")]
    UnknownSystem(String),
    #[error("state has {got} elements, system expects {expected}")]
    StateDimension { expected: usize, got: usize },
    #[error("at least one integration substep is required")]
    NoSubsteps,
}
