use ml::MlError;
use physics::PhysicsError;
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("argument *baseline* and *naive* cannot both be true")]
    BaselineAndNaive,
    #[error("argument *structure* is set to true, no *baseline* or *naive*")]
    StructureWithUnstructured,
    #[error("at least one generalized coordinate is required")]
    NoCoordinates,
    #[error("{system} has {expected} generalized coordinates, num_angle is {got}")]
    CoordinateMismatch { system: String, expected: usize, got: usize },
}

#[derive(Error, Debug)]
pub enum DataError {
    #[error(
        "window of {num_points} points does not fit trajectories of {timesteps} steps \
         (need 2 <= P <= T)"
    )]
    WindowLength { num_points: usize, timesteps: usize },
    #[error("time grid has {got} points, trajectories have {expected}")]
    GridLength { expected: usize, got: usize },
    #[error("trajectory data has {got} values, expected {expected}")]
    DataLength { expected: usize, got: usize },
    #[error("test split must lie in [0, 1), got {0}")]
    TestSplit(f64),
    #[error("the {0} split is empty")]
    EmptySplit(&'static str),
    #[error(transparent)]
    Physics(#[from] PhysicsError),
}

#[derive(Error, Debug)]
pub enum TrainError {
    #[error("non-finite loss at epoch {epoch}, window {window}")]
    NonFiniteLoss { epoch: usize, window: usize },
    #[error("train and test trajectories must share the time grid")]
    GridMismatch,
    #[error("trajectories have state dimension {got}, model expects {expected}")]
    StateDimension { expected: usize, got: usize },
    #[error(transparent)]
    Data(#[from] DataError),
    #[error(transparent)]
    Ml(#[from] MlError),
}

#[derive(Error, Debug)]
pub enum PersistError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error("checkpoint is for a {found} model, this one is {expected}")]
    KindMismatch { expected: String, found: String },
    #[error("checkpoint holds {got} parameters, model has {expected}")]
    ParameterCount { expected: usize, got: usize },
    #[error("parameter {name}: checkpoint shape {got:?}, model shape {expected:?}")]
    ParameterShape { name: String, expected: Vec<usize>, got: Vec<usize> },
}
