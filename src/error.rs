use thiserror::Error;

#[derive(Debug, Error)]
pub enum RiError {
    #[error("shape mismatch in {op}: {lhs:?} vs {rhs:?}")]
    ShapeMismatch { op: &'static str, lhs: Vec<usize>, rhs: Vec<usize> },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("{0} has not been set")]
    MissingInput(&'static str),

    #[error("shared result accumulator is poisoned")]
    LockPoisoned,

    #[error("tensor backend: {0}")]
    Backend(#[from] rstsr::prelude::rt::Error),
}

pub type Result<T> = std::result::Result<T, RiError>;
