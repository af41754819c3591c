use crate::{FloatValue, Time};
use thiserror::Error;

/// Failure of a single ODE integration.
///
/// These are recoverable: the calibration layer treats them as a rejected parameter vector.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SolverError {
    #[error("Maximum number of steps ({steps}) reached at t={t}")]
    MaxStepsReached { t: Time, steps: usize },
    #[error("Step size underflow at t={t} (h={h})")]
    StepSizeUnderflow { t: Time, h: FloatValue },
    #[error("Singular iteration matrix at t={0}")]
    SingularMatrix(Time),
    #[error("Non-finite state encountered at t={0}")]
    NonFinite(Time),
    #[error("Integration failed: {0}")]
    Integration(String),
}

/// Error type for invalid operations.
#[derive(Error, Debug)]
pub enum R2abError {
    #[error("{0}")]
    Error(String),
    #[error("Invalid model configuration: {0}")]
    InvalidConfig(String),
    #[error("Expected {expected} parameters, got {got}")]
    WrongParameterCount { expected: usize, got: usize },
    #[error(transparent)]
    Solver(#[from] SolverError),
    #[error("Trajectory times must be strictly increasing, t[{index}]={t} follows {previous}")]
    NonMonotonic {
        index: usize,
        t: Time,
        previous: Time,
    },
    #[error("Extrapolation is not allowed. Target={target}, interpolation range=[{start}, {end}]")]
    ExtrapolationNotAllowed {
        target: FloatValue,
        start: FloatValue,
        end: FloatValue,
    },
    #[error("Unphysical model state at t={t}: {reason}")]
    Unphysical { t: Time, reason: String },
}

/// Convenience type for `Result<T, R2abError>`.
pub type R2abResult<T> = Result<T, R2abError>;
