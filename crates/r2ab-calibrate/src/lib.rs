//! Bayesian calibration of the R2-AB model against supernova, cosmic-chronometer and
//! redshift-space-distortion data.
//!
//! The pieces compose leaf-first:
//!
//! - [`dataset`] holds validated, immutable observation tables
//! - [`likelihood`] combines them into χ² statistics for a solved model
//! - [`prior`] and [`posterior`] turn that into a log-posterior with box priors
//! - [`sampler`] is the affine-invariant ensemble sampler (Goodman & Weare stretch move)
//! - [`driver`] runs the burn-in/production state machine and hands back the [`Chain`]

pub mod config;
pub mod dataset;
pub mod driver;
pub mod likelihood;
pub mod posterior;
pub mod prior;
pub mod sampler;

use r2ab_core::R2abError;
use thiserror::Error;

pub use config::{DataPaths, RunConfig, SamplerSettings};
pub use dataset::{
    ChronometerDataset, CovarianceFactor, GrowthDataset, GrowthObservation, HubbleObservation,
    SnObservation, SupernovaDataset,
};
pub use driver::{DriverPhase, McmcDriver, McmcOutput};
pub use likelihood::{
    ChiSquaredBreakdown, ChiSquaredWeights, EvaluationStats, JointLikelihood, LogLikelihood,
};
pub use nalgebra::DMatrix;
pub use posterior::{EvaluationCounts, LogPosterior, Posterior};
pub use prior::{Interval, PriorBounds};
pub use sampler::{Chain, EnsembleSampler, ProgressInfo, SamplerState, StretchMove, WalkerInit};

/// Errors raised while configuring or running a calibration.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
    #[error("Sampling error: {0}")]
    SamplingError(String),
    #[error("Invalid data: {0}")]
    InvalidData(String),
    #[error("Invalid configuration: {0}")]
    Config(String),
    #[error("Model error: {0}")]
    Model(#[from] R2abError),
    #[error("Could not parse configuration: {0}")]
    ConfigParse(#[from] toml::de::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Convenience type for `Result<T, Error>`.
pub type Result<T> = std::result::Result<T, Error>;
