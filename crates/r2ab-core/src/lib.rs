//! Core numerics for the R2-AB modified-gravity expansion model.
//!
//! The crate integrates the background expansion and the linear growth of matter
//! perturbations for a single parameter vector and maps the resulting trajectories onto
//! the observables measured by supernova, cosmic-chronometer and redshift-space-distortion
//! surveys.
//!
//! # Module Organisation
//!
//! - `config`: immutable model constants and solver settings
//! - `params`: the sampled parameter vector
//! - `transition`: the saturating hyperbolic-tangent transition shared by every equation
//! - `ivp`: initial value problem plumbing and the stiff Rosenbrock integrator
//! - `trajectory`: dense (Hermite) interpolation of solver output
//! - `model`: the background and growth ODE systems
//! - `observables`: H(z), fσ8(z) and distances derived from a solved model

pub mod config;
pub mod errors;
pub mod ivp;
pub mod model;
pub mod observables;
pub mod params;
pub mod trajectory;
pub mod transition;

/// Floating point type used for all model quantities
pub type FloatValue = f64;

/// Internal integration time (the scale factor `a = 1 / (1 + z)`)
pub type Time = f64;

pub use config::{ModelConfig, SolverMethod, SolverSettings};
pub use errors::{R2abError, R2abResult, SolverError};
pub use model::solve;
pub use observables::CosmologySolution;
pub use params::ParameterVector;
