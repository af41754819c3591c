//! Run configuration, deserialised from TOML.

use crate::likelihood::ChiSquaredWeights;
use crate::prior::PriorBounds;
use crate::{Error, Result};
use r2ab_core::params::{ParameterVector, N_PARAMS};
use r2ab_core::ModelConfig;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Ensemble size, run lengths and seeding for the MCMC driver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplerSettings {
    /// Number of walkers. Must be even and at least twice the number of parameters.
    /// Default: 40
    pub nwalkers: usize,

    /// Iterations run and discarded before recording.
    /// Default: 1500
    pub burnin: usize,

    /// Recorded iterations.
    /// Default: 10000
    pub niter: usize,

    /// Point the walkers are seeded around, ordered as H0, Om0, sigma8, Mb, b.
    /// Default: [70.0, 0.3, 0.8, -19.253, 5.0]
    pub initial_guess: [f64; N_PARAMS],

    /// Standard deviation of the Gaussian perturbation applied to each walker.
    /// Default: 1e-4
    pub init_scale: f64,

    /// Worker threads used to evaluate proposals. `None` uses every core.
    /// Default: None
    pub n_threads: Option<usize>,

    /// Seed for the sampler's random number generator. `None` draws one from the OS.
    /// Default: None
    pub seed: Option<u64>,

    /// Scale `a` of the stretch move.
    /// Default: 2.0
    pub stretch_scale: f64,
}

impl Default for SamplerSettings {
    fn default() -> Self {
        Self {
            nwalkers: 40,
            burnin: 1500,
            niter: 10_000,
            initial_guess: ParameterVector::reference().to_array(),
            init_scale: 1e-4,
            n_threads: None,
            seed: None,
            stretch_scale: 2.0,
        }
    }
}

impl SamplerSettings {
    pub fn validate(&self) -> Result<()> {
        if self.nwalkers < 2 * N_PARAMS || self.nwalkers % 2 != 0 {
            return Err(Error::Config(format!(
                "nwalkers must be even and at least {}, got {}",
                2 * N_PARAMS,
                self.nwalkers
            )));
        }
        if self.niter == 0 {
            return Err(Error::Config("niter must be at least 1".to_string()));
        }
        if !(self.init_scale.is_finite() && self.init_scale > 0.0) {
            return Err(Error::Config(format!(
                "init_scale must be positive, got {}",
                self.init_scale
            )));
        }
        if self.initial_guess.iter().any(|v| !v.is_finite()) {
            return Err(Error::Config(format!(
                "initial_guess must be finite, got {:?}",
                self.initial_guess
            )));
        }
        if self.n_threads == Some(0) {
            return Err(Error::Config("n_threads must be at least 1".to_string()));
        }
        if !(self.stretch_scale.is_finite() && self.stretch_scale > 1.0) {
            return Err(Error::Config(format!(
                "stretch_scale must exceed 1, got {}",
                self.stretch_scale
            )));
        }
        Ok(())
    }
}

/// Locations of the input tables.
///
/// Informational only: reading the files belongs to the program embedding the library.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataPaths {
    pub supernovae: Option<PathBuf>,
    pub supernova_covariance: Option<PathBuf>,
    pub chronometers: Option<PathBuf>,
    pub growth: Option<PathBuf>,
    pub growth_covariance: Option<PathBuf>,
}

/// Everything needed to reproduce a calibration run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub model: ModelConfig,
    pub priors: PriorBounds,
    pub sampler: SamplerSettings,
    pub weights: ChiSquaredWeights,
    pub data: DataPaths,
}

impl RunConfig {
    /// Parse and validate a TOML document. Missing keys take their defaults.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string(self).map_err(|e| Error::Config(e.to_string()))
    }

    pub fn validate(&self) -> Result<()> {
        self.model.validate()?;
        self.priors.validate()?;
        self.sampler.validate()?;
        self.weights.validate()?;

        if !self.priors.contains(&self.sampler.initial_guess) {
            return Err(Error::Config(format!(
                "initial_guess {:?} lies outside the prior",
                self.sampler.initial_guess
            )));
        }
        Ok(())
    }
}
