//! χ² statistics for a solved model against the observation tables.
//!
//! The model is solved once per evaluation and every dataset redshift is interpolated
//! from that solution. Evaluation fails closed: a solver failure or any non-finite
//! intermediate makes the total χ² +∞, which the sampler sees as a rejected proposal.

use crate::dataset::{ChronometerDataset, GrowthDataset, SupernovaDataset};
use crate::{Error, Result};
use nalgebra::DVector;
use r2ab_core::params::ParameterVector;
use r2ab_core::{solve, CosmologySolution, ModelConfig, R2abResult};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Something that can score a parameter vector.
///
/// Implementations must be shareable across the sampler's worker threads.
pub trait LogLikelihood: Send + Sync {
    /// Log-likelihood of `params`, −∞ when the model cannot be evaluated.
    fn ln_likelihood(&self, params: &ParameterVector) -> f64;

    /// Number of evaluations that failed numerically so far.
    fn failures(&self) -> usize {
        0
    }
}

impl<L: LogLikelihood + ?Sized> LogLikelihood for Arc<L> {
    fn ln_likelihood(&self, params: &ParameterVector) -> f64 {
        (**self).ln_likelihood(params)
    }

    fn failures(&self) -> usize {
        (**self).failures()
    }
}

/// Relative weight of each dataset in the total χ².
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChiSquaredWeights {
    /// Default: 1.0
    pub sn: f64,
    /// Default: 1.0
    pub cc: f64,
    /// Default: 1.0
    pub rsd: f64,
}

impl Default for ChiSquaredWeights {
    fn default() -> Self {
        Self {
            sn: 1.0,
            cc: 1.0,
            rsd: 1.0,
        }
    }
}

impl ChiSquaredWeights {
    pub fn validate(&self) -> Result<()> {
        for (name, weight) in [("sn", self.sn), ("cc", self.cc), ("rsd", self.rsd)] {
            if !(weight.is_finite() && weight >= 0.0) {
                return Err(Error::Config(format!(
                    "Weight for {} must be finite and non-negative, got {}",
                    name, weight
                )));
            }
        }
        Ok(())
    }
}

/// Per-dataset χ² for one parameter vector. Absent datasets contribute 0.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChiSquaredBreakdown {
    pub sn: f64,
    pub cc: f64,
    pub rsd: f64,
    pub total: f64,
}

impl ChiSquaredBreakdown {
    fn failed() -> Self {
        Self {
            sn: f64::INFINITY,
            cc: f64::INFINITY,
            rsd: f64::INFINITY,
            total: f64::INFINITY,
        }
    }

    pub fn is_finite(&self) -> bool {
        self.total.is_finite()
    }
}

/// Snapshot of [`JointLikelihood`] evaluation counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EvaluationStats {
    pub evaluations: usize,
    pub solver_failures: usize,
    pub non_finite: usize,
}

#[derive(Debug, Default)]
struct AtomicStats {
    evaluations: AtomicUsize,
    solver_failures: AtomicUsize,
    non_finite: AtomicUsize,
}

/// Sum of the supernova, chronometer and growth χ² for the R2-AB model.
#[derive(Debug)]
pub struct JointLikelihood {
    config: Arc<ModelConfig>,
    supernovae: Option<Arc<SupernovaDataset>>,
    chronometers: Option<Arc<ChronometerDataset>>,
    growth: Option<Arc<GrowthDataset>>,
    weights: ChiSquaredWeights,
    stats: AtomicStats,
}

impl JointLikelihood {
    /// Start from a validated model configuration with no datasets attached.
    pub fn new(config: ModelConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config: Arc::new(config),
            supernovae: None,
            chronometers: None,
            growth: None,
            weights: ChiSquaredWeights::default(),
            stats: AtomicStats::default(),
        })
    }

    pub fn with_supernovae(mut self, dataset: Arc<SupernovaDataset>) -> Result<Self> {
        self.check_range("Supernova", dataset.max_redshift())?;
        self.supernovae = Some(dataset);
        Ok(self)
    }

    pub fn with_chronometers(mut self, dataset: Arc<ChronometerDataset>) -> Result<Self> {
        self.check_range("Chronometer", dataset.max_redshift())?;
        self.chronometers = Some(dataset);
        Ok(self)
    }

    pub fn with_growth(mut self, dataset: Arc<GrowthDataset>) -> Result<Self> {
        self.check_range("Growth", dataset.max_redshift())?;
        self.growth = Some(dataset);
        Ok(self)
    }

    pub fn with_weights(mut self, weights: ChiSquaredWeights) -> Result<Self> {
        weights.validate()?;
        self.weights = weights;
        Ok(self)
    }

    fn check_range(&self, kind: &str, max_redshift: f64) -> Result<()> {
        let z_max = self.config.z_initial();
        if max_redshift > z_max {
            return Err(Error::InvalidData(format!(
                "{} data reaches z={} beyond the integration start z={}",
                kind, max_redshift, z_max
            )));
        }
        Ok(())
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    pub fn weights(&self) -> &ChiSquaredWeights {
        &self.weights
    }

    pub fn has_data(&self) -> bool {
        self.supernovae.is_some() || self.chronometers.is_some() || self.growth.is_some()
    }

    pub fn stats(&self) -> EvaluationStats {
        EvaluationStats {
            evaluations: self.stats.evaluations.load(Ordering::Relaxed),
            solver_failures: self.stats.solver_failures.load(Ordering::Relaxed),
            non_finite: self.stats.non_finite.load(Ordering::Relaxed),
        }
    }

    /// Σ ((H_pred − H_obs) / σ)².
    pub fn chi_cc(&self, solution: &CosmologySolution) -> R2abResult<f64> {
        let Some(dataset) = &self.chronometers else {
            return Ok(0.0);
        };
        let mut chi2 = 0.0;
        for obs in dataset.observations() {
            let pull = (solution.hubble(obs.z)? - obs.hubble) / obs.sigma;
            chi2 += pull * pull;
        }
        Ok(chi2)
    }

    /// Growth χ², correlated when the dataset carries a covariance.
    pub fn chi_rsd(&self, solution: &CosmologySolution) -> R2abResult<f64> {
        let Some(dataset) = &self.growth else {
            return Ok(0.0);
        };
        let observations = dataset.observations();
        let mut residuals = DVector::zeros(observations.len());
        for (i, obs) in observations.iter().enumerate() {
            residuals[i] = solution.f_sigma8(obs.z)? - obs.f_sigma8;
        }

        Ok(match dataset.covariance() {
            Some(factor) => factor.chi_squared(&residuals),
            None => residuals
                .iter()
                .zip(observations)
                .map(|(r, obs)| (r / obs.sigma).powi(2))
                .sum(),
        })
    }

    /// Supernova χ² `rᵀ C⁻¹ r` with `r = m_obs − (μ + Mb)`.
    ///
    /// Calibrator rows use their Cepheid distance modulus in place of the model's.
    pub fn chi2_sn(&self, solution: &CosmologySolution) -> R2abResult<f64> {
        let Some(dataset) = &self.supernovae else {
            return Ok(0.0);
        };
        let mb = solution.params().mb;
        let observations = dataset.observations();
        let mut residuals = DVector::zeros(observations.len());
        for (i, obs) in observations.iter().enumerate() {
            let mu = match obs.cepheid_mu {
                Some(mu) => mu,
                None => solution.distance_modulus(obs.z_hd, obs.z_hel)?,
            };
            residuals[i] = obs.m_obs - (mu + mb);
        }
        Ok(dataset.covariance().chi_squared(&residuals))
    }

    /// Per-dataset χ² for `params`, solving the model once.
    pub fn breakdown(&self, params: &ParameterVector) -> ChiSquaredBreakdown {
        self.stats.evaluations.fetch_add(1, Ordering::Relaxed);

        let components = solve(params, &self.config).and_then(|solution| {
            Ok((
                self.chi2_sn(&solution)?,
                self.chi_cc(&solution)?,
                self.chi_rsd(&solution)?,
            ))
        });
        let (sn, cc, rsd) = match components {
            Ok(components) => components,
            Err(e) => {
                self.stats.solver_failures.fetch_add(1, Ordering::Relaxed);
                debug!(params = ?params.to_array(), error = %e, "Model evaluation failed");
                return ChiSquaredBreakdown::failed();
            }
        };

        let total = self.weights.sn * sn + self.weights.cc * cc + self.weights.rsd * rsd;
        if !total.is_finite() {
            self.stats.non_finite.fetch_add(1, Ordering::Relaxed);
            debug!(params = ?params.to_array(), sn, cc, rsd, "Non-finite chi-squared");
            return ChiSquaredBreakdown {
                sn,
                cc,
                rsd,
                total: f64::INFINITY,
            };
        }

        ChiSquaredBreakdown { sn, cc, rsd, total }
    }

    /// Weighted total χ², +∞ on any failure.
    pub fn chi_tot(&self, params: &ParameterVector) -> f64 {
        self.breakdown(params).total
    }
}

impl LogLikelihood for JointLikelihood {
    fn ln_likelihood(&self, params: &ParameterVector) -> f64 {
        -0.5 * self.chi_tot(params)
    }

    fn failures(&self) -> usize {
        let stats = self.stats();
        stats.solver_failures + stats.non_finite
    }
}
