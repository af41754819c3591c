//! Observation tables consumed by the likelihood.
//!
//! Every dataset is validated when it is built and is immutable afterwards, so a single
//! instance can be shared (behind an `Arc`) by every walker for the whole run.

use crate::{Error, Result};
use nalgebra::{Cholesky, DMatrix, DVector};
use serde::{Deserialize, Serialize};

/// Relative asymmetry tolerated in a covariance matrix.
const SYMMETRY_TOLERANCE: f64 = 1e-10;

/// Lower Cholesky factor `L` of a covariance matrix `C = L Lᵀ`.
///
/// Factorised once; every χ² evaluation is then a single triangular solve.
#[derive(Debug, Clone, PartialEq)]
pub struct CovarianceFactor {
    lower: DMatrix<f64>,
}

impl CovarianceFactor {
    pub fn new(covariance: DMatrix<f64>) -> Result<Self> {
        let (rows, cols) = covariance.shape();
        if rows != cols || rows == 0 {
            return Err(Error::InvalidData(format!(
                "Covariance matrix must be square and non-empty, got {}x{}",
                rows, cols
            )));
        }
        if covariance.iter().any(|v| !v.is_finite()) {
            return Err(Error::InvalidData(
                "Covariance matrix contains non-finite values".to_string(),
            ));
        }

        let scale = covariance.amax();
        for i in 0..rows {
            for j in (i + 1)..cols {
                if (covariance[(i, j)] - covariance[(j, i)]).abs() > SYMMETRY_TOLERANCE * scale {
                    return Err(Error::InvalidData(format!(
                        "Covariance matrix is not symmetric at ({}, {})",
                        i, j
                    )));
                }
            }
        }

        let lower = Cholesky::new(covariance)
            .ok_or_else(|| {
                Error::InvalidData("Covariance matrix is not positive definite".to_string())
            })?
            .unpack();

        Ok(Self { lower })
    }

    /// Factor of a diagonal covariance built from per-point uncertainties.
    pub fn from_sigmas(sigmas: &[f64]) -> Result<Self> {
        if let Some(sigma) = sigmas.iter().find(|s| !(s.is_finite() && **s > 0.0)) {
            return Err(Error::InvalidData(format!(
                "Uncertainties must be positive and finite, got {}",
                sigma
            )));
        }
        let variances = DVector::from_iterator(sigmas.len(), sigmas.iter().map(|s| s * s));
        Self::new(DMatrix::from_diagonal(&variances))
    }

    pub fn dim(&self) -> usize {
        self.lower.nrows()
    }

    pub fn lower(&self) -> &DMatrix<f64> {
        &self.lower
    }

    /// `rᵀ C⁻¹ r`, or +∞ if the residuals cannot be whitened.
    pub fn chi_squared(&self, residuals: &DVector<f64>) -> f64 {
        if residuals.len() != self.dim() {
            return f64::INFINITY;
        }
        match self.lower.solve_lower_triangular(residuals) {
            Some(whitened) => whitened.norm_squared(),
            None => f64::INFINITY,
        }
    }
}

/// One type Ia supernova.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SnObservation {
    /// CMB-frame (Hubble diagram) redshift
    pub z_hd: f64,
    /// Heliocentric redshift
    pub z_hel: f64,
    /// Observed apparent magnitude
    pub m_obs: f64,
    /// Distance modulus of the Cepheid host, for calibrator rows
    #[serde(default)]
    pub cepheid_mu: Option<f64>,
}

impl SnObservation {
    pub fn new(z_hd: f64, z_hel: f64, m_obs: f64) -> Self {
        Self {
            z_hd,
            z_hel,
            m_obs,
            cepheid_mu: None,
        }
    }

    pub fn calibrator(z_hd: f64, z_hel: f64, m_obs: f64, cepheid_mu: f64) -> Self {
        Self {
            cepheid_mu: Some(cepheid_mu),
            ..Self::new(z_hd, z_hel, m_obs)
        }
    }

    pub fn is_calibrator(&self) -> bool {
        self.cepheid_mu.is_some()
    }
}

/// Supernova apparent magnitudes with a dense covariance matrix.
#[derive(Debug, Clone)]
pub struct SupernovaDataset {
    observations: Vec<SnObservation>,
    covariance: CovarianceFactor,
}

impl SupernovaDataset {
    pub fn new(observations: Vec<SnObservation>, covariance: DMatrix<f64>) -> Result<Self> {
        if observations.is_empty() {
            return Err(Error::InvalidData(
                "Supernova dataset has no observations".to_string(),
            ));
        }
        for (i, obs) in observations.iter().enumerate() {
            let finite = obs.z_hd.is_finite()
                && obs.z_hel.is_finite()
                && obs.m_obs.is_finite()
                && obs.cepheid_mu.map_or(true, f64::is_finite);
            if !finite {
                return Err(Error::InvalidData(format!(
                    "Supernova {} contains non-finite values",
                    i
                )));
            }
            if obs.z_hd <= 0.0 || obs.z_hel <= -1.0 {
                return Err(Error::InvalidData(format!(
                    "Supernova {} has an invalid redshift (z_hd={}, z_hel={})",
                    i, obs.z_hd, obs.z_hel
                )));
            }
        }
        if covariance.shape() != (observations.len(), observations.len()) {
            return Err(Error::InvalidData(format!(
                "Supernova covariance has shape {:?}, expected ({n}, {n})",
                covariance.shape(),
                n = observations.len()
            )));
        }

        Ok(Self {
            observations,
            covariance: CovarianceFactor::new(covariance)?,
        })
    }

    pub fn observations(&self) -> &[SnObservation] {
        &self.observations
    }

    pub fn covariance(&self) -> &CovarianceFactor {
        &self.covariance
    }

    pub fn len(&self) -> usize {
        self.observations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }

    pub fn n_calibrators(&self) -> usize {
        self.observations.iter().filter(|o| o.is_calibrator()).count()
    }

    /// Largest redshift at which the model has to be evaluated.
    pub fn max_redshift(&self) -> f64 {
        self.observations
            .iter()
            .filter(|o| !o.is_calibrator())
            .map(|o| o.z_hd)
            .fold(0.0, f64::max)
    }
}

/// A single H(z) measurement.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HubbleObservation {
    pub z: f64,
    /// km/s/Mpc
    pub hubble: f64,
    pub sigma: f64,
}

/// Cosmic-chronometer expansion-rate measurements with independent errors.
#[derive(Debug, Clone)]
pub struct ChronometerDataset {
    observations: Vec<HubbleObservation>,
}

impl ChronometerDataset {
    pub fn new(observations: Vec<HubbleObservation>) -> Result<Self> {
        if observations.is_empty() {
            return Err(Error::InvalidData(
                "Chronometer dataset has no observations".to_string(),
            ));
        }
        for (i, obs) in observations.iter().enumerate() {
            validate_point("Chronometer", i, obs.z, obs.hubble, obs.sigma)?;
        }
        Ok(Self { observations })
    }

    /// Build from parallel columns.
    pub fn from_columns(z: &[f64], hubble: &[f64], sigma: &[f64]) -> Result<Self> {
        check_columns("Chronometer", z.len(), hubble.len(), sigma.len())?;
        Self::new(
            z.iter()
                .zip(hubble)
                .zip(sigma)
                .map(|((&z, &hubble), &sigma)| HubbleObservation { z, hubble, sigma })
                .collect(),
        )
    }

    pub fn observations(&self) -> &[HubbleObservation] {
        &self.observations
    }

    pub fn len(&self) -> usize {
        self.observations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }

    pub fn max_redshift(&self) -> f64 {
        self.observations.iter().map(|o| o.z).fold(0.0, f64::max)
    }
}

/// A single fσ8(z) measurement.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GrowthObservation {
    pub z: f64,
    pub f_sigma8: f64,
    pub sigma: f64,
}

/// Redshift-space-distortion growth measurements, optionally correlated.
#[derive(Debug, Clone)]
pub struct GrowthDataset {
    observations: Vec<GrowthObservation>,
    covariance: Option<CovarianceFactor>,
}

impl GrowthDataset {
    pub fn new(
        observations: Vec<GrowthObservation>,
        covariance: Option<DMatrix<f64>>,
    ) -> Result<Self> {
        if observations.is_empty() {
            return Err(Error::InvalidData(
                "Growth dataset has no observations".to_string(),
            ));
        }
        for (i, obs) in observations.iter().enumerate() {
            validate_point("Growth", i, obs.z, obs.f_sigma8, obs.sigma)?;
        }

        let covariance = match covariance {
            Some(matrix) => {
                if matrix.shape() != (observations.len(), observations.len()) {
                    return Err(Error::InvalidData(format!(
                        "Growth covariance has shape {:?}, expected ({n}, {n})",
                        matrix.shape(),
                        n = observations.len()
                    )));
                }
                Some(CovarianceFactor::new(matrix)?)
            }
            None => None,
        };

        Ok(Self {
            observations,
            covariance,
        })
    }

    pub fn from_columns(
        z: &[f64],
        f_sigma8: &[f64],
        sigma: &[f64],
        covariance: Option<DMatrix<f64>>,
    ) -> Result<Self> {
        check_columns("Growth", z.len(), f_sigma8.len(), sigma.len())?;
        Self::new(
            z.iter()
                .zip(f_sigma8)
                .zip(sigma)
                .map(|((&z, &f_sigma8), &sigma)| GrowthObservation { z, f_sigma8, sigma })
                .collect(),
            covariance,
        )
    }

    pub fn observations(&self) -> &[GrowthObservation] {
        &self.observations
    }

    pub fn covariance(&self) -> Option<&CovarianceFactor> {
        self.covariance.as_ref()
    }

    pub fn len(&self) -> usize {
        self.observations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }

    pub fn max_redshift(&self) -> f64 {
        self.observations.iter().map(|o| o.z).fold(0.0, f64::max)
    }
}

fn validate_point(kind: &str, index: usize, z: f64, value: f64, sigma: f64) -> Result<()> {
    if !(z.is_finite() && value.is_finite() && sigma.is_finite()) {
        return Err(Error::InvalidData(format!(
            "{} point {} contains non-finite values",
            kind, index
        )));
    }
    if z < 0.0 {
        return Err(Error::InvalidData(format!(
            "{} point {} has negative redshift {}",
            kind, index, z
        )));
    }
    if sigma <= 0.0 {
        return Err(Error::InvalidData(format!(
            "{} point {} has non-positive uncertainty {}",
            kind, index, sigma
        )));
    }
    Ok(())
}

fn check_columns(kind: &str, z: usize, values: usize, sigma: usize) -> Result<()> {
    if z != values || z != sigma {
        return Err(Error::InvalidData(format!(
            "{} columns have mismatched lengths: z={}, values={}, sigma={}",
            kind, z, values, sigma
        )));
    }
    Ok(())
}
