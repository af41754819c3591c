//! The sampled parameter vector.

use crate::errors::{R2abError, R2abResult};
use crate::FloatValue;
use serde::{Deserialize, Serialize};

/// Number of sampled parameters.
pub const N_PARAMS: usize = 5;

/// Parameter names in the order they appear in position vectors.
pub const PARAM_NAMES: [&str; N_PARAMS] = ["H0", "Om0", "sigma8", "Mb", "b"];

/// One point in parameter space: (H0, Ωm0, σ8(0), Mb, b).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ParameterVector {
    /// Hubble constant (km/s/Mpc) normalising the early-time expansion rate
    pub h0: FloatValue,
    /// Present-day matter density parameter
    pub omega_m0: FloatValue,
    /// Present-day amplitude of matter fluctuations
    pub sigma8_0: FloatValue,
    /// Absolute magnitude of type Ia supernovae
    pub mb: FloatValue,
    /// Shape of the R2-AB transition
    pub b: FloatValue,
}

impl ParameterVector {
    pub const fn new(
        h0: FloatValue,
        omega_m0: FloatValue,
        sigma8_0: FloatValue,
        mb: FloatValue,
        b: FloatValue,
    ) -> Self {
        Self {
            h0,
            omega_m0,
            sigma8_0,
            mb,
            b,
        }
    }

    /// The reference point used to seed sampling: [70, 0.3, 0.8, -19.253, 5].
    pub const fn reference() -> Self {
        Self::new(70.0, 0.3, 0.8, -19.253, 5.0)
    }

    /// Build from a slice ordered as [`PARAM_NAMES`].
    pub fn from_slice(values: &[FloatValue]) -> R2abResult<Self> {
        match values {
            [h0, omega_m0, sigma8_0, mb, b] => Ok(Self::new(*h0, *omega_m0, *sigma8_0, *mb, *b)),
            _ => Err(R2abError::WrongParameterCount {
                expected: N_PARAMS,
                got: values.len(),
            }),
        }
    }

    pub fn to_array(&self) -> [FloatValue; N_PARAMS] {
        [self.h0, self.omega_m0, self.sigma8_0, self.mb, self.b]
    }

    pub fn is_finite(&self) -> bool {
        self.to_array().iter().all(|v| v.is_finite())
    }

    /// Dark energy density implied by flatness.
    pub fn omega_lambda(&self, omega_r0: FloatValue) -> FloatValue {
        1.0 - self.omega_m0 - omega_r0
    }
}

impl From<[FloatValue; N_PARAMS]> for ParameterVector {
    fn from(values: [FloatValue; N_PARAMS]) -> Self {
        Self::new(values[0], values[1], values[2], values[3], values[4])
    }
}
