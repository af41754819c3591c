//! Model constants and solver settings.
//!
//! Nothing in here is sampled. A [`ModelConfig`] is built once at start-up and passed by
//! reference into every solve, so there is no ambient global state.

use crate::errors::{R2abError, R2abResult};
use crate::{FloatValue, Time};
use serde::{Deserialize, Serialize};

/// Speed of light in km/s, used to express distances in Mpc.
pub const C_KM_S: FloatValue = 299_792.458;

/// Convert a redshift to the internal time coordinate (the scale factor).
pub fn redshift_to_time(z: FloatValue) -> Time {
    1.0 / (1.0 + z)
}

/// Convert the internal time coordinate back to a redshift.
pub fn time_to_redshift(t: Time) -> FloatValue {
    1.0 / t - 1.0
}

/// Integration method used for both ODE systems.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SolverMethod {
    /// Linearly-implicit Rosenbrock method of order 4(3), suited to stiff systems
    #[default]
    Rosenbrock4,
    /// Explicit Dormand-Prince 8(5,3) from `ode_solvers`
    Dop853,
}

/// Tolerances and limits applied to every integration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverSettings {
    /// Integration method.
    /// Default: Rosenbrock4
    pub method: SolverMethod,

    /// Relative tolerance.
    ///
    /// `Rosenbrock4` applies it per unit of integration time, so it bounds the
    /// accumulated error over the whole range rather than the error of one step.
    /// Default: 1e-6
    pub rtol: FloatValue,

    /// Absolute tolerance.
    /// Default: 1e-10
    pub atol: FloatValue,

    /// Ceiling on the number of attempted steps for a single integration.
    /// Default: 50000
    pub max_steps: usize,

    /// Minimum number of steps across the integration range.
    ///
    /// Steps are capped at `(t_final - t_initial) / output_points`, which keeps the
    /// Hermite interpolant between nodes as accurate as the nodes themselves.
    /// Default: 400
    pub output_points: usize,
}

impl Default for SolverSettings {
    fn default() -> Self {
        Self {
            method: SolverMethod::default(),
            rtol: 1e-6,
            atol: 1e-10,
            max_steps: 50_000,
            output_points: 400,
        }
    }
}

/// Fixed constants of the R2-AB model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Regularization wavenumber of the growth equation, in units of H0/c.
    /// This is not a spatial curvature; the geometry is always flat.
    /// Default: 100.0
    pub k: FloatValue,

    /// Transition scale of the tanh argument, in units of H0^2.
    /// Default: 1.0
    pub delta: FloatValue,

    /// Present-day radiation density parameter.
    /// Default: 0.0
    pub omega_r0: FloatValue,

    /// Speed of light in the units used inside the ODEs.
    /// Default: 1.0
    pub speed_of_light: FloatValue,

    /// Internal time (scale factor) at which integration starts.
    /// Default: 0.2 (z = 4)
    pub t_initial: Time,

    /// Internal time at which integration stops.
    /// Default: 1.0 (today)
    pub t_final: Time,

    /// Solver tolerances and limits.
    pub solver: SolverSettings,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            k: 100.0,
            delta: 1.0,
            omega_r0: 0.0,
            speed_of_light: 1.0,
            t_initial: 0.2,
            t_final: 1.0,
            solver: SolverSettings::default(),
        }
    }
}

impl ModelConfig {
    /// Redshift at which the integration starts.
    pub fn z_initial(&self) -> FloatValue {
        time_to_redshift(self.t_initial)
    }

    /// Redshift at which the integration stops.
    pub fn z_final(&self) -> FloatValue {
        time_to_redshift(self.t_final)
    }

    /// Check that the constants describe a usable model.
    pub fn validate(&self) -> R2abResult<()> {
        let values = [
            ("k", self.k),
            ("delta", self.delta),
            ("omega_r0", self.omega_r0),
            ("speed_of_light", self.speed_of_light),
            ("t_initial", self.t_initial),
            ("t_final", self.t_final),
            ("solver.rtol", self.solver.rtol),
            ("solver.atol", self.solver.atol),
        ];
        if let Some((name, value)) = values.iter().find(|(_, v)| !v.is_finite()) {
            return Err(R2abError::InvalidConfig(format!(
                "{} must be finite, got {}",
                name, value
            )));
        }

        if self.delta <= 0.0 {
            return Err(R2abError::InvalidConfig(format!(
                "delta must be positive, got {}",
                self.delta
            )));
        }
        if self.k < 0.0 {
            return Err(R2abError::InvalidConfig(format!(
                "k must be non-negative, got {}",
                self.k
            )));
        }
        if !(0.0..1.0).contains(&self.omega_r0) {
            return Err(R2abError::InvalidConfig(format!(
                "omega_r0 must lie in [0, 1), got {}",
                self.omega_r0
            )));
        }
        if self.speed_of_light <= 0.0 {
            return Err(R2abError::InvalidConfig(format!(
                "speed_of_light must be positive, got {}",
                self.speed_of_light
            )));
        }
        if !(self.t_initial > 0.0 && self.t_initial < self.t_final && self.t_final <= 1.0) {
            return Err(R2abError::InvalidConfig(format!(
                "Integration range must satisfy 0 < t_initial < t_final <= 1, got [{}, {}]",
                self.t_initial, self.t_final
            )));
        }
        if self.solver.rtol <= 0.0 || self.solver.atol <= 0.0 {
            return Err(R2abError::InvalidConfig(format!(
                "Solver tolerances must be positive, got rtol={} atol={}",
                self.solver.rtol, self.solver.atol
            )));
        }
        if self.solver.max_steps == 0 {
            return Err(R2abError::InvalidConfig(
                "solver.max_steps must be at least 1".to_string(),
            ));
        }
        if self.solver.output_points < 2 {
            return Err(R2abError::InvalidConfig(format!(
                "solver.output_points must be at least 2, got {}",
                self.solver.output_points
            )));
        }

        Ok(())
    }
}
