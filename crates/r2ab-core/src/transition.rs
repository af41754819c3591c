//! The hyperbolic-tangent transition of the R2-AB model.
//!
//! Every equation that involves the transition goes through [`tanh_sat`], which is the only
//! place the overflow guard lives. The tanh is evaluated through `exp(2α)`; beyond
//! `|α| = TANH_SATURATION` it is replaced by its asymptote so the exponential never
//! overflows and `sech²` is exactly zero.

use crate::FloatValue;

/// Magnitude of the transition argument beyond which tanh is treated as saturated.
pub const TANH_SATURATION: FloatValue = 15.0;

/// Saturating hyperbolic tangent.
///
/// Returns ±1 once `|alpha| >= TANH_SATURATION`. NaN propagates.
pub fn tanh_sat(alpha: FloatValue) -> FloatValue {
    if alpha.abs() < TANH_SATURATION {
        let e2 = (2.0 * alpha).exp();
        (e2 - 1.0) / (e2 + 1.0)
    } else {
        alpha.signum()
    }
}

/// Value of the transition function and its derivative at one argument.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transition {
    /// tanh(α)
    pub tanh: FloatValue,
    /// sech²(α) = 1 - tanh²(α)
    pub sech2: FloatValue,
}

impl Transition {
    pub fn at(alpha: FloatValue) -> Self {
        let tanh = tanh_sat(alpha);
        Self {
            tanh,
            sech2: 1.0 - tanh * tanh,
        }
    }

    /// Smooth step S(α) = (1 + tanh α) / 2, equal to one at high curvature.
    pub fn step(&self) -> FloatValue {
        0.5 * (1.0 + self.tanh)
    }

    pub fn is_saturated(&self) -> bool {
        self.sech2 == 0.0
    }
}
