//! Uniform box priors over the sampled parameters.

use crate::{Error, Result};
use r2ab_core::params::{N_PARAMS, PARAM_NAMES};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Open interval `(lower, upper)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Interval {
    pub lower: f64,
    pub upper: f64,
}

impl Interval {
    pub fn new(lower: f64, upper: f64) -> Result<Self> {
        let interval = Self { lower, upper };
        interval.validate("interval")?;
        Ok(interval)
    }

    fn validate(&self, name: &str) -> Result<()> {
        if !(self.lower.is_finite() && self.upper.is_finite()) {
            return Err(Error::Config(format!(
                "Prior bounds for {} must be finite, got ({}, {})",
                name, self.lower, self.upper
            )));
        }
        if self.lower >= self.upper {
            return Err(Error::Config(format!(
                "Prior lower bound for {} must be below the upper bound, got ({}, {})",
                name, self.lower, self.upper
            )));
        }
        Ok(())
    }

    /// Strict containment. The edges themselves are outside the prior.
    pub fn contains(&self, x: f64) -> bool {
        x > self.lower && x < self.upper
    }

    pub fn width(&self) -> f64 {
        self.upper - self.lower
    }

    /// Uniform draw from the interval.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        self.lower + rng.gen::<f64>() * self.width()
    }
}

/// Box prior: log-prior is 0 strictly inside every interval and −∞ elsewhere.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PriorBounds {
    /// Default: (54, 76)
    pub h0: Interval,
    /// Default: (0.1, 0.5)
    pub omega_m0: Interval,
    /// Default: (0.7, 0.9)
    pub sigma8_0: Interval,
    /// Default: (-20.2, -19.0)
    pub mb: Interval,
    /// Default: (1.6, 12.0)
    pub b: Interval,
}

impl Default for PriorBounds {
    fn default() -> Self {
        Self {
            h0: Interval {
                lower: 54.0,
                upper: 76.0,
            },
            omega_m0: Interval {
                lower: 0.1,
                upper: 0.5,
            },
            sigma8_0: Interval {
                lower: 0.7,
                upper: 0.9,
            },
            mb: Interval {
                lower: -20.2,
                upper: -19.0,
            },
            b: Interval {
                lower: 1.6,
                upper: 12.0,
            },
        }
    }
}

impl PriorBounds {
    /// Intervals in parameter-vector order.
    pub fn intervals(&self) -> [Interval; N_PARAMS] {
        [self.h0, self.omega_m0, self.sigma8_0, self.mb, self.b]
    }

    pub fn validate(&self) -> Result<()> {
        for (interval, name) in self.intervals().iter().zip(PARAM_NAMES) {
            interval.validate(name)?;
        }
        Ok(())
    }

    /// Whether every coordinate lies strictly inside its interval.
    ///
    /// A slice of the wrong length is never inside the box.
    pub fn contains(&self, theta: &[f64]) -> bool {
        theta.len() == N_PARAMS
            && self
                .intervals()
                .iter()
                .zip(theta)
                .all(|(interval, &x)| interval.contains(x))
    }

    pub fn ln_prior(&self, theta: &[f64]) -> f64 {
        if self.contains(theta) {
            0.0
        } else {
            f64::NEG_INFINITY
        }
    }

    /// Draw a point uniformly from the box.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> [f64; N_PARAMS] {
        self.intervals().map(|interval| interval.sample(&mut *rng))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use r2ab_core::ParameterVector;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn test_reference_point_is_inside() {
        let prior = PriorBounds::default();
        prior.validate().unwrap();
        let theta = ParameterVector::reference().to_array();
        assert!(prior.contains(&theta));
        assert_eq!(prior.ln_prior(&theta), 0.0);
    }

    #[test]
    fn test_each_coordinate_outside() {
        let prior = PriorBounds::default();
        let outside = [
            [53.9, 0.3, 0.8, -19.253, 5.0],
            [70.0, 0.6, 0.8, -19.253, 5.0],
            [70.0, 0.3, 0.95, -19.253, 5.0],
            [70.0, 0.3, 0.8, -20.5, 5.0],
            [70.0, 0.3, 0.8, -19.253, 12.5],
        ];
        for theta in outside {
            assert_eq!(prior.ln_prior(&theta), f64::NEG_INFINITY, "{:?}", theta);
        }
    }

    #[test]
    fn test_edges_are_excluded() {
        let prior = PriorBounds::default();
        assert!(!prior.contains(&[54.0, 0.3, 0.8, -19.253, 5.0]));
        assert!(!prior.contains(&[70.0, 0.3, 0.8, -19.253, 12.0]));
        assert!(!prior.contains(&[70.0, 0.3, 0.8, -19.253, f64::NAN]));
        assert!(!prior.contains(&[70.0, 0.3, 0.8]));
    }

    #[test]
    fn test_invalid_bounds_rejected() {
        assert!(Interval::new(1.0, 1.0).is_err());
        assert!(Interval::new(2.0, 1.0).is_err());
        assert!(Interval::new(f64::NEG_INFINITY, 1.0).is_err());

        let prior = PriorBounds {
            b: Interval {
                lower: 12.0,
                upper: 1.6,
            },
            ..Default::default()
        };
        let err = prior.validate().unwrap_err();
        assert!(err.to_string().contains("b"));
    }

    #[test]
    fn test_samples_stay_inside() {
        let prior = PriorBounds::default();
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        for _ in 0..200 {
            let theta = prior.sample(&mut rng);
            for (interval, x) in prior.intervals().iter().zip(theta) {
                assert!(x >= interval.lower && x < interval.upper);
            }
        }
    }

    #[test]
    fn test_partial_deserialization_uses_defaults() {
        let prior: PriorBounds =
            serde_json::from_str(r#"{"h0": {"lower": 60.0, "upper": 80.0}}"#).unwrap();
        assert_eq!(prior.h0.upper, 80.0);
        assert_eq!(prior.b, PriorBounds::default().b);
    }
}
