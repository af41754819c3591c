//! Log-posterior: box prior plus likelihood.

use crate::likelihood::LogLikelihood;
use crate::prior::PriorBounds;
use crate::Result;
use r2ab_core::params::{ParameterVector, N_PARAMS};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Target density explored by the ensemble sampler.
pub trait LogPosterior: Send + Sync {
    fn n_params(&self) -> usize;

    fn ln_prior(&self, theta: &[f64]) -> f64;

    /// Log-posterior, −∞ outside the support.
    fn ln_prob(&self, theta: &[f64]) -> f64;
}

/// Snapshot of posterior evaluation counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EvaluationCounts {
    /// Points rejected by the prior without touching the likelihood
    pub prior_rejections: usize,
    /// Likelihood invocations
    pub likelihood_calls: usize,
    /// Likelihood evaluations that failed numerically
    pub likelihood_failures: usize,
}

/// Box prior combined with a likelihood.
///
/// The likelihood is only invoked for points strictly inside the prior box.
#[derive(Debug)]
pub struct Posterior<L> {
    prior: PriorBounds,
    likelihood: L,
    prior_rejections: AtomicUsize,
    likelihood_calls: AtomicUsize,
}

impl<L: LogLikelihood> Posterior<L> {
    pub fn new(prior: PriorBounds, likelihood: L) -> Result<Self> {
        prior.validate()?;
        Ok(Self {
            prior,
            likelihood,
            prior_rejections: AtomicUsize::new(0),
            likelihood_calls: AtomicUsize::new(0),
        })
    }

    pub fn prior(&self) -> &PriorBounds {
        &self.prior
    }

    pub fn likelihood(&self) -> &L {
        &self.likelihood
    }

    /// −0.5 χ², or −∞ for a malformed vector.
    pub fn ln_like(&self, theta: &[f64]) -> f64 {
        match ParameterVector::from_slice(theta) {
            Ok(params) => self.likelihood.ln_likelihood(&params),
            Err(_) => f64::NEG_INFINITY,
        }
    }

    pub fn counts(&self) -> EvaluationCounts {
        EvaluationCounts {
            prior_rejections: self.prior_rejections.load(Ordering::Relaxed),
            likelihood_calls: self.likelihood_calls.load(Ordering::Relaxed),
            likelihood_failures: self.likelihood.failures(),
        }
    }
}

impl<L: LogLikelihood> LogPosterior for Posterior<L> {
    fn n_params(&self) -> usize {
        N_PARAMS
    }

    fn ln_prior(&self, theta: &[f64]) -> f64 {
        self.prior.ln_prior(theta)
    }

    fn ln_prob(&self, theta: &[f64]) -> f64 {
        let lp = self.ln_prior(theta);
        if !lp.is_finite() {
            self.prior_rejections.fetch_add(1, Ordering::Relaxed);
            return f64::NEG_INFINITY;
        }

        self.likelihood_calls.fetch_add(1, Ordering::Relaxed);
        let ll = self.ln_like(theta);
        if ll.is_nan() {
            return f64::NEG_INFINITY;
        }
        lp + ll
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Records how often it is called and returns a fixed value.
    #[derive(Default)]
    struct Probe {
        calls: AtomicUsize,
        value: f64,
    }

    impl LogLikelihood for Probe {
        fn ln_likelihood(&self, _params: &ParameterVector) -> f64 {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.value
        }
    }

    #[test]
    fn test_prior_short_circuits_likelihood() {
        let posterior = Posterior::new(PriorBounds::default(), Probe::default()).unwrap();

        let outside = [80.0, 0.3, 0.8, -19.253, 5.0];
        assert_eq!(posterior.ln_prob(&outside), f64::NEG_INFINITY);
        assert_eq!(posterior.likelihood().calls.load(Ordering::SeqCst), 0);

        let inside = ParameterVector::reference().to_array();
        assert_eq!(posterior.ln_prob(&inside), 0.0);
        assert_eq!(posterior.likelihood().calls.load(Ordering::SeqCst), 1);

        let counts = posterior.counts();
        assert_eq!(counts.prior_rejections, 1);
        assert_eq!(counts.likelihood_calls, 1);
        assert_eq!(counts.likelihood_failures, 0);
    }

    #[test]
    fn test_ln_prob_adds_prior_and_likelihood() {
        let posterior = Posterior::new(
            PriorBounds::default(),
            Probe {
                value: -12.5,
                ..Default::default()
            },
        )
        .unwrap();
        let theta = ParameterVector::reference().to_array();
        assert_eq!(posterior.ln_prob(&theta), -12.5);
        assert_eq!(posterior.n_params(), 5);
    }

    #[test]
    fn test_nan_likelihood_is_rejected() {
        let posterior = Posterior::new(
            PriorBounds::default(),
            Probe {
                value: f64::NAN,
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(
            posterior.ln_prob(&ParameterVector::reference().to_array()),
            f64::NEG_INFINITY
        );
    }

    #[test]
    fn test_wrong_length_is_outside_support() {
        let posterior = Posterior::new(PriorBounds::default(), Probe::default()).unwrap();
        assert_eq!(posterior.ln_prob(&[70.0, 0.3]), f64::NEG_INFINITY);
        assert_eq!(posterior.ln_like(&[70.0, 0.3]), f64::NEG_INFINITY);
        assert_eq!(posterior.likelihood().calls.load(Ordering::SeqCst), 0);
    }
}
