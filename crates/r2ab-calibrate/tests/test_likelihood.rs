//! Likelihood and posterior behaviour against realistic datasets.

mod common;

use approx::assert_relative_eq;
use r2ab_calibrate::{
    ChiSquaredWeights, JointLikelihood, LogLikelihood, LogPosterior, Posterior, PriorBounds,
};
use r2ab_core::{ModelConfig, ParameterVector};

mod chi_squared {
    use super::*;

    #[test]
    fn test_reference_point_is_finite_and_positive() {
        let likelihood = common::joint_likelihood();
        let breakdown = likelihood.breakdown(&common::truth());

        assert!(breakdown.is_finite());
        assert!(breakdown.total > 0.0);
        assert!(breakdown.sn > 0.0 && breakdown.cc > 0.0 && breakdown.rsd > 0.0);
        assert_relative_eq!(
            breakdown.total,
            breakdown.sn + breakdown.cc + breakdown.rsd,
            max_relative = 1e-12
        );
        // Mock supernovae scatter by at most 0.02 mag around the truth
        assert!(breakdown.sn < 40.0 * (0.02f64 / common::SN_SIGMA).powi(2) + 1e-6);
        assert_eq!(likelihood.stats().solver_failures, 0);
    }

    #[test]
    fn test_degrades_monotonically_away_from_truth() {
        let likelihood = JointLikelihood::new(ModelConfig::default())
            .unwrap()
            .with_supernovae(common::mock_supernovae(&common::truth(), 40))
            .unwrap();

        let chi2: Vec<f64> = [0.0, 0.05, 0.1, 0.2, 0.4]
            .iter()
            .map(|shift| {
                let mut params = common::truth();
                params.mb += shift;
                likelihood.chi_tot(&params)
            })
            .collect();
        assert!(chi2.windows(2).all(|w| w[1] > w[0]), "{:?}", chi2);

        let chi2: Vec<f64> = [70.0, 71.0, 72.5, 75.0]
            .iter()
            .map(|&h0| {
                likelihood.chi_tot(&ParameterVector {
                    h0,
                    ..common::truth()
                })
            })
            .collect();
        assert!(chi2.windows(2).all(|w| w[1] > w[0]), "{:?}", chi2);
    }

    #[test]
    fn test_weights_select_datasets() {
        let params = common::truth();
        let full = common::joint_likelihood().breakdown(&params);
        let growth_only = common::joint_likelihood()
            .with_weights(ChiSquaredWeights {
                sn: 0.0,
                cc: 0.0,
                rsd: 1.0,
            })
            .unwrap()
            .chi_tot(&params);
        assert_relative_eq!(growth_only, full.rsd, max_relative = 1e-12);
    }

    #[test]
    fn test_evaluation_is_deterministic() {
        let likelihood = common::joint_likelihood();
        let params = ParameterVector::new(67.0, 0.32, 0.78, -19.4, 8.0);
        assert_eq!(
            likelihood.chi_tot(&params).to_bits(),
            likelihood.chi_tot(&params).to_bits()
        );
    }
}

mod posterior {
    use super::*;

    #[test]
    fn test_prior_box() {
        let posterior = Posterior::new(PriorBounds::default(), common::joint_likelihood()).unwrap();
        let reference = common::truth().to_array();
        assert_eq!(posterior.ln_prior(&reference), 0.0);

        let bounds = [(54.0, 76.0), (0.1, 0.5), (0.7, 0.9), (-20.2, -19.0), (1.6, 12.0)];
        for (i, (lower, upper)) in bounds.iter().enumerate() {
            for value in [*lower, *upper, lower - 1e-9, upper + 1e-9] {
                let mut theta = reference;
                theta[i] = value;
                assert_eq!(posterior.ln_prior(&theta), f64::NEG_INFINITY);
            }
        }
    }

    #[test]
    fn test_outside_prior_never_solves_the_model() {
        let posterior = Posterior::new(PriorBounds::default(), common::joint_likelihood()).unwrap();

        for theta in [
            [50.0, 0.3, 0.8, -19.253, 5.0],
            [70.0, 0.3, 0.8, -19.253, 15.0],
            [70.0, 0.05, 0.8, -19.253, 5.0],
        ] {
            assert_eq!(posterior.ln_prob(&theta), f64::NEG_INFINITY);
        }
        assert_eq!(posterior.likelihood().stats().evaluations, 0);
        assert_eq!(posterior.counts().prior_rejections, 3);

        let inside = posterior.ln_prob(&common::truth().to_array());
        assert!(inside.is_finite() && inside < 0.0);
        assert_eq!(posterior.likelihood().stats().evaluations, 1);
        assert_relative_eq!(
            inside,
            posterior.likelihood().ln_likelihood(&common::truth()),
            max_relative = 1e-12
        );
    }

    #[test]
    fn test_upper_b_edge_is_stable() {
        let posterior = Posterior::new(PriorBounds::default(), common::joint_likelihood()).unwrap();
        let lp = posterior.ln_prob(&[70.0, 0.3, 0.8, -19.253, 11.999]);
        assert!(lp.is_finite());
        assert_eq!(posterior.counts().likelihood_failures, 0);
    }
}
