//! Shared fixtures: published chronometer and growth compilations plus mock supernovae
//! drawn from the model itself.

#![allow(dead_code)]

use r2ab_calibrate::{
    ChronometerDataset, DMatrix, GrowthDataset, JointLikelihood, SnObservation, SupernovaDataset,
};
use r2ab_core::{solve, ModelConfig, ParameterVector};
use std::sync::Arc;

/// Cosmic-chronometer H(z) compilation: (z, H, σ) in km/s/Mpc.
pub const CHRONOMETERS: [(f64, f64, f64); 31] = [
    (0.07, 69.0, 19.6),
    (0.09, 69.0, 12.0),
    (0.12, 68.6, 26.2),
    (0.17, 83.0, 8.0),
    (0.179, 75.0, 4.0),
    (0.199, 75.0, 5.0),
    (0.2, 72.9, 29.6),
    (0.27, 77.0, 14.0),
    (0.28, 88.8, 36.6),
    (0.352, 83.0, 14.0),
    (0.3802, 83.0, 13.5),
    (0.4, 95.0, 17.0),
    (0.4004, 77.0, 10.2),
    (0.4247, 87.1, 11.2),
    (0.4497, 92.8, 12.9),
    (0.47, 89.0, 34.0),
    (0.4783, 80.9, 9.0),
    (0.48, 97.0, 62.0),
    (0.593, 104.0, 13.0),
    (0.68, 92.0, 8.0),
    (0.781, 105.0, 12.0),
    (0.875, 125.0, 17.0),
    (0.88, 90.0, 40.0),
    (0.9, 117.0, 23.0),
    (1.037, 154.0, 20.0),
    (1.3, 168.0, 17.0),
    (1.363, 160.0, 33.6),
    (1.43, 177.0, 18.0),
    (1.53, 140.0, 14.0),
    (1.75, 202.0, 40.0),
    (1.965, 186.5, 50.4),
];

/// fσ8 compilation: (z, fσ8, σ). Rows 5-7 are the correlated WiggleZ points.
pub const GROWTH: [(f64, f64, f64); 10] = [
    (0.02, 0.428, 0.0465),
    (0.067, 0.423, 0.055),
    (0.10, 0.370, 0.130),
    (0.17, 0.510, 0.060),
    (0.25, 0.3512, 0.0583),
    (0.44, 0.413, 0.080),
    (0.60, 0.390, 0.063),
    (0.73, 0.437, 0.072),
    (0.86, 0.48, 0.10),
    (1.40, 0.482, 0.116),
];

const WIGGLEZ: [[f64; 3]; 3] = [
    [6.400e-3, 2.570e-3, 0.0],
    [2.570e-3, 3.969e-3, 2.540e-3],
    [0.0, 2.540e-3, 5.184e-3],
];

/// Magnitude uncertainty of each mock supernova.
pub const SN_SIGMA: f64 = 0.12;

pub fn chronometers() -> Arc<ChronometerDataset> {
    let z: Vec<f64> = CHRONOMETERS.iter().map(|r| r.0).collect();
    let h: Vec<f64> = CHRONOMETERS.iter().map(|r| r.1).collect();
    let sigma: Vec<f64> = CHRONOMETERS.iter().map(|r| r.2).collect();
    Arc::new(ChronometerDataset::from_columns(&z, &h, &sigma).unwrap())
}

pub fn growth() -> Arc<GrowthDataset> {
    let n = GROWTH.len();
    let mut covariance = DMatrix::from_fn(n, n, |i, j| {
        if i == j {
            GROWTH[i].2.powi(2)
        } else {
            0.0
        }
    });
    for i in 0..3 {
        for j in 0..3 {
            covariance[(5 + i, 5 + j)] = WIGGLEZ[i][j];
        }
    }

    let z: Vec<f64> = GROWTH.iter().map(|r| r.0).collect();
    let fs8: Vec<f64> = GROWTH.iter().map(|r| r.1).collect();
    let sigma: Vec<f64> = GROWTH.iter().map(|r| r.2).collect();
    Arc::new(GrowthDataset::from_columns(&z, &fs8, &sigma, Some(covariance)).unwrap())
}

/// Supernovae whose magnitudes follow the model at `truth`, with a small deterministic
/// scatter, a weak common-mode covariance and two Cepheid calibrators.
pub fn mock_supernovae(truth: &ParameterVector, n: usize) -> Arc<SupernovaDataset> {
    let solution = solve(truth, &ModelConfig::default()).unwrap();

    let mut observations: Vec<SnObservation> = (0..n)
        .map(|i| {
            let z = 0.01 + 1.4 * (i as f64 / (n - 1) as f64).powi(2);
            let z_hel = z * (1.0 + 1e-3 * (i as f64).cos());
            let scatter = 0.02 * (1.7 * i as f64).sin();
            let m = solution.apparent_magnitude(z, z_hel).unwrap() + scatter;
            SnObservation::new(z, z_hel, m)
        })
        .collect();
    for mu in [31.9, 32.6] {
        observations.push(SnObservation::calibrator(0.004, 0.004, mu + truth.mb, mu));
    }

    let total = observations.len();
    let covariance = DMatrix::from_fn(total, total, |i, j| {
        if i == j {
            SN_SIGMA * SN_SIGMA + 1e-4
        } else {
            1e-4
        }
    });
    Arc::new(SupernovaDataset::new(observations, covariance).unwrap())
}

pub fn truth() -> ParameterVector {
    ParameterVector::reference()
}

/// Likelihood over all three datasets with default weights.
pub fn joint_likelihood() -> JointLikelihood {
    joint_likelihood_with(ModelConfig::default())
}

/// Same datasets as [`joint_likelihood`], solved with `config`.
pub fn joint_likelihood_with(config: ModelConfig) -> JointLikelihood {
    JointLikelihood::new(config)
        .unwrap()
        .with_supernovae(mock_supernovae(&truth(), 40))
        .unwrap()
        .with_chronometers(chronometers())
        .unwrap()
        .with_growth(growth())
        .unwrap()
}
