//! Mapping solved trajectories onto redshift-indexed observables.

use crate::config::{redshift_to_time, time_to_redshift, ModelConfig, C_KM_S};
use crate::errors::{R2abError, R2abResult};
use crate::params::ParameterVector;
use crate::trajectory::Trajectory;
use crate::{FloatValue, Time};

/// Redshift slack when checking a query against the integration range.
const REDSHIFT_TOLERANCE: FloatValue = 1e-12;

/// The solved background and growth histories for a single parameter vector.
///
/// All observables are interpolated from the same dense trajectories, so a likelihood
/// evaluation solves the model once and reads every dataset redshift from it.
#[derive(Debug, Clone)]
pub struct CosmologySolution {
    params: ParameterVector,
    distance_unit: FloatValue,
    z_min: FloatValue,
    z_max: FloatValue,
    background: Trajectory<2>,
    growth: Trajectory<2>,
}

impl CosmologySolution {
    pub fn new(
        params: ParameterVector,
        config: &ModelConfig,
        background: Trajectory<2>,
        growth: Trajectory<2>,
    ) -> R2abResult<Self> {
        let delta_today = growth.last()[0];
        if !(delta_today > 0.0) {
            return Err(R2abError::Unphysical {
                t: growth.end(),
                reason: format!("growth factor today is {}", delta_today),
            });
        }

        Ok(Self {
            params,
            distance_unit: C_KM_S / config.speed_of_light,
            z_min: time_to_redshift(background.end().max(growth.end())),
            z_max: time_to_redshift(background.start().min(growth.start())),
            background,
            growth,
        })
    }

    pub fn params(&self) -> &ParameterVector {
        &self.params
    }

    pub fn background(&self) -> &Trajectory<2> {
        &self.background
    }

    pub fn growth(&self) -> &Trajectory<2> {
        &self.growth
    }

    /// Redshift interval on which observables are defined.
    pub fn redshift_range(&self) -> (FloatValue, FloatValue) {
        (self.z_min, self.z_max)
    }

    fn time_at(&self, z: FloatValue) -> R2abResult<Time> {
        if !(z >= self.z_min - REDSHIFT_TOLERANCE && z <= self.z_max + REDSHIFT_TOLERANCE) {
            return Err(R2abError::ExtrapolationNotAllowed {
                target: z,
                start: self.z_min,
                end: self.z_max,
            });
        }
        Ok(redshift_to_time(z).clamp(self.background.start(), self.background.end()))
    }

    /// Expansion rate H(z) in km/s/Mpc.
    pub fn hubble(&self, z: FloatValue) -> R2abResult<FloatValue> {
        let t = self.time_at(z)?;
        Ok(self.background.value_at(t)?[0])
    }

    /// Logarithmic growth rate f = d ln δ / d ln a.
    pub fn growth_rate(&self, z: FloatValue) -> R2abResult<FloatValue> {
        let t = self.time_at(z)?;
        let state = self.growth.value_at(t)?;
        Ok(t * state[1] / state[0])
    }

    /// fσ8(z) = σ8(0) a δ'(a) / δ(today).
    pub fn f_sigma8(&self, z: FloatValue) -> R2abResult<FloatValue> {
        let t = self.time_at(z)?;
        let state = self.growth.value_at(t)?;
        Ok(self.params.sigma8_0 * t * state[1] / self.growth.last()[0])
    }

    /// Line-of-sight comoving distance in Mpc.
    pub fn comoving_distance(&self, z: FloatValue) -> R2abResult<FloatValue> {
        let t = self.time_at(z)?;
        let distance = self.background.last()[1] - self.background.value_at(t)?[1];
        Ok(self.distance_unit * distance)
    }

    /// Luminosity distance in Mpc using the CMB-frame redshift for the distance integral
    /// and the heliocentric redshift for the (1 + z) factor.
    pub fn luminosity_distance(&self, z_hd: FloatValue, z_hel: FloatValue) -> R2abResult<FloatValue> {
        Ok((1.0 + z_hel) * self.comoving_distance(z_hd)?)
    }

    pub fn distance_modulus(&self, z_hd: FloatValue, z_hel: FloatValue) -> R2abResult<FloatValue> {
        let d_l = self.luminosity_distance(z_hd, z_hel)?;
        if !(d_l > 0.0) {
            return Err(R2abError::Unphysical {
                t: redshift_to_time(z_hd),
                reason: format!("luminosity distance {} is not positive", d_l),
            });
        }
        Ok(5.0 * d_l.log10() + 25.0)
    }

    /// Predicted apparent magnitude, μ + Mb.
    pub fn apparent_magnitude(&self, z_hd: FloatValue, z_hel: FloatValue) -> R2abResult<FloatValue> {
        Ok(self.distance_modulus(z_hd, z_hel)? + self.params.mb)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::solve;
    use approx::assert_relative_eq;

    fn gr_limit() -> (ParameterVector, CosmologySolution) {
        let params = ParameterVector::new(70.0, 0.3, 0.8, -19.3, -200.0);
        let solution = solve(&params, &ModelConfig::default()).unwrap();
        (params, solution)
    }

    fn reference_hubble(z: f64) -> f64 {
        70.0 * (0.3 * (1.0 + z).powi(3) + 0.7).sqrt()
    }

    /// Composite Simpson rule for ∫ c / H dz
    fn reference_distance(z: f64) -> f64 {
        let n = 2000;
        let h = z / n as f64;
        let mut total = 1.0 / reference_hubble(0.0) + 1.0 / reference_hubble(z);
        for i in 1..n {
            let weight = if i % 2 == 1 { 4.0 } else { 2.0 };
            total += weight / reference_hubble(i as f64 * h);
        }
        C_KM_S * total * h / 3.0
    }

    #[test]
    fn test_hubble_today_is_h0_in_gr_limit() {
        let (_, solution) = gr_limit();
        assert_relative_eq!(solution.hubble(0.0).unwrap(), 70.0, max_relative = 1e-5);
        assert_relative_eq!(
            solution.hubble(1.0).unwrap(),
            reference_hubble(1.0),
            max_relative = 1e-5
        );
    }

    #[test]
    fn test_comoving_distance_matches_quadrature() {
        let (_, solution) = gr_limit();
        assert_eq!(solution.comoving_distance(0.0).unwrap(), 0.0);
        for z in [0.05, 0.5, 1.0, 2.3] {
            assert_relative_eq!(
                solution.comoving_distance(z).unwrap(),
                reference_distance(z),
                max_relative = 1e-4
            );
        }
    }

    #[test]
    fn test_distance_modulus_and_magnitude() {
        let (params, solution) = gr_limit();
        let d_l = solution.luminosity_distance(0.1, 0.101).unwrap();
        assert_relative_eq!(
            d_l,
            1.101 * solution.comoving_distance(0.1).unwrap(),
            max_relative = 1e-14
        );

        let mu = solution.distance_modulus(0.1, 0.101).unwrap();
        assert_relative_eq!(mu, 5.0 * d_l.log10() + 25.0, max_relative = 1e-14);
        // Roughly 38.3 for a nearby supernova in a 70 km/s/Mpc universe
        assert!(mu > 38.0 && mu < 38.7, "mu = {}", mu);
        assert_relative_eq!(
            solution.apparent_magnitude(0.1, 0.101).unwrap(),
            mu + params.mb,
            max_relative = 1e-14
        );
    }

    #[test]
    fn test_zero_distance_has_no_modulus() {
        let (_, solution) = gr_limit();
        assert!(matches!(
            solution.distance_modulus(0.0, 0.0),
            Err(R2abError::Unphysical { .. })
        ));
    }

    #[test]
    fn test_growth_observables() {
        let (params, solution) = gr_limit();
        let f0 = solution.growth_rate(0.0).unwrap();
        // f ≈ Ωm(z)^0.55 in ΛCDM
        assert_relative_eq!(f0, 0.3f64.powf(0.55), max_relative = 2e-2);
        assert_relative_eq!(
            solution.f_sigma8(0.0).unwrap(),
            params.sigma8_0 * f0,
            max_relative = 1e-12
        );

        // Growth approaches f = 1 at high redshift
        let f_high = solution.growth_rate(4.0).unwrap();
        assert_relative_eq!(f_high, 1.0, max_relative = 1e-6);
        assert!(solution.f_sigma8(4.0).unwrap() < solution.f_sigma8(0.5).unwrap());
    }

    #[test]
    fn test_out_of_range_redshift_is_an_error() {
        let (_, solution) = gr_limit();
        assert_eq!(solution.redshift_range().0, 0.0);
        assert_relative_eq!(solution.redshift_range().1, 4.0, max_relative = 1e-12);

        for z in [-0.1, 4.5, f64::NAN] {
            assert!(matches!(
                solution.hubble(z),
                Err(R2abError::ExtrapolationNotAllowed { .. })
            ));
            assert!(solution.f_sigma8(z).is_err());
            assert!(solution.comoving_distance(z).is_err());
        }
    }
}
