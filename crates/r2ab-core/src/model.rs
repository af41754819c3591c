//! The R2-AB background and growth equations.
//!
//! The internal time coordinate is the scale factor `a`, integrated from
//! `t_initial` (z = 4 by default) to today. With `M = Ωm a⁻³`, `Rr = Ωr a⁻⁴` and
//! `E = H / H0` the background obeys
//!
//! $$ \alpha = \tilde R / \delta - b, \quad \tilde R = 3M + 12 (E^2 - M - R_r) $$
//! $$ \frac{dE^2}{da} = -\frac{3M}{a} - \frac{4R_r}{a} - \Omega_\Lambda \frac{9M}{2 \delta a} \mathrm{sech}^2\alpha $$
//!
//! together with the comoving-distance integral `dD/da = c / (a² H)`. The transition
//! switches the effective cosmological constant off once the curvature drops to `bδ`.
//! Linear matter perturbations follow
//!
//! $$ \delta'' + \left(\frac{3}{a} + \frac{H'}{H}\right)\delta' = \frac{3}{2} \frac{\Omega_m H_0^2}{a^5 H^2} \frac{G_{\rm eff}}{G} \delta $$
//!
//! with `G_eff / G = (1 + 4m) / (F (1 + 3m))`, `F = 1 - Ω_Λ sech²α`,
//! `F_R = 2 Ω_Λ sech²α tanh α / δ` and `m = max(0, k² F_R / (a² F))`.

use crate::config::ModelConfig;
use crate::errors::{R2abError, R2abResult};
use crate::ivp::{IVPBuilder, State, IVP};
use crate::observables::CosmologySolution;
use crate::params::ParameterVector;
use crate::trajectory::Trajectory;
use crate::transition::Transition;
use crate::{FloatValue, Time};
use nalgebra::Vector2;

/// Expansion history: state `[H, D]`.
#[derive(Debug, Clone)]
pub struct BackgroundSystem<'a> {
    params: &'a ParameterVector,
    config: &'a ModelConfig,
    omega_lambda: FloatValue,
}

impl<'a> BackgroundSystem<'a> {
    pub fn new(params: &'a ParameterVector, config: &'a ModelConfig) -> Self {
        Self {
            params,
            config,
            omega_lambda: params.omega_lambda(config.omega_r0),
        }
    }

    pub fn params(&self) -> &ParameterVector {
        self.params
    }

    pub fn config(&self) -> &ModelConfig {
        self.config
    }

    pub fn omega_lambda(&self) -> FloatValue {
        self.omega_lambda
    }

    /// Expansion rate of the reference (ΛCDM) cosmology with the same densities.
    pub fn reference_hubble(&self, t: Time) -> FloatValue {
        let p = self.params;
        p.h0 * (p.omega_m0 * t.powi(-3) + self.config.omega_r0 * t.powi(-4) + self.omega_lambda)
            .sqrt()
    }

    /// The model starts on the reference expansion rate.
    pub fn initial_state(&self) -> State<2> {
        Vector2::new(self.reference_hubble(self.config.t_initial), 0.0)
    }

    /// Argument α of the transition for a given expansion rate.
    pub fn transition_argument(&self, t: Time, hubble: FloatValue) -> FloatValue {
        let p = self.params;
        let matter = p.omega_m0 * t.powi(-3);
        let radiation = self.config.omega_r0 * t.powi(-4);
        let e2 = (hubble / p.h0).powi(2);
        let dark_energy = e2 - matter - radiation;
        let ricci = 3.0 * matter + 12.0 * dark_energy;

        ricci / self.config.delta - p.b
    }

    pub fn transition(&self, t: Time, hubble: FloatValue) -> Transition {
        Transition::at(self.transition_argument(t, hubble))
    }

    /// dH/da. NaN for a non-positive expansion rate.
    pub fn hubble_derivative(&self, t: Time, hubble: FloatValue) -> FloatValue {
        if !(hubble > 0.0) {
            return FloatValue::NAN;
        }
        let p = self.params;
        let delta = self.config.delta;
        let matter = p.omega_m0 * t.powi(-3);
        let radiation = self.config.omega_r0 * t.powi(-4);
        let transition = self.transition(t, hubble);

        let step_derivative = -(9.0 * matter / t) * transition.sech2 / (2.0 * delta);
        let de2_dt = -3.0 * matter / t - 4.0 * radiation / t + self.omega_lambda * step_derivative;

        p.h0 * p.h0 * de2_dt / (2.0 * hubble)
    }
}

impl IVP<2> for BackgroundSystem<'_> {
    fn calculate_dy_dt(&self, t: Time, y: &State<2>, dy_dt: &mut State<2>) {
        let hubble = y[0];
        dy_dt[0] = self.hubble_derivative(t, hubble);
        dy_dt[1] = if hubble > 0.0 {
            self.config.speed_of_light / (t * t * hubble)
        } else {
            FloatValue::NAN
        };
    }
}

/// Linear growth of matter perturbations: state `[δ, dδ/da]`.
pub struct GrowthSystem<'a> {
    background: &'a BackgroundSystem<'a>,
    trajectory: &'a Trajectory<2>,
}

impl<'a> GrowthSystem<'a> {
    pub fn new(background: &'a BackgroundSystem<'a>, trajectory: &'a Trajectory<2>) -> Self {
        Self {
            background,
            trajectory,
        }
    }

    /// Growing mode of matter domination, δ = a.
    pub fn initial_state(&self) -> State<2> {
        Vector2::new(self.background.config().t_initial, 1.0)
    }

    /// G_eff / G. NaN when the effective Planck mass is not positive.
    pub fn effective_coupling(&self, t: Time, hubble: FloatValue) -> FloatValue {
        let omega_lambda = self.background.omega_lambda();
        let config = self.background.config();
        let transition = self.background.transition(t, hubble);

        let f_r = 1.0 - omega_lambda * transition.sech2;
        if !(f_r > 0.0) {
            return FloatValue::NAN;
        }
        let f_rr = 2.0 * omega_lambda * transition.sech2 * transition.tanh / config.delta;
        let m = (config.k * config.k * f_rr / (t * t * f_r)).max(0.0);

        (1.0 + 4.0 * m) / (f_r * (1.0 + 3.0 * m))
    }
}

impl IVP<2> for GrowthSystem<'_> {
    fn calculate_dy_dt(&self, t: Time, y: &State<2>, dy_dt: &mut State<2>) {
        let hubble = match self.trajectory.value_at(t) {
            Ok(state) => state[0],
            Err(_) => FloatValue::NAN,
        };
        let p = self.background.params();
        let dh_dt = self.background.hubble_derivative(t, hubble);
        let coupling = self.effective_coupling(t, hubble);
        let source =
            1.5 * p.omega_m0 * p.h0 * p.h0 * coupling / (t.powi(5) * hubble * hubble);

        dy_dt[0] = y[1];
        dy_dt[1] = -(3.0 / t + dh_dt / hubble) * y[1] + source * y[0];
    }
}

/// Integrate the background from `t_initial` to `t_final`.
pub fn solve_background(
    params: &ParameterVector,
    config: &ModelConfig,
) -> R2abResult<Trajectory<2>> {
    let system = BackgroundSystem::new(params, config);
    let trajectory = IVPBuilder::new(&system, system.initial_state()).integrate(
        config.t_initial,
        config.t_final,
        &config.solver,
    )?;

    if let Some((t, _)) = trajectory
        .times()
        .iter()
        .zip(trajectory.states())
        .find(|(_, y)| !(y[0] > 0.0))
    {
        return Err(R2abError::Unphysical {
            t: *t,
            reason: "expansion rate is not positive".to_string(),
        });
    }

    Ok(trajectory)
}

/// Integrate the growth equation on top of a solved background.
pub fn solve_growth(
    params: &ParameterVector,
    config: &ModelConfig,
    background: &Trajectory<2>,
) -> R2abResult<Trajectory<2>> {
    let system = BackgroundSystem::new(params, config);
    let growth = GrowthSystem::new(&system, background);

    IVPBuilder::new(&growth, growth.initial_state()).integrate(
        config.t_initial,
        config.t_final,
        &config.solver,
    )
}

/// Solve both systems for one parameter vector.
///
/// Any numerical failure is returned as an error rather than a panic, so callers can treat
/// the parameter vector as rejected.
pub fn solve(params: &ParameterVector, config: &ModelConfig) -> R2abResult<CosmologySolution> {
    if !params.is_finite() {
        return Err(R2abError::Error(format!(
            "Parameter vector contains non-finite values: {:?}",
            params.to_array()
        )));
    }

    let background = solve_background(params, config)?;
    let growth = solve_growth(params, config, &background)?;

    CosmologySolution::new(*params, config, background, growth)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{SolverMethod, SolverSettings};
    use crate::ivp::evaluate;
    use approx::assert_relative_eq;

    fn reference() -> ParameterVector {
        ParameterVector::reference()
    }

    #[test]
    fn test_initial_state_matches_reference_cosmology() {
        let params = reference();
        let config = ModelConfig::default();
        let system = BackgroundSystem::new(&params, &config);
        let y0 = system.initial_state();

        let expected = 70.0 * (0.3 * 125.0 + 0.7f64).sqrt();
        assert_relative_eq!(y0[0], expected, max_relative = 1e-12);
        assert_eq!(y0[1], 0.0);
        // Deep in the high-curvature regime the transition is saturated
        assert!(system.transition(config.t_initial, y0[0]).is_saturated());
    }

    #[test]
    fn test_saturated_transition_reproduces_reference_expansion() {
        // A very negative b keeps α far above the saturation threshold at every epoch
        let params = ParameterVector::new(70.0, 0.3, 0.8, -19.3, -200.0);
        let config = ModelConfig::default();
        let trajectory = solve_background(&params, &config).unwrap();
        let system = BackgroundSystem::new(&params, &config);

        for t in [0.2, 0.35, 0.5, 0.8, 1.0] {
            assert_relative_eq!(
                trajectory.value_at(t).unwrap()[0],
                system.reference_hubble(t),
                max_relative = 1e-5
            );
        }
    }

    #[test]
    fn test_large_b_suppresses_late_time_expansion() {
        let config = ModelConfig::default();
        let gr_like = solve_background(&ParameterVector::new(70.0, 0.3, 0.8, -19.3, 1.6), &config)
            .unwrap();
        let modified =
            solve_background(&ParameterVector::new(70.0, 0.3, 0.8, -19.3, 12.0), &config).unwrap();

        assert_relative_eq!(gr_like.last()[0], 70.0, max_relative = 1e-3);
        assert!(
            modified.last()[0] < 0.95 * 70.0,
            "H(z=0) = {}",
            modified.last()[0]
        );
        // Both start from the same early-time rate
        assert_eq!(gr_like.states()[0][0], modified.states()[0][0]);
    }

    #[test]
    fn test_overflow_guard_at_upper_b() {
        let params = ParameterVector::new(76.0, 0.5, 0.9, -19.0, 12.0);
        let config = ModelConfig::default();
        let system = BackgroundSystem::new(&params, &config);

        for hubble in [1e-3, 1.0, 5e3, 1e8, 1e150] {
            let alpha = system.transition_argument(0.2, hubble);
            assert!(alpha.abs() > 15.0, "alpha = {}", alpha);
            let dy = evaluate(&system, 0.2, &Vector2::new(hubble, 0.0));
            assert!(dy[0].is_finite() && dy[1].is_finite(), "dy = {:?}", dy);

            let transition = system.transition(0.2, hubble);
            assert_eq!(transition.tanh.abs(), 1.0);
            assert_eq!(transition.sech2, 0.0);
        }
    }

    #[test]
    fn test_non_positive_hubble_is_flagged() {
        let params = reference();
        let config = ModelConfig::default();
        let system = BackgroundSystem::new(&params, &config);
        let dy = evaluate(&system, 0.5, &Vector2::new(-1.0, 0.0));
        assert!(dy[0].is_nan());
        assert!(dy[1].is_nan());
    }

    #[test]
    fn test_matter_only_growth_is_linear_in_a() {
        // Ωm = 1 has no dark energy, so F = 1, G_eff = G and δ = a exactly
        let params = ParameterVector::new(70.0, 1.0, 0.8, -19.3, 5.0);
        let config = ModelConfig::default();
        let background = solve_background(&params, &config).unwrap();
        let growth = solve_growth(&params, &config, &background).unwrap();

        for t in [0.3, 0.6, 1.0] {
            let state = growth.value_at(t).unwrap();
            assert_relative_eq!(state[0], t, max_relative = 1e-4);
            assert_relative_eq!(state[1], 1.0, max_relative = 1e-4);
        }
    }

    #[test]
    fn test_effective_coupling_bounds() {
        let params = ParameterVector::new(70.0, 0.3, 0.8, -19.3, 12.0);
        let config = ModelConfig::default();
        let background = solve_background(&params, &config).unwrap();
        let system = BackgroundSystem::new(&params, &config);
        let growth = GrowthSystem::new(&system, &background);

        for t in [0.2, 0.4, 0.7, 1.0] {
            let hubble = background.value_at(t).unwrap()[0];
            let f_r = 1.0 - system.omega_lambda() * system.transition(t, hubble).sech2;
            let coupling = growth.effective_coupling(t, hubble);
            assert!(coupling >= 1.0 / f_r - 1e-12, "G_eff = {} at t = {}", coupling, t);
            assert!(coupling <= 4.0 / (3.0 * f_r) + 1e-12);
        }
    }

    #[test]
    fn test_solve_is_idempotent() {
        let params = reference();
        let config = ModelConfig::default();
        let first = solve(&params, &config).unwrap();
        let second = solve(&params, &config).unwrap();

        assert_eq!(first.background(), second.background());
        assert_eq!(first.growth(), second.growth());
    }

    fn with_solver(solver: SolverSettings) -> ModelConfig {
        ModelConfig {
            solver,
            ..Default::default()
        }
    }

    /// Tolerances far below the defaults, used as the converged answer
    fn converged_settings() -> SolverSettings {
        SolverSettings {
            rtol: 1e-10,
            atol: 1e-14,
            output_points: 2000,
            ..Default::default()
        }
    }

    /// Points inside the sampled box, including the transition regime at large H0 and b
    fn sampled_points() -> Vec<ParameterVector> {
        vec![
            reference(),
            ParameterVector::new(75.9, 0.3, 0.8, -19.3, 8.0),
            ParameterVector::new(60.0, 0.45, 0.75, -19.5, 3.0),
            ParameterVector::new(70.0, 0.3, 0.8, -19.3, 11.0),
        ]
    }

    #[test]
    fn test_default_settings_match_converged_solution() {
        let config = ModelConfig::default();
        let tight = with_solver(converged_settings());

        for params in sampled_points() {
            let solution = solve(&params, &config).unwrap();
            let converged = solve(&params, &tight).unwrap();

            for z in [0.0, 0.3, 1.0, 2.5] {
                assert_relative_eq!(
                    solution.hubble(z).unwrap(),
                    converged.hubble(z).unwrap(),
                    max_relative = 1e-4
                );
                assert_relative_eq!(
                    solution.f_sigma8(z).unwrap(),
                    converged.f_sigma8(z).unwrap(),
                    max_relative = 1e-3
                );
            }
        }
    }

    #[test]
    fn test_methods_agree() {
        let explicit_config = with_solver(SolverSettings {
            method: SolverMethod::Dop853,
            ..Default::default()
        });

        let params = reference();
        let stiff = solve(&params, &ModelConfig::default()).unwrap();
        let explicit = solve(&params, &explicit_config).unwrap();
        for z in [0.0, 0.1, 0.5, 1.5, 3.0] {
            assert_relative_eq!(
                stiff.hubble(z).unwrap(),
                explicit.hubble(z).unwrap(),
                max_relative = 1e-5
            );
            assert_relative_eq!(
                stiff.f_sigma8(z).unwrap(),
                explicit.f_sigma8(z).unwrap(),
                max_relative = 1e-4
            );
        }

        for params in sampled_points() {
            let stiff = solve(&params, &ModelConfig::default()).unwrap();
            let explicit = solve(&params, &explicit_config).unwrap();
            assert_relative_eq!(
                stiff.hubble(0.0).unwrap(),
                explicit.hubble(0.0).unwrap(),
                max_relative = 1e-4
            );
            assert_relative_eq!(
                stiff.f_sigma8(0.0).unwrap(),
                explicit.f_sigma8(0.0).unwrap(),
                max_relative = 1e-3
            );
        }
    }

    #[test]
    fn test_dop853_covers_full_range() {
        let config = with_solver(SolverSettings {
            method: SolverMethod::Dop853,
            ..Default::default()
        });
        let background = solve_background(&reference(), &config).unwrap();

        assert_eq!(background.start(), config.t_initial);
        assert_eq!(background.end(), config.t_final);
        let solution = solve(&reference(), &config).unwrap();
        assert!(solution.hubble(0.0).is_ok());
        assert!(solution.hubble(config.z_initial()).is_ok());
    }

    #[test]
    fn test_non_finite_parameters_rejected() {
        let params = ParameterVector::new(70.0, f64::NAN, 0.8, -19.3, 5.0);
        assert!(solve(&params, &ModelConfig::default()).is_err());
    }

    #[test]
    fn test_step_ceiling_reported_as_error() {
        let config = ModelConfig {
            solver: SolverSettings {
                max_steps: 2,
                ..Default::default()
            },
            ..Default::default()
        };
        let err = solve(&reference(), &config).unwrap_err();
        assert!(matches!(err, R2abError::Solver(_)));
    }
}
