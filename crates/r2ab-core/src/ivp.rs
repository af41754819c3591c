//! Initial value problem plumbing.
//!
//! Model equations implement [`IVP`]. [`IVPBuilder`] wraps a model and its initial state
//! into an `ode_solvers::System` and integrates it with the method selected in
//! [`SolverSettings`], returning a dense [`Trajectory`].
//!
//! `ode_solvers` only ships explicit Runge-Kutta schemes, so the default method is the
//! linearly-implicit Rosenbrock 4(3) scheme below: the four-stage Kaps-Rentrop form with
//! Shampine's (1982) coefficients. It only needs a Jacobian and one LU factorisation per
//! step, which is cheap for the two-component systems solved here.

use crate::config::{SolverMethod, SolverSettings};
use crate::errors::{R2abResult, SolverError};
use crate::trajectory::Trajectory;
use crate::{FloatValue, Time};
use nalgebra::{DMatrix, SVector};
use ode_solvers::dop_shared::{IntegrationError, OutputType};
use ode_solvers::{Dop853, System};
use tracing::trace;

/// State vector of an `N` component system.
pub type State<const N: usize> = SVector<FloatValue, N>;

/// A system of first order ODEs, dy/dt = f(t, y).
pub trait IVP<const N: usize> {
    fn calculate_dy_dt(&self, t: Time, y: &State<N>, dy_dt: &mut State<N>);
}

/// Adapter exposing an [`IVP`] as an `ode_solvers::System`.
pub struct IVPSolver<'a, M: ?Sized> {
    model: &'a M,
}

impl<'a, M: ?Sized> IVPSolver<'a, M> {
    pub fn new(model: &'a M) -> Self {
        Self { model }
    }
}

impl<M, const N: usize> System<Time, State<N>> for IVPSolver<'_, M>
where
    M: IVP<N> + ?Sized,
{
    fn system(&self, t: Time, y: &State<N>, dy: &mut State<N>) {
        self.model.calculate_dy_dt(t, y, dy);
    }
}

/// Collects every accepted `Dop853` step through the `solout` hook.
struct StepRecorder<'a, 'r, M: ?Sized, const N: usize> {
    solver: IVPSolver<'a, M>,
    times: &'r mut Vec<Time>,
    states: &'r mut Vec<State<N>>,
}

impl<M, const N: usize> System<Time, State<N>> for StepRecorder<'_, '_, M, N>
where
    M: IVP<N> + ?Sized,
{
    fn system(&self, t: Time, y: &State<N>, dy: &mut State<N>) {
        self.solver.system(t, y, dy);
    }

    fn solout(&mut self, t: Time, y: &State<N>, _dy: &State<N>) -> bool {
        self.times.push(t);
        self.states.push(*y);
        false
    }
}

/// Evaluate the right-hand side of a model at a single point.
pub fn evaluate<M, const N: usize>(model: &M, t: Time, y: &State<N>) -> State<N>
where
    M: IVP<N> + ?Sized,
{
    let mut dy = State::<N>::zeros();
    model.calculate_dy_dt(t, y, &mut dy);
    dy
}

pub struct IVPBuilder<'a, M: ?Sized, const N: usize> {
    model: &'a M,
    y0: State<N>,
}

impl<'a, M, const N: usize> IVPBuilder<'a, M, N>
where
    M: IVP<N> + ?Sized,
{
    pub fn new(model: &'a M, y0: State<N>) -> Self {
        Self { model, y0 }
    }

    /// Build the stiff Rosenbrock integrator for `[t0, t1]`.
    pub fn to_rosenbrock(
        &self,
        t0: Time,
        t1: Time,
        settings: &SolverSettings,
    ) -> Rosenbrock4<IVPSolver<'a, M>, N> {
        Rosenbrock4::new(IVPSolver::new(self.model), t0, t1, self.y0, settings)
    }

    /// Integrate over `[t0, t1]` with the configured method.
    pub fn integrate(
        &self,
        t0: Time,
        t1: Time,
        settings: &SolverSettings,
    ) -> R2abResult<Trajectory<N>> {
        let (times, states) = match settings.method {
            SolverMethod::Rosenbrock4 => {
                let mut solver = self.to_rosenbrock(t0, t1, settings);
                let stats = solver.integrate()?;
                trace!(
                    accepted = stats.accepted_steps,
                    rejected = stats.rejected_steps,
                    evaluations = stats.function_evaluations,
                    "Rosenbrock integration finished"
                );
                let (times, states) = solver.results();
                (times.to_vec(), states.to_vec())
            }
            SolverMethod::Dop853 => self.run_dop853(t0, t1, settings)?,
        };

        Trajectory::from_nodes(&times, &states, |t, y| evaluate(self.model, t, y))
    }

    fn run_dop853(
        &self,
        t0: Time,
        t1: Time,
        settings: &SolverSettings,
    ) -> Result<(Vec<Time>, Vec<State<N>>), SolverError> {
        let span = t1 - t0;
        if !(span > 0.0) {
            return Err(SolverError::Integration(format!(
                "Integration range must be increasing, got [{}, {}]",
                t0, t1
            )));
        }

        let mut times = vec![t0];
        let mut states = vec![self.y0];
        let recorder = StepRecorder {
            solver: IVPSolver::new(self.model),
            times: &mut times,
            states: &mut states,
        };
        let mut solver = Dop853::from_param(
            recorder,
            t0,
            t1,
            0.0,
            self.y0,
            settings.rtol,
            settings.atol,
            DOP853_SAFETY,
            0.0,
            DOP853_FAC_MIN,
            DOP853_FAC_MAX,
            max_step(span, settings),
            0.0,
            u32::try_from(settings.max_steps).unwrap_or(u32::MAX),
            DOP853_STIFFNESS_CHECK,
            OutputType::Sparse,
        );
        let stats = solver.integrate().map_err(integration_error)?;
        drop(solver);
        trace!(
            accepted = stats.accepted_steps,
            rejected = stats.rejected_steps,
            evaluations = stats.num_eval,
            "Dop853 integration finished"
        );

        // The final step is sized as t1 - t, which can miss t1 by rounding
        match times.last_mut() {
            Some(t_last) if (t1 - *t_last).abs() <= END_TOLERANCE * span => *t_last = t1,
            _ => {
                return Err(SolverError::Integration(format!(
                    "Dop853 stopped before t={}",
                    t1
                )))
            }
        }
        Ok((times, states))
    }
}

/// Gap, relative to the span, below which the last node is treated as the end point.
const END_TOLERANCE: FloatValue = 1e-9;

const DOP853_SAFETY: FloatValue = 0.9;
const DOP853_FAC_MIN: FloatValue = 0.333;
const DOP853_FAC_MAX: FloatValue = 6.0;
const DOP853_STIFFNESS_CHECK: u32 = 1000;

fn max_step(span: Time, settings: &SolverSettings) -> Time {
    span / settings.output_points.max(1) as FloatValue
}

fn integration_error(error: IntegrationError) -> SolverError {
    match error {
        IntegrationError::MaxNumStepReached { x, n_step } => SolverError::MaxStepsReached {
            t: x,
            steps: n_step as usize,
        },
        other => SolverError::Integration(other.to_string()),
    }
}

/// Counters reported by [`Rosenbrock4::integrate`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Stats {
    pub accepted_steps: usize,
    pub rejected_steps: usize,
    pub function_evaluations: usize,
}

// Shampine's parameters for the Kaps-Rentrop scheme
const GAMMA: FloatValue = 0.5;
const A21: FloatValue = 2.0;
const A31: FloatValue = 48.0 / 25.0;
const A32: FloatValue = 6.0 / 25.0;
const C21: FloatValue = -8.0;
const C31: FloatValue = 372.0 / 25.0;
const C32: FloatValue = 12.0 / 5.0;
const C41: FloatValue = -112.0 / 125.0;
const C42: FloatValue = -54.0 / 125.0;
const C43: FloatValue = -2.0 / 5.0;
const B1: FloatValue = 19.0 / 9.0;
const B2: FloatValue = 0.5;
const B3: FloatValue = 25.0 / 108.0;
const B4: FloatValue = 125.0 / 108.0;
// The third stage does not enter the error estimate
const E1: FloatValue = 17.0 / 54.0;
const E2: FloatValue = 7.0 / 36.0;
const E4: FloatValue = 125.0 / 108.0;
const C1X: FloatValue = 0.5;
const C2X: FloatValue = -1.5;
const C3X: FloatValue = 121.0 / 50.0;
const C4X: FloatValue = 29.0 / 250.0;
const A2X: FloatValue = 1.0;
const A3X: FloatValue = 3.0 / 5.0;

const MAX_GROWTH: FloatValue = 5.0;
const MIN_SHRINK: FloatValue = 0.2;
const SAFETY: FloatValue = 0.8;

/// Adaptive Rosenbrock 4(3) integrator.
///
/// The propagated solution is fourth order and the third order embedded solution only
/// supplies the error estimate. Error is controlled per unit step: a step of size `h`
/// may contribute at most `h / (t_end - t0)` of the tolerance, so the estimates summed
/// over the range stay within `rtol`. Steps never exceed
/// `(t_end - t0) / output_points`.
///
/// Works with any `ode_solvers::System`, so the same model type can be handed to either
/// this method or the explicit `ode_solvers` integrators.
pub struct Rosenbrock4<F, const N: usize> {
    f: F,
    t0: Time,
    t_end: Time,
    y0: State<N>,
    rtol: FloatValue,
    atol: FloatValue,
    h_max: FloatValue,
    max_steps: usize,
    times: Vec<Time>,
    states: Vec<State<N>>,
}

impl<F, const N: usize> Rosenbrock4<F, N>
where
    F: System<Time, State<N>>,
{
    pub fn new(f: F, t0: Time, t_end: Time, y0: State<N>, settings: &SolverSettings) -> Self {
        Self {
            f,
            t0,
            t_end,
            y0,
            rtol: settings.rtol,
            atol: settings.atol,
            h_max: max_step(t_end - t0, settings),
            max_steps: settings.max_steps,
            times: Vec::new(),
            states: Vec::new(),
        }
    }

    /// Accepted nodes, including the initial point.
    pub fn results(&self) -> (&[Time], &[State<N>]) {
        (&self.times, &self.states)
    }

    /// Integrate forward from `t0` to `t_end`.
    pub fn integrate(&mut self) -> Result<Stats, SolverError> {
        let mut stats = Stats::default();
        self.times.clear();
        self.states.clear();

        let span = self.t_end - self.t0;
        if !(span > 0.0) {
            return Err(SolverError::Integration(format!(
                "Integration range must be increasing, got [{}, {}]",
                self.t0, self.t_end
            )));
        }

        let mut t = self.t0;
        let mut y = self.y0;
        let mut f0 = self.eval(t, &y, &mut stats);
        if !is_finite(&y) || !is_finite(&f0) {
            return Err(SolverError::NonFinite(t));
        }
        self.times.push(t);
        self.states.push(y);

        let h_max = self.h_max.min(span);
        let h_min = 16.0 * f64::EPSILON * self.t_end.abs().max(self.t0.abs());
        let mut h = self.initial_step(&y, &f0, span).min(h_max);
        let identity = DMatrix::<FloatValue>::identity(N, N);

        while t < self.t_end {
            let attempts = stats.accepted_steps + stats.rejected_steps;
            if attempts >= self.max_steps {
                return Err(SolverError::MaxStepsReached { t, steps: attempts });
            }

            // Stretch the final step rather than leave a sliver
            let remaining = self.t_end - t;
            let last_step = 1.1 * h >= remaining && remaining <= h_max;
            if last_step {
                h = remaining;
            }
            if h < h_min {
                return Err(SolverError::StepSizeUnderflow { t, h });
            }

            let jacobian = self.jacobian(t, &y, &f0, &mut stats);
            let dfdt = self.time_derivative(t, &y, &f0, &mut stats);

            let lu = (&identity * (1.0 / (GAMMA * h)) - &jacobian).lu();
            let solve = |rhs: State<N>| -> Result<State<N>, SolverError> {
                let rhs = DMatrix::from_iterator(N, 1, rhs.iter().copied());
                lu.solve(&rhs)
                    .map(|x| State::<N>::from_iterator(x.iter().copied()))
                    .ok_or(SolverError::SingularMatrix(t))
            };

            let g1 = solve(f0 + dfdt * (h * C1X))?;
            let f1 = self.eval(t + A2X * h, &(y + g1 * A21), &mut stats);
            let g2 = solve(f1 + dfdt * (h * C2X) + g1 * (C21 / h))?;
            let f2 = self.eval(t + A3X * h, &(y + g1 * A31 + g2 * A32), &mut stats);
            let g3 = solve(f2 + dfdt * (h * C3X) + (g1 * C31 + g2 * C32) / h)?;
            let g4 = solve(f2 + dfdt * (h * C4X) + (g1 * C41 + g2 * C42 + g3 * C43) / h)?;

            let y_new = y + g1 * B1 + g2 * B2 + g3 * B3 + g4 * B4;
            let error = g1 * E1 + g2 * E2 + g4 * E4;
            let err = self.error_norm(&error, &y, &y_new) * span / h;

            if err <= 1.0 {
                t = if last_step { self.t_end } else { t + h };
                y = y_new;
                f0 = self.eval(t, &y, &mut stats);
                if !is_finite(&f0) {
                    return Err(SolverError::NonFinite(t));
                }
                self.times.push(t);
                self.states.push(y);
                stats.accepted_steps += 1;

                let factor = if err == 0.0 {
                    MAX_GROWTH
                } else {
                    (SAFETY * err.powf(-1.0 / 3.0)).clamp(MIN_SHRINK, MAX_GROWTH)
                };
                h = (h * factor).min(h_max);
            } else {
                stats.rejected_steps += 1;
                let factor = if err.is_finite() {
                    (SAFETY * err.powf(-1.0 / 3.0)).max(MIN_SHRINK)
                } else {
                    MIN_SHRINK
                };
                h *= factor;
            }
        }

        Ok(stats)
    }

    fn eval(&self, t: Time, y: &State<N>, stats: &mut Stats) -> State<N> {
        let mut dy = State::<N>::zeros();
        self.f.system(t, y, &mut dy);
        stats.function_evaluations += 1;
        dy
    }

    /// Forward-difference Jacobian df/dy.
    fn jacobian(
        &self,
        t: Time,
        y: &State<N>,
        f0: &State<N>,
        stats: &mut Stats,
    ) -> DMatrix<FloatValue> {
        let mut jacobian = DMatrix::<FloatValue>::zeros(N, N);
        let sqrt_eps = f64::EPSILON.sqrt();
        for j in 0..N {
            let dy = sqrt_eps * y[j].abs().max(1.0);
            let mut shifted = *y;
            shifted[j] += dy;
            let f_shifted = self.eval(t, &shifted, stats);
            for i in 0..N {
                jacobian[(i, j)] = (f_shifted[i] - f0[i]) / dy;
            }
        }
        jacobian
    }

    /// Finite-difference df/dt, taken backwards at the end of the range.
    fn time_derivative(
        &self,
        t: Time,
        y: &State<N>,
        f0: &State<N>,
        stats: &mut Stats,
    ) -> State<N> {
        let mut dt = f64::EPSILON.sqrt() * t.abs().max(1.0);
        if t + dt > self.t_end {
            dt = -dt;
        }
        (self.eval(t + dt, y, stats) - f0) / dt
    }

    /// Mixed absolute/relative max-norm of the local error estimate.
    fn error_norm(&self, error: &State<N>, y: &State<N>, y_new: &State<N>) -> FloatValue {
        let mut norm: FloatValue = 0.0;
        for i in 0..N {
            let scale = self.atol + self.rtol * y[i].abs().max(y_new[i].abs());
            let ratio = error[i].abs() / scale;
            if !ratio.is_finite() {
                return FloatValue::INFINITY;
            }
            norm = norm.max(ratio);
        }
        norm
    }

    fn initial_step(&self, y: &State<N>, f0: &State<N>, span: FloatValue) -> FloatValue {
        let threshold = self.atol / self.rtol;
        let rate = (0..N)
            .map(|i| f0[i].abs() / y[i].abs().max(threshold))
            .fold(0.0, FloatValue::max);
        let root = self.rtol.powf(1.0 / 3.0);

        let mut h = span;
        if h * 1.25 * rate / root > 1.0 {
            h = root / (1.25 * rate);
        }
        h.max(16.0 * f64::EPSILON * span)
    }
}

fn is_finite<const N: usize>(v: &State<N>) -> bool {
    v.iter().all(|x| x.is_finite())
}
