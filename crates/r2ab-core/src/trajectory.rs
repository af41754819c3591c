//! Dense representation of an ODE solution.
//!
//! Solvers only return the state at the points they chose to step to. A [`Trajectory`]
//! keeps those nodes together with the right-hand side evaluated at each one and answers
//! queries at arbitrary times with a piecewise cubic Hermite interpolant, which is
//! continuously differentiable and matches the solver's own accuracy between nodes.

use crate::errors::{R2abError, R2abResult};
use crate::ivp::State;
use crate::{FloatValue, Time};

/// Relative slack allowed when querying just outside the integrated range.
const RANGE_TOLERANCE: FloatValue = 1e-12;

#[derive(Debug, Clone, PartialEq)]
pub struct Trajectory<const N: usize> {
    times: Vec<Time>,
    states: Vec<State<N>>,
    derivatives: Vec<State<N>>,
}

impl<const N: usize> Trajectory<N> {
    /// Build a trajectory from solver nodes.
    ///
    /// Times must be strictly increasing and every state and derivative finite.
    pub fn new(
        times: Vec<Time>,
        states: Vec<State<N>>,
        derivatives: Vec<State<N>>,
    ) -> R2abResult<Self> {
        if times.len() != states.len() || times.len() != derivatives.len() {
            return Err(R2abError::Error(format!(
                "Trajectory length mismatch: {} times, {} states, {} derivatives",
                times.len(),
                states.len(),
                derivatives.len()
            )));
        }
        if times.len() < 2 {
            return Err(R2abError::Error(format!(
                "Trajectory needs at least two nodes, got {}",
                times.len()
            )));
        }

        for (index, window) in times.windows(2).enumerate() {
            if !(window[1] > window[0]) {
                return Err(R2abError::NonMonotonic {
                    index: index + 1,
                    t: window[1],
                    previous: window[0],
                });
            }
        }

        for ((t, y), dy) in times.iter().zip(&states).zip(&derivatives) {
            if !t.is_finite() || !all_finite(y) || !all_finite(dy) {
                return Err(R2abError::Solver(crate::SolverError::NonFinite(*t)));
            }
        }

        Ok(Self {
            times,
            states,
            derivatives,
        })
    }

    /// Build a trajectory from solver nodes, evaluating derivatives with `rhs`.
    ///
    /// Exactly repeated times (a dense-output artefact at the end of the range) are
    /// collapsed; any decrease in time is still an error.
    pub fn from_nodes<F>(times: &[Time], states: &[State<N>], rhs: F) -> R2abResult<Self>
    where
        F: Fn(Time, &State<N>) -> State<N>,
    {
        let mut kept_times = Vec::with_capacity(times.len());
        let mut kept_states = Vec::with_capacity(states.len());
        for (&t, y) in times.iter().zip(states) {
            if kept_times.last() == Some(&t) {
                continue;
            }
            kept_times.push(t);
            kept_states.push(*y);
        }
        let derivatives = kept_times
            .iter()
            .zip(&kept_states)
            .map(|(&t, y)| rhs(t, y))
            .collect();

        Self::new(kept_times, kept_states, derivatives)
    }

    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    pub fn start(&self) -> Time {
        self.times[0]
    }

    pub fn end(&self) -> Time {
        self.times[self.times.len() - 1]
    }

    pub fn times(&self) -> &[Time] {
        &self.times
    }

    pub fn states(&self) -> &[State<N>] {
        &self.states
    }

    /// State at the final node.
    pub fn last(&self) -> &State<N> {
        &self.states[self.states.len() - 1]
    }

    /// Interpolated state at `t`.
    pub fn value_at(&self, t: Time) -> R2abResult<State<N>> {
        let (i, s, h) = self.locate(t)?;
        let s2 = s * s;
        let s3 = s2 * s;
        let h00 = 2.0 * s3 - 3.0 * s2 + 1.0;
        let h10 = s3 - 2.0 * s2 + s;
        let h01 = -2.0 * s3 + 3.0 * s2;
        let h11 = s3 - s2;

        Ok(self.states[i] * h00
            + self.derivatives[i] * (h10 * h)
            + self.states[i + 1] * h01
            + self.derivatives[i + 1] * (h11 * h))
    }

    /// Derivative of the interpolant at `t`.
    pub fn derivative_at(&self, t: Time) -> R2abResult<State<N>> {
        let (i, s, h) = self.locate(t)?;
        let s2 = s * s;
        let d00 = 6.0 * s2 - 6.0 * s;
        let d10 = 3.0 * s2 - 4.0 * s + 1.0;
        let d01 = -6.0 * s2 + 6.0 * s;
        let d11 = 3.0 * s2 - 2.0 * s;

        Ok(self.states[i] * (d00 / h)
            + self.derivatives[i] * d10
            + self.states[i + 1] * (d01 / h)
            + self.derivatives[i + 1] * d11)
    }

    /// Find the interval containing `t`.
    ///
    /// Returns the index of the left node, the normalised position within the interval
    /// and the interval width.
    fn locate(&self, t: Time) -> R2abResult<(usize, FloatValue, FloatValue)> {
        let start = self.start();
        let end = self.end();
        let slack = RANGE_TOLERANCE * (end - start).abs().max(1.0);

        if !(t >= start - slack && t <= end + slack) {
            return Err(R2abError::ExtrapolationNotAllowed {
                target: t,
                start,
                end,
            });
        }
        let t = t.clamp(start, end);

        // First node strictly greater than t, so the interval is [i, i + 1]
        let upper = self.times.partition_point(|&x| x <= t);
        let i = upper.saturating_sub(1).min(self.times.len() - 2);
        let h = self.times[i + 1] - self.times[i];

        Ok((i, (t - self.times[i]) / h, h))
    }
}

fn all_finite<const N: usize>(v: &State<N>) -> bool {
    v.iter().all(|x| x.is_finite())
}
