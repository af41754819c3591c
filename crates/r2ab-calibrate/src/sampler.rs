//! Affine-invariant ensemble sampler (emcee algorithm).
//!
//! Implements the Goodman & Weare (2010) stretch move. An ensemble of walkers explores
//! parameter space together; each walker's proposal is built from the position of a walker
//! in the complementary half of the ensemble, so no proposal scale has to be tuned.
//!
//! # References
//!
//! Goodman, J., & Weare, J. (2010). Ensemble samplers with affine invariance.
//! Communications in Applied Mathematics and Computational Science, 5(1), 65-80.

use crate::driver::DriverPhase;
use crate::posterior::LogPosterior;
use crate::prior::PriorBounds;
use crate::{Error, Result};
use indexmap::IndexMap;
use ndarray::{Array1, Array2, Array3, ArrayView1};
use rand::Rng;
use rand_distr::StandardNormal;
use rayon::prelude::*;
use std::io::Write;

/// Redraws allowed per walker when placing it inside the prior.
const MAX_INIT_ATTEMPTS: usize = 1000;

/// Information about sampling progress.
///
/// Passed to progress callbacks after every iteration.
#[derive(Debug, Clone)]
pub struct ProgressInfo {
    /// Phase the iteration belongs to
    pub phase: DriverPhase,

    /// Current iteration number within the running phase (0-indexed)
    pub iteration: usize,

    /// Total number of iterations in the running phase
    pub total: usize,

    /// Mean acceptance rate across all walkers
    pub acceptance_rate: f64,

    /// Mean log probability across all walkers
    pub mean_log_prob: f64,

    /// Likelihood evaluations that failed numerically so far
    pub failures: usize,
}

/// State of the ensemble at a given iteration.
///
/// Contains the current positions of all walkers, their log probabilities,
/// and acceptance tracking information.
#[derive(Debug, Clone)]
pub struct SamplerState {
    /// Current positions of walkers: shape (n_walkers, n_params)
    pub positions: Array2<f64>,

    /// Log probabilities at current positions: shape (n_walkers,)
    pub log_probs: Array1<f64>,

    /// Number of proposals accepted for each walker
    pub n_accepted: Array1<usize>,

    /// Number of proposals made for each walker
    pub n_proposed: Array1<usize>,

    /// Parameter names in the order they appear in position vectors
    pub param_names: Vec<String>,
}

impl SamplerState {
    /// Create a new sampler state from initial positions.
    ///
    /// Log probabilities start at negative infinity until the sampler evaluates them.
    pub fn new(positions: Array2<f64>, param_names: Vec<String>) -> Result<Self> {
        let (n_walkers, n_params) = positions.dim();

        if param_names.len() != n_params {
            return Err(Error::SamplingError(format!(
                "Number of parameter names ({}) does not match positions dimension ({})",
                param_names.len(),
                n_params
            )));
        }

        if n_walkers < 2 {
            return Err(Error::SamplingError(
                "Must have at least 2 walkers for ensemble sampling".to_string(),
            ));
        }

        Ok(Self {
            positions,
            log_probs: Array1::from_elem(n_walkers, f64::NEG_INFINITY),
            n_accepted: Array1::zeros(n_walkers),
            n_proposed: Array1::zeros(n_walkers),
            param_names,
        })
    }

    pub fn n_walkers(&self) -> usize {
        self.positions.nrows()
    }

    pub fn n_params(&self) -> usize {
        self.positions.ncols()
    }

    /// Ratio of accepted to proposed moves for each walker (0 before any proposal).
    pub fn acceptance_fraction(&self) -> Array1<f64> {
        let mut fractions = Array1::zeros(self.n_walkers());
        for i in 0..self.n_walkers() {
            if self.n_proposed[i] > 0 {
                fractions[i] = self.n_accepted[i] as f64 / self.n_proposed[i] as f64;
            }
        }
        fractions
    }

    pub fn mean_acceptance_rate(&self) -> f64 {
        let total_accepted: usize = self.n_accepted.iter().sum();
        let total_proposed: usize = self.n_proposed.iter().sum();

        if total_proposed > 0 {
            total_accepted as f64 / total_proposed as f64
        } else {
            0.0
        }
    }

    /// Forget acceptance history, keeping positions and log probabilities.
    pub fn reset_counters(&mut self) {
        self.n_accepted.fill(0);
        self.n_proposed.fill(0);
    }

    pub fn mean_log_prob(&self) -> f64 {
        self.log_probs.mean().unwrap_or(f64::NEG_INFINITY)
    }
}

/// Recorded samples from every walker.
///
/// Iterations are stored as (n_walkers, n_params) snapshots and exposed either in
/// (walker, iteration, parameter) order or flattened.
#[derive(Debug, Clone)]
pub struct Chain {
    /// One entry per iteration, each of shape (n_walkers, n_params)
    samples: Vec<Array2<f64>>,

    /// One entry per iteration, each of shape (n_walkers,)
    log_probs: Vec<Array1<f64>>,

    param_names: Vec<String>,
}

impl Chain {
    pub fn new(param_names: Vec<String>) -> Self {
        Self::with_capacity(param_names, 0)
    }

    pub fn with_capacity(param_names: Vec<String>, n_iterations: usize) -> Self {
        Self {
            samples: Vec::with_capacity(n_iterations),
            log_probs: Vec::with_capacity(n_iterations),
            param_names,
        }
    }

    /// Append one iteration.
    pub fn push(&mut self, positions: Array2<f64>, log_probs: Array1<f64>) -> Result<()> {
        if positions.ncols() != self.param_names.len() || positions.nrows() != log_probs.len() {
            return Err(Error::SamplingError(format!(
                "Sample of shape {:?} with {} log probabilities does not fit a chain over {} parameters",
                positions.dim(),
                log_probs.len(),
                self.param_names.len()
            )));
        }
        if let Some(first) = self.samples.first() {
            if first.nrows() != positions.nrows() {
                return Err(Error::SamplingError(format!(
                    "Expected {} walkers, got {}",
                    first.nrows(),
                    positions.nrows()
                )));
            }
        }
        self.samples.push(positions);
        self.log_probs.push(log_probs);
        Ok(())
    }

    /// Number of recorded iterations.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn n_walkers(&self) -> usize {
        self.samples.first().map_or(0, |s| s.nrows())
    }

    pub fn param_names(&self) -> &[String] {
        &self.param_names
    }

    /// Samples indexed by (walker, iteration, parameter).
    pub fn samples(&self) -> Array3<f64> {
        let n_params = self.param_names.len();
        Array3::from_shape_fn((self.n_walkers(), self.len(), n_params), |(w, i, p)| {
            self.samples[i][[w, p]]
        })
    }

    /// Log posterior indexed by (walker, iteration).
    pub fn log_prob_trace(&self) -> Array2<f64> {
        Array2::from_shape_fn((self.n_walkers(), self.len()), |(w, i)| {
            self.log_probs[i][w]
        })
    }

    /// Samples from all walkers stacked into shape ((len - discard) * n_walkers, n_params).
    pub fn flat_samples(&self, discard: usize) -> Array2<f64> {
        if self.is_empty() || discard >= self.len() {
            return Array2::zeros((0, self.param_names.len()));
        }

        let n_keep = self.len() - discard;
        let n_walkers = self.n_walkers();
        let mut flat = Array2::zeros((n_keep * n_walkers, self.param_names.len()));

        for (i, sample) in self.samples.iter().skip(discard).enumerate() {
            for (j, walker) in sample.outer_iter().enumerate() {
                flat.row_mut(i * n_walkers + j).assign(&walker);
            }
        }

        flat
    }

    /// Log probabilities matching [`Chain::flat_samples`].
    pub fn flat_log_probs(&self, discard: usize) -> Array1<f64> {
        if self.is_empty() || discard >= self.len() {
            return Array1::zeros(0);
        }

        self.log_probs
            .iter()
            .skip(discard)
            .flat_map(|lp| lp.iter().copied())
            .collect()
    }

    /// Map from parameter name to all post-discard samples of that parameter.
    pub fn to_param_map(&self, discard: usize) -> IndexMap<String, Array1<f64>> {
        let flat = self.flat_samples(discard);
        self.param_names
            .iter()
            .enumerate()
            .map(|(i, name)| (name.clone(), flat.column(i).to_owned()))
            .collect()
    }

    /// The sample with the highest log posterior.
    pub fn best_sample(&self) -> Option<(Array1<f64>, f64)> {
        let mut best: Option<(Array1<f64>, f64)> = None;
        for (sample, log_probs) in self.samples.iter().zip(&self.log_probs) {
            for (walker, &lp) in sample.outer_iter().zip(log_probs) {
                if best.as_ref().map_or(lp.is_finite(), |(_, b)| lp > *b) {
                    best = Some((walker.to_owned(), lp));
                }
            }
        }
        best
    }

    /// One series per walker for a single parameter.
    fn walker_series(&self, discard: usize, param_idx: usize) -> Vec<Vec<f64>> {
        (0..self.n_walkers())
            .map(|w| {
                self.samples
                    .iter()
                    .skip(discard)
                    .map(|sample| sample[[w, param_idx]])
                    .collect()
            })
            .collect()
    }

    /// Gelman-Rubin potential scale reduction factor for each parameter.
    ///
    /// Each walker's post-discard series is split in half, giving 2M chains of length N.
    /// With W the mean within-chain variance and B the between-chain variance,
    /// `R-hat = sqrt(((N - 1) W + B) / (N W))`. Empty if fewer than 4 samples remain.
    ///
    /// # References
    ///
    /// Gelman, A., & Rubin, D. B. (1992). Inference from iterative simulation using
    /// multiple sequences. Statistical Science, 7(4), 457-472.
    pub fn r_hat(&self, discard: usize) -> IndexMap<String, f64> {
        let mut result = IndexMap::new();

        if self.is_empty() || discard >= self.len() || self.len() - discard < 4 {
            return result;
        }
        let n_split = (self.len() - discard) / 2;

        for (param_idx, param_name) in self.param_names.iter().enumerate() {
            let series = self.walker_series(discard, param_idx);
            let chains: Vec<&[f64]> = series
                .iter()
                .flat_map(|s| [&s[..n_split], &s[n_split..2 * n_split]])
                .collect();
            let n_chains = chains.len();

            let (means, vars): (Vec<f64>, Vec<f64>) = chains
                .iter()
                .map(|chain| {
                    let mean = chain.iter().sum::<f64>() / n_split as f64;
                    let var = chain.iter().map(|&x| (x - mean).powi(2)).sum::<f64>()
                        / (n_split - 1) as f64;
                    (mean, var)
                })
                .unzip();

            let w = vars.iter().sum::<f64>() / n_chains as f64;
            let overall_mean = means.iter().sum::<f64>() / n_chains as f64;
            let b = n_split as f64
                * means.iter().map(|&m| (m - overall_mean).powi(2)).sum::<f64>()
                / (n_chains - 1) as f64;
            let var_plus = ((n_split - 1) as f64 * w + b) / n_split as f64;

            result.insert(param_name.clone(), (var_plus / w).sqrt());
        }

        result
    }

    /// Whether every parameter has a finite R-hat below `threshold`.
    pub fn is_converged(&self, discard: usize, threshold: f64) -> bool {
        let r_hat = self.r_hat(discard);
        !r_hat.is_empty() && r_hat.values().all(|&v| v < threshold && v.is_finite())
    }

    /// Walker-averaged autocorrelation summed over lags until it first turns non-positive.
    fn summed_autocorrelation(&self, discard: usize, param_idx: usize) -> f64 {
        let n_keep = self.len() - discard;
        let n_walkers = self.n_walkers();
        let max_lag = (n_keep / 2).min(100);

        let mut avg_autocorr = vec![0.0; max_lag];
        for chain in self.walker_series(discard, param_idx) {
            for (avg, ac) in avg_autocorr
                .iter_mut()
                .zip(compute_autocorrelation(&chain, max_lag))
            {
                *avg += ac / n_walkers as f64;
            }
        }

        avg_autocorr.iter().take_while(|&&ac| ac > 0.0).sum()
    }

    /// Integrated autocorrelation time τ = 1 + 2 Σ ρ(k) for each parameter.
    ///
    /// Empty if fewer than 10 samples remain after `discard`.
    pub fn autocorr_time(&self, discard: usize) -> IndexMap<String, f64> {
        if self.is_empty() || discard >= self.len() || self.len() - discard < 10 {
            return IndexMap::new();
        }
        self.param_names
            .iter()
            .enumerate()
            .map(|(i, name)| {
                (
                    name.clone(),
                    1.0 + 2.0 * self.summed_autocorrelation(discard, i),
                )
            })
            .collect()
    }

    /// Effective number of independent samples across all walkers, N / τ.
    pub fn ess(&self, discard: usize) -> IndexMap<String, f64> {
        let n_total = (self.len().saturating_sub(discard) * self.n_walkers()) as f64;
        self.autocorr_time(discard)
            .into_iter()
            .map(|(name, tau)| (name, n_total / tau))
            .collect()
    }

    /// Write every sample as a whitespace-delimited row, walker-major.
    ///
    /// A `#` header names the columns. Values carry 10 significant digits.
    pub fn write_samples_table<W: Write>(&self, writer: &mut W) -> Result<()> {
        writeln!(writer, "# walker iteration {}", self.param_names.join(" "))?;
        let samples = self.samples();
        for (w, walker) in samples.outer_iter().enumerate() {
            for (i, row) in walker.outer_iter().enumerate() {
                let values: Vec<String> = row.iter().map(|v| format!("{:.9e}", v)).collect();
                writeln!(writer, "{} {} {}", w, i, values.join(" "))?;
            }
        }
        Ok(())
    }

    /// Write the log-posterior trace, one row per walker and one column per iteration.
    pub fn write_log_prob_table<W: Write>(&self, writer: &mut W) -> Result<()> {
        for walker in self.log_prob_trace().outer_iter() {
            let values: Vec<String> = walker.iter().map(|v| format!("{:.9e}", v)).collect();
            writeln!(writer, "{}", values.join(" "))?;
        }
        Ok(())
    }
}

/// Autocorrelation of `chain` at lags 1..=max_lag.
fn compute_autocorrelation(chain: &[f64], max_lag: usize) -> Vec<f64> {
    let n = chain.len();
    let mean = chain.iter().sum::<f64>() / n as f64;
    let variance = chain.iter().map(|&x| (x - mean).powi(2)).sum::<f64>() / n as f64;

    if variance == 0.0 {
        return vec![0.0; max_lag];
    }

    (1..=max_lag)
        .map(|lag| {
            if lag >= n {
                return 0.0;
            }
            let covariance = chain
                .iter()
                .zip(&chain[lag..])
                .map(|(a, b)| (a - mean) * (b - mean))
                .sum::<f64>()
                / (n - lag) as f64;
            covariance / variance
        })
        .collect()
}

/// The stretch move proposal, parameterised by its scale `a`.
///
/// The default value of 2.0 is the one recommended by Goodman & Weare (2010).
#[derive(Debug, Clone, Copy)]
pub struct StretchMove {
    pub a: f64,
}

impl Default for StretchMove {
    fn default() -> Self {
        Self { a: 2.0 }
    }
}

impl StretchMove {
    /// Create a stretch move with a custom scale, which must exceed 1.
    pub fn new(a: f64) -> Result<Self> {
        if !(a > 1.0 && a.is_finite()) {
            return Err(Error::InvalidParameter(format!(
                "Stretch move scale parameter must be > 1.0, got {}",
                a
            )));
        }
        Ok(Self { a })
    }

    /// Sample z from g(z) ∝ 1/sqrt(z) on [1/a, a].
    ///
    /// Inverse transform: z = ((a - 1) u + 1)² / a with u ~ Uniform(0, 1).
    pub fn sample_z<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        let u: f64 = rng.gen();
        ((self.a - 1.0) * u + 1.0).powi(2) / self.a
    }

    /// min(1, z^(n_params - 1) exp(log_prob_new - log_prob_old)).
    ///
    /// A non-finite proposal is never accepted.
    pub fn acceptance_probability(
        &self,
        z: f64,
        n_params: usize,
        log_prob_old: f64,
        log_prob_new: f64,
    ) -> f64 {
        if !log_prob_new.is_finite() {
            return 0.0;
        }
        if !log_prob_old.is_finite() {
            return 1.0;
        }

        let log_ratio = (n_params as f64 - 1.0) * z.ln() + (log_prob_new - log_prob_old);
        log_ratio.exp().min(1.0)
    }

    /// Propose y = c + z (x - c) with c drawn uniformly from the complementary walkers.
    pub fn propose<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        current_pos: ArrayView1<f64>,
        complementary_positions: &Array2<f64>,
    ) -> (Array1<f64>, f64) {
        let z = self.sample_z(rng);

        let comp_idx = rng.gen_range(0..complementary_positions.nrows());
        let comp_pos = complementary_positions.row(comp_idx);

        let proposal = &comp_pos + &((&current_pos - &comp_pos) * z);
        (proposal, z)
    }
}

/// Walker initialization strategy.
///
/// Every strategy yields distinct walkers strictly inside the prior box; random strategies
/// redraw a walker that lands outside.
#[derive(Debug, Clone)]
pub enum WalkerInit {
    /// Uniform draws from the prior box
    FromPrior,

    /// Uniform draws from a cube of side `radius` centred on `center`
    Ball { center: Vec<f64>, radius: f64 },

    /// Independent Gaussian perturbations of `center` with standard deviation `scale`
    Gaussian { center: Vec<f64>, scale: f64 },

    /// Explicit walker positions, shape (n_walkers, n_params)
    Explicit(Array2<f64>),
}

impl WalkerInit {
    /// Initial positions, shape (n_walkers, n_params).
    pub fn initialize<R: Rng + ?Sized>(
        &self,
        n_walkers: usize,
        prior: &PriorBounds,
        rng: &mut R,
    ) -> Result<Array2<f64>> {
        let n_params = prior.intervals().len();

        let positions = match self {
            WalkerInit::FromPrior => draw_walkers(n_walkers, n_params, prior, rng, |rng| {
                prior.sample(rng).to_vec()
            })?,
            WalkerInit::Ball { center, radius } => {
                check_center(center, n_params)?;
                draw_walkers(n_walkers, n_params, prior, rng, |rng| {
                    center
                        .iter()
                        .map(|c| c + (rng.gen::<f64>() - 0.5) * radius)
                        .collect()
                })?
            }
            WalkerInit::Gaussian { center, scale } => {
                check_center(center, n_params)?;
                draw_walkers(n_walkers, n_params, prior, rng, |rng| {
                    center
                        .iter()
                        .map(|c| c + scale * rng.sample::<f64, _>(StandardNormal))
                        .collect()
                })?
            }
            WalkerInit::Explicit(positions) => {
                if positions.dim() != (n_walkers, n_params) {
                    return Err(Error::InvalidParameter(format!(
                        "Explicit positions have shape {:?}, expected ({}, {})",
                        positions.dim(),
                        n_walkers,
                        n_params
                    )));
                }
                for (i, row) in positions.outer_iter().enumerate() {
                    if !row.as_slice().map_or(false, |theta| prior.contains(theta)) {
                        return Err(Error::InvalidParameter(format!(
                            "Explicit walker {} lies outside the prior",
                            i
                        )));
                    }
                    if positions.outer_iter().take(i).any(|other| other == row) {
                        return Err(Error::InvalidParameter(format!(
                            "Explicit walker {} duplicates an earlier walker",
                            i
                        )));
                    }
                }
                positions.clone()
            }
        };

        Ok(positions)
    }
}

fn check_center(center: &[f64], n_params: usize) -> Result<()> {
    if center.len() != n_params {
        return Err(Error::InvalidParameter(format!(
            "Initial center length {} does not match parameter count {}",
            center.len(),
            n_params
        )));
    }
    if !center.iter().all(|v| v.is_finite()) {
        return Err(Error::InvalidParameter(format!(
            "Initial center contains non-finite values: {:?}",
            center
        )));
    }
    Ok(())
}

fn draw_walkers<R, F>(
    n_walkers: usize,
    n_params: usize,
    prior: &PriorBounds,
    rng: &mut R,
    mut draw: F,
) -> Result<Array2<f64>>
where
    R: Rng + ?Sized,
    F: FnMut(&mut R) -> Vec<f64>,
{
    let mut positions = Array2::zeros((n_walkers, n_params));
    for i in 0..n_walkers {
        let mut attempts = 0;
        let walker = loop {
            if attempts == MAX_INIT_ATTEMPTS {
                return Err(Error::Config(format!(
                    "Could not place walker {} inside the prior after {} attempts",
                    i, MAX_INIT_ATTEMPTS
                )));
            }
            attempts += 1;

            let candidate = draw(rng);
            let duplicate = positions
                .outer_iter()
                .take(i)
                .any(|row| row.iter().eq(candidate.iter()));
            if prior.contains(&candidate) && !duplicate {
                break candidate;
            }
        };
        positions.row_mut(i).assign(&ArrayView1::from(walker.as_slice()));
    }
    Ok(positions)
}

/// Affine-invariant ensemble sampler over any [`LogPosterior`].
///
/// Each iteration splits the walkers into two halves. Proposals for one half are drawn
/// against the other half's current positions, evaluated in parallel on the sampler's
/// thread pool, then accepted or rejected sequentially with the caller's RNG. Given the
/// same seed and starting positions a run is reproducible regardless of the thread count.
pub struct EnsembleSampler<P: LogPosterior> {
    posterior: P,
    stretch: StretchMove,
    pool: rayon::ThreadPool,
}

impl<P: LogPosterior> EnsembleSampler<P> {
    /// `n_threads` of `None` uses every available core.
    pub fn new(posterior: P, stretch: StretchMove, n_threads: Option<usize>) -> Result<Self> {
        let mut builder = rayon::ThreadPoolBuilder::new();
        if let Some(n) = n_threads {
            builder = builder.num_threads(n);
        }
        let pool = builder
            .build()
            .map_err(|e| Error::Config(format!("Could not build thread pool: {}", e)))?;

        Ok(Self {
            posterior,
            stretch,
            pool,
        })
    }

    pub fn posterior(&self) -> &P {
        &self.posterior
    }

    pub fn stretch(&self) -> &StretchMove {
        &self.stretch
    }

    pub fn n_threads(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Evaluate the log posterior for a batch of positions in parallel.
    pub fn log_prob_batch(&self, positions: &[Array1<f64>]) -> Vec<f64> {
        self.pool.install(|| {
            positions
                .par_iter()
                .map(|theta| match theta.as_slice() {
                    Some(theta) => self.posterior.ln_prob(theta),
                    None => self.posterior.ln_prob(&theta.to_vec()),
                })
                .collect()
        })
    }

    /// Build a state at `positions` with their log probabilities evaluated.
    pub fn initial_state(
        &self,
        positions: Array2<f64>,
        param_names: Vec<String>,
    ) -> Result<SamplerState> {
        if positions.ncols() != self.posterior.n_params() {
            return Err(Error::SamplingError(format!(
                "Positions have {} parameters, posterior expects {}",
                positions.ncols(),
                self.posterior.n_params()
            )));
        }
        let mut state = SamplerState::new(positions, param_names)?;
        let rows: Vec<Array1<f64>> = state.positions.outer_iter().map(|r| r.to_owned()).collect();
        state.log_probs = Array1::from_vec(self.log_prob_batch(&rows));
        Ok(state)
    }

    /// Advance every walker once: first half against the second, then the reverse.
    pub fn step<R: Rng + ?Sized>(&self, state: &mut SamplerState, rng: &mut R) -> Result<()> {
        let n_walkers = state.n_walkers();
        if n_walkers % 2 != 0 {
            return Err(Error::SamplingError(
                "Number of walkers must be even".to_string(),
            ));
        }
        let half = n_walkers / 2;

        self.update_group(state, 0..half, half..n_walkers, rng);
        self.update_group(state, half..n_walkers, 0..half, rng);
        Ok(())
    }

    /// Run `n_iterations` steps, calling `on_iteration` after each one.
    pub fn run<R, F>(
        &self,
        state: &mut SamplerState,
        n_iterations: usize,
        rng: &mut R,
        mut on_iteration: F,
    ) -> Result<()>
    where
        R: Rng + ?Sized,
        F: FnMut(usize, &SamplerState) -> Result<()>,
    {
        for iteration in 0..n_iterations {
            self.step(state, rng)?;
            on_iteration(iteration, state)?;
        }
        Ok(())
    }

    fn update_group<R: Rng + ?Sized>(
        &self,
        state: &mut SamplerState,
        active_range: std::ops::Range<usize>,
        complementary_range: std::ops::Range<usize>,
        rng: &mut R,
    ) {
        let complementary_positions = state
            .positions
            .slice(ndarray::s![complementary_range, ..])
            .to_owned();

        let (proposals, stretches): (Vec<Array1<f64>>, Vec<f64>) = active_range
            .clone()
            .map(|i| {
                self.stretch
                    .propose(&mut *rng, state.positions.row(i), &complementary_positions)
            })
            .unzip();

        let proposal_log_probs = self.log_prob_batch(&proposals);

        let n_params = state.n_params();
        for (walker_idx, ((proposal, z), log_prob_new)) in active_range.zip(
            proposals
                .iter()
                .zip(stretches)
                .zip(proposal_log_probs),
        ) {
            let accept_prob = self.stretch.acceptance_probability(
                z,
                n_params,
                state.log_probs[walker_idx],
                log_prob_new,
            );

            state.n_proposed[walker_idx] += 1;
            if rng.gen::<f64>() < accept_prob {
                state.positions.row_mut(walker_idx).assign(proposal);
                state.log_probs[walker_idx] = log_prob_new;
                state.n_accepted[walker_idx] += 1;
            }
        }
    }
}
