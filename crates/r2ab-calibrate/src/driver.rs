//! Burn-in / production state machine around the ensemble sampler.
//!
//! The driver moves strictly forward through
//! `Initialized → BurnIn → Production → Complete`:
//!
//! - `Initialized`: walkers are seeded inside the prior and their log posteriors evaluated
//! - `BurnIn`: `burnin` iterations are run and discarded
//! - `Production`: `niter` iterations are recorded into the [`Chain`]
//! - `Complete`: the chain is handed back through [`McmcDriver::finish`]
//!
//! Calling a phase out of order is an error and leaves the driver untouched.

use crate::config::SamplerSettings;
use crate::likelihood::LogLikelihood;
use crate::posterior::{EvaluationCounts, Posterior};
use crate::sampler::{Chain, EnsembleSampler, ProgressInfo, SamplerState, StretchMove, WalkerInit};
use crate::{Error, Result};
use ndarray::Array1;
use r2ab_core::params::PARAM_NAMES;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::fmt;
use tracing::{info, warn};

/// Acceptance fractions outside this range usually indicate a poorly mixing ensemble.
const HEALTHY_ACCEPTANCE: (f64, f64) = (0.1, 0.7);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverPhase {
    Initialized,
    BurnIn,
    Production,
    Complete,
}

impl fmt::Display for DriverPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DriverPhase::Initialized => "initialized",
            DriverPhase::BurnIn => "burn-in",
            DriverPhase::Production => "production",
            DriverPhase::Complete => "complete",
        };
        write!(f, "{}", name)
    }
}

/// Result of a completed run.
#[derive(Debug, Clone)]
pub struct McmcOutput {
    /// Production samples, (walker, iteration, parameter)
    pub chain: Chain,
    /// Per-walker acceptance fraction over the production phase
    pub acceptance_fraction: Array1<f64>,
    /// Posterior evaluation counters over the whole run
    pub counts: EvaluationCounts,
}

/// Runs the ensemble sampler through burn-in and production.
pub struct McmcDriver<L: LogLikelihood> {
    settings: SamplerSettings,
    sampler: EnsembleSampler<Posterior<L>>,
    state: SamplerState,
    chain: Chain,
    rng: ChaCha8Rng,
    phase: DriverPhase,
}

impl<L: LogLikelihood> McmcDriver<L> {
    /// Seed walkers with Gaussian perturbations of `settings.initial_guess`.
    pub fn new(settings: SamplerSettings, posterior: Posterior<L>) -> Result<Self> {
        let init = WalkerInit::Gaussian {
            center: settings.initial_guess.to_vec(),
            scale: settings.init_scale,
        };
        Self::with_walker_init(settings, posterior, init)
    }

    pub fn with_walker_init(
        settings: SamplerSettings,
        posterior: Posterior<L>,
        init: WalkerInit,
    ) -> Result<Self> {
        settings.validate()?;

        let mut rng = match settings.seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        };
        let positions = init.initialize(settings.nwalkers, posterior.prior(), &mut rng)?;

        let stretch = StretchMove::new(settings.stretch_scale)?;
        let sampler = EnsembleSampler::new(posterior, stretch, settings.n_threads)?;

        let param_names: Vec<String> = PARAM_NAMES.iter().map(|s| s.to_string()).collect();
        let state = sampler.initial_state(positions, param_names.clone())?;
        if state.log_probs.iter().all(|lp| !lp.is_finite()) {
            warn!("No walker has a finite log posterior at the starting positions");
        }
        info!(
            nwalkers = settings.nwalkers,
            threads = sampler.n_threads(),
            mean_log_prob = state.mean_log_prob(),
            "Initialized ensemble"
        );

        Ok(Self {
            chain: Chain::with_capacity(param_names, settings.niter),
            settings,
            sampler,
            state,
            rng,
            phase: DriverPhase::Initialized,
        })
    }

    pub fn phase(&self) -> DriverPhase {
        self.phase
    }

    pub fn state(&self) -> &SamplerState {
        &self.state
    }

    pub fn settings(&self) -> &SamplerSettings {
        &self.settings
    }

    pub fn posterior(&self) -> &Posterior<L> {
        self.sampler.posterior()
    }

    fn expect_phase(&self, expected: DriverPhase, action: &str) -> Result<()> {
        if self.phase != expected {
            return Err(Error::SamplingError(format!(
                "Cannot {} while the driver is {} (expected {})",
                action, self.phase, expected
            )));
        }
        Ok(())
    }

    /// Run and discard the burn-in iterations.
    pub fn run_burn_in(&mut self) -> Result<()> {
        self.run_burn_in_with_progress(|_| {})
    }

    pub fn run_burn_in_with_progress<F>(&mut self, mut progress: F) -> Result<()>
    where
        F: FnMut(&ProgressInfo),
    {
        self.expect_phase(DriverPhase::Initialized, "start burn-in")?;
        self.phase = DriverPhase::BurnIn;

        let total = self.settings.burnin;
        let posterior = self.sampler.posterior();
        self.sampler
            .run(&mut self.state, total, &mut self.rng, |iteration, state| {
                progress(&progress_info(DriverPhase::BurnIn, iteration, total, state, posterior));
                Ok(())
            })?;

        let acceptance = self.state.mean_acceptance_rate();
        info!(
            iterations = total,
            acceptance,
            mean_log_prob = self.state.mean_log_prob(),
            "Burn-in complete"
        );
        Ok(())
    }

    /// Run the recorded iterations, starting from the final burn-in state.
    pub fn run_production(&mut self) -> Result<()> {
        self.run_production_with_progress(|_| {})
    }

    pub fn run_production_with_progress<F>(&mut self, mut progress: F) -> Result<()>
    where
        F: FnMut(&ProgressInfo),
    {
        self.expect_phase(DriverPhase::BurnIn, "start production")?;
        self.phase = DriverPhase::Production;
        self.state.reset_counters();

        let total = self.settings.niter;
        let posterior = self.sampler.posterior();
        let chain = &mut self.chain;
        self.sampler
            .run(&mut self.state, total, &mut self.rng, |iteration, state| {
                chain.push(state.positions.clone(), state.log_probs.clone())?;
                progress(&progress_info(
                    DriverPhase::Production,
                    iteration,
                    total,
                    state,
                    posterior,
                ));
                Ok(())
            })?;

        let acceptance = self.state.mean_acceptance_rate();
        if acceptance < HEALTHY_ACCEPTANCE.0 || acceptance > HEALTHY_ACCEPTANCE.1 {
            warn!(
                acceptance,
                "Mean acceptance fraction outside [{}, {}]",
                HEALTHY_ACCEPTANCE.0,
                HEALTHY_ACCEPTANCE.1
            );
        }
        let counts = posterior.counts();
        info!(
            iterations = total,
            acceptance,
            prior_rejections = counts.prior_rejections,
            likelihood_failures = counts.likelihood_failures,
            "Production complete"
        );

        self.phase = DriverPhase::Complete;
        Ok(())
    }

    /// Hand back the recorded chain once production has finished.
    pub fn finish(self) -> Result<McmcOutput> {
        self.expect_phase(DriverPhase::Complete, "collect the chain")?;
        Ok(McmcOutput {
            acceptance_fraction: self.state.acceptance_fraction(),
            counts: self.sampler.posterior().counts(),
            chain: self.chain,
        })
    }

    /// Burn-in, production and collection in one call.
    pub fn run(self) -> Result<McmcOutput> {
        self.run_with_progress(|_| {})
    }

    pub fn run_with_progress<F>(mut self, mut progress: F) -> Result<McmcOutput>
    where
        F: FnMut(&ProgressInfo),
    {
        self.run_burn_in_with_progress(&mut progress)?;
        self.run_production_with_progress(&mut progress)?;
        self.finish()
    }
}

fn progress_info<L: LogLikelihood>(
    phase: DriverPhase,
    iteration: usize,
    total: usize,
    state: &SamplerState,
    posterior: &Posterior<L>,
) -> ProgressInfo {
    ProgressInfo {
        phase,
        iteration,
        total,
        acceptance_rate: state.mean_acceptance_rate(),
        mean_log_prob: state.mean_log_prob(),
        failures: posterior.likelihood().failures(),
    }
}
