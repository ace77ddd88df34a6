//! Parallel orchestrator: one Markov chain per division, batched over a
//! bounded rayon pool, telescoped into a single lnZ sample per bin.

use rayon::prelude::*;

use crate::rng::chain_seed;
use crate::schedule::Division;
use crate::sse::SseEngine;

/// Fold the running ratio product into log space below this value.
const UNDERFLOW_GUARD: f64 = 1e-10;

/// Run parameters shared by every chain in a bin.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub l: usize,
    pub beta: f64,
    /// Thermalization sweeps (cutoff growth allowed).
    pub step_thm: usize,
    /// Measurement sweeps (cutoff frozen).
    pub step_stat: usize,
    /// Maximum number of concurrent chains.
    pub n_thread: usize,
}

/// Run one chain start to finish and return its ratio estimate.
///
/// The chain owns all its state; nothing is shared with other chains.
pub fn run_chain(cfg: &RunConfig, division: Division, seed: u64) -> f64 {
    let mut engine = SseEngine::new(cfg.l, division.alpha, cfg.beta, division.jw, seed);

    for _ in 0..cfg.step_thm {
        engine.sweep();
        engine.adjust_cutoff();
    }
    engine.reset_measurement();
    for _ in 0..cfg.step_stat {
        engine.sweep();
        engine.measure();
    }
    engine.finalize()
}

/// Run every division of one bin and combine the ratios into a lnZ sample.
///
/// Divisions execute in batches of at most `n_thread` chains on `pool`;
/// each batch joins fully before the next starts, and ratios are collected
/// in schedule order. Chain seeds derive from `master_seed` and the
/// division index, so no two chains share a stream.
pub fn run_bin(
    cfg: &RunConfig,
    divisions: &[Division],
    pool: &rayon::ThreadPool,
    master_seed: u64,
) -> f64 {
    let mut ratios = Vec::with_capacity(divisions.len());

    for (batch_idx, batch) in divisions.chunks(cfg.n_thread).enumerate() {
        let base = batch_idx * cfg.n_thread;
        let batch_ratios: Vec<f64> = pool.install(|| {
            batch
                .par_iter()
                .enumerate()
                .map(|(i, &division)| run_chain(cfg, division, chain_seed(master_seed, base + i)))
                .collect()
        });
        ratios.extend(batch_ratios);
    }

    ln_z_from_ratios(cfg, &ratios)
}

/// Telescope the per-division ratios into an accumulated log-sum.
///
/// The running product is folded into the log accumulator whenever it
/// drops below `1e-10`, so arbitrarily long schedules cannot underflow.
pub fn telescope_log(ratios: &[f64]) -> f64 {
    let mut log_sum = 0.0;
    let mut product = 1.0;
    for &r in ratios {
        product *= r;
        if product < UNDERFLOW_GUARD {
            log_sum += product.ln();
            product = 1.0;
        }
    }
    log_sum + product.ln()
}

/// Final combination written out per bin: `beta * (L/2) - sum(log ratios)`.
/// The boundary term is taken from the reference algorithm as given;
/// changing it would silently shift every result.
pub fn ln_z_from_ratios(cfg: &RunConfig, ratios: &[f64]) -> f64 {
    let n_strong = (cfg.l / 2) as f64;
    cfg.beta * n_strong - telescope_log(ratios)
}
