use log::{debug, warn};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;

use crate::cancel::{CancelToken, Deadline};
use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::records::{FixtureId, Prob3, classify_outcome};
use crate::score_dist::ScoreDistribution;

/// Trials drawn per worker block. Blocks are the unit of seed partitioning
/// and of cancellation.
pub const BLOCK_TRIALS: usize = 4096;

/// One batch of independently drawn full-round outcomes. Row-major:
/// `outcomes[trial * fixtures + fixture_index]`. Owned by the simulator call
/// that produced it and read-only afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct SimulationRun {
    seed: u64,
    max_goals: u8,
    fixtures: Vec<FixtureId>,
    outcomes: Vec<(u8, u8)>,
}

impl SimulationRun {
    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn trials(&self) -> usize {
        if self.fixtures.is_empty() {
            0
        } else {
            self.outcomes.len() / self.fixtures.len()
        }
    }

    pub fn fixtures(&self) -> &[FixtureId] {
        &self.fixtures
    }

    pub fn max_goals(&self) -> u8 {
        self.max_goals
    }

    /// All per-fixture scores of one trial, in fixture order.
    pub fn trial(&self, trial: usize) -> &[(u8, u8)] {
        let n = self.fixtures.len();
        &self.outcomes[trial * n..(trial + 1) * n]
    }

    pub fn outcome(&self, trial: usize, fixture_index: usize) -> (u8, u8) {
        self.outcomes[trial * self.fixtures.len() + fixture_index]
    }

    /// Empirical per-cell frequencies for one fixture, aligned with the
    /// source table's layout. Overflow draws sit at the cap pair.
    pub fn empirical_cell_probs(&self, fixture_index: usize) -> Vec<f64> {
        let side = self.max_goals as usize + 1;
        let mut counts = vec![0usize; side * side];
        let n = self.fixtures.len();
        for trial in 0..self.trials() {
            let (h, a) = self.outcomes[trial * n + fixture_index];
            counts[h as usize * side + a as usize] += 1;
        }
        let total = self.trials().max(1) as f64;
        counts.into_iter().map(|c| c as f64 / total).collect()
    }

    pub fn empirical_outcome_probs(&self, fixture_index: usize) -> Prob3 {
        let mut probs = Prob3 {
            home: 0.0,
            draw: 0.0,
            away: 0.0,
        };
        let n = self.fixtures.len();
        let share = 1.0 / self.trials().max(1) as f64;
        for trial in 0..self.trials() {
            let (h, a) = self.outcomes[trial * n + fixture_index];
            match classify_outcome(h, a) {
                crate::records::Outcome::Home => probs.home += share,
                crate::records::Outcome::Draw => probs.draw += share,
                crate::records::Outcome::Away => probs.away += share,
            }
        }
        probs
    }
}

/// Draws full-round outcomes from per-fixture score distributions by
/// inverse-CDF sampling.
///
/// Trials are sharded into fixed blocks; block `b` draws from its own
/// `ChaCha8` stream seeded from `(master seed, b)`, and blocks are
/// reassembled in index order, so a run is bit-identical for any worker
/// count. Cancellation is observed at block granularity: the contiguous
/// completed prefix is returned as a valid, smaller run.
#[derive(Debug, Clone)]
pub struct MonteCarloSimulator {
    trials: usize,
    seed: u64,
    workers: usize,
    cancel_timeout_secs: u64,
}

impl MonteCarloSimulator {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            trials: config.trials,
            seed: config.seed,
            workers: config.workers,
            cancel_timeout_secs: config.cancel_timeout_secs,
        }
    }

    pub fn simulate(
        &self,
        distributions: &[ScoreDistribution],
        cancel: &CancelToken,
    ) -> Result<SimulationRun> {
        self.simulate_trials(distributions, self.trials, cancel)
    }

    /// Same as `simulate` with an explicit trial count; the optimizer uses a
    /// smaller count for candidate screening.
    pub fn simulate_trials(
        &self,
        distributions: &[ScoreDistribution],
        trials: usize,
        cancel: &CancelToken,
    ) -> Result<SimulationRun> {
        if distributions.is_empty() {
            return Err(EngineError::invalid("no distributions to simulate"));
        }
        if trials == 0 {
            return Err(EngineError::invalid("trial count must be positive"));
        }
        let max_goals = distributions[0].max_goals();
        for dist in distributions {
            dist.validate()?;
            if dist.max_goals() != max_goals {
                return Err(EngineError::invalid(
                    "distributions in one round must share a score cap",
                ));
            }
        }

        let fixtures: Vec<FixtureId> = distributions.iter().map(|d| d.fixture()).collect();
        let cdfs: Vec<Vec<f64>> = distributions.iter().map(|d| d.sampling_cdf()).collect();
        let n_blocks = trials.div_ceil(BLOCK_TRIALS);

        let deadline = Deadline::after_secs(self.cancel_timeout_secs);
        let draw_block = |block: usize| -> Option<Vec<(u8, u8)>> {
            if cancel.is_cancelled() || deadline.expired() {
                return None;
            }
            let start = block * BLOCK_TRIALS;
            let len = BLOCK_TRIALS.min(trials - start);
            let mut rng = ChaCha8Rng::seed_from_u64(block_seed(self.seed, block as u64));
            let mut out = Vec::with_capacity(len * distributions.len());
            for _ in 0..len {
                for (cdf, dist) in cdfs.iter().zip(distributions) {
                    let u: f64 = rng.gen_range(0.0..1.0);
                    let idx = cdf.partition_point(|&c| c < u);
                    out.push(dist.score_at(idx));
                }
            }
            Some(out)
        };

        let blocks: Vec<Option<Vec<(u8, u8)>>> = if self.workers > 0 {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(self.workers)
                .build()
                .map_err(|e| EngineError::invalid(format!("worker pool: {e}")))?;
            pool.install(|| (0..n_blocks).into_par_iter().map(draw_block).collect())
        } else {
            (0..n_blocks).into_par_iter().map(draw_block).collect()
        };

        let mut outcomes = Vec::with_capacity(trials * fixtures.len());
        let mut completed_trials = 0usize;
        for block in blocks {
            let Some(mut drawn) = block else { break };
            completed_trials += drawn.len() / fixtures.len();
            outcomes.append(&mut drawn);
        }

        if completed_trials == 0 {
            return Err(EngineError::Cancelled { completed: 0 });
        }
        if completed_trials < trials {
            warn!("simulation cancelled: {completed_trials}/{trials} trials kept");
        } else {
            debug!("simulated {completed_trials} trials over {} fixtures", fixtures.len());
        }

        Ok(SimulationRun {
            seed: self.seed,
            max_goals,
            fixtures,
            outcomes,
        })
    }
}

/// SplitMix64 over the master seed and block index; adjacent blocks get
/// well-separated streams.
fn block_seed(master: u64, block: u64) -> u64 {
    let mut z = master
        .wrapping_add(block.wrapping_mul(0x9E37_79B9_7F4A_7C15))
        .wrapping_add(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}
