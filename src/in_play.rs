use chrono::{DateTime, Utc};

use crate::config::EngineConfig;
use crate::error::Result;
use crate::records::FixtureId;
use crate::score_dist::{ScoreDistribution, ScoreDistributionEngine};

const MATCH_MINUTES: u32 = 90;
/// Floor for remaining scoring rates so the table builder always sees a
/// positive rate inside the final bucket.
const MIN_REMAINING_RATE: f64 = 1e-4;

/// Live score model over (time-bucket, current-score) states.
///
/// Scoring is a Poisson process per side, time-homogeneous within a bucket.
/// The full-match rates are the ones implied by the pre-match distribution's
/// marginal means; as buckets elapse the remaining rates shrink
/// proportionally. A live forecast is the remaining-goals distribution
/// convolved with the current score. Past the final whistle the state is
/// terminal and the distribution degenerates onto the current score.
#[derive(Debug, Clone)]
pub struct InPlayMarkovModel {
    bucket_minutes: u32,
    max_goals: u8,
    remaining_engine: ScoreDistributionEngine,
}

impl InPlayMarkovModel {
    pub fn new(config: &EngineConfig) -> Self {
        // The low-score correction is a full-match empirical artifact; it is
        // not applied to partial-remainder tables. Copula dependence and
        // dispersion carry over unchanged.
        let remaining_config = EngineConfig {
            dc_rho: 0.0,
            ..config.clone()
        };
        Self {
            bucket_minutes: config.bucket_minutes,
            max_goals: config.max_goals,
            remaining_engine: ScoreDistributionEngine::new(&remaining_config),
        }
    }

    /// Bucket containing `minute`, counting from kickoff.
    pub fn bucket_index(&self, minute: u32) -> u32 {
        minute.min(MATCH_MINUTES) / self.bucket_minutes
    }

    /// Fraction of the match still ahead, snapped to whole buckets. Elapsed
    /// time inside the current bucket does not decrement the rate; that is
    /// the time-homogeneous-within-bucket approximation.
    fn remaining_fraction(&self, minute: u32) -> f64 {
        if minute >= MATCH_MINUTES {
            return 0.0;
        }
        let total_buckets = MATCH_MINUTES.div_ceil(self.bucket_minutes);
        let remaining_buckets = total_buckets - self.bucket_index(minute);
        (remaining_buckets * self.bucket_minutes) as f64 / MATCH_MINUTES as f64
    }

    /// Remaining expected goals per side from now to the final whistle.
    pub fn remaining_rates(&self, pre_match: &ScoreDistribution, minute: u32) -> (f64, f64) {
        let (full_home, full_away) = pre_match.expected_goals();
        let fraction = self.remaining_fraction(minute).min(1.0);
        (
            (full_home * fraction).max(MIN_REMAINING_RATE),
            (full_away * fraction).max(MIN_REMAINING_RATE),
        )
    }

    /// Live final-score distribution given elapsed time and the current
    /// score, in the same representation as the pre-match table.
    pub fn live_distribution(
        &self,
        pre_match: &ScoreDistribution,
        minute: u32,
        score: (u8, u8),
        generated_at: DateTime<Utc>,
    ) -> Result<ScoreDistribution> {
        if minute >= MATCH_MINUTES {
            return self.terminal_distribution(pre_match.fixture(), score, generated_at);
        }

        let (rate_home, rate_away) = self.remaining_rates(pre_match, minute);
        let remaining = self.remaining_engine.build(
            pre_match.fixture(),
            rate_home,
            rate_away,
            generated_at,
        )?;
        self.convolve(&remaining, score, generated_at)
    }

    /// Shifts a remaining-goals table by the goals already on the board.
    /// Mass pushed past the cap joins the overflow bucket.
    fn convolve(
        &self,
        remaining: &ScoreDistribution,
        score: (u8, u8),
        generated_at: DateTime<Utc>,
    ) -> Result<ScoreDistribution> {
        let side = self.max_goals as usize + 1;
        let mut cells = vec![0.0_f64; side * side];
        let mut overflow = remaining.overflow();

        for extra_home in 0..=self.max_goals {
            for extra_away in 0..=self.max_goals {
                let p = remaining.prob(extra_home, extra_away);
                if p == 0.0 {
                    continue;
                }
                let final_home = score.0 as u16 + extra_home as u16;
                let final_away = score.1 as u16 + extra_away as u16;
                if final_home > self.max_goals as u16 || final_away > self.max_goals as u16 {
                    overflow += p;
                } else {
                    cells[final_home as usize * side + final_away as usize] += p;
                }
            }
        }

        ScoreDistribution::from_table(
            remaining.fixture(),
            generated_at,
            self.max_goals,
            cells,
            overflow,
        )
    }

    fn terminal_distribution(
        &self,
        fixture: FixtureId,
        score: (u8, u8),
        generated_at: DateTime<Utc>,
    ) -> Result<ScoreDistribution> {
        let side = self.max_goals as usize + 1;
        let mut cells = vec![0.0_f64; side * side];
        let home = score.0.min(self.max_goals) as usize;
        let away = score.1.min(self.max_goals) as usize;
        cells[home * side + away] = 1.0;
        ScoreDistribution::from_table(fixture, generated_at, self.max_goals, cells, 0.0)
    }
}
