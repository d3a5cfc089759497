use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::config::ScoringTable;
use crate::error::{EngineError, Result};
use crate::records::{FixtureId, Outcome, classify_outcome};
use crate::simulate::SimulationRun;

/// Trial count above which run scoring fans out over rayon.
const PARALLEL_SCORING_THRESHOLD: usize = 16_384;

/// Stake split onto a second outcome of the same fixture to cut variance.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Hedge {
    pub secondary: Outcome,
    /// Share moved to the secondary outcome, in (0, 0.5].
    pub weight: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Pick {
    pub fixture: FixtureId,
    pub outcome: Outcome,
    /// Predicted scoreline for the exact-score bonus.
    pub scoreline: Option<(u8, u8)>,
    pub hedge: Option<Hedge>,
}

/// One candidate set of picks for a round: one pick per fixture in round
/// order, at most one banker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PickSet {
    pub picks: Vec<Pick>,
    /// Index into `picks` of the double-weighted selection.
    pub banker: Option<usize>,
}

impl PickSet {
    /// Checks the set against the round's fixture list: same fixtures in the
    /// same order, banker in range, hedges well-formed.
    pub fn validate(&self, fixtures: &[FixtureId]) -> Result<()> {
        if self.picks.len() != fixtures.len() {
            return Err(EngineError::invalid(format!(
                "pick set covers {} fixtures, round has {}",
                self.picks.len(),
                fixtures.len()
            )));
        }
        for (pick, &fixture) in self.picks.iter().zip(fixtures) {
            if pick.fixture != fixture {
                return Err(EngineError::invalid(format!(
                    "pick for {:?} out of round order (expected {:?})",
                    pick.fixture, fixture
                )));
            }
            if let Some(hedge) = pick.hedge {
                if hedge.secondary == pick.outcome {
                    return Err(EngineError::invalid(
                        "hedge secondary must differ from the primary pick",
                    ));
                }
                if !(hedge.weight > 0.0 && hedge.weight <= 0.5) {
                    return Err(EngineError::invalid(format!(
                        "hedge weight {} outside (0, 0.5]",
                        hedge.weight
                    )));
                }
            }
        }
        if let Some(banker) = self.banker {
            if banker >= self.picks.len() {
                return Err(EngineError::invalid(format!(
                    "banker index {banker} out of range"
                )));
            }
        }
        Ok(())
    }
}

fn outcome_index(outcome: Outcome) -> usize {
    match outcome {
        Outcome::Home => 0,
        Outcome::Draw => 1,
        Outcome::Away => 2,
    }
}

/// Per-fixture scoring lookup: points by actual outcome class, plus the
/// exact-score bonus term. Precomputed once per pick set so run scoring is a
/// flat pass over the trial buffer.
struct FixtureScorer {
    by_outcome: [f64; 3],
    exact_line: Option<(u8, u8)>,
    exact_points: f64,
}

fn build_scorers(set: &PickSet, table: &ScoringTable) -> Vec<FixtureScorer> {
    set.picks
        .iter()
        .enumerate()
        .map(|(i, pick)| {
            let multiplier = if set.banker == Some(i) {
                table.banker_multiplier
            } else {
                1.0
            };
            let (primary_share, hedge) = match pick.hedge {
                Some(h) => (1.0 - h.weight, Some(h)),
                None => (1.0, None),
            };

            let mut by_outcome = [0.0_f64; 3];
            by_outcome[outcome_index(pick.outcome)] +=
                primary_share * table.correct_result as f64;
            if let Some(h) = hedge {
                by_outcome[outcome_index(h.secondary)] += h.weight * table.correct_result as f64;
            }
            for points in &mut by_outcome {
                *points *= multiplier;
            }

            FixtureScorer {
                by_outcome,
                exact_line: pick.scoreline,
                exact_points: primary_share * table.exact_score_bonus as f64 * multiplier,
            }
        })
        .collect()
}

fn score_row(row: &[(u8, u8)], scorers: &[FixtureScorer]) -> f64 {
    let mut total = 0.0;
    for ((h, a), scorer) in row.iter().zip(scorers) {
        total += scorer.by_outcome[outcome_index(classify_outcome(*h, *a))];
        if scorer.exact_line == Some((*h, *a)) {
            total += scorer.exact_points;
        }
    }
    total
}

/// Points for one concrete round outcome under the competition table. Pure:
/// same inputs, same score.
pub fn score_outcome(outcome_row: &[(u8, u8)], set: &PickSet, table: &ScoringTable) -> f64 {
    score_row(outcome_row, &build_scorers(set, table))
}

/// Points for every trial of a run. The per-fixture lookups are built once;
/// large runs shard over rayon with a plain collect as the only reduction.
pub fn score_run(run: &SimulationRun, set: &PickSet, table: &ScoringTable) -> Vec<f64> {
    let scorers = build_scorers(set, table);
    let trials = run.trials();
    if trials >= PARALLEL_SCORING_THRESHOLD {
        (0..trials)
            .into_par_iter()
            .map(|t| score_row(run.trial(t), &scorers))
            .collect()
    } else {
        (0..trials).map(|t| score_row(run.trial(t), &scorers)).collect()
    }
}
