use log::debug;
use serde::{Deserialize, Serialize};

use crate::config::{EngineConfig, ScoringTable};
use crate::error::{EngineError, Result};
use crate::records::{Outcome, Prob3};
use crate::rivals::RivalModel;
use crate::score_dist::ScoreDistribution;
use crate::scoring::{Hedge, Pick, PickSet, score_run};
use crate::simulate::SimulationRun;

/// Local-search rounds before the optimizer settles.
const MAX_SEARCH_ROUNDS: usize = 12;
/// Banker candidates considered beyond "no banker".
const BANKER_CANDIDATES: usize = 3;
/// Stake share tried on the hedge leg.
const HEDGE_WEIGHT: f64 = 0.25;
/// Strict-improvement threshold; keeps the search deterministic under float
/// noise.
const IMPROVEMENT_EPS: f64 = 1e-9;

/// The selected pick set with the simulation evidence behind it. Immutable
/// once emitted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyRecommendation {
    pub pick_set: PickSet,
    pub expected_points: f64,
    pub variance: f64,
    /// Share of trials strictly beating the target rival's projected score.
    /// Present only when a target was supplied.
    pub p_beat_rival: Option<f64>,
    pub objective: f64,
    pub trials: usize,
}

/// Searches pick-set space for the best round strategy.
///
/// Closed-form per-fixture expected values only seed the search and propose
/// moves; every accepted decision is validated against the actual simulation
/// run. The objective is expected points minus `risk_penalty` times a risk
/// term: score variance by default, or the probability of finishing below
/// the target rival when one is named. Deterministic for a given run and
/// rival model.
#[derive(Debug, Clone)]
pub struct StrategyOptimizer {
    table: ScoringTable,
    risk_penalty: f64,
}

struct Evaluation {
    mean: f64,
    variance: f64,
    p_beat: Option<f64>,
    objective: f64,
}

impl StrategyOptimizer {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            table: config.scoring,
            risk_penalty: config.risk_penalty,
        }
    }

    pub fn optimize(
        &self,
        distributions: &[ScoreDistribution],
        run: &SimulationRun,
        rivals: &RivalModel,
        target_rival: Option<&str>,
    ) -> Result<StrategyRecommendation> {
        if distributions.is_empty() {
            return Err(EngineError::invalid("no fixtures to optimize over"));
        }
        if distributions.len() != run.fixtures().len()
            || distributions
                .iter()
                .zip(run.fixtures())
                .any(|(d, &f)| d.fixture() != f)
        {
            return Err(EngineError::invalid(
                "simulation run does not cover the given distributions",
            ));
        }

        let outcome_probs: Vec<Prob3> =
            distributions.iter().map(|d| d.outcome_probs()).collect();
        let rival_points = target_rival.map(|name| {
            rivals.expected_points_per_trial(Some(name), run, &outcome_probs, &self.table)
        });

        // Closed-form per-choice expected values seed the initial set and the
        // banker shortlist.
        let choice_evs: Vec<[f64; 3]> = distributions
            .iter()
            .zip(&outcome_probs)
            .map(|(dist, probs)| {
                [Outcome::Home, Outcome::Draw, Outcome::Away].map(|choice| {
                    let line = dist.most_likely_score_for(choice);
                    self.table.correct_result as f64 * probs.get(choice)
                        + self.table.exact_score_bonus as f64 * dist.prob(line.0, line.1)
                })
            })
            .collect();

        let mut current = PickSet {
            picks: distributions
                .iter()
                .zip(&choice_evs)
                .map(|(dist, evs)| {
                    let choice = best_choice(evs);
                    Pick {
                        fixture: dist.fixture(),
                        outcome: choice,
                        scoreline: Some(dist.most_likely_score_for(choice)),
                        hedge: None,
                    }
                })
                .collect(),
            banker: None,
        };

        // Banker shortlist: fixtures whose chosen pick carries the highest
        // closed-form EV. The simulation decides which (if any) sticks.
        let mut banker_order: Vec<usize> = (0..current.picks.len()).collect();
        banker_order.sort_by(|&a, &b| {
            let ev_a = choice_evs[a][outcome_slot(current.picks[a].outcome)];
            let ev_b = choice_evs[b][outcome_slot(current.picks[b].outcome)];
            ev_b.partial_cmp(&ev_a).unwrap_or(std::cmp::Ordering::Equal).then(a.cmp(&b))
        });
        banker_order.truncate(BANKER_CANDIDATES);

        // Hedge candidate: the fixture with the thinnest margin between its
        // best and second-best choice.
        let hedge_target = (0..choice_evs.len()).min_by(|&a, &b| {
            margin(&choice_evs[a])
                .partial_cmp(&margin(&choice_evs[b]))
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.cmp(&b))
        });

        let mut best_eval = self.evaluate(&current, run, rival_points.as_deref());
        for round in 0..MAX_SEARCH_ROUNDS {
            let mut best_move: Option<(PickSet, Evaluation)> = None;

            for candidate in self.neighbors(&current, distributions, &banker_order, hedge_target)
            {
                let eval = self.evaluate(&candidate, run, rival_points.as_deref());
                let improves = eval.objective > best_eval.objective + IMPROVEMENT_EPS
                    && best_move
                        .as_ref()
                        .map(|(_, incumbent)| eval.objective > incumbent.objective + IMPROVEMENT_EPS)
                        .unwrap_or(true);
                if improves {
                    best_move = Some((candidate, eval));
                }
            }

            match best_move {
                Some((set, eval)) => {
                    debug!(
                        "strategy search round {round}: objective {:.4} -> {:.4}",
                        best_eval.objective, eval.objective
                    );
                    current = set;
                    best_eval = eval;
                }
                None => break,
            }
        }

        current.validate(run.fixtures())?;
        Ok(StrategyRecommendation {
            pick_set: current,
            expected_points: best_eval.mean,
            variance: best_eval.variance,
            p_beat_rival: best_eval.p_beat,
            objective: best_eval.objective,
            trials: run.trials(),
        })
    }

    /// Single-move neighborhood: every alternative pick per fixture, every
    /// banker reassignment from the shortlist (and none), and a hedge toggle
    /// on the thinnest-margin fixture. Order is fixed, so the search is
    /// deterministic.
    fn neighbors(
        &self,
        current: &PickSet,
        distributions: &[ScoreDistribution],
        banker_order: &[usize],
        hedge_target: Option<usize>,
    ) -> Vec<PickSet> {
        let mut out = Vec::new();

        for (i, dist) in distributions.iter().enumerate() {
            for choice in [Outcome::Home, Outcome::Draw, Outcome::Away] {
                if choice == current.picks[i].outcome {
                    continue;
                }
                let mut candidate = current.clone();
                candidate.picks[i].outcome = choice;
                candidate.picks[i].scoreline = Some(dist.most_likely_score_for(choice));
                candidate.picks[i].hedge = None;
                out.push(candidate);
            }
        }

        for &banker in banker_order {
            if current.banker != Some(banker) {
                let mut candidate = current.clone();
                candidate.banker = Some(banker);
                out.push(candidate);
            }
        }
        if current.banker.is_some() {
            let mut candidate = current.clone();
            candidate.banker = None;
            out.push(candidate);
        }

        if let Some(i) = hedge_target {
            let mut candidate = current.clone();
            match current.picks[i].hedge {
                Some(_) => candidate.picks[i].hedge = None,
                None => {
                    let secondary = second_choice(current.picks[i].outcome);
                    candidate.picks[i].hedge = Some(Hedge {
                        secondary,
                        weight: HEDGE_WEIGHT,
                    });
                }
            }
            out.push(candidate);
        }

        out
    }

    fn evaluate(
        &self,
        set: &PickSet,
        run: &SimulationRun,
        rival_points: Option<&[f64]>,
    ) -> Evaluation {
        let scores = score_run(run, set, &self.table);
        let n = scores.len() as f64;
        let mean = scores.iter().sum::<f64>() / n;
        let variance = scores.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / n;

        let p_beat = rival_points.map(|rival| {
            let beaten = scores
                .iter()
                .zip(rival)
                .filter(|(ours, theirs)| ours > theirs)
                .count();
            beaten as f64 / n
        });

        let risk = match p_beat {
            Some(p) => 1.0 - p,
            None => variance,
        };
        Evaluation {
            mean,
            variance,
            p_beat,
            objective: mean - self.risk_penalty * risk,
        }
    }
}

fn outcome_slot(outcome: Outcome) -> usize {
    match outcome {
        Outcome::Home => 0,
        Outcome::Draw => 1,
        Outcome::Away => 2,
    }
}

fn best_choice(evs: &[f64; 3]) -> Outcome {
    if evs[0] >= evs[1] && evs[0] >= evs[2] {
        Outcome::Home
    } else if evs[1] >= evs[2] {
        Outcome::Draw
    } else {
        Outcome::Away
    }
}

/// Gap between the best and second-best choice EV.
fn margin(evs: &[f64; 3]) -> f64 {
    let mut sorted = *evs;
    sorted.sort_by(|a, b| b.partial_cmp(a).unwrap_or(std::cmp::Ordering::Equal));
    sorted[0] - sorted[1]
}

/// The strongest alternative to a primary pick for hedging purposes: the
/// draw, unless the primary is the draw.
fn second_choice(primary: Outcome) -> Outcome {
    match primary {
        Outcome::Home | Outcome::Away => Outcome::Draw,
        Outcome::Draw => Outcome::Home,
    }
}
