use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::config::ScoringTable;
use crate::records::{FixtureId, Outcome, Prob3, classify_outcome};
use crate::simulate::SimulationRun;

/// One observed historical pick by a named rival, recorded next to what the
/// market favored at the time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RivalPickRecord {
    pub rival: String,
    pub fixture: FixtureId,
    pub pick: Outcome,
    pub market_favorite: Outcome,
}

/// Pick-probability distribution for one rival on one fixture.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RivalProfile {
    pub rival: String,
    pub fixture: FixtureId,
    pub probs: Prob3,
}

/// Exponent applied to outcome probabilities when projecting a rival's pick:
/// `base` at zero chalk (picks proportional to outcome odds), up to
/// `base + span` for a rival who always sides with the favorite.
const CHALK_EXPONENT_BASE: f64 = 1.0;
const CHALK_EXPONENT_SPAN: f64 = 3.0;
/// Population prior: most pool players leans favorite slightly more often
/// than not.
const DEFAULT_CHALK_RATE: f64 = 0.55;

/// Predicts rivals' pick behavior. Estimation never fails: a rival with no
/// history (or an unnamed rival) gets the population prior, so the optimizer
/// always has something to differentiate against.
#[derive(Debug, Clone, Default)]
pub struct RivalModel {
    chalk_rates: BTreeMap<String, f64>,
}

impl RivalModel {
    /// Estimates per-rival chalk tendency (how often they side with the
    /// market favorite) with Laplace smoothing toward the population prior.
    pub fn from_history(records: &[RivalPickRecord]) -> Self {
        let mut favorite: BTreeMap<String, f64> = BTreeMap::new();
        let mut total: BTreeMap<String, f64> = BTreeMap::new();
        for record in records {
            *total.entry(record.rival.clone()).or_default() += 1.0;
            if record.pick == record.market_favorite {
                *favorite.entry(record.rival.clone()).or_default() += 1.0;
            }
        }

        let chalk_rates = total
            .into_iter()
            .map(|(rival, n)| {
                let fav = favorite.get(&rival).copied().unwrap_or(0.0);
                // Four pseudo-observations at the prior rate.
                let rate = (fav + 4.0 * DEFAULT_CHALK_RATE) / (n + 4.0);
                (rival, rate)
            })
            .collect();
        Self { chalk_rates }
    }

    pub fn known_rivals(&self) -> impl Iterator<Item = &str> {
        self.chalk_rates.keys().map(String::as_str)
    }

    fn chalk_rate(&self, rival: Option<&str>) -> f64 {
        rival
            .and_then(|name| self.chalk_rates.get(name).copied())
            .unwrap_or(DEFAULT_CHALK_RATE)
    }

    /// Pick probabilities for one fixture: outcome probabilities sharpened by
    /// the rival's chalk exponent. Higher chalk concentrates mass on the
    /// favorite.
    pub fn pick_probs(&self, rival: Option<&str>, outcome_probs: Prob3) -> Prob3 {
        let exponent = CHALK_EXPONENT_BASE + CHALK_EXPONENT_SPAN * self.chalk_rate(rival);
        let raw = Prob3 {
            home: outcome_probs.home.max(0.0).powf(exponent),
            draw: outcome_probs.draw.max(0.0).powf(exponent),
            away: outcome_probs.away.max(0.0).powf(exponent),
        };
        if raw.home + raw.draw + raw.away <= 0.0 {
            return Prob3::uniform();
        }
        raw.normalized()
    }

    pub fn profile(
        &self,
        rival: Option<&str>,
        fixture: FixtureId,
        outcome_probs: Prob3,
    ) -> RivalProfile {
        RivalProfile {
            rival: rival.unwrap_or("field").to_string(),
            fixture,
            probs: self.pick_probs(rival, outcome_probs),
        }
    }

    /// Rival's expected points against each simulated trial: the mean of
    /// their mixed pick strategy over that trial's concrete outcomes. Rivals
    /// are modeled on correct-result points only; their scoreline and banker
    /// choices are not observed upstream, so no bonus terms enter here.
    pub fn expected_points_per_trial(
        &self,
        rival: Option<&str>,
        run: &SimulationRun,
        fixture_probs: &[Prob3],
        table: &ScoringTable,
    ) -> Vec<f64> {
        let pick_probs: Vec<Prob3> = fixture_probs
            .iter()
            .map(|&p| self.pick_probs(rival, p))
            .collect();
        let result_points = table.correct_result as f64;

        (0..run.trials())
            .map(|t| {
                run.trial(t)
                    .iter()
                    .zip(&pick_probs)
                    .map(|(&(h, a), picks)| picks.get(classify_outcome(h, a)) * result_points)
                    .sum()
            })
            .collect()
    }
}
