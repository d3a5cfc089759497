use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use log::debug;

use crate::cancel::{CancelToken, Deadline};
use crate::config::EngineConfig;
use crate::dixon_coles::decay_weight;
use crate::error::{EngineError, Result};
use crate::records::{MatchRecord, TeamId, TeamRating};

/// League average goals per side used until enough history accumulates.
const DEFAULT_BASE_GOALS: f64 = 1.30;
/// Effective sample weight at which league parameters stop shrinking.
const LEAGUE_MIN_WEIGHT: f64 = 200.0;
/// Pseudo-goals anchoring every team's multiplier at the league average.
/// Teams with little history shrink hard toward 1.0.
const PRIOR_WEIGHT: f64 = 5.0;
const MAX_SWEEPS: usize = 200;
const CONVERGENCE_TOL: f64 = 1e-9;
/// Same clamp band as the rest of the engine applies to expected goals.
const LAMBDA_MIN: f64 = 0.20;
const LAMBDA_MAX: f64 = 3.80;

#[derive(Debug, Clone, Copy)]
pub struct FitReport {
    pub iterations: usize,
    pub max_delta: f64,
    pub converged: bool,
}

/// Attack/defense strength estimation with partial pooling.
///
/// The goal model is multiplicative: a home side scores at rate
/// `base * home_adv * attack(home) * leak(away)` and the away side at
/// `base * attack(away) * leak(home)`. Multipliers are fitted by penalized
/// iterative scaling with a pseudo-count prior, so teams with few
/// observations stay near the league average instead of going overconfident.
/// Old results are down-weighted exponentially per `time_decay`.
#[derive(Debug, Clone)]
pub struct TeamStrengthModel {
    min_matches: usize,
    time_decay: f64,
    cancel_timeout_secs: u64,
    history: Vec<MatchRecord>,
    alpha: BTreeMap<TeamId, f64>,
    beta: BTreeMap<TeamId, f64>,
    ratings: BTreeMap<TeamId, TeamRating>,
    base_goals: f64,
    home_adv: f64,
}

impl TeamStrengthModel {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            min_matches: config.min_matches,
            time_decay: config.time_decay,
            cancel_timeout_secs: config.cancel_timeout_secs,
            history: Vec::new(),
            alpha: BTreeMap::new(),
            beta: BTreeMap::new(),
            ratings: BTreeMap::new(),
            base_goals: DEFAULT_BASE_GOALS,
            home_adv: 1.0,
        }
    }

    /// Appends completed results without refitting.
    pub fn observe(&mut self, records: &[MatchRecord]) -> Result<()> {
        for record in records {
            record.validate()?;
        }
        self.history.extend_from_slice(records);
        Ok(())
    }

    /// Full refit from scratch over all observed history.
    pub fn fit(
        &mut self,
        as_of: DateTime<Utc>,
        round: u32,
        cancel: &CancelToken,
    ) -> Result<FitReport> {
        self.alpha.clear();
        self.beta.clear();
        self.run_sweeps(as_of, round, cancel)
    }

    /// Incremental update: appends one round of results and re-converges from
    /// the previous multipliers. The sweep operator has a single fixed point
    /// for a given history, so this lands within the convergence tolerance of
    /// a cold refit while doing far fewer sweeps on a warm start.
    pub fn update(
        &mut self,
        records: &[MatchRecord],
        as_of: DateTime<Utc>,
        round: u32,
        cancel: &CancelToken,
    ) -> Result<FitReport> {
        self.observe(records)?;
        self.run_sweeps(as_of, round, cancel)
    }

    fn run_sweeps(
        &mut self,
        as_of: DateTime<Utc>,
        round: u32,
        cancel: &CancelToken,
    ) -> Result<FitReport> {
        if self.history.is_empty() {
            self.ratings.clear();
            return Ok(FitReport {
                iterations: 0,
                max_delta: 0.0,
                converged: true,
            });
        }

        let weights: Vec<f64> = self
            .history
            .iter()
            .map(|m| decay_weight(as_of, m.kickoff, self.time_decay))
            .collect();

        self.fit_league_params(&weights);
        for m in &self.history {
            self.alpha.entry(m.home).or_insert(1.0);
            self.alpha.entry(m.away).or_insert(1.0);
            self.beta.entry(m.home).or_insert(1.0);
            self.beta.entry(m.away).or_insert(1.0);
        }

        let deadline = Deadline::after_secs(self.cancel_timeout_secs);
        let mut iterations = 0;
        let mut max_delta = f64::INFINITY;
        while iterations < MAX_SWEEPS && max_delta > CONVERGENCE_TOL {
            if cancel.is_cancelled() || deadline.expired() {
                // A half-converged fit is never published.
                return Err(EngineError::Cancelled { completed: iterations });
            }
            max_delta = self.sweep(&weights);
            iterations += 1;
            if iterations % 25 == 0 {
                debug!("strength fit sweep {iterations}: max_delta={max_delta:.3e}");
            }
        }

        let converged = max_delta <= CONVERGENCE_TOL;
        self.publish_ratings(&weights, round);
        debug!(
            "strength fit done: {} teams, {iterations} sweeps, converged={converged}",
            self.ratings.len()
        );
        Ok(FitReport {
            iterations,
            max_delta,
            converged,
        })
    }

    fn fit_league_params(&mut self, weights: &[f64]) {
        let mut weight_sum = 0.0;
        let mut home_goals = 0.0;
        let mut away_goals = 0.0;
        for (m, &w) in self.history.iter().zip(weights) {
            weight_sum += w;
            home_goals += w * m.home_goals as f64;
            away_goals += w * m.away_goals as f64;
        }

        let shrink = (weight_sum / LEAGUE_MIN_WEIGHT).clamp(0.0, 1.0);
        let observed_base = (home_goals + away_goals) / (2.0 * weight_sum.max(1e-9));
        self.base_goals = (1.0 - shrink) * DEFAULT_BASE_GOALS + shrink * observed_base;

        let raw_adv = (home_goals.max(1e-9) / away_goals.max(1e-9)).clamp(0.8, 1.5);
        self.home_adv = raw_adv.powf(shrink);
    }

    /// One Jacobi sweep of the iterative-scaling updates. Reads only the
    /// previous multipliers, so the result does not depend on team order.
    fn sweep(&mut self, weights: &[f64]) -> f64 {
        let mut scored: BTreeMap<TeamId, f64> = BTreeMap::new();
        let mut conceded: BTreeMap<TeamId, f64> = BTreeMap::new();
        let mut attack_exposure: BTreeMap<TeamId, f64> = BTreeMap::new();
        let mut leak_exposure: BTreeMap<TeamId, f64> = BTreeMap::new();

        for (m, &w) in self.history.iter().zip(weights) {
            let alpha_home = self.alpha[&m.home];
            let alpha_away = self.alpha[&m.away];
            let beta_home = self.beta[&m.home];
            let beta_away = self.beta[&m.away];

            *scored.entry(m.home).or_default() += w * m.home_goals as f64;
            *scored.entry(m.away).or_default() += w * m.away_goals as f64;
            *conceded.entry(m.home).or_default() += w * m.away_goals as f64;
            *conceded.entry(m.away).or_default() += w * m.home_goals as f64;

            let home_rate_base = self.base_goals * self.home_adv;
            *attack_exposure.entry(m.home).or_default() += w * home_rate_base * beta_away;
            *attack_exposure.entry(m.away).or_default() += w * self.base_goals * beta_home;
            *leak_exposure.entry(m.home).or_default() += w * self.base_goals * alpha_away;
            *leak_exposure.entry(m.away).or_default() += w * home_rate_base * alpha_home;
        }

        let mut new_alpha = BTreeMap::new();
        let mut new_beta = BTreeMap::new();
        for &team in self.alpha.keys() {
            let num = PRIOR_WEIGHT + scored.get(&team).copied().unwrap_or(0.0);
            let den = PRIOR_WEIGHT + attack_exposure.get(&team).copied().unwrap_or(0.0);
            new_alpha.insert(team, num / den);
        }
        for &team in self.beta.keys() {
            let num = PRIOR_WEIGHT + conceded.get(&team).copied().unwrap_or(0.0);
            let den = PRIOR_WEIGHT + leak_exposure.get(&team).copied().unwrap_or(0.0);
            new_beta.insert(team, num / den);
        }

        // Identifiability: pin both multiplier sets to geometric mean 1. The
        // base rate stays at its league estimate, so warm and cold starts
        // iterate the exact same operator. Convergence is measured after the
        // normalization, against the previous normalized multipliers.
        let n = new_alpha.len().max(1) as f64;
        let alpha_scale = (new_alpha.values().map(|a| a.ln()).sum::<f64>() / n).exp();
        let beta_scale = (new_beta.values().map(|b| b.ln()).sum::<f64>() / n).exp();
        for a in new_alpha.values_mut() {
            *a /= alpha_scale;
        }
        for b in new_beta.values_mut() {
            *b /= beta_scale;
        }

        let mut max_delta = 0.0_f64;
        for (team, next) in &new_alpha {
            max_delta = max_delta.max((next.ln() - self.alpha[team].ln()).abs());
        }
        for (team, next) in &new_beta {
            max_delta = max_delta.max((next.ln() - self.beta[team].ln()).abs());
        }

        self.alpha = new_alpha;
        self.beta = new_beta;
        max_delta
    }

    fn publish_ratings(&mut self, weights: &[f64], round: u32) {
        let mut scored: BTreeMap<TeamId, f64> = BTreeMap::new();
        let mut conceded: BTreeMap<TeamId, f64> = BTreeMap::new();
        let mut matches: BTreeMap<TeamId, usize> = BTreeMap::new();
        for (m, &w) in self.history.iter().zip(weights) {
            *scored.entry(m.home).or_default() += w * m.home_goals as f64;
            *scored.entry(m.away).or_default() += w * m.away_goals as f64;
            *conceded.entry(m.home).or_default() += w * m.away_goals as f64;
            *conceded.entry(m.away).or_default() += w * m.home_goals as f64;
            *matches.entry(m.home).or_default() += 1;
            *matches.entry(m.away).or_default() += 1;
        }

        self.ratings = self
            .alpha
            .keys()
            .map(|&team| {
                let attack_info = PRIOR_WEIGHT + scored.get(&team).copied().unwrap_or(0.0);
                let defense_info = PRIOR_WEIGHT + conceded.get(&team).copied().unwrap_or(0.0);
                let rating = TeamRating {
                    team,
                    attack: self.alpha[&team].ln(),
                    defense: self.beta[&team].ln(),
                    attack_sd: attack_info.sqrt().recip(),
                    defense_sd: defense_info.sqrt().recip(),
                    matches: matches.get(&team).copied().unwrap_or(0),
                    round,
                };
                (team, rating)
            })
            .collect();
    }

    pub fn rating(&self, team: TeamId) -> Result<&TeamRating> {
        match self.ratings.get(&team) {
            Some(rating) if rating.matches >= self.min_matches => Ok(rating),
            Some(rating) => Err(EngineError::InsufficientData {
                team,
                have: rating.matches,
                need: self.min_matches,
            }),
            None => Err(EngineError::InsufficientData {
                team,
                have: 0,
                need: self.min_matches,
            }),
        }
    }

    /// Model-implied expected goals for a fixture, clamped to the engine's
    /// per-side rate band.
    pub fn expected_goals(&self, home: TeamId, away: TeamId) -> Result<(f64, f64)> {
        let home_rating = self.rating(home)?;
        let away_rating = self.rating(away)?;
        let lambda_home = self.base_goals
            * self.home_adv
            * home_rating.attack.exp()
            * away_rating.defense.exp();
        let lambda_away =
            self.base_goals * away_rating.attack.exp() * home_rating.defense.exp();
        Ok((
            lambda_home.clamp(LAMBDA_MIN, LAMBDA_MAX),
            lambda_away.clamp(LAMBDA_MIN, LAMBDA_MAX),
        ))
    }

    pub fn ratings(&self) -> impl Iterator<Item = &TeamRating> {
        self.ratings.values()
    }

    pub fn base_goals(&self) -> f64 {
        self.base_goals
    }

    pub fn home_advantage(&self) -> f64 {
        self.home_adv
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::FixtureId;
    use chrono::TimeZone;

    fn day(offset: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 1, 15, 0, 0).unwrap() + chrono::Duration::days(offset)
    }

    fn record(id: u64, home: u32, away: u32, hg: u8, ag: u8, offset: i64) -> MatchRecord {
        MatchRecord {
            fixture: FixtureId(id),
            home: TeamId(home),
            away: TeamId(away),
            home_goals: hg,
            away_goals: ag,
            kickoff: day(offset),
        }
    }

    /// Round-robin history where team 1 scores heavily and team 3 concedes
    /// heavily.
    fn sample_history() -> Vec<MatchRecord> {
        let mut out = Vec::new();
        let mut id = 0;
        for week in 0..6i64 {
            for (home, away, hg, ag) in [
                (1u32, 2u32, 3u8, 0u8),
                (2, 3, 2, 1),
                (3, 1, 0, 2),
                (1, 3, 4, 1),
                (2, 1, 1, 1),
                (3, 2, 1, 2),
            ] {
                id += 1;
                out.push(record(id, home, away, hg, ag, week * 7));
            }
        }
        out
    }

    #[test]
    fn zero_history_team_is_insufficient_data() {
        let mut model = TeamStrengthModel::new(&EngineConfig::default());
        model.observe(&sample_history()).unwrap();
        model.fit(day(60), 7, &CancelToken::new()).unwrap();
        let err = model.rating(TeamId(99)).unwrap_err();
        assert!(matches!(
            err,
            EngineError::InsufficientData { have: 0, .. }
        ));
    }

    #[test]
    fn strong_attack_rates_above_average() {
        let mut model = TeamStrengthModel::new(&EngineConfig::default());
        model.observe(&sample_history()).unwrap();
        let report = model.fit(day(60), 7, &CancelToken::new()).unwrap();
        assert!(report.converged);
        let strong = model.rating(TeamId(1)).unwrap();
        let weak = model.rating(TeamId(3)).unwrap();
        assert!(strong.attack > 0.0);
        assert!(strong.attack > weak.attack);
        assert!(weak.defense > strong.defense, "team 3 leaks more goals");
        assert_eq!(model.ratings().count(), 3);
        assert!(model.base_goals() > 0.5 && model.base_goals() < 3.0);
        assert!(model.home_advantage() >= 0.8 && model.home_advantage() <= 1.5);
    }

    #[test]
    fn expected_goals_favor_the_stronger_side() {
        let mut model = TeamStrengthModel::new(&EngineConfig::default());
        model.observe(&sample_history()).unwrap();
        model.fit(day(60), 7, &CancelToken::new()).unwrap();
        let (lambda_home, lambda_away) =
            model.expected_goals(TeamId(1), TeamId(3)).unwrap();
        assert!(lambda_home > lambda_away);
        assert!(lambda_home >= LAMBDA_MIN && lambda_home <= LAMBDA_MAX);
    }

    #[test]
    fn incremental_update_matches_full_refit() {
        let history = sample_history();
        let (head, tail) = history.split_at(history.len() - 6);

        let mut incremental = TeamStrengthModel::new(&EngineConfig::default());
        incremental.observe(head).unwrap();
        incremental.fit(day(40), 6, &CancelToken::new()).unwrap();
        incremental
            .update(tail, day(60), 7, &CancelToken::new())
            .unwrap();

        let mut full = TeamStrengthModel::new(&EngineConfig::default());
        full.observe(&history).unwrap();
        full.fit(day(60), 7, &CancelToken::new()).unwrap();

        for team in [1, 2, 3] {
            let a = incremental.rating(TeamId(team)).unwrap();
            let b = full.rating(TeamId(team)).unwrap();
            assert!(
                (a.attack - b.attack).abs() < 1e-6,
                "team {team}: {} vs {}",
                a.attack,
                b.attack
            );
            assert!((a.defense - b.defense).abs() < 1e-6);
        }
    }

    #[test]
    fn cancelled_fit_aborts_cleanly() {
        let mut model = TeamStrengthModel::new(&EngineConfig::default());
        model.observe(&sample_history()).unwrap();
        let cancel = CancelToken::new();
        cancel.cancel();
        let err = model.fit(day(60), 7, &cancel).unwrap_err();
        assert!(matches!(err, EngineError::Cancelled { completed: 0 }));
    }

    #[test]
    fn few_matches_shrink_toward_league_average() {
        let mut model = TeamStrengthModel::new(&EngineConfig {
            min_matches: 1,
            ..EngineConfig::default()
        });
        // One freak result should not produce an extreme rating.
        model
            .observe(&[record(1, 10, 11, 7, 0, 0)])
            .unwrap();
        model.fit(day(10), 1, &CancelToken::new()).unwrap();
        let rating = model.rating(TeamId(10)).unwrap();
        assert!(rating.attack < 0.8, "attack {} should be pooled", rating.attack);
        assert!(rating.attack_sd > 0.25, "one match leaves high uncertainty");
    }
}
