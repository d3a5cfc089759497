use std::collections::HashMap;

use chrono::{DateTime, Utc};
use log::info;

use crate::blend::{BlendInputs, ExpectedGoalsBlender, market_implied_xg};
use crate::calibration::CalibrationSnapshot;
use crate::cancel::CancelToken;
use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::in_play::InPlayMarkovModel;
use crate::records::{
    AvailabilityRecord, Fixture, FixtureId, MatchRecord, OddsRecord, TeamId, XgRecord,
};
use crate::report::{FixtureForecast, RoundForecast, summarize_points};
use crate::rivals::{RivalModel, RivalPickRecord};
use crate::score_dist::{ScoreDistribution, ScoreDistributionEngine};
use crate::scoring::score_run;
use crate::simulate::MonteCarloSimulator;
use crate::strategy::StrategyOptimizer;
use crate::strength::TeamStrengthModel;

/// Everything the ingestion collaborator hands over for one round. All
/// records are validated at this boundary; malformed ones are rejected, not
/// defaulted.
#[derive(Debug, Clone, Copy)]
pub struct RoundInputs<'a> {
    pub fixtures: &'a [Fixture],
    pub history: &'a [MatchRecord],
    pub odds: &'a [OddsRecord],
    pub xg: &'a [XgRecord],
    pub availability: &'a [AvailabilityRecord],
    pub rival_picks: &'a [RivalPickRecord],
    pub target_rival: Option<&'a str>,
}

/// Wires the full pre-match pipeline: strength fit, source blending, score
/// distributions, Monte Carlo simulation, rival projection and strategy
/// search, ending in the round artifact.
#[derive(Debug, Clone)]
pub struct Engine {
    config: EngineConfig,
}

impl Engine {
    /// Validates the configuration up front; no knob is re-checked mid-run.
    pub fn new(config: EngineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn forecast_round(
        &self,
        inputs: &RoundInputs<'_>,
        calibration: CalibrationSnapshot,
        as_of: DateTime<Utc>,
        cancel: &CancelToken,
    ) -> Result<RoundForecast> {
        if inputs.fixtures.is_empty() {
            return Err(EngineError::invalid("round has no fixtures"));
        }
        for fixture in inputs.fixtures {
            fixture.validate()?;
        }
        let round = inputs.fixtures[0].round;

        let odds_by_fixture = index_odds(inputs.odds)?;
        let xg_by_fixture = index_xg(inputs.xg)?;
        let availability_by_team = index_availability(inputs.availability)?;

        let mut strength = TeamStrengthModel::new(&self.config);
        strength.observe(inputs.history)?;
        let fit = strength.fit(as_of, round, cancel)?;
        info!(
            "round {round}: strength fit over {} matches in {} sweeps",
            inputs.history.len(),
            fit.iterations
        );

        let blender = ExpectedGoalsBlender::new(&self.config, calibration);
        let table_engine = ScoreDistributionEngine::new(&self.config);
        let mut distributions = Vec::with_capacity(inputs.fixtures.len());
        for fixture in inputs.fixtures {
            let model_xg = strength.expected_goals(fixture.home, fixture.away)?;
            let market_xg = odds_by_fixture
                .get(&fixture.id)
                .map(|odds| market_implied_xg(odds, &self.config))
                .transpose()?;
            let stats_xg = xg_by_fixture
                .get(&fixture.id)
                .map(|record| (record.home_xg, record.away_xg));

            let (lambda_home, lambda_away) = blender.blend(
                BlendInputs {
                    model: model_xg,
                    market: market_xg,
                    stats: stats_xg,
                },
                availability_by_team.get(&fixture.home).copied(),
                availability_by_team.get(&fixture.away).copied(),
            )?;
            distributions.push(table_engine.build(fixture.id, lambda_home, lambda_away, as_of)?);
        }

        let run = MonteCarloSimulator::new(&self.config).simulate(&distributions, cancel)?;
        let rivals = RivalModel::from_history(inputs.rival_picks);
        let recommendation = StrategyOptimizer::new(&self.config).optimize(
            &distributions,
            &run,
            &rivals,
            inputs.target_rival,
        )?;

        let scores = score_run(&run, &recommendation.pick_set, &self.config.scoring);
        let points = summarize_points(&scores);

        let fixtures = inputs
            .fixtures
            .iter()
            .zip(&distributions)
            .map(|(fixture, dist)| FixtureForecast {
                fixture: fixture.id,
                home: fixture.home,
                away: fixture.away,
                probs: dist.outcome_probs(),
                most_likely_score: dist.most_likely_score(),
                expected_goals: dist.expected_goals(),
            })
            .collect();

        info!(
            "round {round}: {} trials, expected points {:.2}",
            run.trials(),
            recommendation.expected_points
        );
        Ok(RoundForecast {
            round,
            generated_at: as_of,
            seed: run.seed(),
            trials: run.trials(),
            fixtures,
            recommendation,
            points,
        })
    }

    /// Live re-forecast for one fixture already under way, sharing the
    /// pre-match distribution representation.
    pub fn live_forecast(
        &self,
        pre_match: &ScoreDistribution,
        minute: u32,
        score: (u8, u8),
        as_of: DateTime<Utc>,
    ) -> Result<ScoreDistribution> {
        InPlayMarkovModel::new(&self.config).live_distribution(pre_match, minute, score, as_of)
    }
}

fn index_odds(odds: &[OddsRecord]) -> Result<HashMap<FixtureId, OddsRecord>> {
    let mut out = HashMap::with_capacity(odds.len());
    for record in odds {
        record.validate()?;
        out.insert(record.fixture, *record);
    }
    Ok(out)
}

fn index_xg(xg: &[XgRecord]) -> Result<HashMap<FixtureId, XgRecord>> {
    let mut out = HashMap::with_capacity(xg.len());
    for record in xg {
        record.validate()?;
        out.insert(record.fixture, *record);
    }
    Ok(out)
}

fn index_availability(
    availability: &[AvailabilityRecord],
) -> Result<HashMap<TeamId, &AvailabilityRecord>> {
    let mut out = HashMap::with_capacity(availability.len());
    for record in availability {
        record.validate()?;
        out.insert(record.team, record);
    }
    Ok(out)
}
