use chrono::{TimeZone, Utc};

use goalcast::cancel::CancelToken;
use goalcast::config::{EngineConfig, ScoringTable};
use goalcast::records::{FixtureId, Outcome};
use goalcast::rivals::RivalModel;
use goalcast::score_dist::{ScoreDistribution, ScoreDistributionEngine};
use goalcast::scoring::{Pick, PickSet, score_run};
use goalcast::simulate::MonteCarloSimulator;
use goalcast::strategy::StrategyOptimizer;

/// Documented agreement tolerance between the optimizer's simulation-backed
/// expected total and brute-force enumeration over the same run.
const BRUTE_FORCE_TOLERANCE: f64 = 1e-9;

fn config() -> EngineConfig {
    EngineConfig {
        trials: 10_000,
        seed: 314,
        // Correct result scores 3, the banker doubles, no exact-score bonus:
        // the brute force below then only needs 1X2 picks.
        scoring: ScoringTable {
            correct_result: 3,
            exact_score_bonus: 0,
            banker_multiplier: 2.0,
        },
        ..EngineConfig::default()
    }
}

fn round(config: &EngineConfig) -> Vec<ScoreDistribution> {
    let engine = ScoreDistributionEngine::new(config);
    let now = Utc.with_ymd_and_hms(2026, 2, 21, 12, 0, 0).unwrap();
    vec![
        engine.build(FixtureId(1), 2.1, 0.7, now).unwrap(),
        engine.build(FixtureId(2), 1.3, 1.2, now).unwrap(),
        engine.build(FixtureId(3), 0.9, 1.6, now).unwrap(),
    ]
}

#[test]
fn optimizer_matches_brute_force_enumeration_on_a_small_round() {
    let config = config();
    let dists = round(&config);
    let run = MonteCarloSimulator::new(&config)
        .simulate(&dists, &CancelToken::new())
        .unwrap();

    let recommendation = StrategyOptimizer::new(&config)
        .optimize(&dists, &run, &RivalModel::default(), None)
        .unwrap();

    // Brute force: every 1X2 combination, every banker placement (or none),
    // scored against the exact same simulation run.
    let outcomes = [Outcome::Home, Outcome::Draw, Outcome::Away];
    let mut best_mean = f64::MIN;
    for &first in &outcomes {
        for &second in &outcomes {
            for &third in &outcomes {
                for banker in [None, Some(0), Some(1), Some(2)] {
                    let set = PickSet {
                        picks: vec![
                            Pick {
                                fixture: FixtureId(1),
                                outcome: first,
                                scoreline: None,
                                hedge: None,
                            },
                            Pick {
                                fixture: FixtureId(2),
                                outcome: second,
                                scoreline: None,
                                hedge: None,
                            },
                            Pick {
                                fixture: FixtureId(3),
                                outcome: third,
                                scoreline: None,
                                hedge: None,
                            },
                        ],
                        banker,
                    };
                    let scores = score_run(&run, &set, &config.scoring);
                    let mean = scores.iter().sum::<f64>() / scores.len() as f64;
                    if mean > best_mean {
                        best_mean = mean;
                    }
                }
            }
        }
    }

    assert!(
        (recommendation.expected_points - best_mean).abs() < BRUTE_FORCE_TOLERANCE,
        "optimizer {:.6} vs brute force {:.6}",
        recommendation.expected_points,
        best_mean
    );
}

#[test]
fn risk_penalty_trades_expected_points_for_variance() {
    let config = EngineConfig {
        risk_penalty: 2.0,
        ..config()
    };
    let dists = round(&config);
    let run = MonteCarloSimulator::new(&config)
        .simulate(&dists, &CancelToken::new())
        .unwrap();

    let risk_neutral = StrategyOptimizer::new(&EngineConfig {
        risk_penalty: 0.0,
        ..config.clone()
    })
    .optimize(&dists, &run, &RivalModel::default(), None)
    .unwrap();
    let risk_averse = StrategyOptimizer::new(&config)
        .optimize(&dists, &run, &RivalModel::default(), None)
        .unwrap();

    assert!(risk_averse.variance <= risk_neutral.variance + 1e-9);
    assert!(risk_neutral.expected_points >= risk_averse.expected_points - 1e-9);
}
