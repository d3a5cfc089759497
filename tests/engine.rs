use anyhow::Result;
use chrono::{DateTime, TimeZone, Utc};

use goalcast::calibration::CalibrationSnapshot;
use goalcast::cancel::CancelToken;
use goalcast::config::EngineConfig;
use goalcast::engine::{Engine, RoundInputs};
use goalcast::error::EngineError;
use goalcast::records::{
    Fixture, FixtureId, FixtureStatus, MatchRecord, OddsRecord, TeamId, XgRecord,
};

fn day(offset: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 1, 5, 15, 0, 0).unwrap() + chrono::Duration::days(offset)
}

/// Six weeks of round-robin results among four teams, enough history for
/// every team to clear the default rating threshold.
fn history() -> Vec<MatchRecord> {
    let mut out = Vec::new();
    let mut id = 100u64;
    for week in 0..6i64 {
        for (home, away, hg, ag) in [
            (1u32, 2u32, 2u8, 1u8),
            (3, 4, 1, 1),
            (2, 3, 0, 2),
            (4, 1, 0, 3),
            (1, 3, 2, 0),
            (4, 2, 1, 2),
        ] {
            id += 1;
            out.push(MatchRecord {
                fixture: FixtureId(id),
                home: TeamId(home),
                away: TeamId(away),
                home_goals: hg,
                away_goals: ag,
                kickoff: day(week * 7 - 45),
            });
        }
    }
    out
}

fn upcoming() -> Vec<Fixture> {
    vec![
        Fixture {
            id: FixtureId(900),
            home: TeamId(1),
            away: TeamId(4),
            round: 7,
            kickoff: day(2),
            status: FixtureStatus::Scheduled,
        },
        Fixture {
            id: FixtureId(901),
            home: TeamId(2),
            away: TeamId(3),
            round: 7,
            kickoff: day(2),
            status: FixtureStatus::Scheduled,
        },
    ]
}

fn config() -> EngineConfig {
    EngineConfig {
        trials: 20_000,
        seed: 99,
        ..EngineConfig::default()
    }
}

#[test]
fn full_round_forecast_produces_a_coherent_artifact() -> Result<()> {
    let engine = Engine::new(config())?;
    let fixtures = upcoming();
    let history = history();
    let odds = vec![OddsRecord {
        fixture: FixtureId(900),
        home: 1.7,
        draw: 3.8,
        away: 5.0,
    }];
    let xg = vec![XgRecord {
        fixture: FixtureId(901),
        home_xg: 1.1,
        away_xg: 1.5,
    }];

    let forecast = engine.forecast_round(
        &RoundInputs {
            fixtures: &fixtures,
            history: &history,
            odds: &odds,
            xg: &xg,
            availability: &[],
            rival_picks: &[],
            target_rival: Some("leader"),
        },
        CalibrationSnapshot::default(),
        day(0),
        &CancelToken::new(),
    )?;

    assert_eq!(forecast.round, 7);
    assert_eq!(forecast.fixtures.len(), 2);
    assert_eq!(forecast.trials, 20_000);
    for fixture in &forecast.fixtures {
        let sum = fixture.probs.home + fixture.probs.draw + fixture.probs.away;
        assert!((sum - 1.0).abs() < 1e-6);
    }
    // Team 1 dominated its history; at home against the weakest side the
    // forecast must favor it.
    assert!(forecast.fixtures[0].probs.home > forecast.fixtures[0].probs.away);

    let recommendation = &forecast.recommendation;
    assert_eq!(recommendation.pick_set.picks.len(), 2);
    assert!(recommendation.expected_points > 0.0);
    assert!(recommendation.p_beat_rival.is_some());
    assert!(forecast.points.mean > 0.0);

    // The artifact is what downstream narrative layers consume; it must
    // serialize cleanly.
    let json = forecast.to_json()?;
    assert!(json.contains("\"recommendation\""));
    Ok(())
}

#[test]
fn deterministic_artifact_for_identical_inputs() -> Result<()> {
    let engine = Engine::new(config())?;
    let fixtures = upcoming();
    let history = history();
    let inputs = RoundInputs {
        fixtures: &fixtures,
        history: &history,
        odds: &[],
        xg: &[],
        availability: &[],
        rival_picks: &[],
        target_rival: None,
    };

    let a = engine.forecast_round(&inputs, CalibrationSnapshot::default(), day(0), &CancelToken::new())?;
    let b = engine.forecast_round(&inputs, CalibrationSnapshot::default(), day(0), &CancelToken::new())?;
    assert_eq!(a.to_json()?, b.to_json()?);
    Ok(())
}

#[test]
fn unknown_team_in_round_propagates_insufficient_data() {
    let engine = Engine::new(config()).unwrap();
    let history = history();
    let fixtures = vec![Fixture {
        id: FixtureId(950),
        home: TeamId(1),
        away: TeamId(42), // never played
        round: 7,
        kickoff: day(2),
        status: FixtureStatus::Scheduled,
    }];

    let err = engine
        .forecast_round(
            &RoundInputs {
                fixtures: &fixtures,
                history: &history,
                odds: &[],
                xg: &[],
                availability: &[],
                rival_picks: &[],
                target_rival: None,
            },
            CalibrationSnapshot::default(),
            day(0),
            &CancelToken::new(),
        )
        .unwrap_err();
    assert!(matches!(
        err,
        EngineError::InsufficientData { team: TeamId(42), .. }
    ));
}

#[test]
fn malformed_odds_are_rejected_at_the_boundary() {
    let engine = Engine::new(config()).unwrap();
    let fixtures = upcoming();
    let history = history();
    let odds = vec![OddsRecord {
        fixture: FixtureId(900),
        home: 0.9, // below fair minimum
        draw: 3.8,
        away: 5.0,
    }];

    let err = engine
        .forecast_round(
            &RoundInputs {
                fixtures: &fixtures,
                history: &history,
                odds: &odds,
                xg: &[],
                availability: &[],
                rival_picks: &[],
                target_rival: None,
            },
            CalibrationSnapshot::default(),
            day(0),
            &CancelToken::new(),
        )
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidInput(_)));
}

#[test]
fn cancelled_forecast_aborts_cleanly() {
    let engine = Engine::new(config()).unwrap();
    let fixtures = upcoming();
    let history = history();
    let cancel = CancelToken::new();
    cancel.cancel();

    let err = engine
        .forecast_round(
            &RoundInputs {
                fixtures: &fixtures,
                history: &history,
                odds: &[],
                xg: &[],
                availability: &[],
                rival_picks: &[],
                target_rival: None,
            },
            CalibrationSnapshot::default(),
            day(0),
            &cancel,
        )
        .unwrap_err();
    assert!(matches!(err, EngineError::Cancelled { .. }));
}

#[test]
fn live_forecast_shares_the_distribution_representation() -> Result<()> {
    use goalcast::score_dist::ScoreDistributionEngine;

    let engine = Engine::new(config())?;
    let pre = ScoreDistributionEngine::new(engine.config()).build(FixtureId(900), 1.7, 1.0, day(0))?;
    let live = engine.live_forecast(&pre, 60, (0, 1), day(0))?;
    live.validate()?;
    // Trailing at the hour mark: the home side can no longer be favorite.
    let probs = live.outcome_probs();
    assert!(probs.away > probs.home);
    Ok(())
}
