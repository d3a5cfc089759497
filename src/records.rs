use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TeamId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FixtureId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Outcome {
    Home,
    Draw,
    Away,
}

pub fn classify_outcome(home_goals: u8, away_goals: u8) -> Outcome {
    if home_goals > away_goals {
        Outcome::Home
    } else if home_goals < away_goals {
        Outcome::Away
    } else {
        Outcome::Draw
    }
}

/// A 1X2 probability triple. Kept as three named fields rather than an array
/// so call sites read like the domain.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Prob3 {
    pub home: f64,
    pub draw: f64,
    pub away: f64,
}

impl Prob3 {
    pub fn uniform() -> Self {
        Self {
            home: 1.0 / 3.0,
            draw: 1.0 / 3.0,
            away: 1.0 / 3.0,
        }
    }

    pub fn get(&self, outcome: Outcome) -> f64 {
        match outcome {
            Outcome::Home => self.home,
            Outcome::Draw => self.draw,
            Outcome::Away => self.away,
        }
    }

    pub fn argmax(&self) -> Outcome {
        if self.home >= self.draw && self.home >= self.away {
            Outcome::Home
        } else if self.draw >= self.away {
            Outcome::Draw
        } else {
            Outcome::Away
        }
    }

    pub fn normalized(self) -> Self {
        let sum = (self.home + self.draw + self.away).max(1e-12);
        Self {
            home: self.home / sum,
            draw: self.draw / sum,
            away: self.away / sum,
        }
    }

    pub fn validate(&self) -> Result<()> {
        let entries = [self.home, self.draw, self.away];
        if entries.iter().any(|p| !p.is_finite() || *p < 0.0) {
            return Err(EngineError::invalid("probability entries must be finite and non-negative"));
        }
        let sum: f64 = entries.iter().sum();
        if (sum - 1.0).abs() > 1e-6 {
            return Err(EngineError::invalid(format!(
                "probabilities sum to {sum}, expected 1"
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FixtureStatus {
    Scheduled,
    InPlay,
    Completed,
}

/// An upcoming or running match, produced by upstream ingestion. The core
/// only reads these.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fixture {
    pub id: FixtureId,
    pub home: TeamId,
    pub away: TeamId,
    pub round: u32,
    pub kickoff: DateTime<Utc>,
    pub status: FixtureStatus,
}

impl Fixture {
    pub fn validate(&self) -> Result<()> {
        if self.home == self.away {
            return Err(EngineError::invalid(format!(
                "fixture {:?}: home and away team are both {:?}",
                self.id, self.home
            )));
        }
        Ok(())
    }
}

/// A completed result used for model fitting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchRecord {
    pub fixture: FixtureId,
    pub home: TeamId,
    pub away: TeamId,
    pub home_goals: u8,
    pub away_goals: u8,
    pub kickoff: DateTime<Utc>,
}

impl MatchRecord {
    pub fn outcome(&self) -> Outcome {
        classify_outcome(self.home_goals, self.away_goals)
    }

    pub fn validate(&self) -> Result<()> {
        if self.home == self.away {
            return Err(EngineError::invalid(format!(
                "match {:?}: home and away team are both {:?}",
                self.fixture, self.home
            )));
        }
        Ok(())
    }
}

/// Bookmaker decimal odds for one fixture.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct OddsRecord {
    pub fixture: FixtureId,
    pub home: f64,
    pub draw: f64,
    pub away: f64,
}

impl OddsRecord {
    pub fn validate(&self) -> Result<()> {
        for (label, odds) in [("home", self.home), ("draw", self.draw), ("away", self.away)] {
            if !odds.is_finite() || odds <= 1.0 {
                return Err(EngineError::invalid(format!(
                    "fixture {:?}: {label} odds {odds} must be a finite value above 1.0",
                    self.fixture
                )));
            }
        }
        Ok(())
    }

    /// Bookmaker-implied outcome probabilities with the overround stripped.
    pub fn implied_probs(&self) -> Result<Prob3> {
        self.validate()?;
        Ok(Prob3 {
            home: 1.0 / self.home,
            draw: 1.0 / self.draw,
            away: 1.0 / self.away,
        }
        .normalized())
    }
}

/// Expected-goals statistics for one fixture from the stats feed.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct XgRecord {
    pub fixture: FixtureId,
    pub home_xg: f64,
    pub away_xg: f64,
}

impl XgRecord {
    pub fn validate(&self) -> Result<()> {
        for (label, xg) in [("home", self.home_xg), ("away", self.away_xg)] {
            if !xg.is_finite() || xg < 0.0 {
                return Err(EngineError::invalid(format!(
                    "fixture {:?}: {label} xG {xg} must be finite and non-negative",
                    self.fixture
                )));
            }
        }
        Ok(())
    }
}

/// Injury/availability signal for one team going into a round. `impact` is
/// the fraction of attacking output expected to be missing, in [0, 1].
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AvailabilityRecord {
    pub team: TeamId,
    pub missing_starters: u8,
    pub impact: f64,
}

impl AvailabilityRecord {
    pub fn validate(&self) -> Result<()> {
        if !self.impact.is_finite() || !(0.0..=1.0).contains(&self.impact) {
            return Err(EngineError::invalid(format!(
                "team {:?}: availability impact {} outside [0, 1]",
                self.team, self.impact
            )));
        }
        Ok(())
    }
}

/// Posterior attack/defense snapshot for one team. Snapshots are immutable;
/// each fit publishes new ones and the old history stays valid for
/// calibration.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TeamRating {
    pub team: TeamId,
    /// Log attack strength relative to league average (0 = average).
    pub attack: f64,
    /// Log defense leak relative to league average (negative = concedes less).
    pub defense: f64,
    pub attack_sd: f64,
    pub defense_sd: f64,
    /// Completed matches backing this estimate.
    pub matches: usize,
    /// Last completed round folded into the estimate.
    pub round: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn kickoff() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 2, 21, 15, 0, 0).unwrap()
    }

    #[test]
    fn self_match_rejected() {
        let record = MatchRecord {
            fixture: FixtureId(1),
            home: TeamId(7),
            away: TeamId(7),
            home_goals: 1,
            away_goals: 0,
            kickoff: kickoff(),
        };
        assert!(record.validate().is_err());
    }

    #[test]
    fn implied_probs_strip_overround() {
        let odds = OddsRecord {
            fixture: FixtureId(1),
            home: 2.0,
            draw: 3.4,
            away: 4.1,
        };
        let probs = odds.implied_probs().unwrap();
        assert!((probs.home + probs.draw + probs.away - 1.0).abs() < 1e-12);
        assert!(probs.home > probs.draw && probs.draw > probs.away);
    }

    #[test]
    fn odds_at_or_below_one_rejected() {
        let odds = OddsRecord {
            fixture: FixtureId(1),
            home: 1.0,
            draw: 3.4,
            away: 4.1,
        };
        assert!(odds.validate().is_err());
    }

    #[test]
    fn classify_covers_all_results() {
        assert_eq!(classify_outcome(2, 0), Outcome::Home);
        assert_eq!(classify_outcome(1, 1), Outcome::Draw);
        assert_eq!(classify_outcome(0, 3), Outcome::Away);
    }
}
