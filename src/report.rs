use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};
use crate::records::{FixtureId, Prob3, TeamId};
use crate::strategy::StrategyRecommendation;

/// Percentile levels reported for the round points total.
const PERCENTILE_LEVELS: [u8; 5] = [5, 25, 50, 75, 95];

/// Per-fixture forecast summary in the round artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FixtureForecast {
    pub fixture: FixtureId,
    pub home: TeamId,
    pub away: TeamId,
    pub probs: Prob3,
    pub most_likely_score: (u8, u8),
    pub expected_goals: (f64, f64),
}

/// Distribution of the recommended pick set's round total over the
/// simulation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PointsSummary {
    pub mean: f64,
    pub std_dev: f64,
    pub percentiles: Vec<(u8, f64)>,
}

/// The structured artifact emitted per round: everything a narrative or
/// presentation layer needs, and the only interface they get. The core never
/// renders text from it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoundForecast {
    pub round: u32,
    pub generated_at: DateTime<Utc>,
    pub seed: u64,
    pub trials: usize,
    pub fixtures: Vec<FixtureForecast>,
    pub recommendation: StrategyRecommendation,
    pub points: PointsSummary,
}

impl RoundForecast {
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| EngineError::invalid(format!("serialize round forecast: {e}")))
    }
}

/// Mean, standard deviation and percentiles of a scored run.
pub fn summarize_points(scores: &[f64]) -> PointsSummary {
    if scores.is_empty() {
        return PointsSummary {
            mean: 0.0,
            std_dev: 0.0,
            percentiles: PERCENTILE_LEVELS.iter().map(|&p| (p, 0.0)).collect(),
        };
    }

    let n = scores.len() as f64;
    let mean = scores.iter().sum::<f64>() / n;
    let variance = scores.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / n;

    let mut sorted = scores.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let percentiles = PERCENTILE_LEVELS
        .iter()
        .map(|&p| {
            let idx = ((p as f64 / 100.0) * (sorted.len() - 1) as f64).round() as usize;
            (p, sorted[idx])
        })
        .collect();

    PointsSummary {
        mean,
        std_dev: variance.sqrt(),
        percentiles,
    }
}
