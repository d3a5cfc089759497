use crate::calibration::{CalibrationSnapshot, Source};
use crate::config::EngineConfig;
use crate::dixon_coles;
use crate::error::{EngineError, Result};
use crate::records::{AvailabilityRecord, OddsRecord};

/// Fraction of a side's expected output removed at full availability impact.
const AVAILABILITY_ATTENUATION: f64 = 0.35;
/// Search band for odds inversion, matching the rate clamp used elsewhere.
const INVERT_MIN: f64 = 0.20;
const INVERT_MAX: f64 = 3.80;

/// Expected-goals pairs per source for one fixture. Model output is required;
/// the market and stats feeds are optional and their weights renormalize when
/// absent.
#[derive(Debug, Clone, Copy)]
pub struct BlendInputs {
    pub model: (f64, f64),
    pub market: Option<(f64, f64)>,
    pub stats: Option<(f64, f64)>,
}

/// Blends model, market and raw-xG expected goals into a single calibrated
/// pair, weighted by each source's historical accuracy.
#[derive(Debug, Clone)]
pub struct ExpectedGoalsBlender {
    snapshot: CalibrationSnapshot,
    min_expected_goals: f64,
}

impl ExpectedGoalsBlender {
    pub fn new(config: &EngineConfig, snapshot: CalibrationSnapshot) -> Self {
        Self {
            snapshot,
            min_expected_goals: config.min_expected_goals,
        }
    }

    pub fn blend(
        &self,
        inputs: BlendInputs,
        home_availability: Option<&AvailabilityRecord>,
        away_availability: Option<&AvailabilityRecord>,
    ) -> Result<(f64, f64)> {
        let mut weighted = [(inputs.model, self.snapshot.weight(Source::Model))].to_vec();
        if let Some(market) = inputs.market {
            weighted.push((market, self.snapshot.weight(Source::Market)));
        }
        if let Some(stats) = inputs.stats {
            weighted.push((stats, self.snapshot.weight(Source::Stats)));
        }

        for ((home, away), _) in &weighted {
            for xg in [home, away] {
                if !xg.is_finite() || *xg < 0.0 {
                    return Err(EngineError::invalid(format!(
                        "expected goals {xg} from a source must be finite and non-negative"
                    )));
                }
            }
        }

        let total_weight: f64 = weighted.iter().map(|(_, w)| w).sum();
        if total_weight <= 0.0 {
            return Err(EngineError::invalid("all source weights are zero"));
        }

        let mut home = 0.0;
        let mut away = 0.0;
        for ((h, a), w) in &weighted {
            home += h * w;
            away += a * w;
        }
        home /= total_weight;
        away /= total_weight;

        if let Some(record) = home_availability {
            record.validate()?;
            home *= 1.0 - AVAILABILITY_ATTENUATION * record.impact;
        }
        if let Some(record) = away_availability {
            record.validate()?;
            away *= 1.0 - AVAILABILITY_ATTENUATION * record.impact;
        }

        Ok((
            home.max(self.min_expected_goals),
            away.max(self.min_expected_goals),
        ))
    }
}

/// Inverts bookmaker odds through the score model: strips the overround,
/// then grid-searches (coarse, then two refinements) for the expected-goals
/// pair whose Dixon-Coles outcome probabilities best match the market's.
pub fn market_implied_xg(odds: &OddsRecord, config: &EngineConfig) -> Result<(f64, f64)> {
    let target = odds.implied_probs()?;

    let mut best = (1.3_f64, 1.1_f64);
    let mut best_err = f64::INFINITY;
    let evaluate = |lambda_home: f64, lambda_away: f64| -> f64 {
        let p = dixon_coles::outcome_probs(lambda_home, lambda_away, config.dc_rho, config.max_goals);
        (p.home - target.home).powi(2)
            + (p.draw - target.draw).powi(2)
            + (p.away - target.away).powi(2)
    };

    let mut step = 0.2;
    let mut lo_h = INVERT_MIN;
    let mut hi_h = INVERT_MAX;
    let mut lo_a = INVERT_MIN;
    let mut hi_a = INVERT_MAX;
    for _ in 0..3 {
        let mut lambda_home = lo_h;
        while lambda_home <= hi_h + 1e-9 {
            let mut lambda_away = lo_a;
            while lambda_away <= hi_a + 1e-9 {
                let err = evaluate(lambda_home, lambda_away);
                if err < best_err {
                    best_err = err;
                    best = (lambda_home, lambda_away);
                }
                lambda_away += step;
            }
            lambda_home += step;
        }
        // Tighten the window around the incumbent for the next pass.
        lo_h = (best.0 - step).max(INVERT_MIN);
        hi_h = (best.0 + step).min(INVERT_MAX);
        lo_a = (best.1 - step).max(INVERT_MIN);
        hi_a = (best.1 + step).min(INVERT_MAX);
        step /= 5.0;
    }

    Ok(best)
}
