use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};

/// Points awarded per fixture. Supplied by the competition, not hardcoded:
/// every weight is validated alongside the engine config.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ScoringTable {
    /// Points for picking the correct result (home/draw/away).
    pub correct_result: u32,
    /// Bonus on top when the predicted scoreline matches exactly.
    pub exact_score_bonus: u32,
    /// Multiplier applied to the banker fixture's points.
    pub banker_multiplier: f64,
}

impl Default for ScoringTable {
    fn default() -> Self {
        Self {
            correct_result: 3,
            exact_score_bonus: 2,
            banker_multiplier: 2.0,
        }
    }
}

/// All numeric knobs of the engine in one explicit value object, passed into
/// components at construction. Out-of-range values fail at `validate()`,
/// never mid-run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Monte Carlo trial count per round.
    pub trials: usize,
    /// Master seed; every derived random stream is a pure function of it.
    pub seed: u64,
    /// Score table cap per side; mass beyond it lands in the overflow bucket.
    pub max_goals: u8,
    /// Minimum completed matches before a team may be rated.
    pub min_matches: usize,
    /// Frank copula dependence between home and away goal counts.
    /// 0 is exact independence; empirically slightly negative.
    pub copula_theta: f64,
    /// Dixon-Coles low-score correction parameter.
    pub dc_rho: f64,
    /// Exponential down-weighting of old results, per day.
    pub time_decay: f64,
    /// Negative-binomial over-dispersion; 0 keeps plain Poisson marginals.
    pub dispersion: f64,
    /// Floor for blended expected goals.
    pub min_expected_goals: f64,
    /// Variance penalty coefficient in the optimizer objective.
    pub risk_penalty: f64,
    /// In-play model time bucket width, minutes.
    pub bucket_minutes: u32,
    /// Bucket count for calibration curves.
    pub calibration_bins: usize,
    /// Simulation worker threads; 0 uses the rayon default.
    pub workers: usize,
    /// Wall-clock budget for long-running operations, seconds; 0 disables
    /// it. Exceeding the budget behaves exactly like cancellation.
    pub cancel_timeout_secs: u64,
    pub scoring: ScoringTable,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            trials: 100_000,
            seed: 0xC0A1_CA57,
            max_goals: 10,
            min_matches: 4,
            copula_theta: -0.35,
            dc_rho: -0.10,
            time_decay: 0.0065,
            dispersion: 0.0,
            min_expected_goals: 0.05,
            risk_penalty: 0.0,
            bucket_minutes: 5,
            calibration_bins: 10,
            workers: 0,
            cancel_timeout_secs: 0,
            scoring: ScoringTable::default(),
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<()> {
        check_range("trials", self.trials as f64, 1_000.0, 2_000_000.0)?;
        check_range("max_goals", self.max_goals as f64, 4.0, 15.0)?;
        check_range("min_matches", self.min_matches as f64, 1.0, 50.0)?;
        check_range("copula_theta", self.copula_theta, -5.0, 5.0)?;
        check_range("dc_rho", self.dc_rho, -0.25, 0.25)?;
        check_range("time_decay", self.time_decay, 0.0, 0.1)?;
        check_range("dispersion", self.dispersion, 0.0, 10.0)?;
        check_range("min_expected_goals", self.min_expected_goals, 0.01, 0.5)?;
        check_range("risk_penalty", self.risk_penalty, 0.0, 10.0)?;
        check_range("bucket_minutes", self.bucket_minutes as f64, 1.0, 45.0)?;
        check_range("calibration_bins", self.calibration_bins as f64, 2.0, 50.0)?;
        check_range("workers", self.workers as f64, 0.0, 256.0)?;
        check_range(
            "cancel_timeout_secs",
            self.cancel_timeout_secs as f64,
            0.0,
            3_600.0,
        )?;
        check_range(
            "scoring.correct_result",
            self.scoring.correct_result as f64,
            0.0,
            10.0,
        )?;
        check_range(
            "scoring.exact_score_bonus",
            self.scoring.exact_score_bonus as f64,
            0.0,
            10.0,
        )?;
        check_range(
            "scoring.banker_multiplier",
            self.scoring.banker_multiplier,
            1.0,
            4.0,
        )?;
        Ok(())
    }
}

fn check_range(name: &str, value: f64, lo: f64, hi: f64) -> Result<()> {
    if !value.is_finite() || value < lo || value > hi {
        return Err(EngineError::config(format!(
            "{name}={value} outside valid range {lo}..={hi}"
        )));
    }
    Ok(())
}
