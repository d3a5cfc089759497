use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;

use crate::config::EngineConfig;
use crate::dixon_coles;
use crate::error::{EngineError, Result};
use crate::records::{FixtureId, Outcome, Prob3, classify_outcome};

/// Tolerance for the total-mass invariant.
pub const MASS_TOLERANCE: f64 = 1e-6;

/// ln(k!) for every k the score grid can reach, built once.
static LOG_FACTORIALS: Lazy<Vec<f64>> = Lazy::new(|| {
    let mut table = vec![0.0_f64; 64];
    for k in 2..table.len() {
        table[k] = table[k - 1] + (k as f64).ln();
    }
    table
});

/// Joint home/away score probability table for one fixture, dense up to
/// `max_goals` per side with the residual tail in an overflow bucket.
/// Immutable once built; a fixture update produces a new distribution.
#[derive(Debug, Clone)]
pub struct ScoreDistribution {
    fixture: FixtureId,
    generated_at: DateTime<Utc>,
    max_goals: u8,
    cells: Vec<f64>,
    overflow: f64,
}

impl ScoreDistribution {
    /// Assembles a distribution from an explicit table, enforcing the
    /// probability invariants. The in-play model uses this to publish live
    /// tables in the same representation as pre-match ones.
    pub fn from_table(
        fixture: FixtureId,
        generated_at: DateTime<Utc>,
        max_goals: u8,
        cells: Vec<f64>,
        overflow: f64,
    ) -> Result<Self> {
        let dist = Self {
            fixture,
            generated_at,
            max_goals,
            cells,
            overflow,
        };
        dist.validate()?;
        Ok(dist)
    }

    pub fn fixture(&self) -> FixtureId {
        self.fixture
    }

    pub fn generated_at(&self) -> DateTime<Utc> {
        self.generated_at
    }

    pub fn max_goals(&self) -> u8 {
        self.max_goals
    }

    pub fn overflow(&self) -> f64 {
        self.overflow
    }

    pub fn prob(&self, home_goals: u8, away_goals: u8) -> f64 {
        if home_goals > self.max_goals || away_goals > self.max_goals {
            return 0.0;
        }
        self.cells[self.index(home_goals, away_goals)]
    }

    fn index(&self, home_goals: u8, away_goals: u8) -> usize {
        home_goals as usize * (self.max_goals as usize + 1) + away_goals as usize
    }

    pub fn validate(&self) -> Result<()> {
        let side = self.max_goals as usize + 1;
        if self.cells.len() != side * side {
            return Err(EngineError::invalid(format!(
                "fixture {:?}: table has {} cells, expected {}",
                self.fixture,
                self.cells.len(),
                side * side
            )));
        }
        if self.overflow < 0.0 || !self.overflow.is_finite() {
            return Err(EngineError::invalid("overflow bucket must be finite and non-negative"));
        }
        let mut total = self.overflow;
        for &p in &self.cells {
            if !p.is_finite() || p < 0.0 {
                return Err(EngineError::invalid(
                    "score table entries must be finite and non-negative",
                ));
            }
            total += p;
        }
        if (total - 1.0).abs() > MASS_TOLERANCE {
            return Err(EngineError::invalid(format!(
                "fixture {:?}: total mass {total} not within {MASS_TOLERANCE} of 1",
                self.fixture
            )));
        }
        Ok(())
    }

    pub fn outcome_probs(&self) -> Prob3 {
        let mut probs = Prob3 {
            home: 0.0,
            draw: 0.0,
            away: 0.0,
        };
        for h in 0..=self.max_goals {
            for a in 0..=self.max_goals {
                let p = self.cells[self.index(h, a)];
                match classify_outcome(h, a) {
                    Outcome::Home => probs.home += p,
                    Outcome::Draw => probs.draw += p,
                    Outcome::Away => probs.away += p,
                }
            }
        }
        // Overflow sits beyond the cap on both sides; treat it as a draw-ish
        // unknown and spread it by the table's own shares.
        let table_mass = probs.home + probs.draw + probs.away;
        if table_mass > 0.0 && self.overflow > 0.0 {
            let scale = (table_mass + self.overflow) / table_mass;
            probs.home *= scale;
            probs.draw *= scale;
            probs.away *= scale;
        }
        probs.normalized()
    }

    pub fn most_likely_score(&self) -> (u8, u8) {
        let mut best = (0u8, 0u8);
        let mut best_p = f64::MIN;
        for h in 0..=self.max_goals {
            for a in 0..=self.max_goals {
                let p = self.cells[self.index(h, a)];
                if p > best_p {
                    best_p = p;
                    best = (h, a);
                }
            }
        }
        best
    }

    /// Most probable scoreline among those producing `outcome`.
    pub fn most_likely_score_for(&self, outcome: Outcome) -> (u8, u8) {
        let mut best = match outcome {
            Outcome::Home => (1, 0),
            Outcome::Draw => (0, 0),
            Outcome::Away => (0, 1),
        };
        let mut best_p = f64::MIN;
        for h in 0..=self.max_goals {
            for a in 0..=self.max_goals {
                if classify_outcome(h, a) != outcome {
                    continue;
                }
                let p = self.cells[self.index(h, a)];
                if p > best_p {
                    best_p = p;
                    best = (h, a);
                }
            }
        }
        best
    }

    /// Marginal expected goals implied by the table, overflow mass counted at
    /// the cap.
    pub fn expected_goals(&self) -> (f64, f64) {
        let mut home = 0.0;
        let mut away = 0.0;
        for h in 0..=self.max_goals {
            for a in 0..=self.max_goals {
                let p = self.cells[self.index(h, a)];
                home += h as f64 * p;
                away += a as f64 * p;
            }
        }
        home += self.overflow * self.max_goals as f64;
        away += self.overflow * self.max_goals as f64;
        (home, away)
    }

    /// Cumulative table for inverse-CDF sampling: one entry per cell plus a
    /// final 1.0 entry for the overflow bucket.
    pub(crate) fn sampling_cdf(&self) -> Vec<f64> {
        let mut cdf = Vec::with_capacity(self.cells.len() + 1);
        let mut acc = 0.0;
        for &p in &self.cells {
            acc += p;
            cdf.push(acc);
        }
        cdf.push(1.0);
        cdf
    }

    /// Maps a sampling-CDF index back to a concrete scoreline. The overflow
    /// bucket lands on the cap pair, keeping draws concrete.
    pub(crate) fn score_at(&self, cdf_index: usize) -> (u8, u8) {
        if cdf_index >= self.cells.len() {
            return (self.max_goals, self.max_goals);
        }
        let side = self.max_goals as usize + 1;
        ((cdf_index / side) as u8, (cdf_index % side) as u8)
    }
}

/// Builds joint score distributions from blended expected goals. Marginals
/// are Poisson, or negative binomial when over-dispersion is configured; all
/// marginal mass is computed in log-space and exponentiated only at table
/// assembly. Dependence between the sides comes from a Frank copula, followed
/// by the Dixon-Coles low-score correction and a final renormalization.
#[derive(Debug, Clone)]
pub struct ScoreDistributionEngine {
    max_goals: u8,
    copula_theta: f64,
    dc_rho: f64,
    dispersion: f64,
}

impl ScoreDistributionEngine {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            max_goals: config.max_goals,
            copula_theta: config.copula_theta,
            dc_rho: config.dc_rho,
            dispersion: config.dispersion,
        }
    }

    pub fn build(
        &self,
        fixture: FixtureId,
        lambda_home: f64,
        lambda_away: f64,
        generated_at: DateTime<Utc>,
    ) -> Result<ScoreDistribution> {
        for (label, lambda) in [("home", lambda_home), ("away", lambda_away)] {
            if !lambda.is_finite() || lambda <= 0.0 {
                return Err(EngineError::invalid(format!(
                    "fixture {fixture:?}: {label} expected goals {lambda} must be positive"
                )));
            }
        }

        let side = self.max_goals as usize + 1;
        let ln_home = self.log_marginal(lambda_home);
        let ln_away = self.log_marginal(lambda_away);

        let mut cells = vec![0.0_f64; side * side];
        if self.copula_theta.abs() < 1e-9 {
            // Independence: joint log mass is the sum of marginal log masses.
            for h in 0..side {
                for a in 0..side {
                    cells[h * side + a] = (ln_home[h] + ln_away[a]).exp();
                }
            }
        } else {
            let cdf_home = cdf_from_log_pmf(&ln_home);
            let cdf_away = cdf_from_log_pmf(&ln_away);
            for h in 0..side {
                for a in 0..side {
                    let hi_h = cdf_home[h];
                    let lo_h = if h == 0 { 0.0 } else { cdf_home[h - 1] };
                    let hi_a = cdf_away[a];
                    let lo_a = if a == 0 { 0.0 } else { cdf_away[a - 1] };
                    let mass = frank_cdf(hi_h, hi_a, self.copula_theta)
                        - frank_cdf(lo_h, hi_a, self.copula_theta)
                        - frank_cdf(hi_h, lo_a, self.copula_theta)
                        + frank_cdf(lo_h, lo_a, self.copula_theta);
                    cells[h * side + a] = mass.max(0.0);
                }
            }
        }

        for h in 0..=1u8 {
            for a in 0..=1u8 {
                let idx = h as usize * side + a as usize;
                cells[idx] =
                    (cells[idx] * dixon_coles::tau(h, a, lambda_home, lambda_away, self.dc_rho))
                        .max(0.0);
            }
        }

        let table_mass: f64 = cells.iter().sum();
        if table_mass <= 0.0 || !table_mass.is_finite() {
            return Err(EngineError::invalid(format!(
                "fixture {fixture:?}: degenerate score table (mass {table_mass})"
            )));
        }
        let overflow = (1.0 - table_mass).max(0.0);
        let total = table_mass + overflow;
        for p in &mut cells {
            *p /= total;
        }

        ScoreDistribution::from_table(fixture, generated_at, self.max_goals, cells, overflow / total)
    }

    /// Log pmf per goal count. Plain Poisson unless over-dispersion is
    /// configured, in which case a negative binomial with the same mean.
    fn log_marginal(&self, lambda: f64) -> Vec<f64> {
        let side = self.max_goals as usize + 1;
        let mut out = Vec::with_capacity(side);
        if self.dispersion <= f64::EPSILON {
            let ln_lambda = lambda.ln();
            for k in 0..side {
                out.push(k as f64 * ln_lambda - lambda - LOG_FACTORIALS[k]);
            }
        } else {
            let r = 1.0 / self.dispersion;
            let p = r / (r + lambda);
            let ln_p = p.ln();
            let ln_q = (1.0 - p).ln();
            for k in 0..side {
                out.push(
                    ln_gamma(k as f64 + r) - ln_gamma(r) - LOG_FACTORIALS[k]
                        + r * ln_p
                        + k as f64 * ln_q,
                );
            }
        }
        out
    }
}

fn cdf_from_log_pmf(ln_pmf: &[f64]) -> Vec<f64> {
    let mut acc = 0.0;
    ln_pmf
        .iter()
        .map(|&lp| {
            acc += lp.exp();
            acc.min(1.0)
        })
        .collect()
}

/// Frank copula CDF. theta -> 0 degenerates to independence; callers special
/// case that to avoid the 0/0.
fn frank_cdf(u: f64, v: f64, theta: f64) -> f64 {
    let num = ((-theta * u).exp_m1()) * ((-theta * v).exp_m1());
    let den = (-theta).exp_m1();
    let c = -(1.0 + num / den).ln() / theta;
    // Fréchet bounds guard against float drift at the grid edges.
    c.clamp((u + v - 1.0).max(0.0), u.min(v))
}

/// Lanczos approximation, g = 7. Only exercised for negative-binomial
/// marginals; Poisson goes through the integer factorial table.
fn ln_gamma(x: f64) -> f64 {
    const COEFFS: [f64; 8] = [
        676.520_368_121_885_1,
        -1_259.139_216_722_402_8,
        771.323_428_777_653_1,
        -176.615_029_162_140_6,
        12.507_343_278_686_905,
        -0.138_571_095_265_720_12,
        9.984_369_578_019_572e-6,
        1.505_632_735_149_311_6e-7,
    ];
    if x < 0.5 {
        // Reflection keeps the approximation in its accurate half-plane.
        return std::f64::consts::PI.ln()
            - (std::f64::consts::PI * x).sin().ln()
            - ln_gamma(1.0 - x);
    }
    let x = x - 1.0;
    let mut acc = 0.999_999_999_999_809_9_f64;
    for (i, c) in COEFFS.iter().enumerate() {
        acc += c / (x + i as f64 + 1.0);
    }
    let t = x + 7.5;
    0.5 * (2.0 * std::f64::consts::PI).ln() + (x + 0.5) * t.ln() - t + acc.ln()
}
