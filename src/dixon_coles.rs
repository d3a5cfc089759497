use chrono::{DateTime, Utc};

use crate::records::{Outcome, Prob3};

/// Dixon-Coles low-score correction factor. Independent Poisson marginals
/// under-produce 0-0 and 1-1 and over-produce 1-0/0-1 relative to real match
/// data; `tau` reweights exactly those four cells and leaves the rest alone.
pub fn tau(home_goals: u8, away_goals: u8, lambda_home: f64, lambda_away: f64, rho: f64) -> f64 {
    match (home_goals, away_goals) {
        (0, 0) => 1.0 - lambda_home * lambda_away * rho,
        (0, 1) => 1.0 + lambda_home * rho,
        (1, 0) => 1.0 + lambda_away * rho,
        (1, 1) => 1.0 - rho,
        _ => 1.0,
    }
}

/// Exponential down-weighting of a result `xi` per day old at fit time.
/// `xi = 0` keeps all history at full weight.
pub fn decay_weight(as_of: DateTime<Utc>, played: DateTime<Utc>, xi: f64) -> f64 {
    let days = (as_of - played).num_seconds().max(0) as f64 / 86_400.0;
    (-xi * days).exp()
}

/// 1X2 probabilities from independent Poisson marginals with the tau
/// correction applied, summed over a capped score grid.
pub fn outcome_probs(lambda_home: f64, lambda_away: f64, rho: f64, max_goals: u8) -> Prob3 {
    let pmf_home = poisson_pmf_table(lambda_home, max_goals);
    let pmf_away = poisson_pmf_table(lambda_away, max_goals);

    let mut probs = Prob3 {
        home: 0.0,
        draw: 0.0,
        away: 0.0,
    };
    for h in 0..=max_goals {
        for a in 0..=max_goals {
            let base = pmf_home[h as usize] * pmf_away[a as usize];
            let p = (base * tau(h, a, lambda_home, lambda_away, rho)).max(0.0);
            match crate::records::classify_outcome(h, a) {
                Outcome::Home => probs.home += p,
                Outcome::Draw => probs.draw += p,
                Outcome::Away => probs.away += p,
            }
        }
    }
    probs.normalized()
}

/// Grid-searches rho so the implied draw share matches an observed one.
/// Search band keeps tau positive for any expected-goals pair the engine
/// accepts.
pub fn fit_rho_to_draw_rate(
    lambda_home: f64,
    lambda_away: f64,
    observed_draw_rate: f64,
    max_goals: u8,
) -> f64 {
    let target = observed_draw_rate.clamp(0.05, 0.60);
    let mut best_rho = -0.10;
    let mut best_err = f64::INFINITY;

    for step in -25..=5 {
        let rho = step as f64 / 100.0;
        let p = outcome_probs(lambda_home, lambda_away, rho, max_goals);
        let err = (p.draw - target).abs();
        if err < best_err {
            best_err = err;
            best_rho = rho;
        }
    }
    best_rho
}

fn poisson_pmf_table(lambda: f64, max_goals: u8) -> Vec<f64> {
    let lambda = lambda.max(0.0);
    let mut out = vec![0.0; max_goals as usize + 1];
    out[0] = (-lambda).exp();
    for k in 1..out.len() {
        out[k] = out[k - 1] * lambda / k as f64;
    }
    out
}
