use chrono::{TimeZone, Utc};
use proptest::prelude::*;

use goalcast::config::EngineConfig;
use goalcast::records::FixtureId;
use goalcast::score_dist::{MASS_TOLERANCE, ScoreDistributionEngine};

fn engine(theta: f64, rho: f64, dispersion: f64) -> ScoreDistributionEngine {
    ScoreDistributionEngine::new(&EngineConfig {
        copula_theta: theta,
        dc_rho: rho,
        dispersion,
        ..EngineConfig::default()
    })
}

fn now() -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 2, 21, 12, 0, 0).unwrap()
}

#[test]
fn known_rates_with_zero_correlation_match_the_poisson_product_mode() {
    // Team A: scores 1.8, concedes 0.9. Team B: scores 1.1, concedes 1.4.
    // Sides' rates blend what one attack produces with what the other
    // defense allows.
    let lambda_home = (1.8 + 1.4) / 2.0;
    let lambda_away = (1.1 + 0.9) / 2.0;

    let dist = engine(0.0, 0.0, 0.0)
        .build(FixtureId(1), lambda_home, lambda_away, now())
        .unwrap();

    // Direct computation of the independent product's argmax.
    let mut best = (0u8, 0u8);
    let mut best_p = f64::MIN;
    for h in 0..=10u8 {
        for a in 0..=10u8 {
            let p = poisson(lambda_home, h) * poisson(lambda_away, a);
            if p > best_p {
                best_p = p;
                best = (h, a);
            }
        }
    }

    assert_eq!(dist.most_likely_score(), best);
    assert!((dist.prob(best.0, best.1) - best_p).abs() < 1e-9);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn any_valid_inputs_yield_a_unit_mass_table(
        lambda_home in 0.05_f64..4.5,
        lambda_away in 0.05_f64..4.5,
        theta in -5.0_f64..5.0,
        rho in -0.25_f64..0.25,
    ) {
        let dist = engine(theta, rho, 0.0)
            .build(FixtureId(1), lambda_home, lambda_away, now())
            .unwrap();
        // validate() checks non-negativity and unit mass within tolerance.
        dist.validate().unwrap();

        let mut total = dist.overflow();
        for h in 0..=dist.max_goals() {
            for a in 0..=dist.max_goals() {
                let p = dist.prob(h, a);
                prop_assert!(p >= 0.0);
                total += p;
            }
        }
        prop_assert!((total - 1.0).abs() <= MASS_TOLERANCE);
    }

    #[test]
    fn overdispersed_tables_are_valid_too(
        lambda in 0.2_f64..3.0,
        dispersion in 0.05_f64..3.0,
    ) {
        let dist = engine(-0.35, -0.10, dispersion)
            .build(FixtureId(1), lambda, lambda, now())
            .unwrap();
        dist.validate().unwrap();
    }
}

fn poisson(lambda: f64, k: u8) -> f64 {
    let mut p = (-lambda).exp();
    for i in 1..=k {
        p *= lambda / i as f64;
    }
    p
}
