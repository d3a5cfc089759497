use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;
use crate::records::{FixtureId, Outcome, Prob3};

/// Forecast sources whose accuracy the tracker scores independently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Source {
    Model,
    Market,
    Stats,
}

impl Source {
    pub const ALL: [Source; 3] = [Source::Model, Source::Market, Source::Stats];

    fn idx(self) -> usize {
        match self {
            Source::Model => 0,
            Source::Market => 1,
            Source::Stats => 2,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Metrics {
    pub samples: usize,
    pub brier: f64,
    pub log_loss: f64,
    pub accuracy: f64,
}

impl Metrics {
    fn empty() -> Self {
        Self {
            samples: 0,
            brier: 0.0,
            log_loss: 0.0,
            accuracy: 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CalibrationBin {
    pub bucket_start: f64,
    pub bucket_end: f64,
    pub count: usize,
    pub avg_pred: f64,
    pub actual_rate: f64,
}

/// One logged prediction against its eventual result. Records are append-only
/// and never rewritten; the distributions they summarize stay immutable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionRecord {
    pub fixture: FixtureId,
    pub source_probs: [Option<Prob3>; 3],
    pub blended: Prob3,
    pub actual: Outcome,
}

/// Per-source blending weights derived from historical accuracy. Passed by
/// value into the blender so the feedback stays a one-directional pipeline.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CalibrationSnapshot {
    weights: [f64; 3],
}

impl Default for CalibrationSnapshot {
    fn default() -> Self {
        Self {
            weights: [1.0 / 3.0; 3],
        }
    }
}

impl CalibrationSnapshot {
    pub fn weight(&self, source: Source) -> f64 {
        self.weights[source.idx()]
    }
}

/// Records predicted-vs-actual outcomes across completed fixtures and turns
/// them into calibration diagnostics plus the blending weights fed forward
/// into the expected-goals blender.
#[derive(Debug, Clone, Default)]
pub struct CalibrationTracker {
    records: Vec<PredictionRecord>,
    bins: usize,
}

/// Softmax temperature for turning per-source log-loss into weights.
const WEIGHT_TEMPERATURE: f64 = 0.5;
/// Sources with fewer scored predictions than this stay at the neutral
/// uniform log-loss.
const MIN_SCORED: usize = 10;

impl CalibrationTracker {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            records: Vec::new(),
            bins: config.calibration_bins,
        }
    }

    pub fn record(&mut self, record: PredictionRecord) {
        self.records.push(record);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[PredictionRecord] {
        &self.records
    }

    /// Brier/log-loss/accuracy of the blended forecasts.
    pub fn metrics(&self) -> Metrics {
        let pairs: Vec<(Prob3, Outcome)> =
            self.records.iter().map(|r| (r.blended, r.actual)).collect();
        evaluate_pairs(&pairs)
    }

    /// Predicted-probability-vs-observed-frequency curve for one outcome
    /// class.
    pub fn curve(&self, class: Outcome) -> Vec<CalibrationBin> {
        let bins = self.bins.max(2);
        let mut counts = vec![0usize; bins];
        let mut pred_sum = vec![0.0_f64; bins];
        let mut actual_sum = vec![0.0_f64; bins];

        for record in &self.records {
            let p = record.blended.get(class).clamp(0.0, 1.0);
            let idx = ((p * bins as f64).floor() as usize).min(bins - 1);
            counts[idx] += 1;
            pred_sum[idx] += p;
            if record.actual == class {
                actual_sum[idx] += 1.0;
            }
        }

        (0..bins)
            .map(|i| {
                let count = counts[i];
                let (avg_pred, actual_rate) = if count > 0 {
                    (pred_sum[i] / count as f64, actual_sum[i] / count as f64)
                } else {
                    (0.0, 0.0)
                };
                CalibrationBin {
                    bucket_start: i as f64 / bins as f64,
                    bucket_end: (i + 1) as f64 / bins as f64,
                    count,
                    avg_pred,
                    actual_rate,
                }
            })
            .collect()
    }

    /// Per-source accuracy folded into blending weights: lower log-loss,
    /// higher weight. Sources with little evidence sit at the neutral
    /// uniform-prediction loss so they neither dominate nor vanish.
    pub fn snapshot(&self) -> CalibrationSnapshot {
        let neutral = 3.0_f64.ln();
        let mut losses = [neutral; 3];
        for source in Source::ALL {
            let pairs: Vec<(Prob3, Outcome)> = self
                .records
                .iter()
                .filter_map(|r| r.source_probs[source.idx()].map(|p| (p, r.actual)))
                .collect();
            if pairs.len() >= MIN_SCORED {
                losses[source.idx()] = evaluate_pairs(&pairs).log_loss;
            }
        }

        let max_score = losses
            .iter()
            .map(|l| -l / WEIGHT_TEMPERATURE)
            .fold(f64::MIN, f64::max);
        let mut weights = [0.0; 3];
        let mut total = 0.0;
        for (w, loss) in weights.iter_mut().zip(losses) {
            *w = (-loss / WEIGHT_TEMPERATURE - max_score).exp();
            total += *w;
        }
        for w in &mut weights {
            *w /= total;
        }
        CalibrationSnapshot { weights }
    }

    /// Logit-space recalibration of the blended forecasts: a sharpening scale
    /// and a draw offset fitted by grid search on log-loss.
    pub fn fit_logit_calibration(&self) -> (f64, f64, Metrics) {
        let pairs: Vec<(Prob3, Outcome)> =
            self.records.iter().map(|r| (r.blended, r.actual)).collect();
        if pairs.is_empty() {
            return (1.0, 0.0, Metrics::empty());
        }

        let mut best_scale = 1.0;
        let mut best_draw_bias = 0.0;
        let mut best_metrics = evaluate_pairs(&pairs);

        for scale_step in 35..=65 {
            let scale = scale_step as f64 / 50.0; // 0.70..1.30
            for draw_step in -30..=30 {
                let draw_bias = draw_step as f64 / 100.0; // -0.30..0.30
                let calibrated: Vec<(Prob3, Outcome)> = pairs
                    .iter()
                    .map(|&(p, o)| (apply_logit_calibration(p, scale, draw_bias), o))
                    .collect();
                let metrics = evaluate_pairs(&calibrated);
                if metrics.log_loss < best_metrics.log_loss {
                    best_metrics = metrics;
                    best_scale = scale;
                    best_draw_bias = draw_bias;
                }
            }
        }

        (best_scale, best_draw_bias, best_metrics)
    }
}

pub fn evaluate_pairs(pairs: &[(Prob3, Outcome)]) -> Metrics {
    if pairs.is_empty() {
        return Metrics::empty();
    }

    let mut brier_sum = 0.0_f64;
    let mut log_loss_sum = 0.0_f64;
    let mut correct = 0usize;

    for &(p, outcome) in pairs {
        let y = one_hot(outcome);
        brier_sum +=
            (p.home - y.home).powi(2) + (p.draw - y.draw).powi(2) + (p.away - y.away).powi(2);
        log_loss_sum += -p.get(outcome).clamp(1e-12, 1.0).ln();
        if p.argmax() == outcome {
            correct += 1;
        }
    }

    let n = pairs.len() as f64;
    Metrics {
        samples: pairs.len(),
        brier: brier_sum / n,
        log_loss: log_loss_sum / n,
        accuracy: correct as f64 / n,
    }
}

/// Centered logit rescale with a draw offset; stays normalized by
/// construction.
pub fn apply_logit_calibration(prob: Prob3, logit_scale: f64, draw_bias: f64) -> Prob3 {
    let s = logit_scale.clamp(0.50, 1.80);
    let mut lh = prob.home.clamp(1e-9, 1.0).ln();
    let mut ld = prob.draw.clamp(1e-9, 1.0).ln() + draw_bias;
    let mut la = prob.away.clamp(1e-9, 1.0).ln();

    let mean = (lh + ld + la) / 3.0;
    lh = (lh - mean) * s;
    ld = (ld - mean) * s;
    la = (la - mean) * s;

    let mx = lh.max(ld.max(la));
    Prob3 {
        home: (lh - mx).exp(),
        draw: (ld - mx).exp(),
        away: (la - mx).exp(),
    }
    .normalized()
}

fn one_hot(outcome: Outcome) -> Prob3 {
    match outcome {
        Outcome::Home => Prob3 {
            home: 1.0,
            draw: 0.0,
            away: 0.0,
        },
        Outcome::Draw => Prob3 {
            home: 0.0,
            draw: 1.0,
            away: 0.0,
        },
        Outcome::Away => Prob3 {
            home: 0.0,
            draw: 0.0,
            away: 1.0,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker() -> CalibrationTracker {
        CalibrationTracker::new(&EngineConfig::default())
    }

    fn sharp(outcome: Outcome) -> Prob3 {
        match outcome {
            Outcome::Home => Prob3 {
                home: 0.8,
                draw: 0.12,
                away: 0.08,
            },
            Outcome::Draw => Prob3 {
                home: 0.15,
                draw: 0.7,
                away: 0.15,
            },
            Outcome::Away => Prob3 {
                home: 0.08,
                draw: 0.12,
                away: 0.8,
            },
        }
    }

    #[test]
    fn perfect_predictions_have_zero_brier() {
        let pairs = vec![
            (one_hot(Outcome::Home), Outcome::Home),
            (one_hot(Outcome::Draw), Outcome::Draw),
            (one_hot(Outcome::Away), Outcome::Away),
        ];
        let m = evaluate_pairs(&pairs);
        assert_eq!(m.samples, 3);
        assert!(m.brier < 1e-12);
        assert!((m.accuracy - 1.0).abs() < 1e-12);
    }

    #[test]
    fn logit_calibration_keeps_distribution_normalized() {
        let p = Prob3 {
            home: 0.44,
            draw: 0.27,
            away: 0.29,
        };
        let q = apply_logit_calibration(p, 1.12, 0.08);
        let sum = q.home + q.draw + q.away;
        assert!((sum - 1.0).abs() < 1e-9);
        assert!(q.home >= 0.0 && q.draw >= 0.0 && q.away >= 0.0);
    }

    #[test]
    fn accurate_source_earns_more_weight() {
        let mut t = tracker();
        for i in 0..30u64 {
            let actual = match i % 3 {
                0 => Outcome::Home,
                1 => Outcome::Draw,
                _ => Outcome::Away,
            };
            // Market is sharp and right; model is permanently uniform.
            t.record(PredictionRecord {
                fixture: FixtureId(i),
                source_probs: [Some(Prob3::uniform()), Some(sharp(actual)), None],
                blended: sharp(actual),
                actual,
            });
        }
        let snapshot = t.snapshot();
        assert!(snapshot.weight(Source::Market) > snapshot.weight(Source::Model));
        // Stats never reported, so it sits at the neutral prior.
        assert!(snapshot.weight(Source::Stats) <= snapshot.weight(Source::Market));
        let total: f64 = Source::ALL.iter().map(|&s| snapshot.weight(s)).sum();
        assert!((total - 1.0).abs() < 1e-9);
    }

    #[test]
    fn empty_tracker_yields_uniform_snapshot() {
        let snapshot = tracker().snapshot();
        for source in Source::ALL {
            assert!((snapshot.weight(source) - 1.0 / 3.0).abs() < 1e-9);
        }
    }

    #[test]
    fn curve_buckets_count_every_record() {
        let mut t = tracker();
        for i in 0..20u64 {
            t.record(PredictionRecord {
                fixture: FixtureId(i),
                source_probs: [None, None, None],
                blended: sharp(Outcome::Home),
                actual: if i % 2 == 0 { Outcome::Home } else { Outcome::Away },
            });
        }
        let curve = t.curve(Outcome::Home);
        let total: usize = curve.iter().map(|b| b.count).sum();
        assert_eq!(total, 20);
    }

    #[test]
    fn underconfident_forecasts_fit_a_sharpening_scale() {
        let mut t = tracker();
        // Outcomes follow the forecast's argmax far more often than the
        // stated 45% confidence: recalibration should sharpen.
        for i in 0..60u64 {
            let actual = if i % 10 < 9 { Outcome::Home } else { Outcome::Away };
            t.record(PredictionRecord {
                fixture: FixtureId(i),
                source_probs: [None, None, None],
                blended: Prob3 {
                    home: 0.45,
                    draw: 0.30,
                    away: 0.25,
                },
                actual,
            });
        }
        let (scale, _bias, metrics) = t.fit_logit_calibration();
        assert!(scale > 1.0);
        let raw: Vec<(Prob3, Outcome)> =
            t.records().iter().map(|r| (r.blended, r.actual)).collect();
        assert!(metrics.log_loss < evaluate_pairs(&raw).log_loss + 1e-9);
    }
}
