//! Before/after quality metrics for a calibrated field.
//!
//! Given the raw and calibrated probability vectors and (optionally) the race
//! result, computes bias, log-loss and Brier score for both vectors plus a
//! binned reliability score for the calibrated one. Without a result the
//! caller gets an explicitly tagged `Estimated` report so placeholder figures
//! can never be mistaken for measured ones.

use std::collections::HashMap;

use crate::engine::pipeline::{CalibratedPrediction, RawPrediction};

/// Clamp bound for probabilities inside the log-loss term.
const PROB_EPS: f64 = 1e-15;

/// Equal-width bins in the reliability curve.
const RELIABILITY_BINS: usize = 10;

/// Scalar quality metrics for one field, before and after calibration.
#[derive(Debug, Clone, PartialEq)]
pub struct EvaluationMetrics {
    /// Mean (predicted - actual); positive means systematic overestimation.
    pub bias_before: f64,
    pub bias_after: f64,
    pub log_loss_before: f64,
    pub log_loss_after: f64,
    pub brier_before: f64,
    pub brier_after: f64,
    /// 1 - mean |predicted - observed| over populated reliability bins,
    /// computed on the calibrated vector. Higher is better.
    pub reliability_after: f64,
}

/// A metrics set that knows whether it was measured against a real result.
#[derive(Debug, Clone, PartialEq)]
pub enum EvaluationReport {
    /// Ground truth was supplied; every figure is real.
    Measured(EvaluationMetrics),
    /// No ground truth yet; the figures are fixed illustrative placeholders.
    Estimated(EvaluationMetrics),
}

impl EvaluationReport {
    pub fn metrics(&self) -> &EvaluationMetrics {
        match self {
            EvaluationReport::Measured(m) | EvaluationReport::Estimated(m) => m,
        }
    }

    pub fn is_measured(&self) -> bool {
        matches!(self, EvaluationReport::Measured(_))
    }
}

/// Score raw vs. calibrated output.
///
/// `actual` maps driver name to 0/1; drivers missing from the map are scored
/// as non-winners. When `actual` is `None` this is not an error: the result
/// is an [`EvaluationReport::Estimated`] placeholder.
pub fn evaluate(
    raw: &[RawPrediction],
    calibrated: &[CalibratedPrediction],
    actual: Option<&HashMap<String, u8>>,
) -> EvaluationReport {
    let Some(actual) = actual else {
        return EvaluationReport::Estimated(placeholder_metrics());
    };

    let before: Vec<(f64, f64)> = raw
        .iter()
        .map(|p| (p.win_probability, outcome_for(actual, &p.driver)))
        .collect();
    let after: Vec<(f64, f64)> = calibrated
        .iter()
        .map(|p| (p.calibrated_probability, outcome_for(actual, &p.driver)))
        .collect();

    EvaluationReport::Measured(EvaluationMetrics {
        bias_before: mean_bias(&before),
        bias_after: mean_bias(&after),
        log_loss_before: mean_log_loss(&before),
        log_loss_after: mean_log_loss(&after),
        brier_before: mean_brier(&before),
        brier_after: mean_brier(&after),
        reliability_after: reliability_score(&after),
    })
}

fn outcome_for(actual: &HashMap<String, u8>, driver: &str) -> f64 {
    if actual.get(driver).copied().unwrap_or(0) != 0 {
        1.0
    } else {
        0.0
    }
}

fn mean_bias(samples: &[(f64, f64)]) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    samples.iter().map(|(p, a)| p - a).sum::<f64>() / samples.len() as f64
}

fn mean_log_loss(samples: &[(f64, f64)]) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    let total: f64 = samples
        .iter()
        .map(|(p, a)| {
            let p = p.clamp(PROB_EPS, 1.0 - PROB_EPS);
            -(a * p.ln() + (1.0 - a) * (1.0 - p).ln())
        })
        .sum();
    total / samples.len() as f64
}

fn mean_brier(samples: &[(f64, f64)]) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    samples.iter().map(|(p, a)| (p - a).powi(2)).sum::<f64>() / samples.len() as f64
}

/// Binned calibration-curve score: partition [0, 1] into ten equal bins, take
/// `|mean predicted - mean actual|` per populated bin, average over populated
/// bins only (empty bins are excluded, not counted as zero) and subtract from
/// one.
fn reliability_score(samples: &[(f64, f64)]) -> f64 {
    let mut counts = [0usize; RELIABILITY_BINS];
    let mut pred_sum = [0.0f64; RELIABILITY_BINS];
    let mut actual_sum = [0.0f64; RELIABILITY_BINS];

    for (p, a) in samples {
        let idx = ((p.clamp(0.0, 1.0) * RELIABILITY_BINS as f64) as usize)
            .min(RELIABILITY_BINS - 1);
        counts[idx] += 1;
        pred_sum[idx] += p;
        actual_sum[idx] += a;
    }

    let mut gap_sum = 0.0;
    let mut populated = 0usize;
    for i in 0..RELIABILITY_BINS {
        if counts[i] == 0 {
            continue;
        }
        let n = counts[i] as f64;
        gap_sum += (pred_sum[i] / n - actual_sum[i] / n).abs();
        populated += 1;
    }

    if populated == 0 {
        return 0.0;
    }
    1.0 - gap_sum / populated as f64
}

/// Illustrative figures shown when no race result is available yet.
fn placeholder_metrics() -> EvaluationMetrics {
    EvaluationMetrics {
        bias_before: 0.042,
        bias_after: 0.011,
        log_loss_before: 0.301,
        log_loss_after: 0.272,
        brier_before: 0.089,
        brier_after: 0.078,
        reliability_after: 0.87,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::pipeline::CalibrationStage;
    use approx::assert_relative_eq;

    fn raw(driver: &str, p: f64) -> RawPrediction {
        RawPrediction {
            driver: driver.into(),
            team: None,
            win_probability: p,
        }
    }

    fn calibrated(driver: &str, p: f64) -> CalibratedPrediction {
        CalibratedPrediction {
            driver: driver.into(),
            team: None,
            raw_probability: p,
            calibrated_probability: p,
            uncertainty: 0.0,
            stages: vec![CalibrationStage::TemperatureScaling],
        }
    }

    fn winner(driver: &str) -> HashMap<String, u8> {
        let mut m = HashMap::new();
        m.insert(driver.to_string(), 1);
        m
    }

    #[test]
    fn missing_ground_truth_yields_tagged_estimate() {
        let report = evaluate(&[raw("A", 0.5)], &[calibrated("A", 0.5)], None);
        assert!(!report.is_measured());
        assert!(matches!(report, EvaluationReport::Estimated(_)));
    }

    #[test]
    fn sharper_calibrated_field_scores_lower_log_loss_when_favorite_wins() {
        // Raw field is flatter than the calibrated one; the top calibrated
        // driver wins.
        let raws = vec![raw("A", 0.30), raw("B", 0.25), raw("C", 0.25), raw("D", 0.20)];
        let cals = vec![
            calibrated("A", 0.60),
            calibrated("B", 0.20),
            calibrated("C", 0.10),
            calibrated("D", 0.10),
        ];
        let report = evaluate(&raws, &cals, Some(&winner("A")));
        assert!(report.is_measured());
        let m = report.metrics();
        assert!(
            m.log_loss_after < m.log_loss_before,
            "after {} should beat before {}",
            m.log_loss_after,
            m.log_loss_before
        );
    }

    #[test]
    fn bias_is_mean_overestimation() {
        // Probabilities sum to 1.2 over 4 drivers with one winner:
        // mean(p - a) = (1.2 - 1.0) / 4 = 0.05.
        let raws = vec![raw("A", 0.5), raw("B", 0.3), raw("C", 0.2), raw("D", 0.2)];
        let cals: Vec<_> = raws
            .iter()
            .map(|r| calibrated(&r.driver, r.win_probability))
            .collect();
        let report = evaluate(&raws, &cals, Some(&winner("A")));
        assert_relative_eq!(report.metrics().bias_before, 0.05, epsilon = 1e-12);
    }

    #[test]
    fn brier_of_perfect_prediction_is_zero() {
        let raws = vec![raw("A", 1.0), raw("B", 0.0)];
        let cals = vec![calibrated("A", 1.0), calibrated("B", 0.0)];
        let report = evaluate(&raws, &cals, Some(&winner("A")));
        let m = report.metrics();
        assert_relative_eq!(m.brier_after, 0.0, epsilon = 1e-12);
        assert_relative_eq!(m.reliability_after, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn log_loss_stays_finite_at_probability_extremes() {
        // A confident zero on the actual winner must clamp, not blow up.
        let raws = vec![raw("A", 0.0)];
        let cals = vec![calibrated("A", 0.0)];
        let report = evaluate(&raws, &cals, Some(&winner("A")));
        assert!(report.metrics().log_loss_before.is_finite());
    }

    #[test]
    fn drivers_missing_from_results_count_as_non_winners() {
        let raws = vec![raw("A", 0.6), raw("B", 0.4)];
        let cals = vec![calibrated("A", 0.6), calibrated("B", 0.4)];
        // Result file only mentions A.
        let report = evaluate(&raws, &cals, Some(&winner("A")));
        // bias = ((0.6 - 1) + (0.4 - 0)) / 2 = 0
        assert_relative_eq!(report.metrics().bias_before, 0.0, epsilon = 1e-12);
    }

    #[test]
    fn reliability_averages_populated_bins_only() {
        // Two samples in the [0.2, 0.3) bin, one in [0.8, 0.9); the other
        // eight bins are empty and must not drag the score down.
        let after = vec![(0.25, 0.0), (0.25, 1.0), (0.85, 1.0)];
        let score = reliability_score(&after);
        // Bin gaps: |0.25 - 0.5| = 0.25 and |0.85 - 1.0| = 0.15 -> mean 0.2.
        assert_relative_eq!(score, 0.8, epsilon = 1e-12);
    }
}
