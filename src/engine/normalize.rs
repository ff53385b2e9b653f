//! Batch normalization: rescale a calibrated field so win probabilities sum
//! to exactly one.

use crate::engine::pipeline::CalibratedPrediction;
use crate::error::CalibrationError;

/// Rescale every probability in the batch by `1 / sum` so the field sums to 1.
///
/// Uncertainty is scaled by the same factor. That has no statistical
/// justification; it preserves relative ranking of the bands, nothing more.
///
/// Fails with [`CalibrationError::DegenerateDistribution`] when the sum is
/// zero (including the empty batch) or otherwise unusable, rather than ever
/// producing NaN or infinity.
pub fn normalize(
    batch: Vec<CalibratedPrediction>,
) -> Result<Vec<CalibratedPrediction>, CalibrationError> {
    let sum: f64 = batch.iter().map(|p| p.calibrated_probability).sum();
    if sum <= 0.0 || !sum.is_finite() {
        return Err(CalibrationError::DegenerateDistribution);
    }

    let factor = 1.0 / sum;
    Ok(batch
        .into_iter()
        .map(|mut p| {
            p.calibrated_probability *= factor;
            p.uncertainty *= factor;
            p
        })
        .collect())
}
