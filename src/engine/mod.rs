pub mod evaluate;
pub mod normalize;
pub mod pipeline;

pub use evaluate::{evaluate, EvaluationMetrics, EvaluationReport};
pub use normalize::normalize;
pub use pipeline::{calibrate, CalibratedPrediction, CalibrationStage, RawPrediction};

use crate::error::CalibrationError;
use crate::params::CalibrationParameters;

/// Calibrate a whole field: run every raw prediction through the pipeline,
/// then normalize the batch so the win probabilities sum to one.
pub fn calibrate_field(
    field: &[RawPrediction],
    params: &CalibrationParameters,
) -> Result<Vec<CalibratedPrediction>, CalibrationError> {
    let batch: Vec<CalibratedPrediction> =
        field.iter().map(|raw| calibrate(raw, params)).collect();
    normalize(batch)
}
