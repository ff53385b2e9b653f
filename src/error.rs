use thiserror::Error;

/// Errors surfaced by the calibration engine.
///
/// Storage read/write failures are intentionally absent: persistence is
/// best-effort and downgraded to a `tracing::warn!` at the storage layer, so
/// a calibration call can never fail because the database is unavailable.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CalibrationError {
    /// Every calibrated probability in the batch was zero, so there is no
    /// distribution to normalize.
    #[error("degenerate distribution: calibrated probabilities sum to zero")]
    DegenerateDistribution,

    /// A parameter update was rejected; the stored parameters are unchanged.
    #[error("invalid calibration parameter: {0}")]
    InvalidParameter(String),
}
