//! The per-driver calibration pipeline.
//!
//! A raw win probability passes through a fixed sequence of transforms:
//!
//! 1. **Temperature scaling** — `p^(1/T)`. T > 1 pulls the estimate toward
//!    uniform, T < 1 sharpens it.
//! 2. **Logistic recalibration** — an affine transform of the log-odds,
//!    `sigmoid(slope · logit(p) + intercept)`, correcting systematic
//!    over/under-confidence.
//! 3. **Driver bias** — additive per-driver correction, default 0.
//! 4. **Team multiplier** — multiplicative per-team correction, default 1.0,
//!    skipped when the prediction carries no team.
//! 5. **Driver-team multiplier** — multiplicative correction for a specific
//!    driver/team pairing, applied only when an entry exists.
//! 6. **Uncertainty** — binomial standard error `sqrt(p(1-p)/N)` with a fixed
//!    effective sample size.
//!
//! The stage order is a contract: reordering changes numeric results.

use serde::{Deserialize, Serialize};

use crate::params::CalibrationParameters;

/// Heuristic effective sample size behind the uncertainty band. This is a
/// fixed constant, not a propagated statistical error from earlier stages.
pub const EFFECTIVE_SAMPLE_SIZE: f64 = 100.0;

/// Keeps the logit finite at the probability extremes.
const LOGIT_EPS: f64 = 1e-15;

/// A raw win-probability estimate from the upstream model, in [0, 1].
#[derive(Debug, Clone, PartialEq)]
pub struct RawPrediction {
    pub driver: String,
    pub team: Option<String>,
    pub win_probability: f64,
}

/// One stage of the pipeline, recorded on the output for audit/debugging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CalibrationStage {
    TemperatureScaling,
    LogisticRecalibration,
    DriverBias,
    TeamMultiplier,
    DriverTeamMultiplier,
}

impl CalibrationStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            CalibrationStage::TemperatureScaling => "temperature_scaling",
            CalibrationStage::LogisticRecalibration => "logistic_recalibration",
            CalibrationStage::DriverBias => "driver_bias",
            CalibrationStage::TeamMultiplier => "team_multiplier",
            CalibrationStage::DriverTeamMultiplier => "driver_team_multiplier",
        }
    }
}

/// A calibrated (pre- or post-normalization) win probability.
#[derive(Debug, Clone, PartialEq)]
pub struct CalibratedPrediction {
    pub driver: String,
    pub team: Option<String>,
    /// Original estimate from the upstream model (0.0–1.0).
    pub raw_probability: f64,
    /// Calibrated estimate (0.0–1.0).
    pub calibrated_probability: f64,
    /// Heuristic standard-error band, >= 0.
    pub uncertainty: f64,
    /// Stages applied, in order.
    pub stages: Vec<CalibrationStage>,
}

/// Run one raw prediction through the full pipeline.
///
/// Pure function of its inputs; the batch-level sum-to-one constraint is the
/// normalizer's job.
pub fn calibrate(raw: &RawPrediction, params: &CalibrationParameters) -> CalibratedPrediction {
    let mut stages = Vec::with_capacity(5);

    // Stage 1: temperature scaling.
    let p1 = raw.win_probability.powf(1.0 / params.temperature);
    stages.push(CalibrationStage::TemperatureScaling);

    // Stage 2: logistic recalibration in log-odds space.
    let adjusted = params.logistic_slope * logit(p1) + params.logistic_intercept;
    let p2 = sigmoid(adjusted);
    stages.push(CalibrationStage::LogisticRecalibration);

    // Stage 3: additive driver bias (0 when the driver has no entry).
    let bias = params.driver_bias.get(&raw.driver).copied().unwrap_or(0.0);
    let p3 = (p2 + bias).clamp(0.0, 1.0);
    stages.push(CalibrationStage::DriverBias);

    // Stages 4 and 5 only run when the prediction carries a team.
    let mut p5 = p3;
    if let Some(team) = raw.team.as_deref() {
        let mult = params.team_multiplier.get(team).copied().unwrap_or(1.0);
        p5 = (p5 * mult).clamp(0.0, 1.0);
        stages.push(CalibrationStage::TeamMultiplier);

        if let Some(pair_mult) = params
            .driver_team_multiplier
            .get(&raw.driver)
            .and_then(|per_team| per_team.get(team))
        {
            p5 = (p5 * pair_mult).clamp(0.0, 1.0);
            stages.push(CalibrationStage::DriverTeamMultiplier);
        }
    }

    // Stage 6: binomial standard error at the final probability.
    let uncertainty = (p5 * (1.0 - p5) / EFFECTIVE_SAMPLE_SIZE).sqrt();

    CalibratedPrediction {
        driver: raw.driver.clone(),
        team: raw.team.clone(),
        raw_probability: raw.win_probability,
        calibrated_probability: p5,
        uncertainty,
        stages,
    }
}

/// Log-odds of `p`, with `p` clamped away from 0 and 1 to stay finite.
pub(crate) fn logit(p: f64) -> f64 {
    let p = p.clamp(LOGIT_EPS, 1.0 - LOGIT_EPS);
    (p / (1.0 - p)).ln()
}

/// Numerically stable logistic sigmoid.
pub(crate) fn sigmoid(x: f64) -> f64 {
    if x >= 0.0 {
        let z = (-x).exp();
        1.0 / (1.0 + z)
    } else {
        let z = x.exp();
        z / (1.0 + z)
    }
}
