//! Wire records exchanged with the outside world.
//!
//! The upstream model speaks percentages in [0, 100]; the engine works on
//! [0, 1]. Conversion happens here, at the boundary, in both directions.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::engine::{CalibratedPrediction, RawPrediction};

/// One raw prediction as emitted by the upstream model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawPredictionRecord {
    pub driver: String,
    #[serde(default)]
    pub team: Option<String>,
    /// Win probability as a percentage (0.0–100.0).
    pub win_probability_pct: f64,
}

impl RawPredictionRecord {
    /// Convert to the engine's [0, 1] representation. Out-of-range
    /// percentages are clamped with a warning; the upstream model
    /// occasionally emits rounding artifacts like 100.0001.
    pub fn into_prediction(self) -> RawPrediction {
        let pct = if self.win_probability_pct.is_finite() {
            self.win_probability_pct
        } else {
            warn!(
                "non-finite win probability for {}, treating as 0%",
                self.driver
            );
            0.0
        };
        if !(0.0..=100.0).contains(&pct) {
            warn!(
                "win probability {pct}% for {} outside [0, 100], clamping",
                self.driver
            );
        }
        RawPrediction {
            driver: self.driver,
            team: self.team,
            win_probability: pct.clamp(0.0, 100.0) / 100.0,
        }
    }
}

/// One calibrated prediction in egress form. Calibrated percentages across a
/// batch sum to 100 within tolerance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalibratedPredictionRecord {
    pub driver: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub team: Option<String>,
    pub raw_probability_pct: f64,
    pub calibrated_probability_pct: f64,
    pub uncertainty_pct: f64,
    /// Pipeline stages applied, in order, for audit/debugging.
    pub stages: Vec<String>,
}

impl From<&CalibratedPrediction> for CalibratedPredictionRecord {
    fn from(p: &CalibratedPrediction) -> Self {
        CalibratedPredictionRecord {
            driver: p.driver.clone(),
            team: p.team.clone(),
            raw_probability_pct: p.raw_probability * 100.0,
            calibrated_probability_pct: p.calibrated_probability * 100.0,
            uncertainty_pct: p.uncertainty * 100.0,
            stages: p.stages.iter().map(|s| s.as_str().to_string()).collect(),
        }
    }
}

/// A race result file: either a full driver -> 0/1 map or the convenience
/// shape `{"winner": "..."}`.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RaceResultRecord {
    Winner { winner: String },
    Outcomes(HashMap<String, u8>),
}

impl RaceResultRecord {
    pub fn into_outcomes(self) -> HashMap<String, u8> {
        match self {
            RaceResultRecord::Winner { winner } => {
                let mut outcomes = HashMap::new();
                outcomes.insert(winner, 1);
                outcomes
            }
            RaceResultRecord::Outcomes(outcomes) => outcomes,
        }
    }
}
