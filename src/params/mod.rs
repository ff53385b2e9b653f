//! Calibration parameters and their store.
//!
//! The store owns the only mutable state in the system. It hands out cloned
//! snapshots, applies explicit partial updates, and persists best-effort
//! through an injectable [`ParameterStorage`] port. There is no global
//! singleton; `main` builds one store and passes it where needed.

pub mod storage;

pub use storage::{MemoryStorage, ParameterStorage, SqliteStorage};

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::CalibrationError;

/// Coefficients consumed by the calibration pipeline.
///
/// Lookup misses have defined defaults: 0 for the additive driver bias, 1.0
/// for the multiplicative team and driver-team tables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationParameters {
    /// Temperature for stage 1; must be positive.
    pub temperature: f64,
    /// Slope of the affine log-odds transform in stage 2.
    pub logistic_slope: f64,
    /// Intercept of the affine log-odds transform in stage 2.
    pub logistic_intercept: f64,
    /// Additive per-driver correction (stage 3).
    #[serde(default)]
    pub driver_bias: HashMap<String, f64>,
    /// Multiplicative per-team correction (stage 4).
    #[serde(default)]
    pub team_multiplier: HashMap<String, f64>,
    /// Multiplicative correction for specific driver/team pairings (stage 5).
    #[serde(default)]
    pub driver_team_multiplier: HashMap<String, HashMap<String, f64>>,
}

impl Default for CalibrationParameters {
    /// Built-in constants, tuned offline against historical race results.
    fn default() -> Self {
        CalibrationParameters {
            temperature: 1.061,
            logistic_slope: 1.1,
            logistic_intercept: -0.05,
            driver_bias: HashMap::new(),
            team_multiplier: HashMap::new(),
            driver_team_multiplier: HashMap::new(),
        }
    }
}

/// Whether the current parameters are the built-in constants or have been
/// overridden through an update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParameterSource {
    Default,
    Overridden,
}

/// An immutable snapshot of the stored parameters plus their lifecycle tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterSet {
    pub source: ParameterSource,
    pub values: CalibrationParameters,
}

impl ParameterSet {
    pub fn builtin() -> Self {
        ParameterSet {
            source: ParameterSource::Default,
            values: CalibrationParameters::default(),
        }
    }
}

/// A partial parameter update. Omitted fields keep their prior value; a
/// supplied map-valued field replaces the prior map wholesale (supplying a
/// smaller map is how stale per-driver entries get cleared).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParameterUpdate {
    pub temperature: Option<f64>,
    pub logistic_slope: Option<f64>,
    pub logistic_intercept: Option<f64>,
    pub driver_bias: Option<HashMap<String, f64>>,
    pub team_multiplier: Option<HashMap<String, f64>>,
    pub driver_team_multiplier: Option<HashMap<String, HashMap<String, f64>>>,
}

impl ParameterUpdate {
    /// True when the update supplies no field at all.
    pub fn is_empty(&self) -> bool {
        self.temperature.is_none()
            && self.logistic_slope.is_none()
            && self.logistic_intercept.is_none()
            && self.driver_bias.is_none()
            && self.team_multiplier.is_none()
            && self.driver_team_multiplier.is_none()
    }

    fn validate(&self) -> Result<(), CalibrationError> {
        if let Some(t) = self.temperature {
            if !(t > 0.0) || !t.is_finite() {
                return Err(CalibrationError::InvalidParameter(format!(
                    "temperature must be positive and finite, got {t}"
                )));
            }
        }
        if let Some(s) = self.logistic_slope {
            if !s.is_finite() {
                return Err(CalibrationError::InvalidParameter(format!(
                    "logistic slope must be finite, got {s}"
                )));
            }
        }
        if let Some(i) = self.logistic_intercept {
            if !i.is_finite() {
                return Err(CalibrationError::InvalidParameter(format!(
                    "logistic intercept must be finite, got {i}"
                )));
            }
        }
        Ok(())
    }
}

/// Owns the current parameter set and its persistence port.
pub struct ParameterStore {
    current: ParameterSet,
    storage: Box<dyn ParameterStorage>,
}

impl ParameterStore {
    /// Build a store, loading any persisted set. A missing, malformed or
    /// unreadable blob falls back to the built-in defaults; that is a
    /// warning, never an error.
    pub fn open(storage: Box<dyn ParameterStorage>) -> Self {
        let current = match storage.load() {
            Ok(Some(set)) => set,
            Ok(None) => ParameterSet::builtin(),
            Err(err) => {
                warn!("failed to load calibration parameters, using defaults: {err:#}");
                ParameterSet::builtin()
            }
        };
        ParameterStore { current, storage }
    }

    /// Read-only snapshot of the current set.
    pub fn snapshot(&self) -> ParameterSet {
        self.current.clone()
    }

    /// Apply a partial update. Rejects invalid values and leaves the stored
    /// set untouched in that case; on success the set becomes `Overridden`
    /// and is persisted best-effort.
    pub fn update(&mut self, update: ParameterUpdate) -> Result<(), CalibrationError> {
        update.validate()?;

        let mut values = self.current.values.clone();
        if let Some(t) = update.temperature {
            values.temperature = t;
        }
        if let Some(s) = update.logistic_slope {
            values.logistic_slope = s;
        }
        if let Some(i) = update.logistic_intercept {
            values.logistic_intercept = i;
        }
        if let Some(bias) = update.driver_bias {
            values.driver_bias = bias;
        }
        if let Some(mult) = update.team_multiplier {
            values.team_multiplier = mult;
        }
        if let Some(pair) = update.driver_team_multiplier {
            values.driver_team_multiplier = pair;
        }

        self.current = ParameterSet {
            source: ParameterSource::Overridden,
            values,
        };
        self.persist();
        Ok(())
    }

    /// Restore the built-in constants.
    pub fn reset(&mut self) {
        self.current = ParameterSet::builtin();
        self.persist();
    }

    fn persist(&self) {
        if let Err(err) = self.storage.save(&self.current) {
            warn!("failed to persist calibration parameters: {err:#}");
        }
    }
}
