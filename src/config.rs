use std::fs;
use std::path::PathBuf;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};

use crate::params::ParameterUpdate;

/// Race win-probability calibration engine
#[derive(Parser, Debug)]
#[command(name = "racecal", version, about)]
pub struct Cli {
    /// SQLite database path for the calibration parameter store
    #[arg(long, env = "RACECAL_DB", default_value = "racecal.db", global = true)]
    pub db: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Calibrate a field of raw win probabilities
    Calibrate {
        /// JSON file with an array of raw prediction records
        #[arg(long)]
        input: PathBuf,

        /// Where to write the calibrated records (stdout when omitted)
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Score raw vs. calibrated probabilities against a race result
    Evaluate {
        /// JSON file with an array of raw prediction records
        #[arg(long)]
        input: PathBuf,

        /// JSON race result: a driver -> 0/1 map or {"winner": "..."}.
        /// Without it an estimated placeholder report is printed.
        #[arg(long)]
        results: Option<PathBuf>,
    },

    /// Inspect or modify the stored calibration parameters
    Params {
        #[command(subcommand)]
        action: ParamsAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum ParamsAction {
    /// Print the current parameter set as JSON
    Show,
    /// Apply a partial parameter update
    Set(SetArgs),
    /// Restore the built-in default parameters
    Reset,
}

#[derive(Args, Debug)]
pub struct SetArgs {
    /// Temperature for the first pipeline stage (must be > 0)
    #[arg(long)]
    pub temperature: Option<f64>,

    /// Slope of the logistic recalibration stage
    #[arg(long)]
    pub slope: Option<f64>,

    /// Intercept of the logistic recalibration stage
    #[arg(long)]
    pub intercept: Option<f64>,

    /// JSON file with a partial update; this is how the map-valued fields
    /// (driver_bias, team_multiplier, driver_team_multiplier) are supplied
    #[arg(long)]
    pub file: Option<PathBuf>,
}

impl SetArgs {
    /// Build the partial update: file contents first, direct flags override.
    pub fn into_update(self) -> anyhow::Result<ParameterUpdate> {
        let mut update = match &self.file {
            Some(path) => {
                let raw = fs::read_to_string(path)
                    .with_context(|| format!("reading parameter update {}", path.display()))?;
                serde_json::from_str::<ParameterUpdate>(&raw)
                    .with_context(|| format!("parsing parameter update {}", path.display()))?
            }
            None => ParameterUpdate::default(),
        };

        if self.temperature.is_some() {
            update.temperature = self.temperature;
        }
        if self.slope.is_some() {
            update.logistic_slope = self.slope;
        }
        if self.intercept.is_some() {
            update.logistic_intercept = self.intercept;
        }

        if update.is_empty() {
            anyhow::bail!(
                "nothing to update: supply --temperature, --slope, --intercept or --file"
            );
        }
        Ok(update)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_override_absent_file() {
        let args = SetArgs {
            temperature: Some(1.5),
            slope: None,
            intercept: None,
            file: None,
        };
        let update = args.into_update().unwrap();
        assert_eq!(update.temperature, Some(1.5));
        assert!(update.logistic_slope.is_none());
    }

    #[test]
    fn empty_update_is_rejected() {
        let args = SetArgs {
            temperature: None,
            slope: None,
            intercept: None,
            file: None,
        };
        assert!(args.into_update().is_err());
    }
}
