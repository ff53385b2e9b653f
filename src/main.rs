use std::collections::HashMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};

mod config;
mod engine;
mod error;
mod params;
mod records;

use config::{Cli, Command, ParamsAction};
use engine::{calibrate_field, evaluate, EvaluationReport, RawPrediction};
use params::{MemoryStorage, ParameterStorage, ParameterStore, SqliteStorage};
use records::{CalibratedPredictionRecord, RaceResultRecord, RawPredictionRecord};

fn main() -> Result<()> {
    // Initialise tracing / logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    // An unavailable database is a warning, not a failure: calibration keeps
    // working on the built-in defaults, it just won't persist.
    let storage: Box<dyn ParameterStorage> = match SqliteStorage::open(&cli.db) {
        Ok(storage) => Box::new(storage),
        Err(err) => {
            warn!("calibration store unavailable ({err:#}); parameters will not persist");
            Box::new(MemoryStorage::new())
        }
    };
    let mut store = ParameterStore::open(storage);

    match cli.command {
        Command::Calibrate { input, output } => run_calibrate(&store, &input, output.as_deref()),
        Command::Evaluate { input, results } => run_evaluate(&store, &input, results.as_deref()),
        Command::Params { action } => run_params(&mut store, action),
    }
}

fn run_calibrate(store: &ParameterStore, input: &Path, output: Option<&Path>) -> Result<()> {
    let field = read_field(input)?;
    let params = store.snapshot();
    info!(
        "calibrating {} drivers with {:?} parameters",
        field.len(),
        params.source
    );

    let calibrated = calibrate_field(&field, &params.values)?;
    let records: Vec<CalibratedPredictionRecord> =
        calibrated.iter().map(CalibratedPredictionRecord::from).collect();
    let json = serde_json::to_string_pretty(&records)?;

    match output {
        Some(path) => {
            fs::write(path, json)
                .with_context(|| format!("writing calibrated field to {}", path.display()))?;
            info!("calibrated field written to {}", path.display());
        }
        None => println!("{json}"),
    }
    Ok(())
}

fn run_evaluate(store: &ParameterStore, input: &Path, results: Option<&Path>) -> Result<()> {
    let field = read_field(input)?;
    let params = store.snapshot();
    let calibrated = calibrate_field(&field, &params.values)?;

    let outcomes: Option<HashMap<String, u8>> = match results {
        Some(path) => {
            let raw = fs::read_to_string(path)
                .with_context(|| format!("reading race result {}", path.display()))?;
            let record: RaceResultRecord = serde_json::from_str(&raw)
                .with_context(|| format!("parsing race result {}", path.display()))?;
            Some(record.into_outcomes())
        }
        None => None,
    };

    let report = evaluate(&field, &calibrated, outcomes.as_ref());
    print_report(&report);
    Ok(())
}

fn run_params(store: &mut ParameterStore, action: ParamsAction) -> Result<()> {
    match action {
        ParamsAction::Show => {
            println!("{}", serde_json::to_string_pretty(&store.snapshot())?);
        }
        ParamsAction::Set(args) => {
            let update = args.into_update()?;
            store.update(update)?;
            info!("calibration parameters updated");
        }
        ParamsAction::Reset => {
            store.reset();
            info!("calibration parameters reset to built-in defaults");
        }
    }
    Ok(())
}

fn read_field(path: &Path) -> Result<Vec<RawPrediction>> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("reading predictions from {}", path.display()))?;
    let records: Vec<RawPredictionRecord> = serde_json::from_str(&raw)
        .with_context(|| format!("parsing predictions from {}", path.display()))?;
    Ok(records
        .into_iter()
        .map(RawPredictionRecord::into_prediction)
        .collect())
}

fn print_report(report: &EvaluationReport) {
    match report {
        EvaluationReport::Measured(_) => println!("report: measured against the supplied result"),
        EvaluationReport::Estimated(_) => {
            println!("report: ESTIMATED placeholder (no race result supplied)")
        }
    }
    let m = report.metrics();
    println!("bias         before {:+.4}   after {:+.4}", m.bias_before, m.bias_after);
    println!(
        "log loss     before {:.4}   after {:.4}",
        m.log_loss_before, m.log_loss_after
    );
    println!(
        "brier score  before {:.4}   after {:.4}",
        m.brier_before, m.brier_after
    );
    println!("reliability  after  {:.4}", m.reliability_after);
}
