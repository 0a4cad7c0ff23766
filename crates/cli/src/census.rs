//! `bedcensus run` / `bedcensus validate` — config-driven census reconciliation.

use std::io::Write;
use std::path::{Path, PathBuf};

use bedcensus_recon::config::SourceConfig;
use bedcensus_recon::model::{CanonicalRecord, CensusInput, CensusResult, DepartmentDay, RawTable};
use bedcensus_recon::{parse_table, CensusConfig, CensusError, SourceFormat, UnitRegistry};
use clap::ValueEnum;
use tracing::{debug, info};

use crate::exit_codes::{EXIT_CENSUS_INVALID_CONFIG, EXIT_CENSUS_RUNTIME, EXIT_USAGE};
use crate::CliError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Canonical table, one row per (date, unit)
    Csv,
    /// Full result: meta, summary, records and derived outputs
    Json,
}

fn census_err(code: u8, msg: impl Into<String>) -> CliError {
    CliError { code, message: msg.into(), hint: None }
}

fn engine_err(err: CensusError) -> CliError {
    let code = match err {
        CensusError::ConfigParse(_) | CensusError::ConfigValidation(_) => EXIT_CENSUS_INVALID_CONFIG,
        _ => EXIT_CENSUS_RUNTIME,
    };
    let hint = match err {
        CensusError::MissingColumn { .. } => {
            Some("map the raw header in [sources.<name>.columns]".to_string())
        }
        CensusError::UnsupportedFormat { .. } => Some("supported formats: csv, json".to_string()),
        _ => None,
    };
    CliError { code, message: err.to_string(), hint }
}

fn read_config(config_path: &Path) -> Result<CensusConfig, CliError> {
    let config_str = std::fs::read_to_string(config_path).map_err(|e| {
        census_err(EXIT_USAGE, format!("cannot read config {}: {e}", config_path.display()))
    })?;
    CensusConfig::from_toml(&config_str).map_err(engine_err)
}

// ---------------------------------------------------------------------------
// Input loading
// ---------------------------------------------------------------------------

fn load_source(base_dir: &Path, label: &str, source: &SourceConfig) -> Result<RawTable, CliError> {
    let path = base_dir.join(&source.file);
    let format = SourceFormat::resolve(&path, source.format.as_deref()).map_err(engine_err)?;
    let text = std::fs::read_to_string(&path)
        .map_err(|e| census_err(EXIT_CENSUS_RUNTIME, format!("cannot read {}: {e}", path.display())))?;
    let table = parse_table(format, label, &text).map_err(engine_err)?;
    debug!(source = label, path = %path.display(), rows = table.rows.len(), "loaded source table");
    Ok(table)
}

fn load_registry(base_dir: &Path, config: &CensusConfig) -> Result<UnitRegistry, CliError> {
    let registry = match config.registry.file {
        Some(ref file) => {
            let path = base_dir.join(file);
            let text = std::fs::read_to_string(&path).map_err(|e| {
                census_err(EXIT_CENSUS_RUNTIME, format!("cannot read registry {}: {e}", path.display()))
            })?;
            UnitRegistry::from_json(&text).map_err(engine_err)?
        }
        None => UnitRegistry::default(),
    };
    Ok(registry.with_overrides(&config.registry.overrides))
}

/// Load everything the config names. Paths resolve against the config's directory.
pub fn load_input(config_path: &Path, config: &CensusConfig) -> Result<CensusInput, CliError> {
    let base_dir = config_path.parent().unwrap_or_else(|| Path::new("."));
    Ok(CensusInput {
        legacy: load_source(base_dir, "legacy", &config.sources.legacy)?,
        primary: load_source(base_dir, "primary", &config.sources.primary)?,
        registry: load_registry(base_dir, config)?,
    })
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

fn open_output(path: Option<&Path>) -> Result<Box<dyn Write>, CliError> {
    match path {
        Some(p) => {
            let file = std::fs::File::create(p)
                .map_err(|e| census_err(EXIT_CENSUS_RUNTIME, format!("cannot write {}: {e}", p.display())))?;
            Ok(Box::new(std::io::BufWriter::new(file)))
        }
        None => Ok(Box::new(std::io::stdout().lock())),
    }
}

fn write_err(e: impl std::fmt::Display) -> CliError {
    census_err(EXIT_CENSUS_RUNTIME, format!("cannot write output: {e}"))
}

pub fn write_records_csv<W: Write>(out: W, records: &[CanonicalRecord]) -> Result<(), CliError> {
    let mut writer = csv::Writer::from_writer(out);
    writer.write_record(CanonicalRecord::csv_headers()).map_err(write_err)?;
    for r in records {
        writer.write_record(r.csv_fields()).map_err(write_err)?;
    }
    writer.flush().map_err(write_err)
}

pub fn write_rollup_csv<W: Write>(out: W, rollup: &[DepartmentDay]) -> Result<(), CliError> {
    let mut writer = csv::Writer::from_writer(out);
    writer.write_record(DepartmentDay::csv_headers()).map_err(write_err)?;
    for r in rollup {
        writer.write_record(r.csv_fields()).map_err(write_err)?;
    }
    writer.flush().map_err(write_err)
}

fn print_summary(result: &CensusResult) {
    let s = &result.summary;
    let span = match (result.meta.first_date, result.meta.last_date) {
        (Some(first), Some(last)) => format!("{first}..{last}"),
        _ => "empty".to_string(),
    };
    eprintln!(
        "census '{}' ({}): {} dates × {} units = {} rows [{}]",
        result.meta.config_name, result.meta.policy, s.dates, s.units, s.rows, span,
    );
    eprintln!(
        "readings: {} in, {} collapsed, {} legacy superseded; {} unvalidated days, {} jumps spread",
        s.readings_in, s.readings_collapsed, s.legacy_rows_superseded, s.unvalidated_days, s.jumps_spread,
    );
    if s.units_without_department > 0 {
        eprintln!(
            "note: {} unit(s) without department: {}",
            s.units_without_department,
            result.derived.units_without_department.join(", "),
        );
    }
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

pub fn cmd_run(
    config_path: PathBuf,
    output: Option<PathBuf>,
    format: OutputFormat,
    rollup: Option<PathBuf>,
) -> Result<(), CliError> {
    let config = read_config(&config_path)?;
    let input = load_input(&config_path, &config)?;
    info!(
        config = %config.name,
        legacy_rows = input.legacy.rows.len(),
        primary_rows = input.primary.rows.len(),
        registry_units = input.registry.len(),
        "loaded census inputs"
    );

    let result = bedcensus_recon::run(&config, &input).map_err(engine_err)?;

    let out = open_output(output.as_deref())?;
    match format {
        OutputFormat::Csv => write_records_csv(out, &result.records)?,
        OutputFormat::Json => {
            let mut out = out;
            serde_json::to_writer_pretty(&mut out, &result).map_err(write_err)?;
            writeln!(out).map_err(write_err)?;
            out.flush().map_err(write_err)?;
        }
    }
    if let Some(ref path) = output {
        eprintln!("wrote {}", path.display());
    }

    if let Some(ref path) = rollup {
        write_rollup_csv(open_output(Some(path))?, &result.derived.department_rollup)?;
        eprintln!("wrote {}", path.display());
    }

    print_summary(&result);
    Ok(())
}

pub fn cmd_validate(config_path: PathBuf) -> Result<(), CliError> {
    let config = read_config(&config_path)?;
    eprintln!(
        "valid: census '{}' with policy {}, spread {}, {} correction(s)",
        config.name,
        config.policy_name(),
        if config.spread.enabled { "on" } else { "off" },
        config.corrections.len(),
    );
    Ok(())
}
