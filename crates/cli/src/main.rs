// bedcensus - headless ICU bed-census reconciliation

mod census;
mod exit_codes;
mod logging;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

use census::OutputFormat;
use exit_codes::EXIT_SUCCESS;

#[derive(Parser)]
#[command(name = "bedcensus")]
#[command(about = "Reconcile raw ICU bed-count readings into a dense daily table")]
#[command(long_version = long_version())]
#[command(version)]
struct Cli {
    /// Debug-level logging on stderr (RUST_LOG overrides the default filter)
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the reconciliation described by a census config
    #[command(after_help = "\
Examples:
  bedcensus run grand-est.census.toml > census.csv
  bedcensus run grand-est.census.toml --output census.csv --rollup departments.csv
  bedcensus run grand-est.census.toml --format json --output result.json")]
    Run {
        /// Path to the .census.toml config file
        config: PathBuf,

        /// Write the output to a file instead of stdout
        #[arg(long, short)]
        output: Option<PathBuf>,

        /// Output format
        #[arg(long, short, value_enum, default_value = "csv")]
        format: OutputFormat,

        /// Also write the per-department daily rollup as CSV
        #[arg(long)]
        rollup: Option<PathBuf>,
    },

    /// Validate a census config without loading any data
    #[command(after_help = "\
Examples:
  bedcensus validate grand-est.census.toml")]
    Validate {
        /// Path to the .census.toml config file
        config: PathBuf,
    },
}

fn long_version() -> &'static str {
    concat!(
        env!("CARGO_PKG_VERSION"),
        " (", env!("BEDCENSUS_GIT_HASH"), ")",
        "\nengine:  bedcensus-recon ", env!("CARGO_PKG_VERSION"),
        "\ntarget:  ", env!("BEDCENSUS_TARGET"),
    )
}

#[derive(Debug)]
pub struct CliError {
    pub code: u8,
    pub message: String,
    pub hint: Option<String>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init_logging(cli.verbose);

    let result = match cli.command {
        Commands::Run { config, output, format, rollup } => census::cmd_run(config, output, format, rollup),
        Commands::Validate { config } => census::cmd_validate(config),
    };

    match result {
        Ok(()) => ExitCode::from(EXIT_SUCCESS),
        Err(CliError { code, message, hint }) => {
            if !message.is_empty() {
                eprintln!("error: {}", message);
            }
            if let Some(hint) = hint {
                eprintln!("hint:  {}", hint);
            }
            ExitCode::from(code)
        }
    }
}
