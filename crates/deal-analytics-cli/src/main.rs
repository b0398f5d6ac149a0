mod commands;
mod input;
mod logging;
mod output;

use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use std::process;

use commands::analyze::AnalyzeArgs;
use commands::rates::{IrrArgs, NpvArgs};

/// Deal analytics: IRR, tornado, break-even, scenarios and Monte Carlo
#[derive(Parser)]
#[command(
    name = "dealx",
    version,
    about = "Deal analytics: IRR, tornado, break-even, scenarios and Monte Carlo",
    long_about = "A CLI for running reproducible cash-flow analyses over a deal model. \
                  Reads a JSON or YAML analysis request from --input or stdin and \
                  prints the sensitivity, break-even, scenario and Monte Carlo results."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format
    #[arg(long, default_value = "json", global = true)]
    output: OutputFormat,

    /// Log level for stderr diagnostics (overrides RUST_LOG)
    #[arg(long, global = true)]
    log_level: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a full analysis request
    Analyze(AnalyzeArgs),
    /// Solve the internal rate of return of a cash-flow series
    Irr(IrrArgs),
    /// Net present value of a cash-flow series
    Npv(NpvArgs),
    /// Print version information
    Version,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Csv,
    Minimal,
}

fn main() {
    let cli = Cli::parse();
    logging::init_logging(cli.log_level.as_deref());

    let result: Result<serde_json::Value, Box<dyn std::error::Error>> = match cli.command {
        Commands::Analyze(args) => commands::analyze::run_analyze(args),
        Commands::Irr(args) => commands::rates::run_irr(args),
        Commands::Npv(args) => commands::rates::run_npv(args),
        Commands::Version => {
            println!("dealx {}", env!("CARGO_PKG_VERSION"));
            return;
        }
    };

    match result.and_then(|value| output::render(&cli.output, &value)) {
        Ok(()) => process::exit(0),
        Err(e) => {
            eprintln!("{}: {}", "error".red().bold(), e);
            process::exit(1);
        }
    }
}
