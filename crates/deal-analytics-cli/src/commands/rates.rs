use clap::Args;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Instant;

use deal_analytics_core::rate_solver::{self, SolverConfig};
use deal_analytics_core::time_value;
use deal_analytics_core::types::with_metadata;

use crate::input;

/// Arguments for IRR
#[derive(Args)]
pub struct IrrArgs {
    /// Path to JSON/YAML input file (overrides individual flags)
    #[arg(long)]
    pub input: Option<String>,

    /// Periodic cash flows (comma-separated, e.g. "-100,30,30,130")
    #[arg(long, value_delimiter = ',', allow_hyphen_values = true)]
    pub cash_flows: Option<Vec<f64>>,
}

/// Arguments for NPV
#[derive(Args)]
pub struct NpvArgs {
    /// Discount rate as a decimal (0.08 = 8%)
    #[arg(long, allow_hyphen_values = true)]
    pub rate: f64,

    /// Periodic cash flows (comma-separated, period 0 first)
    #[arg(long, value_delimiter = ',', allow_hyphen_values = true)]
    pub cash_flows: Vec<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IrrInput {
    pub cash_flows: Vec<f64>,
    #[serde(default)]
    pub solver: SolverConfig,
}

#[derive(Debug, Serialize)]
struct NpvOutput {
    npv: f64,
}

pub fn run_irr(args: IrrArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let irr_input: IrrInput = match args.cash_flows {
        Some(cash_flows) if args.input.is_none() => IrrInput {
            cash_flows,
            solver: SolverConfig::default(),
        },
        _ => input::read_request(args.input.as_deref(), "IRR")?,
    };

    let start = Instant::now();
    let solution = rate_solver::solve_irr_with(&irr_input.cash_flows, &irr_input.solver)?;
    let mut warnings = Vec::new();
    if solution.non_unique {
        warnings.push("Cash flows admit more than one IRR; the first root found is reported".into());
    }
    let output = with_metadata(
        "Internal Rate of Return (Newton-Raphson, bisection fallback)",
        &irr_input,
        warnings,
        start.elapsed().as_micros() as u64,
        solution,
    );
    Ok(serde_json::to_value(output)?)
}

pub fn run_npv(args: NpvArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let start = Instant::now();
    let npv = time_value::npv(args.rate, &args.cash_flows)?;
    let output = with_metadata(
        "Net Present Value",
        &serde_json::json!({ "rate": args.rate, "cash_flows": args.cash_flows }),
        Vec::new(),
        start.elapsed().as_micros() as u64,
        NpvOutput { npv },
    );
    Ok(serde_json::to_value(output)?)
}
