use clap::Args;
use serde_json::Value;
use tracing::info;

use deal_analytics_core::{analyze_request, AnalysisRequest};

use crate::input;

/// Arguments for a full deal analysis
#[derive(Args)]
pub struct AnalyzeArgs {
    /// Path to a JSON or YAML analysis request
    #[arg(long)]
    pub input: Option<String>,

    /// Wall-clock budget for the whole analysis, in milliseconds
    #[arg(long)]
    pub timeout_ms: Option<u64>,

    /// Monte Carlo seed (overrides the request)
    #[arg(long)]
    pub seed: Option<u64>,

    /// Monte Carlo trial count (overrides the request)
    #[arg(long)]
    pub trials: Option<u32>,

    /// Skip the tornado analysis
    #[arg(long)]
    pub no_sensitivity: bool,
}

pub fn run_analyze(args: AnalyzeArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let mut request: AnalysisRequest = input::read_request(args.input.as_deref(), "analysis")?;

    if let Some(ms) = args.timeout_ms {
        request.options.timeout_ms = Some(ms);
    }
    if args.no_sensitivity {
        request.options.sensitivity = false;
    }
    if let Some(mc) = request.monte_carlo.as_mut() {
        if let Some(seed) = args.seed {
            mc.seed = Some(seed);
        }
        if let Some(trials) = args.trials {
            mc.trials = trials;
        }
    } else if args.seed.is_some() || args.trials.is_some() {
        return Err("--seed/--trials given but the request has no monte_carlo section".into());
    }

    info!(
        metric = request.target_metric.as_str(),
        variables = request.variables.len(),
        scenarios = request.scenarios.len(),
        "running analysis"
    );
    let result = analyze_request(&request)?;
    Ok(serde_json::to_value(result)?)
}
