use napi::Result as NapiResult;
use napi_derive::napi;
use serde::Deserialize;

use deal_analytics_core::rate_solver::{self, SolverConfig};
use deal_analytics_core::types::DatedCashFlow;
use deal_analytics_core::AnalysisRequest;

/// Convert any Display error into a napi::Error.
fn to_napi_error(e: impl std::fmt::Display) -> napi::Error {
    napi::Error::from_reason(e.to_string())
}

// ---------------------------------------------------------------------------
// Analysis
// ---------------------------------------------------------------------------

#[napi]
pub fn analyze_deal(input_json: String) -> NapiResult<String> {
    let request: AnalysisRequest = serde_json::from_str(&input_json).map_err(to_napi_error)?;
    let output = deal_analytics_core::analyze_request(&request).map_err(to_napi_error)?;
    serde_json::to_string(&output).map_err(to_napi_error)
}

// ---------------------------------------------------------------------------
// Rates
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct IrrInput {
    cash_flows: Vec<f64>,
    #[serde(default)]
    solver: SolverConfig,
}

#[derive(Deserialize)]
struct XirrInput {
    flows: Vec<DatedCashFlow>,
    #[serde(default)]
    solver: SolverConfig,
}

#[napi]
pub fn solve_irr(input_json: String) -> NapiResult<String> {
    let input: IrrInput = serde_json::from_str(&input_json).map_err(to_napi_error)?;
    let output =
        rate_solver::solve_irr_with(&input.cash_flows, &input.solver).map_err(to_napi_error)?;
    serde_json::to_string(&output).map_err(to_napi_error)
}

#[napi]
pub fn solve_xirr(input_json: String) -> NapiResult<String> {
    let input: XirrInput = serde_json::from_str(&input_json).map_err(to_napi_error)?;
    let output = rate_solver::solve_xirr(&input.flows, &input.solver).map_err(to_napi_error)?;
    serde_json::to_string(&output).map_err(to_napi_error)
}
