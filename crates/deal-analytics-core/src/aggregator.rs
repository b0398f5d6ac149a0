use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{debug, info};

use crate::analysis::break_even::{self, BreakEvenAnalysis};
use crate::analysis::scenario::{self, ScenarioDefinition, ScenarioResult, BASE_CASE_NAME};
use crate::analysis::sensitivity::{self, SensitivityResult};
use crate::analysis::{join, MetricFn};
use crate::deadline::Deadline;
use crate::error::EngineError;
use crate::model::{CashFlowModel, Evaluator, MetricSpec, ModelSpec, TargetMetric};
use crate::rate_solver::SolverConfig;
use crate::types::{with_metadata, AssumptionSet, ComputationOutput, MonteCarloConfig, Rate, Variable};
use crate::validation::{resolve_base, validate_assumptions, validate_scenarios, validate_variables};
use crate::EngineResult;

#[cfg(feature = "monte_carlo")]
use crate::analysis::monte_carlo::{self, MonteCarloOutcome};

// ---------------------------------------------------------------------------
// Request
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisOptions {
    /// Wall-clock budget for the whole request.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
    /// Run the tornado analysis.
    #[serde(default = "default_true")]
    pub sensitivity: bool,
}

fn default_true() -> bool {
    true
}

impl Default for AnalysisOptions {
    fn default() -> Self {
        AnalysisOptions {
            timeout_ms: None,
            sensitivity: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisRequest {
    pub base_assumptions: AssumptionSet,
    #[serde(default)]
    pub variables: Vec<Variable>,
    #[serde(default)]
    pub scenarios: Vec<ScenarioDefinition>,
    pub target_metric: TargetMetric,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub monte_carlo: Option<MonteCarloConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub break_even_target: Option<f64>,
    #[serde(default)]
    pub model: ModelSpec,
    /// Fixed NPV discount rate. Without it NPV reads the `discount_rate`
    /// assumption.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discount_rate: Option<Rate>,
    #[serde(default)]
    pub solver: SolverConfig,
    #[serde(default)]
    pub options: AnalysisOptions,
}

impl AnalysisRequest {
    pub fn new(base_assumptions: AssumptionSet, target_metric: TargetMetric) -> Self {
        AnalysisRequest {
            base_assumptions,
            variables: Vec::new(),
            scenarios: Vec::new(),
            target_metric,
            monte_carlo: None,
            break_even_target: None,
            model: ModelSpec::default(),
            discount_rate: None,
            solver: SolverConfig::default(),
            options: AnalysisOptions::default(),
        }
    }

    /// The request's model bound to its metric.
    pub fn evaluator(&self) -> EngineResult<Evaluator<ModelSpec>> {
        if let Some(r) = self.discount_rate {
            if !r.is_finite() || r <= -1.0 {
                return Err(EngineError::validation(
                    "discount_rate",
                    format!("Must be finite and > -100% (got {r})"),
                ));
            }
        }
        self.solver.validate()?;
        let metric = MetricSpec::from_target(self.target_metric, self.discount_rate);
        Ok(Evaluator::new(self.model.clone(), metric).with_solver(self.solver))
    }
}

// ---------------------------------------------------------------------------
// Response
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaseCase {
    pub name: String,
    pub metric: TargetMetric,
    pub metric_value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResponse {
    pub base_case: BaseCase,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sensitivity: Option<Vec<SensitivityResult>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub break_even: Option<BreakEvenAnalysis>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scenarios: Option<Vec<ScenarioResult>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scenario_probability_weighted_value: Option<f64>,
    /// The summary, or the failed trial when a trial could not be evaluated.
    #[cfg(feature = "monte_carlo")]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub monte_carlo: Option<MonteCarloOutcome>,
}

// ---------------------------------------------------------------------------
// Entry points
// ---------------------------------------------------------------------------

/// Validate, evaluate the base case, then run every requested analysis.
pub fn analyze_request(request: &AnalysisRequest) -> EngineResult<ComputationOutput<AnalysisResponse>> {
    let evaluator = request.evaluator()?;
    let metric_fn = |a: &AssumptionSet| -> EngineResult<f64> { evaluator.metric(a) };
    let methodology = format!(
        "Deal analytics: {} model, {} metric",
        evaluator.model().name(),
        request.target_metric.as_str()
    );
    analyze_with_metric(request, &methodology, &metric_fn)
}

/// Same as [`analyze_request`] but driven by a caller-supplied metric. The
/// request's `model`, `discount_rate` and `solver` are not consulted.
pub fn analyze_with_metric<F: MetricFn>(
    request: &AnalysisRequest,
    methodology: &str,
    metric_fn: &F,
) -> EngineResult<ComputationOutput<AnalysisResponse>> {
    let start = Instant::now();
    let deadline = Deadline::from_millis(request.options.timeout_ms);
    let mut warnings: Vec<String> = Vec::new();

    // -- Validation ---------------------------------------------------------
    validate_assumptions(&request.base_assumptions)?;
    validate_variables(&request.variables, &mut warnings)?;
    let base = resolve_base(&request.base_assumptions, &request.variables)?;
    validate_scenarios(&base, &request.scenarios, &mut warnings)?;
    if let Some(t) = request.break_even_target {
        if !t.is_finite() {
            return Err(EngineError::validation(
                "break_even_target",
                "Target must be finite",
            ));
        }
    }
    if let Some(mc) = &request.monte_carlo {
        if cfg!(not(feature = "monte_carlo")) {
            return Err(EngineError::validation(
                "monte_carlo",
                "Monte Carlo support is not enabled in this build",
            ));
        }
        mc.validate()?;
    }

    // -- Base case ----------------------------------------------------------
    deadline.check()?;
    let base_metric = metric_fn(&base)?;
    debug!(base_metric, "base case evaluated");
    if base_metric == 0.0 {
        warnings.push(
            "Base metric is zero: sensitivity impacts are raw deltas and scenario \
             vs_base_pct is reported as 0"
                .to_string(),
        );
    }

    // -- Analyses -----------------------------------------------------------
    let run_sensitivity = || -> EngineResult<Option<Vec<SensitivityResult>>> {
        if !request.options.sensitivity || request.variables.is_empty() {
            return Ok(None);
        }
        sensitivity::analyze_with(&base, base_metric, &request.variables, metric_fn, &deadline)
            .map(Some)
    };
    let run_break_even = || -> EngineResult<Option<BreakEvenAnalysis>> {
        match request.break_even_target {
            Some(target) => break_even::analyze_with(
                &base,
                base_metric,
                &request.variables,
                target,
                metric_fn,
                &deadline,
            )
            .map(Some),
            None => Ok(None),
        }
    };
    let run_scenarios = || -> EngineResult<Option<Vec<ScenarioResult>>> {
        if request.scenarios.is_empty() {
            return Ok(None);
        }
        scenario::compare_with(&base, base_metric, &request.scenarios, metric_fn, &deadline)
            .map(Some)
    };

    #[cfg(feature = "monte_carlo")]
    let run_monte_carlo = || -> EngineResult<Option<MonteCarloOutcome>> {
        let Some(config) = &request.monte_carlo else {
            return Ok(None);
        };
        let threshold = config
            .threshold
            .or(request.break_even_target)
            .unwrap_or(base_metric);
        monte_carlo::simulate_outcome(
            &base,
            &request.variables,
            metric_fn,
            config,
            threshold,
            &deadline,
        )
        .map(Some)
    };
    #[cfg(not(feature = "monte_carlo"))]
    let run_monte_carlo = || -> EngineResult<Option<()>> { Ok(None) };

    let ((sensitivity, break_even), (scenarios, monte_carlo)) = join(
        || join(run_sensitivity, run_break_even),
        || join(run_scenarios, run_monte_carlo),
    );
    let sensitivity = sensitivity?;
    let break_even = break_even?;
    let scenarios = scenarios?;
    #[cfg_attr(not(feature = "monte_carlo"), allow(unused_variables))]
    let monte_carlo = monte_carlo?;

    // -- Per-unit failures surface as warnings ------------------------------
    for row in sensitivity.iter().flatten() {
        if let Some(f) = &row.failure {
            warnings.push(format!(
                "Sensitivity for '{}' failed: {}",
                row.variable_name, f.message
            ));
        }
    }
    for row in scenarios.iter().flatten() {
        if let Some(f) = &row.failure {
            warnings.push(format!("Scenario '{}' failed: {}", row.name, f.message));
        }
    }
    #[cfg(feature = "monte_carlo")]
    if let Some(f) = monte_carlo.as_ref().and_then(MonteCarloOutcome::failed) {
        warnings.push(format!(
            "Monte Carlo stopped at trial {} (seed {}): {}; no statistics reported",
            f.failed_trial, f.seed, f.failure.message
        ));
    }

    let scenario_probability_weighted_value = scenarios
        .as_deref()
        .and_then(scenario::probability_weighted_value);

    let response = AnalysisResponse {
        base_case: BaseCase {
            name: BASE_CASE_NAME.to_string(),
            metric: request.target_metric,
            metric_value: base_metric,
        },
        sensitivity,
        break_even,
        scenarios,
        scenario_probability_weighted_value,
        #[cfg(feature = "monte_carlo")]
        monte_carlo,
    };

    let elapsed = start.elapsed().as_micros() as u64;
    info!(
        metric = request.target_metric.as_str(),
        variables = request.variables.len(),
        scenarios = request.scenarios.len(),
        warnings = warnings.len(),
        elapsed_us = elapsed,
        "analysis complete"
    );

    Ok(with_metadata(methodology, request, warnings, elapsed, response))
}
