use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

use crate::deadline::Deadline;
use crate::types::{AssumptionSet, MetricFailure};
use crate::validation::validate_scenarios;
use crate::EngineResult;

use super::{try_map_units, MetricFn};

pub const BASE_CASE_NAME: &str = "Base Case";

/// A named set of overrides merged onto the base assumptions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioDefinition {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub overrides: BTreeMap<String, f64>,
    /// Likelihood weight in [0, 1].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub probability: Option<f64>,
}

impl ScenarioDefinition {
    pub fn new(name: &str) -> Self {
        ScenarioDefinition {
            name: name.to_string(),
            description: String::new(),
            overrides: BTreeMap::new(),
            probability: None,
        }
    }

    pub fn with_override(mut self, name: &str, value: f64) -> Self {
        self.overrides.insert(name.to_string(), value);
        self
    }

    pub fn with_probability(mut self, probability: f64) -> Self {
        self.probability = Some(probability);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioResult {
    pub name: String,
    pub description: String,
    pub metric_value: Option<f64>,
    pub vs_base: Option<f64>,
    /// Percent of `|base_metric|`; zero when the base metric is zero.
    pub vs_base_pct: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub probability: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<MetricFailure>,
}

/// Evaluate every scenario against the base. The base case is always the
/// first entry.
pub fn compare<F: MetricFn>(
    base: &AssumptionSet,
    scenarios: &[ScenarioDefinition],
    metric_fn: &F,
) -> EngineResult<Vec<ScenarioResult>> {
    let base_metric = metric_fn(base)?;
    compare_with(base, base_metric, scenarios, metric_fn, &Deadline::unbounded())
}

pub fn compare_with<F: MetricFn>(
    base: &AssumptionSet,
    base_metric: f64,
    scenarios: &[ScenarioDefinition],
    metric_fn: &F,
    deadline: &Deadline,
) -> EngineResult<Vec<ScenarioResult>> {
    validate_scenarios(base, scenarios, &mut Vec::new())?;
    debug!(scenarios = scenarios.len(), base_metric, "scenario comparison");

    let evaluated = try_map_units(scenarios, |_, scenario| {
        deadline.check()?;
        let assumptions = base.with_overrides(&scenario.overrides);
        let mut row = ScenarioResult {
            name: scenario.name.clone(),
            description: scenario.description.clone(),
            metric_value: None,
            vs_base: None,
            vs_base_pct: None,
            probability: scenario.probability,
            failure: None,
        };
        match metric_fn(&assumptions) {
            Ok(value) => {
                let delta = value - base_metric;
                row.metric_value = Some(value);
                row.vs_base = Some(delta);
                row.vs_base_pct = Some(super::pct_of(delta, base_metric).unwrap_or(0.0));
            }
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                debug!(scenario = %scenario.name, error = %e, "scenario failed");
                row.failure = Some(MetricFailure::from(&e));
            }
        }
        Ok(row)
    })?;

    let mut results = Vec::with_capacity(evaluated.len() + 1);
    results.push(ScenarioResult {
        name: BASE_CASE_NAME.to_string(),
        description: "All assumptions at base values".to_string(),
        metric_value: Some(base_metric),
        vs_base: Some(0.0),
        vs_base_pct: Some(0.0),
        probability: None,
        failure: None,
    });
    results.extend(evaluated);
    Ok(results)
}

/// Probability-weighted metric across the scenarios after the base case.
/// `None` unless every scenario carries a probability and evaluated.
pub fn probability_weighted_value(results: &[ScenarioResult]) -> Option<f64> {
    let scenarios = results.get(1..)?;
    if scenarios.is_empty() {
        return None;
    }
    scenarios
        .iter()
        .map(|r| Some(r.probability? * r.metric_value?))
        .sum()
}
