//! Request-boundary checks. Everything here runs once, before any
//! computation, so the analyses can assume well-formed inputs.

use std::collections::BTreeSet;
use tracing::warn;

use crate::analysis::scenario::ScenarioDefinition;
use crate::error::EngineError;
use crate::types::{AssumptionSet, Variable};
use crate::EngineResult;

/// Probabilities may miss 1.0 by at most this much.
pub const PROBABILITY_SUM_TOLERANCE: f64 = 0.001;

pub fn validate_assumptions(base: &AssumptionSet) -> EngineResult<()> {
    for (name, value) in base.iter() {
        if !value.is_finite() {
            return Err(EngineError::validation(
                format!("base_assumptions.{name}"),
                format!("must be finite (got {value})"),
            ));
        }
    }
    Ok(())
}

/// Domain checks for every variable. Distribution support that strays
/// outside `[min_value, max_value]` is only a warning.
pub fn validate_variables(variables: &[Variable], warnings: &mut Vec<String>) -> EngineResult<()> {
    let mut seen = BTreeSet::new();
    for (i, var) in variables.iter().enumerate() {
        let field = format!("variables[{i}]");
        if var.name.trim().is_empty() {
            return Err(EngineError::validation(
                format!("{field}.name"),
                "Variable name must not be empty",
            ));
        }
        if !seen.insert(var.name.as_str()) {
            return Err(EngineError::validation(
                format!("{field}.name"),
                format!("Duplicate variable '{}'", var.name),
            ));
        }
        let values = [var.base_value, var.min_value, var.max_value];
        if values.iter().any(|v| !v.is_finite()) {
            return Err(EngineError::validation(
                field,
                "base_value, min_value and max_value must be finite",
            ));
        }
        if !(var.min_value <= var.base_value && var.base_value <= var.max_value) {
            return Err(EngineError::validation(
                field,
                format!(
                    "'{}' requires min_value <= base_value <= max_value (got {} <= {} <= {})",
                    var.name, var.min_value, var.base_value, var.max_value
                ),
            ));
        }
        if let Some(dist) = &var.distribution {
            dist.validate(&format!("{field}.distribution"))?;
            let (lo, hi) = dist.support();
            if lo < var.min_value || hi > var.max_value {
                let msg = format!(
                    "Distribution for '{}' covers [{lo}, {hi}], outside its domain [{}, {}]",
                    var.name, var.min_value, var.max_value
                );
                warn!("{msg}");
                warnings.push(msg);
            }
        }
    }
    Ok(())
}

/// Merge variable base values into the base assumptions. A variable the
/// base already defines must agree with it.
pub fn resolve_base(base: &AssumptionSet, variables: &[Variable]) -> EngineResult<AssumptionSet> {
    let mut resolved = base.clone();
    for var in variables {
        match base.get(&var.name) {
            Ok(existing) => {
                let tol = 1e-12 * existing.abs().max(1.0);
                if (existing - var.base_value).abs() > tol {
                    return Err(EngineError::validation(
                        format!("variables.{}", var.name),
                        format!(
                            "base_value {} conflicts with base_assumptions value {existing}",
                            var.base_value
                        ),
                    ));
                }
            }
            Err(_) => resolved = resolved.with_value(&var.name, var.base_value),
        }
    }
    Ok(resolved)
}

/// Override keys must exist in the base. Probabilities are all-or-none,
/// each in [0, 1], and sum to one.
pub fn validate_scenarios(
    base: &AssumptionSet,
    scenarios: &[ScenarioDefinition],
    warnings: &mut Vec<String>,
) -> EngineResult<()> {
    for (i, scenario) in scenarios.iter().enumerate() {
        for (key, value) in &scenario.overrides {
            if !base.contains(key) {
                return Err(EngineError::validation(
                    format!("scenarios[{i}].overrides.{key}"),
                    format!("'{}' overrides an unknown assumption", scenario.name),
                ));
            }
            if !value.is_finite() {
                return Err(EngineError::validation(
                    format!("scenarios[{i}].overrides.{key}"),
                    format!("must be finite (got {value})"),
                ));
            }
        }
        if let Some(p) = scenario.probability {
            if !(0.0..=1.0).contains(&p) {
                return Err(EngineError::validation(
                    format!("scenarios[{i}].probability"),
                    format!("must be in [0, 1] (got {p})"),
                ));
            }
        }
    }

    let weighted = scenarios.iter().filter(|s| s.probability.is_some()).count();
    if weighted == 0 {
        return Ok(());
    }
    if weighted != scenarios.len() {
        return Err(EngineError::validation(
            "scenarios",
            "Either every scenario or none must carry a probability",
        ));
    }
    let total: f64 = scenarios.iter().filter_map(|s| s.probability).sum();
    let miss = (total - 1.0).abs();
    if miss > PROBABILITY_SUM_TOLERANCE {
        return Err(EngineError::validation(
            "scenarios",
            format!("Scenario probabilities must sum to 1 (got {total})"),
        ));
    }
    if miss > 1e-9 {
        let msg = format!("Scenario probabilities sum to {total}, not exactly 1");
        warn!("{msg}");
        warnings.push(msg);
    }
    Ok(())
}
