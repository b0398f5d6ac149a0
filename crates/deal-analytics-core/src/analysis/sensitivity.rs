use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use tracing::debug;

use crate::deadline::Deadline;
use crate::types::{AssumptionSet, MetricFailure, Variable};
use crate::EngineResult;

use super::{try_map_units, MetricFn};

/// One tornado bar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensitivityResult {
    pub variable_name: String,
    pub variable_label: String,
    pub base_value: f64,
    pub min_value: f64,
    pub max_value: f64,
    pub metric_at_min: Option<f64>,
    pub metric_at_max: Option<f64>,
    /// `(metric_at_max - metric_at_min) / |base_metric| * 100`, or the raw
    /// delta when `impact_is_absolute`.
    pub impact_percentage: Option<f64>,
    /// Base metric was zero, so `impact_percentage` holds the raw delta.
    pub impact_is_absolute: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<MetricFailure>,
}

/// One-way sensitivity of the metric to each variable, ranked by
/// descending absolute impact.
pub fn analyze<F: MetricFn>(
    base: &AssumptionSet,
    variables: &[Variable],
    metric_fn: &F,
) -> EngineResult<Vec<SensitivityResult>> {
    let base_metric = metric_fn(base)?;
    analyze_with(base, base_metric, variables, metric_fn, &Deadline::unbounded())
}

pub fn analyze_with<F: MetricFn>(
    base: &AssumptionSet,
    base_metric: f64,
    variables: &[Variable],
    metric_fn: &F,
    deadline: &Deadline,
) -> EngineResult<Vec<SensitivityResult>> {
    debug!(variables = variables.len(), base_metric, "tornado analysis");

    let mut rows = try_map_units(variables, |_, var| {
        deadline.check()?;
        perturb(base, base_metric, var, metric_fn)
    })?;

    // Stable: equal impacts keep input order; failed rows go last.
    rows.sort_by(|a, b| match (a.impact_percentage, b.impact_percentage) {
        (Some(x), Some(y)) => y.abs().total_cmp(&x.abs()),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    });
    Ok(rows)
}

fn perturb<F: MetricFn>(
    base: &AssumptionSet,
    base_metric: f64,
    var: &Variable,
    metric_fn: &F,
) -> EngineResult<SensitivityResult> {
    let at_min = metric_fn(&base.with_value(&var.name, var.min_value));
    let at_max = metric_fn(&base.with_value(&var.name, var.max_value));

    let mut row = SensitivityResult {
        variable_name: var.name.clone(),
        variable_label: var.display_label().to_string(),
        base_value: var.base_value,
        min_value: var.min_value,
        max_value: var.max_value,
        metric_at_min: None,
        metric_at_max: None,
        impact_percentage: None,
        impact_is_absolute: base_metric == 0.0,
        failure: None,
    };

    match (at_min, at_max) {
        (Ok(lo), Ok(hi)) => {
            let delta = hi - lo;
            row.metric_at_min = Some(lo);
            row.metric_at_max = Some(hi);
            row.impact_percentage = Some(if base_metric == 0.0 {
                delta
            } else {
                delta / base_metric.abs() * 100.0
            });
        }
        (Err(e), _) | (_, Err(e)) => {
            if e.is_fatal() {
                return Err(e);
            }
            debug!(variable = %var.name, error = %e, "sensitivity extreme failed");
            row.failure = Some(MetricFailure::from(&e));
        }
    }
    Ok(row)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{EngineError, ErrorClass};

    fn additive(a: &AssumptionSet) -> EngineResult<f64> {
        Ok(1.0 + a.get("rent_growth")? + a.get("exit_cap_rate")?)
    }

    fn vars() -> Vec<Variable> {
        vec![
            Variable::new("exit_cap_rate", 0.0, -0.045, 0.045).with_label("Exit Cap"),
            Variable::new("rent_growth", 0.0, -0.09, 0.09),
        ]
    }

    fn base() -> AssumptionSet {
        AssumptionSet::from([("rent_growth", 0.0), ("exit_cap_rate", 0.0)])
    }

    #[test]
    fn test_ranked_by_impact() {
        let rows = analyze(&base(), &vars(), &additive).unwrap();
        assert_eq!(rows[0].variable_name, "rent_growth");
        assert!((rows[0].impact_percentage.unwrap() - 18.0).abs() < 1e-9);
        assert_eq!(rows[1].variable_name, "exit_cap_rate");
        assert_eq!(rows[1].variable_label, "Exit Cap");
        assert!((rows[1].impact_percentage.unwrap() - 9.0).abs() < 1e-9);
        assert!(!rows[0].impact_is_absolute);
    }

    #[test]
    fn test_ties_keep_input_order() {
        let vars = vec![
            Variable::new("b", 0.0, -1.0, 1.0),
            Variable::new("a", 0.0, -1.0, 1.0),
        ];
        let base = AssumptionSet::from([("a", 0.0), ("b", 0.0)]);
        let metric = |a: &AssumptionSet| -> EngineResult<f64> { Ok(10.0 + a.get("a")? + a.get("b")?) };
        let rows = analyze(&base, &vars, &metric).unwrap();
        assert_eq!(rows[0].variable_name, "b");
        assert_eq!(rows[1].variable_name, "a");
    }

    #[test]
    fn test_zero_base_reports_raw_delta() {
        let metric = |a: &AssumptionSet| -> EngineResult<f64> { a.get("x") };
        let vars = vec![Variable::new("x", 0.0, -2.0, 3.0)];
        let rows = analyze(&AssumptionSet::from([("x", 0.0)]), &vars, &metric).unwrap();
        assert!(rows[0].impact_is_absolute);
        assert_eq!(rows[0].impact_percentage, Some(5.0));
    }

    #[test]
    fn test_failed_extreme_recorded_and_sorted_last() {
        let metric = |a: &AssumptionSet| -> EngineResult<f64> {
            if a.get("fragile")? > 0.5 {
                Err(EngineError::NoSignChange)
            } else {
                Ok(1.0 + a.get("fragile")? + a.get("steady")?)
            }
        };
        let vars = vec![
            Variable::new("fragile", 0.0, 0.0, 1.0),
            Variable::new("steady", 0.0, 0.0, 0.01),
        ];
        let base = AssumptionSet::from([("fragile", 0.0), ("steady", 0.0)]);
        let rows = analyze(&base, &vars, &metric).unwrap();
        assert_eq!(rows[0].variable_name, "steady");
        let failure = rows[1].failure.as_ref().unwrap();
        assert_eq!(failure.class, ErrorClass::RateSolver);
        assert_eq!(rows[1].impact_percentage, None);
    }

    #[test]
    fn test_sorted_descending_for_many_variables() {
        let weights = [0.3, -2.0, 0.0, 1.5, -0.7, 2.0, 0.01];
        let vars: Vec<Variable> = (0..weights.len())
            .map(|i| Variable::new(&format!("v{i}"), 0.0, -1.0, 1.0))
            .collect();
        let base: AssumptionSet = (0..weights.len()).map(|i| (format!("v{i}"), 0.0)).collect();
        let metric = move |a: &AssumptionSet| -> EngineResult<f64> {
            let mut total = 5.0;
            for (i, w) in weights.iter().enumerate() {
                total += w * a.get(&format!("v{i}"))?;
            }
            Ok(total)
        };
        let rows = analyze(&base, &vars, &metric).unwrap();
        let impacts: Vec<f64> = rows
            .iter()
            .map(|r| r.impact_percentage.unwrap().abs())
            .collect();
        assert!(impacts.windows(2).all(|w| w[0] >= w[1]), "{impacts:?}");
    }

    #[test]
    fn test_expired_deadline_aborts() {
        let d = Deadline::after(std::time::Duration::ZERO);
        let err = analyze_with(&base(), 1.0, &vars(), &additive, &d).unwrap_err();
        assert!(matches!(err, EngineError::AnalysisTimeout { .. }));
    }
}
