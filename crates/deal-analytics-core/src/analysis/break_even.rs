use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::deadline::Deadline;
use crate::error::EngineError;
use crate::types::{AssumptionSet, Variable};
use crate::EngineResult;

use super::{try_map_units, MetricFn};

/// Evenly spaced sample points across the variable domain, endpoints included.
const DOMAIN_SAMPLES: usize = 11;
const MAX_REFINE_ITERATIONS: u32 = 100;

/// How far the variable has to move, by `|change_required_pct|`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
    Easy,
    Moderate,
    Challenging,
    Difficult,
    Impossible,
}

impl Difficulty {
    /// `<10` easy, `[10, 25)` moderate, `[25, 50]` challenging, `>50` difficult.
    pub fn classify(change_required_pct: f64) -> Self {
        let pct = change_required_pct.abs();
        if pct < 10.0 {
            Difficulty::Easy
        } else if pct < 25.0 {
            Difficulty::Moderate
        } else if pct <= 50.0 {
            Difficulty::Challenging
        } else {
            Difficulty::Difficult
        }
    }
}

/// Why no break-even value was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakEvenShortfall {
    /// The target lies outside the metric's range over the domain.
    Unreachable,
    /// The metric turns within the domain, so the solution is ambiguous.
    NonMonotonic,
    /// The metric jumps across the target, so no value attains it.
    Discontinuous,
    /// The metric could not be evaluated somewhere in the domain.
    EvaluationFailed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BreakEvenResult {
    pub variable_name: String,
    pub variable_label: String,
    pub base_value: f64,
    pub break_even_value: Option<f64>,
    pub metric_at_break_even: Option<f64>,
    pub change_required: Option<f64>,
    pub change_required_pct: Option<f64>,
    pub achievable: bool,
    pub difficulty: Difficulty,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<BreakEvenShortfall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// Break-even values for every variable against one target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BreakEvenAnalysis {
    pub target_metric: f64,
    pub base_metric: f64,
    pub variables: Vec<BreakEvenResult>,
}

pub fn analyze<F: MetricFn>(
    base: &AssumptionSet,
    variables: &[Variable],
    target: f64,
    metric_fn: &F,
) -> EngineResult<BreakEvenAnalysis> {
    let base_metric = metric_fn(base)?;
    analyze_with(
        base,
        base_metric,
        variables,
        target,
        metric_fn,
        &Deadline::unbounded(),
    )
}

pub fn analyze_with<F: MetricFn>(
    base: &AssumptionSet,
    base_metric: f64,
    variables: &[Variable],
    target: f64,
    metric_fn: &F,
    deadline: &Deadline,
) -> EngineResult<BreakEvenAnalysis> {
    debug!(variables = variables.len(), target, "break-even analysis");
    let results = try_map_units(variables, |_, var| {
        solve_with(base, base_metric, var, target, metric_fn, deadline)
    })?;
    Ok(BreakEvenAnalysis {
        target_metric: target,
        base_metric,
        variables: results,
    })
}

/// Value of `variable` at which the metric reaches `target`, everything
/// else held at base.
pub fn solve<F: MetricFn>(
    base: &AssumptionSet,
    variable: &Variable,
    target: f64,
    metric_fn: &F,
) -> EngineResult<BreakEvenResult> {
    let base_metric = metric_fn(base)?;
    solve_with(
        base,
        base_metric,
        variable,
        target,
        metric_fn,
        &Deadline::unbounded(),
    )
}

/// Result of evaluating the metric at one point of the domain.
enum Evaluation {
    Value(f64),
    Failed(EngineError),
}

fn evaluate_at<F: MetricFn>(
    base: &AssumptionSet,
    var: &Variable,
    x: f64,
    metric_fn: &F,
    deadline: &Deadline,
) -> EngineResult<Evaluation> {
    deadline.check()?;
    match metric_fn(&base.with_value(&var.name, x)) {
        Ok(y) => Ok(Evaluation::Value(y)),
        Err(e) if e.is_fatal() => Err(e),
        Err(e) => Ok(Evaluation::Failed(e)),
    }
}

pub fn solve_with<F: MetricFn>(
    base: &AssumptionSet,
    base_metric: f64,
    var: &Variable,
    target: f64,
    metric_fn: &F,
    deadline: &Deadline,
) -> EngineResult<BreakEvenResult> {
    deadline.check()?;
    let tol = 1e-9 * target.abs().max(1.0);

    if (base_metric - target).abs() <= tol {
        return Ok(found(var, var.base_value, base_metric));
    }

    // Sample the domain, the base value included, in ascending order.
    let (lo, hi) = (var.min_value, var.max_value);
    let mut xs: Vec<f64> = (0..DOMAIN_SAMPLES)
        .map(|i| {
            if i == DOMAIN_SAMPLES - 1 {
                hi
            } else {
                lo + (hi - lo) * i as f64 / (DOMAIN_SAMPLES - 1) as f64
            }
        })
        .collect();
    xs.push(var.base_value);
    xs.sort_by(|a, b| a.total_cmp(b));
    xs.dedup();

    let mut ys = Vec::with_capacity(xs.len());
    for &x in &xs {
        let y = if x == var.base_value {
            base_metric
        } else {
            match evaluate_at(base, var, x, metric_fn, deadline)? {
                Evaluation::Value(y) => y,
                Evaluation::Failed(e) => return Ok(failed(var, &e, x)),
            }
        };
        ys.push(y);
    }

    if !is_monotonic(&ys) {
        return Ok(shortfall(
            var,
            BreakEvenShortfall::NonMonotonic,
            format!(
                "metric is non-monotonic in {} over [{lo}, {hi}]",
                var.display_label()
            ),
        ));
    }

    // First adjacent pair that straddles the target.
    let mut bracket = None;
    for i in 0..xs.len() {
        let fi = ys[i] - target;
        if fi.abs() <= tol {
            return Ok(found(var, xs[i], ys[i]));
        }
        if i + 1 < xs.len() && fi * (ys[i + 1] - target) < 0.0 {
            bracket = Some(i);
            break;
        }
    }
    let Some(i) = bracket else {
        let (y_min, y_max) = ys
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(a, b), y| {
                (a.min(*y), b.max(*y))
            });
        return Ok(shortfall(
            var,
            BreakEvenShortfall::Unreachable,
            format!(
                "target {target} is outside the attainable range [{y_min}, {y_max}] \
                 as {} moves over [{lo}, {hi}]",
                var.display_label()
            ),
        ));
    };

    // Illinois-safeguarded secant inside the bracket.
    let (mut a, mut fa) = (xs[i], ys[i] - target);
    let (mut b, mut fb) = (xs[i + 1], ys[i + 1] - target);
    for _ in 0..MAX_REFINE_ITERATIONS {
        let (left, right) = (a.min(b), a.max(b));
        let mut x = b - fb * (b - a) / (fb - fa);
        if !x.is_finite() || x <= left || x >= right {
            x = 0.5 * (a + b);
        }
        let y = match evaluate_at(base, var, x, metric_fn, deadline)? {
            Evaluation::Value(y) => y,
            Evaluation::Failed(e) => return Ok(failed(var, &e, x)),
        };
        let fx = y - target;
        if fx.abs() <= tol {
            return Ok(found(var, x, y));
        }
        if (right - left) <= f64::EPSILON * right.abs().max(left.abs()).max(1.0) {
            return Ok(shortfall(
                var,
                BreakEvenShortfall::Discontinuous,
                format!(
                    "metric jumps across target {target} near {} = {x} (reaches {y})",
                    var.display_label()
                ),
            ));
        }
        if fx * fb < 0.0 {
            a = b;
            fa = fb;
        } else {
            fa *= 0.5;
        }
        b = x;
        fb = fx;
    }

    Ok(shortfall(
        var,
        BreakEvenShortfall::EvaluationFailed,
        format!("no convergence within {MAX_REFINE_ITERATIONS} iterations"),
    ))
}

/// Successive differences never change sign beyond numerical noise.
fn is_monotonic(ys: &[f64]) -> bool {
    let scale = ys.iter().fold(1.0_f64, |m, y| m.max(y.abs()));
    let noise = 1e-12 * scale;
    let mut rising = false;
    let mut falling = false;
    for w in ys.windows(2) {
        let d = w[1] - w[0];
        if d > noise {
            rising = true;
        } else if d < -noise {
            falling = true;
        }
    }
    !(rising && falling)
}

fn found(var: &Variable, x: f64, metric: f64) -> BreakEvenResult {
    let change = x - var.base_value;
    let (pct, note) = if var.base_value != 0.0 {
        (change / var.base_value.abs() * 100.0, None)
    } else {
        let width = var.max_value - var.min_value;
        let pct = if width > 0.0 {
            change / width * 100.0
        } else {
            0.0
        };
        (
            pct,
            Some("base value is zero; change_required_pct is relative to the domain width".into()),
        )
    };
    BreakEvenResult {
        variable_name: var.name.clone(),
        variable_label: var.display_label().to_string(),
        base_value: var.base_value,
        break_even_value: Some(x),
        metric_at_break_even: Some(metric),
        change_required: Some(change),
        change_required_pct: Some(pct),
        achievable: true,
        difficulty: Difficulty::classify(pct),
        reason: None,
        note,
    }
}

fn shortfall(var: &Variable, reason: BreakEvenShortfall, note: String) -> BreakEvenResult {
    debug!(variable = %var.name, ?reason, "break-even not achievable");
    BreakEvenResult {
        variable_name: var.name.clone(),
        variable_label: var.display_label().to_string(),
        base_value: var.base_value,
        break_even_value: None,
        metric_at_break_even: None,
        change_required: None,
        change_required_pct: None,
        achievable: false,
        difficulty: Difficulty::Impossible,
        reason: Some(reason),
        note: Some(note),
    }
}

fn failed(var: &Variable, e: &EngineError, x: f64) -> BreakEvenResult {
    shortfall(
        var,
        BreakEvenShortfall::EvaluationFailed,
        format!("metric failed at {}={x}: {e}", var.name),
    )
}
