use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::EngineError;
use crate::time_value::{npv, npv_derivative, xnpv, xnpv_derivative};
use crate::types::{CashFlowSeries, DatedCashFlow, Money, Rate};
use crate::EngineResult;

const MIN_BRACKET_HALF_WIDTH: f64 = 1e-12;
const GRID_FIRST_STEP: f64 = 0.01;

/// Root-finding parameters for IRR / XIRR.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SolverConfig {
    #[serde(default = "default_initial_guess")]
    pub initial_guess: Rate,
    /// Convergence threshold on |NPV|.
    #[serde(default = "default_tolerance")]
    pub tolerance: f64,
    /// Iteration budget, applied separately to each method.
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,
    #[serde(default = "default_lower_bound")]
    pub lower_bound: Rate,
    #[serde(default = "default_upper_bound")]
    pub upper_bound: Rate,
}

fn default_initial_guess() -> Rate {
    0.1
}

fn default_tolerance() -> f64 {
    1e-6
}

fn default_max_iterations() -> u32 {
    100
}

fn default_lower_bound() -> Rate {
    -0.99
}

fn default_upper_bound() -> Rate {
    10.0
}

impl Default for SolverConfig {
    fn default() -> Self {
        SolverConfig {
            initial_guess: default_initial_guess(),
            tolerance: default_tolerance(),
            max_iterations: default_max_iterations(),
            lower_bound: default_lower_bound(),
            upper_bound: default_upper_bound(),
        }
    }
}

impl SolverConfig {
    pub fn validate(&self) -> EngineResult<()> {
        if !(self.lower_bound > -1.0 && self.lower_bound < self.upper_bound) {
            return Err(EngineError::validation(
                "solver.bounds",
                "Bounds must satisfy -1 < lower_bound < upper_bound",
            ));
        }
        if !self.upper_bound.is_finite() {
            return Err(EngineError::validation(
                "solver.upper_bound",
                "Upper bound must be finite",
            ));
        }
        if !(self.tolerance > 0.0 && self.tolerance.is_finite()) {
            return Err(EngineError::validation(
                "solver.tolerance",
                "Tolerance must be positive",
            ));
        }
        if self.max_iterations == 0 {
            return Err(EngineError::validation(
                "solver.max_iterations",
                "Must be at least 1",
            ));
        }
        if !(self.initial_guess > self.lower_bound && self.initial_guess < self.upper_bound) {
            return Err(EngineError::validation(
                "solver.initial_guess",
                "Initial guess must lie strictly inside the bounds",
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SolverMethod {
    NewtonRaphson,
    Bisection,
}

/// A located rate of return.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IrrSolution {
    pub rate: Rate,
    pub iterations: u32,
    pub method: SolverMethod,
    /// More than one NPV sign change was seen across the rate grid, so
    /// `rate` is the first root found and may not be the only one.
    pub non_unique: bool,
}

/// IRR of a periodic series using the default solver settings.
pub fn solve_irr(series: &CashFlowSeries) -> EngineResult<IrrSolution> {
    series.check_periods()?;
    solve_irr_with(&series.amounts(), &SolverConfig::default())
}

/// Internal Rate of Return: Newton-Raphson with a bracketed bisection fallback.
pub fn solve_irr_with(cash_flows: &[Money], config: &SolverConfig) -> EngineResult<IrrSolution> {
    if cash_flows.len() < 2 {
        return Err(EngineError::validation(
            "cash_flows",
            "IRR requires at least 2 cash flows",
        ));
    }
    solve_rate(
        "IRR",
        cash_flows,
        |r| npv(r, cash_flows),
        |r| npv_derivative(r, cash_flows),
        config,
    )
}

/// Extended IRR for irregular dates (Actual/365).
pub fn solve_xirr(flows: &[DatedCashFlow], config: &SolverConfig) -> EngineResult<IrrSolution> {
    if flows.len() < 2 {
        return Err(EngineError::validation(
            "cash_flows",
            "XIRR requires at least 2 cash flows",
        ));
    }
    let mut ordered = flows.to_vec();
    ordered.sort_by_key(|f| f.date);
    let amounts: Vec<f64> = ordered.iter().map(|f| f.amount).collect();
    solve_rate(
        "XIRR",
        &amounts,
        |r| xnpv(r, flows),
        |r| xnpv_derivative(r, flows),
        config,
    )
}

/// Number of sign changes in the ordered amounts, zeros ignored.
fn sign_changes(amounts: &[f64]) -> usize {
    let signs: Vec<bool> = amounts
        .iter()
        .filter(|a| **a != 0.0)
        .map(|a| *a > 0.0)
        .collect();
    signs.windows(2).filter(|w| w[0] != w[1]).count()
}

/// Rates sampled when bracketing: `±0.01 * 2^k` inside the bounds, plus the
/// bounds and zero.
fn scan_grid(lower: Rate, upper: Rate) -> Vec<Rate> {
    let mut points = vec![lower, 0.0, upper];
    let mut step = GRID_FIRST_STEP;
    while step < upper.max(-lower) {
        points.push(step);
        points.push(-step);
        step *= 2.0;
    }
    points.retain(|r| *r >= lower && *r <= upper);
    points.sort_by(|a, b| a.total_cmp(b));
    points.dedup();
    points
}

fn solve_rate<F, D>(
    function: &str,
    amounts: &[f64],
    f: F,
    df: D,
    config: &SolverConfig,
) -> EngineResult<IrrSolution>
where
    F: Fn(Rate) -> EngineResult<f64>,
    D: Fn(Rate) -> EngineResult<f64>,
{
    config.validate()?;
    if amounts.iter().any(|a| !a.is_finite()) {
        return Err(EngineError::validation(
            "cash_flows",
            "Cash flows must be finite",
        ));
    }

    let changes = sign_changes(amounts);
    if changes == 0 {
        return Err(EngineError::NoSignChange);
    }

    let grid = scan_grid(config.lower_bound, config.upper_bound);
    let grid_values: Vec<f64> = grid
        .iter()
        .map(|r| f(*r).unwrap_or(f64::NAN))
        .collect();
    // Descartes: a single sign change in the flows admits at most one root.
    let non_unique = changes > 1 && grid_sign_changes(&grid_values) > 1;

    // --- Newton-Raphson ---
    let mut rate = config.initial_guess;
    let mut last_delta = f64::NAN;
    for i in 0..config.max_iterations {
        let value = f(rate)?;
        last_delta = value;
        if value.abs() < config.tolerance {
            return Ok(IrrSolution {
                rate,
                iterations: i,
                method: SolverMethod::NewtonRaphson,
                non_unique,
            });
        }
        let slope = df(rate)?;
        if slope == 0.0 || !slope.is_finite() {
            debug!(function, iteration = i, "zero derivative, falling back to bisection");
            break;
        }
        rate -= value / slope;
        if !(rate > config.lower_bound && rate < config.upper_bound) {
            debug!(function, iteration = i, rate, "newton left the rate bounds, falling back to bisection");
            break;
        }
    }

    // --- Bisection over the first bracketing pair on the grid ---
    let bracket = grid
        .iter()
        .zip(grid_values.iter())
        .collect::<Vec<_>>()
        .windows(2)
        .find_map(|w| {
            let ((a, fa), (b, fb)) = (w[0], w[1]);
            if !fa.is_finite() || !fb.is_finite() {
                return None;
            }
            if *fa == 0.0 {
                return Some((*a, *a, *fa));
            }
            if fa.signum() != fb.signum() {
                return Some((*a, *b, *fa));
            }
            None
        });

    let Some((mut lo, mut hi, mut f_lo)) = bracket else {
        return Err(EngineError::NonConvergent {
            function: function.to_string(),
            iterations: config.max_iterations,
            last_delta,
        });
    };
    if lo == hi {
        return Ok(IrrSolution {
            rate: lo,
            iterations: 0,
            method: SolverMethod::Bisection,
            non_unique,
        });
    }

    for i in 0..config.max_iterations {
        let mid = lo + (hi - lo) / 2.0;
        let f_mid = f(mid)?;
        last_delta = f_mid;
        if f_mid.abs() < config.tolerance || (hi - lo) / 2.0 < MIN_BRACKET_HALF_WIDTH {
            return Ok(IrrSolution {
                rate: mid,
                iterations: i + 1,
                method: SolverMethod::Bisection,
                non_unique,
            });
        }
        if f_mid.signum() == f_lo.signum() {
            lo = mid;
            f_lo = f_mid;
        } else {
            hi = mid;
        }
    }

    Err(EngineError::NonConvergent {
        function: function.to_string(),
        iterations: config.max_iterations,
        last_delta,
    })
}

fn grid_sign_changes(values: &[f64]) -> usize {
    let finite: Vec<f64> = values
        .iter()
        .copied()
        .filter(|v| v.is_finite() && *v != 0.0)
        .collect();
    finite
        .windows(2)
        .filter(|w| w[0].signum() != w[1].signum())
        .count()
}
