pub mod rental;
pub mod schedule;

use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::rate_solver::{solve_irr_with, SolverConfig};
use crate::time_value::npv;
use crate::types::{AssumptionSet, CashFlowSeries, Rate};
use crate::EngineResult;

pub use rental::RentalPropertyModel;
pub use schedule::{ScheduleModel, ScheduledFlow, ValueSource};

/// Assumption key consulted for NPV when no fixed discount rate is given.
pub const DISCOUNT_RATE: &str = "discount_rate";

/// A parameterised cash-flow projection. Implementations must be pure:
/// identical assumptions always produce an identical series.
pub trait CashFlowModel: Send + Sync {
    fn name(&self) -> &str;

    /// Assumptions that must be present before `project` is called.
    fn required_variables(&self) -> Vec<String>;

    fn project(&self, assumptions: &AssumptionSet) -> EngineResult<CashFlowSeries>;
}

/// Scalar metric requested by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetMetric {
    Irr,
    Npv,
    CashOnCash,
    Dscr,
    EquityMultiple,
}

impl TargetMetric {
    pub fn as_str(&self) -> &'static str {
        match self {
            TargetMetric::Irr => "irr",
            TargetMetric::Npv => "npv",
            TargetMetric::CashOnCash => "cash_on_cash",
            TargetMetric::Dscr => "dscr",
            TargetMetric::EquityMultiple => "equity_multiple",
        }
    }
}

/// Where the NPV discount rate comes from.
#[derive(Debug, Clone, PartialEq)]
pub enum DiscountSource {
    Fixed(Rate),
    Assumption(String),
}

/// A fully specified metric: the target plus anything it needs.
#[derive(Debug, Clone, PartialEq)]
pub enum MetricSpec {
    Irr,
    Npv(DiscountSource),
    CashOnCash,
    Dscr,
    EquityMultiple,
}

impl MetricSpec {
    /// NPV falls back to the `discount_rate` assumption when no fixed rate
    /// is supplied.
    pub fn from_target(target: TargetMetric, discount_rate: Option<Rate>) -> Self {
        match target {
            TargetMetric::Irr => MetricSpec::Irr,
            TargetMetric::Npv => MetricSpec::Npv(match discount_rate {
                Some(r) => DiscountSource::Fixed(r),
                None => DiscountSource::Assumption(DISCOUNT_RATE.to_string()),
            }),
            TargetMetric::CashOnCash => MetricSpec::CashOnCash,
            TargetMetric::Dscr => MetricSpec::Dscr,
            TargetMetric::EquityMultiple => MetricSpec::EquityMultiple,
        }
    }

    pub fn target(&self) -> TargetMetric {
        match self {
            MetricSpec::Irr => TargetMetric::Irr,
            MetricSpec::Npv(_) => TargetMetric::Npv,
            MetricSpec::CashOnCash => TargetMetric::CashOnCash,
            MetricSpec::Dscr => TargetMetric::Dscr,
            MetricSpec::EquityMultiple => TargetMetric::EquityMultiple,
        }
    }

    pub fn compute(
        &self,
        series: &CashFlowSeries,
        assumptions: &AssumptionSet,
        solver: &SolverConfig,
    ) -> EngineResult<f64> {
        match self {
            MetricSpec::Irr => Ok(solve_irr_with(&series.amounts(), solver)?.rate),
            MetricSpec::Npv(source) => {
                let rate = match source {
                    DiscountSource::Fixed(r) => *r,
                    DiscountSource::Assumption(name) => assumptions.get(name)?,
                };
                npv(rate, &series.amounts())
            }
            MetricSpec::CashOnCash => {
                let equity = invested_equity(series)?;
                let first = series.first_operating_amount().ok_or_else(|| {
                    EngineError::validation("cash_on_cash", "Series has no operating period")
                })?;
                Ok(first / equity)
            }
            MetricSpec::Dscr => {
                let coverage = series.coverage.ok_or_else(|| {
                    EngineError::validation("dscr", "Model does not report NOI and debt service")
                })?;
                if coverage.debt_service <= 0.0 {
                    return Err(EngineError::validation(
                        "dscr",
                        "No debt service; DSCR is undefined",
                    ));
                }
                Ok(coverage.net_operating_income / coverage.debt_service)
            }
            MetricSpec::EquityMultiple => {
                let equity = invested_equity(series)?;
                Ok(series.inflows() / equity)
            }
        }
    }
}

fn invested_equity(series: &CashFlowSeries) -> EngineResult<f64> {
    let equity = series.initial_outlay();
    if equity <= 0.0 {
        return Err(EngineError::validation(
            "period:0",
            "Initial outlay must be negative to measure equity returns",
        ));
    }
    Ok(equity)
}

/// Output of one model evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    pub cash_flow_series: CashFlowSeries,
    pub metric_value: f64,
}

/// A model bound to a metric. `metric` is the pure evaluation primitive
/// every analysis is driven by.
#[derive(Debug, Clone)]
pub struct Evaluator<M> {
    model: M,
    metric: MetricSpec,
    solver: SolverConfig,
}

impl<M: CashFlowModel> Evaluator<M> {
    pub fn new(model: M, metric: MetricSpec) -> Self {
        Evaluator {
            model,
            metric,
            solver: SolverConfig::default(),
        }
    }

    pub fn with_solver(mut self, solver: SolverConfig) -> Self {
        self.solver = solver;
        self
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    pub fn metric_spec(&self) -> &MetricSpec {
        &self.metric
    }

    pub fn evaluate(&self, assumptions: &AssumptionSet) -> EngineResult<Evaluation> {
        for name in self.model.required_variables() {
            assumptions.get(&name)?;
        }
        if let MetricSpec::Npv(DiscountSource::Assumption(name)) = &self.metric {
            assumptions.get(name)?;
        }

        let series = self.model.project(assumptions)?;
        check_series(&series, assumptions)?;

        let metric_value = self.metric.compute(&series, assumptions, &self.solver)?;
        check_finite(metric_value, self.metric.target().as_str(), assumptions)?;

        Ok(Evaluation {
            cash_flow_series: series,
            metric_value,
        })
    }

    pub fn metric(&self, assumptions: &AssumptionSet) -> EngineResult<f64> {
        self.evaluate(assumptions).map(|e| e.metric_value)
    }
}

fn check_finite(value: f64, what: &str, assumptions: &AssumptionSet) -> EngineResult<()> {
    if value.is_finite() {
        return Ok(());
    }
    Err(EngineError::validation(
        "assumptions",
        format!(
            "non-finite {what} ({value}) produced by [{}]",
            assumptions.describe()
        ),
    ))
}

fn check_series(series: &CashFlowSeries, assumptions: &AssumptionSet) -> EngineResult<()> {
    series.check_periods()?;
    for flow in &series.flows {
        check_finite(
            flow.amount,
            &format!("cash flow at period {}", flow.period),
            assumptions,
        )?;
    }
    if let Some(tv) = series.terminal_value {
        check_finite(tv, "terminal value", assumptions)?;
    }
    if let Some(c) = series.coverage {
        check_finite(c.net_operating_income, "net operating income", assumptions)?;
        check_finite(c.debt_service, "debt service", assumptions)?;
    }
    Ok(())
}

/// Serializable choice of built-in model, as carried by a request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ModelSpec {
    RentalProperty(RentalPropertyModel),
    Schedule(ScheduleModel),
}

impl Default for ModelSpec {
    fn default() -> Self {
        ModelSpec::RentalProperty(RentalPropertyModel::default())
    }
}

impl CashFlowModel for ModelSpec {
    fn name(&self) -> &str {
        match self {
            ModelSpec::RentalProperty(m) => m.name(),
            ModelSpec::Schedule(m) => m.name(),
        }
    }

    fn required_variables(&self) -> Vec<String> {
        match self {
            ModelSpec::RentalProperty(m) => m.required_variables(),
            ModelSpec::Schedule(m) => m.required_variables(),
        }
    }

    fn project(&self, assumptions: &AssumptionSet) -> EngineResult<CashFlowSeries> {
        match self {
            ModelSpec::RentalProperty(m) => m.project(assumptions),
            ModelSpec::Schedule(m) => m.project(assumptions),
        }
    }
}
