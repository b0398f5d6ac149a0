use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{EngineError, ErrorClass};
use crate::EngineResult;

/// Monetary amounts.
pub type Money = f64;

/// Rates expressed as decimals (0.05 = 5%). Never as percentages.
pub type Rate = f64;

// ---------------------------------------------------------------------------
// Variables and distributions
// ---------------------------------------------------------------------------

/// Probability distribution attached to a variable for Monte Carlo sampling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Distribution {
    Normal { mean: f64, std_dev: f64 },
    Uniform { min: f64, max: f64 },
    Triangular { min: f64, mode: f64, max: f64 },
}

impl Distribution {
    /// The single value a zero-variance distribution always yields.
    pub fn point_value(&self) -> Option<f64> {
        match self {
            Distribution::Normal { mean, std_dev } if *std_dev == 0.0 => Some(*mean),
            Distribution::Uniform { min, max } if min == max => Some(*min),
            Distribution::Triangular { min, max, .. } if min == max => Some(*min),
            _ => None,
        }
    }

    /// Range the distribution effectively covers. For the normal this is
    /// the three-sigma band.
    pub fn support(&self) -> (f64, f64) {
        match self {
            Distribution::Normal { mean, std_dev } => {
                (mean - 3.0 * std_dev, mean + 3.0 * std_dev)
            }
            Distribution::Uniform { min, max } => (*min, *max),
            Distribution::Triangular { min, max, .. } => (*min, *max),
        }
    }

    pub fn validate(&self, field: &str) -> EngineResult<()> {
        let params: Vec<f64> = match self {
            Distribution::Normal { mean, std_dev } => vec![*mean, *std_dev],
            Distribution::Uniform { min, max } => vec![*min, *max],
            Distribution::Triangular { min, mode, max } => vec![*min, *mode, *max],
        };
        if params.iter().any(|p| !p.is_finite()) {
            return Err(EngineError::validation(
                field,
                "distribution parameters must be finite",
            ));
        }
        match self {
            Distribution::Normal { std_dev, .. } if *std_dev < 0.0 => Err(
                EngineError::validation(field, "normal std_dev must be >= 0"),
            ),
            Distribution::Uniform { min, max } if min > max => Err(EngineError::validation(
                field,
                "uniform min must be <= max",
            )),
            Distribution::Triangular { min, mode, max } if !(min <= mode && mode <= max) => {
                Err(EngineError::validation(
                    field,
                    "triangular parameters must satisfy min <= mode <= max",
                ))
            }
            _ => Ok(()),
        }
    }
}

/// An input the analyses are allowed to move.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variable {
    pub name: String,
    /// Display label; falls back to `name` when empty.
    #[serde(default)]
    pub label: String,
    pub base_value: f64,
    pub min_value: f64,
    pub max_value: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distribution: Option<Distribution>,
}

impl Variable {
    pub fn new(name: &str, base_value: f64, min_value: f64, max_value: f64) -> Self {
        Variable {
            name: name.to_string(),
            label: String::new(),
            base_value,
            min_value,
            max_value,
            distribution: None,
        }
    }

    pub fn with_label(mut self, label: &str) -> Self {
        self.label = label.to_string();
        self
    }

    pub fn with_distribution(mut self, distribution: Distribution) -> Self {
        self.distribution = Some(distribution);
        self
    }

    pub fn display_label(&self) -> &str {
        if self.label.is_empty() {
            &self.name
        } else {
            &self.label
        }
    }
}

// ---------------------------------------------------------------------------
// Assumptions
// ---------------------------------------------------------------------------

/// Fully resolved mapping of variable name to value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AssumptionSet {
    values: BTreeMap<String, f64>,
}

impl AssumptionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a value, failing closed when it is absent.
    pub fn get(&self, name: &str) -> EngineResult<f64> {
        self.values.get(name).copied().ok_or_else(|| {
            EngineError::validation(format!("assumption:{name}"), "missing assumption")
        })
    }

    /// Look up a value the caller has declared optional.
    pub fn get_or(&self, name: &str, default: f64) -> f64 {
        self.values.get(name).copied().unwrap_or(default)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn with_value(&self, name: &str, value: f64) -> AssumptionSet {
        let mut values = self.values.clone();
        values.insert(name.to_string(), value);
        AssumptionSet { values }
    }

    pub fn with_values<'a, I>(&self, values: I) -> AssumptionSet
    where
        I: IntoIterator<Item = (&'a str, f64)>,
    {
        let mut merged = self.values.clone();
        for (k, v) in values {
            merged.insert(k.to_string(), v);
        }
        AssumptionSet { values: merged }
    }

    pub fn with_overrides(&self, overrides: &BTreeMap<String, f64>) -> AssumptionSet {
        let mut values = self.values.clone();
        for (k, v) in overrides {
            values.insert(k.clone(), *v);
        }
        AssumptionSet { values }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.values.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// `name=value` pairs, used when reporting an offending combination.
    pub fn describe(&self) -> String {
        self.values
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl FromIterator<(String, f64)> for AssumptionSet {
    fn from_iter<I: IntoIterator<Item = (String, f64)>>(iter: I) -> Self {
        AssumptionSet {
            values: iter.into_iter().collect(),
        }
    }
}

impl<const N: usize> From<[(&str, f64); N]> for AssumptionSet {
    fn from(pairs: [(&str, f64); N]) -> Self {
        pairs.into_iter().map(|(k, v)| (k.to_string(), v)).collect()
    }
}

// ---------------------------------------------------------------------------
// Cash flows
// ---------------------------------------------------------------------------

/// A single periodic cash flow.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CashFlow {
    pub period: u32,
    pub amount: Money,
}

/// A cash flow on a calendar date.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DatedCashFlow {
    pub date: NaiveDate,
    pub amount: Money,
}

/// First-year operating figures used by coverage metrics.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coverage {
    pub net_operating_income: Money,
    pub debt_service: Money,
}

/// Largest period index a series may carry: 100 years of monthly periods.
/// Periodic metrics expand the series densely up to its last period.
pub const MAX_PERIOD: u32 = 1_200;

/// Ordered periodic cash flows with an optional terminal value attached to
/// the final period.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CashFlowSeries {
    pub flows: Vec<CashFlow>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub terminal_value: Option<Money>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coverage: Option<Coverage>,
}

impl CashFlowSeries {
    pub fn from_amounts(amounts: &[Money]) -> Self {
        CashFlowSeries {
            flows: amounts
                .iter()
                .enumerate()
                .map(|(t, a)| CashFlow {
                    period: t as u32,
                    amount: *a,
                })
                .collect(),
            terminal_value: None,
            coverage: None,
        }
    }

    /// Reject series whose periods run past [`MAX_PERIOD`].
    pub fn check_periods(&self) -> EngineResult<()> {
        match self.flows.iter().find(|f| f.period > MAX_PERIOD) {
            Some(f) => Err(EngineError::validation(
                "cash_flows.period",
                format!("Period {} exceeds the maximum of {MAX_PERIOD}", f.period),
            )),
            None => Ok(()),
        }
    }

    pub fn last_period(&self) -> u32 {
        self.flows.iter().map(|f| f.period).max().unwrap_or(0)
    }

    /// Dense per-period amounts (index = period), with flows in the same
    /// period summed and the terminal value folded into the final period.
    pub fn amounts(&self) -> Vec<Money> {
        if self.flows.is_empty() {
            return self.terminal_value.map(|tv| vec![tv]).unwrap_or_default();
        }
        let mut out = vec![0.0; self.last_period() as usize + 1];
        for f in &self.flows {
            out[f.period as usize] += f.amount;
        }
        if let (Some(tv), Some(last)) = (self.terminal_value, out.last_mut()) {
            *last += tv;
        }
        out
    }

    /// Equity invested: the negated period-0 amount.
    pub fn initial_outlay(&self) -> Money {
        -self
            .flows
            .iter()
            .filter(|f| f.period == 0)
            .map(|f| f.amount)
            .sum::<f64>()
    }

    /// Amount in the first period after the outlay, before any terminal value.
    pub fn first_operating_amount(&self) -> Option<Money> {
        self.flows
            .iter()
            .filter(|f| f.period > 0)
            .map(|f| f.period)
            .min()
            .map(|p| {
                self.flows
                    .iter()
                    .filter(|f| f.period == p)
                    .map(|f| f.amount)
                    .sum()
            })
    }

    /// Sum of everything received after period 0, terminal value included.
    pub fn inflows(&self) -> Money {
        self.flows
            .iter()
            .filter(|f| f.period > 0)
            .map(|f| f.amount)
            .sum::<f64>()
            + self.terminal_value.unwrap_or(0.0)
    }
}

// ---------------------------------------------------------------------------
// Simulation settings
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonteCarloConfig {
    #[serde(default = "default_trials")]
    pub trials: u32,
    /// Omit for an unpredictable seed; the seed used is reported back.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
    /// `probability_above_threshold` cut-off.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threshold: Option<f64>,
}

fn default_trials() -> u32 {
    10_000
}

/// Upper bound on `MonteCarloConfig::trials`.
pub const MAX_TRIALS: u32 = 1_000_000;

impl Default for MonteCarloConfig {
    fn default() -> Self {
        MonteCarloConfig {
            trials: default_trials(),
            seed: None,
            threshold: None,
        }
    }
}

impl MonteCarloConfig {
    pub fn validate(&self) -> EngineResult<()> {
        if self.trials == 0 {
            return Err(EngineError::validation(
                "monte_carlo.trials",
                "At least one trial is required",
            ));
        }
        if self.trials > MAX_TRIALS {
            return Err(EngineError::validation(
                "monte_carlo.trials",
                format!("At most {MAX_TRIALS} trials are supported (got {})", self.trials),
            ));
        }
        if let Some(t) = self.threshold {
            if !t.is_finite() {
                return Err(EngineError::validation(
                    "monte_carlo.threshold",
                    "Threshold must be finite",
                ));
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Per-unit failure records
// ---------------------------------------------------------------------------

/// A failure recorded against one variable or scenario instead of aborting
/// the surrounding analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricFailure {
    pub class: ErrorClass,
    pub message: String,
}

impl From<&EngineError> for MetricFailure {
    fn from(e: &EngineError) -> Self {
        MetricFailure {
            class: e.class(),
            message: e.to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Output envelope
// ---------------------------------------------------------------------------

/// Standard computation output envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComputationOutput<T: Serialize> {
    pub result: T,
    pub methodology: String,
    pub assumptions: serde_json::Value,
    pub warnings: Vec<String>,
    pub metadata: ComputationMetadata,
}

/// Metadata for every computation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComputationMetadata {
    pub version: String,
    pub computation_time_us: u64,
    pub precision: String,
}

/// Helper to wrap computation results with metadata
pub fn with_metadata<T: Serialize>(
    methodology: &str,
    assumptions: &impl Serialize,
    warnings: Vec<String>,
    elapsed_us: u64,
    result: T,
) -> ComputationOutput<T> {
    ComputationOutput {
        result,
        methodology: methodology.to_string(),
        assumptions: serde_json::to_value(assumptions).unwrap_or_default(),
        warnings,
        metadata: ComputationMetadata {
            version: env!("CARGO_PKG_VERSION").to_string(),
            computation_time_us: elapsed_us,
            precision: "ieee754_f64".to_string(),
        },
    }
}
