use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use statrs::distribution::{Normal, Triangular, Uniform};
use tracing::{debug, warn};

use crate::deadline::Deadline;
use crate::error::EngineError;
use crate::types::{AssumptionSet, Distribution, MetricFailure, Variable};
use crate::EngineResult;

use super::{try_map_units, MetricFn};

pub use crate::types::{MonteCarloConfig, MAX_TRIALS};

/// Trials per independently seeded batch.
pub const BATCH_SIZE: u32 = 256;
const HISTOGRAM_BINS: usize = 20;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Percentile summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct McPercentiles {
    pub p5: f64,
    pub p25: f64,
    pub p50: f64,
    pub p75: f64,
    pub p95: f64,
}

/// A single histogram bin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistogramBin {
    pub lower: f64,
    pub upper: f64,
    pub count: u32,
    pub frequency: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonteCarloResult {
    pub trials: u32,
    pub seed: u64,
    pub mean: f64,
    pub median: f64,
    /// Population standard deviation.
    pub std_dev: f64,
    pub min: f64,
    pub max: f64,
    pub percentiles: McPercentiles,
    pub probability_positive: f64,
    pub threshold: f64,
    pub probability_above_threshold: f64,
    pub histogram: Vec<HistogramBin>,
}

/// Monte Carlo section of a response: the summary, or the trial that
/// stopped the run. No statistic is computed over an incomplete sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MonteCarloOutcome {
    Completed(MonteCarloResult),
    Failed(MonteCarloFailure),
}

impl MonteCarloOutcome {
    pub fn completed(&self) -> Option<&MonteCarloResult> {
        match self {
            MonteCarloOutcome::Completed(r) => Some(r),
            MonteCarloOutcome::Failed(_) => None,
        }
    }

    pub fn failed(&self) -> Option<&MonteCarloFailure> {
        match self {
            MonteCarloOutcome::Completed(_) => None,
            MonteCarloOutcome::Failed(f) => Some(f),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonteCarloFailure {
    pub trials: u32,
    pub seed: u64,
    /// Zero-based index of the lowest failing trial.
    pub failed_trial: u32,
    pub failure: MetricFailure,
}

/// A non-fatal trial error, kept with its position in the run.
struct TrialFailure {
    trial: u32,
    error: EngineError,
}

// ---------------------------------------------------------------------------
// Sampling
// ---------------------------------------------------------------------------

/// A distribution resolved once, before any trial runs.
#[derive(Debug, Clone)]
enum Sampler {
    Fixed(f64),
    Normal(Normal),
    Uniform(Uniform),
    Triangular(Triangular),
}

impl Sampler {
    fn build(field: &str, dist: &Distribution) -> EngineResult<Self> {
        if let Some(v) = dist.point_value() {
            return Ok(Sampler::Fixed(v));
        }
        let invalid = |e: statrs::StatsError| EngineError::validation(field, e.to_string());
        Ok(match dist {
            Distribution::Normal { mean, std_dev } => {
                Sampler::Normal(Normal::new(*mean, *std_dev).map_err(invalid)?)
            }
            Distribution::Uniform { min, max } => {
                Sampler::Uniform(Uniform::new(*min, *max).map_err(invalid)?)
            }
            Distribution::Triangular { min, mode, max } => {
                Sampler::Triangular(Triangular::new(*min, *max, *mode).map_err(invalid)?)
            }
        })
    }

    fn sample(&self, rng: &mut StdRng) -> f64 {
        match self {
            Sampler::Fixed(v) => *v,
            Sampler::Normal(d) => rng.sample(d),
            Sampler::Uniform(d) => rng.sample(d),
            Sampler::Triangular(d) => rng.sample(d),
        }
    }
}

// ---------------------------------------------------------------------------
// Simulation
// ---------------------------------------------------------------------------

/// Simulate the metric distribution. The threshold defaults to the base
/// metric.
pub fn simulate<F: MetricFn>(
    base: &AssumptionSet,
    variables: &[Variable],
    metric_fn: &F,
    config: &MonteCarloConfig,
) -> EngineResult<MonteCarloResult> {
    let threshold = match config.threshold {
        Some(t) => t,
        None => metric_fn(base)?,
    };
    simulate_with(
        base,
        variables,
        metric_fn,
        config,
        threshold,
        &Deadline::unbounded(),
    )
}

/// Like [`simulate`], with an explicit threshold and deadline. Any trial
/// error aborts the run and is returned.
pub fn simulate_with<F: MetricFn>(
    base: &AssumptionSet,
    variables: &[Variable],
    metric_fn: &F,
    config: &MonteCarloConfig,
    threshold: f64,
    deadline: &Deadline,
) -> EngineResult<MonteCarloResult> {
    let (seed, trials) = run_trials(base, variables, metric_fn, config, deadline)?;
    match trials {
        Ok(values) => Ok(summarize(&values, seed, threshold)),
        Err(f) => Err(f.error),
    }
}

/// Run the simulation, reporting a failed trial as a typed outcome.
/// Only fatal errors (an expired deadline) are returned as `Err`.
pub fn simulate_outcome<F: MetricFn>(
    base: &AssumptionSet,
    variables: &[Variable],
    metric_fn: &F,
    config: &MonteCarloConfig,
    threshold: f64,
    deadline: &Deadline,
) -> EngineResult<MonteCarloOutcome> {
    let (seed, trials) = run_trials(base, variables, metric_fn, config, deadline)?;
    Ok(match trials {
        Ok(values) => MonteCarloOutcome::Completed(summarize(&values, seed, threshold)),
        Err(f) => {
            warn!(trial = f.trial, seed, error = %f.error, "monte carlo trial failed");
            MonteCarloOutcome::Failed(MonteCarloFailure {
                trials: config.trials,
                seed,
                failed_trial: f.trial,
                failure: MetricFailure::from(&f.error),
            })
        }
    })
}

/// Draw and evaluate every trial. The inner `Err` is the lowest-index
/// non-fatal failure, whatever the thread scheduling.
fn run_trials<F: MetricFn>(
    base: &AssumptionSet,
    variables: &[Variable],
    metric_fn: &F,
    config: &MonteCarloConfig,
    deadline: &Deadline,
) -> EngineResult<(u64, Result<Vec<f64>, TrialFailure>)> {
    config.validate()?;

    let samplers = variables
        .iter()
        .enumerate()
        .filter_map(|(i, v)| v.distribution.as_ref().map(|d| (i, v, d)))
        .map(|(i, v, d)| {
            Sampler::build(&format!("variables[{i}].distribution"), d)
                .map(|s| (v.name.as_str(), s))
        })
        .collect::<EngineResult<Vec<_>>>()?;

    let seed = config.seed.unwrap_or_else(rand::random);
    let num_batches = config.trials.div_ceil(BATCH_SIZE);
    let mut master = StdRng::seed_from_u64(seed);
    let batch_seeds: Vec<u64> = (0..num_batches).map(|_| master.gen()).collect();

    debug!(
        trials = config.trials,
        batches = num_batches,
        sampled = samplers.len(),
        seed,
        "monte carlo simulation"
    );

    let batches = try_map_units(&batch_seeds, |i, batch_seed| {
        let start = i as u32 * BATCH_SIZE;
        let len = BATCH_SIZE.min(config.trials - start);
        let mut rng = StdRng::seed_from_u64(*batch_seed);
        let mut out = Vec::with_capacity(len as usize);
        for k in 0..len {
            deadline.check()?;
            let draws: Vec<(&str, f64)> = samplers
                .iter()
                .map(|(name, s)| (*name, s.sample(&mut rng)))
                .collect();
            match metric_fn(&base.with_values(draws)) {
                Ok(v) => out.push(v),
                Err(e) if e.is_fatal() => return Err(e),
                Err(error) => {
                    return Ok(Err(TrialFailure {
                        trial: start + k,
                        error,
                    }))
                }
            }
        }
        Ok(Ok(out))
    })?;

    let mut values = Vec::new();
    for batch in batches {
        match batch {
            Ok(batch) => values.extend(batch),
            Err(f) => return Ok((seed, Err(f))),
        }
    }
    Ok((seed, Ok(values)))
}

// ---------------------------------------------------------------------------
// Statistics helpers
// ---------------------------------------------------------------------------

/// Linear interpolation between order statistics of a **sorted**, non-empty
/// slice.
fn percentile_sorted(sorted: &[f64], p: f64) -> f64 {
    if sorted.len() == 1 {
        return sorted[0];
    }
    let rank = p / 100.0 * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    let (lo, hi) = (sorted[lower], sorted[upper]);
    if lower == upper {
        lo
    } else {
        lo + (hi - lo) * (rank - lower as f64)
    }
}

/// Equal-width bins over `[min, max]`; a single bin when every value is equal.
fn build_histogram(sorted: &[f64], num_bins: usize) -> Vec<HistogramBin> {
    let min_val = sorted[0];
    let max_val = sorted[sorted.len() - 1];
    let n = sorted.len() as f64;

    if max_val == min_val {
        return vec![HistogramBin {
            lower: min_val,
            upper: max_val,
            count: sorted.len() as u32,
            frequency: 1.0,
        }];
    }

    let bin_width = (max_val - min_val) / num_bins as f64;
    let mut bins: Vec<HistogramBin> = (0..num_bins)
        .map(|i| HistogramBin {
            lower: min_val + i as f64 * bin_width,
            upper: if i == num_bins - 1 {
                max_val
            } else {
                min_val + (i + 1) as f64 * bin_width
            },
            count: 0,
            frequency: 0.0,
        })
        .collect();

    for &val in sorted {
        let idx = (((val - min_val) / bin_width).floor() as usize).min(num_bins - 1);
        bins[idx].count += 1;
    }
    for bin in &mut bins {
        bin.frequency = bin.count as f64 / n;
    }
    bins
}

fn summarize(values: &[f64], seed: u64, threshold: f64) -> MonteCarloResult {
    // Welford: exact for constant samples.
    let (mut mean, mut m2) = (0.0_f64, 0.0_f64);
    for (k, &x) in values.iter().enumerate() {
        let delta = x - mean;
        mean += delta / (k + 1) as f64;
        m2 += delta * (x - mean);
    }
    let n = values.len() as f64;
    let std_dev = (m2 / n).sqrt();

    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    let median = if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    };

    let positive = values.iter().filter(|v| **v > 0.0).count();
    let above = values.iter().filter(|v| **v > threshold).count();

    MonteCarloResult {
        trials: values.len() as u32,
        seed,
        mean,
        median,
        std_dev,
        min: sorted[0],
        max: sorted[sorted.len() - 1],
        percentiles: McPercentiles {
            p5: percentile_sorted(&sorted, 5.0),
            p25: percentile_sorted(&sorted, 25.0),
            p50: percentile_sorted(&sorted, 50.0),
            p75: percentile_sorted(&sorted, 75.0),
            p95: percentile_sorted(&sorted, 95.0),
        },
        probability_positive: positive as f64 / n,
        threshold,
        probability_above_threshold: above as f64 / n,
        histogram: build_histogram(&sorted, HISTOGRAM_BINS),
    }
}
