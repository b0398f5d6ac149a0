pub mod break_even;
pub mod scenario;
pub mod sensitivity;

#[cfg(feature = "monte_carlo")]
pub mod monte_carlo;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::types::AssumptionSet;
use crate::EngineResult;

/// The pure evaluation primitive every analysis is driven by.
pub trait MetricFn: Fn(&AssumptionSet) -> EngineResult<f64> + Sync {}

impl<F> MetricFn for F where F: Fn(&AssumptionSet) -> EngineResult<f64> + Sync {}

/// Map independent units of work, preserving input order. Stops at the
/// first error.
pub(crate) fn try_map_units<T, R, F>(items: &[T], f: F) -> EngineResult<Vec<R>>
where
    T: Sync,
    R: Send,
    F: Fn(usize, &T) -> EngineResult<R> + Sync + Send,
{
    #[cfg(feature = "parallel")]
    let results = items
        .par_iter()
        .enumerate()
        .map(|(i, item)| f(i, item))
        .collect();

    #[cfg(not(feature = "parallel"))]
    let results = items
        .iter()
        .enumerate()
        .map(|(i, item)| f(i, item))
        .collect();

    results
}

/// Run two closures, concurrently when the `parallel` feature is on.
pub(crate) fn join<A, B, RA, RB>(a: A, b: B) -> (RA, RB)
where
    A: FnOnce() -> RA + Send,
    B: FnOnce() -> RB + Send,
    RA: Send,
    RB: Send,
{
    #[cfg(feature = "parallel")]
    {
        rayon::join(a, b)
    }

    #[cfg(not(feature = "parallel"))]
    {
        (a(), b())
    }
}

/// `(value - base) / |base| * 100`, or `None` when the base is zero.
pub(crate) fn pct_of(delta: f64, base: f64) -> Option<f64> {
    if base == 0.0 {
        None
    } else {
        Some(delta / base.abs() * 100.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EngineError;

    #[test]
    fn test_try_map_preserves_order() {
        let items: Vec<u32> = (0..1000).collect();
        let out = try_map_units(&items, |i, x| Ok(i as u32 * 2 + x)).unwrap();
        assert!(out.iter().enumerate().all(|(i, v)| *v == i as u32 * 3));
    }

    #[test]
    fn test_try_map_propagates_error() {
        let items = vec![1, 2, 3];
        let out: EngineResult<Vec<i32>> = try_map_units(&items, |_, x| {
            if *x == 2 {
                Err(EngineError::NoSignChange)
            } else {
                Ok(*x)
            }
        });
        assert_eq!(out, Err(EngineError::NoSignChange));
    }

    #[test]
    fn test_pct_of_zero_base() {
        assert_eq!(pct_of(1.0, 0.0), None);
        assert_eq!(pct_of(-1.0, -4.0), Some(-25.0));
    }
}
