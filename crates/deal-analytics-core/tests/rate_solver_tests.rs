use chrono::NaiveDate;
use deal_analytics_core::rate_solver::{
    solve_irr, solve_irr_with, solve_xirr, SolverConfig, SolverMethod,
};
use deal_analytics_core::time_value::{npv, xnpv};
use deal_analytics_core::types::{CashFlowSeries, DatedCashFlow};
use deal_analytics_core::EngineError;

// ===========================================================================
// IRR
// ===========================================================================

#[test]
fn test_single_period_ten_percent() {
    let irr = solve_irr(&CashFlowSeries::from_amounts(&[-100.0, 110.0])).unwrap();
    assert!((irr.rate - 0.10).abs() < 1e-6, "got {}", irr.rate);
    assert!(!irr.non_unique);
}

#[test]
fn test_npv_at_irr_is_zero() {
    let cases: Vec<Vec<f64>> = vec![
        vec![-1000.0, 300.0, 400.0, 500.0],
        vec![-250_000.0, 18_000.0, 18_500.0, 19_000.0, 19_500.0, 320_000.0],
        vec![-50.0, 0.0, 0.0, 0.0, 120.0],
        vec![-1_000_000.0, 80_000.0, 80_000.0, 80_000.0, 1_080_000.0],
        vec![-100.0, 5.0, 5.0, 60.0],
        vec![100.0, -30.0, -30.0, -30.0, -30.0],
    ];
    for flows in &cases {
        let irr = solve_irr_with(flows, &SolverConfig::default()).unwrap();
        let scale = flows.iter().map(|f| f.abs()).fold(0.0, f64::max);
        let residual = npv(irr.rate, flows).unwrap();
        assert!(
            residual.abs() < 1e-6 * scale.max(1.0),
            "NPV at IRR {} for {:?} was {}",
            irr.rate,
            flows,
            residual
        );
    }
}

#[test]
fn test_loss_making_deal_has_negative_irr() {
    let irr = solve_irr_with(&[-100.0, 20.0, 20.0, 20.0], &SolverConfig::default()).unwrap();
    assert!(irr.rate < 0.0);
    assert!(npv(irr.rate, &[-100.0, 20.0, 20.0, 20.0]).unwrap().abs() < 1e-6);
}

#[test]
fn test_same_sign_flows() {
    let err = solve_irr_with(&[100.0, 50.0, 25.0], &SolverConfig::default()).unwrap_err();
    assert_eq!(err, EngineError::NoSignChange);
    let err = solve_irr_with(&[-100.0, -50.0], &SolverConfig::default()).unwrap_err();
    assert_eq!(err, EngineError::NoSignChange);
}

#[test]
fn test_two_roots_flagged() {
    // Roots at 10% and 20%.
    let irr = solve_irr_with(&[-100.0, 230.0, -132.0], &SolverConfig::default()).unwrap();
    assert!(irr.non_unique);
    assert!(
        (irr.rate - 0.10).abs() < 1e-6 || (irr.rate - 0.20).abs() < 1e-6,
        "got {}",
        irr.rate
    );
}

#[test]
fn test_bisection_fallback() {
    let config = SolverConfig {
        initial_guess: 9.0,
        ..Default::default()
    };
    let irr = solve_irr_with(&[-100.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 200.0], &config)
        .unwrap();
    assert_eq!(irr.method, SolverMethod::Bisection);
    assert!((irr.rate - (2.0_f64.powf(1.0 / 9.0) - 1.0)).abs() < 1e-6);
}

// ===========================================================================
// XIRR
// ===========================================================================

#[test]
fn test_xirr_leap_year() {
    let flows = [
        DatedCashFlow {
            date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            amount: -1000.0,
        },
        DatedCashFlow {
            date: NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
            amount: 1100.0,
        },
    ];
    let irr = solve_xirr(&flows, &SolverConfig::default()).unwrap();
    let expected = 1.1_f64.powf(365.0 / 366.0) - 1.0;
    assert!((irr.rate - expected).abs() < 1e-6, "got {}", irr.rate);
    assert!(xnpv(irr.rate, &flows).unwrap().abs() < 1e-6);
}
