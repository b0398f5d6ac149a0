use deal_analytics_core::analysis::break_even::Difficulty;
use deal_analytics_core::error::ErrorClass;
use deal_analytics_core::{analyze_request, AnalysisRequest, EngineError};
use pretty_assertions::assert_eq;

fn rental_request_json() -> &'static str {
    r#"{
        "base_assumptions": {
            "purchase_price": 1000000,
            "monthly_rent": 10000,
            "operating_expenses": 40000,
            "exit_cap_rate": 0.08
        },
        "variables": [
            {"name": "monthly_rent", "label": "Monthly Rent", "base_value": 10000,
             "min_value": 8000, "max_value": 12000,
             "distribution": {"kind": "normal", "mean": 10000, "std_dev": 500}},
            {"name": "exit_cap_rate", "label": "Exit Cap Rate", "base_value": 0.08,
             "min_value": 0.07, "max_value": 0.09,
             "distribution": {"kind": "triangular", "min": 0.07, "mode": 0.08, "max": 0.09}}
        ],
        "scenarios": [
            {"name": "Downside", "description": "Soft rents, wider cap",
             "overrides": {"monthly_rent": 9000, "exit_cap_rate": 0.09}},
            {"name": "Upside", "description": "Firm rents",
             "overrides": {"monthly_rent": 11000}}
        ],
        "target_metric": "irr",
        "monte_carlo": {"trials": 600, "seed": 42},
        "break_even_target": 0.09
    }"#
}

fn rental_request() -> AnalysisRequest {
    serde_json::from_str(rental_request_json()).unwrap()
}

#[test]
fn test_full_rental_request() {
    let out = analyze_request(&rental_request()).unwrap();
    let r = &out.result;

    assert!((r.base_case.metric_value - 0.08).abs() < 1e-6);

    let sensitivity = r.sensitivity.as_ref().unwrap();
    assert_eq!(sensitivity.len(), 2);
    assert!(sensitivity
        .windows(2)
        .all(|w| w[0].impact_percentage.unwrap().abs() >= w[1].impact_percentage.unwrap().abs()));

    let be = r.break_even.as_ref().unwrap();
    assert_eq!(be.target_metric, 0.09);
    let rent = be
        .variables
        .iter()
        .find(|v| v.variable_name == "monthly_rent")
        .unwrap();
    assert!(rent.achievable);
    assert_ne!(rent.difficulty, Difficulty::Impossible);
    assert_eq!(rent.variable_label, "Monthly Rent");

    let scenarios = r.scenarios.as_ref().unwrap();
    assert_eq!(scenarios.len(), 3);
    assert_eq!(scenarios[0].vs_base, Some(0.0));
    assert!(scenarios[1].metric_value.unwrap() < r.base_case.metric_value);
    assert!(scenarios[2].metric_value.unwrap() > r.base_case.metric_value);

    let mc = r.monte_carlo.as_ref().and_then(|m| m.completed()).unwrap();
    assert_eq!(mc.trials, 600);
    assert_eq!(mc.seed, 42);
    assert_eq!(mc.threshold, 0.09);
    assert!(mc.percentiles.p5 <= mc.percentiles.p95);
    assert!(mc.probability_positive > 0.99);

    assert_eq!(out.metadata.precision, "ieee754_f64");
    assert!(out.methodology.contains("rental_property"));
}

#[test]
fn test_seeded_request_is_reproducible() {
    let a = analyze_request(&rental_request()).unwrap();
    let b = analyze_request(&rental_request()).unwrap();
    assert_eq!(a.result, b.result);
}

#[test]
fn test_response_serializes_contract_fields() {
    let out = analyze_request(&rental_request()).unwrap();
    let json = serde_json::to_value(&out).unwrap();
    let result = &json["result"];
    assert_eq!(result["base_case"]["name"], "Base Case");
    assert!(result["sensitivity"][0]["impact_percentage"].is_number());
    assert!(result["break_even"]["variables"][0]["difficulty"].is_string());
    assert!(result["scenarios"][1]["vs_base_pct"].is_number());
    assert!(result["monte_carlo"]["percentiles"]["p50"].is_number());
}

#[test]
fn test_zero_timeout_returns_timeout_error() {
    let mut req = rental_request();
    req.options.timeout_ms = Some(0);
    let err = analyze_request(&req).unwrap_err();
    assert_eq!(err, EngineError::AnalysisTimeout { limit_ms: 0 });
    assert_eq!(err.class(), ErrorClass::Timeout);
}

#[test]
fn test_missing_assumption_is_validation_error() {
    let json = r#"{
        "base_assumptions": {"purchase_price": 1000000, "monthly_rent": 10000},
        "target_metric": "irr"
    }"#;
    let req: AnalysisRequest = serde_json::from_str(json).unwrap();
    match analyze_request(&req).unwrap_err() {
        EngineError::Validation { field, .. } => assert_eq!(field, "assumption:exit_cap_rate"),
        other => panic!("expected validation error, got {other:?}"),
    }
}

#[test]
fn test_non_finite_projection_names_assumptions() {
    let json = r#"{
        "base_assumptions": {"x": 1e10},
        "target_metric": "equity_multiple",
        "model": {
            "type": "schedule",
            "flows": [
                {"period": 0, "value": -100},
                {"period": 1, "value": {"variable": "x", "multiplier": 1e300}}
            ]
        }
    }"#;
    let req: AnalysisRequest = serde_json::from_str(json).unwrap();
    match analyze_request(&req).unwrap_err() {
        EngineError::Validation { reason, .. } => {
            assert!(reason.contains("x=10000000000"), "reason was {reason}")
        }
        other => panic!("expected validation error, got {other:?}"),
    }
}

#[test]
fn test_schedule_model_irr() {
    let json = r#"{
        "base_assumptions": {"proceeds": 110},
        "variables": [{"name": "proceeds", "base_value": 110, "min_value": 100, "max_value": 130}],
        "target_metric": "irr",
        "break_even_target": 0.2,
        "model": {
            "type": "schedule",
            "flows": [
                {"period": 0, "value": -100},
                {"period": 1, "value": {"variable": "proceeds"}}
            ]
        }
    }"#;
    let req: AnalysisRequest = serde_json::from_str(json).unwrap();
    let out = analyze_request(&req).unwrap();
    assert!((out.result.base_case.metric_value - 0.10).abs() < 1e-6);
    let be = &out.result.break_even.unwrap().variables[0];
    assert!((be.break_even_value.unwrap() - 120.0).abs() < 1e-4);
}

#[test]
fn test_npv_uses_request_discount_rate() {
    let json = r#"{
        "base_assumptions": {},
        "target_metric": "npv",
        "discount_rate": 0.1,
        "model": {"type": "schedule",
                  "flows": [{"period": 0, "value": -100}, {"period": 1, "value": 121}]}
    }"#;
    let req: AnalysisRequest = serde_json::from_str(json).unwrap();
    let out = analyze_request(&req).unwrap();
    assert!((out.result.base_case.metric_value - 10.0).abs() < 1e-9);
}

#[test]
fn test_probability_weighted_scenarios() {
    let mut req = rental_request();
    req.monte_carlo = None;
    req.scenarios[0].probability = Some(0.4);
    req.scenarios[1].probability = Some(0.6);
    let out = analyze_request(&req).unwrap();
    let scen = out.result.scenarios.as_ref().unwrap();
    let expected =
        0.4 * scen[1].metric_value.unwrap() + 0.6 * scen[2].metric_value.unwrap();
    let weighted = out.result.scenario_probability_weighted_value.unwrap();
    assert!((weighted - expected).abs() < 1e-12);
}

#[test]
fn test_unknown_override_rejected() {
    let mut req = rental_request();
    req.scenarios[0].overrides.insert("monthy_rent".into(), 1.0);
    let err = analyze_request(&req).unwrap_err();
    assert_eq!(err.class(), ErrorClass::Validation);
}

#[test]
fn test_distribution_outside_domain_warns() {
    let mut req = rental_request();
    req.monte_carlo = Some(deal_analytics_core::MonteCarloConfig {
        trials: 50,
        seed: Some(1),
        threshold: None,
    });
    // 3-sigma band runs to 7000, below the 8000 floor.
    req.variables[0].distribution = Some(deal_analytics_core::Distribution::Normal {
        mean: 10_000.0,
        std_dev: 1000.0,
    });
    let out = analyze_request(&req).unwrap();
    assert!(out.warnings.iter().any(|w| w.contains("outside its domain")));
}

#[test]
fn test_monte_carlo_trial_failure_keeps_other_sections() {
    let json = r#"{
        "base_assumptions": {"proceeds": 110},
        "variables": [{"name": "proceeds", "base_value": 110, "min_value": -50, "max_value": 200,
                       "distribution": {"kind": "uniform", "min": -50, "max": 200}}],
        "scenarios": [{"name": "Strong exit", "overrides": {"proceeds": 130}}],
        "target_metric": "irr",
        "monte_carlo": {"trials": 400, "seed": 8},
        "model": {
            "type": "schedule",
            "flows": [
                {"period": 0, "value": -100},
                {"period": 1, "value": {"variable": "proceeds"}}
            ]
        }
    }"#;
    let req: AnalysisRequest = serde_json::from_str(json).unwrap();
    let out = analyze_request(&req).unwrap();

    let scenarios = out.result.scenarios.as_ref().unwrap();
    assert_eq!(scenarios.len(), 2);
    assert!((scenarios[1].metric_value.unwrap() - 0.30).abs() < 1e-6);

    let mc = out.result.monte_carlo.as_ref().unwrap();
    assert!(mc.completed().is_none());
    let failure = mc.failed().unwrap();
    assert_eq!(failure.seed, 8);
    assert_eq!(failure.failure.class, ErrorClass::RateSolver);

    let json = serde_json::to_value(&out).unwrap();
    assert!(json["result"]["monte_carlo"]["percentiles"].is_null());
    assert_eq!(json["result"]["monte_carlo"]["failure"]["class"], "rate_solver");
}

#[test]
fn test_far_schedule_period_is_validation_error() {
    let json = r#"{
        "base_assumptions": {},
        "target_metric": "irr",
        "model": {"type": "schedule",
                  "flows": [{"period": 0, "value": -100}, {"period": 3000000000, "value": 200}]}
    }"#;
    let req: AnalysisRequest = serde_json::from_str(json).unwrap();
    let err = analyze_request(&req).unwrap_err();
    assert_eq!(err.class(), ErrorClass::Validation);
}

#[test]
fn test_oversized_rental_terms_are_validation_errors() {
    let mut req = rental_request();
    req.monte_carlo = None;
    req.model = serde_json::from_str(r#"{"type": "rental_property", "amortization_years": 4294967295}"#)
        .unwrap();
    let err = analyze_request(&req).unwrap_err();
    assert_eq!(err.class(), ErrorClass::Validation);
}
