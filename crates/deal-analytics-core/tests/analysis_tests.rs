use deal_analytics_core::analysis::break_even::{self, BreakEvenShortfall, Difficulty};
use deal_analytics_core::analysis::scenario::{self, ScenarioDefinition, BASE_CASE_NAME};
use deal_analytics_core::analysis::sensitivity;
use deal_analytics_core::model::rental::{EXIT_CAP_RATE, MONTHLY_RENT, OPERATING_EXPENSES, PURCHASE_PRICE};
use deal_analytics_core::model::{Evaluator, MetricSpec, RentalPropertyModel};
use deal_analytics_core::types::{AssumptionSet, Variable};
use deal_analytics_core::EngineResult;

fn one_percent_rule(a: &AssumptionSet) -> EngineResult<f64> {
    Ok(a.get("rent")? / a.get("price")? * 100.0)
}

fn deal() -> AssumptionSet {
    AssumptionSet::from([
        (PURCHASE_PRICE, 1_000_000.0),
        (MONTHLY_RENT, 10_000.0),
        (OPERATING_EXPENSES, 40_000.0),
        (EXIT_CAP_RATE, 0.08),
    ])
}

// ===========================================================================
// Scenarios
// ===========================================================================

#[test]
fn test_one_percent_rule_soft_rent_scenario() {
    let base = AssumptionSet::from([("price", 150_000.0), ("rent", 2450.0)]);
    let scenarios = vec![ScenarioDefinition::new("Soft rents").with_override("rent", 2205.0)];
    let results = scenario::compare(&base, &scenarios, &one_percent_rule).unwrap();

    let base_case = &results[0];
    assert_eq!(base_case.name, BASE_CASE_NAME);
    assert_eq!(base_case.vs_base, Some(0.0));
    assert_eq!(base_case.vs_base_pct, Some(0.0));
    assert!(
        (base_case.metric_value.unwrap() - 1.633).abs() < 1e-3,
        "Expected ~1.633%, got {:?}",
        base_case.metric_value
    );

    let soft = &results[1];
    assert!((soft.metric_value.unwrap() - 1.47).abs() < 1e-9);
    assert!(
        (soft.vs_base_pct.unwrap() - (-10.0)).abs() < 1e-6,
        "Expected ~-10%, got {:?}",
        soft.vs_base_pct
    );
}

#[test]
fn test_rental_exit_cap_scenarios_rank_sensibly() {
    let ev = Evaluator::new(RentalPropertyModel::default(), MetricSpec::Irr);
    let metric = |a: &AssumptionSet| ev.metric(a);
    let scenarios = vec![
        ScenarioDefinition::new("Compression").with_override(EXIT_CAP_RATE, 0.07),
        ScenarioDefinition::new("Expansion").with_override(EXIT_CAP_RATE, 0.09),
    ];
    let results = scenario::compare(&deal(), &scenarios, &metric).unwrap();
    assert_eq!(results.len(), 3);
    let base = results[0].metric_value.unwrap();
    assert!((base - 0.08).abs() < 1e-6, "base IRR {base}");
    assert!(results[1].vs_base.unwrap() > 0.0);
    assert!(results[2].vs_base.unwrap() < 0.0);
}

// ===========================================================================
// Sensitivity
// ===========================================================================

#[test]
fn test_tornado_ranks_rent_growth_first() {
    // Impacts of 18% and 9% around a base metric of 1.0.
    let metric = |a: &AssumptionSet| -> EngineResult<f64> {
        Ok(1.0 + a.get("rent_growth")? + a.get("exit_cap_rate")?)
    };
    let base = AssumptionSet::from([("rent_growth", 0.0), ("exit_cap_rate", 0.0)]);
    let vars = vec![
        Variable::new("exit_cap_rate", 0.0, -0.045, 0.045),
        Variable::new("rent_growth", 0.0, -0.09, 0.09),
    ];
    let rows = sensitivity::analyze(&base, &vars, &metric).unwrap();
    assert_eq!(rows[0].variable_name, "rent_growth");
    assert!((rows[0].impact_percentage.unwrap() - 18.0).abs() < 1e-9);
    assert_eq!(rows[1].variable_name, "exit_cap_rate");
    assert!((rows[1].impact_percentage.unwrap() - 9.0).abs() < 1e-9);
}

#[test]
fn test_rental_tornado_signs() {
    let ev = Evaluator::new(RentalPropertyModel::default(), MetricSpec::Irr);
    let metric = |a: &AssumptionSet| ev.metric(a);
    let vars = vec![
        Variable::new(MONTHLY_RENT, 10_000.0, 9_000.0, 11_000.0),
        Variable::new(EXIT_CAP_RATE, 0.08, 0.07, 0.09),
    ];
    let rows = sensitivity::analyze(&deal(), &vars, &metric).unwrap();
    let rent = rows.iter().find(|r| r.variable_name == MONTHLY_RENT).unwrap();
    let cap = rows.iter().find(|r| r.variable_name == EXIT_CAP_RATE).unwrap();
    assert!(rent.impact_percentage.unwrap() > 0.0);
    assert!(cap.impact_percentage.unwrap() < 0.0);
    assert!(rows[0].impact_percentage.unwrap().abs() >= rows[1].impact_percentage.unwrap().abs());
}

// ===========================================================================
// Break-even
// ===========================================================================

#[test]
fn test_rent_needed_for_target_irr() {
    let ev = Evaluator::new(RentalPropertyModel::default(), MetricSpec::Irr);
    let metric = |a: &AssumptionSet| ev.metric(a);
    let var = Variable::new(MONTHLY_RENT, 10_000.0, 8_000.0, 12_000.0);
    let r = break_even::solve(&deal(), &var, 0.09, &metric).unwrap();
    assert!(r.achievable);
    let rent = r.break_even_value.unwrap();
    assert!(rent > 10_000.0 && rent < 12_000.0, "got {rent}");
    let irr = ev.metric(&deal().with_value(MONTHLY_RENT, rent)).unwrap();
    assert!((irr - 0.09).abs() < 1e-6, "IRR at break-even {irr}");
}

#[test]
fn test_break_even_base_already_on_target() {
    let base = AssumptionSet::from([("price", 150_000.0), ("rent", 1500.0)]);
    let var = Variable::new("rent", 1500.0, 1000.0, 2000.0);
    let r = break_even::solve(&base, &var, 1.0, &one_percent_rule).unwrap();
    assert!(r.achievable);
    assert_eq!(r.change_required, Some(0.0));
    assert_eq!(r.difficulty, Difficulty::Easy);
}

#[test]
fn test_break_even_unreachable_target() {
    let base = AssumptionSet::from([("price", 150_000.0), ("rent", 1500.0)]);
    let var = Variable::new("rent", 1500.0, 1000.0, 2000.0);
    let r = break_even::solve(&base, &var, 5.0, &one_percent_rule).unwrap();
    assert!(!r.achievable);
    assert_eq!(r.difficulty, Difficulty::Impossible);
    assert_eq!(r.reason, Some(BreakEvenShortfall::Unreachable));
}

#[test]
fn test_break_even_difficulty_scales_with_change() {
    let base = AssumptionSet::from([("price", 100_000.0), ("rent", 1000.0)]);
    let var = Variable::new("rent", 1000.0, 0.0, 3000.0);
    let cases = [
        (1.05, Difficulty::Easy),
        (1.15, Difficulty::Moderate),
        (1.40, Difficulty::Challenging),
        (2.00, Difficulty::Difficult),
    ];
    for (target, expected) in cases {
        let r = break_even::solve(&base, &var, target, &one_percent_rule).unwrap();
        assert_eq!(r.difficulty, expected, "target {target}");
    }
}
