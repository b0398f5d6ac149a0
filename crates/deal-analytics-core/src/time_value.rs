use chrono::NaiveDate;

use crate::error::EngineError;
use crate::types::{DatedCashFlow, Money, Rate};
use crate::EngineResult;

const DAYS_PER_YEAR: f64 = 365.0;

fn check_rate(rate: Rate) -> EngineResult<()> {
    if !rate.is_finite() || rate <= -1.0 {
        return Err(EngineError::validation(
            "rate",
            "Discount rate must be finite and greater than -100%",
        ));
    }
    Ok(())
}

/// Net Present Value of a series of cash flows (index = period).
pub fn npv(rate: Rate, cash_flows: &[Money]) -> EngineResult<Money> {
    check_rate(rate)?;

    let one_plus_r = 1.0 + rate;
    let mut result = 0.0;
    let mut discount = 1.0;

    for (t, cf) in cash_flows.iter().enumerate() {
        if t > 0 {
            discount *= one_plus_r;
        }
        result += cf / discount;
    }

    Ok(result)
}

/// Analytic derivative of NPV with respect to the rate.
pub fn npv_derivative(rate: Rate, cash_flows: &[Money]) -> EngineResult<f64> {
    check_rate(rate)?;

    let one_plus_r = 1.0 + rate;
    let mut result = 0.0;
    let mut discount = one_plus_r;

    for (t, cf) in cash_flows.iter().enumerate().skip(1) {
        discount *= one_plus_r;
        result -= t as f64 * cf / discount;
    }

    Ok(result)
}

/// Actual/365 year fraction between two dates.
pub fn year_fraction(from: NaiveDate, to: NaiveDate) -> f64 {
    (to - from).num_days() as f64 / DAYS_PER_YEAR
}

/// NPV of dated flows, discounted to the earliest date.
pub fn xnpv(rate: Rate, flows: &[DatedCashFlow]) -> EngineResult<Money> {
    check_rate(rate)?;
    let Some(base) = flows.iter().map(|f| f.date).min() else {
        return Ok(0.0);
    };
    let one_plus_r = 1.0 + rate;
    Ok(flows
        .iter()
        .map(|f| f.amount / one_plus_r.powf(year_fraction(base, f.date)))
        .sum())
}

/// Derivative of [`xnpv`] with respect to the rate.
pub fn xnpv_derivative(rate: Rate, flows: &[DatedCashFlow]) -> EngineResult<f64> {
    check_rate(rate)?;
    let Some(base) = flows.iter().map(|f| f.date).min() else {
        return Ok(0.0);
    };
    let one_plus_r = 1.0 + rate;
    Ok(flows
        .iter()
        .map(|f| {
            let years = year_fraction(base, f.date);
            -years * f.amount / one_plus_r.powf(years + 1.0)
        })
        .sum())
}

/// Future Value
pub fn fv(rate: Rate, nper: u32, pmt: Money, present_value: Money) -> Money {
    if rate == 0.0 {
        return -(present_value + pmt * nper as f64);
    }

    let factor = (1.0 + rate).powi(nper as i32);
    let annuity_factor = (factor - 1.0) / rate;

    -(present_value * factor + pmt * annuity_factor)
}

/// Payment (PMT)
pub fn pmt(rate: Rate, nper: u32, present_value: Money, future_value: Money) -> EngineResult<Money> {
    if nper == 0 {
        return Err(EngineError::validation(
            "nper",
            "Number of periods must be > 0",
        ));
    }

    if rate == 0.0 {
        return Ok(-(present_value + future_value) / nper as f64);
    }

    let factor = (1.0 + rate).powi(nper as i32);
    let annuity_factor = (factor - 1.0) / rate;

    if annuity_factor == 0.0 {
        return Err(EngineError::validation(
            "rate",
            "PMT annuity factor is zero",
        ));
    }

    Ok(-(present_value * factor + future_value) / annuity_factor)
}
