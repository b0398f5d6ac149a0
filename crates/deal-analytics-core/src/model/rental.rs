use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::time_value::{fv, pmt};
use crate::types::{AssumptionSet, CashFlow, CashFlowSeries, Coverage, Money};
use crate::EngineResult;

use super::CashFlowModel;

// ---------------------------------------------------------------------------
// Assumption keys
// ---------------------------------------------------------------------------

pub const PURCHASE_PRICE: &str = "purchase_price";
pub const MONTHLY_RENT: &str = "monthly_rent";
pub const EXIT_CAP_RATE: &str = "exit_cap_rate";
pub const VACANCY_RATE: &str = "vacancy_rate";
pub const OPERATING_EXPENSES: &str = "operating_expenses";
pub const CAPEX_RESERVE: &str = "capex_reserve";
pub const RENT_GROWTH: &str = "rent_growth";
pub const EXPENSE_GROWTH: &str = "expense_growth";
pub const LOAN_TO_VALUE: &str = "loan_to_value";
pub const INTEREST_RATE: &str = "interest_rate";
pub const CLOSING_COSTS: &str = "closing_costs";
pub const SELLING_COSTS: &str = "selling_costs";

/// Longest hold period or amortisation term, in years.
pub const MAX_TERM_YEARS: u32 = 100;

/// Levered hold-period property deal: buy, collect rent for `hold_years`,
/// sell at the exit cap rate on forward NOI.
///
/// Optional assumptions default to zero. Operating expenses and the capex
/// reserve are annual, year-one amounts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RentalPropertyModel {
    #[serde(default = "default_hold_years")]
    pub hold_years: u32,
    #[serde(default = "default_amortization_years")]
    pub amortization_years: u32,
}

fn default_hold_years() -> u32 {
    10
}

fn default_amortization_years() -> u32 {
    30
}

impl Default for RentalPropertyModel {
    fn default() -> Self {
        RentalPropertyModel {
            hold_years: default_hold_years(),
            amortization_years: default_amortization_years(),
        }
    }
}

/// Inputs after domain checks.
struct DealInputs {
    price: Money,
    monthly_rent: Money,
    exit_cap_rate: f64,
    vacancy_rate: f64,
    operating_expenses: Money,
    capex_reserve: Money,
    rent_growth: f64,
    expense_growth: f64,
    loan_to_value: f64,
    interest_rate: f64,
    closing_costs: f64,
    selling_costs: f64,
}

fn require(name: &str, value: f64, ok: bool, reason: &str) -> EngineResult<f64> {
    if !value.is_finite() || !ok {
        return Err(EngineError::validation(
            format!("assumption:{name}"),
            format!("{reason} (got {value})"),
        ));
    }
    Ok(value)
}

impl DealInputs {
    fn resolve(a: &AssumptionSet) -> EngineResult<Self> {
        let price = a.get(PURCHASE_PRICE)?;
        let monthly_rent = a.get(MONTHLY_RENT)?;
        let exit_cap_rate = a.get(EXIT_CAP_RATE)?;
        let vacancy_rate = a.get_or(VACANCY_RATE, 0.0);
        let operating_expenses = a.get_or(OPERATING_EXPENSES, 0.0);
        let capex_reserve = a.get_or(CAPEX_RESERVE, 0.0);
        let rent_growth = a.get_or(RENT_GROWTH, 0.0);
        let expense_growth = a.get_or(EXPENSE_GROWTH, 0.0);
        let loan_to_value = a.get_or(LOAN_TO_VALUE, 0.0);
        let interest_rate = a.get_or(INTEREST_RATE, 0.0);
        let closing_costs = a.get_or(CLOSING_COSTS, 0.0);
        let selling_costs = a.get_or(SELLING_COSTS, 0.0);

        Ok(DealInputs {
            price: require(PURCHASE_PRICE, price, price > 0.0, "must be > 0")?,
            monthly_rent: require(MONTHLY_RENT, monthly_rent, monthly_rent >= 0.0, "must be >= 0")?,
            exit_cap_rate: require(EXIT_CAP_RATE, exit_cap_rate, exit_cap_rate > 0.0, "must be > 0")?,
            vacancy_rate: require(
                VACANCY_RATE,
                vacancy_rate,
                (0.0..1.0).contains(&vacancy_rate),
                "must be in [0, 1)",
            )?,
            operating_expenses: require(
                OPERATING_EXPENSES,
                operating_expenses,
                operating_expenses >= 0.0,
                "must be >= 0",
            )?,
            capex_reserve: require(CAPEX_RESERVE, capex_reserve, capex_reserve >= 0.0, "must be >= 0")?,
            rent_growth: require(RENT_GROWTH, rent_growth, rent_growth > -1.0, "must be > -100%")?,
            expense_growth: require(
                EXPENSE_GROWTH,
                expense_growth,
                expense_growth > -1.0,
                "must be > -100%",
            )?,
            loan_to_value: require(
                LOAN_TO_VALUE,
                loan_to_value,
                (0.0..1.0).contains(&loan_to_value),
                "must be in [0, 1)",
            )?,
            interest_rate: require(INTEREST_RATE, interest_rate, interest_rate > -1.0, "must be > -100%")?,
            closing_costs: require(CLOSING_COSTS, closing_costs, closing_costs >= 0.0, "must be >= 0")?,
            selling_costs: require(
                SELLING_COSTS,
                selling_costs,
                (0.0..1.0).contains(&selling_costs),
                "must be in [0, 1)",
            )?,
        })
    }

    /// NOI for operating year `year` (1-based).
    fn noi(&self, year: u32) -> Money {
        let t = (year - 1) as i32;
        let gross = self.monthly_rent * 12.0 * (1.0 + self.rent_growth).powi(t);
        let egi = gross * (1.0 - self.vacancy_rate);
        let opex = self.operating_expenses * (1.0 + self.expense_growth).powi(t);
        egi - opex - self.capex_reserve
    }
}

impl CashFlowModel for RentalPropertyModel {
    fn name(&self) -> &str {
        "rental_property"
    }

    fn required_variables(&self) -> Vec<String> {
        vec![
            PURCHASE_PRICE.to_string(),
            MONTHLY_RENT.to_string(),
            EXIT_CAP_RATE.to_string(),
        ]
    }

    fn project(&self, assumptions: &AssumptionSet) -> EngineResult<CashFlowSeries> {
        if !(1..=MAX_TERM_YEARS).contains(&self.hold_years) {
            return Err(EngineError::validation(
                "model.hold_years",
                format!("Must be between 1 and {MAX_TERM_YEARS} (got {})", self.hold_years),
            ));
        }
        if !(1..=MAX_TERM_YEARS).contains(&self.amortization_years) {
            return Err(EngineError::validation(
                "model.amortization_years",
                format!(
                    "Must be between 1 and {MAX_TERM_YEARS} (got {})",
                    self.amortization_years
                ),
            ));
        }
        let d = DealInputs::resolve(assumptions)?;

        let loan = d.price * d.loan_to_value;
        let equity = d.price * (1.0 + d.closing_costs) - loan;
        let monthly_rate = d.interest_rate / 12.0;
        let term_months = self.amortization_years * 12;
        let monthly_payment = if loan > 0.0 {
            -pmt(monthly_rate, term_months, loan, 0.0)?
        } else {
            0.0
        };
        let annual_debt_service = monthly_payment * 12.0;

        let mut flows = Vec::with_capacity(self.hold_years as usize + 1);
        flows.push(CashFlow {
            period: 0,
            amount: -equity,
        });
        for year in 1..=self.hold_years {
            let debt_service = if year <= self.amortization_years {
                annual_debt_service
            } else {
                0.0
            };
            flows.push(CashFlow {
                period: year,
                amount: d.noi(year) - debt_service,
            });
        }

        let months_paid = (self.hold_years * 12).min(term_months);
        let loan_balance = if loan > 0.0 {
            (-fv(monthly_rate, months_paid, -monthly_payment, loan)).max(0.0)
        } else {
            0.0
        };
        let sale_price = d.noi(self.hold_years + 1) / d.exit_cap_rate;
        let terminal_value = sale_price * (1.0 - d.selling_costs) - loan_balance;

        Ok(CashFlowSeries {
            flows,
            terminal_value: Some(terminal_value),
            coverage: Some(Coverage {
                net_operating_income: d.noi(1),
                debt_service: annual_debt_service,
            }),
        })
    }
}
