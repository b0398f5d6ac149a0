use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::types::{AssumptionSet, CashFlow, CashFlowSeries, Coverage, Money, MAX_PERIOD};
use crate::EngineResult;

use super::CashFlowModel;

/// A literal amount or a scaled reference to an assumption.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ValueSource {
    Fixed(Money),
    Variable {
        variable: String,
        #[serde(default = "default_multiplier")]
        multiplier: f64,
    },
}

fn default_multiplier() -> f64 {
    1.0
}

impl ValueSource {
    pub fn variable(name: &str, multiplier: f64) -> Self {
        ValueSource::Variable {
            variable: name.to_string(),
            multiplier,
        }
    }

    fn resolve(&self, assumptions: &AssumptionSet) -> EngineResult<Money> {
        match self {
            ValueSource::Fixed(v) => Ok(*v),
            ValueSource::Variable {
                variable,
                multiplier,
            } => Ok(multiplier * assumptions.get(variable)?),
        }
    }

    fn variable_name(&self) -> Option<&str> {
        match self {
            ValueSource::Fixed(_) => None,
            ValueSource::Variable { variable, .. } => Some(variable),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledFlow {
    pub period: u32,
    pub value: ValueSource,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoverageSources {
    pub net_operating_income: ValueSource,
    pub debt_service: ValueSource,
}

/// Explicit cash-flow schedule whose amounts may reference assumptions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleModel {
    pub flows: Vec<ScheduledFlow>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub terminal_value: Option<ValueSource>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coverage: Option<CoverageSources>,
}

impl ScheduleModel {
    pub fn new(flows: Vec<ScheduledFlow>) -> Self {
        ScheduleModel {
            flows,
            terminal_value: None,
            coverage: None,
        }
    }

    fn sources(&self) -> impl Iterator<Item = &ValueSource> {
        self.flows
            .iter()
            .map(|f| &f.value)
            .chain(self.terminal_value.iter())
            .chain(
                self.coverage
                    .iter()
                    .flat_map(|c| [&c.net_operating_income, &c.debt_service]),
            )
    }
}

impl CashFlowModel for ScheduleModel {
    fn name(&self) -> &str {
        "schedule"
    }

    fn required_variables(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .sources()
            .filter_map(|s| s.variable_name())
            .map(str::to_string)
            .collect();
        names.sort();
        names.dedup();
        names
    }

    fn project(&self, assumptions: &AssumptionSet) -> EngineResult<CashFlowSeries> {
        if self.flows.is_empty() {
            return Err(EngineError::validation(
                "model.flows",
                "Schedule must contain at least one flow",
            ));
        }

        if let Some(i) = self.flows.iter().position(|f| f.period > MAX_PERIOD) {
            return Err(EngineError::validation(
                format!("model.flows[{i}].period"),
                format!(
                    "Period {} exceeds the maximum of {MAX_PERIOD}",
                    self.flows[i].period
                ),
            ));
        }

        let mut flows = self
            .flows
            .iter()
            .map(|f| {
                Ok(CashFlow {
                    period: f.period,
                    amount: f.value.resolve(assumptions)?,
                })
            })
            .collect::<EngineResult<Vec<_>>>()?;
        flows.sort_by_key(|f| f.period);

        let terminal_value = self
            .terminal_value
            .as_ref()
            .map(|tv| tv.resolve(assumptions))
            .transpose()?;
        let coverage = self
            .coverage
            .as_ref()
            .map(|c| -> EngineResult<Coverage> {
                Ok(Coverage {
                    net_operating_income: c.net_operating_income.resolve(assumptions)?,
                    debt_service: c.debt_service.resolve(assumptions)?,
                })
            })
            .transpose()?;

        Ok(CashFlowSeries {
            flows,
            terminal_value,
            coverage,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schedule_resolves_variables() {
        let model = ScheduleModel {
            flows: vec![
                ScheduledFlow {
                    period: 1,
                    value: ValueSource::variable("proceeds", 1.0),
                },
                ScheduledFlow {
                    period: 0,
                    value: ValueSource::Fixed(-100.0),
                },
            ],
            terminal_value: Some(ValueSource::variable("proceeds", 0.5)),
            coverage: None,
        };
        assert_eq!(model.required_variables(), vec!["proceeds".to_string()]);

        let series = model
            .project(&AssumptionSet::from([("proceeds", 110.0)]))
            .unwrap();
        assert_eq!(series.amounts(), vec![-100.0, 165.0]);
    }

    #[test]
    fn test_schedule_deserializes_mixed_values() {
        let json = r#"{
            "flows": [
                {"period": 0, "value": -100},
                {"period": 1, "value": {"variable": "exit"}}
            ]
        }"#;
        let model: ScheduleModel = serde_json::from_str(json).unwrap();
        assert_eq!(model.flows[1].value, ValueSource::variable("exit", 1.0));
    }

    #[test]
    fn test_period_past_cap_rejected() {
        let model: ScheduleModel = serde_json::from_str(
            r#"{"flows": [{"period": 0, "value": -100}, {"period": 3000000000, "value": 200}]}"#,
        )
        .unwrap();
        match model.project(&AssumptionSet::new()) {
            Err(EngineError::Validation { field, .. }) => assert_eq!(field, "model.flows[1].period"),
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn test_empty_schedule_rejected() {
        let model = ScheduleModel::new(vec![]);
        assert!(model.project(&AssumptionSet::new()).is_err());
    }
}
