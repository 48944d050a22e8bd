//! Evaluation of indicator rules against arbitrary objects.
//!
//! Objects take part by implementing [`Attributes`], a name based lookup that each
//! domain type spells out as an explicit table. Rules are applied in ascending
//! display order; a rule that cannot be evaluated against an object is logged and
//! left out of the result while the remaining rules still run.

use std::sync::Arc;

use serde_json::{Map, Value as JsonValue};
use thiserror::Error;
use tracing::{error, warn};

use crate::datatype::{Datum, Record};
use crate::execute::Row;
use crate::rule::{ConditionOperator, Indicator, IndicatorRule, RuleStore};

/// Name based access to the attributes of an object.
///
/// `None` means the object has no attribute of that name, while
/// `Some(Datum::Null)` means the attribute exists and holds nothing.
pub trait Attributes {
    fn attribute(&self, name: &str) -> Option<Datum>;
}

impl Attributes for Record {
    fn attribute(&self, name: &str) -> Option<Datum> {
        self.get(name).cloned()
    }
}

impl Attributes for Row {
    fn attribute(&self, name: &str) -> Option<Datum> {
        self.get(name).cloned()
    }
}

impl Attributes for Map<String, JsonValue> {
    fn attribute(&self, name: &str) -> Option<Datum> {
        self.get(name).map(Datum::from_json)
    }
}

#[derive(Error, Debug, PartialEq)]
pub enum EvaluationError {
    #[error("no attribute named '{0}'")]
    MissingAttribute(String),
    #[error("operator {0} needs a condition value")]
    MissingConditionValue(ConditionOperator),
}

fn parse_number(s: &str) -> Option<f64> {
    s.trim().parse::<f64>().ok()
}

/// Evaluates one rule against one object.
pub fn evaluate_rule(target: &dyn Attributes, rule: &IndicatorRule) -> Result<bool, EvaluationError> {
    let field = rule.condition_field.as_str();
    let value = target
        .attribute(field)
        .ok_or_else(|| EvaluationError::MissingAttribute(field.to_owned()))?;
    let operator = rule.condition_operator;
    let expected = rule.condition_value.as_deref();
    Ok(match operator {
        ConditionOperator::IsTrue => value == Datum::Boolean(true),
        ConditionOperator::IsFalse => value == Datum::Boolean(false),
        ConditionOperator::IsNull => value.is_null(),
        ConditionOperator::IsNotNull => !value.is_null(),
        ConditionOperator::Equals => !value.is_null() && Some(value.to_string().as_str()) == expected,
        ConditionOperator::NotEquals => value.is_null() || Some(value.to_string().as_str()) != expected,
        // a null attribute is false before the condition value is looked at
        ConditionOperator::Contains | ConditionOperator::GreaterThan | ConditionOperator::LessThan
            if value.is_null() =>
        {
            false
        }
        ConditionOperator::Contains => {
            let needle = expected.ok_or(EvaluationError::MissingConditionValue(operator))?;
            value.to_string().to_lowercase().contains(&needle.to_lowercase())
        }
        ConditionOperator::GreaterThan | ConditionOperator::LessThan => {
            let threshold = expected.ok_or(EvaluationError::MissingConditionValue(operator))?;
            match (parse_number(&value.to_string()), parse_number(threshold)) {
                (Some(actual), Some(threshold)) => {
                    if operator == ConditionOperator::GreaterThan {
                        actual > threshold
                    } else {
                        actual < threshold
                    }
                }
                _ => {
                    warn!(field, value = %value, threshold, "could not compare values numerically");
                    false
                }
            }
        }
    })
}

/// Produces indicators for objects of a context from the rules stored for it.
pub struct IndicatorEngine {
    rules: Arc<dyn RuleStore>,
}

impl IndicatorEngine {
    pub fn new(rules: Arc<dyn RuleStore>) -> Self {
        Self { rules }
    }

    /// One indicator per active rule of `context` that could be evaluated, in display order.
    /// Never fails: a rule store failure yields no indicators.
    pub fn evaluate(&self, target: &dyn Attributes, context: &str) -> Vec<Indicator> {
        match self.rules.find_active_by_context(context) {
            Ok(rules) => evaluate_rules(target, &rules, context),
            Err(e) => {
                error!(context, error = %e, "could not load indicator rules");
                Vec::new()
            }
        }
    }
}

/// Applies rules in the order given, leaving out the ones that fail.
pub fn evaluate_rules(target: &dyn Attributes, rules: &[IndicatorRule], context: &str) -> Vec<Indicator> {
    rules
        .iter()
        .filter_map(|rule| match evaluate_rule(target, rule) {
            Ok(value) => Some(Indicator {
                key: rule.rule_key.clone(),
                name: rule.name.clone(),
                value,
                icon: rule.icon.clone(),
                description: rule.description.clone(),
            }),
            Err(e) => {
                error!(rule = %rule.rule_key, context, error = %e, "error evaluating indicator");
                None
            }
        })
        .collect()
}
