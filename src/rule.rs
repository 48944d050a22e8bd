use std::fmt;
use std::str::FromStr;

use chrono::NaiveDateTime;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use uuid::Uuid;

use crate::error::{DynaqueryError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConditionOperator {
    Equals,
    NotEquals,
    IsTrue,
    IsFalse,
    IsNull,
    IsNotNull,
    GreaterThan,
    LessThan,
    Contains,
}

impl ConditionOperator {
    pub const ALL: [ConditionOperator; 9] = [
        ConditionOperator::Equals,
        ConditionOperator::NotEquals,
        ConditionOperator::IsTrue,
        ConditionOperator::IsFalse,
        ConditionOperator::IsNull,
        ConditionOperator::IsNotNull,
        ConditionOperator::GreaterThan,
        ConditionOperator::LessThan,
        ConditionOperator::Contains,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ConditionOperator::Equals => "EQUALS",
            ConditionOperator::NotEquals => "NOT_EQUALS",
            ConditionOperator::IsTrue => "IS_TRUE",
            ConditionOperator::IsFalse => "IS_FALSE",
            ConditionOperator::IsNull => "IS_NULL",
            ConditionOperator::IsNotNull => "IS_NOT_NULL",
            ConditionOperator::GreaterThan => "GREATER_THAN",
            ConditionOperator::LessThan => "LESS_THAN",
            ConditionOperator::Contains => "CONTAINS",
        }
    }
}

impl fmt::Display for ConditionOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConditionOperator {
    type Err = DynaqueryError;
    fn from_str(s: &str) -> Result<Self> {
        ConditionOperator::ALL
            .iter()
            .copied()
            .find(|op| op.as_str() == s)
            .ok_or_else(|| DynaqueryError::Persistence(format!("Unknown condition operator: {}", s)))
    }
}

impl Serialize for ConditionOperator {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ConditionOperator {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndicatorRule {
    pub id: Uuid,
    pub rule_key: String,
    pub name: String,
    pub description: Option<String>,
    pub icon: String,
    pub context: String,
    pub condition_field: String,
    pub condition_operator: ConditionOperator,
    pub condition_value: Option<String>,
    pub active: bool,
    pub display_order: i32,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

/// Client-writable part of a rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleDraft {
    pub rule_key: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub icon: String,
    pub context: String,
    pub condition_field: String,
    pub condition_operator: ConditionOperator,
    #[serde(default)]
    pub condition_value: Option<String>,
    #[serde(default)]
    pub active: Option<bool>,
    #[serde(default)]
    pub display_order: Option<i32>,
}

impl RuleDraft {
    pub fn new(rule_key: &str, context: &str, field: &str, operator: ConditionOperator) -> Self {
        Self {
            rule_key: rule_key.to_owned(),
            name: rule_key.to_owned(),
            description: None,
            icon: "info".to_owned(),
            context: context.to_owned(),
            condition_field: field.to_owned(),
            condition_operator: operator,
            condition_value: None,
            active: None,
            display_order: None,
        }
    }
    pub fn value(mut self, value: &str) -> Self {
        self.condition_value = Some(value.to_owned());
        self
    }
    pub fn order(mut self, display_order: i32) -> Self {
        self.display_order = Some(display_order);
        self
    }
    pub fn inactive(mut self) -> Self {
        self.active = Some(false);
        self
    }
}

/// The outcome of one rule against one object. Derived, never stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Indicator {
    pub key: String,
    pub name: String,
    pub value: bool,
    pub icon: String,
    pub description: Option<String>,
}

pub trait RuleStore: Send + Sync {
    /// Active rules of a context, ascending by display order.
    fn find_active_by_context(&self, context: &str) -> Result<Vec<IndicatorRule>>;
    /// All rules of a context, ascending by display order.
    fn find_by_context(&self, context: &str) -> Result<Vec<IndicatorRule>>;
    fn find_active(&self) -> Result<Vec<IndicatorRule>>;
    fn find_by_id(&self, id: Uuid) -> Result<Option<IndicatorRule>>;
    fn list(&self) -> Result<Vec<IndicatorRule>>;
    fn save(&self, id: Option<Uuid>, draft: &RuleDraft) -> Result<IndicatorRule>;
    fn delete(&self, id: Uuid) -> Result<bool>;
}
