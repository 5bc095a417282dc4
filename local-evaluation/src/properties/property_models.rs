use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OperatorType {
    Exact,
    IsNot,
    Icontains,
    NotIcontains,
    Regex,
    NotRegex,
    Gt,
    Lt,
    Gte,
    Lte,
    IsSet,
    IsNotSet,
    IsDateAfter,
    IsDateBefore,
    // Anything else can't be evaluated locally, but shouldn't fail the whole payload either
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PropertyType {
    Person,
    Group,
    Cohort,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct PropertyFilter {
    pub key: String,
    // is_set filters created via the api don't always carry a value
    #[serde(default)]
    pub value: Option<serde_json::Value>,
    #[serde(default)]
    pub operator: Option<OperatorType>,
    #[serde(rename = "type", default = "default_property_type")]
    pub prop_type: PropertyType,
    #[serde(default)]
    pub negation: Option<bool>,
    #[serde(default)]
    pub group_type_index: Option<i32>,
}

fn default_property_type() -> PropertyType {
    PropertyType::Person
}

impl PropertyFilter {
    pub fn is_cohort(&self) -> bool {
        self.prop_type == PropertyType::Cohort
    }

    pub fn is_negated(&self) -> bool {
        self.negation.unwrap_or(false)
    }
}
