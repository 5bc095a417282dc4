use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::properties::property_models::PropertyFilter;

/// Cohorts are keyed by their id rendered as a string, as sent by the definitions endpoint.
pub type CohortId = String;

/// A cohort sent without filters matches everyone, so definitions may be null.
pub type CohortDefinitions = HashMap<CohortId, Option<PropertyGroup>>;

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum PropertyGroupType {
    And,
    Or,
}

/// A boolean group of filters or of further groups.
///
/// ```json
/// {
///   "type": "OR",
///   "values": [
///     {
///       "type": "AND",
///       "values": [
///         {"key": "id", "value": 123, "type": "cohort"},
///         {"key": "email", "value": "@posthog.com", "type": "person", "operator": "icontains"}
///       ]
///     }
///   ]
/// }
/// ```
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct PropertyGroup {
    #[serde(rename = "type")]
    pub group_type: PropertyGroupType,
    #[serde(default)]
    pub values: Vec<PropertyGroupValue>,
}

// Groups are tried first: a filter never carries an AND/OR type alongside `values`.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(untagged)]
pub enum PropertyGroupValue {
    Group(PropertyGroup),
    Filter(PropertyFilter),
}
