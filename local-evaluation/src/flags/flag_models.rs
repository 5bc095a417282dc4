use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::properties::property_models::PropertyFilter;

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
pub struct FlagPropertyGroup {
    #[serde(default)]
    pub properties: Option<Vec<PropertyFilter>>,
    #[serde(default)]
    pub rollout_percentage: Option<f64>,
    #[serde(default)]
    pub variant: Option<String>,
}

impl FlagPropertyGroup {
    pub fn has_variant_override(&self) -> bool {
        self.variant.as_deref().is_some_and(|variant| !variant.is_empty())
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct MultivariateFlagVariant {
    pub key: String,
    #[serde(default)]
    pub name: Option<String>,
    pub rollout_percentage: f64,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
pub struct MultivariateFlagOptions {
    #[serde(default)]
    pub variants: Vec<MultivariateFlagVariant>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
pub struct FlagFilters {
    #[serde(default)]
    pub groups: Vec<FlagPropertyGroup>,
    #[serde(default)]
    pub multivariate: Option<MultivariateFlagOptions>,
    #[serde(default)]
    pub aggregation_group_type_index: Option<i32>,
    /// Raw payloads keyed by the stringified match value, usually JSON encoded strings.
    #[serde(default)]
    pub payloads: Option<HashMap<String, Value>>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct FeatureFlag {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub team_id: Option<i64>,
    #[serde(default)]
    pub name: Option<String>,
    pub key: String,
    #[serde(default)]
    pub filters: FlagFilters,
    #[serde(default)]
    pub deleted: bool,
    #[serde(default)]
    pub active: bool,
    #[serde(default)]
    pub ensure_experience_continuity: bool,
}

impl FeatureFlag {
    pub fn get_group_type_index(&self) -> Option<i32> {
        self.filters.aggregation_group_type_index
    }

    pub fn get_conditions(&self) -> &[FlagPropertyGroup] {
        &self.filters.groups
    }

    pub fn get_variants(&self) -> &[MultivariateFlagVariant] {
        self.filters
            .multivariate
            .as_ref()
            .map(|multivariate| multivariate.variants.as_slice())
            .unwrap_or_default()
    }

    pub fn has_variant(&self, variant_key: &str) -> bool {
        self.get_variants().iter().any(|v| v.key == variant_key)
    }

    /// The raw payload stored for a match value, if there is one.
    pub fn get_payload(&self, match_val: &str) -> Option<&Value> {
        self.filters
            .payloads
            .as_ref()
            .and_then(|payloads| payloads.get(match_val))
            .filter(|payload| !payload.is_null())
    }
}
