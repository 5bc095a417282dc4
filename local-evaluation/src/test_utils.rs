use serde_json::{json, Value};

use crate::flags::flag_models::FeatureFlag;

/// An active person flag with the given condition groups.
pub fn create_flag(key: &str, groups: Value) -> FeatureFlag {
    serde_json::from_value(json!({
        "id": 1,
        "team_id": 1,
        "name": key,
        "key": key,
        "active": true,
        "filters": {"groups": groups}
    }))
    .expect("Failed to build test flag")
}

/// `multivariate-flag` with a 50/25/25 split over three variants.
pub fn multivariate_flag(groups: Value) -> FeatureFlag {
    serde_json::from_value(json!({
        "id": 2,
        "team_id": 1,
        "name": "Multivariate flag",
        "key": "multivariate-flag",
        "active": true,
        "filters": {
            "groups": groups,
            "multivariate": {"variants": multivariate_variants()},
            "payloads": multivariate_payloads()
        }
    }))
    .expect("Failed to build test flag")
}

fn multivariate_variants() -> Value {
    json!([
        {"key": "first-variant", "name": "First Variant", "rollout_percentage": 50},
        {"key": "second-variant", "name": "Second Variant", "rollout_percentage": 25},
        {"key": "third-variant", "name": "Third Variant", "rollout_percentage": 25}
    ])
}

fn multivariate_payloads() -> Value {
    json!({
        "first-variant": "{\"color\": \"blue\"}",
        "second-variant": "not json"
    })
}

/// A definitions response covering person, multivariate, group, cohort and
/// continuity flags.
pub fn local_evaluation_response() -> Value {
    json!({
        "flags": [
            {
                "id": 1,
                "team_id": 1,
                "name": "Beta feature",
                "key": "beta-feature",
                "active": true,
                "filters": {
                    "groups": [{"properties": [], "rollout_percentage": 50}],
                    "payloads": {"true": "{\"discount\": 10}"}
                }
            },
            {
                "id": 2,
                "team_id": 1,
                "name": "Multivariate flag",
                "key": "multivariate-flag",
                "active": true,
                "filters": {
                    "groups": [{"properties": [], "rollout_percentage": 100}],
                    "multivariate": {"variants": multivariate_variants()},
                    "payloads": multivariate_payloads()
                }
            },
            {
                "id": 3,
                "team_id": 1,
                "name": "Company flag",
                "key": "company-flag",
                "active": true,
                "filters": {
                    "aggregation_group_type_index": 0,
                    "groups": [{
                        "properties": [
                            {"key": "size", "operator": "gt", "value": 10, "type": "group", "group_type_index": 0}
                        ],
                        "rollout_percentage": 100
                    }]
                }
            },
            {
                "id": 4,
                "team_id": 1,
                "name": "Adults",
                "key": "cohort-flag",
                "active": true,
                "filters": {
                    "groups": [{"properties": [{"key": "id", "value": 123, "type": "cohort"}]}]
                }
            },
            {
                "id": 5,
                "team_id": 1,
                "name": "Continuity",
                "key": "continuity-flag",
                "active": true,
                "ensure_experience_continuity": true,
                "filters": {"groups": [{"properties": [], "rollout_percentage": 100}]}
            },
            {
                "id": 6,
                "team_id": 1,
                "name": "Disabled",
                "key": "disabled-flag",
                "active": false,
                "filters": {
                    "groups": [{"properties": [], "rollout_percentage": 100}],
                    "payloads": {"false": "{\"reason\": \"off\"}"}
                }
            }
        ],
        "group_type_mapping": {"0": "company", "1": "project"},
        "cohorts": {
            "123": {
                "type": "AND",
                "values": [
                    {"key": "age", "operator": "gte", "value": 18, "type": "person"},
                    {"key": "banned", "operator": "exact", "value": true, "type": "person", "negation": true}
                ]
            }
        }
    })
}
