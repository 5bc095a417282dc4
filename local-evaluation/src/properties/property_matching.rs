use std::collections::HashMap;

use chrono::{DateTime, NaiveTime, Utc};
use regex::Regex;
use serde_json::Value;
use thiserror::Error;

use crate::properties::property_models::{OperatorType, PropertyFilter};
use crate::properties::relative_date::parse_relative_date;

/// The local engine lacks the information to decide.
///
/// This is not a failure: it tells the caller to ask the remote service instead.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Inconclusive {
    #[error("can't match properties without a value. Missing property: {0}")]
    MissingProperty(String),
    #[error("operator {0:?} is not supported in local evaluation")]
    UnsupportedOperator(OperatorType),
    #[error("{0} is not a valid date")]
    InvalidDate(String),
    #[error("can't match cohort {0} without its definition")]
    UnknownCohort(String),
    #[error("cohort {0} depends on itself")]
    CohortCycle(String),
    #[error("flag has unknown group type index {0}")]
    UnknownGroupTypeIndex(i32),
    #[error("flag has experience continuity enabled")]
    ExperienceContinuity,
    #[error("can't determine if feature flag is enabled or not with given properties")]
    NoConditionDecided,
}

pub fn to_string_representation(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

pub fn to_f64_representation(value: &Value) -> Option<f64> {
    if value.is_number() {
        return value.as_f64();
    }
    to_string_representation(value).parse::<f64>().ok()
}

/// Matches a single filter against the properties of one person or group, using
/// the current time for relative dates.
pub fn match_property(
    property: &PropertyFilter,
    matching_property_values: &HashMap<String, Value>,
) -> Result<bool, Inconclusive> {
    match_property_at(property, matching_property_values, Utc::now())
}

pub fn match_property_at(
    property: &PropertyFilter,
    matching_property_values: &HashMap<String, Value>,
    now: DateTime<Utc>,
) -> Result<bool, Inconclusive> {
    let key = &property.key;
    let operator = property.operator.unwrap_or(OperatorType::Exact);

    let Some(override_value) = matching_property_values.get(key) else {
        if operator == OperatorType::IsSet {
            return Ok(false);
        }
        return Err(Inconclusive::MissingProperty(key.clone()));
    };

    let value = property.value.as_ref().unwrap_or(&Value::Null);

    match operator {
        OperatorType::Exact => Ok(compute_exact_match(value, override_value)),
        OperatorType::IsNot => Ok(!compute_exact_match(value, override_value)),
        OperatorType::IsSet => Ok(true),
        OperatorType::Icontains | OperatorType::NotIcontains => {
            let is_contained = to_string_representation(override_value)
                .to_lowercase()
                .contains(&to_string_representation(value).to_lowercase());

            Ok(is_contained == (operator == OperatorType::Icontains))
        }
        OperatorType::Regex | OperatorType::NotRegex => {
            // An invalid pattern fails both operators
            let Ok(pattern) = Regex::new(&to_string_representation(value)) else {
                return Ok(false);
            };
            let is_match = pattern.is_match(&to_string_representation(override_value));

            Ok(is_match == (operator == OperatorType::Regex))
        }
        OperatorType::Gt | OperatorType::Gte | OperatorType::Lt | OperatorType::Lte => {
            Ok(compare_values(value, override_value, operator))
        }
        OperatorType::IsDateBefore | OperatorType::IsDateAfter => {
            let parsed_date = parse_relative_date(&to_string_representation(value), now)
                .or_else(|| parse_date_value(value))
                .ok_or_else(|| Inconclusive::InvalidDate(to_string_representation(value)))?;

            let override_date = parse_date_value(override_value)
                .ok_or_else(|| Inconclusive::InvalidDate(to_string_representation(override_value)))?;

            if operator == OperatorType::IsDateBefore {
                Ok(override_date < parsed_date)
            } else {
                Ok(override_date > parsed_date)
            }
        }
        OperatorType::IsNotSet | OperatorType::Unknown => {
            Err(Inconclusive::UnsupportedOperator(operator))
        }
    }
}

fn compute_exact_match(value: &Value, override_value: &Value) -> bool {
    let override_value = to_string_representation(override_value).to_lowercase();

    match value {
        Value::Array(values) => values
            .iter()
            .any(|v| to_string_representation(v).to_lowercase() == override_value),
        _ => to_string_representation(value).to_lowercase() == override_value,
    }
}

fn compare<T: PartialOrd + ?Sized>(lhs: &T, rhs: &T, operator: OperatorType) -> bool {
    match operator {
        OperatorType::Gt => lhs > rhs,
        OperatorType::Gte => lhs >= rhs,
        OperatorType::Lt => lhs < rhs,
        OperatorType::Lte => lhs <= rhs,
        _ => false,
    }
}

// :TRICKY: The type of the override value decides how we compare. A string override
// forces a string comparison even if both sides look numeric, so "10" > "9" is false.
fn compare_values(value: &Value, override_value: &Value, operator: OperatorType) -> bool {
    let string_comparison = || {
        compare(
            to_string_representation(override_value).as_str(),
            to_string_representation(value).as_str(),
            operator,
        )
    };

    let Some(parsed_value) = to_f64_representation(value) else {
        return string_comparison();
    };

    match override_value {
        Value::Number(number) => number
            .as_f64()
            .map_or(false, |number| compare(&number, &parsed_value, operator)),
        Value::Bool(flag) => compare(&f64::from(u8::from(*flag)), &parsed_value, operator),
        _ => string_comparison(),
    }
}

/// Absolute dates: strings in any format `dateparser` understands (UTC unless the
/// string says otherwise), numbers as milliseconds since the epoch.
fn parse_date_value(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(date_str) => DateTime::parse_from_rfc3339(date_str)
            .map(|date| date.with_timezone(&Utc))
            .ok()
            .or_else(|| dateparser::parse_with(date_str, &Utc, NaiveTime::default()).ok()),
        Value::Number(number) => {
            let millis = number
                .as_i64()
                .or_else(|| number.as_f64().map(|n| n.floor() as i64))?;
            DateTime::from_timestamp_millis(millis)
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use serde_json::json;
    use test_case::test_case;

    use super::*;
    use crate::properties::property_models::PropertyType;

    fn filter(key: &str, value: Value, operator: Option<OperatorType>) -> PropertyFilter {
        PropertyFilter {
            key: key.to_string(),
            value: Some(value),
            operator,
            prop_type: PropertyType::Person,
            negation: None,
            group_type_index: None,
        }
    }

    fn props(key: &str, value: Value) -> HashMap<String, Value> {
        HashMap::from([(key.to_string(), value)])
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2022, 5, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn test_match_properties_exact() {
        let property_a = filter("key", json!("value"), None);

        assert_eq!(match_property(&property_a, &props("key", json!("value"))), Ok(true));
        assert_eq!(match_property(&property_a, &props("key", json!("VALUE"))), Ok(true));
        assert_eq!(match_property(&property_a, &props("key", json!("value2"))), Ok(false));
        assert_eq!(match_property(&property_a, &props("key", json!(""))), Ok(false));
        assert_eq!(match_property(&property_a, &props("key", json!(null))), Ok(false));

        assert_eq!(
            match_property(&property_a, &props("key2", json!("value"))),
            Err(Inconclusive::MissingProperty("key".to_string()))
        );
        assert!(match_property(&property_a, &HashMap::new()).is_err());

        let property_b = filter(
            "key",
            json!(["value1", "value2", "value3"]),
            Some(OperatorType::Exact),
        );

        assert_eq!(match_property(&property_b, &props("key", json!("value1"))), Ok(true));
        assert_eq!(match_property(&property_b, &props("key", json!("Value3"))), Ok(true));
        assert_eq!(match_property(&property_b, &props("key", json!("value4"))), Ok(false));
        assert!(match_property(&property_b, &props("key2", json!("value1"))).is_err());
    }

    #[test]
    fn test_exact_match_on_plan_list_is_case_insensitive() {
        let plan = filter("plan", json!(["pro", "enterprise"]), Some(OperatorType::Exact));

        assert_eq!(match_property(&plan, &props("plan", json!("Pro"))), Ok(true));
        assert_eq!(match_property(&plan, &props("plan", json!("free"))), Ok(false));
    }

    #[test]
    fn test_exact_match_stringifies_non_strings() {
        let number = filter("age", json!(21), None);
        assert_eq!(match_property(&number, &props("age", json!("21"))), Ok(true));

        let boolean = filter("banned", json!(true), None);
        assert_eq!(match_property(&boolean, &props("banned", json!("True"))), Ok(true));
        assert_eq!(match_property(&boolean, &props("banned", json!(false))), Ok(false));

        let mixed_list = filter("id", json!([1, 2, 3]), None);
        assert_eq!(match_property(&mixed_list, &props("id", json!("2"))), Ok(true));
    }

    #[test]
    fn test_match_properties_is_not() {
        let property_a = filter("key", json!("value"), Some(OperatorType::IsNot));

        assert_eq!(match_property(&property_a, &props("key", json!("value2"))), Ok(true));
        assert_eq!(match_property(&property_a, &props("key", json!(""))), Ok(true));
        assert_eq!(match_property(&property_a, &props("key", json!(null))), Ok(true));
        assert_eq!(match_property(&property_a, &props("key", json!("Value"))), Ok(false));
        assert!(match_property(&property_a, &props("key2", json!("value1"))).is_err());

        let property_b = filter(
            "key",
            json!(["value1", "value2", "value3"]),
            Some(OperatorType::IsNot),
        );

        assert_eq!(match_property(&property_b, &props("key", json!("value4"))), Ok(true));
        assert_eq!(match_property(&property_b, &props("key", json!("value2"))), Ok(false));
    }

    #[test]
    fn test_match_properties_is_set() {
        let property_a = filter("key", json!("is_set"), Some(OperatorType::IsSet));

        assert_eq!(match_property(&property_a, &props("key", json!("value"))), Ok(true));
        assert_eq!(match_property(&property_a, &props("key", json!(""))), Ok(true));
        assert_eq!(match_property(&property_a, &props("key", json!(null))), Ok(true));
        assert_eq!(match_property(&property_a, &props("key2", json!("value"))), Ok(false));
        assert_eq!(match_property(&property_a, &HashMap::new()), Ok(false));
    }

    #[test]
    fn test_is_not_set_is_never_decided_locally() {
        let property_a = filter("key", json!("is_not_set"), Some(OperatorType::IsNotSet));

        assert_eq!(
            match_property(&property_a, &props("key", json!("value"))),
            Err(Inconclusive::UnsupportedOperator(OperatorType::IsNotSet))
        );
        assert!(match_property(&property_a, &HashMap::new()).is_err());
    }

    #[test]
    fn test_match_properties_icontains() {
        let property_a = filter("key", json!("valUe"), Some(OperatorType::Icontains));

        assert_eq!(match_property(&property_a, &props("key", json!("value"))), Ok(true));
        assert_eq!(match_property(&property_a, &props("key", json!("value2"))), Ok(true));
        assert_eq!(match_property(&property_a, &props("key", json!("vaLue4"))), Ok(true));
        assert_eq!(match_property(&property_a, &props("key", json!("343tfvalue5"))), Ok(true));
        assert_eq!(match_property(&property_a, &props("key", json!("Alakazam"))), Ok(false));
        assert_eq!(match_property(&property_a, &props("key", json!(123))), Ok(false));

        let property_b = filter("key", json!("3"), Some(OperatorType::Icontains));

        assert_eq!(match_property(&property_b, &props("key", json!("3"))), Ok(true));
        assert_eq!(match_property(&property_b, &props("key", json!(323))), Ok(true));
        assert_eq!(match_property(&property_b, &props("key", json!("val3"))), Ok(true));
        assert_eq!(match_property(&property_b, &props("key", json!("three"))), Ok(false));
    }

    #[test]
    fn test_match_properties_not_icontains() {
        let property_a = filter("key", json!("valUe"), Some(OperatorType::NotIcontains));

        assert_eq!(match_property(&property_a, &props("key", json!("VALUE2"))), Ok(false));
        assert_eq!(match_property(&property_a, &props("key", json!("Alakazam"))), Ok(true));
    }

    #[test]
    fn test_match_properties_regex() {
        let property_a = filter("key", json!(r"\.com$"), Some(OperatorType::Regex));

        assert_eq!(match_property(&property_a, &props("key", json!("value.com"))), Ok(true));
        assert_eq!(match_property(&property_a, &props("key", json!("value2.com"))), Ok(true));
        assert_eq!(match_property(&property_a, &props("key", json!(".com343tfvalue5"))), Ok(false));
        assert_eq!(match_property(&property_a, &props("key", json!("Alakazam"))), Ok(false));
        assert_eq!(match_property(&property_a, &props("key", json!(123))), Ok(false));

        let property_b = filter("key", json!("3"), Some(OperatorType::Regex));
        assert_eq!(match_property(&property_b, &props("key", json!("3"))), Ok(true));
        assert_eq!(match_property(&property_b, &props("key", json!(323))), Ok(true));
        assert_eq!(match_property(&property_b, &props("key", json!("val3"))), Ok(true));
        assert_eq!(match_property(&property_b, &props("key", json!("three"))), Ok(false));

        let property_c = filter("key", json!(r"4.com"), Some(OperatorType::NotRegex));
        assert_eq!(match_property(&property_c, &props("key", json!("value4.com"))), Ok(false));
        assert_eq!(match_property(&property_c, &props("key", json!("value5.com"))), Ok(true));
    }

    #[test]
    fn test_invalid_regex_never_matches() {
        let regex = filter("key", json!("?*"), Some(OperatorType::Regex));
        let not_regex = filter("key", json!("?*"), Some(OperatorType::NotRegex));

        assert_eq!(match_property(&regex, &props("key", json!("value"))), Ok(false));
        assert_eq!(match_property(&not_regex, &props("key", json!("value"))), Ok(false));
    }

    #[test]
    fn test_match_properties_math_operators() {
        let property_a = filter("key", json!(1), Some(OperatorType::Gt));

        assert_eq!(match_property(&property_a, &props("key", json!(2))), Ok(true));
        assert_eq!(match_property(&property_a, &props("key", json!(3))), Ok(true));
        assert_eq!(match_property(&property_a, &props("key", json!(0))), Ok(false));
        assert_eq!(match_property(&property_a, &props("key", json!(-1))), Ok(false));
        // string overrides compare as strings
        assert_eq!(match_property(&property_a, &props("key", json!("23"))), Ok(true));

        let property_b = filter("key", json!(1), Some(OperatorType::Lt));

        assert_eq!(match_property(&property_b, &props("key", json!(0))), Ok(true));
        assert_eq!(match_property(&property_b, &props("key", json!(-1))), Ok(true));
        assert_eq!(match_property(&property_b, &props("key", json!(-3))), Ok(true));
        assert_eq!(match_property(&property_b, &props("key", json!(1))), Ok(false));
        assert_eq!(match_property(&property_b, &props("key", json!("1"))), Ok(false));
        assert_eq!(match_property(&property_b, &props("key", json!("3"))), Ok(false));

        let property_c = filter("key", json!(3), Some(OperatorType::Gte));

        assert_eq!(match_property(&property_c, &props("key", json!(3))), Ok(true));
        assert_eq!(match_property(&property_c, &props("key", json!(3.1))), Ok(true));
        assert_eq!(match_property(&property_c, &props("key", json!(2))), Ok(false));

        let property_d = filter("key", json!("43"), Some(OperatorType::Lte));

        assert_eq!(match_property(&property_d, &props("key", json!(0))), Ok(true));
        assert_eq!(match_property(&property_d, &props("key", json!(43))), Ok(true));
        assert_eq!(match_property(&property_d, &props("key", json!(44))), Ok(false));
        assert_eq!(match_property(&property_d, &props("key", json!("44"))), Ok(false));
        assert_eq!(match_property(&property_d, &props("key", json!("42"))), Ok(true));
    }

    #[test]
    fn test_string_override_forces_string_comparison() {
        // Numerically 10 > 9, but the override is a string so this compares "10" with "9"
        let greater_than_nine = filter("key", json!("9"), Some(OperatorType::Gt));

        assert_eq!(match_property(&greater_than_nine, &props("key", json!("10"))), Ok(false));
        assert_eq!(match_property(&greater_than_nine, &props("key", json!(10))), Ok(true));
    }

    #[test]
    fn test_non_numeric_filter_value_compares_as_strings() {
        let property_a = filter("key", json!("bcd"), Some(OperatorType::Gt));

        assert_eq!(match_property(&property_a, &props("key", json!("xyz"))), Ok(true));
        assert_eq!(match_property(&property_a, &props("key", json!("abc"))), Ok(false));

        let property_b = filter("key", json!("bcd"), Some(OperatorType::Lte));
        assert_eq!(match_property(&property_b, &props("key", json!("bcd"))), Ok(true));
    }

    #[test]
    fn test_boolean_override_compares_as_number() {
        let property_a = filter("key", json!(0), Some(OperatorType::Gt));

        assert_eq!(match_property(&property_a, &props("key", json!(true))), Ok(true));
        assert_eq!(match_property(&property_a, &props("key", json!(false))), Ok(false));
    }

    #[test]
    fn test_match_properties_date_operators() {
        let before = filter("key", json!("2022-05-01"), Some(OperatorType::IsDateBefore));

        assert_eq!(
            match_property_at(&before, &props("key", json!("2022-03-01")), now()),
            Ok(true)
        );
        assert_eq!(
            match_property_at(&before, &props("key", json!("2022-04-30T23:59:59Z")), now()),
            Ok(true)
        );
        assert_eq!(
            match_property_at(&before, &props("key", json!("2022-05-01T00:00:01+00:00")), now()),
            Ok(false)
        );
        assert_eq!(
            match_property_at(&before, &props("key", json!("2022-05-30")), now()),
            Ok(false)
        );

        let after = filter("key", json!("2022-05-01"), Some(OperatorType::IsDateAfter));

        assert_eq!(
            match_property_at(&after, &props("key", json!("2022-05-30")), now()),
            Ok(true)
        );
        assert_eq!(
            match_property_at(&after, &props("key", json!("2022-04-30")), now()),
            Ok(false)
        );
        // epoch milliseconds for 2022-06-01T00:00:00Z
        assert_eq!(
            match_property_at(&after, &props("key", json!(1_654_041_600_000_i64)), now()),
            Ok(true)
        );
    }

    #[test]
    fn test_match_properties_relative_dates() {
        let within_last_week = filter("key", json!("-7d"), Some(OperatorType::IsDateAfter));

        assert_eq!(
            match_property_at(&within_last_week, &props("key", json!("2022-04-28")), now()),
            Ok(true)
        );
        assert_eq!(
            match_property_at(&within_last_week, &props("key", json!("2022-04-20")), now()),
            Ok(false)
        );

        let older_than_a_year = filter("key", json!("1y"), Some(OperatorType::IsDateBefore));

        assert_eq!(
            match_property_at(&older_than_a_year, &props("key", json!("2021-04-30")), now()),
            Ok(true)
        );
        assert_eq!(
            match_property_at(&older_than_a_year, &props("key", json!("2021-05-02")), now()),
            Ok(false)
        );
    }

    #[test_case(json!("not a date"), json!("2022-05-01") ; "invalid filter value")]
    #[test_case(json!("12345d"), json!("2022-05-01") ; "relative number too large")]
    #[test_case(json!("2022-05-01"), json!("garbage") ; "invalid override value")]
    #[test_case(json!("2022-05-01"), json!(true) ; "non date override value")]
    fn test_unparseable_dates_are_inconclusive(value: Value, override_value: Value) {
        let property = filter("key", value, Some(OperatorType::IsDateBefore));

        assert!(matches!(
            match_property_at(&property, &props("key", override_value), now()),
            Err(Inconclusive::InvalidDate(_))
        ));
    }

    #[test]
    fn test_unknown_operator_is_inconclusive() {
        let property: PropertyFilter = serde_json::from_value(json!({
            "key": "key",
            "value": "value",
            "operator": "is_cleared_for_launch",
            "type": "person"
        }))
        .expect("unknown operators still deserialize");

        assert_eq!(property.operator, Some(OperatorType::Unknown));
        assert_eq!(
            match_property(&property, &props("key", json!("value"))),
            Err(Inconclusive::UnsupportedOperator(OperatorType::Unknown))
        );
    }

    #[test]
    fn test_missing_filter_value_is_null() {
        let property: PropertyFilter =
            serde_json::from_value(json!({"key": "key", "operator": "exact", "type": "person"}))
                .expect("value is optional");

        assert_eq!(match_property(&property, &props("key", json!(null))), Ok(true));
        assert_eq!(match_property(&property, &props("key", json!("value"))), Ok(false));
    }
}
