use std::collections::HashMap;

use once_cell::sync::Lazy;
use serde_json::Value;

static NO_PROPERTIES: Lazy<HashMap<String, Value>> = Lazy::new(HashMap::new);

/// Everything known about the caller when evaluating flags: the person, the groups
/// they belong to (group type name to group key) and property bags for both.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EvaluationContext {
    pub distinct_id: String,
    pub groups: HashMap<String, String>,
    pub person_properties: HashMap<String, Value>,
    pub group_properties: HashMap<String, HashMap<String, Value>>,
}

impl EvaluationContext {
    pub fn new(distinct_id: impl Into<String>) -> Self {
        EvaluationContext {
            distinct_id: distinct_id.into(),
            ..Default::default()
        }
    }

    pub fn with_groups(mut self, groups: HashMap<String, String>) -> Self {
        self.groups = groups;
        self
    }

    pub fn with_person_properties(mut self, person_properties: HashMap<String, Value>) -> Self {
        self.person_properties = person_properties;
        self
    }

    pub fn with_group_properties(
        mut self,
        group_properties: HashMap<String, HashMap<String, Value>>,
    ) -> Self {
        self.group_properties = group_properties;
        self
    }

    /// Adds `distinct_id` to the person properties and `$group_key` to each group's
    /// properties. Values passed in by the caller win.
    pub fn with_default_properties(mut self) -> Self {
        self.person_properties
            .entry("distinct_id".to_string())
            .or_insert_with(|| Value::String(self.distinct_id.clone()));

        for (group_type, group_key) in &self.groups {
            self.group_properties
                .entry(group_type.clone())
                .or_default()
                .entry("$group_key".to_string())
                .or_insert_with(|| Value::String(group_key.clone()));
        }
        self
    }

    pub fn person(&self) -> Identity<'_> {
        Identity::Person {
            distinct_id: &self.distinct_id,
            properties: &self.person_properties,
        }
    }

    /// The group identity for a group type, if the caller passed a key for it.
    pub fn group(&self, group_type: &str) -> Option<Identity<'_>> {
        let (group_type, group_key) = self.groups.get_key_value(group_type)?;

        Some(Identity::Group {
            group_type,
            group_key,
            properties: self
                .group_properties
                .get(group_type)
                .unwrap_or(&*NO_PROPERTIES),
        })
    }
}

/// Who a flag is evaluated for. Person flags bucket on the distinct id, group flags
/// on the group key.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Identity<'a> {
    Person {
        distinct_id: &'a str,
        properties: &'a HashMap<String, Value>,
    },
    Group {
        group_type: &'a str,
        group_key: &'a str,
        properties: &'a HashMap<String, Value>,
    },
}

impl<'a> Identity<'a> {
    pub fn hashed_identifier(&self) -> &'a str {
        match *self {
            Identity::Person { distinct_id, .. } => distinct_id,
            Identity::Group { group_key, .. } => group_key,
        }
    }

    pub fn properties(&self) -> &'a HashMap<String, Value> {
        match *self {
            Identity::Person { properties, .. } | Identity::Group { properties, .. } => properties,
        }
    }
}
