use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::cohorts::cohort_models::{
    CohortDefinitions, CohortId, PropertyGroup, PropertyGroupType, PropertyGroupValue,
};
use crate::properties::property_matching::{
    match_property_at, to_string_representation, Inconclusive,
};
use crate::properties::property_models::PropertyFilter;

/// Matches cohort filters for one set of properties.
///
/// Cohorts may reference other cohorts, so the matcher tracks the cohorts it is
/// currently inside of. Reaching one of them again is a cycle and can't be decided.
pub struct CohortMatcher<'a> {
    properties: &'a HashMap<String, Value>,
    cohorts: &'a CohortDefinitions,
    now: DateTime<Utc>,
    evaluating: HashSet<CohortId>,
}

impl<'a> CohortMatcher<'a> {
    pub fn new(
        properties: &'a HashMap<String, Value>,
        cohorts: &'a CohortDefinitions,
        now: DateTime<Utc>,
    ) -> Self {
        CohortMatcher {
            properties,
            cohorts,
            now,
            evaluating: HashSet::new(),
        }
    }

    /// Matches any filter, dispatching cohort filters to their definitions.
    pub fn match_filter(&mut self, filter: &PropertyFilter) -> Result<bool, Inconclusive> {
        if filter.is_cohort() {
            self.match_cohort(filter)
        } else {
            match_property_at(filter, self.properties, self.now)
        }
    }

    pub fn match_cohort(&mut self, filter: &PropertyFilter) -> Result<bool, Inconclusive> {
        let cohort_id = to_string_representation(filter.value.as_ref().unwrap_or(&Value::Null));

        let cohorts = self.cohorts;
        let definition = match cohorts.get(&cohort_id) {
            Some(definition) => definition,
            None => return Err(Inconclusive::UnknownCohort(cohort_id)),
        };
        let Some(group) = definition else {
            return Ok(true);
        };

        if !self.evaluating.insert(cohort_id.clone()) {
            tracing::warn!(cohort_id, "cohort references itself, can't match locally");
            return Err(Inconclusive::CohortCycle(cohort_id));
        }
        let result = self.match_property_group(group);
        self.evaluating.remove(&cohort_id);

        result
    }

    /// Evaluates every member before giving up on an inconclusive one, so a later
    /// decisive member can still settle the group.
    pub fn match_property_group(&mut self, group: &PropertyGroup) -> Result<bool, Inconclusive> {
        // empty groups are no-ops, always match
        if group.values.is_empty() {
            return Ok(true);
        }

        let mut inconclusive = None;

        for value in &group.values {
            let result = match value {
                PropertyGroupValue::Group(inner) => {
                    self.match_property_group(inner).map(|matches| (matches, false))
                }
                PropertyGroupValue::Filter(filter) => self
                    .match_filter(filter)
                    .map(|matches| (matches, filter.is_negated())),
            };

            match result {
                Ok((matches, negation)) => match group.group_type {
                    // unmatched, or matched but negated
                    PropertyGroupType::And if matches == negation => return Ok(false),
                    PropertyGroupType::Or if matches != negation => return Ok(true),
                    _ => {}
                },
                Err(e) => {
                    tracing::debug!("failed to compute property group member locally: {}", e);
                    inconclusive.get_or_insert(e);
                }
            }
        }

        match inconclusive {
            Some(e) => Err(e),
            // all matched in the AND case, none matched in the OR case
            None => Ok(group.group_type == PropertyGroupType::And),
        }
    }
}

pub fn match_cohort(
    filter: &PropertyFilter,
    properties: &HashMap<String, Value>,
    cohorts: &CohortDefinitions,
) -> Result<bool, Inconclusive> {
    CohortMatcher::new(properties, cohorts, Utc::now()).match_cohort(filter)
}

pub fn match_property_group(
    group: &PropertyGroup,
    properties: &HashMap<String, Value>,
    cohorts: &CohortDefinitions,
) -> Result<bool, Inconclusive> {
    CohortMatcher::new(properties, cohorts, Utc::now()).match_property_group(group)
}
