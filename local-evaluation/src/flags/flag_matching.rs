use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::api::types::FlagValue;
use crate::cohorts::cohort_matching::CohortMatcher;
use crate::cohorts::cohort_models::CohortDefinitions;
use crate::flags::evaluation_context::{EvaluationContext, Identity};
use crate::flags::flag_match_reason::FeatureFlagMatchReason;
use crate::flags::flag_matching_utils::{calculate_hash, VARIANT_SALT};
use crate::flags::flag_models::{FeatureFlag, FlagPropertyGroup};
use crate::properties::property_matching::Inconclusive;

/// Group type index (as sent by the API, stringified) to group type name.
pub type GroupTypeMapping = HashMap<String, String>;

#[derive(Debug, Clone, PartialEq)]
pub struct FeatureFlagMatch {
    pub matches: bool,
    pub variant: Option<String>,
    pub reason: FeatureFlagMatchReason,
    /// Index of the deciding condition in the flag's declared order.
    pub condition_index: Option<usize>,
}

impl FeatureFlagMatch {
    fn no_match(reason: FeatureFlagMatchReason, condition_index: Option<usize>) -> Self {
        FeatureFlagMatch {
            matches: false,
            variant: None,
            reason,
            condition_index,
        }
    }

    pub fn to_flag_value(&self) -> FlagValue {
        match (self.matches, &self.variant) {
            (true, Some(variant)) => FlagValue::String(variant.clone()),
            (matches, _) => FlagValue::Boolean(matches),
        }
    }
}

/// One slot of the multivariate table: the variant owns hashes in `[value_min, value_max)`.
#[derive(Debug, Clone, PartialEq)]
pub struct VariantRange {
    pub value_min: f64,
    pub value_max: f64,
    pub key: String,
}

pub fn variant_lookup_table(flag: &FeatureFlag) -> Vec<VariantRange> {
    let mut lookup_table = Vec::with_capacity(flag.get_variants().len());
    let mut value_min = 0.0;

    for variant in flag.get_variants() {
        let value_max = value_min + variant.rollout_percentage / 100.0;
        lookup_table.push(VariantRange {
            value_min,
            value_max,
            key: variant.key.clone(),
        });
        value_min = value_max;
    }
    lookup_table
}

/// The variant whose range contains `hash`. Nothing when the percentages add up to
/// less than 100 and the hash lands past the last range.
pub fn lookup_variant(lookup_table: &[VariantRange], hash: f64) -> Option<&str> {
    lookup_table
        .iter()
        .find(|range| range.value_min <= hash && hash < range.value_max)
        .map(|range| range.key.as_str())
}

/// Evaluates flags against one snapshot of cohorts and group types.
///
/// Evaluation never blocks and never mutates the snapshot, so the same matcher can be
/// used for every flag in a batch.
pub struct FeatureFlagMatcher<'a> {
    cohorts: &'a CohortDefinitions,
    group_type_mapping: &'a GroupTypeMapping,
    now: DateTime<Utc>,
}

impl<'a> FeatureFlagMatcher<'a> {
    pub fn new(cohorts: &'a CohortDefinitions, group_type_mapping: &'a GroupTypeMapping) -> Self {
        FeatureFlagMatcher {
            cohorts,
            group_type_mapping,
            now: Utc::now(),
        }
    }

    /// Pins the clock used for relative date filters.
    pub fn with_now(mut self, now: DateTime<Utc>) -> Self {
        self.now = now;
        self
    }

    pub fn evaluate(
        &self,
        flag: &FeatureFlag,
        context: &EvaluationContext,
    ) -> Result<FlagValue, Inconclusive> {
        self.get_match(flag, context)
            .map(|flag_match| flag_match.to_flag_value())
    }

    pub fn get_match(
        &self,
        flag: &FeatureFlag,
        context: &EvaluationContext,
    ) -> Result<FeatureFlagMatch, Inconclusive> {
        if flag.ensure_experience_continuity {
            return Err(Inconclusive::ExperienceContinuity);
        }

        if !flag.active {
            return Ok(FeatureFlagMatch::no_match(
                FeatureFlagMatchReason::FlagDisabled,
                None,
            ));
        }

        let identity = match flag.get_group_type_index() {
            Some(group_type_index) => {
                let group_type = self
                    .group_type_mapping
                    .get(&group_type_index.to_string())
                    .ok_or(Inconclusive::UnknownGroupTypeIndex(group_type_index))?;

                match context.group(group_type) {
                    Some(identity) => identity,
                    None => {
                        tracing::debug!(
                            flag_key = %flag.key,
                            group_type = %group_type,
                            "no group of the flag's type passed in, flag is not applicable"
                        );
                        return Ok(FeatureFlagMatch::no_match(
                            FeatureFlagMatchReason::NoGroupType,
                            None,
                        ));
                    }
                }
            }
            None => context.person(),
        };

        self.match_conditions(flag, identity)
    }

    fn match_conditions(
        &self,
        flag: &FeatureFlag,
        identity: Identity<'_>,
    ) -> Result<FeatureFlagMatch, Inconclusive> {
        // Stable sort keeps the declared order within both partitions
        let mut conditions: Vec<(usize, &FlagPropertyGroup)> =
            flag.get_conditions().iter().enumerate().collect();
        conditions.sort_by_key(|(_, condition)| !condition.has_variant_override());

        let mut highest_match = FeatureFlagMatchReason::NoConditionMatch;
        let mut highest_index = None;
        let mut is_inconclusive = false;

        for (index, condition) in conditions {
            let reason = match self.is_condition_match(flag, condition, identity) {
                Ok(reason) => reason,
                Err(e) => {
                    tracing::debug!(flag_key = %flag.key, index, "condition is inconclusive: {}", e);
                    is_inconclusive = true;
                    continue;
                }
            };

            if reason == FeatureFlagMatchReason::ConditionMatch {
                let variant = condition
                    .variant
                    .as_deref()
                    .filter(|variant| flag.has_variant(variant))
                    .map(str::to_string)
                    .or_else(|| self.get_matching_variant(flag, identity));

                return Ok(FeatureFlagMatch {
                    matches: true,
                    variant,
                    reason,
                    condition_index: Some(index),
                });
            }

            if reason > highest_match {
                highest_match = reason;
                highest_index = Some(index);
            }
        }

        if is_inconclusive {
            return Err(Inconclusive::NoConditionDecided);
        }

        Ok(FeatureFlagMatch::no_match(highest_match, highest_index))
    }

    /// All properties of a condition must match. A property that can't be decided only
    /// makes the condition inconclusive if no other property already rules it out.
    ///
    /// This deliberately goes further than PostHog's other SDKs, which give up on the
    /// first undecided property. A condition with a missing `email` and a failing `plan`
    /// is a local `false` here rather than a fallback to the remote API.
    fn is_condition_match(
        &self,
        flag: &FeatureFlag,
        condition: &FlagPropertyGroup,
        identity: Identity<'_>,
    ) -> Result<FeatureFlagMatchReason, Inconclusive> {
        let mut matcher = CohortMatcher::new(identity.properties(), self.cohorts, self.now);
        let mut inconclusive = None;

        for property in condition.properties.iter().flatten() {
            match matcher.match_filter(property) {
                Ok(true) => {}
                Ok(false) => return Ok(FeatureFlagMatchReason::NoConditionMatch),
                Err(e) => {
                    inconclusive.get_or_insert(e);
                }
            }
        }

        if let Some(e) = inconclusive {
            return Err(e);
        }

        if let Some(rollout_percentage) = condition.rollout_percentage {
            let hash = calculate_hash(&flag.key, identity.hashed_identifier(), "");
            if hash > rollout_percentage / 100.0 {
                return Ok(FeatureFlagMatchReason::OutOfRolloutBound);
            }
        }

        Ok(FeatureFlagMatchReason::ConditionMatch)
    }

    fn get_matching_variant(&self, flag: &FeatureFlag, identity: Identity<'_>) -> Option<String> {
        let hash = calculate_hash(&flag.key, identity.hashed_identifier(), VARIANT_SALT);
        lookup_variant(&variant_lookup_table(flag), hash).map(str::to_string)
    }
}
