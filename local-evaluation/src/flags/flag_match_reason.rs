use std::cmp::Ordering;
use std::fmt;

/// Why a flag evaluated the way it did. Ordered by how strongly the reason
/// indicates a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeatureFlagMatchReason {
    ConditionMatch,
    NoConditionMatch,
    OutOfRolloutBound,
    NoGroupType,
    FlagDisabled,
}

impl FeatureFlagMatchReason {
    pub fn score(&self) -> i32 {
        match self {
            FeatureFlagMatchReason::ConditionMatch => 3,
            FeatureFlagMatchReason::NoGroupType => 2,
            FeatureFlagMatchReason::OutOfRolloutBound => 1,
            FeatureFlagMatchReason::NoConditionMatch => 0,
            FeatureFlagMatchReason::FlagDisabled => 0,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FeatureFlagMatchReason::ConditionMatch => "condition_match",
            FeatureFlagMatchReason::NoConditionMatch => "no_condition_match",
            FeatureFlagMatchReason::OutOfRolloutBound => "out_of_rollout_bound",
            FeatureFlagMatchReason::NoGroupType => "no_group_type",
            FeatureFlagMatchReason::FlagDisabled => "flag_disabled",
        }
    }
}

impl PartialOrd for FeatureFlagMatchReason {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for FeatureFlagMatchReason {
    fn cmp(&self, other: &Self) -> Ordering {
        self.score().cmp(&other.score())
    }
}

impl fmt::Display for FeatureFlagMatchReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
