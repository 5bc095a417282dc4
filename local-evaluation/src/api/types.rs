use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(untagged)]
pub enum FlagValue {
    Boolean(bool),
    String(String),
}

impl FlagValue {
    /// Variants are truthy, booleans are themselves.
    pub fn is_truthy(&self) -> bool {
        match self {
            FlagValue::Boolean(value) => *value,
            FlagValue::String(_) => true,
        }
    }

    /// The key payloads are stored under for this value.
    pub fn payload_key(&self) -> String {
        match self {
            FlagValue::Boolean(value) => value.to_string(),
            FlagValue::String(variant) => variant.clone(),
        }
    }
}

impl From<bool> for FlagValue {
    fn from(value: bool) -> Self {
        FlagValue::Boolean(value)
    }
}

/// Result of a single flag lookup.
///
/// `Unavailable` covers everything that stops the flag from being decided locally:
/// definitions not loaded yet, an unknown key, or an inconclusive evaluation.
/// Callers should ask the remote service in that case.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchResult {
    Unavailable,
    False,
    True,
    Variant(String),
}

impl MatchResult {
    pub fn is_available(&self) -> bool {
        !matches!(self, MatchResult::Unavailable)
    }

    pub fn to_flag_value(&self) -> Option<FlagValue> {
        match self {
            MatchResult::Unavailable => None,
            MatchResult::False => Some(FlagValue::Boolean(false)),
            MatchResult::True => Some(FlagValue::Boolean(true)),
            MatchResult::Variant(variant) => Some(FlagValue::String(variant.clone())),
        }
    }
}

impl From<FlagValue> for MatchResult {
    fn from(value: FlagValue) -> Self {
        match value {
            FlagValue::Boolean(true) => MatchResult::True,
            FlagValue::Boolean(false) => MatchResult::False,
            FlagValue::String(variant) => MatchResult::Variant(variant),
        }
    }
}

/// Result of a payload lookup. `NoPayload` means the flag was found but nothing is
/// attached to the given match value, which is not the same as being unable to look.
#[derive(Debug, Clone, PartialEq)]
pub enum PayloadLookup {
    Unavailable,
    NoPayload,
    Payload(Value),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AllFlagsAndPayloads {
    pub flags: HashMap<String, FlagValue>,
    pub payloads: HashMap<String, Value>,
    /// Set when the snapshot was empty or at least one flag could not be decided locally.
    pub fallback_to_remote: bool,
}

impl AllFlagsAndPayloads {
    /// Folds in a response from the remote service. Remote values replace local ones
    /// with the same key.
    pub fn merge_remote(
        mut self,
        remote_flags: HashMap<String, FlagValue>,
        remote_payloads: HashMap<String, Value>,
    ) -> Self {
        self.flags.extend(remote_flags);
        self.payloads.extend(remote_payloads);
        self
    }
}
