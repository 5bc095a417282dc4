use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use serde_json::Value;
use tokio::sync::mpsc::UnboundedSender;
use tracing::instrument;

use crate::api::errors::FlagError;
use crate::api::types::{AllFlagsAndPayloads, FlagValue, MatchResult, PayloadLookup};
use crate::client::{Client, HttpClient};
use crate::config::Config;
use crate::definitions::{DefinitionCache, DefinitionSnapshot};
use crate::flags::evaluation_context::EvaluationContext;
use crate::flags::flag_matching::FeatureFlagMatcher;
use crate::flags::flag_models::FeatureFlag;
use crate::metrics_consts::INCONCLUSIVE_EVALUATION_COUNTER;
use crate::properties::property_matching::Inconclusive;

/// Evaluates feature flags without a round trip to PostHog.
///
/// Definitions are polled in the background. Anything that can't be decided locally
/// comes back as `MatchResult::Unavailable` or with `fallback_to_remote` set, and
/// the caller should ask the flags API instead.
pub struct LocalEvaluator {
    cache: Arc<DefinitionCache>,
}

impl LocalEvaluator {
    /// Starts polling right away, so this must be called within a tokio runtime.
    pub fn new(
        client: Arc<dyn Client + Send + Sync>,
        polling_interval: Duration,
        errors: Option<UnboundedSender<FlagError>>,
    ) -> LocalEvaluator {
        let cache = Arc::new(DefinitionCache::new(client, errors));
        cache.spawn_poller(polling_interval);

        LocalEvaluator { cache }
    }

    pub fn from_config(
        config: &Config,
        custom_headers: &HashMap<String, String>,
        errors: Option<UnboundedSender<FlagError>>,
    ) -> Result<LocalEvaluator, FlagError> {
        let client = HttpClient::from_config(config, custom_headers)?;

        Ok(LocalEvaluator::new(
            Arc::new(client),
            config.polling_interval.0,
            errors,
        ))
    }

    pub fn has_loaded_successfully_once(&self) -> bool {
        self.cache.has_loaded_successfully_once()
    }

    /// The definitions to evaluate against, or nothing if none were ever loaded.
    async fn loaded_snapshot(&self) -> Option<Arc<DefinitionSnapshot>> {
        self.cache.load_feature_flags(false).await;

        if !self.cache.has_loaded_successfully_once() {
            return None;
        }
        Some(self.cache.snapshot().await)
    }

    #[instrument(skip_all, fields(flag_key = %key))]
    pub async fn get_feature_flag(&self, key: &str, context: &EvaluationContext) -> MatchResult {
        let Some(snapshot) = self.loaded_snapshot().await else {
            tracing::debug!("flag definitions are not loaded yet");
            return MatchResult::Unavailable;
        };

        let Some(flag) = snapshot.get_flag(key) else {
            tracing::debug!("flag is not in the local definitions");
            return MatchResult::Unavailable;
        };

        let matcher = FeatureFlagMatcher::new(&snapshot.cohorts, &snapshot.group_type_mapping);
        match evaluate_locally(&matcher, flag, context) {
            Ok(value) => MatchResult::from(value),
            Err(_) => MatchResult::Unavailable,
        }
    }

    /// Whether the flag is on. `None` when it couldn't be decided locally.
    pub async fn is_feature_enabled(&self, key: &str, context: &EvaluationContext) -> Option<bool> {
        self.get_feature_flag(key, context)
            .await
            .to_flag_value()
            .map(|value| value.is_truthy())
    }

    /// The payload for an already resolved match value of a flag.
    pub async fn get_feature_flag_payload(&self, key: &str, match_value: &FlagValue) -> PayloadLookup {
        let Some(snapshot) = self.loaded_snapshot().await else {
            return PayloadLookup::Unavailable;
        };

        match snapshot.get_flag(key) {
            Some(flag) => lookup_payload(flag, match_value),
            None => PayloadLookup::Unavailable,
        }
    }

    #[instrument(skip_all)]
    pub async fn get_all_flags_and_payloads(&self, context: &EvaluationContext) -> AllFlagsAndPayloads {
        self.evaluate_all(context, true).await
    }

    /// Same as `get_all_flags_and_payloads`, without looking up payloads.
    #[instrument(skip_all)]
    pub async fn get_all_flags(&self, context: &EvaluationContext) -> AllFlagsAndPayloads {
        self.evaluate_all(context, false).await
    }

    async fn evaluate_all(&self, context: &EvaluationContext, with_payloads: bool) -> AllFlagsAndPayloads {
        let Some(snapshot) = self.loaded_snapshot().await else {
            return AllFlagsAndPayloads {
                fallback_to_remote: true,
                ..Default::default()
            };
        };

        let matcher = FeatureFlagMatcher::new(&snapshot.cohorts, &snapshot.group_type_mapping);
        let mut result = AllFlagsAndPayloads {
            fallback_to_remote: snapshot.is_empty() || snapshot.has_skipped_flags(),
            ..Default::default()
        };

        for flag in snapshot.flags() {
            let value = match evaluate_locally(&matcher, flag, context) {
                Ok(value) => value,
                Err(_) => {
                    result.fallback_to_remote = true;
                    continue;
                }
            };

            if with_payloads {
                if let PayloadLookup::Payload(payload) = lookup_payload(flag, &value) {
                    result.payloads.insert(flag.key.clone(), payload);
                }
            }
            result.flags.insert(flag.key.clone(), value);
        }

        result
    }

    /// Fetches definitions now, regardless of the polling schedule.
    pub async fn force_reload(&self) {
        self.cache.load_feature_flags(true).await;
    }

    /// Stops polling. Already loaded definitions stay usable.
    pub fn stop(&self) {
        self.cache.stop();
    }
}

fn evaluate_locally(
    matcher: &FeatureFlagMatcher<'_>,
    flag: &FeatureFlag,
    context: &EvaluationContext,
) -> Result<FlagValue, Inconclusive> {
    let result = matcher.evaluate(flag, context);

    match &result {
        Ok(value) => {
            tracing::debug!(flag_key = %flag.key, ?value, "successfully computed flag locally");
        }
        Err(e) => {
            counter!(INCONCLUSIVE_EVALUATION_COUNTER).increment(1);
            tracing::debug!(flag_key = %flag.key, "can't compute flag locally: {}", e);
        }
    }
    result
}

/// Payloads are usually stored as JSON encoded strings. Strings that don't parse
/// are served as they are.
fn lookup_payload(flag: &FeatureFlag, match_value: &FlagValue) -> PayloadLookup {
    match flag.get_payload(&match_value.payload_key()) {
        None => PayloadLookup::NoPayload,
        Some(Value::String(raw)) => PayloadLookup::Payload(
            serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.clone())),
        ),
        Some(payload) => PayloadLookup::Payload(payload.clone()),
    }
}
