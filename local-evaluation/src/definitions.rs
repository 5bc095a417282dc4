use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::Duration;

use metrics::{counter, gauge};
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::{mpsc::UnboundedSender, Notify, RwLock};
use tokio::task::JoinHandle;
use tracing::instrument;

use crate::api::errors::FlagError;
use crate::client::Client;
use crate::cohorts::cohort_models::{CohortDefinitions, CohortId};
use crate::flags::flag_matching::GroupTypeMapping;
use crate::flags::flag_models::FeatureFlag;
use crate::metrics_consts::{
    DEFINITIONS_REFRESH_COUNTER, LOADED_FLAGS_GAUGE, SKIPPED_DEFINITIONS_COUNTER,
};

// Flags and cohorts are parsed one at a time in `from_response_body`
#[derive(Debug, Deserialize)]
struct LocalEvaluationResponse {
    flags: Vec<Value>,
    #[serde(default)]
    group_type_mapping: GroupTypeMapping,
    #[serde(default)]
    cohorts: HashMap<CohortId, Value>,
}

/// Flags, group types and cohorts from a single fetch. Never mutated once built,
/// only replaced as a whole.
#[derive(Debug, Default)]
pub struct DefinitionSnapshot {
    flags: Vec<FeatureFlag>,
    flags_by_key: HashMap<String, usize>,
    skipped_flags: usize,
    pub group_type_mapping: GroupTypeMapping,
    pub cohorts: CohortDefinitions,
}

impl DefinitionSnapshot {
    pub fn new(
        flags: Vec<FeatureFlag>,
        group_type_mapping: GroupTypeMapping,
        cohorts: CohortDefinitions,
    ) -> Self {
        let flags_by_key = flags
            .iter()
            .enumerate()
            .map(|(index, flag)| (flag.key.clone(), index))
            .collect();

        DefinitionSnapshot {
            flags,
            flags_by_key,
            skipped_flags: 0,
            group_type_mapping,
            cohorts,
        }
    }

    /// Parses the body of a successful definitions response. A body without a
    /// `flags` list is malformed. Flags and cohorts that don't parse are skipped:
    /// evaluating a skipped flag, or one that references a skipped cohort, can't be
    /// decided locally.
    pub fn from_response_body(body: Value) -> Result<Self, FlagError> {
        let response: LocalEvaluationResponse = serde_json::from_value(body)
            .map_err(|e| FlagError::MalformedResponse(e.to_string()))?;

        let received = response.flags.len();
        let flags: Vec<FeatureFlag> = response
            .flags
            .into_iter()
            .filter_map(|raw| match serde_json::from_value::<FeatureFlag>(raw) {
                Ok(flag) => Some(flag),
                Err(e) => {
                    counter!(SKIPPED_DEFINITIONS_COUNTER, "kind" => "flag").increment(1);
                    tracing::warn!("skipping flag definition that failed to parse: {}", e);
                    None
                }
            })
            .collect();

        let cohorts: CohortDefinitions = response
            .cohorts
            .into_iter()
            .filter_map(|(id, raw)| match serde_json::from_value(raw) {
                Ok(definition) => Some((id, definition)),
                Err(e) => {
                    counter!(SKIPPED_DEFINITIONS_COUNTER, "kind" => "cohort").increment(1);
                    tracing::warn!(cohort_id = %id, "skipping cohort definition that failed to parse: {}", e);
                    None
                }
            })
            .collect();

        let skipped_flags = received - flags.len();
        Ok(DefinitionSnapshot {
            skipped_flags,
            ..DefinitionSnapshot::new(flags, response.group_type_mapping, cohorts)
        })
    }

    pub fn flags(&self) -> &[FeatureFlag] {
        &self.flags
    }

    pub fn get_flag(&self, key: &str) -> Option<&FeatureFlag> {
        self.flags_by_key.get(key).map(|&index| &self.flags[index])
    }

    pub fn is_empty(&self) -> bool {
        self.flags.is_empty()
    }

    /// Whether the response carried flags that couldn't be parsed.
    pub fn has_skipped_flags(&self) -> bool {
        self.skipped_flags > 0
    }
}

/// Holds the current snapshot and keeps it fresh.
///
/// A background task refreshes the snapshot every polling interval. Failed refreshes
/// keep the previous snapshot, so readers see stale definitions rather than none.
/// Readers clone the `Arc` and evaluate without holding any lock.
pub struct DefinitionCache {
    client: Arc<dyn Client + Send + Sync>,
    snapshot: RwLock<Arc<DefinitionSnapshot>>,
    loaded_successfully_once: AtomicBool,
    refresh_lock: tokio::sync::Mutex<()>,
    errors: Option<UnboundedSender<FlagError>>,
    poller: Mutex<Option<JoinHandle<()>>>,
    forced_reload: Arc<Notify>,
}

impl DefinitionCache {
    pub fn new(
        client: Arc<dyn Client + Send + Sync>,
        errors: Option<UnboundedSender<FlagError>>,
    ) -> Self {
        DefinitionCache {
            client,
            snapshot: RwLock::new(Arc::new(DefinitionSnapshot::default())),
            loaded_successfully_once: AtomicBool::new(false),
            refresh_lock: tokio::sync::Mutex::new(()),
            errors,
            poller: Mutex::new(None),
            forced_reload: Arc::new(Notify::new()),
        }
    }

    pub async fn snapshot(&self) -> Arc<DefinitionSnapshot> {
        Arc::clone(&*self.snapshot.read().await)
    }

    pub fn has_loaded_successfully_once(&self) -> bool {
        self.loaded_successfully_once.load(Ordering::Acquire)
    }

    /// Refreshes unless a load already succeeded. `force` skips that check and
    /// restarts the polling interval.
    pub async fn load_feature_flags(&self, force: bool) {
        if force || !self.has_loaded_successfully_once() {
            self.refresh().await;
        }
        if force {
            self.forced_reload.notify_waiters();
        }
    }

    /// Fetches definitions once and swaps in the result.
    ///
    /// Errors never propagate: they are counted, logged, and the ones the caller has
    /// to act on go to the error channel.
    #[instrument(skip_all)]
    pub async fn refresh(&self) {
        let _guard = self.refresh_lock.lock().await;

        match self.fetch_and_swap().await {
            Ok(()) => {
                counter!(DEFINITIONS_REFRESH_COUNTER, "outcome" => "success").increment(1);
            }
            Err(e) => {
                counter!(DEFINITIONS_REFRESH_COUNTER, "outcome" => e.outcome()).increment(1);
                self.report(e);
            }
        }
    }

    async fn fetch_and_swap(&self) -> Result<(), FlagError> {
        let response = self.client.get_definitions().await?;

        match response.status {
            200 => {}
            401 => return Err(FlagError::Unauthorized),
            status => return Err(FlagError::UnexpectedStatus(status)),
        }

        let parsed = response
            .body
            .ok_or_else(|| FlagError::MalformedResponse("body is not valid JSON".to_string()))
            .and_then(DefinitionSnapshot::from_response_body);

        // A malformed response still counts as a load, with nothing in it
        let (snapshot, result) = match parsed {
            Ok(snapshot) => (snapshot, Ok(())),
            Err(e) => (DefinitionSnapshot::default(), Err(e)),
        };

        gauge!(LOADED_FLAGS_GAUGE).set(snapshot.flags.len() as f64);
        tracing::debug!(flags = snapshot.flags.len(), "loaded flag definitions");

        *self.snapshot.write().await = Arc::new(snapshot);
        self.loaded_successfully_once.store(true, Ordering::Release);

        result
    }

    fn report(&self, error: FlagError) {
        if !error.is_reportable() {
            tracing::warn!("failed to refresh flag definitions, keeping the previous ones: {}", error);
            return;
        }

        tracing::error!("{}", error);
        if let Some(errors) = &self.errors {
            if errors.send(error).is_err() {
                tracing::debug!("error channel is closed");
            }
        }
    }

    /// Starts the refresh loop: one refresh right away, then one every `interval`
    /// after the previous load settles, forced ones included. Replaces a loop that is
    /// already running.
    pub fn spawn_poller(self: &Arc<Self>, interval: Duration) {
        let weak_cache: Weak<DefinitionCache> = Arc::downgrade(self);
        let forced_reload = Arc::clone(&self.forced_reload);

        let handle = tokio::spawn(async move {
            loop {
                // The loop must not keep the cache alive on its own
                let Some(cache) = weak_cache.upgrade() else {
                    break;
                };
                cache.refresh().await;
                drop(cache);

                // Each forced reload starts the wait over
                while tokio::time::timeout(interval, forced_reload.notified())
                    .await
                    .is_ok()
                {}
            }
        });

        let mut poller = self.poller.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = poller.replace(handle) {
            previous.abort();
        }
    }

    /// Cancels the refresh loop. An in-flight fetch is abandoned.
    pub fn stop(&self) {
        let mut poller = self.poller.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(handle) = poller.take() {
            handle.abort();
        }
    }
}

impl Drop for DefinitionCache {
    fn drop(&mut self) {
        self.stop();
    }
}
