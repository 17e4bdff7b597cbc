//! Raw value cache and the lookup API used by view initialization

use super::sources::SourceWorkers;
use crate::config::AppConfig;
use crate::scaling::{clamp, rescale};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error};

/// Lookups allowed to wait for a first sample retry this many times
pub const STARTUP_RETRY_COUNT: u32 = 10;

/// Delay between startup retries
pub const STARTUP_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Latest raw sample per action name
///
/// Entries are created on the first sample and overwritten afterwards. The
/// lock is held only for a single map operation, never across an await.
#[derive(Default)]
pub struct RawValueCache {
    values: Mutex<HashMap<String, f64>>,
}

impl RawValueCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, action_name: &str, value: f64) {
        self.values.lock().insert(action_name.to_string(), value);
    }

    pub fn get(&self, action_name: &str) -> Option<f64> {
        self.values.lock().get(action_name).copied()
    }

    pub fn contains(&self, action_name: &str) -> bool {
        self.values.lock().contains_key(action_name)
    }

    pub fn len(&self) -> usize {
        self.values.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.lock().is_empty()
    }
}

/// Read side of the state cache
///
/// Cheap to clone; every clone sees the same cache and the same value-source
/// workers.
#[derive(Clone)]
pub struct StateCacheHandle {
    config: Arc<AppConfig>,
    cache: Arc<RawValueCache>,
    sources: Arc<SourceWorkers>,
}

impl StateCacheHandle {
    pub(crate) fn new(
        config: Arc<AppConfig>,
        cache: Arc<RawValueCache>,
        sources: Arc<SourceWorkers>,
    ) -> Self {
        Self {
            config,
            cache,
            sources,
        }
    }

    /// Latest untransformed sample for an action
    pub fn raw_value(&self, action_name: &str) -> Option<f64> {
        self.cache.get(action_name)
    }

    /// Current value of an action's value-source, mapped into `[lo, hi]`
    ///
    /// Returns `None` for unknown actions, actions without a value-source and
    /// actions that have not produced a sample yet. With `allow_delay` a
    /// missing first sample is waited for, up to
    /// `STARTUP_RETRY_COUNT * STARTUP_RETRY_DELAY`.
    pub async fn get_value_for_action(
        &self,
        action_name: &str,
        lo: f64,
        hi: f64,
        allow_delay: bool,
    ) -> Option<f64> {
        let action = self.config.action(action_name)?;
        action.get_command.as_ref()?;

        if allow_delay {
            for _ in 0..STARTUP_RETRY_COUNT {
                if self.cache.contains(action_name) {
                    break;
                }
                debug!(action = %action_name, "No known value yet, delaying");
                tokio::time::sleep(STARTUP_RETRY_DELAY).await;
            }
        }

        let raw = self.cache.get(action_name)?;

        match action.scaling_range() {
            Some((s_lo, s_hi)) => match rescale(raw, s_lo, s_hi, lo, hi) {
                Ok(value) => Some(value),
                Err(e) => {
                    error!(action = %action_name, "Refusing value lookup: {}", e);
                    None
                }
            },
            None => Some(clamp(raw, lo, hi)),
        }
    }

    /// Cancel and join the value-source worker of one action
    ///
    /// Returns false if the action had no running worker.
    pub async fn stop_source(&self, action_name: &str) -> bool {
        self.sources.stop(action_name).await
    }

    /// Names of actions with a running value-source worker
    pub fn running_sources(&self) -> Vec<String> {
        self.sources.names()
    }
}
