//! StateCache - consumer of the state-queue
//!
//! Owns the value-source workers for its whole lifetime and is the only
//! writer into the [`RawValueCache`]. Samples are stored untransformed;
//! scaling happens when a value is read.

use super::cache::{RawValueCache, StateCacheHandle};
use super::sources::SourceWorkers;
use crate::config::AppConfig;
use crate::router::{RouterHandle, StateMessage};
use crate::shell;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace};

pub struct StateCache {
    cache: Arc<RawValueCache>,
    sources: Arc<SourceWorkers>,
    state_rx: mpsc::UnboundedReceiver<StateMessage>,
    sample_count: u64,
}

impl StateCache {
    /// Start one value-source worker per action with a `get_command`, then
    /// spawn the queue consumer
    ///
    /// Returns the read handle and the consumer task. The task finishes after
    /// `Terminate` has been received and every worker has been joined.
    pub fn spawn(
        config: Arc<AppConfig>,
        router: RouterHandle,
        state_rx: mpsc::UnboundedReceiver<StateMessage>,
    ) -> (StateCacheHandle, JoinHandle<()>) {
        let cache = Arc::new(RawValueCache::new());
        let sources = Arc::new(SourceWorkers::new());

        let scripts_dir = config.scripts_dir();
        for action in &config.actions {
            if let Some(get_command) = &action.get_command {
                let command = shell::expand_scripts(get_command, &scripts_dir);
                sources.start(action, command, router.clone());
            }
        }

        let actor = StateCache {
            cache: cache.clone(),
            sources: sources.clone(),
            state_rx,
            sample_count: 0,
        };
        let handle = tokio::spawn(actor.run());

        info!("StateCache spawned");

        (StateCacheHandle::new(config, cache, sources), handle)
    }

    async fn run(mut self) {
        debug!("StateCache run loop started");

        while let Some(msg) = self.state_rx.recv().await {
            match msg {
                StateMessage::ValueSample { action_name, value } => {
                    trace!(action = %action_name, value, "Value sample");
                    self.cache.set(&action_name, value);
                    self.sample_count += 1;
                }
                StateMessage::Terminate => {
                    info!("StateCache received terminate");
                    break;
                }
            }
        }

        self.sources.shutdown().await;

        info!(
            "StateCache stopped ({} samples, {} cached values)",
            self.sample_count,
            self.cache.len()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::tests::SAMPLE_CONFIG;
    use crate::router::channels;
    use std::time::Duration;

    fn config_without_sources() -> Arc<AppConfig> {
        let yaml = SAMPLE_CONFIG.replace("    get_command: \"echo 42\"\n", "");
        Arc::new(AppConfig::from_yaml_str(&yaml).unwrap())
    }

    fn config_with_source(get_command: &str) -> Arc<AppConfig> {
        let yaml = SAMPLE_CONFIG.replace(
            "get_command: \"echo 42\"",
            &format!("get_command: \"{}\"", get_command),
        );
        Arc::new(AppConfig::from_yaml_str(&yaml).unwrap())
    }

    #[tokio::test]
    async fn test_sample_is_readable_after_update() {
        // The source command never prints, so only the injected sample exists
        let config = config_with_source("sleep 30");
        let (router, rx) = channels();
        let (state, task) = StateCache::spawn(config, router.clone(), rx.state_rx);

        router.push_sample("system_volume", 42.0);

        let mut value = None;
        for _ in 0..50 {
            value = state
                .get_value_for_action("system_volume", 0.0, 100.0, false)
                .await;
            if value.is_some() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        // scaling [0, 100] onto [0, 100]
        assert!((value.unwrap() - 42.0).abs() < 1e-9);
        assert_eq!(state.raw_value("system_volume"), Some(42.0));

        // Same sample mapped onto a knob range of [0, 11]
        let knob_value = state
            .get_value_for_action("system_volume", 0.0, 11.0, false)
            .await
            .unwrap();
        assert!((knob_value - 4.62).abs() < 1e-9);

        router.terminate_state();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_action_without_source_is_absent() {
        let config = config_without_sources();
        let (router, rx) = channels();
        let (state, task) = StateCache::spawn(config, router.clone(), rx.state_rx);

        // Even a stray sample does not make a value-source appear
        router.push_sample("debug", 7.0);
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(state.get_value_for_action("debug", 0.0, 100.0, true).await, None);
        assert_eq!(state.get_value_for_action("unknown", 0.0, 100.0, true).await, None);
        assert!(state.running_sources().is_empty());

        router.terminate_state();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_terminate_applies_prior_samples() {
        let config = config_with_source("sleep 30");
        let (router, rx) = channels();
        let (state, task) = StateCache::spawn(config, router.clone(), rx.state_rx);

        for n in 1..=5 {
            router.push_sample("system_volume", n as f64);
        }
        router.terminate_state();
        router.push_sample("system_volume", 99.0);

        task.await.unwrap();
        assert_eq!(state.raw_value("system_volume"), Some(5.0));
        assert!(state.running_sources().is_empty());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_allow_delay_waits_for_first_sample() {
        let config = config_with_source("echo 42");
        let (router, rx) = channels();
        let (state, task) = StateCache::spawn(config, router.clone(), rx.state_rx);

        let value = state
            .get_value_for_action("system_volume", 0.0, 100.0, true)
            .await
            .unwrap();
        assert!((value - 42.0).abs() < 1e-9);

        assert!(state.stop_source("system_volume").await);
        assert!(state.running_sources().is_empty());

        router.terminate_state();
        task.await.unwrap();
    }
}
