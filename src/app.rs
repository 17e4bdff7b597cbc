//! Worker wiring: startup and ordered shutdown

use crate::action::ActionExecutor;
use crate::config::AppConfig;
use crate::drivers::ConnectorRegistry;
use crate::knob::KnobManager;
use crate::router::{self, KnobId, RouterHandle};
use crate::state::{StateCache, StateCacheHandle};
use crate::trigger::{ActiveWindowProvider, CommandWindowProvider, TriggerMatcher};
use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// The four running workers
pub struct App {
    router: RouterHandle,
    state: StateCacheHandle,
    knob_ids: Vec<KnobId>,
    trigger_task: JoinHandle<()>,
    action_task: JoinHandle<()>,
    knob_task: JoinHandle<()>,
    state_task: JoinHandle<()>,
}

impl App {
    /// Start every worker, using `window_command` for active-window triggers
    pub async fn start(config: Arc<AppConfig>, registry: &ConnectorRegistry) -> Result<Self> {
        let provider: Option<Arc<dyn ActiveWindowProvider>> = config
            .nobbler
            .window_command
            .as_ref()
            .map(|cmd| Arc::new(CommandWindowProvider::new(cmd.as_str())) as _);

        Self::start_with_window_provider(config, registry, provider).await
    }

    /// Start every worker with an explicit active-window backend
    ///
    /// Value sources start first so that views can be seeded from them; the
    /// knobs are connected and show the default view before any queue is
    /// consumed.
    pub async fn start_with_window_provider(
        config: Arc<AppConfig>,
        registry: &ConnectorRegistry,
        window_provider: Option<Arc<dyn ActiveWindowProvider>>,
    ) -> Result<Self> {
        info!("🚀 Starting nobbler...");

        let (router, rx) = router::channels();

        let mut trigger = TriggerMatcher::new(&config, router.clone(), rx.trigger_rx)?;

        let (state, state_task) = StateCache::spawn(config.clone(), router.clone(), rx.state_rx);

        let mut knobs = KnobManager::new(&config, router.clone(), state.clone(), rx.knob_rx);
        let connected = knobs.connect_all(&config, registry).await;
        if connected == 0 {
            warn!("⚠️  No knob connected, only log output will be produced");
        }
        let knob_ids = knobs.knob_ids();

        let action_task = ActionExecutor::new(&config, router.clone(), rx.action_rx).spawn();

        if config.has_window_triggers() {
            match window_provider {
                Some(provider) => trigger.start_window_poller(
                    provider,
                    Duration::from_millis(config.nobbler.window_poll_ms),
                ),
                None => warn!("⚠️  Active-window triggers configured but no window command set"),
            }
        }
        let trigger_task = trigger.spawn();
        let knob_task = knobs.spawn();

        info!("✅ nobbler ready ({} knob(s))", knob_ids.len());

        Ok(Self {
            router,
            state,
            knob_ids,
            trigger_task,
            action_task,
            knob_task,
            state_task,
        })
    }

    pub fn router(&self) -> &RouterHandle {
        &self.router
    }

    pub fn state(&self) -> &StateCacheHandle {
        &self.state
    }

    /// Knobs connected at startup
    pub fn knob_ids(&self) -> &[KnobId] {
        &self.knob_ids
    }

    /// Stop the workers upstream first, each after draining its queue
    ///
    /// Order: trigger, action, knob, state. Messages a worker emits while
    /// draining still reach the workers after it. Invocations the knob
    /// manager emits while draining are dropped, since the action executor
    /// has already stopped; each one is logged at debug level.
    pub async fn shutdown(self) {
        info!("Shutting down...");

        self.router.terminate_trigger();
        join("trigger", self.trigger_task).await;

        self.router.terminate_action();
        join("action", self.action_task).await;

        self.router.terminate_knob();
        join("knob", self.knob_task).await;

        self.router.terminate_state();
        join("state", self.state_task).await;

        info!("nobbler shutdown complete");
    }
}

async fn join(name: &str, handle: JoinHandle<()>) {
    if let Err(e) = handle.await {
        error!("{} task failed: {}", name, e);
    }
}
