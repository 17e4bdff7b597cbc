//! Knob connection manager
//!
//! Owns every connected knob. It pushes views to the hardware, turns
//! de-noised hardware reports into action invocations, and is the single
//! consumer of the knob-queue.

mod connection;
mod denoise;


pub use connection::KnobConnection;
pub use denoise::Denoiser;

use crate::config::{AppConfig, ViewConfig};
use crate::drivers::{ConnectorRegistry, KnobConfig, KnobState, StateCallback};
use crate::error::RouterError;
use crate::router::{ActionInvoke, HardwareEvent, KnobId, KnobMessage, RouterHandle};
use crate::state::StateCacheHandle;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

pub struct KnobManager {
    views: HashMap<String, Arc<ViewConfig>>,
    default_view: Option<Arc<ViewConfig>>,
    /// Ordered by knob id so "all knobs" is applied in a stable order
    connections: BTreeMap<KnobId, KnobConnection>,
    router: RouterHandle,
    state: StateCacheHandle,
    knob_rx: mpsc::UnboundedReceiver<KnobMessage>,
}

impl KnobManager {
    pub fn new(
        config: &AppConfig,
        router: RouterHandle,
        state: StateCacheHandle,
        knob_rx: mpsc::UnboundedReceiver<KnobMessage>,
    ) -> Self {
        let views: HashMap<String, Arc<ViewConfig>> = config
            .views
            .iter()
            .map(|v| (v.name.clone(), Arc::new(v.clone())))
            .collect();
        let default_view = config
            .default_view()
            .and_then(|v| views.get(&v.name).cloned());

        Self {
            views,
            default_view,
            connections: BTreeMap::new(),
            router,
            state,
            knob_rx,
        }
    }

    /// Connect every configured interface and apply the default view
    ///
    /// Interfaces that fail to connect are logged and skipped for the rest of
    /// the run. Returns the number of connected knobs.
    pub async fn connect_all(&mut self, config: &AppConfig, registry: &ConnectorRegistry) -> usize {
        for (index, interface) in config.knobs.interfaces.iter().enumerate() {
            let knob_id = interface.knob_id(index);

            if self.connections.contains_key(&knob_id) {
                warn!("⚠️  Duplicate knob id '{}', skipping interface {}", knob_id, index);
                continue;
            }

            let Some(connector) = registry.get(interface.kind) else {
                warn!(
                    "⚠️  Knob '{}' unavailable: {}",
                    knob_id,
                    RouterError::NoConnector(interface.kind)
                );
                continue;
            };

            let denoiser = Arc::new(Denoiser::new());
            let callback = self.state_callback(knob_id.clone(), denoiser.clone());

            let connection = match connector.connect(&knob_id, interface, callback).await {
                Ok(connection) => connection,
                Err(e) => {
                    warn!("⚠️  Knob '{}' unavailable: {:#}", knob_id, e);
                    continue;
                }
            };

            denoiser.prime(&connection.initial_state);
            debug!(knob = %knob_id, state = ?connection.initial_state, "First knob status");

            self.connections.insert(
                knob_id.clone(),
                KnobConnection::new(connection.driver, &connection.initial_state),
            );
            info!("✅ Knob '{}' connected ({})", knob_id, interface.kind);

            // Sources may not have reported yet, so wait briefly for a sample
            if let Some(view) = self.default_view.clone() {
                self.apply_view(&knob_id, view, true).await;
            }
        }

        info!("Started communications with {} knob(s)", self.connections.len());
        self.connections.len()
    }

    /// Ids of the connected knobs
    pub fn knob_ids(&self) -> Vec<KnobId> {
        self.connections.keys().cloned().collect()
    }

    pub fn connection(&self, knob_id: &str) -> Option<&KnobConnection> {
        self.connections.get(knob_id)
    }

    /// Spawn the knob-queue consumer
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    pub async fn run(mut self) {
        debug!("KnobManager run loop started");

        while let Some(msg) = self.knob_rx.recv().await {
            trace!(?msg, "Knob message");

            let result = match msg {
                KnobMessage::ViewChange { view_name, knob_id } => {
                    self.handle_view_change(&view_name, knob_id).await
                }
                KnobMessage::Hardware {
                    knob_id,
                    event: HardwareEvent::State(state),
                } => self.handle_state(knob_id, state),
                KnobMessage::Terminate => {
                    info!("KnobManager received terminate");
                    break;
                }
            };

            if let Err(e) = result {
                warn!("⚠️  Knob message dropped: {}", e);
            }
        }

        self.release_all().await;
    }

    /// Builds the driver callback: de-noise, then enqueue
    fn state_callback(&self, knob_id: KnobId, denoiser: Arc<Denoiser>) -> StateCallback {
        let router = self.router.clone();
        Arc::new(move |state: KnobState| {
            if denoiser.accept(&state) {
                router.hardware_event(knob_id.clone(), HardwareEvent::State(state));
            }
        })
    }

    async fn handle_view_change(
        &mut self,
        view_name: &str,
        knob_id: Option<KnobId>,
    ) -> Result<(), RouterError> {
        let view = self
            .views
            .get(view_name)
            .cloned()
            .ok_or_else(|| RouterError::UnknownView(view_name.to_string()))?;

        let targets = match knob_id {
            Some(id) if self.connections.contains_key(&id) => vec![id],
            Some(id) => return Err(RouterError::UnknownKnob(id)),
            None => self.knob_ids(),
        };

        // Only the startup push waits for a first sample
        for target in targets {
            self.apply_view(&target, view.clone(), false).await;
        }
        Ok(())
    }

    /// Push a view to one knob and make it the knob's current view
    ///
    /// `allow_delay` is only set while connecting at startup.
    async fn apply_view(&mut self, knob_id: &str, view: Arc<ViewConfig>, allow_delay: bool) {
        let position = self.initial_position(&view, allow_delay).await;

        let Some(conn) = self.connections.get_mut(knob_id) else {
            return;
        };

        let nonce = conn.next_nonce();
        let config = KnobConfig::from_display(&view.config, position, nonce);
        conn.prev_position = position;
        conn.current_view = Some(view.clone());

        info!("🔄 Knob '{}' → view '{}' (position {})", knob_id, view.name, position);

        if let Err(e) = conn.driver.apply_config(&config).await {
            warn!("⚠️  Failed to apply view '{}' to knob '{}': {:#}", view.name, knob_id, e);
        }
    }

    /// Position to display when a view is applied
    ///
    /// Seeded from the knob action's value-source when it has a sample,
    /// otherwise the view's static position. Always inside the view's range.
    async fn initial_position(&self, view: &ViewConfig, allow_delay: bool) -> i32 {
        let display = &view.config;
        let (lo, hi) = (display.min_position, display.max_position);

        let live = match &view.knob_action {
            Some(action) => {
                self.state
                    .get_value_for_action(action, lo as f64, hi as f64, allow_delay)
                    .await
            }
            None => None,
        };

        match live {
            Some(value) => (value.round() as i32).clamp(lo, hi),
            None => display.position.clamp(lo, hi),
        }
    }

    fn handle_state(&mut self, knob_id: KnobId, state: KnobState) -> Result<(), RouterError> {
        let conn = self
            .connections
            .get_mut(&knob_id)
            .ok_or_else(|| RouterError::UnknownKnob(knob_id.clone()))?;

        if state.press_nonce != conn.press_nonce {
            conn.press_nonce = state.press_nonce;
            debug!(knob = %knob_id, "Press");

            if let Some(action) = conn.press_action() {
                self.router.do_action(ActionInvoke {
                    knob_id: knob_id.clone(),
                    action_name: action.to_string(),
                    delta: 1,
                    value: 1.0,
                    min: 0.0,
                    max: 1.0,
                });
            }
            return Ok(());
        }

        // Reports still running an older config describe the previous view
        if state.config.position_nonce != conn.position_nonce {
            trace!(knob = %knob_id, "Stale config generation, ignoring position");
            return Ok(());
        }

        if state.position != conn.prev_position {
            let delta = state.position.saturating_sub(conn.prev_position);
            conn.prev_position = state.position;
            debug!(knob = %knob_id, position = state.position, delta, "Rotation");

            if let Some(action) = conn.knob_action() {
                self.router.do_action(ActionInvoke {
                    knob_id: knob_id.clone(),
                    action_name: action.to_string(),
                    delta,
                    value: state.position as f64,
                    min: state.config.min_position as f64,
                    max: state.config.max_position as f64,
                });
            }
        }

        Ok(())
    }

    /// Release every driver; failures are logged and swallowed
    async fn release_all(&mut self) {
        for (knob_id, conn) in std::mem::take(&mut self.connections) {
            if let Err(e) = conn.driver.shutdown().await {
                warn!("⚠️  Failed to release knob '{}': {:#}", knob_id, e);
            }
        }
        info!("KnobManager stopped");
    }
}
