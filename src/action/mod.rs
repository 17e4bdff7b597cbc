//! Action executor
//!
//! Single consumer of the action-queue. Invocations run one at a time in
//! arrival order, and the steps of one invocation run in declared order.
//!
//! Command steps are fire-and-forget: the child process is spawned and left
//! alone, its completion and exit status are never awaited. A slow command
//! therefore never holds up the queue.

pub mod template;

use crate::config::{ActionConfig, AppConfig, StepConfig};
use crate::error::RouterError;
use crate::router::{ActionInvoke, ActionMessage, RouterHandle};
use crate::scaling::{rescale, rescale_delta, ScalingError};
use crate::shell;
use std::collections::HashMap;
use std::path::PathBuf;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

pub struct ActionExecutor {
    actions: HashMap<String, ActionConfig>,
    scripts_dir: PathBuf,
    router: RouterHandle,
    action_rx: mpsc::UnboundedReceiver<ActionMessage>,
    invoke_count: u64,
}

impl ActionExecutor {
    pub fn new(
        config: &AppConfig,
        router: RouterHandle,
        action_rx: mpsc::UnboundedReceiver<ActionMessage>,
    ) -> Self {
        Self {
            actions: config
                .actions
                .iter()
                .map(|a| (a.name.clone(), a.clone()))
                .collect(),
            scripts_dir: config.scripts_dir(),
            router,
            action_rx,
            invoke_count: 0,
        }
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    pub async fn run(mut self) {
        info!("Action task started ({} actions)", self.actions.len());

        while let Some(msg) = self.action_rx.recv().await {
            match msg {
                ActionMessage::Invoke(invoke) => {
                    self.invoke_count += 1;
                    match self.perform(&invoke) {
                        Ok(()) => {}
                        Err(RouterError::Scaling(e)) => {
                            error!(action = %invoke.action_name, "Invocation dropped: {}", e)
                        }
                        Err(e) => warn!("⚠️  Invocation dropped: {}", e),
                    }
                }
                ActionMessage::Terminate => {
                    info!("Action task received terminate");
                    break;
                }
            }
        }

        info!("Action task stopped after {} invocations", self.invoke_count);
    }

    /// Run every step of the invoked action
    pub fn perform(&self, invoke: &ActionInvoke) -> Result<(), RouterError> {
        let action = self
            .actions
            .get(&invoke.action_name)
            .ok_or_else(|| RouterError::UnknownAction(invoke.action_name.clone()))?;

        let value = scaled_value(action, invoke)?;
        let rendered = template::format_value(value, action.round);

        debug!(
            knob = %invoke.knob_id,
            action = %action.name,
            raw = invoke.value,
            delta = invoke.delta,
            value = %rendered,
            "Performing action"
        );

        for step in &action.steps {
            match step {
                StepConfig::Log { message } => {
                    info!(
                        "📝 {}",
                        template::render(message, &action.placeholder, &rendered)
                    );
                }
                StepConfig::Command { command } => {
                    let line = shell::expand_scripts(
                        &template::render(command, &action.placeholder, &rendered),
                        &self.scripts_dir,
                    );
                    spawn_detached(&action.name, &line);
                }
                StepConfig::View { view, knob } => {
                    if view.is_empty() {
                        error!(
                            "View step of action '{}' names no view, skipping step",
                            action.name
                        );
                        continue;
                    }
                    let target = knob.clone().unwrap_or_else(|| invoke.knob_id.clone());
                    debug!(action = %action.name, view = %view, knob = %target, "View step");
                    self.router.set_view(view.as_str(), Some(target));
                }
            }
        }

        Ok(())
    }
}

/// The number an invocation substitutes for the action's placeholder
///
/// The knob reading is mapped from the knob's `[min, max]` onto the action's
/// scaling range, if it has one. Relative actions use the movement delta
/// instead of the absolute reading.
pub fn scaled_value(action: &ActionConfig, invoke: &ActionInvoke) -> Result<f64, ScalingError> {
    let value = match (action.scaling_range(), action.relative) {
        (Some((lo, hi)), false) => rescale(invoke.value, invoke.min, invoke.max, lo, hi)?,
        (Some((lo, hi)), true) => {
            rescale_delta(invoke.delta as f64, invoke.min, invoke.max, lo, hi)?
        }
        (None, false) => invoke.value,
        (None, true) => invoke.delta as f64,
    };

    Ok(if action.round { value.round() } else { value })
}

/// Start a shell command without waiting for it
fn spawn_detached(action_name: &str, line: &str) {
    match shell::command(line).spawn() {
        Ok(child) => {
            info!("▶️  [{}] {} (pid {:?})", action_name, line, child.id());
        }
        Err(e) => {
            warn!("⚠️  [{}] Failed to run '{}': {}", action_name, line, e);
        }
    }
}
