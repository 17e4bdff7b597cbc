//! Trigger matcher
//!
//! Single consumer of the trigger-queue. Window focus events are matched
//! against the `active-window` rules in declared order; the first mapping
//! whose filters all match decides which views are applied.

pub mod window;

pub use window::{ActiveWindowProvider, CommandWindowProvider, WindowInfo, WindowPoller};

use crate::config::{AppConfig, TriggerConfig, ViewTarget, WindowProperty};
use crate::router::{RouterHandle, TriggerMessage};
use anyhow::{Context, Result};
use regex::Regex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace};

struct CompiledFilter {
    property: WindowProperty,
    regex: Regex,
}

impl CompiledFilter {
    fn matches(&self, title: &str, appname: &str) -> bool {
        let value = match self.property {
            WindowProperty::Title => title,
            WindowProperty::Appname => appname,
        };
        self.regex.is_match(value)
    }
}

/// One mapping, flattened out of its trigger
struct CompiledMapping {
    filters: Vec<CompiledFilter>,
    views: Vec<ViewTarget>,
}

pub struct TriggerMatcher {
    mappings: Vec<CompiledMapping>,
    router: RouterHandle,
    trigger_rx: mpsc::UnboundedReceiver<TriggerMessage>,
    poller: Option<WindowPoller>,
    verbose: bool,
}

impl TriggerMatcher {
    /// Compile every filter pattern of the configured triggers
    pub fn new(
        config: &AppConfig,
        router: RouterHandle,
        trigger_rx: mpsc::UnboundedReceiver<TriggerMessage>,
    ) -> Result<Self> {
        let mut mappings = Vec::new();

        for trigger in &config.triggers {
            let TriggerConfig::ActiveWindow { mappings: rules } = trigger;
            for rule in rules {
                let filters = rule
                    .filters
                    .iter()
                    .map(|f| {
                        Regex::new(&f.pattern)
                            .with_context(|| format!("Invalid window filter pattern '{}'", f.pattern))
                            .map(|regex| CompiledFilter {
                                property: f.property,
                                regex,
                            })
                    })
                    .collect::<Result<Vec<_>>>()?;

                mappings.push(CompiledMapping {
                    filters,
                    views: rule.views.clone(),
                });
            }
        }

        Ok(Self {
            mappings,
            router,
            trigger_rx,
            poller: None,
            verbose: config.nobbler.verbose,
        })
    }

    /// Poll `provider` for focus changes until this matcher terminates
    pub fn start_window_poller(&mut self, provider: Arc<dyn ActiveWindowProvider>, interval: Duration) {
        self.poller = Some(WindowPoller::spawn(
            provider,
            interval,
            self.router.clone(),
            self.verbose,
        ));
    }

    /// Views of the first mapping matching the window, if any
    pub fn matching_views(&self, title: &str, appname: &str) -> Option<&[ViewTarget]> {
        self.mappings
            .iter()
            .find(|m| m.filters.iter().all(|f| f.matches(title, appname)))
            .map(|m| m.views.as_slice())
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    pub async fn run(mut self) {
        info!("Trigger task started ({} window mappings)", self.mappings.len());

        while let Some(msg) = self.trigger_rx.recv().await {
            match msg {
                TriggerMessage::WindowFocused { title, appname } => {
                    match self.matching_views(&title, &appname) {
                        Some(views) => {
                            for target in views {
                                debug!(view = %target.view, knob = ?target.knob, "Trigger matched");
                                self.router
                                    .set_view(target.view.as_str(), target.knob.clone());
                            }
                        }
                        None => trace!(%title, %appname, "No trigger matched"),
                    }
                }
                TriggerMessage::Terminate => {
                    info!("Trigger task received terminate");
                    break;
                }
            }
        }

        if let Some(poller) = self.poller.take() {
            poller.stop().await;
        }
        info!("Trigger task stopped");
    }
}
