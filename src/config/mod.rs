//! Configuration management for nobbler
//!
//! Handles loading, parsing, and validation of the YAML configuration file.
//! The configuration is loaded once before any worker starts and is never
//! mutated afterwards.

use anyhow::{Context, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tokio::fs;

/// Root configuration structure
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub nobbler: GeneralConfig,
    #[serde(default)]
    pub knobs: KnobsConfig,
    #[serde(default)]
    pub actions: Vec<ActionConfig>,
    pub views: Vec<ViewConfig>,
    #[serde(default)]
    pub triggers: Vec<TriggerConfig>,
}

/// General application settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GeneralConfig {
    /// Log every focused window change at info level
    #[serde(default)]
    pub verbose: bool,
    /// Directory substituted for the `{scripts}` token
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scripts_dir: Option<PathBuf>,
    /// Command printing the focused window title (line 1) and app name (line 2)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub window_command: Option<String>,
    #[serde(default = "default_window_poll_ms")]
    pub window_poll_ms: u64,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            verbose: false,
            scripts_dir: None,
            window_command: None,
            window_poll_ms: default_window_poll_ms(),
        }
    }
}

/// Knob hardware interfaces
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct KnobsConfig {
    #[serde(default)]
    pub interfaces: Vec<InterfaceConfig>,
}

/// One hardware interface a knob may be attached to
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct InterfaceConfig {
    pub kind: InterfaceKind,
    /// Stable knob identifier (defaults to the device, then `<kind>-<index>`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Device path or port name, meaning depends on the interface kind
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device: Option<String>,
}

impl InterfaceConfig {
    /// Knob identifier for the interface at `index` in the interface list
    pub fn knob_id(&self, index: usize) -> String {
        self.id
            .clone()
            .or_else(|| self.device.clone())
            .unwrap_or_else(|| format!("{}-{}", self.kind, index))
    }
}

/// Kind of knob hardware interface
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum InterfaceKind {
    Serial,
    Console,
}

impl std::fmt::Display for InterfaceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InterfaceKind::Serial => write!(f, "serial"),
            InterfaceKind::Console => write!(f, "console"),
        }
    }
}

/// Named action: optional scaling plus an ordered list of steps
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ActionConfig {
    pub name: String,
    #[serde(default = "default_placeholder")]
    pub placeholder: String,
    /// Substitute the movement delta instead of the absolute position
    #[serde(default)]
    pub relative: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scaling: Option<Vec<f64>>,
    #[serde(default = "default_true")]
    pub round: bool,
    /// Value-source command feeding the state cache
    #[serde(skip_serializing_if = "Option::is_none")]
    pub get_command: Option<String>,
    #[serde(default)]
    pub get_mode: SourceMode,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default)]
    pub steps: Vec<StepConfig>,
}

impl ActionConfig {
    /// Scaling range as `(lo, hi)`, if configured
    pub fn scaling_range(&self) -> Option<(f64, f64)> {
        match self.scaling.as_deref() {
            Some([lo, hi]) => Some((*lo, *hi)),
            _ => None,
        }
    }
}

/// How a value-source command is run
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SourceMode {
    /// Run to completion, sleep, repeat
    #[default]
    Poll,
    /// Run once and parse every output line
    Stream,
}

/// One step of an action
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum StepConfig {
    Log {
        message: String,
    },
    Command {
        command: String,
    },
    View {
        #[serde(default)]
        view: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        knob: Option<String>,
    },
}

/// Named view: display configuration plus rotation/press bindings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ViewConfig {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub knob_action: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub press_action: Option<String>,
    pub config: KnobDisplayConfig,
}

/// Hardware display parameters of a view
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct KnobDisplayConfig {
    pub position: i32,
    pub min_position: i32,
    pub max_position: i32,
    pub position_width_radians: f32,
    pub detent_strength_unit: f32,
    pub snap_point: f32,
    pub text: String,
    #[serde(default)]
    pub detent_positions: Vec<i32>,
    #[serde(default)]
    pub snap_point_bias: f32,
    pub led_hue: i32,
}

/// Trigger rule set
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "kind")]
pub enum TriggerConfig {
    #[serde(rename = "active-window")]
    ActiveWindow {
        #[serde(default)]
        mappings: Vec<WindowMapping>,
    },
}

/// Filters selecting a window, and the views to apply when they all match
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WindowMapping {
    #[serde(default)]
    pub filters: Vec<WindowFilter>,
    #[serde(default)]
    pub views: Vec<ViewTarget>,
}

/// Regular expression over one window property
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WindowFilter {
    #[serde(default)]
    pub property: WindowProperty,
    #[serde(default = "default_pattern")]
    pub pattern: String,
}

/// Window property a filter looks at
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum WindowProperty {
    #[default]
    Title,
    Appname,
}

/// View to apply, optionally restricted to one knob
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct ViewTarget {
    pub view: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub knob: Option<String>,
}

impl AppConfig {
    /// Load configuration from file with validation
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let mut config = Self::from_yaml_str(&contents)
            .with_context(|| format!("Invalid config file: {}", path.display()))?;

        if config.nobbler.scripts_dir.is_none() {
            let base = path.parent().unwrap_or_else(|| Path::new("."));
            config.nobbler.scripts_dir = Some(base.join("scripts"));
        }

        Ok(config)
    }

    /// Parse and validate configuration from a YAML string
    pub fn from_yaml_str(contents: &str) -> Result<Self> {
        let config: AppConfig =
            serde_yaml::from_str(contents).context("Failed to parse YAML config")?;

        config.validate()?;

        Ok(config)
    }

    /// Look up an action by name
    pub fn action(&self, name: &str) -> Option<&ActionConfig> {
        self.actions.iter().find(|a| a.name == name)
    }

    /// Look up a view by name
    pub fn view(&self, name: &str) -> Option<&ViewConfig> {
        self.views.iter().find(|v| v.name == name)
    }

    /// Directory substituted for `{scripts}` in commands
    pub fn scripts_dir(&self) -> PathBuf {
        self.nobbler
            .scripts_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from("scripts"))
    }

    /// The view every knob starts with
    pub fn default_view(&self) -> Option<&ViewConfig> {
        self.views.first()
    }

    /// Whether any trigger needs the active window poller
    pub fn has_window_triggers(&self) -> bool {
        self.triggers
            .iter()
            .any(|t| matches!(t, TriggerConfig::ActiveWindow { .. }))
    }

    /// Validate configuration for correctness and consistency
    pub fn validate(&self) -> Result<()> {
        if self.views.is_empty() {
            anyhow::bail!("At least one view must be defined");
        }

        let mut action_names = HashSet::new();
        for (idx, action) in self.actions.iter().enumerate() {
            if action.name.is_empty() {
                anyhow::bail!("Action {} name cannot be empty", idx);
            }
            if !action_names.insert(action.name.as_str()) {
                anyhow::bail!("Duplicate action name '{}'", action.name);
            }
        }

        let mut view_names = HashSet::new();
        for (idx, view) in self.views.iter().enumerate() {
            if view.name.is_empty() {
                anyhow::bail!("View {} name cannot be empty", idx);
            }
            if !view_names.insert(view.name.as_str()) {
                anyhow::bail!("Duplicate view name '{}'", view.name);
            }
        }

        for action in &self.actions {
            self.validate_action(action, &view_names)
                .with_context(|| format!("Invalid action '{}'", action.name))?;
        }

        for view in &self.views {
            for bound in [&view.knob_action, &view.press_action].into_iter().flatten() {
                if !action_names.contains(bound.as_str()) {
                    anyhow::bail!("View '{}' references unknown action '{}'", view.name, bound);
                }
            }
            if view.config.min_position > view.config.max_position {
                anyhow::bail!(
                    "View '{}' has min_position {} above max_position {}",
                    view.name,
                    view.config.min_position,
                    view.config.max_position
                );
            }
        }

        for (trigger_idx, trigger) in self.triggers.iter().enumerate() {
            let TriggerConfig::ActiveWindow { mappings } = trigger;
            for (mapping_idx, mapping) in mappings.iter().enumerate() {
                for filter in &mapping.filters {
                    Regex::new(&filter.pattern).with_context(|| {
                        format!(
                            "Invalid regular expression '{}' in trigger {} mapping {}",
                            filter.pattern, trigger_idx, mapping_idx
                        )
                    })?;
                }
                for target in &mapping.views {
                    if !view_names.contains(target.view.as_str()) {
                        anyhow::bail!(
                            "Trigger {} mapping {} references unknown view '{}'",
                            trigger_idx,
                            mapping_idx,
                            target.view
                        );
                    }
                }
            }
        }

        Ok(())
    }

    /// Validate a single action
    fn validate_action(&self, action: &ActionConfig, view_names: &HashSet<&str>) -> Result<()> {
        if let Some(scaling) = &action.scaling {
            let [lo, hi] = scaling.as_slice() else {
                anyhow::bail!("scaling must have exactly two values, got {}", scaling.len());
            };
            if !lo.is_finite() || !hi.is_finite() || lo == hi {
                anyhow::bail!("scaling range [{}, {}] is degenerate", lo, hi);
            }
        }

        if action.placeholder.is_empty() {
            anyhow::bail!("placeholder cannot be empty");
        }

        if action.get_command.is_some() && action.poll_interval_ms == 0 {
            anyhow::bail!("poll_interval_ms must be greater than zero");
        }

        for step in &action.steps {
            if let StepConfig::View { view, .. } = step {
                // An empty target is tolerated here and reported when the step runs
                if !view.is_empty() && !view_names.contains(view.as_str()) {
                    anyhow::bail!("view step references unknown view '{}'", view);
                }
            }
        }

        Ok(())
    }
}

// Default value functions
fn default_true() -> bool { true }
fn default_placeholder() -> String { "{value}".to_string() }
fn default_pattern() -> String { ".*".to_string() }
fn default_poll_interval_ms() -> u64 { 1000 }
fn default_window_poll_ms() -> u64 { 200 }
