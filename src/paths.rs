//! Default configuration location
//!
//! ## Lookup order
//!
//! - **Working directory**: `config.yaml` in the current directory, which is
//!   what `cargo run` picks up during development.
//! - **Portable mode**: a `.portable` marker file next to the executable keeps
//!   the config next to the executable.
//! - **Installed mode** (default): the per-user config directory
//!   (`~/.config/nobbler` on Linux, `%APPDATA%\nobbler` on Windows).
//!
//! The scripts directory defaults to `scripts/` beside the config file.

use std::path::{Path, PathBuf};

/// Application name used for directories in installed mode
const APP_NAME: &str = "nobbler";

const CONFIG_FILE: &str = "config.yaml";

#[derive(Debug, Clone)]
pub struct AppPaths {
    /// Path to the configuration file
    pub config: PathBuf,
    /// Whether the config lives next to the executable or in the cwd
    pub is_portable: bool,
}

impl AppPaths {
    /// Detect the config location for this run
    ///
    /// Called before logging is initialized.
    pub fn detect() -> Self {
        let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        let exe_dir = std::env::current_exe()
            .ok()
            .and_then(|p| p.parent().map(Path::to_path_buf))
            .unwrap_or_else(|| PathBuf::from("."));

        Self::detect_in(&cwd, &exe_dir, dirs::config_dir())
    }

    fn detect_in(cwd: &Path, exe_dir: &Path, config_dir: Option<PathBuf>) -> Self {
        let cwd_config = cwd.join(CONFIG_FILE);
        if cwd_config.exists() {
            return Self {
                config: cwd_config,
                is_portable: true,
            };
        }

        if exe_dir.join(".portable").exists() {
            return Self {
                config: exe_dir.join(CONFIG_FILE),
                is_portable: true,
            };
        }

        let app_dir = config_dir
            .unwrap_or_else(|| {
                eprintln!("[paths] WARNING: no user config directory, falling back to exe dir");
                exe_dir.to_path_buf()
            })
            .join(APP_NAME);

        Self {
            config: app_dir.join(CONFIG_FILE),
            is_portable: false,
        }
    }

    /// Directory holding the config file
    pub fn base_dir(&self) -> PathBuf {
        self.config
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."))
    }
}
