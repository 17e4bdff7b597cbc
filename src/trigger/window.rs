//! Active window polling
//!
//! There is no portable event source for focus changes, so the focused
//! window is polled and a `WindowFocused` message is sent whenever it
//! changes.

use crate::router::RouterHandle;
use crate::shell;
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Upper bound for one run of the window command
const WINDOW_COMMAND_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WindowInfo {
    pub title: String,
    pub appname: String,
}

/// Backend reporting the currently focused window
#[async_trait]
pub trait ActiveWindowProvider: Send + Sync {
    /// `Ok(None)` when no window has focus
    async fn active_window(&self) -> Result<Option<WindowInfo>>;
}

/// Runs a shell command printing the focused window's title on the first
/// line and, optionally, its application name on the second
pub struct CommandWindowProvider {
    command: String,
}

impl CommandWindowProvider {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }
}

#[async_trait]
impl ActiveWindowProvider for CommandWindowProvider {
    async fn active_window(&self) -> Result<Option<WindowInfo>> {
        let mut cmd = shell::command(&self.command);
        cmd.stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        let output = tokio::time::timeout(WINDOW_COMMAND_TIMEOUT, cmd.output())
            .await
            .context("window command timed out")?
            .context("failed to run window command")?;

        if !output.status.success() {
            anyhow::bail!("window command exited with {}", output.status);
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let mut lines = stdout.lines();
        let title = lines.next().unwrap_or("").trim_end();
        let appname = lines.next().unwrap_or("").trim_end();

        if title.is_empty() && appname.is_empty() {
            return Ok(None);
        }

        Ok(Some(WindowInfo {
            title: title.to_string(),
            appname: appname.to_string(),
        }))
    }
}

/// Background task feeding the trigger-queue
pub struct WindowPoller {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl WindowPoller {
    pub fn spawn(
        provider: Arc<dyn ActiveWindowProvider>,
        interval: Duration,
        router: RouterHandle,
        verbose: bool,
    ) -> Self {
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(poll_loop(provider, interval, router, verbose, cancel.clone()));

        info!("🪟 Active window polling every {:?}", interval);

        Self { cancel, handle }
    }

    /// Cancel the poller and wait for it to exit
    pub async fn stop(self) {
        self.cancel.cancel();
        match tokio::time::timeout(Duration::from_secs(2), self.handle).await {
            Ok(Ok(())) => debug!("Window poller stopped"),
            Ok(Err(e)) => error!("Window poller task failed: {}", e),
            Err(_) => warn!("Window poller did not stop within timeout, abandoning"),
        }
    }
}

async fn poll_loop(
    provider: Arc<dyn ActiveWindowProvider>,
    interval: Duration,
    router: RouterHandle,
    verbose: bool,
    cancel: CancellationToken,
) {
    // Outer None: nothing reported yet
    let mut last: Option<Option<WindowInfo>> = None;

    loop {
        let polled = tokio::select! {
            _ = cancel.cancelled() => break,
            polled = provider.active_window() => polled,
        };

        match polled {
            Ok(window) if last.as_ref() != Some(&window) => {
                match &window {
                    Some(w) => {
                        if verbose {
                            info!("Window focused: appname=\"{}\" title=\"{}\"", w.appname, w.title);
                        } else {
                            debug!(title = %w.title, appname = %w.appname, "Window focused");
                        }
                        router.window_focused(w.title.as_str(), w.appname.as_str());
                    }
                    None => {
                        if verbose {
                            info!("No window focused");
                        }
                        router.window_focused("", "");
                    }
                }
                last = Some(window);
            }
            Ok(_) => {}
            Err(e) => debug!("Active window unavailable: {:#}", e),
        }

        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(interval) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::router::{channels, TriggerMessage};
    use parking_lot::Mutex;
    use std::collections::VecDeque;

    /// Replays a fixed sequence, then keeps reporting the last entry
    struct ScriptedProvider {
        script: Mutex<VecDeque<Option<WindowInfo>>>,
        last: Mutex<Option<WindowInfo>>,
    }

    impl ScriptedProvider {
        fn new(script: Vec<Option<WindowInfo>>) -> Self {
            Self {
                script: Mutex::new(script.into()),
                last: Mutex::new(None),
            }
        }
    }

    #[async_trait]
    impl ActiveWindowProvider for ScriptedProvider {
        async fn active_window(&self) -> Result<Option<WindowInfo>> {
            if let Some(next) = self.script.lock().pop_front() {
                *self.last.lock() = next;
            }
            Ok(self.last.lock().clone())
        }
    }

    fn window(title: &str, appname: &str) -> Option<WindowInfo> {
        Some(WindowInfo {
            title: title.to_string(),
            appname: appname.to_string(),
        })
    }

    #[tokio::test]
    async fn test_poller_emits_changes_only() {
        let (router, mut rx) = channels();
        let provider = Arc::new(ScriptedProvider::new(vec![
            window("Untitled - Notepad", "notepad"),
            window("Untitled - Notepad", "notepad"),
            None,
            window("Chrome", "chrome"),
        ]));

        let poller = WindowPoller::spawn(provider, Duration::from_millis(5), router, false);
        tokio::time::sleep(Duration::from_millis(100)).await;
        poller.stop().await;

        let mut seen = Vec::new();
        while let Ok(TriggerMessage::WindowFocused { title, appname }) = rx.trigger_rx.try_recv() {
            seen.push((title, appname));
        }
        assert_eq!(
            seen,
            vec![
                ("Untitled - Notepad".to_string(), "notepad".to_string()),
                (String::new(), String::new()),
                ("Chrome".to_string(), "chrome".to_string()),
            ]
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_command_provider_reads_two_lines() {
        let provider = CommandWindowProvider::new("printf 'Untitled - Notepad\\nnotepad\\n'");
        assert_eq!(
            provider.active_window().await.unwrap(),
            window("Untitled - Notepad", "notepad")
        );

        let title_only = CommandWindowProvider::new("echo Chrome");
        assert_eq!(title_only.active_window().await.unwrap(), window("Chrome", ""));

        let nothing = CommandWindowProvider::new("true");
        assert_eq!(nothing.active_window().await.unwrap(), None);

        let failing = CommandWindowProvider::new("exit 1");
        assert!(failing.active_window().await.is_err());
    }
}
