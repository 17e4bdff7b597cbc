//! Value-source workers
//!
//! One background task per action declaring a `get_command`. Each worker owns
//! a child token of the shared shutdown token, so it can be stopped on its own
//! or together with all the others. Commands run in their own process group,
//! which is killed as a whole when the worker stops or a poll times out.

use crate::config::{ActionConfig, SourceMode};
use crate::router::RouterHandle;
use crate::shell;
use anyhow::{Context, Result};
use parking_lot::Mutex;
use regex::Regex;
use std::collections::HashMap;
use std::process::Stdio;
use std::sync::LazyLock;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Upper bound for one polled command run
pub const POLL_COMMAND_TIMEOUT: Duration = Duration::from_secs(1);

/// How long shutdown waits for each worker to stop
const JOIN_TIMEOUT: Duration = Duration::from_secs(2);

static NUMBER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"-?[0-9]+(\.[0-9]+)?").expect("number pattern is valid")
});

/// Extract the first number-like token from command output
pub fn parse_value(output: &str) -> Option<f64> {
    NUMBER_RE
        .find(output)
        .and_then(|m| m.as_str().parse::<f64>().ok())
}

struct SourceWorker {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Supervisor of all value-source workers
pub struct SourceWorkers {
    workers: Mutex<HashMap<String, SourceWorker>>,
    /// Parent of every worker token
    shutdown: CancellationToken,
}

impl Default for SourceWorkers {
    fn default() -> Self {
        Self::new()
    }
}

impl SourceWorkers {
    pub fn new() -> Self {
        Self {
            workers: Mutex::new(HashMap::new()),
            shutdown: CancellationToken::new(),
        }
    }

    /// Start the worker for one action
    ///
    /// `command` is the action's `get_command` with `{scripts}` already
    /// expanded. An already running worker for the same action is left alone.
    pub fn start(&self, action: &ActionConfig, command: String, router: RouterHandle) {
        let mut workers = self.workers.lock();
        if workers.contains_key(&action.name) {
            debug!(action = %action.name, "Value source already running");
            return;
        }

        let cancel = self.shutdown.child_token();
        let interval = Duration::from_millis(action.poll_interval_ms);
        let name = action.name.clone();

        let handle = match action.get_mode {
            SourceMode::Poll => tokio::spawn(run_poll(
                name.clone(),
                command,
                interval,
                router,
                cancel.clone(),
            )),
            SourceMode::Stream => tokio::spawn(run_stream(
                name.clone(),
                command,
                interval,
                router,
                cancel.clone(),
            )),
        };

        info!("📡 Value source started for '{}' ({:?})", name, action.get_mode);
        workers.insert(name, SourceWorker { cancel, handle });
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.workers.lock().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn is_running(&self, action_name: &str) -> bool {
        self.workers.lock().contains_key(action_name)
    }

    /// Cancel one worker and wait for it to stop
    pub async fn stop(&self, action_name: &str) -> bool {
        // Lock released before awaiting the join
        let worker = self.workers.lock().remove(action_name);

        match worker {
            Some(worker) => {
                worker.cancel.cancel();
                join_worker(action_name, worker.handle).await;
                true
            }
            None => false,
        }
    }

    /// Cancel every worker and wait for all of them
    pub async fn shutdown(&self) {
        self.shutdown.cancel();

        let workers: Vec<(String, SourceWorker)> = self.workers.lock().drain().collect();
        if workers.is_empty() {
            return;
        }

        info!("🛑 Stopping {} value source(s)", workers.len());
        for (name, worker) in workers {
            join_worker(&name, worker.handle).await;
        }
    }
}

async fn join_worker(name: &str, handle: JoinHandle<()>) {
    match tokio::time::timeout(JOIN_TIMEOUT, handle).await {
        Ok(Ok(())) => debug!(action = %name, "Value source stopped"),
        Ok(Err(e)) => error!("Value source '{}' task failed: {}", name, e),
        Err(_) => warn!("Value source '{}' did not stop within timeout, abandoning", name),
    }
}

/// Run the command to completion, push a sample, sleep, repeat
async fn run_poll(
    name: String,
    command: String,
    interval: Duration,
    router: RouterHandle,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            result = poll_once(&command) => match result {
                Ok(Some(value)) => router.push_sample(name.as_str(), value),
                Ok(None) => debug!(action = %name, "No number in value source output"),
                Err(e) => warn!("⚠️  Value source '{}' failed: {:#}", name, e),
            },
        }

        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(interval) => {}
        }
    }

    debug!(action = %name, "Poll worker exiting");
}

async fn poll_once(command: &str) -> Result<Option<f64>> {
    let child = shell::group_command(command)
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .with_context(|| format!("Failed to run '{}'", command))?;
    // Also ends anything the command left running
    let _group = shell::GroupGuard::new(&child);

    let output = tokio::time::timeout(POLL_COMMAND_TIMEOUT, child.wait_with_output())
        .await
        .with_context(|| format!("'{}' timed out", command))?
        .with_context(|| format!("Failed to read output of '{}'", command))?;

    if !output.status.success() {
        anyhow::bail!("'{}' exited with {}", command, output.status);
    }

    Ok(parse_value(&String::from_utf8_lossy(&output.stdout)))
}

/// Keep the command running and push a sample for every numeric output line
///
/// Lines are decoded lossily, so invalid UTF-8 never ends the read loop. The
/// command is restarted only after its stdout closes.
async fn run_stream(
    name: String,
    command: String,
    restart_delay: Duration,
    router: RouterHandle,
    cancel: CancellationToken,
) {
    'outer: loop {
        let spawned = shell::group_command(&command)
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn();

        match spawned {
            Ok(mut child) => {
                let group = shell::GroupGuard::new(&child);

                if let Some(stdout) = child.stdout.take() {
                    let mut lines = BufReader::new(stdout).split(b'\n');
                    loop {
                        tokio::select! {
                            _ = cancel.cancelled() => {
                                drop(group);
                                let _ = child.kill().await;
                                break 'outer;
                            }
                            line = lines.next_segment() => match line {
                                Ok(Some(line)) => {
                                    if let Some(value) = parse_value(&String::from_utf8_lossy(&line)) {
                                        router.push_sample(name.as_str(), value);
                                    }
                                }
                                Ok(None) => break,
                                Err(e) => {
                                    warn!("⚠️  Value source '{}' read error: {}", name, e);
                                    break;
                                }
                            },
                        }
                    }
                }
                drop(group);
                let _ = child.kill().await;
                info!("Value source '{}' exited, restarting", name);
            }
            Err(e) => warn!("⚠️  Failed to start value source '{}': {}", name, e),
        }

        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(restart_delay) => {}
        }
    }

    debug!(action = %name, "Stream worker exiting");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::router::{channels, StateMessage};

    fn source_action(name: &str, mode: SourceMode) -> ActionConfig {
        ActionConfig {
            name: name.to_string(),
            placeholder: "{value}".to_string(),
            relative: false,
            scaling: None,
            round: true,
            get_command: Some("unused".to_string()),
            get_mode: mode,
            poll_interval_ms: 50,
            steps: vec![],
        }
    }

    #[test]
    fn test_parse_value() {
        assert_eq!(parse_value("42\n"), Some(42.0));
        assert_eq!(parse_value("volume: -3.5 dB"), Some(-3.5));
        assert_eq!(parse_value("0"), Some(0.0));
        assert_eq!(parse_value("12 and 13"), Some(12.0));
        assert_eq!(parse_value("muted"), None);
        assert_eq!(parse_value(""), None);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_poll_worker_pushes_samples() {
        let (router, mut rx) = channels();
        let workers = SourceWorkers::new();

        workers.start(
            &source_action("vol", SourceMode::Poll),
            "echo 42".to_string(),
            router,
        );
        assert!(workers.is_running("vol"));

        let msg = tokio::time::timeout(Duration::from_secs(5), rx.state_rx.recv())
            .await
            .unwrap();
        assert_eq!(
            msg,
            Some(StateMessage::ValueSample {
                action_name: "vol".to_string(),
                value: 42.0
            })
        );

        assert!(workers.stop("vol").await);
        assert!(!workers.is_running("vol"));
        assert!(!workers.stop("vol").await);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_stream_worker_reads_every_line() {
        let (router, mut rx) = channels();
        let workers = SourceWorkers::new();

        workers.start(
            &source_action("level", SourceMode::Stream),
            "echo 1; echo none; echo 2; sleep 30".to_string(),
            router,
        );

        let mut values = Vec::new();
        while values.len() < 2 {
            let msg = tokio::time::timeout(Duration::from_secs(5), rx.state_rx.recv())
                .await
                .unwrap();
            if let Some(StateMessage::ValueSample { value, .. }) = msg {
                values.push(value);
            }
        }
        assert_eq!(values, vec![1.0, 2.0]);

        // The sleeping child must not keep shutdown waiting
        tokio::time::timeout(Duration::from_secs(3), workers.shutdown())
            .await
            .unwrap();
        assert!(workers.names().is_empty());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failing_source_keeps_polling() {
        let (router, mut rx) = channels();
        let workers = SourceWorkers::new();

        workers.start(
            &source_action("broken", SourceMode::Poll),
            "exit 3".to_string(),
            router,
        );

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(workers.is_running("broken"));
        assert!(rx.state_rx.try_recv().is_err());

        workers.shutdown().await;
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_stream_survives_invalid_utf8() {
        let (router, mut rx) = channels();
        let workers = SourceWorkers::new();

        workers.start(
            &source_action("level", SourceMode::Stream),
            r"printf '\377\n7\n'; sleep 30".to_string(),
            router,
        );

        let msg = tokio::time::timeout(Duration::from_secs(5), rx.state_rx.recv())
            .await
            .unwrap();
        assert_eq!(
            msg,
            Some(StateMessage::ValueSample {
                action_name: "level".to_string(),
                value: 7.0
            })
        );

        workers.shutdown().await;
    }

    /// Whether `pid` is still a live (non-zombie) process
    #[cfg(target_os = "linux")]
    fn process_alive(pid: u32) -> bool {
        match std::fs::read_to_string(format!("/proc/{}/stat", pid)) {
            Ok(stat) => stat
                .rsplit_once(')')
                .and_then(|(_, rest)| rest.trim_start().chars().next())
                .map_or(false, |state| state != 'Z' && state != 'X'),
            Err(_) => false,
        }
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_shutdown_kills_forked_processes() {
        let (router, mut rx) = channels();
        let workers = SourceWorkers::new();

        // The only output line is the pid of the background sleep
        workers.start(
            &source_action("forks", SourceMode::Stream),
            "sleep 30 & echo $!; wait".to_string(),
            router,
        );

        let pid = match tokio::time::timeout(Duration::from_secs(5), rx.state_rx.recv()).await {
            Ok(Some(StateMessage::ValueSample { value, .. })) => value as u32,
            other => panic!("expected the forked pid, got {:?}", other),
        };
        assert!(process_alive(pid));

        workers.shutdown().await;

        let mut alive = true;
        for _ in 0..100 {
            alive = process_alive(pid);
            if !alive {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(!alive, "forked process {} outlived its value source", pid);
    }
}
