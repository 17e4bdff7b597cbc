//! Platform shell helpers shared by command steps and value sources

use std::path::Path;
use std::process::Stdio;
use tokio::process::{Child, Command};

/// Token replaced by the scripts directory in command lines
pub const SCRIPTS_TOKEN: &str = "{scripts}";

/// Build a command running `line` through the platform shell
///
/// stdin is closed; callers decide what to do with stdout/stderr.
pub fn command(line: &str) -> Command {
    #[cfg(windows)]
    let mut cmd = {
        let mut cmd = Command::new("cmd");
        cmd.arg("/C").arg(line);
        cmd
    };

    #[cfg(not(windows))]
    let mut cmd = {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(line);
        cmd
    };

    cmd.stdin(Stdio::null());
    cmd
}

/// Like [`command`], but the child leads a new process group on unix
///
/// Pair the spawned child with a [`GroupGuard`] so that everything the
/// command line forks goes away with it.
pub fn group_command(line: &str) -> Command {
    let mut cmd = command(line);
    #[cfg(unix)]
    cmd.process_group(0);
    cmd.kill_on_drop(true);
    cmd
}

/// Kills the process group of a [`group_command`] child when dropped
pub struct GroupGuard {
    #[cfg_attr(not(unix), allow(dead_code))]
    pid: Option<u32>,
}

impl GroupGuard {
    pub fn new(child: &Child) -> Self {
        Self { pid: child.id() }
    }
}

impl Drop for GroupGuard {
    fn drop(&mut self) {
        #[cfg(unix)]
        {
            use nix::sys::signal::{killpg, Signal};
            use nix::unistd::Pid;

            if let Some(pid) = self.pid.and_then(|pid| i32::try_from(pid).ok()) {
                // ESRCH once the whole group is gone
                let _ = killpg(Pid::from_raw(pid), Signal::SIGKILL);
            }
        }
    }
}

/// Replace every `{scripts}` token with the scripts directory
pub fn expand_scripts(line: &str, scripts_dir: &Path) -> String {
    line.replace(SCRIPTS_TOKEN, &scripts_dir.to_string_lossy())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expand_scripts() {
        let dir = Path::new("/opt/nobbler/scripts");
        assert_eq!(
            expand_scripts("python {scripts}/winvolume.py set 5", dir),
            "python /opt/nobbler/scripts/winvolume.py set 5"
        );
        assert_eq!(expand_scripts("echo hi", dir), "echo hi");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_command_runs_through_shell() {
        let output = command("echo one; echo two")
            .stdout(Stdio::piped())
            .output()
            .await
            .unwrap();
        assert!(output.status.success());
        assert_eq!(String::from_utf8_lossy(&output.stdout), "one\ntwo\n");
    }
}
