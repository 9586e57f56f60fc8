//! Daemon backend: validators run as self-daemonizing processes tracked
//! through pid files.
//!
//! The launcher process is awaited to completion; the validator itself
//! detaches and writes `{state_dir}/{name}.pid`. Inventory is the set of pid
//! files whose pid is currently alive (probed with signal 0), so a validator
//! that crashed without removing its pid file does not show up as running.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use tokio::process::Command;
use tracing::{debug, info};

use crate::config::ClusterConfig;
use crate::errors::{ManagementError, ManagementResult};
use crate::manage::subprocess::NODE_HOME_ENV;
use crate::manage::NodeController;
use crate::node::NodeIdentity;

/// Attempts to read a pid file before giving up, 1s apart.
const PID_FILE_ATTEMPTS: u32 = 3;

pub struct DaemonNodeController {
    state_dir: PathBuf,
    validator_bin: String,
    admin_bin: String,
    verbose: bool,
}

impl DaemonNodeController {
    pub fn new(config: &ClusterConfig) -> ManagementResult<Self> {
        let state_dir = config.daemon_state_dir.clone();
        std::fs::create_dir_all(&state_dir)
            .map_err(|source| ManagementError::Io { path: state_dir.clone(), source })?;
        Ok(Self {
            state_dir,
            validator_bin: config.validator_bin.clone(),
            admin_bin: config.admin_bin.clone(),
            verbose: config.verbose,
        })
    }

    fn pid_file(&self, node_name: &str) -> PathBuf {
        self.state_dir.join(format!("{node_name}.pid"))
    }

    /// Read a node's pid, retrying while the freshly-daemonized validator is
    /// still writing its pid file.
    async fn get_validator_pid(&self, node_name: &str) -> ManagementResult<i32> {
        let pid_file = self.pid_file(node_name);
        for attempt in 0..PID_FILE_ATTEMPTS {
            if pid_file.exists() {
                match read_pid(&pid_file) {
                    Some(pid) => return Ok(pid),
                    None if attempt + 1 == PID_FILE_ATTEMPTS => {
                        return Err(ManagementError::InvalidPidFile { path: pid_file });
                    }
                    None => {}
                }
            }
            tokio::time::sleep(Duration::from_secs(1)).await;
        }
        Err(ManagementError::MissingPidFile { path: pid_file })
    }

    async fn signal(&self, node_name: &str, sig: Signal) -> ManagementResult<()> {
        let pid = match self.get_validator_pid(node_name).await {
            Ok(pid) => pid,
            // No pid file after the retry window: the backend has no record
            // of this name, and stop/kill of an unknown name is a no-op.
            Err(ManagementError::MissingPidFile { path }) => {
                debug!(node = node_name, pid_file = %path.display(), "no pid file, nothing to signal");
                return Ok(());
            }
            Err(e) => return Err(e),
        };
        match signal::kill(Pid::from_raw(pid), sig) {
            Ok(()) => Ok(()),
            // Already gone; stop/kill of a dead node is not an error.
            Err(nix::errno::Errno::ESRCH) => Ok(()),
            Err(errno) => Err(ManagementError::SignalFailed { pid, errno }),
        }
    }
}

/// Probe liveness without delivering a signal.
fn pid_exists(pid: i32) -> bool {
    signal::kill(Pid::from_raw(pid), None).is_ok()
}

fn read_pid(pid_file: &Path) -> Option<i32> {
    let contents = std::fs::read_to_string(pid_file).ok()?;
    contents.lines().next()?.trim().parse().ok()
}

#[async_trait]
impl NodeController for DaemonNodeController {
    async fn start(&self, identity: &NodeIdentity) -> ManagementResult<()> {
        if self.is_running(&identity.name).await? {
            return Ok(());
        }
        let pid_file = self.pid_file(&identity.name);
        let mut cmd = Command::new(&self.validator_bin);
        cmd.arg("-vv");
        cmd.args(["--node", &identity.name]);
        cmd.args([
            "--listen",
            &format!("127.0.0.1:{}/UDP gossip", identity.gossip_port),
        ]);
        cmd.args([
            "--listen",
            &format!("127.0.0.1:{}/TCP http", identity.http_port),
        ]);
        cmd.arg("--pidfile").arg(&pid_file);
        if identity.genesis {
            cmd.arg("--genesis");
        }
        cmd.arg("--daemon");
        if let Some(home) = &identity.data_home {
            cmd.env(NODE_HOME_ENV, home);
        }
        debug!(node = %identity.name, pid_file = %pid_file.display(), "starting daemonized validator");
        let status = cmd
            .status()
            .await
            .map_err(|source| ManagementError::SpawnFailed {
                command: self.validator_bin.clone(),
                source,
            })?;
        if !status.success() {
            return Err(ManagementError::CommandFailed {
                command: self.validator_bin.clone(),
                code: status.code(),
                stderr: String::new(),
            });
        }
        info!(node = %identity.name, "validator daemonized");
        Ok(())
    }

    async fn stop(&self, node_name: &str) -> ManagementResult<()> {
        self.signal(node_name, Signal::SIGTERM).await
    }

    async fn kill(&self, node_name: &str) -> ManagementResult<()> {
        self.signal(node_name, Signal::SIGKILL).await
    }

    async fn get_node_names(&self) -> ManagementResult<Vec<String>> {
        let entries = std::fs::read_dir(&self.state_dir)
            .map_err(|source| ManagementError::Io { path: self.state_dir.clone(), source })?;
        let mut names = Vec::new();
        for entry in entries {
            let entry =
                entry.map_err(|source| ManagementError::Io { path: self.state_dir.clone(), source })?;
            let file_name = entry.file_name();
            let Some(name) = file_name.to_string_lossy().strip_suffix(".pid").map(str::to_owned)
            else {
                continue;
            };
            if read_pid(&entry.path()).is_some_and(pid_exists) {
                names.push(name);
            }
        }
        Ok(names)
    }

    async fn is_running(&self, node_name: &str) -> ManagementResult<bool> {
        let pid_file = self.pid_file(node_name);
        if !pid_file.exists() {
            return Ok(false);
        }
        match read_pid(&pid_file) {
            Some(pid) => Ok(pid_exists(pid)),
            None => Err(ManagementError::InvalidPidFile { path: pid_file }),
        }
    }

    async fn create_genesis_block(&self, identity: &NodeIdentity) -> ManagementResult<()> {
        if self.is_running(&identity.name).await? {
            return Ok(());
        }
        // The daemonized validator materializes genesis itself when launched
        // with --genesis; only the admin key needs to exist up front.
        let key_dir = identity
            .data_home
            .as_ref()
            .map(|h| h.join("keys"))
            .unwrap_or_else(|| self.state_dir.join("keys"));
        std::fs::create_dir_all(&key_dir)
            .map_err(|source| ManagementError::Io { path: key_dir.clone(), source })?;
        let mut cmd = Command::new(&self.admin_bin);
        cmd.args(["keygen", &identity.name, "--key-dir"]).arg(&key_dir);
        if !self.verbose {
            cmd.arg("--quiet");
        }
        let command = format!("{} keygen {}", self.admin_bin, identity.name);
        let output = cmd.output().await.map_err(|source| ManagementError::SpawnFailed {
            command: command.clone(),
            source,
        })?;
        if !output.status.success() {
            return Err(ManagementError::CommandFailed {
                command,
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        }
        Ok(())
    }
}
