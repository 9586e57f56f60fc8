//! Subprocess backend: validators run as direct children of this process.
//!
//! Child handles live in an internal map. The map is reconciled against
//! reality on every inventory query (`get_node_names` polls each handle and
//! drops the dead ones), so stop/kill stay non-blocking and the model is
//! correct the next time someone checks.
//!
//! Because the children die with this process, this backend is only useful
//! together with the foreground supervisor loop in the cluster commands.

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::ClusterConfig;
use crate::errors::{ManagementError, ManagementResult};
use crate::manage::NodeController;
use crate::node::NodeIdentity;

/// Environment variable carrying the shared data-home directory to spawned
/// validators.
pub const NODE_HOME_ENV: &str = "LEDGER_HOME";

pub struct SubprocessNodeController {
    host_name: String,
    validator_bin: String,
    admin_bin: String,
    verbose: bool,
    nodes: Mutex<HashMap<String, Child>>,
}

impl SubprocessNodeController {
    pub fn new(config: &ClusterConfig) -> Self {
        Self {
            host_name: config.host_name.clone(),
            validator_bin: config.validator_bin.clone(),
            admin_bin: config.admin_bin.clone(),
            verbose: config.verbose,
            nodes: Mutex::new(HashMap::new()),
        }
    }

    fn start_command(&self, identity: &NodeIdentity) -> ManagementResult<Command> {
        let mut cmd = Command::new(&self.validator_bin);
        if self.verbose {
            cmd.arg("-vv");
        }
        cmd.args(["--node", &identity.name]);
        cmd.args([
            "--listen",
            &format!("{}:{}/TCP http", self.host_name, identity.http_port),
        ]);
        cmd.args([
            "--listen",
            &format!("{}:{}/UDP gossip", self.host_name, identity.gossip_port),
        ]);
        for file in &identity.config_files {
            cmd.arg("--config").arg(file);
        }
        if identity.genesis {
            // The initial validator must not wait for peers before serving.
            if let Some(conf_dir) = identity.data_home.as_ref().map(|h| h.join("etc")) {
                let conf_file = conf_dir.join("initial_node.json");
                std::fs::create_dir_all(&conf_dir).map_err(|source| ManagementError::Io {
                    path: conf_dir.clone(),
                    source,
                })?;
                std::fs::write(&conf_file, "{\n    \"InitialConnectivity\": 0\n}\n").map_err(
                    |source| ManagementError::Io { path: conf_file.clone(), source },
                )?;
                cmd.arg("--conf-dir").arg(&conf_dir);
                cmd.args(["--config", "initial_node.json"]);
            }
        }
        if let Some(home) = &identity.data_home {
            cmd.env(NODE_HOME_ENV, home);
        }
        Ok(cmd)
    }

    fn key_dir(identity: &NodeIdentity) -> PathBuf {
        identity
            .data_home
            .as_ref()
            .map(|h| h.join("keys"))
            .unwrap_or_else(|| PathBuf::from("."))
    }

    /// Run an admin-tool invocation to completion, surfacing a non-zero exit
    /// as a ManagementError with captured stderr.
    async fn run_admin(&self, args: &[String], identity: &NodeIdentity) -> ManagementResult<()> {
        let mut cmd = Command::new(&self.admin_bin);
        cmd.args(args);
        if let Some(home) = &identity.data_home {
            cmd.env(NODE_HOME_ENV, home);
        }
        cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
        let command = format!("{} {}", self.admin_bin, args.join(" "));
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

    async fn signal(&self, node_name: &str, sig: Signal) {
        let nodes = self.nodes.lock().await;
        let Some(child) = nodes.get(node_name) else {
            return;
        };
        let Some(pid) = child.id() else {
            return; // already exited
        };
        if let Err(errno) = signal::kill(Pid::from_raw(pid as i32), sig) {
            // The process may die between the inventory check and the signal.
            if errno != nix::errno::Errno::ESRCH {
                debug!(node = node_name, signal = ?sig, error = ?errno, "signal delivery failed");
            }
        }
    }
}

#[async_trait]
impl NodeController for SubprocessNodeController {
    async fn start(&self, identity: &NodeIdentity) -> ManagementResult<()> {
        if self.is_running(&identity.name).await? {
            return Ok(());
        }
        let mut cmd = self.start_command(identity)?;
        let mut child = cmd.spawn().map_err(|source| ManagementError::SpawnFailed {
            command: self.validator_bin.clone(),
            source,
        })?;
        match child.try_wait() {
            Ok(None) => {
                info!(node = %identity.name, http_port = identity.http_port, "validator started");
                self.nodes.lock().await.insert(identity.name.clone(), child);
            }
            Ok(Some(status)) => {
                warn!(node = %identity.name, ?status, "validator exited immediately");
            }
            Err(source) => {
                return Err(ManagementError::SpawnFailed {
                    command: self.validator_bin.clone(),
                    source,
                });
            }
        }
        Ok(())
    }

    async fn stop(&self, node_name: &str) -> ManagementResult<()> {
        if self.is_running(node_name).await? {
            self.signal(node_name, Signal::SIGTERM).await;
        }
        Ok(())
    }

    async fn kill(&self, node_name: &str) -> ManagementResult<()> {
        if self.is_running(node_name).await? {
            self.signal(node_name, Signal::SIGKILL).await;
        }
        Ok(())
    }

    async fn get_node_names(&self) -> ManagementResult<Vec<String>> {
        let mut nodes = self.nodes.lock().await;
        let mut dead = Vec::new();
        for (name, child) in nodes.iter_mut() {
            if !matches!(child.try_wait(), Ok(None)) {
                dead.push(name.clone());
            }
        }
        for name in dead {
            debug!(node = %name, "dropping handle for exited validator");
            nodes.remove(&name);
        }
        Ok(nodes.keys().cloned().collect())
    }

    async fn create_genesis_block(&self, identity: &NodeIdentity) -> ManagementResult<()> {
        if self.is_running(&identity.name).await? {
            return Ok(());
        }
        let key_dir = Self::key_dir(identity);
        std::fs::create_dir_all(&key_dir)
            .map_err(|source| ManagementError::Io { path: key_dir.clone(), source })?;

        // Create the initial validator's key.
        let mut keygen = vec![
            "keygen".to_string(),
            identity.name.clone(),
            "--key-dir".to_string(),
            key_dir.display().to_string(),
        ];
        if !self.verbose {
            keygen.push("--quiet".to_string());
        }
        self.run_admin(&keygen, identity).await?;

        // Author the genesis block with that key.
        let mut genesis = vec!["genesis".to_string()];
        if self.verbose {
            genesis.push("-vv".to_string());
        }
        genesis.extend([
            "--node".to_string(),
            identity.name.clone(),
            "--keyfile".to_string(),
            key_dir.join(format!("{}.key", identity.name)).display().to_string(),
        ]);
        self.run_admin(&genesis, identity).await?;
        info!(node = %identity.name, "genesis block created");
        Ok(())
    }
}
