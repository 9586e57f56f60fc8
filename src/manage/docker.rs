//! Docker backend: validators run as containers driven through the `docker`
//! CLI.
//!
//! Containers are named after their node and carry a cluster label; the
//! label scopes every inventory query so unrelated containers on the host
//! are never touched. Port publishing follows the identity formula: the
//! node's http port over TCP and its gossip port over UDP.

use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info};

use crate::config::ClusterConfig;
use crate::errors::{ManagementError, ManagementResult};
use crate::manage::NodeController;
use crate::node::NodeIdentity;

/// Label attached to every container this controller creates.
const CLUSTER_LABEL: &str = "valnet.cluster=default";

pub struct DockerNodeController {
    image: String,
    admin_bin: String,
    verbose: bool,
}

impl DockerNodeController {
    pub fn new(config: &ClusterConfig) -> Self {
        Self {
            image: config.docker_image.clone(),
            admin_bin: config.admin_bin.clone(),
            verbose: config.verbose,
        }
    }

    /// Run one `docker` invocation to completion, returning stdout.
    async fn docker(&self, args: &[&str]) -> ManagementResult<String> {
        let command = format!("docker {}", args.join(" "));
        debug!(%command, "invoking docker");
        let output = Command::new("docker")
            .args(args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|source| ManagementError::SpawnFailed { command: command.clone(), source })?;
        if !output.status.success() {
            return Err(ManagementError::CommandFailed {
                command,
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[async_trait]
impl NodeController for DockerNodeController {
    async fn start(&self, identity: &NodeIdentity) -> ManagementResult<()> {
        if self.is_running(&identity.name).await? {
            return Ok(());
        }
        let http = format!("--publish={0}:{0}/tcp", identity.http_port);
        let gossip = format!("--publish={0}:{0}/udp", identity.gossip_port);
        let name = format!("--name={}", identity.name);
        let label = format!("--label={CLUSTER_LABEL}");
        let mut args = vec![
            "run", "--detach", &name, &label, &http, &gossip,
        ];
        let home_mount;
        if let Some(home) = &identity.data_home {
            home_mount = format!("--volume={}:/ledger-home", home.display());
            args.push(&home_mount);
        }
        args.push(&self.image);
        args.extend(["--node", &identity.name]);
        if self.verbose {
            args.push("-vv");
        }
        if identity.genesis {
            args.push("--genesis");
        }
        self.docker(&args).await?;
        info!(node = %identity.name, image = %self.image, "validator container started");
        Ok(())
    }

    async fn stop(&self, node_name: &str) -> ManagementResult<()> {
        if self.is_running(node_name).await? {
            self.docker(&["stop", node_name]).await?;
        }
        Ok(())
    }

    async fn kill(&self, node_name: &str) -> ManagementResult<()> {
        if self.is_running(node_name).await? {
            self.docker(&["rm", "--force", node_name]).await?;
        }
        Ok(())
    }

    async fn get_node_names(&self) -> ManagementResult<Vec<String>> {
        let filter = format!("--filter=label={CLUSTER_LABEL}");
        let out = self
            .docker(&["ps", &filter, "--format", "{{.Names}}"])
            .await?;
        Ok(out.lines().map(str::to_owned).filter(|l| !l.is_empty()).collect())
    }

    async fn create_genesis_block(&self, identity: &NodeIdentity) -> ManagementResult<()> {
        if self.is_running(&identity.name).await? {
            return Ok(());
        }
        // One-shot container invoking the admin tool against the shared
        // volume; the genesis state must exist before the node first starts.
        let mut args = vec!["run".to_string(), "--rm".to_string()];
        if let Some(home) = &identity.data_home {
            args.push(format!("--volume={}:/ledger-home", home.display()));
        }
        args.push(format!("--entrypoint={}", self.admin_bin));
        args.push(self.image.clone());
        args.push("genesis".to_string());
        args.extend(["--node".to_string(), identity.name.clone()]);
        let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();
        self.docker(&arg_refs).await?;
        info!(node = %identity.name, "genesis block created in container");
        Ok(())
    }

    async fn clean(&self) -> ManagementResult<()> {
        // Remove exited containers left behind by this cluster.
        let filter = format!("--filter=label={CLUSTER_LABEL}");
        let out = self
            .docker(&["ps", "--all", &filter, "--format", "{{.Names}}"])
            .await?;
        for name in out.lines().filter(|l| !l.is_empty()) {
            self.docker(&["rm", "--force", name]).await?;
        }
        Ok(())
    }
}
