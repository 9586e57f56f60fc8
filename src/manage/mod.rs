//! Node lifecycle management: backend contract, implementations, decorators,
//! command generators, and the validator network manager.
//!
//! The [`NodeController`] trait is the capability contract any execution
//! backend must satisfy to be pluggable. Three backends ship in-tree
//! (subprocess, daemon, docker); callers may not depend on backend-specific
//! behavior beyond the contract.

pub mod command;
pub mod daemon;
pub mod docker;
pub mod mock;
pub mod subprocess;
pub mod vnm;
pub mod wrap;

use async_trait::async_trait;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::config::ClusterConfig;
use crate::errors::ManagementResult;
use crate::node::NodeIdentity;

pub use command::{IndexedNodeCommandGenerator, NodeCommandGenerator};
pub use vnm::{IndexedValidatorNetworkManager, ObservedStatus, ValidatorNetworkManager};
pub use wrap::WrappedNodeController;

/// Capability contract for one execution substrate.
///
/// All operations block (await) on the external process/container runtime
/// before returning; within one command invocation no two controller calls
/// overlap.
#[async_trait]
pub trait NodeController: Send + Sync {
    /// Bring one node's process/container into existence using its
    /// identity's ports and configuration.
    async fn start(&self, identity: &NodeIdentity) -> ManagementResult<()>;

    /// Request graceful termination by name. Stopping a name the backend has
    /// no record of is a no-op, not an error.
    async fn stop(&self, node_name: &str) -> ManagementResult<()>;

    /// Forceful termination; escalation after a stop that did not converge.
    async fn kill(&self, node_name: &str) -> ManagementResult<()>;

    /// The set of node names the backend currently considers alive. Queried
    /// fresh on every call; this is the sole source of "actual" state.
    async fn get_node_names(&self) -> ManagementResult<Vec<String>>;

    /// Whether the backend currently considers `node_name` alive.
    async fn is_running(&self, node_name: &str) -> ManagementResult<bool> {
        let names = self.get_node_names().await?;
        Ok(names.iter().any(|n| n == node_name))
    }

    /// Materialize the initial persistent ledger state for a
    /// genesis-designated identity. Must precede that identity's first
    /// `start`.
    async fn create_genesis_block(&self, identity: &NodeIdentity) -> ManagementResult<()>;

    /// Release backend-owned resources not tied to any single node.
    async fn clean(&self) -> ManagementResult<()> {
        Ok(())
    }
}

/// Which execution backend manages a cluster. Fixed once the cluster is
/// running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ManageKind {
    /// Direct child processes of the invoking command.
    Subprocess,
    /// Self-daemonizing processes tracked through pid files.
    Daemon,
    /// Docker containers driven through the `docker` CLI.
    Docker,
}

impl std::fmt::Display for ManageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ManageKind::Subprocess => write!(f, "subprocess"),
            ManageKind::Daemon => write!(f, "daemon"),
            ManageKind::Docker => write!(f, "docker"),
        }
    }
}

/// Construct the base controller for a backend kind.
///
/// Selection is configuration-driven; callers never branch on the kind
/// themselves.
pub fn build_controller(
    kind: ManageKind,
    config: &ClusterConfig,
) -> ManagementResult<Box<dyn NodeController>> {
    Ok(match kind {
        ManageKind::Subprocess => Box::new(subprocess::SubprocessNodeController::new(config)),
        ManageKind::Daemon => Box::new(daemon::DaemonNodeController::new(config)?),
        ManageKind::Docker => Box::new(docker::DockerNodeController::new(config)),
    })
}
