//! Cluster control loop: the persisted-state-driven operator commands.
//!
//! Every command loads the durable state record, constructs the
//! controller/generator/VNM triad, computes what should change, drives the
//! change through the network manager, and persists the updated record.
//! State is saved only after a successful mutation batch; operator-facing
//! precondition failures never corrupt it.

pub mod commands;
pub mod state;

use std::path::PathBuf;

use crate::errors::ManagementError;
use crate::manage::ManageKind;

pub use commands::{
    ClusterContext, ControllerFactory, ExtendOutcome, ProductionControllerFactory, StartOptions,
    StartOutcome, StatusRow, StopOutcome,
};
pub use state::{ClusterState, DesiredState, NodeRuntimeRecord, NodeStatus, WrapSetting};

/// Operator-facing errors: precondition violations surfaced verbatim.
/// Terminal for the current invocation, never state-corrupting.
#[derive(Debug, thiserror::Error)]
pub enum ClusterError {
    #[error("missing state file: {path} (run 'cluster start' first)")]
    MissingStateFile { path: PathBuf },

    #[error("cannot read or write state at {path}: {source}")]
    StateIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("state file {path} is not a valid cluster record: {source}")]
    StateCorrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to encode cluster state: {source}")]
    StateEncode {
        #[source]
        source: serde_json::Error,
    },

    #[error(
        "cannot use two different manage types; already running {current}. \
         Try again after running 'cluster reset'"
    )]
    ManageKindConflict { current: ManageKind },

    #[error("state record does not name a manage type")]
    NoManageKind,

    #[error("already wrapped to {existing}")]
    AlreadyWrapped { existing: String },

    #[error(
        "you must have a running network; use the 'cluster start' command \
         to start a validator network"
    )]
    NotRunning,

    #[error(
        "cannot reset with running nodes; still running: {names:?}. \
         Rerun after calling 'cluster stop'"
    )]
    NodesStillRunning { names: Vec<String> },

    #[error(transparent)]
    Management(#[from] ManagementError),
}
