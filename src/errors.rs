//! Infrastructure-tier errors raised by controllers and the network manager.
//!
//! Operator-facing precondition errors live in [`crate::cluster::ClusterError`];
//! this module covers backend failures that propagate upward and are never
//! silently swallowed (except at the single documented point: per-node kill
//! failures during `shutdown`, which are logged and skipped).

use std::path::PathBuf;

/// Result type for management operations.
pub type ManagementResult<T> = Result<T, ManagementError>;

/// Backend/infrastructure failures from node controllers and the VNM.
#[derive(Debug, thiserror::Error)]
pub enum ManagementError {
    /// Spawning an external process failed.
    #[error("failed to spawn {command}: {source}")]
    SpawnFailed {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// An external command ran but exited unsuccessfully.
    #[error("{command} exited with {code:?}: {stderr}")]
    CommandFailed {
        command: String,
        code: Option<i32>,
        stderr: String,
    },

    /// Delivering a signal to a managed process failed.
    #[error("failed to signal pid {pid}: {errno}")]
    SignalFailed { pid: i32, errno: nix::errno::Errno },

    /// A pid file exists but does not contain a parseable pid.
    #[error("invalid pid file: {path}")]
    InvalidPidFile { path: PathBuf },

    /// A pid file never appeared within the retry window.
    #[error("no such file: {path}")]
    MissingPidFile { path: PathBuf },

    /// A roster-position operation referenced an index past the roster end.
    #[error("index {index} out of range (roster length {len})")]
    IndexOutOfRange { index: usize, len: usize },

    /// Strict sit-rep found declared intent disagreeing with observed reality.
    #[error("unexpected state: {mismatches:?}")]
    UnexpectedState { mismatches: Vec<String> },

    /// Filesystem operation on backend-owned resources failed.
    #[error("io error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
