//! Wrap decorator: forces every node of a cluster to share one data-home
//! directory.
//!
//! Satisfies the controller contract itself and holds the decorated
//! controller as an owned trait object, so it layers transparently over any
//! backend. Identity-carrying calls (`start`, `create_genesis_block`) get
//! the home directory injected before forwarding; name-carrying calls pass
//! through unchanged.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::info;

use crate::errors::{ManagementError, ManagementResult};
use crate::manage::NodeController;
use crate::node::NodeIdentity;

/// Standard subdirectory skeleton created under the data home.
const SUB_DIRS: [&str; 5] = ["keys", "data", "logs", "etc", "run"];

pub struct WrappedNodeController {
    inner: Box<dyn NodeController>,
    data_dir: PathBuf,
    owned: bool,
}

impl WrappedNodeController {
    /// Wrap `inner` with a shared data home.
    ///
    /// With no explicit `data_dir` a private temporary directory is
    /// allocated and recorded as owned (and therefore deletable by
    /// [`clean`](NodeController::clean)). An explicit path is used verbatim;
    /// it is owned only if `owned` says so.
    pub fn new(
        inner: Box<dyn NodeController>,
        data_dir: Option<PathBuf>,
        owned: Option<bool>,
    ) -> ManagementResult<Self> {
        let (data_dir, owned) = match data_dir {
            None => {
                let dir = tempfile::Builder::new()
                    .prefix("valnet-home-")
                    .tempdir()
                    .map_err(|source| ManagementError::Io {
                        path: std::env::temp_dir(),
                        source,
                    })?
                    .keep();
                info!(data_dir = %dir.display(), "allocated cluster data home");
                (dir, true)
            }
            Some(dir) => {
                if !dir.is_dir() {
                    std::fs::create_dir_all(&dir)
                        .map_err(|source| ManagementError::Io { path: dir.clone(), source })?;
                }
                (dir, owned.unwrap_or(false))
            }
        };
        for sub in SUB_DIRS {
            let sub_dir = data_dir.join(sub);
            if !sub_dir.is_dir() {
                std::fs::create_dir_all(&sub_dir)
                    .map_err(|source| ManagementError::Io { path: sub_dir.clone(), source })?;
            }
        }
        Ok(Self { inner, data_dir, owned })
    }

    /// The shared data-home directory.
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Whether this controller owns (and may delete) the data home.
    pub fn owns_data_dir(&self) -> bool {
        self.owned
    }

    fn wrap(&self, identity: &NodeIdentity) -> NodeIdentity {
        let mut identity = identity.clone();
        identity.data_home = Some(self.data_dir.clone());
        identity
    }
}

#[async_trait]
impl NodeController for WrappedNodeController {
    async fn start(&self, identity: &NodeIdentity) -> ManagementResult<()> {
        self.inner.start(&self.wrap(identity)).await
    }

    async fn stop(&self, node_name: &str) -> ManagementResult<()> {
        self.inner.stop(node_name).await
    }

    async fn kill(&self, node_name: &str) -> ManagementResult<()> {
        self.inner.kill(node_name).await
    }

    async fn get_node_names(&self) -> ManagementResult<Vec<String>> {
        self.inner.get_node_names().await
    }

    async fn is_running(&self, node_name: &str) -> ManagementResult<bool> {
        self.inner.is_running(node_name).await
    }

    async fn create_genesis_block(&self, identity: &NodeIdentity) -> ManagementResult<()> {
        self.inner.create_genesis_block(&self.wrap(identity)).await
    }

    async fn clean(&self) -> ManagementResult<()> {
        self.inner.clean().await?;
        if self.owned && self.data_dir.is_dir() {
            info!(data_dir = %self.data_dir.display(), "removing owned cluster data home");
            std::fs::remove_dir_all(&self.data_dir)
                .map_err(|source| ManagementError::Io { path: self.data_dir.clone(), source })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manage::mock::MockNodeController;
    use tempfile::TempDir;

    #[tokio::test]
    async fn auto_allocated_home_is_owned_and_cleaned() {
        let mock = MockNodeController::new();
        let wrapped = WrappedNodeController::new(Box::new(mock), None, None).unwrap();
        let home = wrapped.data_dir().to_path_buf();
        assert!(wrapped.owns_data_dir());
        for sub in SUB_DIRS {
            assert!(home.join(sub).is_dir(), "missing {sub}");
        }
        wrapped.clean().await.unwrap();
        assert!(!home.exists());
    }

    #[tokio::test]
    async fn explicit_home_is_not_owned_by_default() {
        let dir = TempDir::new().unwrap();
        let mock = MockNodeController::new();
        let wrapped =
            WrappedNodeController::new(Box::new(mock), Some(dir.path().to_path_buf()), None)
                .unwrap();
        assert!(!wrapped.owns_data_dir());
        wrapped.clean().await.unwrap();
        assert!(dir.path().exists());
    }

    #[tokio::test]
    async fn start_injects_data_home() {
        let dir = TempDir::new().unwrap();
        let mock = MockNodeController::new();
        let inner = mock.clone();
        let wrapped =
            WrappedNodeController::new(Box::new(mock), Some(dir.path().to_path_buf()), None)
                .unwrap();
        let identity = crate::node::NodeIdentity::from_index(0);
        wrapped.start(&identity).await.unwrap();
        let started = inner.started_identities();
        assert_eq!(started.len(), 1);
        assert_eq!(started[0].data_home.as_deref(), Some(dir.path()));
    }
}
