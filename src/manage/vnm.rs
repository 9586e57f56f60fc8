//! Validator network manager: binds one controller and one command
//! generator, and reconciles declared intent with backend-observed reality.
//!
//! Mutating calls are batched through the command generator; `update()` is
//! the reconciliation pass that executes the batch against the controller.
//! Inventory and status queries always hit the backend fresh and are only
//! trustworthy after the pending batch has been applied.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{error, info, warn};

use crate::errors::{ManagementError, ManagementResult};
use crate::manage::command::{IndexedNodeCommandGenerator, NodeCommand, NodeCommandGenerator};
use crate::manage::NodeController;

/// Poll cadence while waiting for a shutdown to converge.
const SHUTDOWN_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Controller-observed presence, mapped for display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ObservedStatus {
    Running,
    /// Recorded as running but absent from the live inventory.
    NotRunning,
    /// The backend has no record of the name.
    Unknown,
}

impl std::fmt::Display for ObservedStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ObservedStatus::Running => write!(f, "RUNNING"),
            ObservedStatus::NotRunning => write!(f, "Not Running"),
            ObservedStatus::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

/// Per-node line of a sit-rep: declared intent joined with observed reality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SitRepEntry {
    /// Declared: has `start` been issued for this roster entry.
    #[serde(rename = "Activated")]
    pub activated: bool,
    /// Observed: does the backend currently report the node alive.
    #[serde(rename = "Running")]
    pub running: bool,
}

pub struct ValidatorNetworkManager {
    controller: Arc<dyn NodeController>,
    generator: Arc<NodeCommandGenerator>,
}

impl ValidatorNetworkManager {
    pub fn new(controller: Arc<dyn NodeController>, generator: Arc<NodeCommandGenerator>) -> Self {
        Self { controller, generator }
    }

    /// Fresh backend inventory.
    pub async fn get_node_names(&self) -> ManagementResult<Vec<String>> {
        self.controller.get_node_names().await
    }

    pub async fn is_running(&self, node_name: &str) -> ManagementResult<bool> {
        self.controller.is_running(node_name).await
    }

    /// Observed status for display. A name unknown to the backend reports
    /// `Unknown` rather than failing.
    pub async fn status(&self, node_name: &str) -> ManagementResult<ObservedStatus> {
        if self.is_running(node_name).await? {
            Ok(ObservedStatus::Running)
        } else {
            Ok(ObservedStatus::Unknown)
        }
    }

    /// Reconciliation pass: execute the queued intent batch, in order,
    /// against the controller. Must run after any batch of mutating calls
    /// and before inventory queries are trusted.
    pub async fn update(&self) -> ManagementResult<()> {
        for command in self.generator.take_commands() {
            match command {
                NodeCommand::Genesis(identity) => {
                    self.controller.create_genesis_block(&identity).await?
                }
                NodeCommand::Start(identity) => self.controller.start(&identity).await?,
                NodeCommand::Stop(name) => self.controller.stop(&name).await?,
                NodeCommand::Kill(name) => self.controller.kill(&name).await?,
            }
        }
        Ok(())
    }

    /// Stop every observed node, wait up to `timeout` for the inventory to
    /// drain, force-kill stragglers, then release backend resources.
    ///
    /// Per-node kill failures are logged and skipped; one stubborn node must
    /// not block cleanup of the others.
    pub async fn shutdown(&self, timeout: Duration) -> ManagementResult<()> {
        for node_name in self.controller.get_node_names().await? {
            self.controller.stop(&node_name).await?;
        }
        let deadline = tokio::time::Instant::now() + timeout;
        while !self.controller.get_node_names().await?.is_empty() {
            if tokio::time::Instant::now() >= deadline {
                break;
            }
            tokio::time::sleep(SHUTDOWN_POLL_INTERVAL).await;
        }
        for node_name in self.controller.get_node_names().await? {
            warn!(node = %node_name, "did not stop within grace period, killing");
            if let Err(e) = self.controller.kill(&node_name).await {
                error!(node = %node_name, error = %e, "kill failed");
            }
        }
        self.controller.clean().await
    }
}

/// Network manager over a declared roster, adding roster-position operations
/// and the strict declared-vs-actual auditor used by test harnesses.
pub struct IndexedValidatorNetworkManager {
    inner: ValidatorNetworkManager,
    generator: Arc<IndexedNodeCommandGenerator>,
}

impl IndexedValidatorNetworkManager {
    pub fn new(
        controller: Arc<dyn NodeController>,
        generator: Arc<IndexedNodeCommandGenerator>,
        num_nodes: usize,
    ) -> Self {
        generator.append_nodes(num_nodes);
        let inner = ValidatorNetworkManager::new(controller, generator.base());
        Self { inner, generator }
    }

    /// Convenience constructor binding a fresh indexed generator.
    pub fn with_nodes(controller: Arc<dyn NodeController>, num_nodes: usize) -> Self {
        Self::new(controller, Arc::new(IndexedNodeCommandGenerator::new()), num_nodes)
    }

    pub async fn get_node_names(&self) -> ManagementResult<Vec<String>> {
        self.inner.get_node_names().await
    }

    pub async fn is_running(&self, node_name: &str) -> ManagementResult<bool> {
        self.inner.is_running(node_name).await
    }

    pub async fn status(&self, node_name: &str) -> ManagementResult<ObservedStatus> {
        self.inner.status(node_name).await
    }

    pub async fn update(&self) -> ManagementResult<()> {
        self.inner.update().await
    }

    pub async fn do_genesis(&self, index: usize, update: bool) -> ManagementResult<()> {
        self.generator.genesis_by_idx(index)?;
        if update {
            self.update().await?;
        }
        Ok(())
    }

    pub async fn start(&self, index: usize, update: bool) -> ManagementResult<()> {
        self.generator.start_by_idx(index)?;
        if update {
            self.update().await?;
        }
        Ok(())
    }

    pub async fn stop(&self, index: usize, update: bool) -> ManagementResult<()> {
        self.generator.stop_by_idx(index)?;
        if update {
            self.update().await?;
        }
        Ok(())
    }

    pub async fn kill(&self, index: usize, update: bool) -> ManagementResult<()> {
        self.generator.kill_by_idx(index)?;
        if update {
            self.update().await?;
        }
        Ok(())
    }

    /// Start every roster entry in index order and reconcile. Guarantees
    /// the genesis node is up before any peer starts.
    pub async fn launch(&self) -> ManagementResult<()> {
        self.generator.launch()?;
        self.update().await
    }

    /// Compute per roster entry `{activated, running}`. With `err_on_fail`,
    /// any entry whose declared intent disagrees with observed reality is
    /// logged and the whole report fails with a ManagementError naming the
    /// mismatches; with zero mismatches the declaration is returned
    /// unmodified.
    pub async fn sit_rep(
        &self,
        err_on_fail: bool,
    ) -> ManagementResult<BTreeMap<String, SitRepEntry>> {
        let mut report: BTreeMap<String, SitRepEntry> = self
            .generator
            .declaration()
            .into_iter()
            .map(|(name, activated)| (name, SitRepEntry { activated, running: false }))
            .collect();
        for node_name in self.inner.get_node_names().await? {
            if let Some(entry) = report.get_mut(&node_name) {
                entry.running = true;
            }
        }
        if err_on_fail {
            let mut mismatches = Vec::new();
            for (name, entry) in &report {
                if entry.activated != entry.running {
                    error!(
                        node = %name,
                        expected = entry.activated,
                        actual = entry.running,
                        "declared intent disagrees with observed state"
                    );
                    mismatches.push(name.clone());
                }
            }
            if !mismatches.is_empty() {
                return Err(ManagementError::UnexpectedState { mismatches });
            }
        }
        Ok(report)
    }

    /// Statistics URLs of the nodes the backend actually reports running.
    pub async fn urls(&self) -> ManagementResult<Vec<String>> {
        let possible = self.generator.urls();
        let mut urls = Vec::new();
        for node_name in self.inner.get_node_names().await? {
            if let Some(url) = possible.get(&node_name) {
                urls.push(url.clone());
            }
        }
        Ok(urls)
    }

    pub async fn shutdown(&self, timeout: Duration) -> ManagementResult<()> {
        info!(timeout_secs = timeout.as_secs(), "shutting down validator network");
        self.inner.shutdown(timeout).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manage::mock::MockNodeController;

    fn indexed(mock: &MockNodeController, num_nodes: usize) -> IndexedValidatorNetworkManager {
        IndexedValidatorNetworkManager::with_nodes(Arc::new(mock.clone()), num_nodes)
    }

    #[tokio::test]
    async fn update_executes_batch_in_order() {
        let mock = MockNodeController::new();
        let vnm = indexed(&mock, 2);
        vnm.do_genesis(0, false).await.unwrap();
        vnm.launch().await.unwrap();

        let genesis = mock.genesis_identities();
        assert_eq!(genesis.len(), 1);
        assert_eq!(genesis[0].name, "validator-000");
        let started = mock.started_identities();
        assert_eq!(started.len(), 2);
        // Genesis node starts before any peer.
        assert_eq!(started[0].name, "validator-000");
        assert_eq!(started[1].name, "validator-001");
    }

    #[tokio::test]
    async fn status_maps_presence() {
        let mock = MockNodeController::with_running(["validator-000"]);
        let vnm = indexed(&mock, 1);
        assert_eq!(vnm.status("validator-000").await.unwrap(), ObservedStatus::Running);
        assert_eq!(vnm.status("validator-999").await.unwrap(), ObservedStatus::Unknown);
    }

    #[tokio::test]
    async fn sit_rep_passes_when_declaration_matches() {
        let mock = MockNodeController::new();
        let vnm = indexed(&mock, 2);
        vnm.launch().await.unwrap();
        let report = vnm.sit_rep(true).await.unwrap();
        assert_eq!(report.len(), 2);
        assert!(report.values().all(|e| e.activated && e.running));
    }

    #[tokio::test]
    async fn sit_rep_raises_on_drift() {
        let mock = MockNodeController::new();
        let vnm = indexed(&mock, 2);
        vnm.launch().await.unwrap();
        // Simulate a crash of validator-001 behind the VNM's back.
        mock.kill("validator-001").await.unwrap();

        let err = vnm.sit_rep(true).await.unwrap_err();
        match err {
            ManagementError::UnexpectedState { mismatches } => {
                assert_eq!(mismatches, vec!["validator-001".to_string()]);
            }
            other => panic!("unexpected error {other:?}"),
        }
        // Non-strict mode reports the same drift without failing.
        let report = vnm.sit_rep(false).await.unwrap();
        assert!(report["validator-001"].activated);
        assert!(!report["validator-001"].running);
    }

    #[tokio::test]
    async fn urls_cover_only_observed_nodes() {
        let mock = MockNodeController::new();
        let vnm = indexed(&mock, 3);
        vnm.start(0, true).await.unwrap();
        vnm.start(2, true).await.unwrap();
        let urls = vnm.urls().await.unwrap();
        assert_eq!(urls, vec![
            "http://localhost:8800".to_string(),
            "http://localhost:8802".to_string(),
        ]);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_without_stragglers_never_kills() {
        let mock = MockNodeController::new();
        let vnm = indexed(&mock, 3);
        vnm.launch().await.unwrap();
        vnm.shutdown(Duration::from_secs(16)).await.unwrap();
        assert!(mock.killed_names().is_empty());
        assert_eq!(mock.stopped_names().len(), 3);
        assert_eq!(mock.clean_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_kills_exactly_the_stragglers() {
        let mock = MockNodeController::new();
        let vnm = indexed(&mock, 3);
        vnm.launch().await.unwrap();
        mock.ignore_stop("validator-001");
        mock.ignore_stop("validator-002");
        // One straggler's kill fails; the other must still be attempted.
        mock.fail_kill("validator-001");

        vnm.shutdown(Duration::from_secs(4)).await.unwrap();
        assert_eq!(
            mock.killed_names(),
            vec!["validator-001".to_string(), "validator-002".to_string()]
        );
        // The failed kill leaves the node observed; cleanup still ran.
        assert_eq!(mock.running_names(), vec!["validator-001".to_string()]);
        assert_eq!(mock.clean_calls(), 1);
    }
}
