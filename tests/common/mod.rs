//! Shared support for cluster integration tests: a mock controller factory
//! and an isolated per-test cluster context.

use std::sync::Arc;

use tempfile::TempDir;
use valnet::cluster::commands::ControllerFactory;
use valnet::cluster::ClusterContext;
use valnet::config::ClusterConfig;
use valnet::errors::ManagementResult;
use valnet::manage::mock::MockNodeController;
use valnet::manage::{ManageKind, NodeController};

/// Factory handing out handles to one shared mock backend, so repeated
/// command invocations observe the same simulated reality.
pub struct MockControllerFactory {
    mock: MockNodeController,
}

impl ControllerFactory for MockControllerFactory {
    fn build(&self, _kind: ManageKind) -> ManagementResult<Box<dyn NodeController>> {
        Ok(Box::new(self.mock.clone()))
    }
}

/// One isolated cluster: its own state directory, mock backend, and context.
pub struct TestCluster {
    pub mock: MockNodeController,
    pub context: ClusterContext,
    // Held so the state directory outlives the test body.
    _dir: TempDir,
}

pub fn test_cluster() -> TestCluster {
    let dir = TempDir::new().expect("create temp dir");
    let config = ClusterConfig::rooted_at(dir.path());
    let mock = MockNodeController::new();
    let factory = Arc::new(MockControllerFactory { mock: mock.clone() });
    let context = ClusterContext::with_factory(config, factory);
    TestCluster { mock, context, _dir: dir }
}
