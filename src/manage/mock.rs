//! In-memory controller test double.
//!
//! Tracks declared calls against a shared running-set and supports failure
//! injection (nodes that ignore stop, kills that fail), so reconciliation
//! and escalation paths can be exercised without real processes. Clones
//! share state, letting a test keep a handle while the controller itself is
//! boxed into a VNM or wrap decorator.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::errors::{ManagementError, ManagementResult};
use crate::manage::NodeController;
use crate::node::NodeIdentity;

#[derive(Default)]
struct MockState {
    running: BTreeSet<String>,
    started: Vec<NodeIdentity>,
    genesis: Vec<NodeIdentity>,
    stopped: Vec<String>,
    killed: Vec<String>,
    ignore_stop: BTreeSet<String>,
    fail_kill: BTreeSet<String>,
    clean_calls: usize,
}

#[derive(Clone, Default)]
pub struct MockNodeController {
    state: Arc<Mutex<MockState>>,
}

impl MockNodeController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-populate the observed running set without recording starts.
    pub fn with_running<I: IntoIterator<Item = S>, S: Into<String>>(names: I) -> Self {
        let mock = Self::new();
        {
            let mut state = mock.state.lock().unwrap();
            state.running = names.into_iter().map(Into::into).collect();
        }
        mock
    }

    /// Make `name` survive graceful stop requests.
    pub fn ignore_stop(&self, name: &str) {
        self.state.lock().unwrap().ignore_stop.insert(name.to_string());
    }

    /// Make kills of `name` fail with a ManagementError.
    pub fn fail_kill(&self, name: &str) {
        self.state.lock().unwrap().fail_kill.insert(name.to_string());
    }

    pub fn started_identities(&self) -> Vec<NodeIdentity> {
        self.state.lock().unwrap().started.clone()
    }

    pub fn genesis_identities(&self) -> Vec<NodeIdentity> {
        self.state.lock().unwrap().genesis.clone()
    }

    pub fn stopped_names(&self) -> Vec<String> {
        self.state.lock().unwrap().stopped.clone()
    }

    pub fn killed_names(&self) -> Vec<String> {
        self.state.lock().unwrap().killed.clone()
    }

    pub fn clean_calls(&self) -> usize {
        self.state.lock().unwrap().clean_calls
    }

    pub fn running_names(&self) -> Vec<String> {
        self.state.lock().unwrap().running.iter().cloned().collect()
    }
}

#[async_trait]
impl NodeController for MockNodeController {
    async fn start(&self, identity: &NodeIdentity) -> ManagementResult<()> {
        let mut state = self.state.lock().unwrap();
        state.started.push(identity.clone());
        state.running.insert(identity.name.clone());
        Ok(())
    }

    async fn stop(&self, node_name: &str) -> ManagementResult<()> {
        let mut state = self.state.lock().unwrap();
        state.stopped.push(node_name.to_string());
        if !state.ignore_stop.contains(node_name) {
            state.running.remove(node_name);
        }
        Ok(())
    }

    async fn kill(&self, node_name: &str) -> ManagementResult<()> {
        let mut state = self.state.lock().unwrap();
        state.killed.push(node_name.to_string());
        if state.fail_kill.contains(node_name) {
            return Err(ManagementError::CommandFailed {
                command: format!("kill {node_name}"),
                code: Some(1),
                stderr: "injected kill failure".to_string(),
            });
        }
        state.running.remove(node_name);
        Ok(())
    }

    async fn get_node_names(&self) -> ManagementResult<Vec<String>> {
        Ok(self.state.lock().unwrap().running.iter().cloned().collect())
    }

    async fn create_genesis_block(&self, identity: &NodeIdentity) -> ManagementResult<()> {
        self.state.lock().unwrap().genesis.push(identity.clone());
        Ok(())
    }

    async fn clean(&self) -> ManagementResult<()> {
        self.state.lock().unwrap().clean_calls += 1;
        Ok(())
    }
}
