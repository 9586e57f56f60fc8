//! Command generators: translate lifecycle intents into an ordered batch of
//! controller calls.
//!
//! The base generator gives the network manager a backend-agnostic
//! vocabulary: intents are queued in order and executed only when the VNM
//! runs a reconciliation pass (`update`). The indexed variant additionally
//! owns an append-only roster of declared identities and tracks declared
//! intent (`activated`) per entry, independent of what any backend observes.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use crate::errors::{ManagementError, ManagementResult};
use crate::node::NodeIdentity;

/// One queued lifecycle intent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeCommand {
    Genesis(NodeIdentity),
    Start(NodeIdentity),
    Stop(String),
    Kill(String),
}

/// Ordered queue of lifecycle intents, drained by `VNM::update()`.
#[derive(Default)]
pub struct NodeCommandGenerator {
    queue: Mutex<Vec<NodeCommand>>,
}

impl NodeCommandGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn genesis(&self, identity: &NodeIdentity) {
        self.push(NodeCommand::Genesis(identity.clone()));
    }

    pub fn start(&self, identity: &NodeIdentity) {
        self.push(NodeCommand::Start(identity.clone()));
    }

    pub fn stop(&self, node_name: &str) {
        self.push(NodeCommand::Stop(node_name.to_string()));
    }

    pub fn kill(&self, node_name: &str) {
        self.push(NodeCommand::Kill(node_name.to_string()));
    }

    /// Drain the queue, preserving issue order.
    pub fn take_commands(&self) -> Vec<NodeCommand> {
        std::mem::take(&mut *self.queue.lock().unwrap())
    }

    fn push(&self, command: NodeCommand) {
        self.queue.lock().unwrap().push(command);
    }
}

struct RosterEntry {
    identity: NodeIdentity,
    /// Declared intent: has `start` been issued for this entry. Independent
    /// of backend-observed reality; the two are joined only at sit-rep time.
    activated: bool,
}

/// Command generator owning a declared roster.
///
/// Roster entries are derived deterministically from their position, so the
/// identity formula (name, ports, genesis at index 0) holds by construction.
pub struct IndexedNodeCommandGenerator {
    base: Arc<NodeCommandGenerator>,
    roster: Mutex<Vec<RosterEntry>>,
}

impl Default for IndexedNodeCommandGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl IndexedNodeCommandGenerator {
    pub fn new() -> Self {
        Self {
            base: Arc::new(NodeCommandGenerator::new()),
            roster: Mutex::new(Vec::new()),
        }
    }

    /// The shared intent queue, for binding into a VNM.
    pub fn base(&self) -> Arc<NodeCommandGenerator> {
        Arc::clone(&self.base)
    }

    /// Declare the next node. Identity is computed from the current roster
    /// length; the entry starts deactivated.
    pub fn append_node(&self) {
        let mut roster = self.roster.lock().unwrap();
        let identity = NodeIdentity::from_index(roster.len());
        roster.push(RosterEntry { identity, activated: false });
    }

    /// Declare `count` nodes.
    pub fn append_nodes(&self, count: usize) {
        for _ in 0..count {
            self.append_node();
        }
    }

    pub fn len(&self) -> usize {
        self.roster.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.roster.lock().unwrap().is_empty()
    }

    fn with_entry<T>(
        &self,
        index: usize,
        f: impl FnOnce(&mut RosterEntry) -> T,
    ) -> ManagementResult<T> {
        let mut roster = self.roster.lock().unwrap();
        let len = roster.len();
        let entry = roster
            .get_mut(index)
            .ok_or(ManagementError::IndexOutOfRange { index, len })?;
        Ok(f(entry))
    }

    /// Queue genesis materialization for roster position `index`,
    /// designating the entry genesis.
    pub fn genesis_by_idx(&self, index: usize) -> ManagementResult<()> {
        let base = &self.base;
        self.with_entry(index, |entry| {
            entry.identity.genesis = true;
            base.genesis(&entry.identity);
        })
    }

    pub fn start_by_idx(&self, index: usize) -> ManagementResult<()> {
        let base = &self.base;
        self.with_entry(index, |entry| {
            base.start(&entry.identity);
            entry.activated = true;
        })
    }

    pub fn stop_by_idx(&self, index: usize) -> ManagementResult<()> {
        let base = &self.base;
        self.with_entry(index, |entry| {
            base.stop(&entry.identity.name);
            entry.activated = false;
        })
    }

    pub fn kill_by_idx(&self, index: usize) -> ManagementResult<()> {
        let base = &self.base;
        self.with_entry(index, |entry| {
            base.kill(&entry.identity.name);
            entry.activated = false;
        })
    }

    /// Queue a start for every roster entry in index order. The genesis node
    /// (index 0) is therefore started before any peer.
    pub fn launch(&self) -> ManagementResult<()> {
        for index in 0..self.len() {
            self.start_by_idx(index)?;
        }
        Ok(())
    }

    /// Project the roster into a name → statistics-URL mapping.
    pub fn urls(&self) -> BTreeMap<String, String> {
        let roster = self.roster.lock().unwrap();
        roster.iter().map(|e| (e.identity.name.clone(), e.identity.url())).collect()
    }

    /// Project the roster into a name → declared-intent mapping.
    pub fn declaration(&self) -> BTreeMap<String, bool> {
        let roster = self.roster.lock().unwrap();
        roster.iter().map(|e| (e.identity.name.clone(), e.activated)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_node_is_deterministic() {
        let gen = IndexedNodeCommandGenerator::new();
        gen.append_nodes(3);
        let urls = gen.urls();
        assert_eq!(urls["validator-000"], "http://localhost:8800");
        assert_eq!(urls["validator-001"], "http://localhost:8801");
        assert_eq!(urls["validator-002"], "http://localhost:8802");
        assert_eq!(gen.len(), 3);
    }

    #[test]
    fn out_of_range_index_is_an_error() {
        let gen = IndexedNodeCommandGenerator::new();
        gen.append_nodes(2);
        let err = gen.start_by_idx(2).unwrap_err();
        assert!(matches!(err, ManagementError::IndexOutOfRange { index: 2, len: 2 }));
    }

    #[test]
    fn activated_flips_on_start_and_stop() {
        let gen = IndexedNodeCommandGenerator::new();
        gen.append_nodes(2);
        assert!(gen.declaration().values().all(|&a| !a));
        gen.start_by_idx(0).unwrap();
        assert!(gen.declaration()["validator-000"]);
        assert!(!gen.declaration()["validator-001"]);
        gen.stop_by_idx(0).unwrap();
        assert!(!gen.declaration()["validator-000"]);
        gen.start_by_idx(1).unwrap();
        gen.kill_by_idx(1).unwrap();
        assert!(!gen.declaration()["validator-001"]);
    }

    #[test]
    fn launch_queues_starts_in_index_order() {
        let gen = IndexedNodeCommandGenerator::new();
        gen.append_nodes(3);
        gen.launch().unwrap();
        let commands = gen.base().take_commands();
        let names: Vec<_> = commands
            .iter()
            .map(|c| match c {
                NodeCommand::Start(identity) => identity.name.clone(),
                other => panic!("unexpected command {other:?}"),
            })
            .collect();
        assert_eq!(names, ["validator-000", "validator-001", "validator-002"]);
    }

    #[test]
    fn take_commands_drains_the_queue() {
        let gen = NodeCommandGenerator::new();
        gen.stop("validator-000");
        gen.kill("validator-001");
        let first = gen.take_commands();
        assert_eq!(first.len(), 2);
        assert!(gen.take_commands().is_empty());
    }
}
