//! Node identity: the deterministic formula mapping a roster index to a
//! name, ports, and genesis designation.
//!
//! Ports are a pure function of the index, so uniqueness of indices implies
//! no port collisions. Operators and external tooling rely on this formula;
//! it is a contract, not an implementation detail.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// First HTTP (statistics API) port; node `i` listens on `8800 + i`.
pub const HTTP_PORT_BASE: u16 = 8800;

/// First gossip port; node `i` listens on `5500 + i`.
pub const GOSSIP_PORT_BASE: u16 = 5500;

/// Immutable identity of one validator node within a roster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeIdentity {
    /// Node name, always `validator-{index:03}`.
    pub name: String,

    /// Position in the roster. Unique and non-negative by construction.
    pub index: usize,

    /// TCP port for the validator's HTTP statistics endpoint.
    pub http_port: u16,

    /// UDP port for inter-validator gossip.
    pub gossip_port: u16,

    /// Whether this node materializes the initial ledger state. True only
    /// for index 0 within a roster.
    pub genesis: bool,

    /// Shared data-home directory, injected by the wrap decorator.
    pub data_home: Option<PathBuf>,

    /// Additional configuration files passed to the validator.
    pub config_files: Vec<PathBuf>,
}

impl NodeIdentity {
    /// Derive the identity for roster position `index`.
    pub fn from_index(index: usize) -> Self {
        Self {
            name: node_name(index),
            index,
            http_port: HTTP_PORT_BASE + index as u16,
            gossip_port: GOSSIP_PORT_BASE + index as u16,
            genesis: index == 0,
            data_home: None,
            config_files: Vec::new(),
        }
    }

    /// The node's HTTP statistics endpoint URL on the local host.
    pub fn url(&self) -> String {
        format!("http://localhost:{}", self.http_port)
    }
}

/// The node-name formula: `validator-000`, `validator-001`, ...
pub fn node_name(index: usize) -> String {
    format!("validator-{index:03}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_formula_ports() {
        for i in [0usize, 1, 7, 42, 199] {
            let id = NodeIdentity::from_index(i);
            assert_eq!(id.http_port, 8800 + i as u16);
            assert_eq!(id.gossip_port, 5500 + i as u16);
            assert_eq!(id.index, i);
        }
    }

    #[test]
    fn only_index_zero_is_genesis() {
        assert!(NodeIdentity::from_index(0).genesis);
        assert!(!NodeIdentity::from_index(1).genesis);
        assert!(!NodeIdentity::from_index(9).genesis);
    }

    #[test]
    fn name_is_zero_padded() {
        assert_eq!(node_name(0), "validator-000");
        assert_eq!(node_name(12), "validator-012");
        assert_eq!(node_name(123), "validator-123");
        assert_eq!(NodeIdentity::from_index(3).name, "validator-003");
    }

    #[test]
    fn url_uses_http_port() {
        let id = NodeIdentity::from_index(2);
        assert_eq!(id.url(), "http://localhost:8802");
    }
}
