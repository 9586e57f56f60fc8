//! Validator cluster lifecycle orchestrator.
//!
//! Operates a fleet of distributed-ledger validator node processes across
//! pluggable execution backends (bare subprocesses, self-daemonizing
//! processes, docker containers). Given a declared topology of N nodes it
//! makes reality match the declaration and reports when it does not.
//!
//! This crate is the cluster-lifecycle orchestrator, not the ledger itself:
//! consensus, transaction processing, and the validator's own network
//! protocol are external to it.
//!
//! # Architecture
//!
//! - [`manage`] — the [`NodeController`](manage::NodeController) backend
//!   contract, its implementations, the wrap decorator, the command
//!   generators, and the
//!   [`ValidatorNetworkManager`](manage::ValidatorNetworkManager)
//!   reconciliation engine.
//! - [`cluster`] — the persisted-state-driven control loop behind the
//!   operator-facing `start`/`stop`/`extend`/`status`/`reset` commands.
//! - [`node`] — the deterministic node identity formula.
//! - [`config`] — explicit configuration threaded through construction; no
//!   ambient global lookup, so tests can run isolated clusters in-process.

pub mod cluster;
pub mod config;
pub mod errors;
pub mod manage;
pub mod node;

pub use errors::ManagementError;
