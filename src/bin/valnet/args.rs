//! CLI argument parsing for valnet.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use valnet::manage::ManageKind;

#[derive(Parser, Debug)]
#[command(name = "valnet")]
#[command(about = "Validator cluster lifecycle orchestrator")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Manage a validator cluster.
    #[command(subcommand)]
    Cluster(ClusterCommand),
}

#[derive(Subcommand, Debug)]
pub enum ClusterCommand {
    /// Start a validator network.
    Start(StartArgs),

    /// Report expected vs. current status of cluster nodes.
    Status(StatusArgs),

    /// Stop specific nodes, or every running node.
    Stop(StopArgs),

    /// Add nodes to a running network.
    Extend(ExtendArgs),

    /// Reset cluster state. If --wrap was initially given without a
    /// concrete directory, reset deletes all associated data (including
    /// blockchains).
    Reset,
}

#[derive(Args, Debug)]
pub struct StartArgs {
    /// Number of nodes to start.
    #[arg(long, default_value_t = 10)]
    pub count: usize,

    /// Style of validator management.
    #[arg(short, long, value_enum)]
    pub manage: Option<ManageKind>,

    /// Use DIR as the shared data home (create/use a temp directory if DIR
    /// is unspecified).
    #[arg(long, value_name = "DIR", num_args = 0..=1, require_equals = true)]
    pub wrap: Option<Option<PathBuf>>,
}

#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Report status of specific node(s).
    #[arg(value_name = "NODE_NAME")]
    pub node_names: Vec<String>,
}

#[derive(Args, Debug)]
pub struct StopArgs {
    /// Stop specific node(s).
    #[arg(value_name = "NODE_NAME")]
    pub node_names: Vec<String>,
}

#[derive(Args, Debug)]
pub struct ExtendArgs {
    /// Number of nodes to add to the network.
    #[arg(long, default_value_t = 1)]
    pub count: usize,
}
