//! valnet binary: operator CLI over the cluster control loop.

mod args;

use anyhow::Result;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use valnet::cluster::commands::{self, StartOptions, SHUTDOWN_GRACE};
use valnet::cluster::{ClusterContext, WrapSetting};
use valnet::config::ClusterConfig;
use valnet::manage::ManageKind;

use args::{Cli, ClusterCommand, Command};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "valnet=info".into()))
        .init();

    let cli = Cli::parse();
    let config = ClusterConfig::from_env();
    let context = ClusterContext::new(config);

    match cli.command {
        Command::Cluster(cluster_command) => run_cluster(context, cluster_command).await,
    }
}

async fn run_cluster(context: ClusterContext, command: ClusterCommand) -> Result<()> {
    match command {
        ClusterCommand::Start(start_args) => {
            let wrap = match start_args.wrap {
                None => WrapSetting::Disabled,
                Some(None) => WrapSetting::Auto,
                Some(Some(dir)) => WrapSetting::Path(dir),
            };
            let outcome = commands::start(&context, StartOptions {
                count: start_args.count,
                manage: start_args.manage,
                wrap,
            })
            .await?;
            for name in &outcome.already_running {
                println!("Already running: {name}");
            }
            for name in &outcome.started {
                println!("Starting: {name}");
            }

            // Subprocess children die with this process, so foreground
            // management supervises until interrupted, then winds the
            // cluster down.
            if outcome.manage == ManageKind::Subprocess {
                let cancel = CancellationToken::new();
                let signal_cancel = cancel.clone();
                tokio::spawn(async move {
                    if tokio::signal::ctrl_c().await.is_ok() {
                        signal_cancel.cancel();
                    }
                });
                commands::supervise(&context, outcome.controller, cancel, SHUTDOWN_GRACE).await?;
            }
        }
        ClusterCommand::Status(status_args) => {
            let rows = commands::status(&context, &status_args.node_names).await?;
            println!("NodeName Expected Current");
            for row in rows {
                println!("{} {} {}", row.name, row.recorded, row.current);
            }
        }
        ClusterCommand::Stop(stop_args) => {
            let outcome = commands::stop(&context, &stop_args.node_names).await?;
            for name in outcome.stopped {
                println!("Stopping: {name}");
            }
        }
        ClusterCommand::Extend(extend_args) => {
            let outcome = commands::extend(&context, extend_args.count).await?;
            for name in &outcome.already_running {
                println!("Already running: {name}");
            }
            for name in &outcome.started {
                println!("Starting: {name}");
            }
        }
        ClusterCommand::Reset => {
            commands::reset(&context).await?;
            println!("Cluster reset.");
        }
    }
    Ok(())
}
