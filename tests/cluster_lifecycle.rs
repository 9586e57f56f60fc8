//! Integration tests for the cluster control loop, driven end to end over a
//! mock controller factory: idempotent start, extension indexing, stop and
//! status reconciliation, reset preconditions, wrap-path fixing, and the
//! foreground supervisor.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::test_cluster;
use tokio_util::sync::CancellationToken;
use valnet::cluster::commands::{self, StartOptions};
use valnet::cluster::{ClusterError, ClusterState, DesiredState, NodeStatus, WrapSetting};
use valnet::manage::vnm::ObservedStatus;
use valnet::manage::NodeController;
use valnet::manage::ManageKind;

fn start_options(count: usize) -> StartOptions {
    StartOptions { count, manage: None, wrap: WrapSetting::Disabled }
}

fn load_state(cluster: &common::TestCluster) -> ClusterState {
    ClusterState::load(&cluster.context.config.state_file, false).expect("state file")
}

#[tokio::test]
async fn start_creates_genesis_then_peers() {
    let cluster = test_cluster();
    let outcome = commands::start(&cluster.context, start_options(3)).await.unwrap();
    assert_eq!(outcome.started, ["validator-000", "validator-001", "validator-002"]);

    // Genesis storage is materialized for index 0 only, before any start.
    let genesis = cluster.mock.genesis_identities();
    assert_eq!(genesis.len(), 1);
    assert_eq!(genesis[0].name, "validator-000");
    assert!(genesis[0].genesis);

    let started = cluster.mock.started_identities();
    assert_eq!(started[0].name, "validator-000");
    assert_eq!(started[0].http_port, 8800);
    assert_eq!(started[2].gossip_port, 5502);

    let state = load_state(&cluster);
    assert_eq!(state.desired_state, DesiredState::Running);
    assert_eq!(state.manage, Some(ManageKind::Subprocess));
    assert_eq!(state.nodes.len(), 3);
}

#[tokio::test]
async fn start_is_idempotent() {
    let cluster = test_cluster();
    commands::start(&cluster.context, start_options(3)).await.unwrap();
    let second = commands::start(&cluster.context, start_options(3)).await.unwrap();

    assert!(second.started.is_empty());
    assert_eq!(second.already_running.len(), 3);
    // Exactly K running nodes, not 2K.
    assert_eq!(cluster.mock.running_names().len(), 3);
    assert_eq!(cluster.mock.started_identities().len(), 3);
}

#[tokio::test]
async fn extend_appends_without_touching_existing_indices() {
    let cluster = test_cluster();
    commands::start(&cluster.context, start_options(2)).await.unwrap();
    let outcome = commands::extend(&cluster.context, 2).await.unwrap();

    assert_eq!(outcome.started, ["validator-002", "validator-003"]);
    let started = cluster.mock.started_identities();
    assert_eq!(started.len(), 4);
    assert_eq!(started[2].http_port, 8802);
    assert_eq!(started[3].http_port, 8803);
    // Extension never re-designates genesis.
    assert!(started[2..].iter().all(|identity| !identity.genesis));
    assert_eq!(cluster.mock.genesis_identities().len(), 1);

    let state = load_state(&cluster);
    assert_eq!(state.nodes["validator-003"].index, Some(3));
}

#[tokio::test]
async fn extend_requires_a_running_network() {
    let cluster = test_cluster();
    // No state file at all: the operator is told to start first.
    let err = commands::extend(&cluster.context, 1).await.unwrap_err();
    assert!(matches!(err, ClusterError::MissingStateFile { .. }));

    commands::start(&cluster.context, start_options(2)).await.unwrap();
    commands::stop(&cluster.context, &[]).await.unwrap();
    let err = commands::extend(&cluster.context, 1).await.unwrap_err();
    assert!(matches!(err, ClusterError::NotRunning));
}

#[tokio::test]
async fn stop_all_then_status_reports_everything_stopped() {
    let cluster = test_cluster();
    commands::start(&cluster.context, start_options(3)).await.unwrap();
    let outcome = commands::stop(&cluster.context, &[]).await.unwrap();
    assert_eq!(outcome.stopped.len(), 3);
    assert!(cluster.mock.running_names().is_empty());

    let state = load_state(&cluster);
    assert_eq!(state.desired_state, DesiredState::Stopped);
    assert!(state.nodes.values().all(|r| r.status == NodeStatus::Stopped));

    let rows = commands::status(&cluster.context, &[]).await.unwrap();
    assert_eq!(rows.len(), 3);
    for row in rows {
        assert_eq!(row.recorded, NodeStatus::Stopped);
        assert_ne!(row.current, ObservedStatus::Running);
    }
}

#[tokio::test]
async fn stop_of_unknown_name_creates_an_unknown_record() {
    let cluster = test_cluster();
    commands::start(&cluster.context, start_options(1)).await.unwrap();
    commands::stop(&cluster.context, &["validator-099".to_string()]).await.unwrap();

    let state = load_state(&cluster);
    let record = &state.nodes["validator-099"];
    assert_eq!(record.status, NodeStatus::Unknown);
    assert_eq!(record.index, None);
    // The declared node was not an explicit target and keeps its record.
    assert_eq!(state.nodes["validator-000"].status, NodeStatus::Running);
}

#[tokio::test]
async fn stop_with_nothing_running_marks_all_records_unknown() {
    let cluster = test_cluster();
    commands::start(&cluster.context, start_options(2)).await.unwrap();
    // Everything dies behind the orchestrator's back.
    cluster.mock.kill("validator-000").await.unwrap();
    cluster.mock.kill("validator-001").await.unwrap();

    commands::stop(&cluster.context, &[]).await.unwrap();
    let state = load_state(&cluster);
    assert!(state.nodes.values().all(|r| r.status == NodeStatus::Unknown));
    assert_eq!(state.desired_state, DesiredState::Stopped);
}

#[tokio::test]
async fn status_detects_stale_running_records() {
    let cluster = test_cluster();
    commands::start(&cluster.context, start_options(2)).await.unwrap();
    cluster.mock.kill("validator-001").await.unwrap();

    let rows = commands::status(&cluster.context, &[]).await.unwrap();
    let row = rows.iter().find(|r| r.name == "validator-001").unwrap();
    assert_eq!(row.recorded, NodeStatus::Running);
    assert_eq!(row.current, ObservedStatus::NotRunning);
    let row = rows.iter().find(|r| r.name == "validator-000").unwrap();
    assert_eq!(row.current, ObservedStatus::Running);

    // Diagnostic only: the stale record is not corrected.
    let state = load_state(&cluster);
    assert_eq!(state.nodes["validator-001"].status, NodeStatus::Running);
}

#[tokio::test]
async fn reset_refuses_while_nodes_run_then_deletes_state() {
    let cluster = test_cluster();
    commands::start(&cluster.context, start_options(2)).await.unwrap();

    let err = commands::reset(&cluster.context).await.unwrap_err();
    match err {
        ClusterError::NodesStillRunning { names } => assert_eq!(names.len(), 2),
        other => panic!("unexpected error {other:?}"),
    }
    assert!(cluster.context.config.state_file.is_file());

    commands::stop(&cluster.context, &[]).await.unwrap();
    commands::reset(&cluster.context).await.unwrap();
    assert!(!cluster.context.config.state_file.exists());
}

#[tokio::test]
async fn manage_kind_is_fixed_while_running() {
    let cluster = test_cluster();
    commands::start(&cluster.context, StartOptions {
        count: 1,
        manage: Some(ManageKind::Docker),
        wrap: WrapSetting::Disabled,
    })
    .await
    .unwrap();

    let err = commands::start(&cluster.context, StartOptions {
        count: 1,
        manage: Some(ManageKind::Daemon),
        wrap: WrapSetting::Disabled,
    })
    .await
    .unwrap_err();
    assert!(matches!(err, ClusterError::ManageKindConflict { current: ManageKind::Docker }));
}

#[tokio::test]
async fn auto_wrap_path_is_fixed_once_and_reused() {
    let cluster = test_cluster();
    commands::start(&cluster.context, StartOptions {
        count: 1,
        manage: None,
        wrap: WrapSetting::Auto,
    })
    .await
    .unwrap();

    let state = load_state(&cluster);
    let first_path = match &state.wrap {
        Some(WrapSetting::Path(path)) => path.clone(),
        other => panic!("wrap not fixed to a path: {other:?}"),
    };
    assert_eq!(state.manage_wrap, Some(Some(true)));
    assert!(first_path.join("keys").is_dir());

    // A later command against the same state reuses the recorded path
    // rather than allocating a second temp directory.
    commands::stop(&cluster.context, &[]).await.unwrap();
    let state = load_state(&cluster);
    assert_eq!(state.wrap, Some(WrapSetting::Path(first_path.clone())));

    commands::start(&cluster.context, start_options(1)).await.unwrap();
    let state = load_state(&cluster);
    assert_eq!(state.wrap, Some(WrapSetting::Path(first_path.clone())));

    // The wrapped controller injects the fixed path into every start.
    let started = cluster.mock.started_identities();
    assert!(started.iter().all(|identity| identity.data_home.as_deref() == Some(&*first_path)));

    // Reset owns the auto-created home and removes it.
    commands::reset(&cluster.context).await.unwrap();
    assert!(!first_path.exists());
}

#[tokio::test]
async fn conflicting_explicit_wrap_paths_are_rejected() {
    let cluster = test_cluster();
    let dir_a = tempfile::TempDir::new().unwrap();
    let dir_b = tempfile::TempDir::new().unwrap();

    commands::start(&cluster.context, StartOptions {
        count: 1,
        manage: None,
        wrap: WrapSetting::Path(dir_a.path().to_path_buf()),
    })
    .await
    .unwrap();

    let err = commands::start(&cluster.context, StartOptions {
        count: 1,
        manage: None,
        wrap: WrapSetting::Path(dir_b.path().to_path_buf()),
    })
    .await
    .unwrap_err();
    assert!(matches!(err, ClusterError::AlreadyWrapped { .. }));

    // An explicit, never-owned home survives reset.
    commands::stop(&cluster.context, &[]).await.unwrap();
    commands::reset(&cluster.context).await.unwrap();
    assert!(dir_a.path().exists());
}

#[tokio::test(start_paused = true)]
async fn supervisor_stops_cluster_on_cancellation() {
    let cluster = test_cluster();
    let outcome = commands::start(&cluster.context, start_options(2)).await.unwrap();

    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    let controller = Arc::clone(&outcome.controller);
    let context = cluster.context;
    let supervisor = tokio::spawn(async move {
        commands::supervise(&context, controller, cancel, Duration::from_secs(16)).await
    });

    // Let the supervisor reach its wait point, then interrupt it.
    tokio::task::yield_now().await;
    interrupt.cancel();
    supervisor.await.unwrap().unwrap();

    // Both nodes stopped gracefully; no kill was needed.
    assert!(cluster.mock.running_names().is_empty());
    assert!(cluster.mock.killed_names().is_empty());
    assert_eq!(cluster.mock.stopped_names().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn supervisor_kills_stragglers_after_grace_period() {
    let cluster = test_cluster();
    let outcome = commands::start(&cluster.context, start_options(2)).await.unwrap();
    cluster.mock.ignore_stop("validator-001");

    let cancel = CancellationToken::new();
    cancel.cancel();
    commands::supervise(&cluster.context, outcome.controller, cancel, Duration::from_secs(16))
        .await
        .unwrap();

    // The cooperative node stopped, only the straggler was killed.
    assert_eq!(cluster.mock.killed_names(), vec!["validator-001".to_string()]);
    assert!(cluster.mock.running_names().is_empty());

    let state = ClusterState::load(&cluster.context.config.state_file, false).unwrap();
    assert_eq!(state.desired_state, DesiredState::Stopped);
}
