//! The operator commands: start, stop, status, extend, reset, and the
//! foreground supervisor loop.
//!
//! Controller construction goes through a factory so tests can substitute a
//! mock backend; production selection is configuration-driven.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::cluster::state::{
    ClusterState, DesiredState, NodeRuntimeRecord, NodeStatus, WrapSetting,
};
use crate::cluster::ClusterError;
use crate::config::ClusterConfig;
use crate::errors::ManagementResult;
use crate::manage::vnm::ObservedStatus;
use crate::manage::{
    self, ManageKind, NodeCommandGenerator, NodeController, ValidatorNetworkManager,
    WrappedNodeController,
};
use crate::node::{node_name, NodeIdentity};

/// Grace period the supervisor and shutdown paths give nodes to stop before
/// force-killing.
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(16);

/// Builds the base controller for a backend kind.
pub trait ControllerFactory: Send + Sync {
    fn build(&self, kind: ManageKind) -> ManagementResult<Box<dyn NodeController>>;
}

/// Production factory: the real subprocess/daemon/docker backends.
pub struct ProductionControllerFactory {
    config: ClusterConfig,
}

impl ProductionControllerFactory {
    pub fn new(config: ClusterConfig) -> Self {
        Self { config }
    }
}

impl ControllerFactory for ProductionControllerFactory {
    fn build(&self, kind: ManageKind) -> ManagementResult<Box<dyn NodeController>> {
        manage::build_controller(kind, &self.config)
    }
}

/// Everything a command invocation needs: configuration plus the controller
/// factory. Threaded explicitly so multiple isolated clusters can coexist in
/// one process.
pub struct ClusterContext {
    pub config: ClusterConfig,
    factory: Arc<dyn ControllerFactory>,
}

impl ClusterContext {
    pub fn new(config: ClusterConfig) -> Self {
        let factory = Arc::new(ProductionControllerFactory::new(config.clone()));
        Self { config, factory }
    }

    /// Use a non-production controller factory (tests, dry runs).
    pub fn with_factory(config: ClusterConfig, factory: Arc<dyn ControllerFactory>) -> Self {
        Self { config, factory }
    }
}

/// Options for the `start` command.
pub struct StartOptions {
    pub count: usize,
    pub manage: Option<ManageKind>,
    pub wrap: WrapSetting,
}

/// What `start` did, plus the live controller for the foreground supervisor
/// (subprocess children live inside it).
pub struct StartOutcome {
    pub started: Vec<String>,
    pub already_running: Vec<String>,
    pub manage: ManageKind,
    pub controller: Arc<dyn NodeController>,
}

impl std::fmt::Debug for StartOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StartOutcome")
            .field("started", &self.started)
            .field("already_running", &self.already_running)
            .field("manage", &self.manage)
            .finish_non_exhaustive()
    }
}

pub struct StopOutcome {
    pub stopped: Vec<String>,
}

#[derive(Debug)]
pub struct ExtendOutcome {
    pub started: Vec<String>,
    pub already_running: Vec<String>,
}

/// One line of the `status` report.
pub struct StatusRow {
    pub name: String,
    pub recorded: NodeStatus,
    pub current: ObservedStatus,
}

/// Construct the (possibly wrapped) controller for a loaded state record,
/// fixing the wrap setting in state on first use.
///
/// Conflict rule: once a cluster is wrapped, a differing explicit path is a
/// hard error, never a silent override.
fn build_controller(
    context: &ClusterContext,
    state: &mut ClusterState,
    wrap_arg: &WrapSetting,
) -> Result<Arc<dyn NodeController>, ClusterError> {
    let kind = state.manage.ok_or(ClusterError::NoManageKind)?;
    let base = context.factory.build(kind)?;

    match &state.wrap {
        None => state.wrap = Some(wrap_arg.clone()),
        Some(recorded) => {
            if *wrap_arg != WrapSetting::Disabled && wrap_arg != recorded {
                return Err(ClusterError::AlreadyWrapped {
                    existing: match recorded {
                        WrapSetting::Path(path) => path.display().to_string(),
                        WrapSetting::Auto => "an auto-allocated directory".to_string(),
                        WrapSetting::Disabled => "nothing".to_string(),
                    },
                });
            }
        }
    }

    if state.wrap == Some(WrapSetting::Disabled) {
        return Ok(Arc::from(base));
    }

    if state.manage_wrap.is_none() {
        state.manage_wrap = Some(None);
    }
    let data_dir = match state.wrap.as_ref() {
        Some(WrapSetting::Path(path)) => Some(path.clone()),
        _ => None,
    };
    let owned = state.manage_wrap.and_then(|o| o);
    let wrapped = WrappedNodeController::new(base, data_dir, owned)?;
    if state.wrap == Some(WrapSetting::Auto) {
        // First use fixes the auto-allocated path; later invocations reuse
        // it instead of creating a second temp directory.
        state.wrap = Some(WrapSetting::Path(wrapped.data_dir().to_path_buf()));
        state.manage_wrap = Some(Some(true));
    }
    info!(data_dir = %wrapped.data_dir().display(), "cluster wrapped to shared data home");
    Ok(Arc::new(wrapped))
}

/// `cluster start`: bring the declared topology up, idempotently.
pub async fn start(
    context: &ClusterContext,
    options: StartOptions,
) -> Result<StartOutcome, ClusterError> {
    let state_file = context.config.state_file.clone();
    let mut state = ClusterState::load(&state_file, true)?;

    // A previously stopped cluster starts fresh; a running one keeps its
    // roster.
    if state.desired_state == DesiredState::Stopped {
        state.nodes.clear();
    }

    match state.manage {
        None => state.manage = Some(options.manage.unwrap_or(ManageKind::Subprocess)),
        Some(current) => {
            if let Some(requested) = options.manage {
                if requested != current && state.desired_state == DesiredState::Running {
                    return Err(ClusterError::ManageKindConflict { current });
                }
            }
        }
    }
    state.desired_state = DesiredState::Running;

    let controller = build_controller(context, &mut state, &options.wrap)?;
    let generator = Arc::new(NodeCommandGenerator::new());
    let vnm = ValidatorNetworkManager::new(Arc::clone(&controller), Arc::clone(&generator));

    let existing_nodes = vnm.get_node_names().await?;
    let mut outcome_started = Vec::new();
    let mut outcome_already = Vec::new();

    for i in 0..options.count {
        let name = node_name(i);
        if existing_nodes.contains(&name) && vnm.is_running(&name).await? {
            info!(node = %name, "already running");
            outcome_already.push(name);
            continue;
        }
        let identity = NodeIdentity::from_index(i);
        if identity.genesis {
            controller.create_genesis_block(&identity).await?;
        }
        info!(node = %name, "starting");
        generator.start(&identity);
        state.nodes.insert(
            name.clone(),
            NodeRuntimeRecord { status: NodeStatus::Running, index: Some(i) },
        );
        outcome_started.push(name);
    }

    state.save(&state_file)?;
    vnm.update().await?;

    Ok(StartOutcome {
        started: outcome_started,
        already_running: outcome_already,
        manage: state.manage.unwrap_or(ManageKind::Subprocess),
        controller,
    })
}

/// `cluster stop`: stop an explicit subset, or everything observed running.
pub async fn stop(
    context: &ClusterContext,
    node_names: &[String],
) -> Result<StopOutcome, ClusterError> {
    let state_file = context.config.state_file.clone();
    let mut state = ClusterState::load(&state_file, false)?;
    let controller = build_controller(context, &mut state, &WrapSetting::Disabled)?;
    stop_with_controller(context, &mut state, controller, node_names).await
}

/// The stop pass against an already-constructed controller. The foreground
/// supervisor uses this directly so subprocess children (which live inside
/// the controller that started them) are actually reachable.
async fn stop_with_controller(
    context: &ClusterContext,
    state: &mut ClusterState,
    controller: Arc<dyn NodeController>,
    node_names: &[String],
) -> Result<StopOutcome, ClusterError> {
    let generator = Arc::new(NodeCommandGenerator::new());
    let vnm = ValidatorNetworkManager::new(Arc::clone(&controller), Arc::clone(&generator));

    let targets: Vec<String> = if node_names.is_empty() {
        vnm.get_node_names().await?
    } else {
        node_names.to_vec()
    };

    for name in &targets {
        info!(node = %name, "stopping");
        generator.stop(name);
        state
            .nodes
            .entry(name.clone())
            .and_modify(|record| record.status = NodeStatus::Stopped)
            .or_insert(NodeRuntimeRecord { status: NodeStatus::Unknown, index: None });
    }

    // Nothing was requested and nothing ran, yet the roster is not empty:
    // the expectation is inconsistent, so every record is downgraded to
    // Unknown to force a re-check.
    if node_names.is_empty() && targets.is_empty() {
        for record in state.nodes.values_mut() {
            record.status = NodeStatus::Unknown;
        }
    }

    state.recompute_desired_state();
    state.save(&context.config.state_file)?;
    vnm.update().await?;

    Ok(StopOutcome { stopped: targets })
}

/// `cluster status`: read-only diagnostic report; never self-correcting.
pub async fn status(
    context: &ClusterContext,
    node_names: &[String],
) -> Result<Vec<StatusRow>, ClusterError> {
    let state_file = context.config.state_file.clone();
    let mut state = ClusterState::load(&state_file, false)?;
    let controller = build_controller(context, &mut state, &WrapSetting::Disabled)?;
    let generator = Arc::new(NodeCommandGenerator::new());
    let vnm = ValidatorNetworkManager::new(Arc::clone(&controller), Arc::clone(&generator));

    let observed: Vec<String> = if node_names.is_empty() {
        vnm.get_node_names().await?
    } else {
        node_names.to_vec()
    };

    let mut rows = Vec::new();
    for (name, record) in &state.nodes {
        let stale = !observed.contains(name)
            && matches!(record.status, NodeStatus::Running | NodeStatus::NoResponse);
        let current = if stale {
            ObservedStatus::NotRunning
        } else {
            vnm.status(name).await?
        };
        rows.push(StatusRow { name: name.clone(), recorded: record.status, current });
    }
    Ok(rows)
}

/// `cluster extend`: grow a running cluster; indices and ports never collide
/// with existing nodes, and index 0 is never re-designated genesis.
pub async fn extend(
    context: &ClusterContext,
    count: usize,
) -> Result<ExtendOutcome, ClusterError> {
    let state_file = context.config.state_file.clone();
    let mut state = ClusterState::load(&state_file, false)?;

    if state.desired_state != DesiredState::Running {
        return Err(ClusterError::NotRunning);
    }

    let controller = build_controller(context, &mut state, &WrapSetting::Disabled)?;
    let generator = Arc::new(NodeCommandGenerator::new());
    let vnm = ValidatorNetworkManager::new(Arc::clone(&controller), Arc::clone(&generator));

    info!(count, "extending network");
    let index_offset = state.nodes.len();
    let mut outcome_started = Vec::new();
    let mut outcome_already = Vec::new();

    for i in 0..count {
        let j = index_offset + i;
        let name = node_name(j);
        if state.nodes.contains_key(&name) && vnm.is_running(&name).await? {
            info!(node = %name, "already running");
            outcome_already.push(name);
            continue;
        }
        let mut identity = NodeIdentity::from_index(j);
        // Extension never materializes genesis state again.
        identity.genesis = false;
        info!(node = %name, "starting");
        generator.start(&identity);
        state.nodes.insert(
            name.clone(),
            NodeRuntimeRecord { status: NodeStatus::Running, index: Some(j) },
        );
        outcome_started.push(name);
    }

    state.save(&state_file)?;
    vnm.update().await?;

    Ok(ExtendOutcome { started: outcome_started, already_running: outcome_already })
}

/// `cluster reset`: delete the state record, and the owned data home if this
/// cluster owns one. Refuses while any node is observed running.
pub async fn reset(context: &ClusterContext) -> Result<(), ClusterError> {
    let state_file = context.config.state_file.clone();
    let mut state = ClusterState::load(&state_file, false)?;
    let controller = build_controller(context, &mut state, &WrapSetting::Disabled)?;

    let running = controller.get_node_names().await?;
    if !running.is_empty() {
        return Err(ClusterError::NodesStillRunning { names: running });
    }

    if state.manage_wrap == Some(Some(true)) {
        // This cluster owns the data home; remove it.
        controller.clean().await?;
    }

    ClusterState::delete(&state_file)?;
    info!("cluster state reset");
    Ok(())
}

/// Foreground supervisor: block until the cancellation token fires, then run
/// a full stop pass through the live controller, wait out the grace period,
/// and force-kill stragglers. Per-node kill failures are logged and skipped.
pub async fn supervise(
    context: &ClusterContext,
    controller: Arc<dyn NodeController>,
    cancel: CancellationToken,
    grace: Duration,
) -> Result<(), ClusterError> {
    cancel.cancelled().await;
    info!("supervisor interrupted; stopping cluster");

    let mut state = ClusterState::load(&context.config.state_file, false)?;
    stop_with_controller(context, &mut state, Arc::clone(&controller), &[]).await?;

    let deadline = tokio::time::Instant::now() + grace;
    while !controller.get_node_names().await?.is_empty() {
        if tokio::time::Instant::now() >= deadline {
            break;
        }
        tokio::time::sleep(Duration::from_secs(1)).await;
    }
    for name in controller.get_node_names().await? {
        warn!(node = %name, "did not stop within grace period, killing");
        if let Err(e) = controller.kill(&name).await {
            error!(node = %name, error = %e, "kill failed");
        }
    }
    Ok(())
}
