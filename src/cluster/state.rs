//! The durable cluster state record: the single source of truth shared by
//! repeated, possibly-interrupted invocations.
//!
//! The record round-trips exactly: load → save reproduces the same document
//! for unmodified fields, including the tri-state `Wrap` encoding
//! (`false` = disabled, `null` = auto, string = explicit path) that the
//! wire format inherits from the operator surface.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::de::{self, Deserializer, Visitor};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::cluster::ClusterError;
use crate::manage::ManageKind;

/// Overall intent for the cluster. Running iff at least one node's recorded
/// status is Running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DesiredState {
    Running,
    Stopped,
}

/// Last recorded status of one node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeStatus {
    Running,
    Stopped,
    Unknown,
    #[serde(rename = "No Response")]
    NoResponse,
}

impl fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeStatus::Running => write!(f, "Running"),
            NodeStatus::Stopped => write!(f, "Stopped"),
            NodeStatus::Unknown => write!(f, "Unknown"),
            NodeStatus::NoResponse => write!(f, "No Response"),
        }
    }
}

/// Mutable per-node record, owned by this layer and updated after every
/// lifecycle operation. Controllers never touch it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeRuntimeRecord {
    #[serde(rename = "Status")]
    pub status: NodeStatus,

    /// Roster position. Absent for records created for names the roster
    /// never declared.
    #[serde(rename = "Index", default, skip_serializing_if = "Option::is_none")]
    pub index: Option<usize>,
}

/// The wrap (shared data home) setting fixed for the life of a cluster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WrapSetting {
    /// No shared data home.
    Disabled,
    /// Allocate a temporary directory on first use and fix it in state.
    Auto,
    /// Use this directory verbatim.
    Path(PathBuf),
}

impl Serialize for WrapSetting {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            WrapSetting::Disabled => serializer.serialize_bool(false),
            WrapSetting::Auto => serializer.serialize_unit(),
            WrapSetting::Path(path) => path.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for WrapSetting {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct WrapVisitor;

        impl<'de> Visitor<'de> for WrapVisitor {
            type Value = WrapSetting;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("false, null, or a path string")
            }

            fn visit_bool<E: de::Error>(self, v: bool) -> Result<WrapSetting, E> {
                if v {
                    Err(E::custom("Wrap cannot be true; use null or a path"))
                } else {
                    Ok(WrapSetting::Disabled)
                }
            }

            fn visit_unit<E: de::Error>(self) -> Result<WrapSetting, E> {
                Ok(WrapSetting::Auto)
            }

            fn visit_none<E: de::Error>(self) -> Result<WrapSetting, E> {
                Ok(WrapSetting::Auto)
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<WrapSetting, E> {
                Ok(WrapSetting::Path(PathBuf::from(v)))
            }
        }

        deserializer.deserialize_any(WrapVisitor)
    }
}

fn deserialize_wrap_field<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<WrapSetting>, D::Error> {
    // The field being present (even as null) is meaningful, so the usual
    // Option-means-null mapping does not apply here.
    WrapSetting::deserialize(deserializer).map(Some)
}

fn deserialize_manage_wrap_field<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<Option<bool>>, D::Error> {
    // Same present-vs-absent distinction as the wrap field.
    Option::<bool>::deserialize(deserializer).map(Some)
}

/// The single durable record for one cluster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterState {
    #[serde(rename = "DesiredState")]
    pub desired_state: DesiredState,

    /// Backend kind; fixed once the cluster is running.
    #[serde(rename = "Manage", default, skip_serializing_if = "Option::is_none")]
    pub manage: Option<ManageKind>,

    /// Shared data home setting. Absent until the first controller
    /// construction records it.
    #[serde(
        rename = "Wrap",
        default,
        deserialize_with = "deserialize_wrap_field",
        skip_serializing_if = "Option::is_none"
    )]
    pub wrap: Option<WrapSetting>,

    /// Whether this cluster owns (and may delete) the wrap directory. The
    /// present-but-null state is meaningful: wrapping is active but
    /// ownership is still undetermined.
    #[serde(
        rename = "ManageWrap",
        default,
        deserialize_with = "deserialize_manage_wrap_field",
        skip_serializing_if = "Option::is_none"
    )]
    pub manage_wrap: Option<Option<bool>>,

    #[serde(rename = "Nodes", default)]
    pub nodes: BTreeMap<String, NodeRuntimeRecord>,
}

impl Default for ClusterState {
    fn default() -> Self {
        Self {
            desired_state: DesiredState::Stopped,
            manage: None,
            wrap: None,
            manage_wrap: None,
            nodes: BTreeMap::new(),
        }
    }
}

impl ClusterState {
    /// Load the record from `path`. With `create_if_missing` (the `start`
    /// command) a missing file yields a fresh Stopped record; every other
    /// command treats it as an operator error.
    pub fn load(path: &Path, create_if_missing: bool) -> Result<Self, ClusterError> {
        if path.is_file() {
            let contents = std::fs::read_to_string(path)
                .map_err(|source| ClusterError::StateIo { path: path.to_path_buf(), source })?;
            let state = serde_json::from_str(&contents)
                .map_err(|source| ClusterError::StateCorrupt { path: path.to_path_buf(), source })?;
            debug!(path = %path.display(), "loaded cluster state");
            Ok(state)
        } else if create_if_missing {
            Ok(Self::default())
        } else {
            Err(ClusterError::MissingStateFile { path: path.to_path_buf() })
        }
    }

    /// Persist the record. Only called after a successful mutation batch.
    pub fn save(&self, path: &Path) -> Result<(), ClusterError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|source| ClusterError::StateIo { path: parent.to_path_buf(), source })?;
        }
        let contents = serde_json::to_string_pretty(self)
            .map_err(|source| ClusterError::StateEncode { source })?;
        std::fs::write(path, contents)
            .map_err(|source| ClusterError::StateIo { path: path.to_path_buf(), source })?;
        debug!(path = %path.display(), "saved cluster state");
        Ok(())
    }

    /// Delete the record.
    pub fn delete(path: &Path) -> Result<(), ClusterError> {
        std::fs::remove_file(path)
            .map_err(|source| ClusterError::StateIo { path: path.to_path_buf(), source })
    }

    /// Recompute `DesiredState`: Running iff any node's record is Running.
    pub fn recompute_desired_state(&mut self) {
        let any_running =
            self.nodes.values().any(|record| record.status == NodeStatus::Running);
        self.desired_state =
            if any_running { DesiredState::Running } else { DesiredState::Stopped };
    }
}
