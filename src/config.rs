//! Centralized configuration for the cluster orchestrator.
//!
//! Every path and external-binary name is an explicit value threaded through
//! construction. There is no ambient home-directory lookup inside the
//! controllers, so tests can run multiple isolated clusters in one process
//! by pointing each at its own directories.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Default values for configuration.
mod defaults {
    use std::path::PathBuf;

    pub fn base_dir() -> PathBuf {
        dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")).join(".valnet").join("cluster")
    }

    pub fn state_file() -> PathBuf {
        base_dir().join("state.json")
    }

    pub fn daemon_state_dir() -> PathBuf {
        base_dir()
    }

    pub fn validator_bin() -> String {
        "ledger-validator".to_string()
    }

    pub fn admin_bin() -> String {
        "ledger-admin".to_string()
    }

    pub fn docker_image() -> String {
        "valnet/validator:latest".to_string()
    }

    pub fn host_name() -> String {
        "localhost".to_string()
    }
}

/// Configuration for one cluster: where state lives and how validators run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterConfig {
    /// Path of the persisted cluster state record.
    #[serde(default = "defaults::state_file")]
    pub state_file: PathBuf,

    /// Directory the daemon backend keeps pid files in.
    #[serde(default = "defaults::daemon_state_dir")]
    pub daemon_state_dir: PathBuf,

    /// Name (or path) of the validator executable.
    #[serde(default = "defaults::validator_bin")]
    pub validator_bin: String,

    /// Name (or path) of the ledger admin tool used for key generation and
    /// genesis-block authoring.
    #[serde(default = "defaults::admin_bin")]
    pub admin_bin: String,

    /// Container image used by the docker backend.
    #[serde(default = "defaults::docker_image")]
    pub docker_image: String,

    /// Host name validators bind their listeners to.
    #[serde(default = "defaults::host_name")]
    pub host_name: String,

    /// Pass `-vv` to spawned validators.
    #[serde(default)]
    pub verbose: bool,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            state_file: defaults::state_file(),
            daemon_state_dir: defaults::daemon_state_dir(),
            validator_bin: defaults::validator_bin(),
            admin_bin: defaults::admin_bin(),
            docker_image: defaults::docker_image(),
            host_name: defaults::host_name(),
            verbose: false,
        }
    }
}

impl ClusterConfig {
    /// Build a configuration from defaults plus `VALNET_*` environment
    /// overrides.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(path) = std::env::var("VALNET_STATE_FILE") {
            config.state_file = PathBuf::from(path);
        }
        if let Ok(path) = std::env::var("VALNET_DAEMON_STATE_DIR") {
            config.daemon_state_dir = PathBuf::from(path);
        }
        if let Ok(bin) = std::env::var("VALNET_VALIDATOR_BIN") {
            config.validator_bin = bin;
        }
        if let Ok(bin) = std::env::var("VALNET_ADMIN_BIN") {
            config.admin_bin = bin;
        }
        if let Ok(image) = std::env::var("VALNET_DOCKER_IMAGE") {
            config.docker_image = image;
        }
        config
    }

    /// Rooted at `dir`: state file and daemon pid files both live under it.
    /// Intended for tests and scripted deployments.
    pub fn rooted_at(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        Self {
            state_file: dir.join("state.json"),
            daemon_state_dir: dir.clone(),
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rooted_config_keeps_everything_under_root() {
        let config = ClusterConfig::rooted_at("/tmp/valnet-test");
        assert_eq!(config.state_file, PathBuf::from("/tmp/valnet-test/state.json"));
        assert_eq!(config.daemon_state_dir, PathBuf::from("/tmp/valnet-test"));
    }

    #[test]
    fn default_round_trips_through_serde() {
        let config = ClusterConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let back: ClusterConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.validator_bin, config.validator_bin);
        assert_eq!(back.state_file, config.state_file);
    }
}
