//! Update orchestration configuration.

use serde::{Deserialize, Serialize};

use super::default_true;

/// Identity, update policy and built-in job cadence for the orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Docker control socket, also mounted into the delegate updater.
    #[serde(default = "default_docker_socket")]
    pub docker_socket: String,

    /// Repository of the orchestrator's own image.
    #[serde(default = "default_self_image")]
    pub self_image: String,

    /// Name of the orchestrator's own container.
    #[serde(default = "default_self_container")]
    pub self_container: String,

    /// Only images under this prefix are ever updated.
    #[serde(default = "default_managed_prefix")]
    pub managed_prefix: String,

    /// One-shot updater image that performs the actual restarts.
    #[serde(default = "default_delegate_image")]
    pub delegate_image: String,

    /// Grace period given to a container before it is killed.
    #[serde(default = "default_stop_timeout")]
    pub stop_timeout_secs: u64,

    /// Remove the old image after a restart.
    #[serde(default = "default_true")]
    pub cleanup: bool,

    /// Remove anonymous volumes of replaced containers.
    #[serde(default = "default_true")]
    pub remove_volumes: bool,

    #[serde(default = "default_self_update_interval")]
    pub self_update_interval_minutes: u32,

    #[serde(default = "default_prune_interval")]
    pub prune_interval_minutes: u32,

    /// Prune and check for a self-update once at startup.
    #[serde(default = "default_true")]
    pub update_on_startup: bool,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            docker_socket: default_docker_socket(),
            self_image: default_self_image(),
            self_container: default_self_container(),
            managed_prefix: default_managed_prefix(),
            delegate_image: default_delegate_image(),
            stop_timeout_secs: default_stop_timeout(),
            cleanup: true,
            remove_volumes: true,
            self_update_interval_minutes: default_self_update_interval(),
            prune_interval_minutes: default_prune_interval(),
            update_on_startup: true,
        }
    }
}

fn default_docker_socket() -> String {
    "/var/run/docker.sock".to_string()
}

fn default_self_image() -> String {
    "tidewatch/tidewatch".to_string()
}

fn default_self_container() -> String {
    "tidewatch".to_string()
}

fn default_managed_prefix() -> String {
    "tidewatch/".to_string()
}

fn default_delegate_image() -> String {
    "containrrr/watchtower".to_string()
}

fn default_stop_timeout() -> u64 {
    30
}

fn default_self_update_interval() -> u32 {
    30
}

fn default_prune_interval() -> u32 {
    24 * 60
}
