//! Compose-style descriptor for the transient runtime proxy
//!
//! The proxy is a single-service unit whose only job is to report the
//! runtime's active port mappings for one project. Building the descriptor is
//! pure; an external orchestrator materializes it on the remote host.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Service name of the proxy unit inside its compose model.
pub const PROXY_SERVICE_NAME: &str = "runtime_proxy";

/// Image that serves the port-mapping query API.
pub const PROXY_IMAGE: &str = "ghcr.io/prevu-dev/runtime-proxy:1";

/// Container port the proxy serves its query API on. The orchestrator
/// publishes it on an ephemeral host port; the locator resolves which one.
pub const PROXY_QUERY_PORT: u16 = 3000;

/// Control socket of the container runtime on the remote host, bind-mounted
/// into the proxy so it can introspect port mappings.
pub const CONTROL_SOCKET_PATH: &str = "/var/run/docker.sock";

/// Minimal compose model: a named project with its services.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComposeModel {
    pub name: String,
    pub services: IndexMap<String, ComposeService>,
}

impl ComposeModel {
    /// Renders the model for submission to the orchestrator.
    pub fn to_yaml(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(self)
    }
}

/// One service entry of a compose model.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComposeService {
    pub image: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub container_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub restart: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub volumes: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ports: Vec<String>,
}

/// Deterministic container name of the proxy unit for a project. Repeated
/// invocations against the same project address the same unit.
pub fn proxy_container_name(project: &str) -> String {
    format!("{project}-runtime-proxy")
}

/// Builds the single-service descriptor that introspects the runtime's port
/// mappings for `project`. Pure: no I/O, same project gives the same model.
pub fn proxy_service_model(project: &str) -> ComposeModel {
    let mut services = IndexMap::new();
    services.insert(
        PROXY_SERVICE_NAME.to_string(),
        ComposeService {
            image: PROXY_IMAGE.to_string(),
            container_name: Some(proxy_container_name(project)),
            restart: Some("on-failure".to_string()),
            volumes: vec![format!("{CONTROL_SOCKET_PATH}:{CONTROL_SOCKET_PATH}")],
            // Container port only: the host port stays ephemeral.
            ports: vec![PROXY_QUERY_PORT.to_string()],
        },
    );
    ComposeModel {
        name: project.to_string(),
        services,
    }
}
