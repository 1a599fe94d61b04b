//! Tunnel structures as reported by the runtime proxy

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Published addresses for each container port of one service.
///
/// On the wire the port keys are JSON object keys (strings); serde parses
/// them into `u16`, and a key that is not a valid port number fails
/// deserialization.
pub type PortTunnels = IndexMap<u16, Vec<String>>;

/// Port mappings for each service of one environment.
pub type ServiceTunnels = IndexMap<String, PortTunnels>;

/// Nested tunnel structure: environment id → service → port → addresses.
///
/// Immutable once parsed. Iteration follows the document order of the proxy
/// response, which is what makes the flattened output deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawTunnels(pub IndexMap<String, ServiceTunnels>);

impl RawTunnels {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Response envelope returned by the proxy's `/tunnels` endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TunnelsResponse {
    pub tunnels: RawTunnels,
}

/// One display-ready tunnel record: which service, which container port, and
/// the URL that reaches it from the caller's side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlatTunnel {
    pub service: String,
    pub port: u16,
    pub url: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_nested_response() {
        let json = r#"{"tunnels":{"env1":{"web":{"80":["http://10.0.0.2:32768"]}}}}"#;
        let response: TunnelsResponse = serde_json::from_str(json).unwrap();

        let services = response.tunnels.0.get("env1").unwrap();
        let ports = services.get("web").unwrap();
        assert_eq!(ports.get(&80).unwrap(), &vec!["http://10.0.0.2:32768".to_string()]);
    }

    #[test]
    fn rejects_non_numeric_port_keys() {
        let json = r#"{"tunnels":{"env1":{"web":{"http":["http://10.0.0.2:32768"]}}}}"#;
        assert!(serde_json::from_str::<TunnelsResponse>(json).is_err());
    }

    #[test]
    fn preserves_document_order() {
        let json = r#"{"tunnels":{"env1":{"zeta":{"80":[]},"alpha":{"81":[]}}}}"#;
        let response: TunnelsResponse = serde_json::from_str(json).unwrap();

        let services: Vec<&String> = response.tunnels.0["env1"].keys().collect();
        assert_eq!(services, ["zeta", "alpha"]);
    }
}
