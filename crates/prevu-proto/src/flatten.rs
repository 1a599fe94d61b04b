//! Flattening the nested tunnel structure

use crate::tunnels::{FlatTunnel, RawTunnels};

/// Converts the nested tunnel structure into an ordered flat sequence.
///
/// Walks environments, services, ports and published addresses in their
/// insertion order and emits one record per address, so identical input
/// always yields an identical sequence. A port with no published address
/// contributes nothing; empty input yields an empty vector. Total: this
/// never fails.
pub fn flatten_tunnels(raw: &RawTunnels) -> Vec<FlatTunnel> {
    let mut flat = Vec::new();
    for services in raw.0.values() {
        for (service, ports) in services {
            for (port, urls) in ports {
                for url in urls {
                    flat.push(FlatTunnel {
                        service: service.clone(),
                        port: *port,
                        url: url.clone(),
                    });
                }
            }
        }
    }
    flat
}
