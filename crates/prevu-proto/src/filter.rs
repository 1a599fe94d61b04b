//! Narrowing the flattened tunnel list

use crate::tunnels::FlatTunnel;

/// Optional selection criteria for flattened tunnels.
///
/// The port criterion only participates when a service is also given: a
/// filter carrying a port but no service matches every record. This mirrors
/// the CLI's positional arguments (`urls [SERVICE] [PORT]`), where a port
/// cannot be supplied without naming a service first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TunnelFilter {
    pub service: Option<String>,
    pub port: Option<u16>,
}

impl TunnelFilter {
    pub fn matches(&self, tunnel: &FlatTunnel) -> bool {
        match &self.service {
            None => true,
            Some(service) => {
                tunnel.service == *service && self.port.map_or(true, |port| tunnel.port == port)
            }
        }
    }

    /// Keeps matching records, preserving the input order. Empty criteria
    /// return the input unchanged.
    pub fn select(&self, tunnels: &[FlatTunnel]) -> Vec<FlatTunnel> {
        tunnels.iter().filter(|t| self.matches(t)).cloned().collect()
    }
}
