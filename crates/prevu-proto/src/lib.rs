//! Data model for preview-environment tunnel discovery
//!
//! The runtime proxy reports active port mappings as a nested structure
//! (environment → service → container port → published addresses). This crate
//! holds that model plus the pure transforms that turn it into the flat,
//! filterable records the CLI presents. No I/O happens here.

mod filter;
mod flatten;
mod tunnels;

pub use filter::TunnelFilter;
pub use flatten::flatten_tunnels;
pub use tunnels::{FlatTunnel, PortTunnels, RawTunnels, ServiceTunnels, TunnelsResponse};
