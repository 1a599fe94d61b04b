//! Tunnel discovery against a remote preview environment
//!
//! One discovery cycle runs as a strictly forward flow: an authenticated SSH
//! session is opened by the caller, the remote container-runtime control
//! socket is forwarded to a local path for the duration of the cycle, the
//! transient query proxy is located through that socket, queried once over
//! the session, and its response flattened into display-ready records. The
//! forwarded socket and the session are released on every exit path.

pub mod discover;
pub mod forward;
pub mod http1;
pub mod locate;
pub mod query;
pub mod session;

pub use discover::{discover_tunnels, run_discovery_cycle, DiscoveryError};
pub use forward::{default_socket_path, with_forwarded_socket, ForwardError, ForwardedSocket};
pub use locate::{DockerProxyLocator, LocateError, LocateOptions, ProxyAddress, ProxyLocator};
pub use query::{query_tunnels, QueryError};
pub use session::{SecureSession, SessionError, SessionStream, SshSession, SshSessionConfig};
