//! One discovery cycle, start to finish
//!
//! The stages run strictly forward: forward the control socket, locate the
//! proxy, query it, flatten. Each stage's output is the sole input of the
//! next; a failure anywhere is fatal for the cycle and no partial result is
//! ever returned.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, warn};

use prevu_compose::{proxy_service_model, CONTROL_SOCKET_PATH};
use prevu_proto::{flatten_tunnels, FlatTunnel};

use crate::forward::{with_forwarded_socket, ForwardError};
use crate::locate::{LocateError, ProxyLocator};
use crate::query::{query_tunnels, QueryError};
use crate::session::SecureSession;

#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("Socket forwarding failed: {0}")]
    Forward(#[from] ForwardError),
    #[error(transparent)]
    Locate(#[from] LocateError),
    #[error(transparent)]
    Query(#[from] QueryError),
}

/// Runs the locate → query → flatten pipeline inside a forwarding scope.
///
/// The forwarded socket is released before this returns, on success and on
/// error alike. The session stays open; see [`run_discovery_cycle`] for the
/// variant that also owns session disposal.
pub async fn discover_tunnels<S>(
    session: Arc<S>,
    locator: &dyn ProxyLocator,
    project: &str,
    socket_path: Option<PathBuf>,
    query_timeout: Duration,
) -> Result<Vec<FlatTunnel>, DiscoveryError>
where
    S: SecureSession + ?Sized + 'static,
{
    let model = proxy_service_model(project);
    let query_session = session.clone();

    with_forwarded_socket(session, socket_path, CONTROL_SOCKET_PATH, |socket| {
        async move {
            let address = locator.locate(&model, &socket).await?;
            debug!("proxy query endpoint: {address}");

            let response = query_tunnels(query_session.as_ref(), &address, query_timeout).await?;

            Ok(flatten_tunnels(&response.tunnels))
        }
    })
    .await
}

/// Discovery cycle that owns the session: whatever the outcome, the session
/// is disconnected exactly once before the result is returned.
pub async fn run_discovery_cycle<S>(
    session: Arc<S>,
    locator: &dyn ProxyLocator,
    project: &str,
    socket_path: Option<PathBuf>,
    query_timeout: Duration,
) -> Result<Vec<FlatTunnel>, DiscoveryError>
where
    S: SecureSession + ?Sized + 'static,
{
    let result =
        discover_tunnels(session.clone(), locator, project, socket_path, query_timeout).await;

    if let Err(err) = session.disconnect().await {
        warn!("failed to close session: {err}");
    }

    result
}
