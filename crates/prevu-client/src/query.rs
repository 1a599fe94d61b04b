//! Querying the runtime proxy for active tunnels

use std::time::Duration;

use thiserror::Error;
use tracing::debug;

use prevu_proto::TunnelsResponse;

use crate::http1::{self, HttpError};
use crate::locate::ProxyAddress;
use crate::session::{SecureSession, SessionError};

/// Query endpoint the proxy serves its tunnel listing on.
pub const TUNNELS_PATH: &str = "/tunnels";

#[derive(Debug, Error)]
pub enum QueryError {
    /// The proxy was never reached: channel setup or transfer failed.
    #[error("Tunnel query transport failed: {0}")]
    Transport(String),
    /// The proxy accepted the request but no response arrived in time.
    #[error("Tunnel query timed out after {0:?}")]
    Timeout(Duration),
    /// The proxy answered, but the body is not a tunnel listing.
    #[error("Malformed tunnel response: {0}")]
    Malformed(#[from] serde_json::Error),
}

impl From<SessionError> for QueryError {
    fn from(err: SessionError) -> Self {
        QueryError::Transport(err.to_string())
    }
}

impl From<HttpError> for QueryError {
    fn from(err: HttpError) -> Self {
        QueryError::Transport(err.to_string())
    }
}

/// Issues one request to the proxy through the session and parses the
/// response into the nested tunnel structure. The whole exchange is bounded
/// by `timeout`.
///
/// Must run inside the forwarding scope that keeps the proxy alive. No
/// retries happen here; the caller owns retry policy for the whole cycle.
pub async fn query_tunnels<S>(
    session: &S,
    address: &ProxyAddress,
    timeout: Duration,
) -> Result<TunnelsResponse, QueryError>
where
    S: SecureSession + ?Sized,
{
    let body = tokio::time::timeout(timeout, async {
        let stream = session.open_tcp_stream(&address.host, address.port).await?;
        Ok::<_, QueryError>(http1::get(stream, &address.to_string(), TUNNELS_PATH).await?)
    })
    .await
    .map_err(|_| QueryError::Timeout(timeout))??;
    debug!("tunnel response: {} bytes", body.len());
    Ok(serde_json::from_str(&body)?)
}
