//! Secure session to the remote environment host

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use russh::client::{self, Handle};
use russh::keys::{decode_secret_key, PrivateKeyWithHashAlg, PublicKey};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Failed to connect to {host}:{port}: {message}")]
    Connect {
        host: String,
        port: u16,
        message: String,
    },
    #[error("Authentication failed for user {user}: {message}")]
    Auth { user: String, message: String },
    #[error("Invalid private key material: {0}")]
    Key(String),
    #[error("Failed to open channel: {0}")]
    Channel(String),
    #[error("Failed to close session: {0}")]
    Disconnect(String),
}

/// Byte stream opened through a session.
pub trait SessionIo: AsyncRead + AsyncWrite + Send + Unpin {}
impl<T: AsyncRead + AsyncWrite + Send + Unpin> SessionIo for T {}

pub type SessionStream = Box<dyn SessionIo>;

/// An authenticated, open channel to exactly one remote host.
///
/// Capability seam of the discovery cycle: production code uses
/// [`SshSession`], tests substitute a double. Disposal belongs to whoever
/// created the session and is idempotent.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SecureSession: Send + Sync {
    /// Opens a stream to a TCP endpoint as reachable from the remote host.
    async fn open_tcp_stream(&self, host: &str, port: u16) -> Result<SessionStream, SessionError>;

    /// Opens a stream to a unix socket on the remote host.
    async fn open_unix_stream(&self, socket_path: &str) -> Result<SessionStream, SessionError>;

    /// Closes the session. Later calls are no-ops.
    async fn disconnect(&self) -> Result<(), SessionError>;
}

/// Connection parameters for [`SshSession::connect`]. Key material comes from
/// the caller's credential store.
#[derive(Debug, Clone)]
pub struct SshSessionConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub private_key_pem: String,
}

/// SSH-backed [`SecureSession`].
pub struct SshSession {
    handle: Handle<ClientHandler>,
    disconnected: AtomicBool,
}

struct ClientHandler;

impl client::Handler for ClientHandler {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        _server_public_key: &PublicKey,
    ) -> Result<bool, Self::Error> {
        // Environment hosts are machines we provisioned moments ago; there is
        // no known_hosts entry to check against.
        Ok(true)
    }
}

impl SshSession {
    pub async fn connect(config: SshSessionConfig) -> Result<Self, SessionError> {
        let russh_config = Arc::new(client::Config {
            inactivity_timeout: Some(Duration::from_secs(30)),
            keepalive_interval: Some(Duration::from_secs(15)),
            ..Default::default()
        });

        info!(
            "connecting to {}@{}:{}",
            config.username, config.host, config.port
        );

        let mut handle = client::connect(
            russh_config,
            (config.host.as_str(), config.port),
            ClientHandler,
        )
        .await
        .map_err(|e| SessionError::Connect {
            host: config.host.clone(),
            port: config.port,
            message: e.to_string(),
        })?;

        let key = decode_secret_key(&config.private_key_pem, None)
            .map_err(|e| SessionError::Key(e.to_string()))?;

        let auth_result = handle
            .authenticate_publickey(
                config.username.as_str(),
                PrivateKeyWithHashAlg::new(Arc::new(key), None),
            )
            .await
            .map_err(|e| SessionError::Auth {
                user: config.username.clone(),
                message: e.to_string(),
            })?;

        if !auth_result.success() {
            return Err(SessionError::Auth {
                user: config.username,
                message: "public key rejected".to_string(),
            });
        }

        debug!("session authenticated");

        Ok(Self {
            handle,
            disconnected: AtomicBool::new(false),
        })
    }
}

#[async_trait]
impl SecureSession for SshSession {
    async fn open_tcp_stream(&self, host: &str, port: u16) -> Result<SessionStream, SessionError> {
        let channel = self
            .handle
            .channel_open_direct_tcpip(host, port as u32, "127.0.0.1", 0)
            .await
            .map_err(|e| SessionError::Channel(e.to_string()))?;
        Ok(Box::new(channel.into_stream()))
    }

    async fn open_unix_stream(&self, socket_path: &str) -> Result<SessionStream, SessionError> {
        let channel = self
            .handle
            .channel_open_direct_streamlocal(socket_path)
            .await
            .map_err(|e| SessionError::Channel(e.to_string()))?;
        Ok(Box::new(channel.into_stream()))
    }

    async fn disconnect(&self) -> Result<(), SessionError> {
        if self.disconnected.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.handle
            .disconnect(russh::Disconnect::ByApplication, "", "en")
            .await
            .map_err(|e| SessionError::Disconnect(e.to_string()))
    }
}
