//! Scoped forwarding of the remote control socket
//!
//! The remote container runtime only listens on a unix socket on its own
//! host. For the duration of one discovery cycle that socket is exposed at a
//! local path: a local listener accepts connections and pipes each one
//! through a `direct-streamlocal` channel of the session. Leaking the
//! listener would leave a stray local socket behind, so release is tied to a
//! guard that runs on every exit path, including cancellation.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;
use tokio::net::UnixListener;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::session::SecureSession;

#[derive(Debug, Error)]
pub enum ForwardError {
    #[error("Failed to bind local forwarding socket {path}: {source}")]
    Bind {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Handle to one active socket-forwarding relationship.
///
/// Only valid inside the `with_forwarded_socket` scope that created it; the
/// local path stops existing when the scope ends.
pub struct ForwardedSocket {
    local_path: PathBuf,
}

impl ForwardedSocket {
    pub(crate) fn new(local_path: PathBuf) -> Self {
        Self { local_path }
    }

    pub fn local_path(&self) -> &Path {
        &self.local_path
    }
}

/// Well-known fallback path for the forwarded control socket.
pub fn default_socket_path() -> PathBuf {
    std::env::temp_dir().join(format!("prevu-runtime-{}.sock", std::process::id()))
}

struct ForwardGuard {
    task: JoinHandle<()>,
    local_path: PathBuf,
}

impl Drop for ForwardGuard {
    fn drop(&mut self) {
        self.task.abort();
        if let Err(err) = std::fs::remove_file(&self.local_path) {
            if err.kind() != std::io::ErrorKind::NotFound {
                warn!(
                    "failed to remove forwarded socket {}: {}",
                    self.local_path.display(),
                    err
                );
            }
        }
    }
}

/// Exposes the remote control socket at a local path for the duration of
/// `action`.
///
/// Setup failure surfaces immediately and aborts the cycle. Errors from
/// `action` propagate after the forwarding is released; release also runs
/// when the returned future is dropped mid-flight.
pub async fn with_forwarded_socket<S, F, Fut, T, E>(
    session: Arc<S>,
    local_path: Option<PathBuf>,
    remote_path: &str,
    action: F,
) -> Result<T, E>
where
    S: SecureSession + ?Sized + 'static,
    F: FnOnce(ForwardedSocket) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: From<ForwardError>,
{
    let local_path = local_path.unwrap_or_else(default_socket_path);

    // A socket file left by a crashed run would fail the bind.
    match std::fs::remove_file(&local_path) {
        Ok(()) => {}
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
        Err(source) => {
            return Err(ForwardError::Bind {
                path: local_path,
                source,
            }
            .into())
        }
    }

    let listener = UnixListener::bind(&local_path).map_err(|source| ForwardError::Bind {
        path: local_path.clone(),
        source,
    })?;
    debug!(
        "forwarding {} -> {} (remote)",
        local_path.display(),
        remote_path
    );

    let remote_path = remote_path.to_string();
    let task = tokio::spawn(run_accept_loop(listener, remote_path, session));
    let _guard = ForwardGuard {
        task,
        local_path: local_path.clone(),
    };

    action(ForwardedSocket::new(local_path)).await
}

async fn run_accept_loop<S>(listener: UnixListener, remote_path: String, session: Arc<S>)
where
    S: SecureSession + ?Sized,
{
    loop {
        match listener.accept().await {
            Ok((mut local, _)) => match session.open_unix_stream(&remote_path).await {
                Ok(mut remote) => {
                    // Connections are handled one at a time; the control
                    // socket clients here issue sequential single-shot
                    // requests, and serial handling keeps teardown exact.
                    if let Err(err) = tokio::io::copy_bidirectional(&mut local, &mut remote).await {
                        debug!("forwarded connection ended: {err}");
                    }
                }
                Err(err) => warn!("failed to reach remote control socket: {err}"),
            },
            Err(err) => {
                warn!("forwarded socket accept failed: {err}");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{MockSecureSession, SessionStream};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::UnixStream;

    #[derive(Debug)]
    enum CycleError {
        Forward(ForwardError),
        Action,
    }

    impl From<ForwardError> for CycleError {
        fn from(err: ForwardError) -> Self {
            CycleError::Forward(err)
        }
    }

    fn echo_session() -> MockSecureSession {
        let mut session = MockSecureSession::new();
        session.expect_open_unix_stream().returning(|_| {
            let (client, mut server) = tokio::io::duplex(4096);
            tokio::spawn(async move {
                let mut buf = vec![0u8; 64];
                if let Ok(read) = server.read(&mut buf).await {
                    let _ = server.write_all(&buf[..read]).await;
                }
            });
            Ok(Box::new(client) as SessionStream)
        });
        session
    }

    #[tokio::test]
    async fn pipes_local_connections_to_the_remote_socket() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("runtime.sock");

        let result: Result<Vec<u8>, CycleError> = with_forwarded_socket(
            Arc::new(echo_session()),
            Some(path.clone()),
            "/var/run/docker.sock",
            |socket| async move {
                let mut stream = UnixStream::connect(socket.local_path()).await.unwrap();
                stream.write_all(b"ping").await.unwrap();
                stream.shutdown().await.unwrap();
                let mut echoed = Vec::new();
                stream.read_to_end(&mut echoed).await.unwrap();
                Ok(echoed)
            },
        )
        .await;

        assert_eq!(result.unwrap(), b"ping");
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn socket_is_released_when_action_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("runtime.sock");
        let path_seen = path.clone();

        let result: Result<(), CycleError> = with_forwarded_socket(
            Arc::new(MockSecureSession::new()),
            Some(path.clone()),
            "/var/run/docker.sock",
            |_socket| async move {
                assert!(path_seen.exists());
                Err(CycleError::Action)
            },
        )
        .await;

        assert!(matches!(result, Err(CycleError::Action)));
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn bind_failure_surfaces_immediately() {
        let result: Result<(), CycleError> = with_forwarded_socket(
            Arc::new(MockSecureSession::new()),
            Some(PathBuf::from("/nonexistent-dir/runtime.sock")),
            "/var/run/docker.sock",
            |_socket| async move { panic!("action must not run when setup fails") },
        )
        .await;

        assert!(matches!(result, Err(CycleError::Forward(_))));
    }

    #[tokio::test]
    async fn replaces_a_stale_socket_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("runtime.sock");
        std::fs::write(&path, b"").unwrap();

        let result: Result<(), CycleError> = with_forwarded_socket(
            Arc::new(MockSecureSession::new()),
            Some(path.clone()),
            "/var/run/docker.sock",
            |_socket| async move { Ok(()) },
        )
        .await;

        assert!(result.is_ok());
        assert!(!path.exists());
    }
}
