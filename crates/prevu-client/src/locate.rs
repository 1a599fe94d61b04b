//! Locating the transient proxy's query endpoint
//!
//! Materialization of the proxy unit is the orchestrator's job; this module
//! only answers "where can it be queried right now". The runtime's container
//! listing is read through the forwarded control socket, the proxy unit is
//! matched by its deterministic container name, and the published host port
//! of its query port is returned.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;
use tokio::net::UnixStream;
use tracing::debug;

use prevu_compose::{proxy_container_name, ComposeModel, PROXY_QUERY_PORT};

use crate::forward::ForwardedSocket;
use crate::http1::{self, HttpError};

#[derive(Debug, Error)]
pub enum LocateError {
    #[error("Proxy unavailable for project {project}: no published query endpoint after {attempts} attempts")]
    ProxyUnavailable { project: String, attempts: u32 },
    #[error("Runtime listing failed: {0}")]
    Runtime(#[from] HttpError),
    #[error("Failed to connect to forwarded control socket: {0}")]
    Socket(#[source] std::io::Error),
    #[error("Unexpected container listing shape: {0}")]
    Listing(#[from] serde_json::Error),
    #[error("Timed out waiting for the runtime listing after {0:?}")]
    Timeout(Duration),
}

/// Where the proxy's query endpoint is reachable, as seen from the remote
/// host. The query client dials it through the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyAddress {
    pub host: String,
    pub port: u16,
}

impl fmt::Display for ProxyAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Resolves the query endpoint of a materialized proxy unit.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ProxyLocator: Send + Sync {
    async fn locate(
        &self,
        model: &ComposeModel,
        socket: &ForwardedSocket,
    ) -> Result<ProxyAddress, LocateError>;
}

/// Bounded-wait knobs for proxy materialization. The ceiling is fixed per
/// cycle; exceeding it is fatal. Each listing pass is itself bounded by
/// `request_timeout` so a socket that accepts and never answers cannot stall
/// the attempt counter.
#[derive(Debug, Clone)]
pub struct LocateOptions {
    pub attempts: u32,
    pub delay: Duration,
    pub request_timeout: Duration,
}

impl Default for LocateOptions {
    fn default() -> Self {
        Self {
            attempts: 30,
            delay: Duration::from_secs(1),
            request_timeout: Duration::from_secs(5),
        }
    }
}

/// [`ProxyLocator`] backed by the container runtime's HTTP API, spoken over
/// the forwarded control socket.
#[derive(Debug, Clone, Default)]
pub struct DockerProxyLocator {
    options: LocateOptions,
}

const CONTAINERS_PATH: &str = "/v1.41/containers/json";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ContainerSummary {
    #[serde(default)]
    names: Vec<String>,
    #[serde(default)]
    ports: Vec<PortMapping>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct PortMapping {
    #[serde(default)]
    private_port: u16,
    #[serde(default)]
    public_port: Option<u16>,
}

impl DockerProxyLocator {
    pub fn new() -> Self {
        Self {
            options: LocateOptions::default(),
        }
    }

    pub fn with_options(mut self, options: LocateOptions) -> Self {
        self.options = options;
        self
    }

    /// One listing pass. `Ok(None)` means the unit is not up yet (or has no
    /// published port yet); runtime or socket failures are fatal, as is a
    /// listing that does not come back within the request timeout.
    async fn query_published_port(
        &self,
        project: &str,
        socket: &ForwardedSocket,
    ) -> Result<Option<ProxyAddress>, LocateError> {
        let body = tokio::time::timeout(self.options.request_timeout, async {
            let stream = UnixStream::connect(socket.local_path())
                .await
                .map_err(LocateError::Socket)?;
            Ok::<_, LocateError>(http1::get(stream, "localhost", CONTAINERS_PATH).await?)
        })
        .await
        .map_err(|_| LocateError::Timeout(self.options.request_timeout))??;
        let containers: Vec<ContainerSummary> = serde_json::from_str(&body)?;

        // The runtime prefixes names with a slash.
        let wanted = format!("/{}", proxy_container_name(project));
        for container in containers {
            if !container.names.iter().any(|name| name == &wanted) {
                continue;
            }
            let published = container
                .ports
                .iter()
                .find(|p| p.private_port == PROXY_QUERY_PORT)
                .and_then(|p| p.public_port);
            if let Some(port) = published {
                return Ok(Some(ProxyAddress {
                    host: "127.0.0.1".to_string(),
                    port,
                }));
            }
        }
        Ok(None)
    }
}

#[async_trait]
impl ProxyLocator for DockerProxyLocator {
    async fn locate(
        &self,
        model: &ComposeModel,
        socket: &ForwardedSocket,
    ) -> Result<ProxyAddress, LocateError> {
        for attempt in 1..=self.options.attempts {
            if let Some(address) = self.query_published_port(&model.name, socket).await? {
                debug!(
                    "proxy for {} reachable at {} (attempt {})",
                    model.name, address, attempt
                );
                return Ok(address);
            }
            if attempt < self.options.attempts {
                tokio::time::sleep(self.options.delay).await;
            }
        }
        Err(LocateError::ProxyUnavailable {
            project: model.name.clone(),
            attempts: self.options.attempts,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prevu_compose::proxy_service_model;
    use std::path::PathBuf;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::UnixListener;

    fn fast_options(attempts: u32) -> LocateOptions {
        LocateOptions {
            attempts,
            delay: Duration::from_millis(5),
            request_timeout: Duration::from_secs(5),
        }
    }

    /// Serves the same container-listing body for every connection.
    fn serve_listing(path: &PathBuf, body: &'static str) {
        let listener = UnixListener::bind(path).unwrap();
        tokio::spawn(async move {
            loop {
                let Ok((mut stream, _)) = listener.accept().await else {
                    break;
                };
                tokio::spawn(async move {
                    let mut buf = vec![0u8; 1024];
                    let _ = stream.read(&mut buf).await;
                    let response = format!(
                        "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                        body.len(),
                        body
                    );
                    let _ = stream.write_all(response.as_bytes()).await;
                });
            }
        });
    }

    #[tokio::test]
    async fn finds_published_port_of_the_proxy_unit() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("runtime.sock");
        serve_listing(
            &path,
            r#"[
                {"Names":["/other-service"],"Ports":[{"PrivatePort":80,"PublicPort":32000,"Type":"tcp"}]},
                {"Names":["/acme-runtime-proxy"],"Ports":[{"PrivatePort":3000,"PublicPort":32768,"Type":"tcp"}]}
            ]"#,
        );

        let locator = DockerProxyLocator::new().with_options(fast_options(3));
        let socket = ForwardedSocket::new(path);
        let address = locator
            .locate(&proxy_service_model("acme"), &socket)
            .await
            .unwrap();

        assert_eq!(
            address,
            ProxyAddress {
                host: "127.0.0.1".to_string(),
                port: 32768,
            }
        );
    }

    #[tokio::test]
    async fn reports_unavailable_after_the_attempt_ceiling() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("runtime.sock");
        serve_listing(&path, "[]");

        let locator = DockerProxyLocator::new().with_options(fast_options(2));
        let socket = ForwardedSocket::new(path);
        let err = locator
            .locate(&proxy_service_model("acme"), &socket)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            LocateError::ProxyUnavailable {
                ref project,
                attempts: 2,
            } if project == "acme"
        ));
    }

    #[tokio::test]
    async fn proxy_without_published_port_is_not_located() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("runtime.sock");
        serve_listing(
            &path,
            r#"[{"Names":["/acme-runtime-proxy"],"Ports":[{"PrivatePort":3000,"Type":"tcp"}]}]"#,
        );

        let locator = DockerProxyLocator::new().with_options(fast_options(1));
        let socket = ForwardedSocket::new(path);
        let err = locator
            .locate(&proxy_service_model("acme"), &socket)
            .await
            .unwrap_err();

        assert!(matches!(err, LocateError::ProxyUnavailable { .. }));
    }

    #[tokio::test]
    async fn silent_runtime_fails_the_pass_instead_of_hanging() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("runtime.sock");

        // Accepts and reads the request, then never answers.
        let listener = UnixListener::bind(&path).unwrap();
        tokio::spawn(async move {
            while let Ok((mut stream, _)) = listener.accept().await {
                tokio::spawn(async move {
                    let mut buf = vec![0u8; 1024];
                    let _ = stream.read(&mut buf).await;
                    std::future::pending::<()>().await;
                });
            }
        });

        let locator = DockerProxyLocator::new().with_options(LocateOptions {
            attempts: 1,
            delay: Duration::from_millis(5),
            request_timeout: Duration::from_millis(50),
        });
        let socket = ForwardedSocket::new(path);
        let err = locator
            .locate(&proxy_service_model("acme"), &socket)
            .await
            .unwrap_err();

        assert!(matches!(err, LocateError::Timeout(_)));
    }

    #[tokio::test]
    async fn garbage_listing_is_a_distinct_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("runtime.sock");
        serve_listing(&path, "not json");

        let locator = DockerProxyLocator::new().with_options(fast_options(3));
        let socket = ForwardedSocket::new(path);
        let err = locator
            .locate(&proxy_service_model("acme"), &socket)
            .await
            .unwrap_err();

        assert!(matches!(err, LocateError::Listing(_)));
    }
}
