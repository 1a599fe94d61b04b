//! Minimal HTTP/1.1 GET over an established byte stream
//!
//! The proxy query endpoint and the runtime's control socket both speak
//! plain HTTP/1.1 over streams we already hold (an SSH channel or a local
//! unix socket), so a full HTTP client stack would buy nothing here.

use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};

#[derive(Debug, Error)]
pub enum HttpError {
    #[error("Request failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("Unexpected response status: {0}")]
    Status(String),
    #[error("Response body is not valid utf-8: {0}")]
    Body(#[from] std::string::FromUtf8Error),
}

/// Sends one `GET` request over `stream` and returns the response body.
/// The exchange is single-shot (`Connection: close`).
pub async fn get<S>(stream: S, host: &str, path: &str) -> Result<String, HttpError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (read_half, mut write_half) = tokio::io::split(stream);

    let request = format!(
        "GET {} HTTP/1.1\r\nHost: {}\r\nConnection: close\r\nAccept: application/json\r\n\r\n",
        path, host
    );
    write_half.write_all(request.as_bytes()).await?;
    write_half.flush().await?;

    let mut reader = BufReader::new(read_half);

    let mut status_line = String::new();
    reader.read_line(&mut status_line).await?;
    if !status_line.starts_with("HTTP/1.1 200") && !status_line.starts_with("HTTP/1.0 200") {
        return Err(HttpError::Status(status_line.trim_end().to_string()));
    }

    let mut content_length: Option<usize> = None;
    loop {
        let mut line = String::new();
        let read = reader.read_line(&mut line).await?;
        if read == 0 || line == "\r\n" {
            break;
        }
        if line.to_lowercase().starts_with("content-length:") {
            if let Some(value) = line.split(':').nth(1) {
                content_length = value.trim().parse().ok();
            }
        }
    }

    let body = if let Some(len) = content_length {
        let mut buf = vec![0u8; len];
        reader.read_exact(&mut buf).await?;
        String::from_utf8(buf)?
    } else {
        let mut body = String::new();
        reader.read_to_string(&mut body).await?;
        body
    };

    Ok(body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    async fn serve(response: &'static str) -> tokio::io::DuplexStream {
        let (client, mut server) = tokio::io::duplex(4096);
        tokio::spawn(async move {
            let mut buf = vec![0u8; 1024];
            let _ = server.read(&mut buf).await;
            let _ = server.write_all(response.as_bytes()).await;
        });
        client
    }

    #[tokio::test]
    async fn reads_body_with_content_length() {
        let stream = serve("HTTP/1.1 200 OK\r\nContent-Length: 5\r\n\r\nhello").await;
        let body = get(stream, "localhost", "/tunnels").await.unwrap();
        assert_eq!(body, "hello");
    }

    #[tokio::test]
    async fn reads_body_until_eof_without_content_length() {
        let stream = serve("HTTP/1.1 200 OK\r\nConnection: close\r\n\r\nstreamed").await;
        let body = get(stream, "localhost", "/").await.unwrap();
        assert_eq!(body, "streamed");
    }

    #[tokio::test]
    async fn non_200_status_is_an_error() {
        let stream = serve("HTTP/1.1 500 Internal Server Error\r\n\r\n").await;
        let err = get(stream, "localhost", "/").await.unwrap_err();
        assert!(matches!(err, HttpError::Status(line) if line.contains("500")));
    }
}
