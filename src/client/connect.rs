//! Opening connections to the admin port.

use crate::config::ServerConfig;
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tracing::debug;

/// Supplies a connected transport for a configured server.
#[async_trait]
pub trait Connector {
    type Transport: AsyncRead + AsyncWrite + Unpin + Send;

    async fn connect(&self, server: &ServerConfig) -> Result<Self::Transport>;
}

/// Plain TCP connector with a bounded connect time.
#[derive(Debug, Clone, Default)]
pub struct TcpConnector;

#[async_trait]
impl Connector for TcpConnector {
    type Transport = TcpStream;

    async fn connect(&self, server: &ServerConfig) -> Result<TcpStream> {
        let host = server.hostname.as_str();
        let port = server.port;
        let timeout = Duration::from_secs(server.connect_timeout_secs);

        let stream = tokio::time::timeout(timeout, TcpStream::connect((host, port)))
            .await
            .map_err(|_| Error::ConnectTimeout {
                host: host.to_string(),
                port,
                timeout,
            })?
            .map_err(|source| Error::Connect {
                host: host.to_string(),
                port,
                source,
            })?;

        // Requests are single short lines.
        stream.set_nodelay(true).map_err(|source| Error::Connect {
            host: host.to_string(),
            port,
            source,
        })?;

        debug!(host, port, "connected to admin port");
        Ok(stream)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    fn server_config(port: u16) -> ServerConfig {
        ServerConfig {
            hostname: "127.0.0.1".to_string(),
            port,
            ..ServerConfig::default()
        }
    }

    #[tokio::test]
    async fn test_connect_to_listener() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let stream = TcpConnector.connect(&server_config(port)).await.unwrap();
        assert_eq!(stream.peer_addr().unwrap().port(), port);
    }

    #[tokio::test]
    async fn test_connect_refused_is_connect_failure() {
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().port()
        };
        let err = TcpConnector.connect(&server_config(port)).await.unwrap_err();
        assert!(err.is_connect_failure(), "unexpected error: {err}");
    }
}
