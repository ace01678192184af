//! Cross-platform TCP socket options for controller connections.
//!
//! Reads have no timeout, so a controller that vanishes without closing the
//! socket is only noticed through TCP keepalive. [`SocketConfig`] bundles the
//! options applied to every stream the [`TcpConnector`](crate::TcpConnector)
//! opens.

use std::time::Duration;

use socket2::{SockRef, TcpKeepalive};
use tokio::net::TcpStream;

/// TCP socket configuration applied to every connection.
#[derive(Debug, Clone, PartialEq)]
pub struct SocketConfig {
    /// Disable Nagle's algorithm so short command lines go out at once. Default: true.
    pub tcp_nodelay: bool,
    /// Enable TCP keepalive. Default: true.
    pub keepalive_enabled: bool,
    /// Idle time before the first keepalive probe. Default: 60s.
    pub keepalive_idle: Duration,
    /// Keepalive probe interval. Default: 10s.
    pub keepalive_interval: Duration,
    /// Number of unanswered probes before the connection is declared dead. Default: 3.
    pub keepalive_retries: u32,
}

impl Default for SocketConfig {
    fn default() -> Self {
        Self {
            tcp_nodelay: true,
            keepalive_enabled: true,
            keepalive_idle: Duration::from_secs(60),
            keepalive_interval: Duration::from_secs(10),
            keepalive_retries: 3,
        }
    }
}

/// Apply socket configuration to a connected [`TcpStream`].
pub fn configure_stream(stream: &TcpStream, config: &SocketConfig) -> std::io::Result<()> {
    stream.set_nodelay(config.tcp_nodelay)?;

    if config.keepalive_enabled {
        let sock_ref = SockRef::from(stream);
        let keepalive = TcpKeepalive::new()
            .with_time(config.keepalive_idle)
            .with_interval(config.keepalive_interval);

        // Retries are supported on Linux and Windows but not macOS.
        #[cfg(any(target_os = "linux", target_os = "windows"))]
        let keepalive = keepalive.with_retries(config.keepalive_retries);

        sock_ref.set_tcp_keepalive(&keepalive)?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    async fn connected_pair() -> (TcpStream, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).await.unwrap();
        let (server, _) = listener.accept().await.unwrap();
        (client, server)
    }

    #[tokio::test]
    async fn test_tcp_nodelay_is_set() {
        let (client, _server) = connected_pair().await;
        configure_stream(&client, &SocketConfig::default()).unwrap();
        assert!(client.nodelay().unwrap());
    }

    #[tokio::test]
    async fn test_keepalive_is_enabled() {
        let (client, _server) = connected_pair().await;
        configure_stream(&client, &SocketConfig::default()).unwrap();
        assert!(SockRef::from(&client).keepalive().unwrap());
    }

    #[tokio::test]
    async fn test_keepalive_can_be_disabled() {
        let (client, _server) = connected_pair().await;
        let config = SocketConfig {
            keepalive_enabled: false,
            tcp_nodelay: false,
            ..Default::default()
        };
        configure_stream(&client, &config).unwrap();
        assert!(!client.nodelay().unwrap());
        assert!(!SockRef::from(&client).keepalive().unwrap());
    }
}
