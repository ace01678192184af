//! Byte-stream transport to a controller and its line reader/writer halves.
//!
//! A [`Connector`] opens a [`Transport`] for an [`Endpoint`]. The transport is
//! immediately split: the [`LineReader`] moves into the listener task, while
//! the [`LineWriter`] stays with the connection behind its mutex.

use std::fmt;
use std::future::Future;
use std::io;

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

use crate::framing::{LineConfig, LineError, read_line, write_line};
use crate::platform::{SocketConfig, configure_stream};

type BoxedRead = Box<dyn AsyncRead + Send + Unpin>;
type BoxedWrite = Box<dyn AsyncWrite + Send + Unpin>;

/// Host and port of a remote controller.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    /// Hostname or IP address.
    pub host: String,
    /// TCP port.
    pub port: u16,
}

impl Endpoint {
    /// Create an endpoint from a host and port.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Opens transports. Implementations must not retry internally.
pub trait Connector: Send + Sync + 'static {
    /// Open a new stream to `endpoint`.
    fn open(&self, endpoint: &Endpoint) -> impl Future<Output = io::Result<Transport>> + Send;
}

/// TCP connector applying [`SocketConfig`] to every stream it opens.
#[derive(Debug, Clone, Default)]
pub struct TcpConnector {
    socket: SocketConfig,
}

impl TcpConnector {
    /// Connector with custom socket options.
    pub fn new(socket: SocketConfig) -> Self {
        Self { socket }
    }
}

impl Connector for TcpConnector {
    async fn open(&self, endpoint: &Endpoint) -> io::Result<Transport> {
        let stream = TcpStream::connect((endpoint.host.as_str(), endpoint.port)).await?;
        configure_stream(&stream, &self.socket)?;
        let (reader, writer) = stream.into_split();
        Ok(Transport::new(reader, writer))
    }
}

/// An open bidirectional stream, not yet split.
pub struct Transport {
    reader: BoxedRead,
    writer: BoxedWrite,
}

impl Transport {
    /// Wrap an arbitrary reader/writer pair.
    pub fn new(
        reader: impl AsyncRead + Send + Unpin + 'static,
        writer: impl AsyncWrite + Send + Unpin + 'static,
    ) -> Self {
        Self {
            reader: Box::new(reader),
            writer: Box::new(writer),
        }
    }

    /// Split into a line reader and a line writer.
    pub fn into_lines(self, config: LineConfig) -> (LineReader, LineWriter) {
        (
            LineReader {
                inner: BufReader::new(self.reader),
                config,
            },
            LineWriter {
                inner: Some(self.writer),
            },
        )
    }
}

impl fmt::Debug for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transport").finish_non_exhaustive()
    }
}

/// Read half of a transport, yielding one line at a time.
pub struct LineReader {
    inner: BufReader<BoxedRead>,
    config: LineConfig,
}

impl LineReader {
    /// Wait for the next line. `Ok(None)` means the peer closed the stream.
    pub async fn next_line(&mut self) -> Result<Option<String>, LineError> {
        read_line(&mut self.inner, &self.config).await
    }
}

/// Write half of a transport.
pub struct LineWriter {
    inner: Option<BoxedWrite>,
}

impl LineWriter {
    /// Write one line and flush it.
    pub async fn send_line(&mut self, text: &str) -> Result<(), LineError> {
        match self.inner.as_mut() {
            Some(w) => write_line(w, text).await,
            None => Err(LineError::Io(io::Error::from(io::ErrorKind::NotConnected))),
        }
    }

    /// Whether [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.inner.is_none()
    }

    /// Shut down the write side and release it. Closing twice is a no-op.
    pub async fn close(&mut self) -> io::Result<()> {
        match self.inner.take() {
            Some(mut w) => w.shutdown().await,
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, duplex};
    use tokio::net::TcpListener;

    #[test]
    fn test_endpoint_display() {
        let endpoint = Endpoint::new("192.168.1.20", 4444);
        assert_eq!(endpoint.to_string(), "192.168.1.20:4444");
    }

    #[tokio::test]
    async fn test_tcp_connector_opens_stream() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let accept = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buf = Vec::new();
            stream.read_to_end(&mut buf).await.unwrap();
            buf
        });

        let transport = TcpConnector::default()
            .open(&Endpoint::new("127.0.0.1", port))
            .await
            .unwrap();
        let (_reader, mut writer) = transport.into_lines(LineConfig::default());
        writer.send_line("play").await.unwrap();
        writer.close().await.unwrap();

        assert_eq!(accept.await.unwrap(), b"play\n");
    }

    #[tokio::test]
    async fn test_tcp_connector_refused() {
        // Bind then drop to obtain a port with nothing listening.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let result = TcpConnector::default().open(&Endpoint::new("127.0.0.1", port)).await;
        assert!(result.is_err(), "Connecting to a closed port should fail");
    }

    #[tokio::test]
    async fn test_reader_yields_lines_then_end() {
        let (local, mut remote) = duplex(1024);
        let (read_half, write_half) = tokio::io::split(local);
        let (mut reader, _writer) =
            Transport::new(read_half, write_half).into_lines(LineConfig::default());

        remote.write_all(b"points:9000\n").await.unwrap();
        drop(remote);

        assert_eq!(
            reader.next_line().await.unwrap().as_deref(),
            Some("points:9000")
        );
        assert!(reader.next_line().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_writer_close_is_idempotent() {
        let (local, _remote) = duplex(1024);
        let (read_half, write_half) = tokio::io::split(local);
        let (_reader, mut writer) =
            Transport::new(read_half, write_half).into_lines(LineConfig::default());

        assert!(!writer.is_closed());
        writer.close().await.unwrap();
        assert!(writer.is_closed());
        writer.close().await.unwrap();

        let result = writer.send_line("play").await;
        assert!(
            result.unwrap_err().is_connection_loss(),
            "Writing to a closed writer should look like a lost connection"
        );
    }
}
