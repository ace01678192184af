//! Newline-delimited framing for the controller's text protocol.
//!
//! Every message on the wire is a single line of UTF-8 text:
//!
//! ```text
//! +---------------------------+------+
//! |   text (no '\n' inside)   | '\n' |
//! +---------------------------+------+
//! ```
//!
//! A trailing `\r` before the newline is tolerated on read and stripped along
//! with the newline. There is no length prefix, so the reader enforces a
//! configurable maximum line length instead.

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWriteExt};

/// Configuration for the framing layer.
#[derive(Debug, Clone)]
pub struct LineConfig {
    /// Maximum allowed line length in bytes, excluding the newline. Default: 64 KiB.
    pub max_line_len: usize,
}

impl Default for LineConfig {
    fn default() -> Self {
        Self {
            max_line_len: 65_536,
        }
    }
}

/// Errors that can occur during framing operations.
#[derive(Debug, thiserror::Error)]
pub enum LineError {
    /// The line exceeds the configured maximum.
    #[error("line length exceeds maximum {max}")]
    TooLong {
        /// The configured maximum.
        max: usize,
    },

    /// The peer closed the connection in the middle of a line.
    #[error("connection closed mid-line after {received} bytes")]
    Incomplete {
        /// Bytes received before the stream ended.
        received: usize,
    },

    /// The line is not valid UTF-8.
    #[error("line is not valid UTF-8: {0}")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),

    /// An outbound line contains an embedded line break.
    #[error("outbound line contains a line break")]
    EmbeddedNewline,

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl LineError {
    /// Whether this error means the connection itself is gone, as opposed to
    /// the peer sending something we cannot interpret.
    pub fn is_connection_loss(&self) -> bool {
        use std::io::ErrorKind;

        match self {
            Self::Incomplete { .. } => true,
            Self::Io(e) => matches!(
                e.kind(),
                ErrorKind::ConnectionReset
                    | ErrorKind::ConnectionAborted
                    | ErrorKind::BrokenPipe
                    | ErrorKind::UnexpectedEof
                    | ErrorKind::NotConnected
                    | ErrorKind::TimedOut
            ),
            Self::TooLong { .. } | Self::InvalidUtf8(_) | Self::EmbeddedNewline => false,
        }
    }
}

/// Read a single line from the stream.
///
/// Returns `Ok(None)` if the peer closed the connection cleanly before any
/// byte of a new line arrived. The returned text has its line terminator
/// removed but is otherwise untouched.
pub async fn read_line<R: AsyncBufRead + Unpin>(
    reader: &mut R,
    config: &LineConfig,
) -> Result<Option<String>, LineError> {
    let mut buf = Vec::new();
    // One extra byte for the newline, one more to detect overflow.
    let limit = config.max_line_len.saturating_add(2) as u64;
    let n = (&mut *reader)
        .take(limit)
        .read_until(b'\n', &mut buf)
        .await?;

    if n == 0 {
        return Ok(None);
    }

    if buf.last() != Some(&b'\n') {
        if buf.len() > config.max_line_len {
            return Err(LineError::TooLong {
                max: config.max_line_len,
            });
        }
        return Err(LineError::Incomplete { received: n });
    }

    buf.pop();
    if buf.last() == Some(&b'\r') {
        buf.pop();
    }
    if buf.len() > config.max_line_len {
        return Err(LineError::TooLong {
            max: config.max_line_len,
        });
    }

    Ok(Some(String::from_utf8(buf)?))
}

/// Write `text` followed by a newline and flush.
pub async fn write_line<W: AsyncWriteExt + Unpin>(
    writer: &mut W,
    text: &str,
) -> Result<(), LineError> {
    if text.contains(['\n', '\r']) {
        return Err(LineError::EmbeddedNewline);
    }

    let mut line = Vec::with_capacity(text.len() + 1);
    line.extend_from_slice(text.as_bytes());
    line.push(b'\n');

    writer.write_all(&line).await?;
    writer.flush().await?;

    Ok(())
}
