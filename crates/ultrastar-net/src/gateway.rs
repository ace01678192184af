//! Outbound command path and the mutex-guarded link slot.
//!
//! [`Link`] is the state protected by the connection mutex: the write half
//! of the live transport, a generation counter identifying it, and the
//! shutdown signal of the listener reading its other half. Holding the mutex
//! while writing and pacing serializes commands from every caller.

use std::time::Duration;

use tokio::sync::watch;

use crate::framing::LineError;
use crate::transport::LineWriter;

/// Transport slot guarded by the connection mutex.
#[derive(Default)]
pub struct Link {
    writer: Option<LineWriter>,
    generation: u64,
    listener_shutdown: Option<watch::Sender<bool>>,
}

impl Link {
    /// Whether a usable transport is installed.
    pub fn is_live(&self) -> bool {
        self.writer.as_ref().is_some_and(|w| !w.is_closed())
    }

    /// Generation of the current (or most recent) transport. Starts at 0
    /// and increases with every installed or retired transport.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Install a freshly opened transport and return its generation.
    ///
    /// The caller must have torn down the previous one.
    pub fn install(&mut self, writer: LineWriter, listener_shutdown: watch::Sender<bool>) -> u64 {
        debug_assert!(self.writer.is_none(), "previous transport still installed");
        self.generation += 1;
        self.writer = Some(writer);
        self.listener_shutdown = Some(listener_shutdown);
        self.generation
    }

    /// Signal the listener to stop, close the write side and clear the slot.
    ///
    /// Safe to call when nothing is installed.
    pub async fn teardown(&mut self) {
        if let Some(shutdown) = self.listener_shutdown.take() {
            let _ = shutdown.send(true);
        }
        if let Some(mut writer) = self.writer.take() {
            if let Err(e) = writer.close().await {
                tracing::debug!("Error while closing transport: {e}");
            }
        }
    }

    /// Tear down and advance the generation, so failure reports still in
    /// flight for the old transport are recognised as stale.
    pub async fn retire(&mut self) {
        self.teardown().await;
        self.generation += 1;
    }

    /// Write one command line, then hold for `pacing` so the controller has
    /// time to process it before the next caller gets the lock.
    pub async fn write_command(&mut self, command: &str, pacing: Duration) -> Result<(), LineError> {
        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| LineError::Io(std::io::ErrorKind::NotConnected.into()))?;
        writer.send_line(command).await?;
        tracing::info!("Command '{command}' sent successfully");
        tokio::time::sleep(pacing).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::framing::LineConfig;
    use crate::transport::Transport;
    use tokio::io::{AsyncReadExt, duplex};

    fn link_over_duplex() -> (Link, tokio::io::DuplexStream, watch::Receiver<bool>) {
        let (local, remote) = duplex(1024);
        let (read_half, write_half) = tokio::io::split(local);
        let (_reader, writer) =
            Transport::new(read_half, write_half).into_lines(LineConfig::default());
        let (tx, rx) = watch::channel(false);
        let mut link = Link::default();
        link.install(writer, tx);
        (link, remote, rx)
    }

    #[test]
    fn test_empty_link_is_not_live() {
        let link = Link::default();
        assert!(!link.is_live());
        assert_eq!(link.generation(), 0);
    }

    #[tokio::test]
    async fn test_install_bumps_generation() {
        let (link, _remote, _rx) = link_over_duplex();
        assert!(link.is_live());
        assert_eq!(link.generation(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_write_command_paces() {
        let (mut link, mut remote, _rx) = link_over_duplex();

        let start = tokio::time::Instant::now();
        link.write_command("play", Duration::from_millis(100))
            .await
            .unwrap();
        assert!(start.elapsed() >= Duration::from_millis(100));

        let mut buf = [0u8; 5];
        remote.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"play\n");
    }

    #[tokio::test]
    async fn test_teardown_signals_listener_and_clears() {
        let (mut link, _remote, rx) = link_over_duplex();

        link.teardown().await;

        assert!(!link.is_live());
        assert!(*rx.borrow(), "Listener should be told to stop");
        assert_eq!(link.generation(), 1, "Generation survives teardown");
        // Second teardown is a no-op.
        link.teardown().await;
    }

    #[tokio::test]
    async fn test_retire_advances_generation() {
        let (mut link, _remote, rx) = link_over_duplex();

        link.retire().await;

        assert!(!link.is_live());
        assert!(*rx.borrow());
        assert_eq!(link.generation(), 2);
    }

    #[tokio::test]
    async fn test_write_without_transport_fails() {
        let mut link = Link::default();
        let result = link.write_command("play", Duration::ZERO).await;
        assert!(result.unwrap_err().is_connection_loss());
    }
}
