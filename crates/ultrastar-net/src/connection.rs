//! Self-healing line connection to an UltraStar Deluxe controller.
//!
//! A [`Connection`] multiplexes fire-and-forget commands and asynchronous
//! events over one TCP stream. It reconnects on its own after any transport
//! failure and never reports errors to its callers; failures are logged and
//! absorbed. State changes are broadcast via a [`watch`] channel so any number
//! of consumers can react without polling.
//!
//! Locking contract: the link mutex covers opening a transport, writing a
//! command, and the pacing delay after it. Event handlers run on the listener
//! task without that mutex held, so a handler may call
//! [`send_command`](Connection::send_command) on the same connection.

use std::fmt;
use std::future::Future;
use std::io;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, watch};

use crate::command::Command;
use crate::dispatch::{EventDispatcher, handler};
use crate::framing::{LineConfig, LineError};
use crate::gateway::Link;
use crate::reconnection::{ReconnectConfig, ReconnectSupervisor};
use crate::transport::{Connector, Endpoint, LineReader, TcpConnector};

/// Connection lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Never connected, closed, or stopped after an unexpected error.
    Idle,
    /// Opening a transport.
    Connecting,
    /// Transport open and listener running.
    Connected,
    /// Waiting out the reconnect delay after a failure.
    Reconnecting,
}

/// Observable connection state backed by a [`watch`] channel.
pub struct ConnectionStateWatch {
    tx: watch::Sender<ConnectionState>,
    rx: watch::Receiver<ConnectionState>,
}

impl Default for ConnectionStateWatch {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionStateWatch {
    /// Create a new watch initialized to [`ConnectionState::Idle`].
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(ConnectionState::Idle);
        Self { tx, rx }
    }

    /// Set the current connection state, notifying all subscribers.
    pub fn set(&self, state: ConnectionState) {
        self.tx.send_if_modified(|current| {
            let changed = *current != state;
            *current = state;
            changed
        });
    }

    /// Return a new subscriber receiver.
    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.rx.clone()
    }

    /// Return the current state without blocking.
    pub fn current(&self) -> ConnectionState {
        *self.rx.borrow()
    }
}

/// Tunables for a [`Connection`].
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Reconnect scheduling.
    pub reconnect: ReconnectConfig,
    /// Hold time after each command before the next one may be written. Default: 100 ms.
    pub pacing_delay: Duration,
    /// Inbound line limits.
    pub line: LineConfig,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            reconnect: ReconnectConfig::default(),
            pacing_delay: Duration::from_millis(100),
            line: LineConfig::default(),
        }
    }
}

/// Handle to a controller connection. Cheap to clone; clones share state.
pub struct Connection<C: Connector = TcpConnector> {
    shared: Arc<Shared<C>>,
}

impl<C: Connector> Clone for Connection<C> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

struct Shared<C> {
    endpoint: Endpoint,
    connector: C,
    config: ConnectionConfig,
    link: Mutex<Link>,
    events: EventDispatcher,
    reconnect: ReconnectSupervisor,
    state: ConnectionStateWatch,
}

impl Connection<TcpConnector> {
    /// Create an unconnected TCP connection with default settings.
    pub fn new(endpoint: Endpoint) -> Self {
        Self::with_config(endpoint, ConnectionConfig::default())
    }

    /// Create an unconnected TCP connection.
    pub fn with_config(endpoint: Endpoint, config: ConnectionConfig) -> Self {
        Self::with_connector(endpoint, TcpConnector::default(), config)
    }
}

impl<C: Connector> Connection<C> {
    /// Create an unconnected connection that opens transports via `connector`.
    pub fn with_connector(endpoint: Endpoint, connector: C, config: ConnectionConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                endpoint,
                connector,
                config,
                link: Mutex::new(Link::default()),
                events: EventDispatcher::new(),
                reconnect: ReconnectSupervisor::new(),
                state: ConnectionStateWatch::new(),
            }),
        }
    }

    /// The remote endpoint.
    pub fn endpoint(&self) -> &Endpoint {
        &self.shared.endpoint
    }

    /// Observable lifecycle state.
    pub fn state(&self) -> &ConnectionStateWatch {
        &self.shared.state
    }

    /// Open the transport and start listening, unless already connected.
    ///
    /// On failure a reconnect is scheduled; the error is not returned.
    pub async fn connect(&self) {
        let shared = &self.shared;
        let mut link = shared.link.lock().await;
        if Shared::open_locked(shared, &mut link).await.is_err() {
            Shared::schedule_reconnect(shared, link.generation());
        }
    }

    /// Send one command line, connecting first if needed.
    ///
    /// The command is dropped (and logged) if no transport can be opened or
    /// the write fails. A failed write schedules a reconnect.
    pub async fn send_command(&self, command: &str) {
        let shared = &self.shared;
        let mut link = shared.link.lock().await;

        if Shared::open_locked(shared, &mut link).await.is_err() {
            Shared::schedule_reconnect(shared, link.generation());
            tracing::warn!("Not connected to {}, dropping command '{command}'", shared.endpoint);
            return;
        }

        match link.write_command(command, shared.config.pacing_delay).await {
            Ok(()) => {}
            Err(e @ LineError::EmbeddedNewline) => {
                tracing::error!("Refusing to send command {command:?}: {e}");
            }
            Err(e) => {
                tracing::error!("Error sending command '{command}': {e}");
                // A loop that is already pending must find the link dead.
                link.teardown().await;
                shared.state.set(ConnectionState::Reconnecting);
                Shared::schedule_reconnect(shared, link.generation());
            }
        }
    }

    /// Typed variant of [`send_command`](Self::send_command).
    pub async fn send(&self, command: Command) {
        self.send_command(&command.to_string()).await;
    }

    /// Register an async handler for `event`. Handlers for the same event
    /// run in registration order. May be called before [`connect`](Self::connect).
    pub fn register_event_listener<F, Fut>(&self, event: impl Into<String>, f: F)
    where
        F: Fn(String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.shared.events.register(event, handler(f));
    }

    /// Cancel any pending reconnect, close the transport and stop the listener.
    ///
    /// A later [`connect`](Self::connect) or [`send_command`](Self::send_command)
    /// opens a fresh transport.
    pub async fn close(&self) {
        let shared = &self.shared;
        shared.reconnect.cancel().await;
        shared.link.lock().await.retire().await;
        // A listener that saw its transport fail just before the retire may
        // have scheduled a loop since; that loop must not outlive close.
        shared.reconnect.cancel().await;
        shared.state.set(ConnectionState::Idle);
        tracing::info!("Closed connection to {}", shared.endpoint);
    }
}

impl<C: Connector> fmt::Debug for Connection<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("endpoint", &self.shared.endpoint)
            .field("state", &self.shared.state.current())
            .field("events", &self.shared.events)
            .finish_non_exhaustive()
    }
}

impl<C: Connector> Shared<C> {
    /// Open a transport unless one is live. The caller holds the link lock,
    /// so concurrent callers wait for this attempt instead of starting another.
    async fn open_locked(shared: &Arc<Self>, link: &mut Link) -> io::Result<()> {
        if link.is_live() {
            return Ok(());
        }
        link.teardown().await;
        shared.state.set(ConnectionState::Connecting);

        match shared.connector.open(&shared.endpoint).await {
            Ok(transport) => {
                let (reader, writer) = transport.into_lines(shared.config.line.clone());
                let (shutdown_tx, shutdown_rx) = watch::channel(false);
                let generation = link.install(writer, shutdown_tx);
                shared.state.set(ConnectionState::Connected);
                tracing::info!("Connected to UltraStar Deluxe at {}", shared.endpoint);
                tokio::spawn(Self::listen(
                    Arc::clone(shared),
                    reader,
                    shutdown_rx,
                    generation,
                ));
                Ok(())
            }
            Err(e) => {
                tracing::error!("Failed to connect to UltraStar Deluxe at {}: {e}", shared.endpoint);
                shared.state.set(ConnectionState::Reconnecting);
                Err(e)
            }
        }
    }

    /// Start the reconnect loop unless one is already pending.
    fn schedule_reconnect(shared: &Arc<Self>, failed_generation: u64) {
        shared
            .reconnect
            .schedule(Self::reconnect_loop(Arc::clone(shared), failed_generation));
    }

    /// Tear down the failed transport, then retry every `delay` until connected.
    ///
    /// A report for an older generation is stale: the transport was already
    /// replaced, closed, or retired after an unexpected error.
    async fn reconnect_loop(shared: Arc<Self>, failed_generation: u64) {
        {
            let mut link = shared.link.lock().await;
            if link.generation() != failed_generation {
                tracing::debug!("Stale failure report for generation {failed_generation}, ignoring");
                return;
            }
            link.teardown().await;
            shared.state.set(ConnectionState::Reconnecting);
        }

        let delay = shared.config.reconnect.delay;
        let mut attempt: u64 = 0;
        loop {
            attempt += 1;
            tracing::info!(
                "Reconnection attempt {attempt} to {} in {delay:?}",
                shared.endpoint
            );
            tokio::time::sleep(delay).await;

            let mut link = shared.link.lock().await;
            match Self::open_locked(&shared, &mut link).await {
                Ok(()) => {
                    tracing::info!("Reconnected after {attempt} attempts");
                    return;
                }
                Err(e) => {
                    tracing::warn!("Reconnection attempt {attempt} failed: {e}");
                }
            }
        }
    }

    /// Read lines until the transport ends, dispatching each as an event.
    async fn listen(
        shared: Arc<Self>,
        mut reader: LineReader,
        mut shutdown: watch::Receiver<bool>,
        generation: u64,
    ) {
        loop {
            let result = tokio::select! {
                biased;
                _ = shutdown.changed() => break,
                result = reader.next_line() => result,
            };
            if *shutdown.borrow() {
                break;
            }

            match result {
                Ok(Some(line)) => {
                    tracing::debug!("Received message: {line}");
                    shared.events.dispatch(&line).await;
                }
                Ok(None) => {
                    tracing::warn!("Controller at {} closed the connection", shared.endpoint);
                    Self::connection_lost(&shared, generation).await;
                    break;
                }
                Err(e) if e.is_connection_loss() => {
                    tracing::warn!("Lost connection to {}: {e}", shared.endpoint);
                    Self::connection_lost(&shared, generation).await;
                    break;
                }
                Err(e) => {
                    tracing::error!("Unexpected error while listening for events: {e}");
                    Self::go_dormant(&shared, generation).await;
                    break;
                }
            }
        }
        tracing::debug!("Listener for generation {generation} stopped");
    }

    /// Tear down the dead transport, then schedule a reconnect.
    ///
    /// The teardown happens here rather than in the reconnect loop: a loop
    /// started for an earlier generation may still be waiting out its delay,
    /// and it only reopens when it finds the link dead.
    async fn connection_lost(shared: &Arc<Self>, generation: u64) {
        let mut link = shared.link.lock().await;
        if link.generation() != generation {
            return;
        }
        link.teardown().await;
        shared.state.set(ConnectionState::Reconnecting);
        Self::schedule_reconnect(shared, generation);
    }

    /// Drop the transport without scheduling a reconnect. The next
    /// `connect` or `send_command` starts over.
    async fn go_dormant(shared: &Arc<Self>, generation: u64) {
        let mut link = shared.link.lock().await;
        if link.generation() == generation {
            link.retire().await;
            shared.state.set(ConnectionState::Idle);
        }
    }
}
