//! Persistent line-protocol connection to an UltraStar Deluxe controller:
//! framing, reconnection, event dispatch, command pacing, and a small
//! player model on top.

pub mod command;
pub mod connection;
pub mod dispatch;
pub mod framing;
pub mod gateway;
pub mod platform;
pub mod player;
pub mod reconnection;
pub mod registry;
pub mod transport;

pub use command::{Command, EventKind, UnknownEvent};
pub use connection::{Connection, ConnectionConfig, ConnectionState, ConnectionStateWatch};
pub use dispatch::{
    DispatchOutcome, Event, EventDispatcher, EventHandler, MalformedMessage, parse_event,
};
pub use framing::{LineConfig, LineError, read_line, write_line};
pub use platform::SocketConfig;
pub use player::{MediaPlayer, PlaybackState, PlayerStatus};
pub use reconnection::{ReconnectConfig, ReconnectSupervisor};
pub use registry::{ConnectionRegistry, RegistryError};
pub use transport::{Connector, Endpoint, LineReader, LineWriter, TcpConnector, Transport};
