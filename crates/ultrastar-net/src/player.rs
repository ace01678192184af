//! Media player view of a controller connection.
//!
//! [`MediaPlayer`] turns the controller's events into a [`PlayerStatus`]
//! snapshot that is published on a [`watch`] channel, and offers typed
//! transport controls. Controls update the snapshot optimistically; the next
//! `get_state` event from the controller wins.

use tokio::sync::watch;

use crate::command::{Command, EventKind};
use crate::connection::Connection;
use crate::transport::{Connector, TcpConnector};

/// Volume change applied by `volume_up` / `volume_down`.
pub const VOLUME_STEP: f32 = 0.1;

/// Playback state as reported by `get_state`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlaybackState {
    Playing,
    Paused,
    #[default]
    Idle,
}

impl PlaybackState {
    /// Map a `get_state` payload. Unrecognised values fall back to idle.
    pub fn from_payload(payload: &str) -> Self {
        match payload {
            "playing" => Self::Playing,
            "paused" => Self::Paused,
            "stop" => Self::Idle,
            other => {
                tracing::warn!("Unknown state received: {other}");
                Self::Idle
            }
        }
    }
}

/// Latest known controller status.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerStatus {
    pub playback: PlaybackState,
    /// Volume level, 0.0 to 1.0. Local estimate; the controller does not report it.
    pub volume: f32,
    pub version: Option<String>,
    pub current_song: Option<String>,
    pub lyric_line: Option<String>,
    pub points: Option<String>,
    pub rating: Option<String>,
}

impl Default for PlayerStatus {
    fn default() -> Self {
        Self {
            playback: PlaybackState::Idle,
            volume: 0.5,
            version: None,
            current_song: None,
            lyric_line: None,
            points: None,
            rating: None,
        }
    }
}

impl PlayerStatus {
    /// Fold one event into the snapshot.
    pub fn apply(&mut self, kind: EventKind, payload: String) {
        match kind {
            EventKind::State => self.playback = PlaybackState::from_payload(&payload),
            EventKind::CurrentSong => self.current_song = Some(payload),
            EventKind::LyricLine => self.lyric_line = Some(payload),
            EventKind::Points => self.points = Some(payload),
            EventKind::Rating => self.rating = Some(payload),
            EventKind::Version => self.version = Some(payload),
        }
    }
}

/// Typed controls plus an observable status for one connection.
pub struct MediaPlayer<C: Connector = TcpConnector> {
    connection: Connection<C>,
    status: watch::Sender<PlayerStatus>,
}

impl<C: Connector> MediaPlayer<C> {
    /// Wrap `connection` and subscribe to every known event.
    pub fn attach(connection: Connection<C>) -> Self {
        let status = watch::Sender::new(PlayerStatus::default());
        for kind in EventKind::ALL {
            let status = status.clone();
            connection.register_event_listener(kind, move |payload| {
                status.send_modify(|s| s.apply(kind, payload));
                async {}
            });
        }
        Self { connection, status }
    }

    /// The underlying connection.
    pub fn connection(&self) -> &Connection<C> {
        &self.connection
    }

    /// Current snapshot.
    pub fn status(&self) -> PlayerStatus {
        self.status.borrow().clone()
    }

    /// Receiver notified on every status change.
    pub fn subscribe(&self) -> watch::Receiver<PlayerStatus> {
        self.status.subscribe()
    }

    pub async fn play(&self) {
        self.connection.send(Command::Play).await;
        self.set_playback(PlaybackState::Playing);
    }

    pub async fn pause(&self) {
        self.connection.send(Command::Pause).await;
        self.set_playback(PlaybackState::Paused);
    }

    pub async fn stop(&self) {
        self.connection.send(Command::Stop).await;
        self.set_playback(PlaybackState::Idle);
    }

    pub async fn next(&self) {
        self.connection.send(Command::Next).await;
    }

    pub async fn previous(&self) {
        self.connection.send(Command::Previous).await;
    }

    /// Set an absolute volume level between 0.0 and 1.0.
    pub async fn set_volume_level(&self, level: f32) {
        let level = if level.is_nan() { 0.0 } else { level.clamp(0.0, 1.0) };
        self.status.send_modify(|s| s.volume = level);
        self.connection.send(Command::set_volume_level(level)).await;
    }

    pub async fn volume_up(&self) {
        self.connection.send(Command::VolumeUp).await;
        self.status
            .send_modify(|s| s.volume = (s.volume + VOLUME_STEP).min(1.0));
    }

    pub async fn volume_down(&self) {
        self.connection.send(Command::VolumeDown).await;
        self.status
            .send_modify(|s| s.volume = (s.volume - VOLUME_STEP).max(0.0));
    }

    /// Send a one-shot button command (`restart`, `shutdown`, `home`, ...).
    pub async fn press(&self, command: Command) {
        tracing::debug!("Sending {command} command to UltraStar Deluxe");
        self.connection.send(command).await;
    }

    /// Ask the controller to report every known event.
    pub async fn refresh(&self) {
        for kind in EventKind::ALL {
            self.connection.send(Command::Request(kind)).await;
        }
    }

    fn set_playback(&self, playback: PlaybackState) {
        self.status.send_modify(|s| s.playback = playback);
    }
}
