//! Typed vocabulary of the controller protocol.

use std::fmt;
use std::str::FromStr;

/// Highest value accepted by `set_volume`.
pub const MAX_VOLUME: u8 = 100;

/// Outbound command understood by the controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Play,
    Pause,
    Stop,
    Next,
    Previous,
    VolumeUp,
    VolumeDown,
    /// Absolute volume, 0 to 100.
    SetVolume(u8),
    Restart,
    Shutdown,
    Home,
    /// Ask the controller to emit the corresponding event.
    Request(EventKind),
    /// Anything not covered above, sent verbatim.
    Raw(String),
}

impl Command {
    /// `set_volume` with the value clamped to [`MAX_VOLUME`].
    pub fn set_volume(volume: u8) -> Self {
        Self::SetVolume(volume.min(MAX_VOLUME))
    }

    /// `set_volume` from a 0.0 to 1.0 level, truncating like the controller's
    /// own UI does.
    pub fn set_volume_level(level: f32) -> Self {
        let clamped = if level.is_nan() { 0.0 } else { level.clamp(0.0, 1.0) };
        Self::SetVolume((clamped * f32::from(MAX_VOLUME)) as u8)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Play => f.write_str("play"),
            Self::Pause => f.write_str("pause"),
            Self::Stop => f.write_str("stop"),
            Self::Next => f.write_str("next"),
            Self::Previous => f.write_str("previous"),
            Self::VolumeUp => f.write_str("volume_up"),
            Self::VolumeDown => f.write_str("volume_down"),
            Self::SetVolume(v) => write!(f, "set_volume {v}"),
            Self::Restart => f.write_str("restart"),
            Self::Shutdown => f.write_str("shutdown"),
            Self::Home => f.write_str("home"),
            Self::Request(kind) => f.write_str(kind.as_str()),
            Self::Raw(text) => f.write_str(text),
        }
    }
}

impl FromStr for Command {
    type Err = std::convert::Infallible;

    /// Parse wire text. Unknown or malformed text becomes [`Command::Raw`].
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let cmd = match s {
            "play" => Self::Play,
            "pause" => Self::Pause,
            "stop" => Self::Stop,
            "next" => Self::Next,
            "previous" => Self::Previous,
            "volume_up" => Self::VolumeUp,
            "volume_down" => Self::VolumeDown,
            "restart" => Self::Restart,
            "shutdown" => Self::Shutdown,
            "home" => Self::Home,
            _ => {
                if let Ok(kind) = s.parse::<EventKind>() {
                    Self::Request(kind)
                } else if let Some(v) = s
                    .strip_prefix("set_volume ")
                    .and_then(|v| v.trim().parse::<u8>().ok())
                    .filter(|v| *v <= MAX_VOLUME)
                {
                    Self::SetVolume(v)
                } else {
                    Self::Raw(s.to_string())
                }
            }
        };
        Ok(cmd)
    }
}

/// Event names the controller emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// Playback state: `playing`, `paused` or `stop`.
    State,
    CurrentSong,
    LyricLine,
    Points,
    Rating,
    Version,
}

impl EventKind {
    /// All known events.
    pub const ALL: [Self; 6] = [
        Self::State,
        Self::CurrentSong,
        Self::LyricLine,
        Self::Points,
        Self::Rating,
        Self::Version,
    ];

    /// Name used on the wire, both as event prefix and as request command.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::State => "get_state",
            Self::CurrentSong => "current_song",
            Self::LyricLine => "lyric_line",
            Self::Points => "points",
            Self::Rating => "rating",
            Self::Version => "get_version",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<EventKind> for String {
    fn from(kind: EventKind) -> Self {
        kind.as_str().to_string()
    }
}

/// Returned when text is not a known event name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown event name: {0}")]
pub struct UnknownEvent(pub String);

impl FromStr for EventKind {
    type Err = UnknownEvent;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| UnknownEvent(s.to_string()))
    }
}
