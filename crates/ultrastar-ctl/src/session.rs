//! Controllers opened by the binary, each with an optional status printer.
//!
//! Under `--follow` the set of controllers tracks `config.ron`: a reloaded
//! config is diffed against what is open, and only the entries that were
//! added, removed, or re-addressed are touched.

use std::collections::BTreeMap;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use ultrastar_config::ControllerConfig;
use ultrastar_net::{ConnectionRegistry, MediaPlayer, PlaybackState, PlayerStatus};

use crate::settings;

/// What has to change to go from one controller list to another.
#[derive(Debug, Default, PartialEq)]
pub struct ControllerChanges {
    /// Names to close. Includes re-addressed controllers.
    pub removed: Vec<String>,
    /// Controllers to open. Includes re-addressed controllers.
    pub added: Vec<ControllerConfig>,
}

impl ControllerChanges {
    pub fn is_empty(&self) -> bool {
        self.removed.is_empty() && self.added.is_empty()
    }
}

/// Compare by name; a changed host or port counts as remove plus add.
pub fn diff_controllers(
    current: &[ControllerConfig],
    wanted: &[ControllerConfig],
) -> ControllerChanges {
    let mut changes = ControllerChanges::default();
    for old in current {
        match wanted.iter().find(|c| c.name == old.name) {
            Some(new) if new == old => {}
            _ => changes.removed.push(old.name.clone()),
        }
    }
    for new in wanted {
        match current.iter().find(|c| c.name == new.name) {
            Some(old) if old == new => {}
            _ => changes.added.push(new.clone()),
        }
    }
    changes
}

struct Attached {
    controller: ControllerConfig,
    player: MediaPlayer,
    printer: Option<JoinHandle<()>>,
}

/// Open controllers keyed by name.
pub struct Session {
    registry: ConnectionRegistry,
    print: bool,
    open: BTreeMap<String, Attached>,
}

impl Session {
    /// `print` spawns a status printer for every controller opened later.
    pub fn new(registry: ConnectionRegistry, print: bool) -> Self {
        Self {
            registry,
            print,
            open: BTreeMap::new(),
        }
    }

    /// Connect `controller` and wrap it in a player.
    pub async fn open(&mut self, controller: &ControllerConfig) {
        let connection = match self
            .registry
            .setup(&controller.name, settings::endpoint(controller))
            .await
        {
            Ok(connection) => connection,
            Err(e) => {
                tracing::warn!("Skipping controller: {e}");
                return;
            }
        };
        let player = MediaPlayer::attach(connection);
        let printer = self
            .print
            .then(|| spawn_printer(controller.name.clone(), player.subscribe()));
        self.open.insert(
            controller.name.clone(),
            Attached {
                controller: controller.clone(),
                player,
                printer,
            },
        );
    }

    /// Close the controller called `name`, if open.
    pub async fn remove(&mut self, name: &str) {
        let Some(attached) = self.open.remove(name) else {
            return;
        };
        if let Some(printer) = attached.printer {
            printer.abort();
        }
        if let Err(e) = self.registry.unload(name).await {
            tracing::warn!("Could not unload controller: {e}");
        }
    }

    pub fn player(&self, name: &str) -> Option<&MediaPlayer> {
        self.open.get(name).map(|a| &a.player)
    }

    /// Configs of every open controller, in name order.
    pub fn controllers(&self) -> Vec<ControllerConfig> {
        self.open.values().map(|a| a.controller.clone()).collect()
    }

    /// Bring the open set in line with `wanted`. Newly opened controllers are
    /// asked for a full status report.
    pub async fn apply(&mut self, wanted: &[ControllerConfig]) -> ControllerChanges {
        let changes = diff_controllers(&self.controllers(), wanted);
        for name in &changes.removed {
            tracing::info!("Closing controller '{name}' after config change");
            self.remove(name).await;
        }
        for controller in &changes.added {
            tracing::info!("Opening controller '{}' after config change", controller.name);
            self.open(controller).await;
            if let Some(player) = self.player(&controller.name) {
                player.refresh().await;
            }
        }
        changes
    }

    /// Stop every printer and close every connection.
    pub async fn close(self) {
        for attached in self.open.into_values() {
            if let Some(printer) = attached.printer {
                printer.abort();
            }
        }
        self.registry.close_all().await;
    }
}

fn spawn_printer(name: String, mut status: watch::Receiver<PlayerStatus>) -> JoinHandle<()> {
    tokio::spawn(async move {
        while status.changed().await.is_ok() {
            let line = describe(&status.borrow_and_update());
            println!("[{name}] {line}");
        }
    })
}

/// One-line rendering of a status snapshot.
pub fn describe(status: &PlayerStatus) -> String {
    let playback = match status.playback {
        PlaybackState::Playing => "playing",
        PlaybackState::Paused => "paused",
        PlaybackState::Idle => "idle",
    };
    let mut line = format!("{playback} volume={:.0}%", status.volume * 100.0);
    let fields = [
        ("song", &status.current_song),
        ("lyric", &status.lyric_line),
        ("points", &status.points),
        ("rating", &status.rating),
        ("version", &status.version),
    ];
    for (label, value) in fields {
        if let Some(value) = value {
            line.push_str(&format!(" {label}={value:?}"));
        }
    }
    line
}
