//! The binary entry point for the UltraStar Deluxe remote.
//!
//! Sends the given commands to one controller and, with `--follow`, keeps the
//! connections open and prints status changes until Ctrl-C.

mod platform;
mod session;
mod settings;

use std::path::Path;
use std::time::Duration;

use clap::Parser;
use ultrastar_config::{CliArgs, Config, ControllerConfig};
use ultrastar_net::{Command, ConnectionRegistry, ConnectionState, MediaPlayer, TcpConnector};

use crate::session::Session;

/// How often `--follow` re-reads `config.ron`.
const CONFIG_POLL: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() {
    let args = CliArgs::parse();

    let dirs = match platform::PlatformDirs::from_override(args.config.as_deref()) {
        Ok(dirs) => dirs,
        Err(e) => {
            eprintln!("Failed to resolve platform directories: {e}");
            std::process::exit(1);
        }
    };
    if let Err(e) = dirs.create_dirs() {
        eprintln!("Failed to initialize platform directories: {e}");
        std::process::exit(1);
    }

    // `file_config` is what is on disk; `config` has the CLI overrides applied.
    let file_config = match Config::load_or_create(&dirs.config_dir) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load config: {e}");
            std::process::exit(1);
        }
    };
    let mut config = file_config.clone();
    config.apply_cli_overrides(&args);
    ultrastar_log::init_logging(Some(&dirs.log_dir), Some(&config));
    tracing::debug!("Using config dir {}", dirs.config_dir.display());

    let Some(target) = config
        .controller(args.controller.as_deref())
        .map(|c| c.name.clone())
    else {
        match args.controller {
            Some(name) => eprintln!("Unknown controller '{name}'"),
            None => eprintln!("No controllers configured"),
        }
        std::process::exit(1);
    };

    let registry = ConnectionRegistry::with_connector(
        TcpConnector::new(settings::socket_config(&config.connection)),
        settings::connection_config(&config.connection),
    );
    let mut session = Session::new(registry, args.follow);
    for controller in controllers_to_open(&config, &target, args.follow) {
        session.open(controller).await;
    }

    let mut reachable = true;
    if let Some(player) = session.player(&target) {
        if args.commands.is_empty() && !args.follow {
            tracing::warn!("No commands given for '{target}'");
        }
        for raw in &args.commands {
            let command = match raw.parse::<Command>() {
                Ok(command) => command,
                Err(never) => match never {},
            };
            run_command(player, command).await;
        }
        if args.follow {
            player.refresh().await;
        }
        reachable = player.connection().state().current() == ConnectionState::Connected;
    }

    if args.follow {
        follow(&mut session, &dirs.config_dir, file_config, config, &args).await;
    }
    session.close().await;

    if !reachable && !args.commands.is_empty() {
        eprintln!("Controller '{target}' is not reachable; commands were dropped");
        std::process::exit(1);
    }
}

/// Print events until Ctrl-C, picking up controller changes from `config.ron`.
async fn follow(
    session: &mut Session,
    config_dir: &Path,
    mut file_config: Config,
    mut config: Config,
    args: &CliArgs,
) {
    tracing::info!("Following events, press Ctrl-C to stop");
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut poll = tokio::time::interval(CONFIG_POLL);
    poll.tick().await;

    loop {
        tokio::select! {
            result = &mut ctrl_c => {
                if let Err(e) = result {
                    tracing::error!("Failed to listen for Ctrl-C: {e}");
                }
                return;
            }
            _ = poll.tick() => {}
        }

        let fresh = match file_config.reload(config_dir) {
            Ok(Some(fresh)) => fresh,
            Ok(None) => continue,
            Err(e) => {
                tracing::warn!("Keeping current config: {e}");
                continue;
            }
        };
        let mut effective = fresh.clone();
        effective.apply_cli_overrides(args);
        for section in restart_required(&config, &effective) {
            tracing::warn!("Change to '{section}' takes effect after a restart");
        }
        let changes = session.apply(&effective.controllers).await;
        if !changes.is_empty() {
            tracing::info!(
                "Config reloaded: {} controller(s) opened, {} closed",
                changes.added.len(),
                changes.removed.len()
            );
        }
        file_config = fresh;
        config = effective;
    }
}

/// Sections whose new values a running process cannot pick up.
fn restart_required(old: &Config, new: &Config) -> Vec<&'static str> {
    let mut sections = Vec::new();
    if old.connection != new.connection {
        sections.push("connection");
    }
    if old.debug != new.debug {
        sections.push("debug");
    }
    sections
}

/// Only the target unless following, in which case every controller.
fn controllers_to_open<'a>(
    config: &'a Config,
    target: &'a str,
    follow: bool,
) -> impl Iterator<Item = &'a ControllerConfig> {
    config
        .controllers
        .iter()
        .filter(move |c| follow || c.name == target)
}

/// Route transport controls through the player so its status stays current.
async fn run_command(player: &MediaPlayer, command: Command) {
    match command {
        Command::Play => player.play().await,
        Command::Pause => player.pause().await,
        Command::Stop => player.stop().await,
        Command::Next => player.next().await,
        Command::Previous => player.previous().await,
        Command::VolumeUp => player.volume_up().await,
        Command::VolumeDown => player.volume_down().await,
        other => player.press(other).await,
    }
}
