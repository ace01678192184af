//! Command-line argument parsing.

use std::path::PathBuf;

use clap::Parser;

use crate::{Config, ControllerConfig};

/// UltraStar Deluxe remote command-line arguments.
///
/// CLI values override settings loaded from `config.ron`.
#[derive(Parser, Debug, Default)]
#[command(name = "ultrastar-ctl", about = "Remote control for UltraStar Deluxe")]
pub struct CliArgs {
    /// Controller to address (defaults to the first configured one).
    #[arg(long, short = 'c')]
    pub controller: Option<String>,

    /// Controller host.
    #[arg(long)]
    pub host: Option<String>,

    /// Controller port.
    #[arg(long, short = 'p')]
    pub port: Option<u16>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(long)]
    pub log_level: Option<String>,

    /// Path to config directory (overrides default location).
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Keep running and print events until interrupted.
    #[arg(long, short = 'f')]
    pub follow: bool,

    /// Commands to send, e.g. `play` or `"set_volume 80"`.
    pub commands: Vec<String>,
}

impl Config {
    /// Apply CLI overrides to a loaded config.
    ///
    /// `--host`/`--port` change the selected controller. An unknown
    /// `--controller` name adds a new entry built from defaults.
    pub fn apply_cli_overrides(&mut self, args: &CliArgs) {
        if let Some(ref level) = args.log_level {
            self.debug.log_level = level.clone();
        }
        if args.host.is_none() && args.port.is_none() {
            return;
        }

        let index = match args.controller.as_deref() {
            Some(name) => match self.controllers.iter().position(|c| c.name == name) {
                Some(i) => i,
                None => {
                    self.controllers.push(ControllerConfig {
                        name: name.to_string(),
                        ..Default::default()
                    });
                    self.controllers.len() - 1
                }
            },
            None if self.controllers.is_empty() => {
                self.controllers.push(ControllerConfig::default());
                0
            }
            None => 0,
        };

        let controller = &mut self.controllers[index];
        if let Some(ref host) = args.host {
            controller.host = host.clone();
        }
        if let Some(port) = args.port {
            controller.port = port;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_override() {
        let mut config = Config::default();
        let args = CliArgs {
            host: Some("192.168.1.1".to_string()),
            log_level: Some("debug".to_string()),
            ..Default::default()
        };
        config.apply_cli_overrides(&args);
        assert_eq!(config.controllers[0].host, "192.168.1.1");
        assert_eq!(config.debug.log_level, "debug");
        // Non-overridden fields retain defaults
        assert_eq!(config.controllers[0].port, 4444);
    }

    #[test]
    fn test_cli_no_override() {
        let original = Config::default();
        let mut config = Config::default();
        config.apply_cli_overrides(&CliArgs::default());
        assert_eq!(config, original);
    }

    #[test]
    fn test_cli_unknown_controller_is_added() {
        let mut config = Config::default();
        let args = CliArgs {
            controller: Some("party".to_string()),
            port: Some(5000),
            ..Default::default()
        };
        config.apply_cli_overrides(&args);

        assert_eq!(config.controllers.len(), 2);
        let party = config.controller(Some("party")).unwrap();
        assert_eq!(party.port, 5000);
        assert_eq!(party.host, "127.0.0.1");
    }

    #[test]
    fn test_cli_without_controllers_creates_one() {
        let mut config = Config {
            controllers: Vec::new(),
            ..Default::default()
        };
        let args = CliArgs {
            host: Some("karaoke.lan".to_string()),
            ..Default::default()
        };
        config.apply_cli_overrides(&args);
        assert_eq!(config.controllers.len(), 1);
        assert_eq!(config.controllers[0].host, "karaoke.lan");
    }

    #[test]
    fn test_parse_commands_and_flags() {
        let args = CliArgs::parse_from([
            "ultrastar-ctl",
            "--host",
            "10.0.0.2",
            "-p",
            "4455",
            "--follow",
            "play",
            "set_volume 80",
        ]);
        assert_eq!(args.host.as_deref(), Some("10.0.0.2"));
        assert_eq!(args.port, Some(4455));
        assert!(args.follow);
        assert_eq!(args.commands, vec!["play", "set_volume 80"]);
    }
}
