//! Configuration structs with sensible defaults and RON persistence.

use std::path::{Path, PathBuf};

use ron::ser::PrettyConfig;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

const CONFIG_FILE: &str = "config.ron";

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Controllers to connect to, one connection each.
    pub controllers: Vec<ControllerConfig>,
    /// Connection timing and limits shared by all controllers.
    pub connection: ConnectionSettings,
    /// Debug/development settings.
    pub debug: DebugConfig,
}

/// One UltraStar Deluxe instance.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ControllerConfig {
    /// Entry id used to address this controller.
    pub name: String,
    /// Hostname or IP address.
    pub host: String,
    /// TCP port of the controller's remote-control server.
    pub port: u16,
}

/// Connection tuning.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ConnectionSettings {
    /// Fixed delay between reconnect attempts, in milliseconds.
    pub reconnect_delay_ms: u64,
    /// Hold time after each command, in milliseconds.
    pub pacing_delay_ms: u64,
    /// Longest accepted inbound line, in bytes.
    pub max_line_len: usize,
    /// Idle seconds before TCP keepalive probing starts.
    pub keepalive_idle_secs: u64,
}

/// Debug/development configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DebugConfig {
    /// Log level override (e.g., "debug", "info", "warn").
    pub log_level: String,
    /// Also write JSON logs to the log directory.
    pub log_to_file: bool,
}

// --- Default implementations ---

impl Default for Config {
    fn default() -> Self {
        Self {
            controllers: vec![ControllerConfig::default()],
            connection: ConnectionSettings::default(),
            debug: DebugConfig::default(),
        }
    }
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            host: "127.0.0.1".to_string(),
            port: 4444,
        }
    }
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            reconnect_delay_ms: 2000,
            pacing_delay_ms: 100,
            max_line_len: 65_536,
            keepalive_idle_secs: 60,
        }
    }
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_to_file: cfg!(debug_assertions),
        }
    }
}

// --- Lookup ---

impl Config {
    /// Find a controller by name, or the first one when `name` is `None`.
    pub fn controller(&self, name: Option<&str>) -> Option<&ControllerConfig> {
        match name {
            Some(name) => self.controllers.iter().find(|c| c.name == name),
            None => self.controllers.first(),
        }
    }
}

// --- Persistence ---

impl Config {
    /// Location of the config file inside `config_dir`.
    pub fn file_path(config_dir: &Path) -> PathBuf {
        config_dir.join(CONFIG_FILE)
    }

    /// Read `config.ron` from `config_dir`. A missing file is replaced by the
    /// defaults, which are written out so the user has something to edit.
    pub fn load_or_create(config_dir: &Path) -> Result<Self, ConfigError> {
        let path = Self::file_path(config_dir);
        if !path.exists() {
            let config = Config::default();
            config.save(config_dir)?;
            log::info!("Wrote default config to {}", path.display());
            return Ok(config);
        }

        let config = read_file(&path)?;
        log::info!(
            "Loaded {} controller(s) from {}",
            config.controllers.len(),
            path.display()
        );
        Ok(config)
    }

    /// Write `self` to `config_dir/config.ron`, creating the directory.
    pub fn save(&self, config_dir: &Path) -> Result<(), ConfigError> {
        std::fs::create_dir_all(config_dir).map_err(|source| ConfigError::Write {
            path: config_dir.to_path_buf(),
            source,
        })?;

        let text = ron::ser::to_string_pretty(self, PrettyConfig::new().depth_limit(3))
            .map_err(ConfigError::Serialize)?;
        let path = Self::file_path(config_dir);
        std::fs::write(&path, text).map_err(|source| ConfigError::Write { path, source })
    }

    /// Re-read the file. Returns `Some` only when its content differs from
    /// `self`, so callers can poll cheaply.
    pub fn reload(&self, config_dir: &Path) -> Result<Option<Self>, ConfigError> {
        let fresh = read_file(&Self::file_path(config_dir))?;
        Ok((fresh != *self).then_some(fresh))
    }
}

fn read_file(path: &Path) -> Result<Config, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    ron::from_str(&text).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}
