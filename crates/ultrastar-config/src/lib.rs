//! Configuration for the UltraStar Deluxe remote.
//!
//! Settings persist to disk as a RON file, can be overridden from the command
//! line via clap, and stay forward/backward compatible through serde defaults.

mod cli;
mod config;
mod error;

pub use cli::CliArgs;
pub use config::{Config, ConnectionSettings, ControllerConfig, DebugConfig};
pub use error::ConfigError;
