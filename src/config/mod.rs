//! Configuration module for midi-port-driver.
//!
//! This module provides TOML-based configuration with environment variable overrides.
//!
//! # Configuration Resolution
//!
//! Configuration is loaded from the following locations (in order of priority):
//!
//! 1. `MIDI_PORTS_CONFIG` environment variable (explicit path)
//! 2. `./midi-ports.toml` (current directory)
//! 3. `~/.config/midi-ports/config.toml` (XDG on Linux/macOS)
//! 4. `%APPDATA%\midi-ports\config.toml` (Windows)
//! 5. Built-in defaults (no file required)
//!
//! # Environment Overrides
//!
//! The pattern is: `MIDI_PORTS_<SECTION>_<KEY>`
//!
//! - `MIDI_PORTS_DRIVER_CLIENT_NAME=studio`
//! - `MIDI_PORTS_DRIVER_IGNORE=active_sense`
//! - `MIDI_PORTS_LOGGING_LEVEL=debug`
//! - `MIDI_PORTS_LOGGING_FORMAT=pretty`
//!
//! # Example
//!
//! ```rust,no_run
//! use midi_port_driver::config::ConfigLoader;
//!
//! let loader = ConfigLoader::load()?;
//! let config = loader.config();
//!
//! println!("Client name: {}", config.driver.client_name);
//! println!("Log level: {}", config.logging.level);
//! # Ok::<(), midi_port_driver::config::ConfigError>(())
//! ```

mod error;
mod loader;
mod schema;

pub use error::{ConfigError, ConfigResult};
pub use loader::{
    get_default_config_dir, get_default_config_path, resolve_config_path, ConfigLoader,
};
pub use schema::{Config, DriverConfig, LogFormat, LoggingConfig};
