//! Configuration loader with file resolution and environment override support.

use super::error::{ConfigError, ConfigResult};
use super::schema::Config;
use std::path::{Path, PathBuf};

/// Environment variable prefix for overrides
const ENV_PREFIX: &str = "MIDI_PORTS";

/// Config file name in the current directory
const LOCAL_CONFIG_FILE_NAME: &str = "midi-ports.toml";

/// Config file name inside the application config directory
const CONFIG_FILE_NAME: &str = "config.toml";

/// Application directory name under the platform config directory
const APP_DIR_NAME: &str = "midi-ports";

/// Environment variable for explicit config path
const CONFIG_PATH_ENV: &str = "MIDI_PORTS_CONFIG";

/// Configuration loader with resolution and override logic.
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    /// Resolved config file path (if any)
    pub config_path: Option<PathBuf>,
    /// The loaded configuration
    pub config: Config,
}

impl ConfigLoader {
    /// Load configuration using standard resolution order.
    ///
    /// Resolution priority (highest to lowest):
    /// 1. `MIDI_PORTS_CONFIG` environment variable (explicit path)
    /// 2. `./midi-ports.toml` (current directory)
    /// 3. `~/.config/midi-ports/config.toml` (XDG on Linux/macOS)
    /// 4. `%APPDATA%\midi-ports\config.toml` (Windows)
    /// 5. Built-in defaults (no file required)
    ///
    /// Environment variables override config file values.
    pub fn load() -> ConfigResult<Self> {
        let config_path = resolve_config_path();

        let mut config = if let Some(ref path) = config_path {
            load_from_file(path)?
        } else {
            Config::default()
        };

        apply_env_overrides(&mut config)?;
        config.validate()?;

        Ok(Self {
            config_path,
            config,
        })
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref().to_path_buf();
        let mut config = load_from_file(&path)?;
        apply_env_overrides(&mut config)?;
        config.validate()?;

        Ok(Self {
            config_path: Some(path),
            config,
        })
    }

    /// Create a loader with default configuration (no file).
    ///
    /// Environment overrides are still applied; invalid ones are ignored.
    pub fn with_defaults() -> Self {
        let mut config = Config::default();
        if apply_env_overrides(&mut config).is_err() || config.validate().is_err() {
            config = Config::default();
        }

        Self {
            config_path: None,
            config,
        }
    }

    /// Get the loaded configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Get a mutable reference to the configuration.
    pub fn config_mut(&mut self) -> &mut Config {
        &mut self.config
    }

    /// Consume the loader and return the configuration.
    pub fn into_config(self) -> Config {
        self.config
    }

    /// Write the current configuration to `path`, creating parent directories.
    pub fn save_to(&self, path: impl AsRef<Path>) -> ConfigResult<()> {
        save_to_file(&self.config, path.as_ref())
    }
}

/// Resolve the configuration file path using standard locations.
pub fn resolve_config_path() -> Option<PathBuf> {
    // 1. Explicit environment variable
    if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
        let path = PathBuf::from(path);
        if path.exists() {
            return Some(path);
        }
    }

    // 2. Current directory
    let cwd_config = PathBuf::from(LOCAL_CONFIG_FILE_NAME);
    if cwd_config.exists() {
        return Some(cwd_config);
    }

    // 3. XDG config directory (Linux/macOS) or APPDATA (Windows)
    if let Some(app_config) = get_default_config_path() {
        if app_config.exists() {
            return Some(app_config);
        }
    }

    None
}

/// Get the platform-specific config directory.
fn get_config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var("APPDATA").ok().map(PathBuf::from)
    }

    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("XDG_CONFIG_HOME")
            .ok()
            .map(PathBuf::from)
            .or_else(|| {
                std::env::var("HOME")
                    .ok()
                    .map(|h| PathBuf::from(h).join(".config"))
            })
    }
}

/// Load configuration from a file.
fn load_from_file(path: &Path) -> ConfigResult<Config> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
        path: path.to_path_buf(),
        source: e,
    })?;

    toml::from_str(&content).map_err(ConfigError::ParseError)
}

/// Save configuration to a file.
fn save_to_file(config: &Config, path: &Path) -> ConfigResult<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| ConfigError::WriteError {
            path: path.to_path_buf(),
            source: e,
        })?;
    }

    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content).map_err(|e| ConfigError::WriteError {
        path: path.to_path_buf(),
        source: e,
    })
}

fn env_key(section: &str, key: &str) -> String {
    format!("{}_{}_{}", ENV_PREFIX, section, key)
}

/// Apply environment variable overrides to the configuration.
///
/// Environment variables follow the pattern: `MIDI_PORTS_<SECTION>_<KEY>`
fn apply_env_overrides(config: &mut Config) -> ConfigResult<()> {
    // Driver overrides
    if let Ok(val) = std::env::var(env_key("DRIVER", "CLIENT_NAME")) {
        config.driver.client_name = val;
    }
    let var = env_key("DRIVER", "IGNORE");
    if let Ok(val) = std::env::var(&var) {
        config.driver.ignore = val
            .parse()
            .map_err(|message: String| ConfigError::env_parse(&var, message))?;
    }

    // Logging overrides
    if let Ok(val) = std::env::var(env_key("LOGGING", "LEVEL")) {
        config.logging.level = val;
    }
    let var = env_key("LOGGING", "FORMAT");
    if let Ok(val) = std::env::var(&var) {
        config.logging.format = val
            .parse()
            .map_err(|message: String| ConfigError::env_parse(&var, message))?;
    }

    Ok(())
}

/// Get the default config directory for creating new config files.
pub fn get_default_config_dir() -> Option<PathBuf> {
    get_config_dir().map(|d| d.join(APP_DIR_NAME))
}

/// Get the default config file path for creating new config files.
pub fn get_default_config_path() -> Option<PathBuf> {
    get_default_config_dir().map(|d| d.join(CONFIG_FILE_NAME))
}
