//! Configuration loader with file resolution and environment override support.

use super::error::{ConfigError, ConfigResult};
use super::schema::Config;
use directories::ProjectDirs;
use std::path::{Path, PathBuf};

/// Environment variable prefix for overrides
const ENV_PREFIX: &str = "EXCS";

/// Config file name
const CONFIG_FILE_NAME: &str = "excs.toml";

/// Environment variable for explicit config path
const CONFIG_PATH_ENV: &str = "EXCS_CONFIG";

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
    /// 1. `EXCS_CONFIG` environment variable (explicit path)
    /// 2. `./excs.toml` (current directory)
    /// 3. `excs.toml` in the platform config directory
    /// 4. Built-in defaults (no file required)
    ///
    /// Environment variables override file values.
    pub fn load() -> ConfigResult<Self> {
        let config_path = resolve_config_path();

        let mut config = if let Some(ref path) = config_path {
            load_from_file(path)?
        } else {
            Config::default()
        };

        apply_env_overrides(&mut config)?;

        Ok(Self { config_path, config })
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref().to_path_buf();
        if !path.exists() {
            return Err(ConfigError::NotFound(path));
        }
        let mut config = load_from_file(&path)?;
        apply_env_overrides(&mut config)?;

        Ok(Self {
            config_path: Some(path),
            config,
        })
    }

    /// Create a loader with default configuration (no file).
    ///
    /// Malformed env overrides are ignored here.
    pub fn with_defaults() -> Self {
        let mut config = Config::default();
        let _ = apply_env_overrides(&mut config);

        Self {
            config_path: None,
            config,
        }
    }

    /// Get the loaded configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Consume the loader and return the configuration.
    pub fn into_config(self) -> Config {
        self.config
    }

    /// Save the current configuration to a specific file.
    pub fn save_to(&self, path: impl AsRef<Path>) -> ConfigResult<()> {
        save_to_file(&self.config, path.as_ref())
    }
}

/// Resolve the configuration file path using standard locations.
pub fn resolve_config_path() -> Option<PathBuf> {
    if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
        let path = PathBuf::from(path);
        if path.exists() {
            return Some(path);
        }
    }

    let cwd_config = PathBuf::from(CONFIG_FILE_NAME);
    if cwd_config.exists() {
        return Some(cwd_config);
    }

    get_default_config_path().filter(|path| path.exists())
}

/// Platform config directory, e.g. `~/.config/excs` on Linux.
pub fn get_default_config_dir() -> Option<PathBuf> {
    ProjectDirs::from("org", "dcc-ex", "excs").map(|dirs| dirs.config_dir().to_path_buf())
}

/// Default config file path for creating new config files.
pub fn get_default_config_path() -> Option<PathBuf> {
    get_default_config_dir().map(|d| d.join(CONFIG_FILE_NAME))
}

fn load_from_file(path: &Path) -> ConfigResult<Config> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
        path: path.to_path_buf(),
        source: e,
    })?;

    toml::from_str(&content).map_err(ConfigError::ParseError)
}

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

fn env_var(key: &str) -> Option<(String, String)> {
    let name = format!("{ENV_PREFIX}_{key}");
    std::env::var(&name).ok().map(|value| (name, value))
}

fn parse_env<T: std::str::FromStr>(name: &str, value: &str, what: &str) -> ConfigResult<T> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::env_parse(name, format!("Invalid {what}: '{value}'")))
}

/// Apply `EXCS_<SECTION>_<KEY>` environment overrides.
fn apply_env_overrides(config: &mut Config) -> ConfigResult<()> {
    if let Some((_, value)) = env_var("STATION_HOST") {
        config.station.host = value;
    }
    if let Some((name, value)) = env_var("STATION_PORT") {
        config.station.port = parse_env(&name, &value, "port number")?;
    }
    if let Some((name, value)) = env_var("STATION_RESPONSE_TIMEOUT_MS") {
        config.station.response_timeout_ms = parse_env(&name, &value, "timeout")?;
    }
    if let Some((name, value)) = env_var("STATION_HEARTBEAT_TIMEOUT_MS") {
        config.station.heartbeat_timeout_ms = parse_env(&name, &value, "timeout")?;
    }
    if let Some((_, value)) = env_var("LOG_LEVEL") {
        config.logging.level = value;
    }

    Ok(())
}
