//! Configuration for the command station client.
//!
//! TOML-based configuration with environment variable overrides.
//!
//! # Configuration Resolution
//!
//! Configuration is loaded from the following locations (in order of priority):
//!
//! 1. `EXCS_CONFIG` environment variable (explicit path)
//! 2. `./excs.toml` (current directory)
//! 3. `excs.toml` in the platform config directory
//!    (`~/.config/excs` on Linux, `%APPDATA%\dcc-ex\excs\config` on Windows)
//! 4. Built-in defaults (no file required)
//!
//! # Environment Overrides
//!
//! - `EXCS_STATION_HOST`, `EXCS_STATION_PORT`
//! - `EXCS_STATION_RESPONSE_TIMEOUT_MS`, `EXCS_STATION_HEARTBEAT_TIMEOUT_MS`
//! - `EXCS_LOG_LEVEL`
//!
//! # Example
//!
//! ```rust,no_run
//! use excs_client::config::ConfigLoader;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let loader = ConfigLoader::load()?;
//! let options = loader.config().station.client_options()?;
//! println!("Command station: {}", options.endpoint());
//! # Ok(())
//! # }
//! ```

mod error;
mod loader;
mod schema;

pub use error::{ConfigError, ConfigResult};
pub use loader::{
    get_default_config_dir, get_default_config_path, resolve_config_path, ConfigLoader,
};
pub use schema::{
    ClientOptions, Config, LogFormat, LoggingConfig, StationConfig, DEFAULT_MIN_VERSION,
    DEFAULT_PORT,
};
