//! Default paths for idlewarden components
//!
//! Paths are user-writable by default (no root required):
//! - Config: `$XDG_CONFIG_HOME/idlewarden/config.toml` or `~/.config/idlewarden/config.toml`
//! - Data: `$XDG_DATA_HOME/idlewarden` or `~/.local/share/idlewarden`

use std::path::PathBuf;

/// Environment variable for overriding the config file path
pub const IDLEWARDEN_CONFIG_ENV: &str = "IDLEWARDEN_CONFIG";

/// Environment variable for overriding the data directory
pub const IDLEWARDEN_DATA_DIR_ENV: &str = "IDLEWARDEN_DATA_DIR";

/// Application subdirectory name
const APP_DIR: &str = "idlewarden";

/// Config filename within the config directory
const CONFIG_FILENAME: &str = "config.toml";

/// Get the default config file path.
///
/// Order of precedence:
/// 1. `$XDG_CONFIG_HOME/idlewarden/config.toml` (via the platform config dir)
/// 2. `/etc/idlewarden/config.toml` (fallback when no home is known)
///
/// The `IDLEWARDEN_CONFIG` override is applied by the CLI layer.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .map(|dir| dir.join(APP_DIR))
        .unwrap_or_else(|| PathBuf::from("/etc").join(APP_DIR))
        .join(CONFIG_FILENAME)
}

/// Get the default data directory.
///
/// Order of precedence:
/// 1. `$IDLEWARDEN_DATA_DIR` environment variable (if set)
/// 2. `$XDG_DATA_HOME/idlewarden` or `~/.local/share/idlewarden`
/// 3. `/tmp/idlewarden/data` (last resort)
pub fn default_data_dir() -> PathBuf {
    if let Ok(path) = std::env::var(IDLEWARDEN_DATA_DIR_ENV) {
        return PathBuf::from(path);
    }

    data_dir_without_env()
}

/// Get the data directory without checking the IDLEWARDEN_DATA_DIR env var.
pub fn data_dir_without_env() -> PathBuf {
    dirs::data_dir()
        .map(|dir| dir.join(APP_DIR))
        .unwrap_or_else(|| PathBuf::from("/tmp").join(APP_DIR).join("data"))
}

/// Default database location inside the data directory
pub fn default_database_path() -> PathBuf {
    default_data_dir().join("connections.db")
}
