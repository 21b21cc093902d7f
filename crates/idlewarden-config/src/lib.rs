//! Configuration parsing and validation for idlewarden
//!
//! Supports TOML configuration with:
//! - Versioned schema
//! - Server, identity, idle, protection, reconnect and storage sections
//! - Validation with clear error messages

mod schema;
mod settings;
mod validation;

pub use schema::*;
pub use settings::*;
pub use validation::*;

use std::path::Path;
use thiserror::Error;
use tracing::debug;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Validation failed: {errors:?}")]
    ValidationFailed { errors: Vec<ValidationError> },

    #[error("Unsupported config version: {0}")]
    UnsupportedVersion(u32),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Load and validate configuration from a TOML file
pub fn load_config(path: impl AsRef<Path>) -> ConfigResult<Settings> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path)?;
    debug!(path = %path.display(), bytes = content.len(), "Config file read");
    parse_config(&content)
}

/// Parse and validate configuration from a TOML string
pub fn parse_config(content: &str) -> ConfigResult<Settings> {
    let raw: RawConfig = toml::from_str(content)?;

    // Check version
    if raw.config_version != CURRENT_CONFIG_VERSION {
        return Err(ConfigError::UnsupportedVersion(raw.config_version));
    }

    // Validate
    let errors = validate_config(&raw);
    if !errors.is_empty() {
        return Err(ConfigError::ValidationFailed { errors });
    }

    Ok(Settings::from_raw(raw))
}

/// Current supported config version
pub const CURRENT_CONFIG_VERSION: u32 = 1;

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::time::Duration;

    const MINIMAL: &str = r#"
        config_version = 1

        [server]
        host = "voice.example.org"
        query_port = 10011
        server_port = 9987

        [identity]
        nickname = "Warden"
        username = "serveradmin"
        password = "secret"

        [idle]
        idle_minutes = 10

        [storage]
        database = "connections.db"
    "#;

    #[test]
    fn parse_minimal_config() {
        let settings = parse_config(MINIMAL).unwrap();
        assert_eq!(settings.server.host, "voice.example.org");
        assert_eq!(settings.idle.threshold, Duration::from_secs(600));
        assert_eq!(settings.idle.holding_channel, DEFAULT_HOLDING_CHANNEL);
        assert_eq!(settings.protection.command, DEFAULT_PROTECTION_COMMAND);
    }

    #[test]
    fn reject_wrong_version() {
        let config = MINIMAL.replace("config_version = 1", "config_version = 99");
        let result = parse_config(&config);
        assert!(matches!(result, Err(ConfigError::UnsupportedVersion(99))));
    }

    #[test]
    fn reject_missing_required_field() {
        let config = MINIMAL.replace("idle_minutes = 10", "");
        assert!(matches!(parse_config(&config), Err(ConfigError::ParseError(_))));
    }

    #[test]
    fn reject_mistyped_field() {
        let config = MINIMAL.replace("idle_minutes = 10", "idle_minutes = \"ten\"");
        assert!(matches!(parse_config(&config), Err(ConfigError::ParseError(_))));
    }

    #[test]
    fn reject_invalid_values() {
        let config = MINIMAL.replace("idle_minutes = 10", "idle_minutes = 0");
        assert!(matches!(
            parse_config(&config),
            Err(ConfigError::ValidationFailed { .. })
        ));
    }

    #[test]
    fn reject_durations_that_overflow() {
        let huge_idle = MINIMAL.replace("idle_minutes = 10", "idle_minutes = 307445734561825861");
        assert!(matches!(
            parse_config(&huge_idle),
            Err(ConfigError::ValidationFailed { .. })
        ));

        let huge_sweep = MINIMAL.replace(
            "idle_minutes = 10",
            "idle_minutes = 10\n        sweep_interval_seconds = 9223372036854775807",
        );
        assert!(matches!(
            parse_config(&huge_sweep),
            Err(ConfigError::ValidationFailed { .. })
        ));

        let huge_protection = format!(
            "{}\n        [protection]\n        duration_minutes = 9223372036854775807\n",
            MINIMAL
        );
        assert!(matches!(
            parse_config(&huge_protection),
            Err(ConfigError::ValidationFailed { .. })
        ));
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(MINIMAL.as_bytes()).unwrap();

        let settings = load_config(file.path()).unwrap();
        assert_eq!(settings.identity.nickname, "Warden");
    }

    #[test]
    fn load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let result = load_config(dir.path().join("absent.toml"));
        assert!(matches!(result, Err(ConfigError::ReadError(_))));
    }
}
