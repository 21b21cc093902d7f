//! Configuration validation

use crate::schema::{RawConfig, RawReconnect};
use crate::settings::Backoff;
use thiserror::Error;

/// Longest accepted idle threshold (one week)
pub const MAX_IDLE_MINUTES: u64 = 7 * 24 * 60;

/// Longest accepted sweep interval (one week)
pub const MAX_SWEEP_INTERVAL_SECONDS: u64 = 7 * 24 * 60 * 60;

/// Longest accepted protection grant (one year, the registry's own cap)
pub const MAX_PROTECTION_MINUTES: u64 = 365 * 24 * 60;

/// Validation error
#[derive(Debug, Clone, Error)]
pub enum ValidationError {
    #[error("[{section}] {field} cannot be empty")]
    EmptyField {
        section: &'static str,
        field: &'static str,
    },

    #[error("[{section}] {field} must be greater than zero")]
    ZeroValue {
        section: &'static str,
        field: &'static str,
    },

    #[error("[{section}] {field} must be at most {max}")]
    TooLarge {
        section: &'static str,
        field: &'static str,
        max: u64,
    },

    #[error("Invalid protection command '{value}': {message}")]
    InvalidCommand { value: String, message: String },

    #[error("Invalid backoff '{0}': expected \"fixed\" or \"exponential\"")]
    InvalidBackoff(String),

    #[error("[reconnect] max_delay_ms {max_delay_ms} is below delay_ms {delay_ms}")]
    MaxDelayBelowDelay { delay_ms: u64, max_delay_ms: u64 },
}

/// Validate a raw configuration
pub fn validate_config(config: &RawConfig) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    // Server
    if config.server.host.trim().is_empty() {
        errors.push(ValidationError::EmptyField {
            section: "server",
            field: "host",
        });
    }
    if config.server.query_port == 0 {
        errors.push(ValidationError::ZeroValue {
            section: "server",
            field: "query_port",
        });
    }
    if config.server.server_port == 0 {
        errors.push(ValidationError::ZeroValue {
            section: "server",
            field: "server_port",
        });
    }
    if config.server.connect_timeout_ms == Some(0) {
        errors.push(ValidationError::ZeroValue {
            section: "server",
            field: "connect_timeout_ms",
        });
    }

    // Identity
    for (field, value) in [
        ("nickname", &config.identity.nickname),
        ("username", &config.identity.username),
        ("password", &config.identity.password),
    ] {
        if value.trim().is_empty() {
            errors.push(ValidationError::EmptyField {
                section: "identity",
                field,
            });
        }
    }

    // Idle
    if config.idle.idle_minutes == 0 {
        errors.push(ValidationError::ZeroValue {
            section: "idle",
            field: "idle_minutes",
        });
    } else if config.idle.idle_minutes > MAX_IDLE_MINUTES {
        errors.push(ValidationError::TooLarge {
            section: "idle",
            field: "idle_minutes",
            max: MAX_IDLE_MINUTES,
        });
    }
    match config.idle.sweep_interval_seconds {
        Some(0) => errors.push(ValidationError::ZeroValue {
            section: "idle",
            field: "sweep_interval_seconds",
        }),
        Some(seconds) if seconds > MAX_SWEEP_INTERVAL_SECONDS => {
            errors.push(ValidationError::TooLarge {
                section: "idle",
                field: "sweep_interval_seconds",
                max: MAX_SWEEP_INTERVAL_SECONDS,
            })
        }
        _ => {}
    }
    if let Some(channel) = &config.idle.holding_channel
        && channel.trim().is_empty()
    {
        errors.push(ValidationError::EmptyField {
            section: "idle",
            field: "holding_channel",
        });
    }

    // Protection
    if let Some(command) = &config.protection.command
        && let Err(message) = parse_command(command)
    {
        errors.push(ValidationError::InvalidCommand {
            value: command.clone(),
            message,
        });
    }
    match config.protection.duration_minutes {
        Some(0) => errors.push(ValidationError::ZeroValue {
            section: "protection",
            field: "duration_minutes",
        }),
        Some(minutes) if minutes > MAX_PROTECTION_MINUTES => {
            errors.push(ValidationError::TooLarge {
                section: "protection",
                field: "duration_minutes",
                max: MAX_PROTECTION_MINUTES,
            })
        }
        _ => {}
    }

    errors.extend(validate_reconnect(&config.reconnect));

    // Storage
    if config.storage.database.as_os_str().is_empty() {
        errors.push(ValidationError::EmptyField {
            section: "storage",
            field: "database",
        });
    }

    errors
}

fn validate_reconnect(reconnect: &RawReconnect) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    if reconnect.max_attempts == Some(0) {
        errors.push(ValidationError::ZeroValue {
            section: "reconnect",
            field: "max_attempts",
        });
    }
    if reconnect.delay_ms == Some(0) {
        errors.push(ValidationError::ZeroValue {
            section: "reconnect",
            field: "delay_ms",
        });
    }
    if let Some(backoff) = &reconnect.backoff
        && parse_backoff(backoff).is_err()
    {
        errors.push(ValidationError::InvalidBackoff(backoff.clone()));
    }
    if let (Some(delay_ms), Some(max_delay_ms)) = (reconnect.delay_ms, reconnect.max_delay_ms)
        && max_delay_ms < delay_ms
    {
        errors.push(ValidationError::MaxDelayBelowDelay {
            delay_ms,
            max_delay_ms,
        });
    }

    errors
}

/// Parse a protection command prefix. It must be a single non-empty token.
pub fn parse_command(s: &str) -> Result<String, String> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return Err("command cannot be empty".into());
    }
    if trimmed.chars().any(char::is_whitespace) {
        return Err("command must be a single word".into());
    }
    Ok(trimmed.to_string())
}

/// Parse a backoff name
pub fn parse_backoff(s: &str) -> Result<Backoff, String> {
    match s.to_lowercase().as_str() {
        "fixed" => Ok(Backoff::Fixed),
        "exponential" => Ok(Backoff::Exponential),
        other => Err(format!("Unknown backoff: {}", other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{RawIdentity, RawIdle, RawProtection, RawServer, RawStorage};

    fn valid_config() -> RawConfig {
        RawConfig {
            config_version: 1,
            server: RawServer {
                host: "127.0.0.1".into(),
                query_port: 10011,
                server_port: 9987,
                connect_timeout_ms: None,
            },
            identity: RawIdentity {
                nickname: "Warden".into(),
                username: "serveradmin".into(),
                password: "secret".into(),
            },
            idle: RawIdle {
                idle_minutes: 10,
                sweep_interval_seconds: None,
                holding_channel: None,
                move_message: None,
            },
            protection: RawProtection::default(),
            reconnect: RawReconnect::default(),
            storage: RawStorage {
                database: "connections.db".into(),
            },
        }
    }

    #[test]
    fn valid_config_has_no_errors() {
        assert!(validate_config(&valid_config()).is_empty());
    }

    #[test]
    fn zero_idle_minutes_rejected() {
        let mut config = valid_config();
        config.idle.idle_minutes = 0;

        let errors = validate_config(&config);
        assert!(errors.iter().any(|e| matches!(
            e,
            ValidationError::ZeroValue { field: "idle_minutes", .. }
        )));
    }

    #[test]
    fn oversized_durations_rejected() {
        let mut config = valid_config();
        config.idle.idle_minutes = 307_445_734_561_825_861;
        config.idle.sweep_interval_seconds = Some(i64::MAX as u64);
        config.protection.duration_minutes = Some(u64::MAX);

        let errors = validate_config(&config);
        assert_eq!(errors.len(), 3);
        for field in ["idle_minutes", "sweep_interval_seconds", "duration_minutes"] {
            assert!(
                errors
                    .iter()
                    .any(|e| matches!(e, ValidationError::TooLarge { field: f, .. } if *f == field)),
                "missing TooLarge for {}",
                field
            );
        }
    }

    #[test]
    fn upper_bounds_are_inclusive() {
        let mut config = valid_config();
        config.idle.idle_minutes = MAX_IDLE_MINUTES;
        config.idle.sweep_interval_seconds = Some(MAX_SWEEP_INTERVAL_SECONDS);
        config.protection.duration_minutes = Some(MAX_PROTECTION_MINUTES);

        assert!(validate_config(&config).is_empty());
    }

    #[test]
    fn empty_credentials_rejected() {
        let mut config = valid_config();
        config.identity.nickname = "  ".into();
        config.identity.password = String::new();

        let errors = validate_config(&config);
        assert_eq!(errors.len(), 2);
    }

    #[test]
    fn test_parse_command() {
        assert_eq!(parse_command(" !protect ").unwrap(), "!protect");
        assert!(parse_command("").is_err());
        assert!(parse_command("!pro tect").is_err());
    }

    #[test]
    fn test_parse_backoff() {
        assert_eq!(parse_backoff("fixed").unwrap(), Backoff::Fixed);
        assert_eq!(parse_backoff("Exponential").unwrap(), Backoff::Exponential);
        assert!(parse_backoff("linear").is_err());
    }

    #[test]
    fn reconnect_bounds_checked() {
        let mut config = valid_config();
        config.reconnect = RawReconnect {
            max_attempts: Some(0),
            delay_ms: Some(5000),
            backoff: Some("sometimes".into()),
            max_delay_ms: Some(1000),
        };

        let errors = validate_config(&config);
        assert_eq!(errors.len(), 3);
        assert!(errors.iter().any(|e| matches!(e, ValidationError::InvalidBackoff(_))));
        assert!(errors
            .iter()
            .any(|e| matches!(e, ValidationError::MaxDelayBelowDelay { .. })));
    }
}
