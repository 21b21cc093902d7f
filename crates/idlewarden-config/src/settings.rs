//! Validated settings structures

use crate::schema::{RawConfig, RawIdle, RawProtection, RawReconnect, RawServer};
use crate::validation::{parse_backoff, parse_command};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Default holding channel name
pub const DEFAULT_HOLDING_CHANNEL: &str = "Lobby";

/// Default protection command prefix
pub const DEFAULT_PROTECTION_COMMAND: &str = "!protect";

/// Default protection length (3 hours)
pub const DEFAULT_PROTECTION_MINUTES: u64 = 180;

/// Default delay between reconnect attempts
pub const DEFAULT_RECONNECT_DELAY_MS: u64 = 5000;

/// Default cap for exponential reconnect delays
pub const DEFAULT_RECONNECT_MAX_DELAY_MS: u64 = 60_000;

/// Default TCP connect timeout
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 10_000;

/// Validated settings ready for use by the daemon
#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub identity: IdentitySettings,
    pub idle: IdleSettings,
    pub protection: ProtectionSettings,
    pub reconnect: ReconnectSettings,
    pub storage: StorageSettings,
}

impl Settings {
    /// Convert from raw config (after validation)
    pub fn from_raw(raw: RawConfig) -> Self {
        Self {
            server: ServerSettings::from_raw(raw.server),
            identity: IdentitySettings {
                nickname: raw.identity.nickname,
                username: raw.identity.username,
                password: raw.identity.password,
            },
            idle: IdleSettings::from_raw(raw.idle),
            protection: ProtectionSettings::from_raw(raw.protection),
            reconnect: ReconnectSettings::from_raw(raw.reconnect),
            storage: StorageSettings {
                database: raw.storage.database,
            },
        }
    }
}

/// Server connection settings
#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub host: String,
    pub query_port: u16,
    pub server_port: u16,
    pub connect_timeout: Duration,
}

impl ServerSettings {
    fn from_raw(raw: RawServer) -> Self {
        Self {
            host: raw.host,
            query_port: raw.query_port,
            server_port: raw.server_port,
            connect_timeout: Duration::from_millis(
                raw.connect_timeout_ms.unwrap_or(DEFAULT_CONNECT_TIMEOUT_MS),
            ),
        }
    }
}

/// Bot identity. The password is never printed.
#[derive(Clone)]
pub struct IdentitySettings {
    pub nickname: String,
    pub username: String,
    pub password: String,
}

impl fmt::Debug for IdentitySettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdentitySettings")
            .field("nickname", &self.nickname)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Idle enforcement settings
#[derive(Debug, Clone)]
pub struct IdleSettings {
    /// A client idle strictly longer than this is moved
    pub threshold: Duration,
    /// Time between sweeps
    pub sweep_interval: Duration,
    pub holding_channel: String,
    pub move_message: String,
}

impl IdleSettings {
    fn from_raw(raw: RawIdle) -> Self {
        let threshold = Duration::from_secs(raw.idle_minutes.saturating_mul(60));

        // The sweep runs as often as the threshold unless told otherwise
        let sweep_interval = raw
            .sweep_interval_seconds
            .map(Duration::from_secs)
            .unwrap_or(threshold);

        let move_message = raw.move_message.unwrap_or_else(|| {
            format!(
                "You have been idle for more than {} minutes and were moved.",
                raw.idle_minutes
            )
        });

        Self {
            threshold,
            sweep_interval,
            holding_channel: raw
                .holding_channel
                .map(|c| c.trim().to_string())
                .unwrap_or_else(|| DEFAULT_HOLDING_CHANNEL.to_string()),
            move_message,
        }
    }
}

/// Protection command settings
#[derive(Debug, Clone)]
pub struct ProtectionSettings {
    pub command: String,
    pub duration: Duration,
    pub acknowledgement: String,
}

impl ProtectionSettings {
    fn from_raw(raw: RawProtection) -> Self {
        let minutes = raw.duration_minutes.unwrap_or(DEFAULT_PROTECTION_MINUTES);

        Self {
            command: raw
                .command
                .and_then(|c| parse_command(&c).ok())
                .unwrap_or_else(|| DEFAULT_PROTECTION_COMMAND.to_string()),
            duration: Duration::from_secs(minutes.saturating_mul(60)),
            acknowledgement: raw.acknowledgement.unwrap_or_else(|| {
                format!("You are protected from idle moves for {} minutes.", minutes)
            }),
        }
    }
}

/// How reconnect delays grow between attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Backoff {
    #[default]
    Fixed,
    /// Doubles after every failed attempt, up to the configured cap
    Exponential,
}

/// Reconnect policy settings
#[derive(Debug, Clone)]
pub struct ReconnectSettings {
    /// None means retry forever
    pub max_attempts: Option<u32>,
    pub delay: Duration,
    pub backoff: Backoff,
    pub max_delay: Duration,
}

impl ReconnectSettings {
    fn from_raw(raw: RawReconnect) -> Self {
        Self {
            max_attempts: raw.max_attempts,
            delay: Duration::from_millis(raw.delay_ms.unwrap_or(DEFAULT_RECONNECT_DELAY_MS)),
            backoff: raw
                .backoff
                .and_then(|b| parse_backoff(&b).ok())
                .unwrap_or_default(),
            max_delay: Duration::from_millis(
                raw.max_delay_ms.unwrap_or(DEFAULT_RECONNECT_MAX_DELAY_MS),
            ),
        }
    }
}

impl Default for ReconnectSettings {
    fn default() -> Self {
        Self::from_raw(RawReconnect::default())
    }
}

/// Storage settings
#[derive(Debug, Clone)]
pub struct StorageSettings {
    pub database: PathBuf,
}
