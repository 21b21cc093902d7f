//! Raw configuration schema (as parsed from TOML)

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Raw configuration as parsed from TOML
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RawConfig {
    /// Config schema version
    pub config_version: u32,

    /// Server connection
    pub server: RawServer,

    /// Bot identity and credentials
    pub identity: RawIdentity,

    /// Idle enforcement
    pub idle: RawIdle,

    /// Protection command
    #[serde(default)]
    pub protection: RawProtection,

    /// Reconnect policy
    #[serde(default)]
    pub reconnect: RawReconnect,

    /// Connection history storage
    pub storage: RawStorage,
}

/// Where the voice server's query interface lives
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RawServer {
    /// Hostname or address
    pub host: String,

    /// ServerQuery port (usually 10011)
    pub query_port: u16,

    /// Voice port of the virtual server to select (usually 9987)
    pub server_port: u16,

    /// TCP connect timeout in milliseconds
    pub connect_timeout_ms: Option<u64>,
}

/// Display name and query login
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RawIdentity {
    /// Nickname shown to clients
    pub nickname: String,

    /// ServerQuery login name
    pub username: String,

    /// ServerQuery password
    pub password: String,
}

/// Idle detection settings
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RawIdle {
    /// Idle threshold in minutes
    pub idle_minutes: u64,

    /// How often to sweep, in seconds (defaults to the idle threshold)
    pub sweep_interval_seconds: Option<u64>,

    /// Name of the channel idle clients are moved into
    pub holding_channel: Option<String>,

    /// Message sent to a client right before it is moved
    pub move_message: Option<String>,
}

/// Protection command settings
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RawProtection {
    /// Chat prefix that requests protection
    pub command: Option<String>,

    /// How long a protection lasts, in minutes
    pub duration_minutes: Option<u64>,

    /// Reply sent after protection is granted
    pub acknowledgement: Option<String>,
}

/// Reconnect settings
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RawReconnect {
    /// Give up after this many failed attempts (absent: never give up)
    pub max_attempts: Option<u32>,

    /// Delay between attempts in milliseconds
    pub delay_ms: Option<u64>,

    /// "fixed" or "exponential"
    pub backoff: Option<String>,

    /// Upper bound for exponential delays in milliseconds
    pub max_delay_ms: Option<u64>,
}

/// Storage settings
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RawStorage {
    /// SQLite database file for connection history
    pub database: PathBuf,
}
