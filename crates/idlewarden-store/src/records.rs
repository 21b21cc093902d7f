//! Connection history rows

use chrono::{DateTime, Local};
use idlewarden_util::{ChannelId, ClientDbId, ClientId};
use serde::{Deserialize, Serialize};

/// One client-connect event as written to the connection history
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionRecord {
    /// Row ID, set by the store
    pub id: i64,
    pub timestamp: DateTime<Local>,
    /// Ephemeral per-connection id
    pub client_id: ClientId,
    pub channel_id: ChannelId,
    /// Persistent account id
    pub database_id: ClientDbId,
    pub nickname: String,
    pub is_recording: bool,
    pub unique_identifier: String,
    pub version: String,
    pub platform: String,
    pub created: Option<DateTime<Local>>,
    pub last_connected: Option<DateTime<Local>>,
    pub country: Option<String>,
    pub ip: String,
}
