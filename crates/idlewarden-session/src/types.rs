//! Read-only views of server state

use chrono::{DateTime, Local};
use idlewarden_util::{ChannelId, ClientDbId, ClientId};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Kind of connected client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientType {
    /// A regular voice client
    Voice,
    /// A ServerQuery client (bots, admin tools, ourselves)
    Query,
}

impl ClientType {
    /// Map the server's numeric `client_type` field
    pub fn from_code(code: u32) -> Self {
        match code {
            1 => ClientType::Query,
            _ => ClientType::Voice,
        }
    }
}

/// A client as seen at query time. Never cached across sweep cycles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientSnapshot {
    pub id: ClientId,
    pub channel_id: ChannelId,
    pub database_id: ClientDbId,
    pub nickname: String,
    pub client_type: ClientType,
    /// Time since the client's last observed activity
    pub idle: Duration,
}

/// Which clients a listing should return
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClientFilter {
    All,
    /// Voice clients only; query clients (including ourselves) are dropped
    #[default]
    VoiceOnly,
}

impl ClientFilter {
    pub fn matches(&self, client: &ClientSnapshot) -> bool {
        match self {
            ClientFilter::All => true,
            ClientFilter::VoiceOnly => client.client_type == ClientType::Voice,
        }
    }
}

/// A channel on the virtual server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelInfo {
    pub id: ChannelId,
    pub name: String,
}

/// Summary of the virtual server
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerInfo {
    pub name: String,
    pub clients_online: u32,
    pub query_clients_online: u32,
    pub max_clients: u32,
}

impl ServerInfo {
    /// Online clients excluding query connections
    pub fn voice_clients_online(&self) -> u32 {
        self.clients_online.saturating_sub(self.query_clients_online)
    }
}

/// Who the bot currently is on the server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelfIdentity {
    pub client_id: ClientId,
    pub channel_id: ChannelId,
    pub nickname: String,
}

/// Detailed client information used for connection history rows
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientDetails {
    pub channel_id: ChannelId,
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

/// Addressing mode of a text message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetMode {
    /// Direct message to a single client
    Client,
    Channel,
    Server,
}

impl TargetMode {
    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            1 => Some(TargetMode::Client),
            2 => Some(TargetMode::Channel),
            3 => Some(TargetMode::Server),
            _ => None,
        }
    }

    pub fn code(&self) -> u32 {
        match self {
            TargetMode::Client => 1,
            TargetMode::Channel => 2,
            TargetMode::Server => 3,
        }
    }
}

/// Inbound chat message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextMessage {
    pub target_mode: TargetMode,
    pub invoker_id: ClientId,
    pub invoker_name: String,
    pub text: String,
}

/// A client joined the server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientEntered {
    pub client_id: ClientId,
    pub channel_id: ChannelId,
    pub nickname: String,
    pub client_type: ClientType,
}
