//! Audit event types

use chrono::{DateTime, Local};
use idlewarden_util::{ChannelId, ClientId};
use serde::{Deserialize, Serialize};

/// Types of audit events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuditEventType {
    /// Service started
    ServiceStarted,

    /// Service stopped
    ServiceStopped,

    /// Idle client moved to the holding channel
    ClientMoved {
        client_id: ClientId,
        nickname: String,
        from_channel: ChannelId,
        to_channel: ChannelId,
        idle_secs: u64,
    },

    /// Protection granted by command
    ProtectionGranted {
        client_id: ClientId,
        nickname: String,
        duration_secs: u64,
    },

    /// Connection to the server lost
    ConnectionLost { reason: String },

    /// Connection re-established
    Reconnected { attempts: u32 },
}

/// Full audit event with metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Unique event ID
    pub id: i64,

    /// Event timestamp
    pub timestamp: DateTime<Local>,

    /// Event type and details
    pub event: AuditEventType,
}

impl AuditEvent {
    pub fn new(event: AuditEventType) -> Self {
        Self {
            id: 0, // Will be set by store
            timestamp: idlewarden_util::now(),
            event,
        }
    }
}
