//! Connection history rows built from session data

use chrono::{DateTime, Local};
use idlewarden_session::ClientDetails;
use idlewarden_store::ConnectionRecord;
use idlewarden_util::ClientId;

/// Build the history row for a client that just connected
pub fn connection_record(client_id: ClientId, details: ClientDetails, timestamp: DateTime<Local>) -> ConnectionRecord {
    ConnectionRecord {
        id: 0,
        timestamp,
        client_id,
        channel_id: details.channel_id,
        database_id: details.database_id,
        nickname: details.nickname,
        is_recording: details.is_recording,
        unique_identifier: details.unique_identifier,
        version: details.version,
        platform: details.platform,
        created: details.created,
        last_connected: details.last_connected,
        country: details.country,
        ip: details.ip,
    }
}
