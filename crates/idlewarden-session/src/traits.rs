//! Session connection trait

use async_trait::async_trait;
use idlewarden_util::{ChannelId, ClientId};
use thiserror::Error;
use tokio::sync::mpsc;

use crate::{
    ChannelInfo, ClientDetails, ClientFilter, ClientSnapshot, SelfIdentity, ServerInfo,
    SessionEvent,
};

/// Errors from session operations
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Not connected")]
    NotConnected,

    #[error("Connect failed: {0}")]
    ConnectFailed(String),

    #[error("Server rejected command (id {id}): {message}")]
    Command { id: u32, message: String },

    #[error("Client not found: {0}")]
    ClientNotFound(ClientId),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type SessionResult<T> = Result<T, SessionError>;

/// Live connection to the voice server.
///
/// Implementations are shared behind an `Arc` by the sweeper, the command
/// handler and the reconnect supervisor. Only the supervisor calls
/// [`SessionConnection::reconnect`].
#[async_trait]
pub trait SessionConnection: Send + Sync {
    /// Re-establish the connection once. Retrying is the caller's concern.
    async fn reconnect(&self) -> SessionResult<()>;

    /// Identity of the bot on the current connection
    async fn whoami(&self) -> SessionResult<SelfIdentity>;

    /// List connected clients in server order
    async fn list_clients(&self, filter: ClientFilter) -> SessionResult<Vec<ClientSnapshot>>;

    /// Find a channel by exact name
    async fn channel_by_name(&self, name: &str) -> SessionResult<Option<ChannelInfo>>;

    /// Send a private text message to a client
    async fn send_message(&self, client: ClientId, text: &str) -> SessionResult<()>;

    /// Move a client into a channel
    async fn move_client(&self, client: ClientId, channel: ChannelId) -> SessionResult<()>;

    /// Virtual server summary
    async fn server_info(&self) -> SessionResult<ServerInfo>;

    /// Detailed information about a single client
    async fn client_info(&self, client: ClientId) -> SessionResult<ClientDetails>;

    /// Take the event stream. Returns `None` if it was already taken.
    ///
    /// The stream outlives reconnects: events from every connection the
    /// session establishes arrive on the same receiver.
    fn subscribe(&self) -> Option<mpsc::UnboundedReceiver<SessionEvent>>;

    /// Whether the connection is currently believed to be up.
    ///
    /// A `ConnectionLost` event is ignored while this returns true, so it
    /// must go false as soon as the link is known to be dead.
    fn is_connected(&self) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_error_display() {
        let err = SessionError::Command {
            id: 768,
            message: "invalid channelID".into(),
        };
        assert_eq!(err.to_string(), "Server rejected command (id 768): invalid channelID");
    }
}
