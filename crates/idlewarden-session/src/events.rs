//! Events emitted by a session connection

use crate::{ClientEntered, TextMessage};

/// Events from the session connection, in arrival order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// The connection to the server closed; the session must be reconnected
    ConnectionLost { reason: String },

    /// A chat message was received
    TextMessage(TextMessage),

    /// A client connected to the server
    ClientConnected(ClientEntered),

    /// The server or the connection reported an error that needs no action
    Error { message: String },
}

impl SessionEvent {
    /// Short name for logging
    pub fn kind(&self) -> &'static str {
        match self {
            SessionEvent::ConnectionLost { .. } => "connection_lost",
            SessionEvent::TextMessage(_) => "text_message",
            SessionEvent::ClientConnected(_) => "client_connected",
            SessionEvent::Error { .. } => "error",
        }
    }
}
