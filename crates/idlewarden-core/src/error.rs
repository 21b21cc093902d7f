//! Core error type

use idlewarden_session::SessionError;
use thiserror::Error;

/// Errors surfaced by the moderation core
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Holding channel '{name}' not found")]
    HoldingChannelMissing { name: String },

    #[error("Reconnect gave up after {attempts} attempts")]
    ReconnectExhausted { attempts: u32 },

    #[error("Session event stream closed")]
    EventStreamClosed,

    #[error("Session error: {0}")]
    Session(#[from] SessionError),
}

impl CoreError {
    /// Whether this error must stop the process.
    ///
    /// Session errors are contained by the handler that saw them; a lost
    /// connection is reported separately through the event stream.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, CoreError::Session(_))
    }
}

pub type CoreResult<T> = Result<T, CoreError>;
