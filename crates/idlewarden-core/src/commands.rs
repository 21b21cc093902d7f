//! Chat command interpreter
//!
//! Commands are matched by prefix against the message text. The table is
//! built from configuration; today it holds the protection command only.

use idlewarden_config::ProtectionSettings;
use idlewarden_session::{SessionConnection, TargetMode, TextMessage};
use idlewarden_util::{ClientId, MonotonicInstant};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::ProtectionRegistry;

/// What a recognized command asks for
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandAction {
    /// Exempt the sender from idle moves for `duration`
    Protect { duration: Duration },
}

/// Result of handling a command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutcome {
    Protected {
        client_id: ClientId,
        nickname: String,
        duration: Duration,
        expiry: MonotonicInstant,
        acknowledged: bool,
    },
}

#[derive(Debug, Clone)]
struct CommandEntry {
    prefix: String,
    action: CommandAction,
    reply: String,
}

/// Recognizes chat commands and applies them
#[derive(Debug, Clone)]
pub struct CommandInterpreter {
    self_id: ClientId,
    commands: Vec<CommandEntry>,
}

impl CommandInterpreter {
    /// Interpreter with no commands registered
    pub fn new(self_id: ClientId) -> Self {
        Self {
            self_id,
            commands: Vec::new(),
        }
    }

    /// Interpreter with the configured protection command
    pub fn from_settings(self_id: ClientId, settings: &ProtectionSettings) -> Self {
        Self::new(self_id).with_command(
            settings.command.clone(),
            CommandAction::Protect {
                duration: settings.duration,
            },
            settings.acknowledgement.clone(),
        )
    }

    /// Register a command. Earlier registrations win on overlapping prefixes.
    pub fn with_command(mut self, prefix: impl Into<String>, action: CommandAction, reply: impl Into<String>) -> Self {
        self.commands.push(CommandEntry {
            prefix: prefix.into(),
            action,
            reply: reply.into(),
        });
        self
    }

    pub fn self_id(&self) -> ClientId {
        self.self_id
    }

    /// Record the bot's id on a new connection
    pub fn set_self_id(&mut self, self_id: ClientId) {
        if self.self_id != self_id {
            debug!(old = %self.self_id, new = %self_id, "Self id updated");
        }
        self.self_id = self_id;
    }

    /// Whether a message may be considered at all.
    ///
    /// Private messages from the bot itself are echoes of its own replies
    /// and are ignored; everything else goes on to prefix matching.
    pub fn should_consider(&self, message: &TextMessage) -> bool {
        !(message.target_mode == TargetMode::Client && message.invoker_id == self.self_id)
    }

    fn lookup(&self, message: &TextMessage) -> Option<&CommandEntry> {
        if !self.should_consider(message) {
            return None;
        }

        let text = message.text.trim_start();
        self.commands
            .iter()
            .find(|entry| text.starts_with(entry.prefix.as_str()))
    }

    /// The action a message triggers, if any
    pub fn interpret(&self, message: &TextMessage) -> Option<&CommandAction> {
        self.lookup(message).map(|entry| &entry.action)
    }

    /// Apply the command carried by `message`.
    ///
    /// Protection is granted before the acknowledgement is sent; a failed
    /// acknowledgement leaves the grant in place.
    pub async fn handle(
        &self,
        message: &TextMessage,
        session: &dyn SessionConnection,
        registry: &ProtectionRegistry,
        now: MonotonicInstant,
    ) -> Option<CommandOutcome> {
        let entry = self.lookup(message)?;

        match &entry.action {
            CommandAction::Protect { duration } => {
                let expiry = registry.grant(message.invoker_id, *duration, now);
                info!(
                    client_id = %message.invoker_id,
                    nickname = %message.invoker_name,
                    duration_secs = duration.as_secs(),
                    "Protection granted"
                );

                let acknowledged = match session.send_message(message.invoker_id, &entry.reply).await {
                    Ok(()) => true,
                    Err(e) => {
                        warn!(client_id = %message.invoker_id, error = %e, "Failed to acknowledge protection");
                        false
                    }
                };

                Some(CommandOutcome::Protected {
                    client_id: message.invoker_id,
                    nickname: message.invoker_name.clone(),
                    duration: *duration,
                    expiry,
                    acknowledged,
                })
            }
        }
    }
}
