//! Reconnect supervisor
//!
//! Owns the Connected -> Reconnecting -> Connected transition. Only the
//! supervisor ever calls `reconnect` on the session.

use idlewarden_config::{Backoff, ReconnectSettings};
use idlewarden_session::{SelfIdentity, SessionConnection, SessionResult};
use std::time::Duration;
use tracing::{info, warn};

use crate::{CoreError, CoreResult};

/// Connection state as seen by the supervisor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectState {
    Connected,
    Reconnecting,
}

/// How many times to retry and how long to wait in between
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// None retries until the connection comes back
    pub max_attempts: Option<u32>,
    pub delay: Duration,
    pub backoff: Backoff,
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn from_settings(settings: &ReconnectSettings) -> Self {
        Self {
            max_attempts: settings.max_attempts,
            delay: settings.delay,
            backoff: settings.backoff,
            max_delay: settings.max_delay,
        }
    }

    /// Fixed delay with a bounded number of attempts
    pub fn fixed(delay: Duration, max_attempts: Option<u32>) -> Self {
        Self {
            max_attempts,
            delay,
            backoff: Backoff::Fixed,
            max_delay: delay,
        }
    }

    /// Wait after the `attempt`-th failure (1-based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        match self.backoff {
            Backoff::Fixed => self.delay,
            Backoff::Exponential => {
                let factor = 1u32
                    .checked_shl(attempt.saturating_sub(1))
                    .unwrap_or(u32::MAX);
                self.delay.saturating_mul(factor).min(self.max_delay)
            }
        }
    }

    /// Whether another attempt may follow the `attempt`-th failure
    pub fn allows_retry(&self, attempt: u32) -> bool {
        self.max_attempts.is_none_or(|max| attempt < max)
    }
}

/// Result of a successful recovery
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recovery {
    /// Attempts made, including the successful one
    pub attempts: u32,
    /// Bot identity on the new connection
    pub identity: SelfIdentity,
}

/// Drives reconnect attempts after a connection loss
#[derive(Debug)]
pub struct ReconnectSupervisor {
    policy: RetryPolicy,
    state: ReconnectState,
}

impl ReconnectSupervisor {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            state: ReconnectState::Connected,
        }
    }

    pub fn state(&self) -> ReconnectState {
        self.state
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    async fn attempt(session: &dyn SessionConnection) -> SessionResult<SelfIdentity> {
        session.reconnect().await?;
        session.whoami().await
    }

    /// Reconnect until it works or the policy gives up.
    ///
    /// An attempt only counts as successful once the bot's identity on the
    /// new connection is known. Exhausting the policy is fatal.
    pub async fn recover(&mut self, session: &dyn SessionConnection, reason: &str) -> CoreResult<Recovery> {
        self.state = ReconnectState::Reconnecting;
        warn!(reason = %reason, "Connection lost, reconnecting");

        let mut attempt = 0u32;
        loop {
            attempt += 1;

            match Self::attempt(session).await {
                Ok(identity) => {
                    self.state = ReconnectState::Connected;
                    info!(
                        attempts = attempt,
                        client_id = %identity.client_id,
                        "Reconnected"
                    );
                    return Ok(Recovery {
                        attempts: attempt,
                        identity,
                    });
                }
                Err(e) => {
                    if !self.policy.allows_retry(attempt) {
                        warn!(attempts = attempt, error = %e, "Giving up on reconnect");
                        return Err(CoreError::ReconnectExhausted { attempts: attempt });
                    }

                    let delay = self.policy.delay_for(attempt);
                    warn!(
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Reconnect attempt failed"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}
