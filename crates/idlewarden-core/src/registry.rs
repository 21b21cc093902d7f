//! Protection registry
//!
//! Maps a client to the instant its exemption from idle moves runs out.
//! Protection is keyed by the ephemeral client id, so it does not carry
//! over when a client reconnects.

use idlewarden_util::{ClientId, MonotonicInstant};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::debug;

/// Longest exemption a single grant can produce
pub const MAX_PROTECTION: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// Time-bounded exemptions from idle enforcement.
///
/// Shared between the command handler (writes) and the sweeper (reads and
/// purges). Every method takes the current instant from the caller.
#[derive(Debug, Default)]
pub struct ProtectionRegistry {
    entries: Mutex<HashMap<ClientId, MonotonicInstant>>,
}

impl ProtectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<ClientId, MonotonicInstant>> {
        // The map is consistent after every statement, so a poisoned lock is still usable
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Protect `client` until `now + duration`, replacing any earlier expiry
    pub fn grant(&self, client: ClientId, duration: Duration, now: MonotonicInstant) -> MonotonicInstant {
        let expiry = now + duration.min(MAX_PROTECTION);
        let previous = self.entries().insert(client, expiry);

        debug!(
            client_id = %client,
            duration_secs = duration.as_secs(),
            replaced = previous.is_some(),
            "Protection granted"
        );

        expiry
    }

    /// Whether `client` is exempt at `now`.
    ///
    /// Compares against the stored expiry directly, so an entry the periodic
    /// purge has not reached yet never counts. Does not modify the registry.
    pub fn is_protected(&self, client: ClientId, now: MonotonicInstant) -> bool {
        self.entries()
            .get(&client)
            .is_some_and(|expiry| now < *expiry)
    }

    /// Expiry of the entry for `client`, even if already lapsed
    pub fn expiry_of(&self, client: ClientId) -> Option<MonotonicInstant> {
        self.entries().get(&client).copied()
    }

    /// Remaining protection for `client` at `now`
    pub fn remaining(&self, client: ClientId, now: MonotonicInstant) -> Duration {
        self.expiry_of(client)
            .map(|expiry| expiry.saturating_duration_until(now))
            .unwrap_or(Duration::ZERO)
    }

    /// Remove every entry whose expiry is at or before `now`.
    ///
    /// Returns the removed clients, sorted by id.
    pub fn sweep(&self, now: MonotonicInstant) -> Vec<ClientId> {
        let mut entries = self.entries();
        let mut expired: Vec<ClientId> = entries
            .iter()
            .filter(|(_, expiry)| **expiry <= now)
            .map(|(client, _)| *client)
            .collect();
        expired.sort();

        for client in &expired {
            entries.remove(client);
            debug!(client_id = %client, "Protection expired");
        }

        expired
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }
}
