//! Idle sweeper
//!
//! One pass over the server: purge lapsed protection, find clients idle
//! past the threshold and move them to the holding channel.

use idlewarden_config::IdleSettings;
use idlewarden_session::{ClientFilter, ClientSnapshot, SessionConnection};
use idlewarden_util::{ChannelId, ClientId, MonotonicInstant};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::{CoreError, CoreResult, ProtectionRegistry};

/// A client the sweeper moved
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MovedClient {
    pub client_id: ClientId,
    pub nickname: String,
    pub from_channel: ChannelId,
    pub to_channel: ChannelId,
    pub idle: Duration,
}

/// Outcome of a single sweep
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Voice clients seen in the listing
    pub clients_seen: usize,
    /// Protection entries purged at the start of the pass
    pub expired_protections: Vec<ClientId>,
    pub moved: Vec<MovedClient>,
    /// Idle clients left alone because they hold protection
    pub protected: Vec<ClientId>,
    pub notify_failures: Vec<ClientId>,
    pub move_failures: Vec<ClientId>,
}

/// Moves idle clients to the holding channel
#[derive(Debug, Clone)]
pub struct IdleSweeper {
    threshold: Duration,
    holding_channel: String,
    move_message: String,
}

impl IdleSweeper {
    pub fn new(threshold: Duration, holding_channel: impl Into<String>, move_message: impl Into<String>) -> Self {
        Self {
            threshold,
            holding_channel: holding_channel.into(),
            move_message: move_message.into(),
        }
    }

    pub fn from_settings(settings: &IdleSettings) -> Self {
        Self::new(
            settings.threshold,
            settings.holding_channel.clone(),
            settings.move_message.clone(),
        )
    }

    pub fn threshold(&self) -> Duration {
        self.threshold
    }

    pub fn holding_channel(&self) -> &str {
        &self.holding_channel
    }

    /// Strictly longer than the threshold counts as idle
    pub fn is_idle(&self, client: &ClientSnapshot) -> bool {
        client.idle > self.threshold
    }

    /// Run one sweep at `now`.
    ///
    /// A missing holding channel aborts the pass before any client is
    /// touched. Per-client notify and move failures are logged and the pass
    /// carries on with the next client.
    pub async fn sweep(
        &self,
        session: &dyn SessionConnection,
        registry: &ProtectionRegistry,
        now: MonotonicInstant,
    ) -> CoreResult<SweepReport> {
        let mut report = SweepReport {
            expired_protections: registry.sweep(now),
            ..SweepReport::default()
        };

        let holding = session
            .channel_by_name(&self.holding_channel)
            .await?
            .ok_or_else(|| CoreError::HoldingChannelMissing {
                name: self.holding_channel.clone(),
            })?;

        let clients = session.list_clients(ClientFilter::VoiceOnly).await?;
        report.clients_seen = clients.len();

        for client in clients {
            if client.channel_id == holding.id || !self.is_idle(&client) {
                continue;
            }

            if registry.is_protected(client.id, now) {
                debug!(
                    client_id = %client.id,
                    nickname = %client.nickname,
                    idle_secs = client.idle.as_secs(),
                    "Idle client is protected"
                );
                report.protected.push(client.id);
                continue;
            }

            if let Err(e) = session.send_message(client.id, &self.move_message).await {
                warn!(client_id = %client.id, error = %e, "Failed to notify idle client");
                report.notify_failures.push(client.id);
            }

            match session.move_client(client.id, holding.id).await {
                Ok(()) => {
                    info!(
                        client_id = %client.id,
                        nickname = %client.nickname,
                        from_channel = %client.channel_id,
                        to_channel = %holding.id,
                        idle_secs = client.idle.as_secs(),
                        "Moved idle client"
                    );
                    report.moved.push(MovedClient {
                        client_id: client.id,
                        nickname: client.nickname,
                        from_channel: client.channel_id,
                        to_channel: holding.id,
                        idle: client.idle,
                    });
                }
                Err(e) => {
                    warn!(client_id = %client.id, error = %e, "Failed to move idle client");
                    report.move_failures.push(client.id);
                }
            }
        }

        debug!(
            clients = report.clients_seen,
            moved = report.moved.len(),
            protected = report.protected.len(),
            expired = report.expired_protections.len(),
            "Sweep complete"
        );

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use idlewarden_session::{ClientType, MockSession};
    use idlewarden_util::ClientDbId;

    const LOBBY: u32 = 10;
    const GENERAL: u32 = 20;
    const MINUTE: Duration = Duration::from_secs(60);

    fn sweeper() -> IdleSweeper {
        IdleSweeper::new(MINUTE * 10, "Lobby", "You have been moved for being idle.")
    }

    fn session() -> MockSession {
        let session = MockSession::new();
        session.add_channel(GENERAL, "General");
        session.add_channel(LOBBY, "Lobby");
        session
    }

    #[tokio::test]
    async fn test_moves_only_clients_past_threshold() {
        let session = session();
        let registry = ProtectionRegistry::new();
        session.add_client(2, "alice", GENERAL, MINUTE * 10 - Duration::from_secs(1));
        session.add_client(3, "bob", GENERAL, MINUTE * 10 + Duration::from_secs(1));
        session.add_client(4, "carol", GENERAL, MINUTE * 10);

        let report = sweeper()
            .sweep(&session, &registry, MonotonicInstant::now())
            .await
            .unwrap();

        assert_eq!(session.moves(), vec![(ClientId::new(3), ChannelId::new(LOBBY))]);
        assert_eq!(
            session.sent_messages(),
            vec![(ClientId::new(3), "You have been moved for being idle.".to_string())]
        );
        assert_eq!(report.clients_seen, 3);
        assert_eq!(report.moved.len(), 1);
        assert_eq!(report.moved[0].from_channel, ChannelId::new(GENERAL));
    }

    #[tokio::test]
    async fn test_clients_in_holding_channel_are_skipped() {
        let session = session();
        let registry = ProtectionRegistry::new();
        session.add_client(2, "alice", LOBBY, MINUTE * 60);

        let report = sweeper()
            .sweep(&session, &registry, MonotonicInstant::now())
            .await
            .unwrap();

        assert!(session.moves().is_empty());
        assert!(session.sent_messages().is_empty());
        assert!(report.moved.is_empty());
    }

    #[tokio::test]
    async fn test_query_clients_are_never_moved() {
        let session = session();
        let registry = ProtectionRegistry::new();
        session.add_snapshot(ClientSnapshot {
            id: ClientId::new(1),
            channel_id: ChannelId::new(GENERAL),
            database_id: ClientDbId::new(1),
            nickname: "idlewarden".into(),
            client_type: ClientType::Query,
            idle: MINUTE * 60,
        });

        let report = sweeper()
            .sweep(&session, &registry, MonotonicInstant::now())
            .await
            .unwrap();

        assert!(session.moves().is_empty());
        assert_eq!(report.clients_seen, 0);
    }

    #[tokio::test]
    async fn test_protected_clients_stay_until_expiry() {
        let session = session();
        let registry = ProtectionRegistry::new();
        let start = MonotonicInstant::now();
        session.add_client(2, "alice", GENERAL, MINUTE * 30);
        registry.grant(ClientId::new(2), MINUTE * 60, start);

        let report = sweeper().sweep(&session, &registry, start).await.unwrap();
        assert!(session.moves().is_empty());
        assert_eq!(report.protected, vec![ClientId::new(2)]);

        // Once the hour is up the same idle client is moved
        let report = sweeper()
            .sweep(&session, &registry, start + MINUTE * 60)
            .await
            .unwrap();
        assert_eq!(report.expired_protections, vec![ClientId::new(2)]);
        assert_eq!(session.moves(), vec![(ClientId::new(2), ChannelId::new(LOBBY))]);
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_missing_holding_channel_aborts_before_moves() {
        let session = MockSession::new();
        session.add_channel(GENERAL, "General");
        session.add_client(2, "alice", GENERAL, MINUTE * 60);
        let registry = ProtectionRegistry::new();

        let result = sweeper()
            .sweep(&session, &registry, MonotonicInstant::now())
            .await;

        assert!(matches!(
            result,
            Err(CoreError::HoldingChannelMissing { ref name }) if name == "Lobby"
        ));
        assert!(session.moves().is_empty());
        assert!(session.sent_messages().is_empty());
    }

    #[tokio::test]
    async fn test_move_failure_does_not_stop_sweep() {
        let session = session();
        let registry = ProtectionRegistry::new();
        session.add_client(2, "alice", GENERAL, MINUTE * 30);
        session.add_client(3, "bob", GENERAL, MINUTE * 30);
        session.set_fail_move(2);

        let report = sweeper()
            .sweep(&session, &registry, MonotonicInstant::now())
            .await
            .unwrap();

        assert_eq!(report.move_failures, vec![ClientId::new(2)]);
        assert_eq!(session.moves(), vec![(ClientId::new(3), ChannelId::new(LOBBY))]);
    }

    #[tokio::test]
    async fn test_notify_failure_still_moves() {
        let session = session();
        let registry = ProtectionRegistry::new();
        session.add_client(2, "alice", GENERAL, MINUTE * 30);
        session.set_fail_send(true);

        let report = sweeper()
            .sweep(&session, &registry, MonotonicInstant::now())
            .await
            .unwrap();

        assert_eq!(report.notify_failures, vec![ClientId::new(2)]);
        assert_eq!(session.moves(), vec![(ClientId::new(2), ChannelId::new(LOBBY))]);
    }

    #[tokio::test]
    async fn test_disconnected_session_is_a_session_error() {
        let session = session();
        session.simulate_connection_lost("test");
        let registry = ProtectionRegistry::new();

        let result = sweeper()
            .sweep(&session, &registry, MonotonicInstant::now())
            .await;

        assert!(matches!(result, Err(CoreError::Session(_))));
    }
}
