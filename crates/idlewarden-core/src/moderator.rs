//! Moderator - the dispatch loop
//!
//! Session events and sweep ticks are handled one at a time on a single
//! task. A connection loss is handled to completion (reconnected, self id
//! refreshed) before the next event or sweep is looked at.

use idlewarden_config::{MAX_SWEEP_INTERVAL_SECONDS, Settings};
use idlewarden_session::{ClientEntered, ClientType, SelfIdentity, SessionConnection, SessionEvent, TextMessage};
use idlewarden_store::{AuditEvent, AuditEventType, Store};
use idlewarden_util::{ClientId, MonotonicInstant};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::{
    CommandInterpreter, CommandOutcome, CoreError, CoreResult, IdleSweeper, OnlineGauge,
    ProtectionRegistry, ReconnectState, ReconnectSupervisor, RetryPolicy, SweepReport,
    connection_record,
};

/// Ties the session, the registry and the store together
pub struct Moderator {
    session: Arc<dyn SessionConnection>,
    store: Arc<dyn Store>,
    registry: Arc<ProtectionRegistry>,
    sweeper: IdleSweeper,
    interpreter: CommandInterpreter,
    supervisor: ReconnectSupervisor,
    gauge: OnlineGauge,
    sweep_interval: Duration,
}

impl Moderator {
    /// Build a moderator for a session whose bot identity is `identity`
    pub fn new(
        settings: &Settings,
        session: Arc<dyn SessionConnection>,
        store: Arc<dyn Store>,
        identity: &SelfIdentity,
    ) -> Self {
        Self {
            session,
            store,
            registry: Arc::new(ProtectionRegistry::new()),
            sweeper: IdleSweeper::from_settings(&settings.idle),
            interpreter: CommandInterpreter::from_settings(identity.client_id, &settings.protection),
            supervisor: ReconnectSupervisor::new(RetryPolicy::from_settings(&settings.reconnect)),
            gauge: OnlineGauge::new(),
            sweep_interval: settings
                .idle
                .sweep_interval
                .min(Duration::from_secs(MAX_SWEEP_INTERVAL_SECONDS)),
        }
    }

    pub fn registry(&self) -> Arc<ProtectionRegistry> {
        self.registry.clone()
    }

    pub fn gauge(&self) -> OnlineGauge {
        self.gauge.clone()
    }

    pub fn self_id(&self) -> ClientId {
        self.interpreter.self_id()
    }

    pub fn reconnect_state(&self) -> ReconnectState {
        self.supervisor.state()
    }

    fn audit(&self, event: AuditEventType) {
        if let Err(e) = self.store.append_audit(&AuditEvent::new(event)) {
            warn!(error = %e, "Failed to write audit event");
        }
    }

    /// Update the online gauge from the server summary
    pub async fn refresh_gauge(&self) {
        match self.session.server_info().await {
            Ok(info) => {
                let online = info.voice_clients_online();
                if self.gauge.set(u64::from(online)) {
                    debug!(online, "Online clients changed");
                }
            }
            Err(e) => warn!(error = %e, "Failed to refresh online count"),
        }
    }

    /// Handle one session event
    pub async fn handle_event(&mut self, event: SessionEvent, now: MonotonicInstant) -> CoreResult<()> {
        match event {
            SessionEvent::ConnectionLost { reason } => self.on_connection_lost(&reason).await,
            SessionEvent::TextMessage(message) => {
                self.on_text_message(&message, now).await;
                Ok(())
            }
            SessionEvent::ClientConnected(entered) => {
                self.on_client_connected(&entered).await;
                Ok(())
            }
            SessionEvent::Error { message } => {
                warn!(message = %message, "Session reported an error");
                Ok(())
            }
        }
    }

    async fn on_connection_lost(&mut self, reason: &str) -> CoreResult<()> {
        if self.session.is_connected() {
            debug!(reason = %reason, "Ignoring connection loss for a connection already replaced");
            return Ok(());
        }

        self.audit(AuditEventType::ConnectionLost {
            reason: reason.to_string(),
        });

        let recovery = match self.supervisor.recover(self.session.as_ref(), reason).await {
            Ok(recovery) => recovery,
            Err(e) => {
                error!(error = %e, "Connection could not be re-established");
                return Err(e);
            }
        };

        self.interpreter.set_self_id(recovery.identity.client_id);
        self.audit(AuditEventType::Reconnected {
            attempts: recovery.attempts,
        });
        self.refresh_gauge().await;
        Ok(())
    }

    async fn on_text_message(&self, message: &TextMessage, now: MonotonicInstant) {
        let outcome = self
            .interpreter
            .handle(message, self.session.as_ref(), &self.registry, now)
            .await;

        match outcome {
            Some(CommandOutcome::Protected {
                client_id,
                nickname,
                duration,
                ..
            }) => {
                self.audit(AuditEventType::ProtectionGranted {
                    client_id,
                    nickname,
                    duration_secs: duration.as_secs(),
                });
            }
            None => {
                debug!(invoker = %message.invoker_id, "Message is not a command");
            }
        }
    }

    async fn on_client_connected(&self, entered: &ClientEntered) {
        if entered.client_type == ClientType::Query {
            debug!(client_id = %entered.client_id, "Query client connected");
            return;
        }

        match self.session.client_info(entered.client_id).await {
            Ok(details) => {
                let record = connection_record(entered.client_id, details, idlewarden_util::now());
                info!(
                    client_id = %record.client_id,
                    nickname = %record.nickname,
                    platform = %record.platform,
                    "Client connected"
                );
                if let Err(e) = self.store.append_connection(&record) {
                    warn!(client_id = %entered.client_id, error = %e, "Failed to record connection");
                }
            }
            Err(e) => {
                warn!(client_id = %entered.client_id, error = %e, "Failed to look up connected client");
            }
        }

        self.refresh_gauge().await;
    }

    /// Run one sweep.
    ///
    /// Returns `Ok(None)` when the pass was skipped because of a session
    /// error; the loss itself is dealt with through the event stream.
    pub async fn run_sweep(&mut self, now: MonotonicInstant) -> CoreResult<Option<SweepReport>> {
        match self.sweeper.sweep(self.session.as_ref(), &self.registry, now).await {
            Ok(report) => {
                for moved in &report.moved {
                    self.audit(AuditEventType::ClientMoved {
                        client_id: moved.client_id,
                        nickname: moved.nickname.clone(),
                        from_channel: moved.from_channel,
                        to_channel: moved.to_channel,
                        idle_secs: moved.idle.as_secs(),
                    });
                }
                self.refresh_gauge().await;
                Ok(Some(report))
            }
            Err(e) if e.is_fatal() => {
                error!(error = %e, "Sweep failed");
                Err(e)
            }
            Err(e) => {
                warn!(error = %e, "Sweep skipped");
                Ok(None)
            }
        }
    }

    /// Dispatch events and sweeps until `shutdown` resolves or a fatal error occurs
    pub async fn run<F>(mut self, mut events: mpsc::UnboundedReceiver<SessionEvent>, shutdown: F) -> CoreResult<()>
    where
        F: Future<Output = ()>,
    {
        let mut ticker = tokio::time::interval_at(
            tokio::time::Instant::now() + self.sweep_interval,
            self.sweep_interval,
        );
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        info!(
            self_id = %self.self_id(),
            threshold_secs = self.sweeper.threshold().as_secs(),
            sweep_interval_secs = self.sweep_interval.as_secs(),
            holding_channel = %self.sweeper.holding_channel(),
            "Moderator running"
        );
        self.refresh_gauge().await;

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutdown requested");
                    return Ok(());
                }
                _ = ticker.tick() => {
                    self.run_sweep(MonotonicInstant::now()).await?;
                }
                event = events.recv() => {
                    let Some(event) = event else {
                        return Err(CoreError::EventStreamClosed);
                    };
                    debug!(kind = event.kind(), "Session event");

                    // Reconnecting can take a while; keep honoring shutdown meanwhile
                    tokio::select! {
                        result = self.handle_event(event, MonotonicInstant::now()) => result?,
                        _ = &mut shutdown => {
                            info!("Shutdown requested");
                            return Ok(());
                        }
                    }
                }
            }
        }
    }
}
