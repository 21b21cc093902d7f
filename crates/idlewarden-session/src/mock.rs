//! Mock session connection for testing

use async_trait::async_trait;
use idlewarden_util::{ChannelId, ClientDbId, ClientId};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc;

use crate::{
    ChannelInfo, ClientDetails, ClientFilter, ClientSnapshot, ClientType, SelfIdentity,
    ServerInfo, SessionConnection, SessionError, SessionEvent, SessionResult,
};

#[derive(Debug)]
struct MockState {
    connected: bool,
    identity: SelfIdentity,
    clients: Vec<ClientSnapshot>,
    channels: Vec<ChannelInfo>,
    details: HashMap<ClientId, ClientDetails>,
    server_info: ServerInfo,
    sent: Vec<(ClientId, String)>,
    moves: Vec<(ClientId, ChannelId)>,
    fail_send: bool,
    fail_move: HashSet<ClientId>,
    reconnect_failures_remaining: u32,
    reconnect_calls: u32,
}

/// In-memory stand-in for a live server connection.
///
/// Moves update the mock's client list, so consecutive sweeps observe the
/// effect of earlier ones. Each successful reconnect assigns the bot a fresh
/// ephemeral id, as the real server does.
pub struct MockSession {
    state: Arc<Mutex<MockState>>,
    event_tx: mpsc::UnboundedSender<SessionEvent>,
    event_rx: Mutex<Option<mpsc::UnboundedReceiver<SessionEvent>>>,
}

impl MockSession {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();

        Self {
            state: Arc::new(Mutex::new(MockState {
                connected: true,
                identity: SelfIdentity {
                    client_id: ClientId::new(1),
                    channel_id: ChannelId::new(1),
                    nickname: "idlewarden".into(),
                },
                clients: Vec::new(),
                channels: Vec::new(),
                details: HashMap::new(),
                server_info: ServerInfo::default(),
                sent: Vec::new(),
                moves: Vec::new(),
                fail_send: false,
                fail_move: HashSet::new(),
                reconnect_failures_remaining: 0,
                reconnect_calls: 0,
            })),
            event_tx: tx,
            event_rx: Mutex::new(Some(rx)),
        }
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn connected_state(&self) -> SessionResult<MutexGuard<'_, MockState>> {
        let state = self.state();
        if state.connected {
            Ok(state)
        } else {
            Err(SessionError::NotConnected)
        }
    }

    /// Add a channel
    pub fn add_channel(&self, id: u32, name: &str) {
        self.state().channels.push(ChannelInfo {
            id: ChannelId::new(id),
            name: name.to_string(),
        });
    }

    /// Add a voice client sitting in `channel` and idle for `idle`
    pub fn add_client(&self, id: u32, nickname: &str, channel: u32, idle: Duration) {
        self.add_snapshot(ClientSnapshot {
            id: ClientId::new(id),
            channel_id: ChannelId::new(channel),
            database_id: ClientDbId::new(u64::from(id) + 100),
            nickname: nickname.to_string(),
            client_type: ClientType::Voice,
            idle,
        });
    }

    /// Add an arbitrary client snapshot
    pub fn add_snapshot(&self, snapshot: ClientSnapshot) {
        self.state().clients.push(snapshot);
    }

    /// Register details returned by `client_info`
    pub fn set_client_details(&self, id: u32, details: ClientDetails) {
        self.state().details.insert(ClientId::new(id), details);
    }

    /// Set the server summary
    pub fn set_server_info(&self, info: ServerInfo) {
        self.state().server_info = info;
    }

    /// Make every `send_message` call fail
    pub fn set_fail_send(&self, fail: bool) {
        self.state().fail_send = fail;
    }

    /// Make moves of a specific client fail
    pub fn set_fail_move(&self, id: u32) {
        self.state().fail_move.insert(ClientId::new(id));
    }

    /// Make the next `n` reconnect attempts fail
    pub fn fail_next_reconnects(&self, n: u32) {
        self.state().reconnect_failures_remaining = n;
    }

    /// Messages sent so far, in order
    pub fn sent_messages(&self) -> Vec<(ClientId, String)> {
        self.state().sent.clone()
    }

    /// Moves issued so far, in order
    pub fn moves(&self) -> Vec<(ClientId, ChannelId)> {
        self.state().moves.clone()
    }

    /// Number of reconnect attempts made
    pub fn reconnect_calls(&self) -> u32 {
        self.state().reconnect_calls
    }

    /// Current bot identity
    pub fn identity(&self) -> SelfIdentity {
        self.state().identity.clone()
    }

    /// Channel a client currently sits in
    pub fn client_channel(&self, id: u32) -> Option<ChannelId> {
        self.state()
            .clients
            .iter()
            .find(|c| c.id == ClientId::new(id))
            .map(|c| c.channel_id)
    }

    /// Push an event as if it came from the server
    pub fn simulate_event(&self, event: SessionEvent) {
        let _ = self.event_tx.send(event);
    }

    /// Drop the connection and emit `ConnectionLost`
    pub fn simulate_connection_lost(&self, reason: &str) {
        self.state().connected = false;
        self.simulate_event(SessionEvent::ConnectionLost {
            reason: reason.to_string(),
        });
    }
}

impl Default for MockSession {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SessionConnection for MockSession {
    async fn reconnect(&self) -> SessionResult<()> {
        let mut state = self.state();
        state.reconnect_calls += 1;

        if state.reconnect_failures_remaining > 0 {
            state.reconnect_failures_remaining -= 1;
            return Err(SessionError::ConnectFailed("Mock reconnect failure".into()));
        }

        state.connected = true;
        let next_id = state.identity.client_id.get() + 1;
        state.identity.client_id = ClientId::new(next_id);
        Ok(())
    }

    async fn whoami(&self) -> SessionResult<SelfIdentity> {
        Ok(self.connected_state()?.identity.clone())
    }

    async fn list_clients(&self, filter: ClientFilter) -> SessionResult<Vec<ClientSnapshot>> {
        let state = self.connected_state()?;
        Ok(state
            .clients
            .iter()
            .filter(|c| filter.matches(c))
            .cloned()
            .collect())
    }

    async fn channel_by_name(&self, name: &str) -> SessionResult<Option<ChannelInfo>> {
        let state = self.connected_state()?;
        Ok(state.channels.iter().find(|c| c.name == name).cloned())
    }

    async fn send_message(&self, client: ClientId, text: &str) -> SessionResult<()> {
        let mut state = self.connected_state()?;
        if state.fail_send {
            return Err(SessionError::Command {
                id: 512,
                message: "Mock send failure".into(),
            });
        }
        state.sent.push((client, text.to_string()));
        Ok(())
    }

    async fn move_client(&self, client: ClientId, channel: ChannelId) -> SessionResult<()> {
        let mut state = self.connected_state()?;
        if state.fail_move.contains(&client) {
            return Err(SessionError::Command {
                id: 771,
                message: "Mock move failure".into(),
            });
        }

        let snapshot = state
            .clients
            .iter_mut()
            .find(|c| c.id == client)
            .ok_or(SessionError::ClientNotFound(client))?;
        snapshot.channel_id = channel;
        state.moves.push((client, channel));
        Ok(())
    }

    async fn server_info(&self) -> SessionResult<ServerInfo> {
        Ok(self.connected_state()?.server_info.clone())
    }

    async fn client_info(&self, client: ClientId) -> SessionResult<ClientDetails> {
        let state = self.connected_state()?;
        state
            .details
            .get(&client)
            .cloned()
            .ok_or(SessionError::ClientNotFound(client))
    }

    fn subscribe(&self) -> Option<mpsc::UnboundedReceiver<SessionEvent>> {
        self.event_rx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    fn is_connected(&self) -> bool {
        self.state().connected
    }
}
