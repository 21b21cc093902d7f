//! ServerQuery session adapter

use async_trait::async_trait;
use idlewarden_config::Settings;
use idlewarden_session::{
    ChannelInfo, ClientDetails, ClientFilter, ClientSnapshot, ClientType, SelfIdentity,
    ServerInfo, SessionConnection, SessionError, SessionEvent, SessionResult, TargetMode,
};
use idlewarden_util::{ChannelId, ClientDbId, ClientId};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::codec::{CodecError, Command, Record};
use crate::connection::QueryConnection;

/// Interval between keepalive commands
pub const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(4 * 60);

/// How long to wait for the reply to a single command
pub const COMMAND_TIMEOUT: Duration = Duration::from_secs(10);

/// Server answers this when a listing is empty
const EMPTY_RESULT_SET: u32 = 1281;

/// Server answers this for an unknown client id
const INVALID_CLIENT_ID: u32 = 512;

/// Events the bot registers for after login
const NOTIFY_EVENTS: [&str; 4] = ["server", "textserver", "textchannel", "textprivate"];

/// Everything needed to (re)establish a query session
#[derive(Clone)]
pub struct ConnectOptions {
    pub host: String,
    pub query_port: u16,
    pub server_port: u16,
    pub username: String,
    pub password: String,
    pub nickname: String,
    pub connect_timeout: Duration,
    pub command_timeout: Duration,
    pub keepalive_interval: Duration,
}

impl ConnectOptions {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            host: settings.server.host.clone(),
            query_port: settings.server.query_port,
            server_port: settings.server.server_port,
            username: settings.identity.username.clone(),
            password: settings.identity.password.clone(),
            nickname: settings.identity.nickname.clone(),
            connect_timeout: settings.server.connect_timeout,
            command_timeout: COMMAND_TIMEOUT,
            keepalive_interval: KEEPALIVE_INTERVAL,
        }
    }
}

impl std::fmt::Debug for ConnectOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectOptions")
            .field("host", &self.host)
            .field("query_port", &self.query_port)
            .field("server_port", &self.server_port)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("nickname", &self.nickname)
            .field("connect_timeout", &self.connect_timeout)
            .finish()
    }
}

/// Production session over the ServerQuery interface
pub struct ServerQuerySession {
    options: ConnectOptions,
    current: Mutex<Option<Arc<QueryConnection>>>,
    event_tx: mpsc::UnboundedSender<SessionEvent>,
    event_rx: Mutex<Option<mpsc::UnboundedReceiver<SessionEvent>>>,
}

impl ServerQuerySession {
    /// Connect, log in, select the virtual server and register for events
    pub async fn connect(options: ConnectOptions) -> SessionResult<Self> {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let session = Self {
            options,
            current: Mutex::new(None),
            event_tx,
            event_rx: Mutex::new(Some(event_rx)),
        };

        session.establish().await?;
        Ok(session)
    }

    fn slot(&self) -> MutexGuard<'_, Option<Arc<QueryConnection>>> {
        self.current.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn connection(&self) -> SessionResult<Arc<QueryConnection>> {
        self.slot().clone().ok_or(SessionError::NotConnected)
    }

    async fn execute(&self, command: Command) -> SessionResult<Vec<Record>> {
        let connection = self.connection()?;
        connection.execute(&command).await
    }

    /// Like [`Self::execute`], with an empty result set mapped to no records
    async fn list(&self, command: Command) -> SessionResult<Vec<Record>> {
        match self.execute(command).await {
            Err(SessionError::Command { id: EMPTY_RESULT_SET, .. }) => Ok(Vec::new()),
            other => other,
        }
    }

    async fn establish(&self) -> SessionResult<()> {
        let options = &self.options;
        let connection = QueryConnection::open(
            &options.host,
            options.query_port,
            options.connect_timeout,
            options.command_timeout,
            self.event_tx.clone(),
        )
        .await?;

        let login = Command::new("login")
            .arg("client_login_name", &options.username)
            .arg("client_login_password", &options.password);
        connection.execute(&login).await.map_err(|e| match e {
            SessionError::Command { message, .. } => {
                SessionError::ConnectFailed(format!("Login rejected: {message}"))
            }
            other => other,
        })?;

        connection
            .execute(&Command::new("use").arg("port", options.server_port))
            .await?;

        let rename = Command::new("clientupdate").arg("client_nickname", &options.nickname);
        if let Err(e) = connection.execute(&rename).await {
            warn!(nickname = %options.nickname, error = %e, "Could not set nickname");
        }

        for event in NOTIFY_EVENTS {
            let register = Command::new("servernotifyregister").arg("event", event);
            connection.execute(&register).await?;
        }

        let connection = Arc::new(connection);
        connection.start_keepalive(options.keepalive_interval);
        *self.slot() = Some(connection);

        info!(
            host = %options.host,
            query_port = options.query_port,
            server_port = options.server_port,
            "Query session established"
        );
        Ok(())
    }
}

#[async_trait]
impl SessionConnection for ServerQuerySession {
    async fn reconnect(&self) -> SessionResult<()> {
        let previous = self.slot().take();
        if let Some(previous) = previous {
            previous.close().await;
        }

        debug!(host = %self.options.host, "Reconnecting");
        self.establish().await
    }

    async fn whoami(&self) -> SessionResult<SelfIdentity> {
        let records = self.execute(Command::new("whoami")).await?;
        let record = first(&records)?;

        Ok(SelfIdentity {
            client_id: ClientId::new(record.parse_field("client_id")?),
            channel_id: ChannelId::new(record.parse_field("client_channel_id")?),
            nickname: record.get("client_nickname").unwrap_or_default().to_string(),
        })
    }

    async fn list_clients(&self, filter: ClientFilter) -> SessionResult<Vec<ClientSnapshot>> {
        let records = self.list(Command::new("clientlist").option("-times")).await?;

        let mut clients = Vec::with_capacity(records.len());
        for record in &records {
            let client = client_snapshot(record)?;
            if filter.matches(&client) {
                clients.push(client);
            }
        }
        Ok(clients)
    }

    async fn channel_by_name(&self, name: &str) -> SessionResult<Option<ChannelInfo>> {
        let records = self.list(Command::new("channellist")).await?;

        for record in &records {
            if record.get("channel_name") == Some(name) {
                return Ok(Some(ChannelInfo {
                    id: ChannelId::new(record.parse_field("cid")?),
                    name: name.to_string(),
                }));
            }
        }
        Ok(None)
    }

    async fn send_message(&self, client: ClientId, text: &str) -> SessionResult<()> {
        let command = Command::new("sendtextmessage")
            .arg("targetmode", TargetMode::Client.code())
            .arg("target", client)
            .arg("msg", text);
        self.execute(command).await.map(|_| ())
    }

    async fn move_client(&self, client: ClientId, channel: ChannelId) -> SessionResult<()> {
        let command = Command::new("clientmove").arg("clid", client).arg("cid", channel);
        self.execute(command).await.map(|_| ())
    }

    async fn server_info(&self) -> SessionResult<ServerInfo> {
        let records = self.execute(Command::new("serverinfo")).await?;
        let record = first(&records)?;

        Ok(ServerInfo {
            name: record.get("virtualserver_name").unwrap_or_default().to_string(),
            clients_online: record.parse_field("virtualserver_clientsonline")?,
            query_clients_online: record.parse_optional("virtualserver_queryclientsonline").unwrap_or(0),
            max_clients: record.parse_optional("virtualserver_maxclients").unwrap_or(0),
        })
    }

    async fn client_info(&self, client: ClientId) -> SessionResult<ClientDetails> {
        let records = self
            .execute(Command::new("clientinfo").arg("clid", client))
            .await
            .map_err(|e| match e {
                SessionError::Command { id: INVALID_CLIENT_ID, .. } => SessionError::ClientNotFound(client),
                other => other,
            })?;

        Ok(client_details(first(&records)?)?)
    }

    fn subscribe(&self) -> Option<mpsc::UnboundedReceiver<SessionEvent>> {
        self.event_rx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    fn is_connected(&self) -> bool {
        self.slot().as_ref().is_some_and(|c| c.is_alive())
    }
}

fn first(records: &[Record]) -> SessionResult<&Record> {
    records
        .first()
        .ok_or_else(|| SessionError::Protocol("Empty reply".into()))
}

fn client_snapshot(record: &Record) -> Result<ClientSnapshot, CodecError> {
    Ok(ClientSnapshot {
        id: ClientId::new(record.parse_field("clid")?),
        channel_id: ChannelId::new(record.parse_field("cid")?),
        database_id: ClientDbId::new(record.parse_optional("client_database_id").unwrap_or(0)),
        nickname: record.get("client_nickname").unwrap_or_default().to_string(),
        client_type: ClientType::from_code(record.parse_optional("client_type").unwrap_or(0)),
        idle: Duration::from_millis(record.parse_field("client_idle_time")?),
    })
}

fn client_details(record: &Record) -> Result<ClientDetails, CodecError> {
    let timestamp = |key| {
        record
            .parse_optional::<i64>(key)
            .filter(|secs| *secs > 0)
            .and_then(idlewarden_util::from_unix_seconds)
    };

    Ok(ClientDetails {
        channel_id: ChannelId::new(record.parse_field("cid")?),
        database_id: ClientDbId::new(record.parse_field("client_database_id")?),
        nickname: record.get("client_nickname").unwrap_or_default().to_string(),
        is_recording: record.parse_optional::<u8>("client_is_recording").unwrap_or(0) != 0,
        unique_identifier: record.get("client_unique_identifier").unwrap_or_default().to_string(),
        version: record.get("client_version").unwrap_or_default().to_string(),
        platform: record.get("client_platform").unwrap_or_default().to_string(),
        created: timestamp("client_created"),
        last_connected: timestamp("client_lastconnected"),
        country: record.parse_optional("client_country"),
        ip: record.get("connection_client_ip").unwrap_or_default().to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeServer;

    const TIMEOUT: Duration = Duration::from_secs(2);

    fn options(server: &FakeServer) -> ConnectOptions {
        ConnectOptions {
            host: "127.0.0.1".into(),
            query_port: server.port(),
            server_port: 9987,
            username: "serveradmin".into(),
            password: "secret".into(),
            nickname: "Warden".into(),
            connect_timeout: TIMEOUT,
            command_timeout: TIMEOUT,
            keepalive_interval: KEEPALIVE_INTERVAL,
        }
    }

    #[tokio::test]
    async fn test_connect_runs_setup_sequence() {
        let server = FakeServer::start().await;
        let session = ServerQuerySession::connect(options(&server)).await.unwrap();

        assert!(session.is_connected());
        assert_eq!(
            server.commands(),
            vec![
                "use port=9987",
                "clientupdate client_nickname=Warden",
                "servernotifyregister event=server",
                "servernotifyregister event=textserver",
                "servernotifyregister event=textchannel",
                "servernotifyregister event=textprivate",
            ]
        );
    }

    #[tokio::test]
    async fn test_login_rejected() {
        let server = FakeServer::start().await;
        let mut opts = options(&server);
        opts.password = "wrong".into();

        let result = ServerQuerySession::connect(opts).await;
        assert!(matches!(result, Err(SessionError::ConnectFailed(ref m)) if m.contains("Login rejected")));
    }

    #[tokio::test]
    async fn test_connect_refused() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let server = FakeServer::start().await;
        let mut opts = options(&server);
        opts.query_port = port;

        let result = ServerQuerySession::connect(opts).await;
        assert!(matches!(result, Err(SessionError::ConnectFailed(_))));
    }

    #[tokio::test]
    async fn test_queries() {
        let server = FakeServer::start().await;
        let session = ServerQuerySession::connect(options(&server)).await.unwrap();

        let me = session.whoami().await.unwrap();
        assert_eq!(me.client_id, ClientId::new(7));
        assert_eq!(me.nickname, "Warden");

        let voice = session.list_clients(ClientFilter::VoiceOnly).await.unwrap();
        assert_eq!(voice.len(), 2);
        assert_eq!(voice[0].idle, Duration::from_millis(700_000));
        assert_eq!(voice[1].nickname, "bob the builder");
        assert_eq!(session.list_clients(ClientFilter::All).await.unwrap().len(), 3);

        // Exact match only
        let lobby = session.channel_by_name("Lobby").await.unwrap().unwrap();
        assert_eq!(lobby.id, ChannelId::new(3));
        assert_eq!(session.channel_by_name("lobby").await.unwrap(), None);

        let info = session.server_info().await.unwrap();
        assert_eq!(info.name, "Test Server");
        assert_eq!(info.voice_clients_online(), 2);
    }

    #[tokio::test]
    async fn test_client_info() {
        let server = FakeServer::start().await;
        let session = ServerQuerySession::connect(options(&server)).await.unwrap();

        let details = session.client_info(ClientId::new(8)).await.unwrap();
        assert_eq!(details.database_id, ClientDbId::new(20));
        assert_eq!(details.unique_identifier, "P8vX/kqoN+8=");
        assert_eq!(details.version, "3.6.2 [Build: 1695203293]");
        assert_eq!(details.country.as_deref(), Some("DE"));
        assert_eq!(details.created.map(|dt| dt.timestamp()), Some(1_600_000_000));
        assert!(!details.is_recording);

        assert!(matches!(
            session.client_info(ClientId::new(99)).await,
            Err(SessionError::ClientNotFound(id)) if id == ClientId::new(99)
        ));
    }

    #[tokio::test]
    async fn test_message_and_move_commands() {
        let server = FakeServer::start().await;
        let session = ServerQuerySession::connect(options(&server)).await.unwrap();

        session.send_message(ClientId::new(8), "Moved to Lobby").await.unwrap();
        session.move_client(ClientId::new(8), ChannelId::new(3)).await.unwrap();
        assert!(matches!(
            session.move_client(ClientId::new(8), ChannelId::new(404)).await,
            Err(SessionError::Command { id: 768, .. })
        ));

        let commands = server.commands();
        assert!(commands.contains(&"sendtextmessage targetmode=1 target=8 msg=Moved\\sto\\sLobby".to_string()));
        assert!(commands.contains(&"clientmove clid=8 cid=3".to_string()));
    }

    #[tokio::test]
    async fn test_loss_and_reconnect() {
        let server = FakeServer::start().await;
        let session = ServerQuerySession::connect(options(&server)).await.unwrap();
        let mut events = session.subscribe().unwrap();
        assert!(session.subscribe().is_none());

        server.disconnect();
        let event = tokio::time::timeout(TIMEOUT, events.recv()).await.unwrap().unwrap();
        assert!(matches!(event, SessionEvent::ConnectionLost { .. }));
        assert!(!session.is_connected());
        assert!(matches!(session.whoami().await, Err(SessionError::NotConnected)));

        session.reconnect().await.unwrap();
        assert!(session.is_connected());
        assert_eq!(session.whoami().await.unwrap().client_id, ClientId::new(8));

        // Notifications from the new connection arrive on the same stream
        server.push("notifycliententerview cfid=0 ctid=1 reasonid=0 clid=12 client_nickname=dan client_type=0");
        let event = tokio::time::timeout(TIMEOUT, events.recv()).await.unwrap().unwrap();
        assert!(matches!(event, SessionEvent::ClientConnected(ref c) if c.client_id == ClientId::new(12)));
    }

    #[tokio::test]
    async fn test_reconnect_replaces_live_connection_quietly() {
        let server = FakeServer::start().await;
        let session = ServerQuerySession::connect(options(&server)).await.unwrap();
        let mut events = session.subscribe().unwrap();

        session.reconnect().await.unwrap();
        assert_eq!(session.whoami().await.unwrap().client_id, ClientId::new(8));

        let next = tokio::time::timeout(Duration::from_millis(200), events.recv()).await;
        assert!(next.is_err());
    }
}
