//! TCP connection to the query interface
//!
//! A background task reads every inbound line. Replies are handed to the
//! command currently waiting; notifications are converted to session events.
//! Commands are serialized: only one is in flight at a time. A command that
//! gets no reply leaves the stream out of step, so the connection is then
//! treated as lost.

use idlewarden_session::{
    ClientEntered, ClientType, SessionError, SessionEvent, SessionResult, TargetMode, TextMessage,
};
use idlewarden_util::{ChannelId, ClientId};
use std::mem;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use crate::codec::{CodecError, Command, ErrorLine, Line, Record};

/// Complete reply to one command
#[derive(Debug)]
struct Reply {
    records: Vec<Record>,
    error: ErrorLine,
}

struct CommandChannel {
    writer: OwnedWriteHalf,
    replies: mpsc::UnboundedReceiver<Reply>,
}

/// One established query connection
pub(crate) struct QueryConnection {
    channel: tokio::sync::Mutex<CommandChannel>,
    alive: Arc<AtomicBool>,
    closing: Arc<AtomicBool>,
    reader: JoinHandle<()>,
    keepalive: Mutex<Option<JoinHandle<()>>>,
    command_timeout: Duration,
    events: mpsc::UnboundedSender<SessionEvent>,
}

impl QueryConnection {
    /// Connect, consume the greeting and start the reader task
    pub(crate) async fn open(
        host: &str,
        port: u16,
        connect_timeout: Duration,
        command_timeout: Duration,
        events: mpsc::UnboundedSender<SessionEvent>,
    ) -> SessionResult<Self> {
        let stream = tokio::time::timeout(connect_timeout, TcpStream::connect((host, port)))
            .await
            .map_err(|_| SessionError::ConnectFailed(format!("Timed out connecting to {host}:{port}")))?
            .map_err(|e| SessionError::ConnectFailed(format!("{host}:{port}: {e}")))?;

        let (read, writer) = stream.into_split();
        let mut lines = BufReader::new(read).lines();

        tokio::time::timeout(connect_timeout, read_greeting(&mut lines))
            .await
            .map_err(|_| SessionError::ConnectFailed("Timed out waiting for greeting".into()))??;

        debug!(host = %host, port, "Query connection open");

        let (reply_tx, replies) = mpsc::unbounded_channel();
        let alive = Arc::new(AtomicBool::new(true));
        let closing = Arc::new(AtomicBool::new(false));
        let reader = tokio::spawn(read_loop(
            lines,
            reply_tx,
            events.clone(),
            alive.clone(),
            closing.clone(),
        ));

        Ok(Self {
            channel: tokio::sync::Mutex::new(CommandChannel { writer, replies }),
            alive,
            closing,
            reader,
            keepalive: Mutex::new(None),
            command_timeout,
            events,
        })
    }

    pub(crate) fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    /// Send `command` and wait for its reply.
    ///
    /// A non-zero error id is returned as [`SessionError::Command`]. If no
    /// reply arrives within the command timeout the connection is abandoned.
    pub(crate) async fn execute(&self, command: &Command) -> SessionResult<Vec<Record>> {
        let mut channel = self.channel.lock().await;
        if !self.is_alive() {
            return Err(SessionError::NotConnected);
        }

        trace!(command = %command, "Sending command");
        channel.writer.write_all(command.to_line().as_bytes()).await?;

        let reply = match tokio::time::timeout(self.command_timeout, channel.replies.recv()).await {
            Ok(Some(reply)) => reply,
            Ok(None) => return Err(SessionError::NotConnected),
            Err(_) => {
                let reason = format!("No reply to '{}'", command.name());
                self.abandon(&reason);
                return Err(SessionError::Protocol(reason));
            }
        };

        if reply.error.is_ok() {
            Ok(reply.records)
        } else {
            Err(SessionError::Command {
                id: reply.error.id,
                message: reply.error.message,
            })
        }
    }

    /// Send a harmless command every `interval` so idle connections are not dropped
    pub(crate) fn start_keepalive(self: &Arc<Self>, interval: Duration) {
        let weak = Arc::downgrade(self);
        let handle = tokio::spawn(async move {
            loop {
                tokio::time::sleep(interval).await;
                let Some(connection) = weak.upgrade() else {
                    break;
                };
                if !connection.is_alive() {
                    break;
                }
                match connection.execute(&Command::new("version")).await {
                    Ok(_) => trace!("Keepalive sent"),
                    Err(e) => warn!(error = %e, "Keepalive failed"),
                }
            }
        });

        let previous = self
            .keepalive
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(handle);
        if let Some(previous) = previous {
            previous.abort();
        }
    }

    /// Shut the connection down without reporting a connection loss
    pub(crate) async fn close(&self) {
        self.closing.store(true, Ordering::SeqCst);

        if self.is_alive() {
            let mut channel = self.channel.lock().await;
            let quit = Command::new("quit").to_line();
            if let Err(e) = channel.writer.write_all(quit.as_bytes()).await {
                debug!(error = %e, "Failed to send quit");
            }
        }

        self.alive.store(false, Ordering::SeqCst);
        self.stop_tasks();
    }

    /// Any later reply could belong to the command that went unanswered
    fn abandon(&self, reason: &str) {
        self.alive.store(false, Ordering::SeqCst);
        if !self.closing.swap(true, Ordering::SeqCst) {
            warn!(reason = %reason, "Query connection out of sync");
            let _ = self.events.send(SessionEvent::ConnectionLost {
                reason: reason.to_string(),
            });
        }
        self.stop_tasks();
    }

    fn stop_tasks(&self) {
        self.reader.abort();
        if let Some(keepalive) = self
            .keepalive
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            keepalive.abort();
        }
    }
}

impl Drop for QueryConnection {
    fn drop(&mut self) {
        self.closing.store(true, Ordering::SeqCst);
        self.stop_tasks();
    }
}

/// Read the `TS3` banner and the welcome line that follows it
async fn read_greeting(lines: &mut Lines<BufReader<OwnedReadHalf>>) -> SessionResult<()> {
    let banner = next_nonempty(lines).await?;
    if banner != "TS3" {
        return Err(SessionError::ConnectFailed(format!(
            "Unexpected greeting {banner:?}; not a query interface"
        )));
    }
    let welcome = next_nonempty(lines).await?;
    trace!(welcome = %welcome, "Greeting received");
    Ok(())
}

async fn next_nonempty(lines: &mut Lines<BufReader<OwnedReadHalf>>) -> SessionResult<String> {
    loop {
        match lines.next_line().await? {
            Some(line) => {
                // Lines end in "\n\r", so the carriage return leads the next line
                let line = line.trim_matches('\r');
                if !line.is_empty() {
                    return Ok(line.to_string());
                }
            }
            None => {
                return Err(SessionError::ConnectFailed(
                    "Connection closed during greeting".into(),
                ));
            }
        }
    }
}

async fn read_loop(
    mut lines: Lines<BufReader<OwnedReadHalf>>,
    replies: mpsc::UnboundedSender<Reply>,
    events: mpsc::UnboundedSender<SessionEvent>,
    alive: Arc<AtomicBool>,
    closing: Arc<AtomicBool>,
) {
    let mut pending = Vec::new();

    let reason = loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break "Server closed the connection".to_string(),
            Err(e) => break format!("Read failed: {e}"),
        };

        let line = line.trim_matches('\r');
        if line.is_empty() {
            continue;
        }

        match Line::classify(line) {
            Ok(Line::Error(error)) => {
                let _ = replies.send(Reply {
                    records: mem::take(&mut pending),
                    error,
                });
            }
            Ok(Line::Notification { name, record }) => {
                if let Some(event) = notification_event(&name, &record) {
                    let _ = events.send(event);
                }
            }
            Ok(Line::Data(records)) => pending.extend(records),
            Err(e) => {
                warn!(error = %e, "Unreadable line from server");
                let _ = events.send(SessionEvent::Error {
                    message: format!("Unreadable line: {e}"),
                });
            }
        }
    };

    alive.store(false, Ordering::SeqCst);
    if !closing.swap(true, Ordering::SeqCst) {
        warn!(reason = %reason, "Query connection lost");
        let _ = events.send(SessionEvent::ConnectionLost { reason });
    }
}

/// Map a notification to a session event.
///
/// Notifications we do not act on yield `None`; ones we act on but cannot
/// decode yield an [`SessionEvent::Error`].
pub(crate) fn notification_event(name: &str, record: &Record) -> Option<SessionEvent> {
    let decoded = match name {
        "notifytextmessage" => text_message(record).map(SessionEvent::TextMessage),
        "notifycliententerview" => client_entered(record).map(SessionEvent::ClientConnected),
        _ => {
            trace!(name = %name, "Ignoring notification");
            return None;
        }
    };

    Some(decoded.unwrap_or_else(|e| {
        warn!(name = %name, error = %e, "Malformed notification");
        SessionEvent::Error {
            message: format!("Malformed {name}: {e}"),
        }
    }))
}

fn text_message(record: &Record) -> Result<TextMessage, CodecError> {
    let code: u32 = record.parse_field("targetmode")?;
    let target_mode = TargetMode::from_code(code).ok_or_else(|| CodecError::InvalidField {
        key: "targetmode".into(),
        value: code.to_string(),
    })?;

    Ok(TextMessage {
        target_mode,
        invoker_id: ClientId::new(record.parse_field("invokerid")?),
        invoker_name: record.get("invokername").unwrap_or_default().to_string(),
        text: record.require("msg")?.to_string(),
    })
}

fn client_entered(record: &Record) -> Result<ClientEntered, CodecError> {
    Ok(ClientEntered {
        client_id: ClientId::new(record.parse_field("clid")?),
        channel_id: ChannelId::new(record.parse_field("ctid")?),
        nickname: record.get("client_nickname").unwrap_or_default().to_string(),
        client_type: ClientType::from_code(record.parse_optional("client_type").unwrap_or(0)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeServer;

    const TIMEOUT: Duration = Duration::from_secs(2);

    async fn open(server: &FakeServer) -> (QueryConnection, mpsc::UnboundedReceiver<SessionEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let connection = QueryConnection::open("127.0.0.1", server.port(), TIMEOUT, TIMEOUT, tx)
            .await
            .unwrap();
        (connection, rx)
    }

    #[test]
    fn test_text_message_notification() {
        let record = Record::parse("targetmode=1 msg=!protect\\splease target=7 invokerid=12 invokername=alice");
        let event = notification_event("notifytextmessage", &record).unwrap();

        assert_eq!(
            event,
            SessionEvent::TextMessage(TextMessage {
                target_mode: TargetMode::Client,
                invoker_id: ClientId::new(12),
                invoker_name: "alice".into(),
                text: "!protect please".into(),
            })
        );
    }

    #[test]
    fn test_client_enter_notification() {
        let record = Record::parse("cfid=0 ctid=3 reasonid=0 clid=15 client_nickname=bob client_type=0");
        let event = notification_event("notifycliententerview", &record).unwrap();

        assert_eq!(
            event,
            SessionEvent::ClientConnected(ClientEntered {
                client_id: ClientId::new(15),
                channel_id: ChannelId::new(3),
                nickname: "bob".into(),
                client_type: ClientType::Voice,
            })
        );
    }

    #[test]
    fn test_malformed_and_unknown_notifications() {
        let bad = Record::parse("targetmode=9 msg=x invokerid=1");
        assert!(matches!(
            notification_event("notifytextmessage", &bad),
            Some(SessionEvent::Error { .. })
        ));

        let left = Record::parse("cfid=1 ctid=0 reasonid=8 clid=4");
        assert_eq!(notification_event("notifyclientleftview", &left), None);
    }

    #[tokio::test]
    async fn test_execute_collects_records() {
        let server = FakeServer::start().await;
        let (connection, _events) = open(&server).await;

        let records = connection.execute(&Command::new("clientlist").option("-times")).await.unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[1].get("client_nickname"), Some("alice"));
        assert_eq!(server.commands(), vec!["clientlist -times".to_string()]);
    }

    #[tokio::test]
    async fn test_execute_reports_server_error() {
        let server = FakeServer::start().await;
        let (connection, _events) = open(&server).await;

        let result = connection.execute(&Command::new("clientinfo").arg("clid", 99)).await;
        assert!(matches!(result, Err(SessionError::Command { id: 512, .. })));
    }

    #[tokio::test]
    async fn test_notifications_become_events() {
        let server = FakeServer::start().await;
        let (_connection, mut events) = open(&server).await;

        server.push("notifytextmessage targetmode=1 msg=hi invokerid=9 invokername=carol");
        let event = tokio::time::timeout(TIMEOUT, events.recv()).await.unwrap().unwrap();
        assert!(matches!(event, SessionEvent::TextMessage(ref m) if m.text == "hi"));
    }

    #[tokio::test]
    async fn test_eof_emits_connection_lost() {
        let server = FakeServer::start().await;
        let (connection, mut events) = open(&server).await;

        server.disconnect();
        let event = tokio::time::timeout(TIMEOUT, events.recv()).await.unwrap().unwrap();
        assert!(matches!(event, SessionEvent::ConnectionLost { .. }));
        assert!(!connection.is_alive());
        assert!(matches!(
            connection.execute(&Command::new("whoami")).await,
            Err(SessionError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn test_unanswered_command_drops_connection() {
        let server = FakeServer::start().await;
        let (tx, mut events) = mpsc::unbounded_channel();
        let connection = QueryConnection::open("127.0.0.1", server.port(), TIMEOUT, Duration::from_millis(100), tx)
            .await
            .unwrap();

        let result = connection.execute(&Command::new("stall")).await;
        assert!(matches!(result, Err(SessionError::Protocol(_))));
        assert!(!connection.is_alive());

        let event = tokio::time::timeout(TIMEOUT, events.recv()).await.unwrap().unwrap();
        assert!(matches!(event, SessionEvent::ConnectionLost { ref reason } if reason.contains("stall")));

        // A late answer to the stalled command must not be taken as the next reply
        server.push("error id=0 msg=ok");
        assert!(matches!(
            connection.execute(&Command::new("whoami")).await,
            Err(SessionError::NotConnected)
        ));

        // Exactly one loss is reported
        let next = tokio::time::timeout(Duration::from_millis(200), events.recv()).await;
        assert!(matches!(next, Err(_) | Ok(None)));
    }

    #[tokio::test]
    async fn test_close_is_silent() {
        let server = FakeServer::start().await;
        let (connection, mut events) = open(&server).await;

        connection.close().await;
        drop(connection);

        let next = tokio::time::timeout(Duration::from_millis(200), events.recv()).await;
        assert!(matches!(next, Err(_) | Ok(None)));
    }

    #[tokio::test]
    async fn test_rejects_non_query_greeting() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let _ = socket.write_all(b"SSH-2.0-OpenSSH_9.6\r\n").await;
            tokio::time::sleep(Duration::from_secs(1)).await;
        });

        let (tx, _rx) = mpsc::unbounded_channel();
        let result = QueryConnection::open("127.0.0.1", port, TIMEOUT, TIMEOUT, tx).await;
        assert!(matches!(result, Err(SessionError::ConnectFailed(_))));
    }
}
