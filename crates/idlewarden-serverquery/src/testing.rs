//! Scripted query server for tests

use std::sync::{Arc, Mutex};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

const OK: &str = "error id=0 msg=ok";

const CLIENTLIST: &str = "clid=7 cid=1 client_database_id=1 client_nickname=Warden client_type=1 client_idle_time=0\
|clid=8 cid=2 client_database_id=20 client_nickname=alice client_type=0 client_idle_time=700000\
|clid=9 cid=3 client_database_id=21 client_nickname=bob\\sthe\\sbuilder client_type=0 client_idle_time=1500";

const CHANNELLIST: &str = "cid=1 pid=0 channel_order=0 channel_name=Default\\sChannel total_clients=1\
|cid=3 pid=0 channel_order=1 channel_name=Lobby total_clients=1\
|cid=4 pid=3 channel_order=0 channel_name=Lobby\\sAnnex total_clients=0";

const SERVERINFO: &str = "virtualserver_unique_identifier=abc= virtualserver_name=Test\\sServer \
virtualserver_clientsonline=3 virtualserver_queryclientsonline=1 virtualserver_maxclients=32 virtualserver_port=9987";

const CLIENTINFO: &str = "cid=2 client_idle_time=700000 client_unique_identifier=P8vX\\/kqoN+8= \
client_nickname=alice client_version=3.6.2\\s[Build:\\s1695203293] client_platform=Windows \
client_input_muted=0 client_database_id=20 client_created=1600000000 client_lastconnected=1700000000 \
client_is_recording=0 client_country=DE connection_client_ip=192.0.2.44";

enum Control {
    Push(String),
    Disconnect,
}

/// Accepts connections one after another and answers a fixed command set.
/// A `stall` command is never answered.
///
/// The bot is assigned client id 7 on the first connection, 8 on the
/// second, and so on.
pub(crate) struct FakeServer {
    port: u16,
    commands: Arc<Mutex<Vec<String>>>,
    control: mpsc::UnboundedSender<Control>,
    task: JoinHandle<()>,
}

impl FakeServer {
    pub(crate) async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let commands = Arc::new(Mutex::new(Vec::new()));
        let (control, mut control_rx) = mpsc::unbounded_channel();

        let log = commands.clone();
        let task = tokio::spawn(async move {
            let mut index = 0;
            while let Ok((socket, _)) = listener.accept().await {
                index += 1;
                serve(socket, index, &log, &mut control_rx).await;
            }
        });

        Self {
            port,
            commands,
            control,
            task,
        }
    }

    pub(crate) fn port(&self) -> u16 {
        self.port
    }

    /// Command lines received so far, without the login
    pub(crate) fn commands(&self) -> Vec<String> {
        self.commands.lock().unwrap().clone()
    }

    /// Send a raw line to the connected client
    pub(crate) fn push(&self, line: &str) {
        let _ = self.control.send(Control::Push(line.to_string()));
    }

    /// Close the current connection; the next one is accepted normally
    pub(crate) fn disconnect(&self) {
        let _ = self.control.send(Control::Disconnect);
    }
}

impl Drop for FakeServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn serve(
    socket: TcpStream,
    index: u32,
    log: &Mutex<Vec<String>>,
    control: &mut mpsc::UnboundedReceiver<Control>,
) {
    let (read, mut write) = socket.into_split();
    let mut lines = BufReader::new(read).lines();

    let greeting = "TS3\n\rWelcome to the TeamSpeak 3 ServerQuery interface, type \"help\" for a list of commands.\n\r";
    if write.write_all(greeting.as_bytes()).await.is_err() {
        return;
    }

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Ok(Some(line)) = line else {
                    return;
                };
                let line = line.trim().to_string();
                if line.is_empty() {
                    continue;
                }
                if !line.starts_with("login") {
                    log.lock().unwrap().push(line.clone());
                }
                if line == "quit" {
                    return;
                }
                if write.write_all(respond(&line, index).as_bytes()).await.is_err() {
                    return;
                }
            }
            control = control.recv() => match control {
                Some(Control::Push(line)) => {
                    let _ = write.write_all(format!("{line}\n\r").as_bytes()).await;
                }
                Some(Control::Disconnect) | None => return,
            }
        }
    }
}

fn respond(line: &str, index: u32) -> String {
    let name = line.split(' ').next().unwrap_or_default();

    let (data, error) = match name {
        "whoami" => (
            Some(format!(
                "virtualserver_status=online virtualserver_id=1 virtualserver_port=9987 client_id={} \
                 client_channel_id=1 client_nickname=Warden client_database_id=1 client_login_name=serveradmin",
                6 + index
            )),
            OK,
        ),
        "stall" => return String::new(),
        "clientlist" => (Some(CLIENTLIST.to_string()), OK),
        "channellist" => (Some(CHANNELLIST.to_string()), OK),
        "serverinfo" => (Some(SERVERINFO.to_string()), OK),
        "clientinfo" if line == "clientinfo clid=8" => (Some(CLIENTINFO.to_string()), OK),
        "clientinfo" => (None, "error id=512 msg=invalid\\sclientID"),
        "clientmove" if line.ends_with("cid=404") => (None, "error id=768 msg=invalid\\schannelID"),
        "login" if line.ends_with("client_login_password=wrong") => {
            (None, "error id=520 msg=invalid\\sloginname\\sor\\spassword")
        }
        "login" | "use" | "clientupdate" | "servernotifyregister" | "sendtextmessage"
        | "clientmove" | "version" => (None, OK),
        _ => (None, "error id=256 msg=command\\snot\\sfound"),
    };

    match data {
        Some(data) => format!("{data}\n\r{error}\n\r"),
        None => format!("{error}\n\r"),
    }
}
