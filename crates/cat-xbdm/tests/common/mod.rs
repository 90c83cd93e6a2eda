use std::sync::{Arc, Mutex};
use std::time::Duration;

use cat_xbdm::Params;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, WriteHalf};
use tokio::net::{TcpListener, TcpStream};

#[derive(Default)]
struct State {
    commands: Vec<String>,
    owner: Option<(String, String)>,
}

/// Scripted XBDM server listening on a local port.
pub struct FakeXbdm {
    port: u16,
    state: Arc<Mutex<State>>,
    notifier: Arc<tokio::sync::Mutex<Option<WriteHalf<TcpStream>>>>,
}

impl FakeXbdm {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let state = Arc::new(Mutex::new(State::default()));
        let notifier = Arc::new(tokio::sync::Mutex::new(None));

        tokio::spawn({
            let state = state.clone();
            let notifier = notifier.clone();

            async move {
                while let Ok((stream, _)) = listener.accept().await {
                    tokio::spawn(serve(stream, state.clone(), notifier.clone()));
                }
            }
        });

        Self {
            port,
            state,
            notifier,
        }
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn commands(&self) -> Vec<String> {
        self.state.lock().unwrap().commands.clone()
    }

    /// Pushes a line on the notification channel, once it is established.
    pub async fn notify(&self, line: &str) {
        for _ in 0..200 {
            if let Some(writer) = self.notifier.lock().await.as_mut() {
                writer.write_all(line.as_bytes()).await.unwrap();
                writer.write_all(b"\r\n").await.unwrap();
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        panic!("notification channel never established");
    }
}

async fn serve(
    stream: TcpStream,
    state: Arc<Mutex<State>>,
    notifier: Arc<tokio::sync::Mutex<Option<WriteHalf<TcpStream>>>>,
) {
    let (reader, mut writer) = tokio::io::split(stream);
    let mut lines = BufReader::new(reader).lines();

    writer.write_all(b"201- connected\r\n").await.unwrap();

    while let Ok(Some(cmd)) = lines.next_line().await {
        state.lock().unwrap().commands.push(cmd.clone());

        let (verb, rest) = cmd.split_once(' ').unwrap_or((cmd.as_str(), ""));

        let response = match verb {
            "dbgname" => "200- devkit-04\r\n".to_owned(),
            "modules" => concat!(
                "202- multiline response follows\r\n",
                "name=\"xboxkrnl.exe\" base=0x80040000 size=0x00140000 check=0x0\r\n",
                "name=\"default.xex\" base=0x82000000 size=0x00c40000 check=0x0\r\n",
                ".\r\n",
            )
            .to_owned(),
            "isdebugger" => {
                let owner = state.lock().unwrap().owner.clone();
                match owner {
                    Some((name, user)) => format!("410- name=\"{name}\" user=\"{user}\"\r\n"),
                    None => "200- no debugger\r\n".to_owned(),
                }
            }
            "debugger" if rest.starts_with("connect") => {
                let params = Params::parse(rest);
                state.lock().unwrap().owner = Some((
                    params.get("name").unwrap_or_default().to_owned(),
                    params.get("user").unwrap_or_default().to_owned(),
                ));
                "200- OK\r\n".to_owned()
            }
            "debugger" => {
                state.lock().unwrap().owner = None;
                "200- OK\r\n".to_owned()
            }
            "go" => "408- not stopped\r\n".to_owned(),
            "bye" => {
                let _ = writer.write_all(b"200- bye\r\n").await;
                return;
            }
            "notify" => {
                let mut slot = notifier.lock().await;
                writer
                    .write_all(b"205- now a notification channel\r\n")
                    .await
                    .unwrap();
                *slot = Some(writer);
                drop(slot);

                // wait for the client to hang up
                while let Ok(Some(_)) = lines.next_line().await {}
                *notifier.lock().await = None;
                return;
            }
            _ => "200- OK\r\n".to_owned(),
        };

        if writer.write_all(response.as_bytes()).await.is_err() {
            return;
        }
    }
}
