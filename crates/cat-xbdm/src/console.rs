use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use cat_devkit::{
    Console, DebugTarget, DebuggerOwner, DeviceManager, DeviceResult, ModuleInfo,
    NotificationReceiver, NotificationSender, PdbSignature, RebootKind,
};

use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::connection::{Connection, Response, XBDM_PORT};
use crate::notification::{parse_notification, XbdmEvent};
use crate::params::Params;
use crate::pdb;

const COMMAND_TIMEOUT: Duration = Duration::from_secs(10);

/// Upper bound of debug information read from a module's image.
const MAX_DEBUG_DATA_LEN: u32 = 0x400;

/// Status returned by `isdebugger` when a debugger is registered.
const STATUS_DEBUGGER_PRESENT: u16 = 410;

/// Devkit transport speaking the XBDM protocol over TCP.
#[derive(Debug, Clone)]
pub struct XbdmManager {
    port: u16,
}

impl Default for XbdmManager {
    fn default() -> Self {
        Self { port: XBDM_PORT }
    }
}

impl XbdmManager {
    /// Creates a new manager, connecting to the default XBDM port.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new manager, connecting to the given port.
    pub fn with_port(port: u16) -> Self {
        Self { port }
    }
}

impl DeviceManager for XbdmManager {
    type Console = XbdmConsole;

    async fn open_console(&self, name_or_addr: &str) -> DeviceResult<Self::Console> {
        let control = Connection::connect(name_or_addr, self.port).await?;

        Ok(XbdmConsole {
            host: name_or_addr.to_owned(),
            port: self.port,
            control: tokio::sync::Mutex::new(Some(control)),
            notifier: Mutex::new(None),
            closed: AtomicBool::new(false),
        })
    }
}

struct Notifier {
    token: CancellationToken,
    task: JoinHandle<()>,
}

/// Handle to a console, speaking the XBDM protocol.
///
/// Commands are sent over a control connection, which is transparently
/// re-established after a failure (e.g., when the console reboots).
/// Notifications are received over a separate, dedicated connection.
pub struct XbdmConsole {
    host: String,
    port: u16,
    control: tokio::sync::Mutex<Option<Connection<TcpStream>>>,
    notifier: Mutex<Option<Notifier>>,
    closed: AtomicBool,
}

impl XbdmConsole {
    /// Sends a command over the control connection.
    async fn command(&self, command: &str) -> crate::Result<Response> {
        if self.closed.load(Ordering::Acquire) {
            return Err(crate::Error::HandleClosed);
        }

        let mut control = self.control.lock().await;

        if control.is_none() {
            tracing::debug!(host = %self.host, "reconnecting control channel");
            *control = Some(Connection::connect(&self.host, self.port).await?);
        }
        let Some(conn) = control.as_mut() else {
            return Err(crate::Error::ConnectionClosed);
        };

        match tokio::time::timeout(COMMAND_TIMEOUT, conn.send(command)).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(e @ crate::Error::Status(..))) => Err(e),
            Ok(Err(e)) => {
                *control = None;
                Err(e)
            }
            Err(_) => {
                *control = None;
                Err(crate::Error::Timeout(COMMAND_TIMEOUT))
            }
        }
    }

    /// Reads memory of the console.
    async fn read_memory(&self, addr: u32, len: u32) -> crate::Result<Vec<u8>> {
        let lines = self
            .command(&format!("getmem addr=0x{addr:08x} length=0x{len:x}"))
            .await?
            .into_lines();

        let mut data = Vec::with_capacity(len as usize);
        for line in lines {
            decode_hex_line(&line, &mut data)?;
        }

        if data.len() < len as usize {
            return Err(crate::Error::UnexpectedResponse(format!(
                "getmem returned {} bytes instead of {len}",
                data.len()
            )));
        }

        Ok(data)
    }

    async fn read_pdb_signature(&self, base: u32) -> crate::Result<Option<PdbSignature>> {
        let headers = self.read_memory(base, pdb::HEADERS_LEN).await?;
        let Some(dir) = pdb::debug_directory(&headers)? else {
            return Ok(None);
        };

        let dir_data = self
            .read_memory(base.wrapping_add(dir.rva), dir.size.min(MAX_DEBUG_DATA_LEN))
            .await?;
        let Some(cv) = pdb::codeview_entry(&dir_data)? else {
            return Ok(None);
        };

        let cv_data = self
            .read_memory(base.wrapping_add(cv.rva), cv.size.min(MAX_DEBUG_DATA_LEN))
            .await?;

        pdb::parse_codeview(&cv_data)
    }
}

impl DebugTarget for XbdmConsole {
    async fn debugger_owner(&self) -> DeviceResult<Option<DebuggerOwner>> {
        match self.command("isdebugger").await {
            Ok(_) => Ok(None),
            Err(crate::Error::Status(STATUS_DEBUGGER_PRESENT, message)) => {
                let params = Params::parse(&message);

                Ok(Some(DebuggerOwner {
                    name: params.get("name").unwrap_or_default().to_owned(),
                    user: params.get("user").map(str::to_owned),
                }))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn connect_as_debugger(&self, name: &str, force: bool) -> DeviceResult<()> {
        let user = std::env::var("USERNAME")
            .or_else(|_| std::env::var("USER"))
            .unwrap_or_else(|_| "cat".to_owned());

        let command = format!(
            "debugger connect{} name=\"{}\" user=\"{}\"",
            if force { " override" } else { "" },
            name.replace('"', ""),
            user.replace('"', ""),
        );

        self.command(&command).await?;
        Ok(())
    }

    async fn disconnect_as_debugger(&self) -> DeviceResult<()> {
        self.command("debugger disconnect").await?;
        Ok(())
    }

    async fn stop_on_module_load(&self, enable: bool) -> DeviceResult<()> {
        let command = if enable {
            "stopon modload"
        } else {
            "nostopon modload"
        };

        self.command(command).await?;
        Ok(())
    }

    async fn set_breakpoint(&self, addr: u32) -> DeviceResult<()> {
        self.command(&format!("break addr=0x{addr:08x}")).await?;
        Ok(())
    }

    async fn remove_breakpoint(&self, addr: u32) -> DeviceResult<()> {
        self.command(&format!("break addr=0x{addr:08x} clear")).await?;
        Ok(())
    }

    async fn remove_all_breakpoints(&self) -> DeviceResult<()> {
        self.command("break clearall").await?;
        Ok(())
    }

    async fn pdb_signature(&self, module_base: u32) -> DeviceResult<Option<PdbSignature>> {
        Ok(self.read_pdb_signature(module_base).await?)
    }

    async fn continue_thread(&self, thread_id: u32, exception: bool) -> DeviceResult<()> {
        let command = format!(
            "continue thread=0x{thread_id:08x}{}",
            if exception { " exception" } else { "" }
        );

        self.command(&command).await?;
        Ok(())
    }

    async fn go(&self) -> DeviceResult<()> {
        self.command("go").await?;
        Ok(())
    }
}

impl Console for XbdmConsole {
    type Event = XbdmEvent;

    async fn find_console(&self) -> DeviceResult<String> {
        match self.command("dbgname").await? {
            Response::Line(name) => Ok(name),
            response => Err(crate::Error::UnexpectedResponse(format!("{response:?}")).into()),
        }
    }

    async fn reboot(&self, kind: RebootKind) -> DeviceResult<()> {
        let command = match kind {
            RebootKind::Cold => "magicboot cold".to_owned(),
            RebootKind::Warm => "magicboot warm".to_owned(),
            RebootKind::Title(None) => "magicboot".to_owned(),
            RebootKind::Title(Some(title)) => {
                format!("magicboot title=\"{}\"", title.replace('"', ""))
            }
        };

        match self.command(&command).await {
            Ok(_) | Err(crate::Error::ConnectionClosed) => (),
            Err(e) => return Err(e.into()),
        }

        // the console drops every connection while rebooting
        *self.control.lock().await = None;

        Ok(())
    }

    async fn running_modules(&self) -> DeviceResult<Vec<ModuleInfo>> {
        let lines = self.command("modules").await?.into_lines();

        let modules = lines
            .iter()
            .map(String::as_str)
            .map(Params::parse)
            .filter_map(|params| {
                Some(ModuleInfo {
                    name: params.get("name")?.to_owned(),
                    base_addr: params.get_u32("base")?,
                    size: params.get_u32("size").unwrap_or_default(),
                })
            })
            .collect();

        Ok(modules)
    }

    async fn subscribe(&self) -> DeviceResult<NotificationReceiver<Self::Event>> {
        if self.closed.load(Ordering::Acquire) {
            return Err(crate::Error::HandleClosed.into());
        }

        let mut conn = Connection::connect(&self.host, self.port).await?;
        match conn.send("notify").await? {
            Response::Dedicated => (),
            response => {
                return Err(crate::Error::UnexpectedResponse(format!("{response:?}")).into());
            }
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let token = CancellationToken::new();
        let task = tokio::spawn(read_notifications(conn, tx, token.clone()));

        let previous = lock(&self.notifier).replace(Notifier { token, task });
        if let Some(previous) = previous {
            previous.token.cancel();
        }

        Ok(rx)
    }

    async fn unsubscribe(&self) -> DeviceResult<()> {
        let notifier = lock(&self.notifier).take();

        if let Some(notifier) = notifier {
            notifier.token.cancel();
            let _ = notifier.task.await;
        }

        Ok(())
    }

    async fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }

        let _ = self.unsubscribe().await;

        if let Some(mut conn) = self.control.lock().await.take() {
            let _ = tokio::time::timeout(Duration::from_secs(1), conn.send("bye")).await;
        }
    }
}

#[tracing::instrument(name = "Notifications", skip_all)]
async fn read_notifications(
    mut conn: Connection<TcpStream>,
    tx: NotificationSender<XbdmEvent>,
    token: CancellationToken,
) {
    loop {
        let line = tokio::select! {
            _ = token.cancelled() => break,
            line = conn.read_line() => line,
        };

        match line {
            Ok(line) => {
                tracing::debug!(%line, "notification");

                if tx.send(parse_notification(&line)).is_err() {
                    break;
                }
            }
            Err(e) => {
                tracing::debug!(error = %e, "notification channel closed");
                break;
            }
        }
    }
}

/// Decodes a line of hexadecimal bytes (as sent by `getmem`).
fn decode_hex_line(line: &str, out: &mut Vec<u8>) -> crate::Result<()> {
    let line = line.trim();

    if line.len() % 2 != 0 {
        return Err(crate::Error::UnexpectedResponse(line.to_owned()));
    }

    for i in (0..line.len()).step_by(2) {
        let byte = line.get(i..i + 2).unwrap_or_default();
        if byte == "??" {
            return Err(crate::Error::UnexpectedResponse(
                "memory is not readable".to_owned(),
            ));
        }

        let byte = u8::from_str_radix(byte, 16)
            .map_err(|_| crate::Error::UnexpectedResponse(line.to_owned()))?;
        out.push(byte);
    }

    Ok(())
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::decode_hex_line;

    #[test]
    fn hex_lines() {
        let mut data = Vec::new();
        decode_hex_line("4D5A9000", &mut data).unwrap();
        decode_hex_line("0300", &mut data).unwrap();
        assert_eq!(data, [0x4D, 0x5A, 0x90, 0x00, 0x03, 0x00]);

        assert!(decode_hex_line("4D5A??00", &mut data).is_err());
        assert!(decode_hex_line("4D5", &mut data).is_err());
    }
}
