use cat_devkit::{
    DeviceError, DeviceResult, EventInfo, EventKind, ExceptionInfo, ExecState, ModuleInfo,
    Notification,
};

use crate::params::{trailing_value, Params};

/// Payload of a notification sent by XBDM.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct XbdmEvent {
    thread_id: Option<u32>,
    stopped: bool,
    exec_state: Option<ExecState>,
    message: Option<String>,
    exception: Option<ExceptionInfo>,
    module: Option<ModuleInfo>,
    break_addr: Option<u32>,
}

impl EventInfo for XbdmEvent {
    fn is_thread_stopped(&self) -> bool {
        self.stopped
    }

    fn exec_state(&self) -> Option<ExecState> {
        self.exec_state
    }

    fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    fn exception(&self) -> Option<ExceptionInfo> {
        self.exception
    }

    fn module(&self) -> Option<&ModuleInfo> {
        self.module.as_ref()
    }

    fn thread_id(&self) -> Option<u32> {
        self.thread_id
    }

    fn top_frame_function(&self) -> DeviceResult<u32> {
        // breakpoints are only set at function entry points
        self.break_addr
            .ok_or_else(|| DeviceError::Protocol("notification carries no break address".into()))
    }
}

/// Parses a line received on a notification channel.
pub fn parse_notification(line: &str) -> Notification<XbdmEvent> {
    let (verb, rest) = line.split_once(' ').unwrap_or((line, ""));
    let params = Params::parse(rest);

    let mut event = XbdmEvent {
        thread_id: params.get_u32("thread"),
        stopped: params.has("stop"),
        ..Default::default()
    };

    let kind = match verb.to_ascii_lowercase().as_str() {
        "execution" => {
            event.exec_state = parse_exec_state(rest.trim());
            EventKind::ExecStateChange
        }
        "debugstr" => {
            event.message = trailing_value(rest, "string").map(str::to_owned);
            EventKind::DebugString
        }
        "assert" => {
            event.message = trailing_value(rest, "string").map(str::to_owned);
            EventKind::AssertionFailed
        }
        "rip" => {
            event.message = trailing_value(rest, "string").map(str::to_owned);
            event.stopped = true;
            EventKind::Rip
        }
        "exception" => {
            event.exception = params.get_u32("code").map(|code| ExceptionInfo {
                code,
                address: params.get_u32("address").unwrap_or_default(),
                first_chance: params.has("first"),
                non_continuable: params.has("noncont"),
            });
            EventKind::Exception
        }
        "modload" | "modunload" => {
            event.module = params.get_u32("base").map(|base_addr| ModuleInfo {
                name: params.get("name").unwrap_or_default().to_owned(),
                base_addr,
                size: params.get_u32("size").unwrap_or_default(),
            });

            if verb.eq_ignore_ascii_case("modload") {
                EventKind::ModuleLoad
            } else {
                EventKind::ModuleUnload
            }
        }
        "break" => {
            event.break_addr = params.get_u32("addr");
            EventKind::ExecutionBreak
        }
        _ => EventKind::Other,
    };

    Notification::new(kind, event)
}

fn parse_exec_state(state: &str) -> Option<ExecState> {
    let state = match state {
        "started" => ExecState::Running,
        "stopped" => ExecState::Stopped,
        "pending" => ExecState::Pending,
        "pending_title" => ExecState::PendingTitle,
        "rebooting" => ExecState::Rebooting,
        "rebooting_title" => ExecState::RebootingTitle,
        _ => return None,
    };

    Some(state)
}

#[cfg(test)]
mod tests {
    use cat_devkit::{EventInfo, EventKind, ExecState};

    use super::parse_notification;

    #[test]
    fn execution_state() {
        let n = parse_notification("execution rebooting");
        assert_eq!(n.kind, EventKind::ExecStateChange);
        assert_eq!(n.event.exec_state(), Some(ExecState::Rebooting));
        assert!(!n.event.is_thread_stopped());

        let n = parse_notification("execution started");
        assert_eq!(n.event.exec_state(), Some(ExecState::Running));
    }

    #[test]
    fn debug_string() {
        let n = parse_notification("debugstr thread=0xf9000010 stop string=Loading level 3  ");
        assert_eq!(n.kind, EventKind::DebugString);
        assert_eq!(n.event.thread_id(), Some(0xF900_0010));
        assert!(n.event.is_thread_stopped());
        assert_eq!(n.event.message(), Some("Loading level 3  "));
    }

    #[test]
    fn module_load() {
        let n = parse_notification(
            r#"modload name="xam.xex" base=0x81000000 size=0x00200000 check=0x0 timestamp=0x0"#,
        );
        assert_eq!(n.kind, EventKind::ModuleLoad);

        let module = n.event.module().unwrap();
        assert_eq!(module.name, "xam.xex");
        assert_eq!(module.base_addr, 0x8100_0000);
        assert_eq!(module.size, 0x0020_0000);

        let n = parse_notification(r#"modunload name="xam.xex" base=0x81000000"#);
        assert_eq!(n.kind, EventKind::ModuleUnload);
        assert_eq!(n.event.module().map(|m| m.base_addr), Some(0x8100_0000));
    }

    #[test]
    fn exception() {
        let n = parse_notification(
            "exception code=0xc0000005 thread=0xf9000024 address=0x82001234 read=0x0 first stop",
        );
        assert_eq!(n.kind, EventKind::Exception);

        let exception = n.event.exception().unwrap();
        assert_eq!(exception.code, 0xC000_0005);
        assert_eq!(exception.address, 0x8200_1234);
        assert!(exception.first_chance);
        assert!(!exception.non_continuable);
        assert!(n.event.is_thread_stopped());
    }

    #[test]
    fn execution_break() {
        let n = parse_notification("break addr=0x82451000 thread=0xf9000024 stop");
        assert_eq!(n.kind, EventKind::ExecutionBreak);
        assert_eq!(n.event.top_frame_function().unwrap(), 0x8245_1000);

        let n = parse_notification("data addr=0x82451000 thread=0xf9000024 stop");
        assert_eq!(n.kind, EventKind::Other);
        assert!(n.event.top_frame_function().is_err());
    }
}
