use crate::DeviceResult;

/// Exception code raised by titles to name a thread.
///
/// It is always resumed silently and never reported as a title failure.
pub const THREAD_NAMING_EXCEPTION: u32 = 0x406D_1388;

/// Kind of a hardware notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    /// The execution state of the console changed.
    ExecStateChange,

    /// The title printed a debug string.
    DebugString,

    /// The title hit a failed assertion.
    AssertionFailed,

    /// The title raised an exception.
    Exception,

    /// The title hit a fatal error (RIP).
    Rip,

    /// A module was loaded.
    ModuleLoad,

    /// A module was unloaded.
    ModuleUnload,

    /// A thread stopped on a breakpoint.
    ExecutionBreak,

    /// Any other notification, ignored by the core.
    Other,
}

/// Execution state of a console.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecState {
    /// Waiting for a title to start.
    Pending,

    /// Waiting for a title to start, after a title reboot.
    PendingTitle,

    /// The console is rebooting.
    Rebooting,

    /// The console is rebooting into a title.
    RebootingTitle,

    /// The title is running.
    Running,

    /// The title is stopped.
    Stopped,
}

/// Module loaded on the console.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ModuleInfo {
    /// File name of the module (e.g., `default.xex`).
    pub name: String,

    /// Base address at which the module is loaded.
    pub base_addr: u32,

    /// Size of the loaded image.
    pub size: u32,
}

/// Exception details carried by an [EventKind::Exception] notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExceptionInfo {
    /// Exception code.
    pub code: u32,

    /// Address at which the exception was raised.
    pub address: u32,

    /// Whether this is the first chance given to the debugger.
    pub first_chance: bool,

    /// Whether execution cannot be continued past this exception.
    pub non_continuable: bool,
}

impl ExceptionInfo {
    /// Returns whether this exception should be surfaced as a title failure.
    pub const fn is_reportable(&self) -> bool {
        self.first_chance && self.code != THREAD_NAMING_EXCEPTION
    }
}

/// Trait implemented by notification payloads.
///
/// A payload may own native resources tied to a stopped thread. These are
/// released when the payload is dropped, so that ownership of the payload
/// determines when (and that only once) they are released.
pub trait EventInfo: Send + 'static {
    /// Returns whether the thread that raised the notification is stopped.
    fn is_thread_stopped(&self) -> bool;

    /// Returns the new execution state (for [EventKind::ExecStateChange]).
    fn exec_state(&self) -> Option<ExecState>;

    /// Returns the text of the notification (debug string, assertion, RIP).
    fn message(&self) -> Option<&str>;

    /// Returns the exception details (for [EventKind::Exception]).
    fn exception(&self) -> Option<ExceptionInfo>;

    /// Returns the module concerned by a load/unload notification.
    fn module(&self) -> Option<&ModuleInfo>;

    /// Returns the ID of the thread that raised the notification.
    fn thread_id(&self) -> Option<u32>;

    /// Returns the start address of the function at the top of the stopped
    /// thread's stack.
    fn top_frame_function(&self) -> DeviceResult<u32>;
}

/// Hardware notification delivered by a console.
#[derive(Debug)]
pub struct Notification<E> {
    /// Kind of the notification.
    pub kind: EventKind,

    /// Payload of the notification.
    pub event: E,
}

impl<E> Notification<E> {
    /// Creates a new notification.
    pub const fn new(kind: EventKind, event: E) -> Self {
        Self { kind, event }
    }
}

/// Receiving end of a console's notification channel.
///
/// Notifications are delivered one at a time, in the order the console
/// emitted them.
pub type NotificationReceiver<E> = tokio::sync::mpsc::UnboundedReceiver<Notification<E>>;

/// Sending end of a console's notification channel.
pub type NotificationSender<E> = tokio::sync::mpsc::UnboundedSender<Notification<E>>;
