use std::future::Future;

use crate::event::{EventInfo, ModuleInfo, NotificationReceiver};
use crate::symbol::PdbSignature;
use crate::DeviceResult;

/// Trait implementing the connection logic of a devkit transport.
pub trait DeviceManager: Send + Sync + 'static {
    /// Console handle returned by this manager.
    type Console: Console;

    /// Opens a new handle to the console with the given name or address.
    ///
    /// Each call returns an **independent** handle: closing one does not
    /// affect the others.
    fn open_console(
        &self,
        name_or_addr: &str,
    ) -> impl Future<Output = DeviceResult<Self::Console>> + Send;
}

/// Party currently registered as the debugger of a console.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DebuggerOwner {
    /// Debugger name.
    pub name: String,

    /// User (or host) that registered the debugger.
    pub user: Option<String>,
}

/// Kind of reboot requested to a console.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RebootKind {
    /// Full power cycle.
    Cold,

    /// Soft reboot of the running title.
    Warm,

    /// Reboot into the given title, or into the dashboard when `None`.
    Title(Option<String>),
}

/// Trait implementing the debugging operations of a console.
pub trait DebugTarget: Send + Sync + 'static {
    /// Returns the debugger currently registered on the console, if any.
    fn debugger_owner(&self) -> impl Future<Output = DeviceResult<Option<DebuggerOwner>>> + Send;

    /// Registers this handle as the debugger of the console.
    ///
    /// If `force` is set, any other registered debugger is evicted.
    fn connect_as_debugger(
        &self,
        name: &str,
        force: bool,
    ) -> impl Future<Output = DeviceResult<()>> + Send;

    /// Unregisters this handle as the debugger of the console.
    fn disconnect_as_debugger(&self) -> impl Future<Output = DeviceResult<()>> + Send;

    /// Enables or disables stopping the title whenever a module is loaded.
    fn stop_on_module_load(&self, enable: bool) -> impl Future<Output = DeviceResult<()>> + Send;

    /// Adds a breakpoint at the given address.
    fn set_breakpoint(&self, addr: u32) -> impl Future<Output = DeviceResult<()>> + Send;

    /// Removes the breakpoint at the given address.
    fn remove_breakpoint(&self, addr: u32) -> impl Future<Output = DeviceResult<()>> + Send;

    /// Removes every breakpoint of the console.
    fn remove_all_breakpoints(&self) -> impl Future<Output = DeviceResult<()>> + Send;

    /// Retrieves the PDB signature of the module loaded at the given base
    /// address.
    ///
    /// Returns `None` if the module carries no CodeView debug information.
    fn pdb_signature(
        &self,
        module_base: u32,
    ) -> impl Future<Output = DeviceResult<Option<PdbSignature>>> + Send;

    /// Resumes a stopped thread.
    ///
    /// `exception` must be set if the thread stopped on an exception.
    fn continue_thread(
        &self,
        thread_id: u32,
        exception: bool,
    ) -> impl Future<Output = DeviceResult<()>> + Send;

    /// Resumes the execution of the title.
    fn go(&self) -> impl Future<Output = DeviceResult<()>> + Send;
}

/// Trait implementing the connection-level operations of a console handle.
pub trait Console: DebugTarget {
    /// Payload of the notifications delivered by this console.
    type Event: EventInfo;

    /// Probes the console's reachability.
    ///
    /// Returns the console's name.
    fn find_console(&self) -> impl Future<Output = DeviceResult<String>> + Send;

    /// Reboots the console.
    fn reboot(&self, kind: RebootKind) -> impl Future<Output = DeviceResult<()>> + Send;

    /// Lists the modules currently loaded on the console.
    fn running_modules(&self) -> impl Future<Output = DeviceResult<Vec<ModuleInfo>>> + Send;

    /// Subscribes to the console's hardware notifications.
    ///
    /// A console has at most one subscription: subscribing again replaces the
    /// previous one, whose receiver is then closed.
    fn subscribe(
        &self,
    ) -> impl Future<Output = DeviceResult<NotificationReceiver<Self::Event>>> + Send;

    /// Cancels the current subscription, if any.
    fn unsubscribe(&self) -> impl Future<Output = DeviceResult<()>> + Send;

    /// Releases the native resources of this handle.
    ///
    /// Any call made on a closed handle fails with
    /// [DeviceError::Closed](crate::DeviceError::Closed).
    fn close(&self) -> impl Future<Output = ()> + Send;
}
