use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use cat_devkit::{
    Console, DebugTarget, DeviceError, DeviceManager, DeviceResult, SymbolLookup,
};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::config::DeviceConfig;
use crate::deferral::{DeferralTarget, Deferrals, DisconnectDeferral};
use crate::dispatch::SuspendedEvent;
use crate::emulation::DiscEmulation;
use crate::error::{Error, Result};
use crate::registry::Registry;
use crate::shutdown::ShutdownSync;
use crate::state::{ConnectionState, StatusCell};

pub(crate) type ConsoleOf<M> = <M as DeviceManager>::Console;
pub(crate) type EventOf<M> = <ConsoleOf<M> as Console>::Event;

type ConnectCallback<M, S> = Arc<dyn Fn(&Device<M, S>, bool) + Send + Sync>;
pub(crate) type DebugOutputCallback = Arc<dyn Fn(&str) + Send + Sync>;
pub(crate) type TitleFailureCallback<E> = Arc<dyn Fn(SuspendedEvent<E>) + Send + Sync>;

/// Development console, driven through a debug session.
///
/// A device is a cheaply cloneable handle: every clone refers to the same
/// session. It is created with a [DeviceBuilder](crate::DeviceBuilder).
///
/// A device can only be connected once. Once disconnected, a new device must
/// be built to reconnect to the console.
pub struct Device<M: DeviceManager, S: SymbolLookup> {
    pub(crate) inner: Arc<Inner<M, S>>,
}

impl<M: DeviceManager, S: SymbolLookup> Clone for Device<M, S> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

pub(crate) struct Inner<M: DeviceManager, S: SymbolLookup> {
    pub connect_to: String,
    pub config: DeviceConfig,
    pub manager: M,
    pub symbols: S,
    pub shutdown: ShutdownSync,
    pub status: StatusCell,

    /// Serializes connection, disconnection, probing and reconfiguration.
    pub lifecycle: tokio::sync::Mutex<()>,

    pub handles: RwLock<Option<Handles<ConsoleOf<M>>>>,

    /// Must be acquired after `lifecycle` or `registry`, if held.
    pub debugger: tokio::sync::Mutex<DebuggerState>,

    pub registry: tokio::sync::Mutex<Registry>,
    pub callbacks: Mutex<Callbacks<M, S>>,
    pub deferrals: Mutex<Deferrals>,
    pub emulation: Mutex<Option<DiscEmulation>>,

    /// Stops the dispatch loop of the current subscription.
    pub dispatch: Mutex<Option<CancellationToken>>,
}

impl<M: DeviceManager, S: SymbolLookup> Inner<M, S> {
    pub fn new(
        connect_to: String,
        manager: M,
        symbols: S,
        config: DeviceConfig,
        shutdown: ShutdownSync,
    ) -> Self {
        Self {
            connect_to,
            config,
            manager,
            symbols,
            shutdown,
            status: StatusCell::new(),
            lifecycle: tokio::sync::Mutex::new(()),
            handles: RwLock::new(None),
            debugger: tokio::sync::Mutex::new(DebuggerState::default()),
            registry: tokio::sync::Mutex::new(Registry::default()),
            callbacks: Mutex::new(Callbacks::default()),
            deferrals: Mutex::new(Deferrals::default()),
            emulation: Mutex::new(None),
            dispatch: Mutex::new(None),
        }
    }
}

impl<M: DeviceManager, S: SymbolLookup> DeferralTarget for Inner<M, S> {
    fn allow_disconnect(self: Arc<Self>) {
        Device { inner: self }.allow_disconnect();
    }
}

/// Console handles of an established session.
pub(crate) struct Handles<C> {
    /// Handle used for debugging and notifications, reopened after reboots.
    pub internal: Arc<C>,

    /// Handle exposed to callers, kept for the whole session.
    pub module: Arc<C>,
}

/// Debugger attachment of a device.
#[derive(Debug, Default)]
pub(crate) struct DebuggerState {
    pub attached: bool,
    detach_ticket: Option<u64>,
    next_ticket: u64,
}

impl DebuggerState {
    /// Schedules a detach, unless one is already pending.
    fn schedule_detach(&mut self) -> Option<u64> {
        if !self.attached || self.detach_ticket.is_some() {
            return None;
        }

        self.next_ticket += 1;
        self.detach_ticket = Some(self.next_ticket);
        self.detach_ticket
    }

    fn cancel_detach(&mut self) {
        self.detach_ticket = None;
    }

    /// Returns whether the given scheduled detach is still wanted.
    fn take_detach(&mut self, ticket: u64) -> bool {
        if self.detach_ticket == Some(ticket) {
            self.detach_ticket = None;
            return true;
        }

        false
    }
}

pub(crate) struct Callbacks<M: DeviceManager, S: SymbolLookup> {
    pub connect_complete: Option<ConnectCallback<M, S>>,
    pub debug_output: Option<DebugOutputCallback>,
    pub title_failure: Option<TitleFailureCallback<EventOf<M>>>,
}

impl<M: DeviceManager, S: SymbolLookup> Default for Callbacks<M, S> {
    fn default() -> Self {
        Self {
            connect_complete: None,
            debug_output: None,
            title_failure: None,
        }
    }
}

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<M: DeviceManager, S: SymbolLookup> Device<M, S> {
    /// Name or address of the console.
    pub fn name(&self) -> &str {
        &self.inner.connect_to
    }

    /// Configuration of this device.
    pub fn config(&self) -> &DeviceConfig {
        &self.inner.config
    }

    /// Current connection state.
    pub fn status(&self) -> ConnectionState {
        self.inner.status.get()
    }

    /// Subscribes to the connection state changes.
    pub fn subscribe_status(&self) -> watch::Receiver<ConnectionState> {
        self.inner.status.subscribe()
    }

    /// Returns whether the session is established.
    pub fn is_connected(&self) -> bool {
        self.status().is_connected()
    }

    /// Returns whether the console currently answers requests.
    pub fn is_responding(&self) -> bool {
        self.status().is_responding()
    }

    /// Returns the console handle of the established session.
    ///
    /// Unlike the handle used internally for debugging, this one is never
    /// reopened during the session.
    pub fn console(&self) -> Option<Arc<ConsoleOf<M>>> {
        self.read_handles(|handles| handles.module.clone())
    }

    /// Connects to the console in the background.
    ///
    /// `on_complete` is called with `false` if the console could not be
    /// reached, or with `true` once it sent its first notification. It is
    /// called again with `true` every time the console comes back from a
    /// reboot.
    ///
    /// Fails with [Error::InvalidState] if the device is not disconnected.
    pub fn connect(
        &self,
        on_complete: impl Fn(&Device<M, S>, bool) + Send + Sync + 'static,
    ) -> Result<()> {
        if !self.inner.status.begin_connect() {
            return Err(Error::InvalidState(self.status()));
        }

        lock(&self.inner.callbacks).connect_complete = Some(Arc::new(on_complete));

        let guard = self.inner.shutdown.guard();
        let this = self.clone();

        tokio::spawn(async move {
            let _guard = guard;
            this.connect_worker().await;
        });

        Ok(())
    }

    #[tracing::instrument(name = "Connect", skip(self), fields(console = %self.inner.connect_to))]
    async fn connect_worker(&self) {
        let lifecycle = self.inner.lifecycle.lock().await;

        match self.open_session().await {
            Ok(()) => tracing::debug!("waiting for the first notification"),
            Err(e) => {
                tracing::warn!(error = %e, "failed to connect");

                self.inner.status.fail_connect();
                drop(lifecycle);

                self.notify_connect_complete(false);
            }
        }
    }

    async fn open_session(&self) -> Result<()> {
        let internal = self.inner.manager.open_console(&self.inner.connect_to).await?;

        let module = match self.inner.manager.open_console(&self.inner.connect_to).await {
            Ok(module) => module,
            Err(e) => {
                internal.close().await;
                return Err(e.into());
            }
        };

        // stale registration from a previous run
        if let Err(e) = internal.disconnect_as_debugger().await {
            tracing::debug!(error = %e, "no stale debugger to clear");
        }

        let events = match internal.subscribe().await {
            Ok(events) => events,
            Err(e) => {
                internal.close().await;
                module.close().await;
                return Err(e.into());
            }
        };

        *self.write_handles() = Some(Handles {
            internal: Arc::new(internal),
            module: Arc::new(module),
        });

        self.start_dispatch(events);

        Ok(())
    }

    /// Disconnects from the console in the background.
    ///
    /// If a [DisconnectDeferral] is held, the disconnection is postponed until
    /// the last one is released. Calling this on a device that is not
    /// connected has no effect.
    ///
    /// Fails with [Error::MissingTool] if a tracked disc emulation cannot be
    /// stopped because its tool is gone. The session is then left untouched.
    pub fn disconnect(&self) -> Result<()> {
        if !lock(&self.inner.deferrals).request_disconnect() {
            tracing::debug!(console = %self.inner.connect_to, "disconnect deferred");
            return Ok(());
        }

        if matches!(
            self.status(),
            ConnectionState::Disconnected | ConnectionState::Disconnecting
        ) {
            return Ok(());
        }

        if let Some(tool) = lock(&self.inner.emulation).as_ref().map(DiscEmulation::tool_path) {
            if !tool.exists() {
                return Err(Error::MissingTool(tool));
            }
        }

        if !self.inner.status.begin_disconnect() {
            return Ok(());
        }

        let guard = self.inner.shutdown.guard();
        let this = self.clone();

        tokio::spawn(async move {
            let _guard = guard;
            this.disconnect_worker().await;
        });

        Ok(())
    }

    #[tracing::instrument(name = "Disconnect", skip(self), fields(console = %self.inner.connect_to))]
    async fn disconnect_worker(&self) {
        if let Err(e) = self.stop_disc_emulation().await {
            tracing::warn!(error = %e, "failed to stop disc emulation");
        }

        // let in-flight notifications be processed
        tokio::time::sleep(self.inner.config.disconnect_grace).await;

        let _lifecycle = self.inner.lifecycle.lock().await;

        {
            let mut debugger = self.inner.debugger.lock().await;
            if debugger.attached {
                self.release_debugger(&mut debugger).await;
            }
        }

        if let Some(token) = lock(&self.inner.dispatch).take() {
            token.cancel();
        }

        let handles = self.write_handles().take();

        if let Some(handles) = handles {
            if let Err(e) = handles.internal.unsubscribe().await {
                tracing::debug!(error = %e, "failed to unsubscribe");
            }

            handles.internal.close().await;
            handles.module.close().await;
        }

        self.inner.registry.lock().await.reset();
        self.inner.status.finish_disconnect();

        tracing::info!("disconnected");
    }

    /// Prevents the device from disconnecting until the returned lease is
    /// released.
    ///
    /// Releasing the last lease runs any disconnection requested meanwhile,
    /// which requires a Tokio runtime.
    pub fn defer_disconnect(&self) -> DisconnectDeferral {
        lock(&self.inner.deferrals).defer();
        self.inner.shutdown.defer();

        DisconnectDeferral::new(self.inner.clone())
    }

    fn allow_disconnect(&self) {
        self.inner.shutdown.allow();

        let replay = lock(&self.inner.deferrals).allow();
        if replay {
            tracing::debug!(console = %self.inner.connect_to, "running deferred disconnect");
            if let Err(e) = self.disconnect() {
                tracing::warn!(console = %self.inner.connect_to, error = %e, "deferred disconnect failed");
            }
        }
    }

    /// Probes whether the console answers requests.
    ///
    /// Returns `false` if the device is not connected.
    pub async fn verify_online(&self) -> bool {
        let _lifecycle = self.inner.lifecycle.lock().await;

        if !self.is_connected() {
            return false;
        }

        let responding = match self.internal() {
            Some(internal) => match internal.find_console().await {
                Ok(_) => true,
                Err(e) => {
                    tracing::debug!(console = %self.inner.connect_to, error = %e, "console not responding");
                    false
                }
            },
            None => false,
        };

        self.inner.status.set_responding(responding);
        responding
    }

    /// Registers this device as the debugger of the console.
    ///
    /// If another debugger is registered, this fails (returning `false`)
    /// unless `force` is set. This cancels any pending
    /// [disconnect_debugger](Self::disconnect_debugger).
    pub async fn connect_debugger(&self, force: bool) -> bool {
        let mut debugger = self.inner.debugger.lock().await;
        debugger.cancel_detach();

        if debugger.attached {
            return true;
        }

        if !self.is_connected() {
            return false;
        }

        let Some(internal) = self.internal() else {
            return false;
        };

        match self.attach(&internal, force).await {
            Ok(attached) => {
                debugger.attached = attached;
                attached
            }
            Err(e) => {
                self.note_failure(&e);
                tracing::warn!(console = %self.inner.connect_to, error = %e, "failed to attach debugger");
                false
            }
        }
    }

    async fn attach(&self, internal: &ConsoleOf<M>, force: bool) -> DeviceResult<bool> {
        let name = &self.inner.config.debugger_name;

        if !force {
            if let Some(owner) = internal.debugger_owner().await? {
                if owner.name != *name {
                    tracing::info!(
                        console = %self.inner.connect_to,
                        owner = %owner.name,
                        user = ?owner.user,
                        "console already has a debugger"
                    );
                    return Ok(false);
                }
            }
        }

        internal.connect_as_debugger(name, true).await?;
        tracing::debug!(console = %self.inner.connect_to, "debugger attached");

        Ok(true)
    }

    /// Unregisters this device as the debugger of the console, after a
    /// grace delay.
    ///
    /// Calling [connect_debugger](Self::connect_debugger) before the delay
    /// elapses cancels the detach.
    pub async fn disconnect_debugger(&self) {
        let Some(ticket) = self.inner.debugger.lock().await.schedule_detach() else {
            return;
        };

        let guard = self.inner.shutdown.guard();
        let this = self.clone();

        tokio::spawn(async move {
            let _guard = guard;

            tokio::time::sleep(this.inner.config.disconnect_grace).await;

            let _lifecycle = this.inner.lifecycle.lock().await;
            let mut debugger = this.inner.debugger.lock().await;

            if debugger.take_detach(ticket) {
                this.release_debugger(&mut debugger).await;
            }
        });
    }

    /// Returns whether this device is registered as the console's debugger.
    pub async fn is_debugger_attached(&self) -> bool {
        self.inner.debugger.lock().await.attached
    }

    async fn release_debugger(&self, debugger: &mut DebuggerState) {
        if let Some(internal) = self.internal() {
            if let Err(e) = internal.stop_on_module_load(false).await {
                self.note_failure(&e);
            }

            if let Err(e) = internal.disconnect_as_debugger().await {
                self.note_failure(&e);
                tracing::debug!(console = %self.inner.connect_to, error = %e, "failed to detach debugger");
            }
        }

        debugger.attached = false;
        debugger.cancel_detach();

        tracing::debug!(console = %self.inner.connect_to, "debugger detached");
    }

    /// Lists the processes (modules) running on the console.
    pub async fn running_processes(&self) -> Result<Vec<String>> {
        let internal = self
            .internal()
            .ok_or_else(|| Error::InvalidState(self.status()))?;

        match internal.running_modules().await {
            Ok(modules) => {
                self.inner.status.set_responding(true);
                Ok(modules.into_iter().map(|module| module.name).collect())
            }
            Err(e) => {
                self.note_failure(&e);
                Err(e.into())
            }
        }
    }

    /// Tracks a disc emulation session, stopped when the device disconnects.
    pub fn track_disc_emulation(&self, emulation: DiscEmulation) {
        *lock(&self.inner.emulation) = Some(emulation);
    }

    /// Stops the tracked disc emulation session, if any.
    pub async fn stop_disc_emulation(&self) -> Result<()> {
        let emulation = lock(&self.inner.emulation).take();

        match emulation {
            Some(emulation) => emulation.stop().await,
            None => Ok(()),
        }
    }

    /// Forwards the debug strings printed by the title to `callback`.
    ///
    /// This replaces any previous callback.
    pub fn start_monitoring_debug_output(&self, callback: impl Fn(&str) + Send + Sync + 'static) {
        lock(&self.inner.callbacks).debug_output = Some(Arc::new(callback));
    }

    /// Stops forwarding debug strings.
    pub fn stop_monitoring_debug_output(&self) {
        lock(&self.inner.callbacks).debug_output = None;
    }

    /// Hands the assertion failures, exceptions and RIPs of the title over to
    /// `callback`.
    ///
    /// The faulting thread stays stopped until the event is passed to
    /// [continue_execution](Self::continue_execution) (or dropped). Failures
    /// are only reported while this device is the console's debugger.
    ///
    /// This replaces any previous callback.
    pub fn start_monitoring_title_failures(
        &self,
        callback: impl Fn(SuspendedEvent<EventOf<M>>) + Send + Sync + 'static,
    ) {
        lock(&self.inner.callbacks).title_failure = Some(Arc::new(callback));
    }

    /// Stops reporting title failures, which are resumed from then on.
    pub fn stop_monitoring_title_failures(&self) {
        lock(&self.inner.callbacks).title_failure = None;
    }

    pub(crate) fn notify_connect_complete(&self, success: bool) {
        let callback = lock(&self.inner.callbacks).connect_complete.clone();

        if let Some(callback) = callback {
            callback(self, success);
        }
    }

    pub(crate) fn internal(&self) -> Option<Arc<ConsoleOf<M>>> {
        self.read_handles(|handles| handles.internal.clone())
    }

    pub(crate) fn read_handles<T>(&self, f: impl FnOnce(&Handles<ConsoleOf<M>>) -> T) -> Option<T> {
        self.inner
            .handles
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(f)
    }

    pub(crate) fn write_handles(
        &self,
    ) -> std::sync::RwLockWriteGuard<'_, Option<Handles<ConsoleOf<M>>>> {
        self.inner
            .handles
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Records a failed call to the console.
    pub(crate) fn note_failure(&self, error: &DeviceError) {
        if error.is_unreachable() && self.inner.status.set_responding(false) {
            tracing::info!(console = %self.inner.connect_to, error = %error, "console stopped responding");
        }
    }
}
