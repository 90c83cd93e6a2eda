use std::fmt;

use cat_devkit::{
    DebugTarget, DeviceManager, EventInfo, EventKind, Notification, NotificationReceiver,
    SymbolLookup,
};
use tokio_util::sync::CancellationToken;

use crate::device::{lock, Device, EventOf};

/// Notification whose thread is kept stopped until it is handed back to
/// [Device::continue_execution].
///
/// Dropping it without continuing releases the notification, leaving the
/// thread stopped.
pub struct SuspendedEvent<E> {
    kind: EventKind,
    event: E,
}

impl<E: EventInfo> SuspendedEvent<E> {
    pub(crate) const fn new(kind: EventKind, event: E) -> Self {
        Self { kind, event }
    }

    /// Kind of the notification.
    pub const fn kind(&self) -> EventKind {
        self.kind
    }

    /// Payload of the notification.
    pub const fn event(&self) -> &E {
        &self.event
    }

    /// Short description of the failure (e.g., `Exception`).
    pub const fn failure_name(&self) -> &'static str {
        match self.kind {
            EventKind::AssertionFailed => "Assert",
            EventKind::Exception => "Exception",
            EventKind::Rip => "RIP",
            _ => "Event",
        }
    }
}

impl<E: fmt::Debug> fmt::Debug for SuspendedEvent<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SuspendedEvent")
            .field("kind", &self.kind)
            .field("event", &self.event)
            .finish()
    }
}

impl<M: DeviceManager, S: SymbolLookup> Device<M, S> {
    /// Resumes the thread stopped by a title failure.
    ///
    /// Nothing is done if the thread is not stopped, or if this device is not
    /// the console's debugger anymore. Failures are logged.
    pub async fn continue_execution(&self, suspended: SuspendedEvent<EventOf<M>>) {
        self.resume(suspended.kind, suspended.event).await;
    }

    /// Starts processing the notifications of a new subscription, stopping
    /// the processing of the previous one.
    pub(crate) fn start_dispatch(&self, events: NotificationReceiver<EventOf<M>>) {
        let token = CancellationToken::new();

        if let Some(previous) = lock(&self.inner.dispatch).replace(token.clone()) {
            previous.cancel();
        }

        tokio::spawn(self.clone().dispatch_loop(events, token));
    }

    #[tracing::instrument(name = "DispatchLoop", skip_all, fields(console = %self.inner.connect_to))]
    async fn dispatch_loop(
        self,
        mut events: NotificationReceiver<EventOf<M>>,
        token: CancellationToken,
    ) {
        loop {
            let notification = tokio::select! {
                biased;

                () = token.cancelled() => break,

                notification = events.recv() => match notification {
                    Some(notification) => notification,
                    None => break,
                },
            };

            self.dispatch(notification).await;
        }

        tracing::debug!("notification processing stopped");
    }

    async fn dispatch(&self, notification: Notification<EventOf<M>>) {
        let Notification { kind, event } = notification;

        self.mark_alive().await;

        match kind {
            EventKind::ExecStateChange => {
                tracing::debug!(state = ?event.exec_state(), "execution state changed");
            }
            EventKind::DebugString => self.on_debug_string(event).await,
            EventKind::AssertionFailed | EventKind::Exception | EventKind::Rip => {
                self.on_title_failure(kind, event).await;
            }
            EventKind::ModuleLoad => self.on_module_load(event).await,
            EventKind::ModuleUnload => self.on_module_unload(event).await,
            EventKind::ExecutionBreak => self.on_execution_break(event).await,
            EventKind::Other => (),
        }
    }

    /// Completes a pending connection, and marks the console as responding.
    async fn mark_alive(&self) {
        if self.status().is_connecting() {
            let connected = {
                let _lifecycle = self.inner.lifecycle.lock().await;
                self.inner.status.finish_connect()
            };

            if connected {
                tracing::info!("connected");
                self.notify_connect_complete(true);
            }
        }

        self.inner.status.set_responding(true);
    }

    async fn on_debug_string(&self, event: EventOf<M>) {
        let callback = lock(&self.inner.callbacks).debug_output.clone();

        if let Some(callback) = callback {
            let message = event.message().map(str::trim_end).unwrap_or_default();

            if !message.is_empty() {
                callback(message);
            }
        }

        self.resume(EventKind::DebugString, event).await;
    }

    async fn on_title_failure(&self, kind: EventKind, event: EventOf<M>) {
        if !self.is_debugger_attached().await {
            return;
        }

        let exception = event.exception();

        if let Some(exception) = exception {
            if !exception.is_reportable() {
                tracing::trace!(code = exception.code, "exception not reported");
                self.resume(kind, event).await;
                return;
            }
        }

        let callback = lock(&self.inner.callbacks).title_failure.clone();

        match callback {
            Some(callback) => {
                tracing::info!(?kind, thread = ?event.thread_id(), "title failure");
                callback(SuspendedEvent::new(kind, event));
            }
            None => self.resume(kind, event).await,
        }
    }

    async fn on_module_load(&self, event: EventOf<M>) {
        if !self.is_debugger_attached().await {
            return;
        }

        let module = event.module().cloned();

        if let Some(module) = module {
            tracing::debug!(module = %module.name, base = format_args!("{:#010x}", module.base_addr), "module loaded");
            self.install_breakpoints(&module).await;
        }

        self.resume(EventKind::ModuleLoad, event).await;
    }

    async fn on_module_unload(&self, event: EventOf<M>) {
        if !self.is_debugger_attached().await {
            return;
        }

        let module = event.module().cloned();

        if let Some(module) = module {
            let removed = self
                .inner
                .registry
                .lock()
                .await
                .unregister_module(module.base_addr);

            tracing::debug!(module = %module.name, breakpoints = removed, "module unloaded");
        }

        self.resume(EventKind::ModuleUnload, event).await;
    }

    async fn on_execution_break(&self, event: EventOf<M>) {
        if !self.is_debugger_attached().await {
            return;
        }

        // someone else's breakpoint
        if !self.inner.registry.lock().await.has_breakpoints() {
            return;
        }

        let function = match event.top_frame_function() {
            Ok(addr) => Some(addr),
            Err(e) => {
                tracing::debug!(error = %e, "failed to read the stopped function");
                None
            }
        };

        self.resume(EventKind::ExecutionBreak, event).await;

        let Some(function) = function else {
            return;
        };

        let subscribers = self.inner.registry.lock().await.subscribers_of(function);

        if let Some((call, sessions)) = subscribers {
            tracing::debug!(symbol = %call.symbol, sessions = sessions.len(), "monitored function called");

            for session in sessions {
                session.notify(&call);
            }
        }
    }

    /// Resumes the thread stopped by the given notification, if any.
    ///
    /// The notification is released once this returns.
    pub(crate) async fn resume(&self, kind: EventKind, event: EventOf<M>) {
        if !event.is_thread_stopped() {
            return;
        }

        let Some(thread_id) = event.thread_id() else {
            return;
        };

        let debugger = self.inner.debugger.lock().await;
        if !debugger.attached {
            return;
        }

        let Some(internal) = self.internal() else {
            return;
        };

        let result = match internal
            .continue_thread(thread_id, kind == EventKind::Exception)
            .await
        {
            Ok(()) => internal.go().await,
            Err(e) => Err(e),
        };

        drop(debugger);

        if let Err(e) = result {
            self.note_failure(&e);
            tracing::debug!(thread = thread_id, error = %e, "failed to resume");
        }
    }
}
