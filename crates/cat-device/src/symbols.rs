use std::sync::Arc;

use cat_devkit::{Console, DebugTarget, DeviceManager, ModuleInfo, SymbolLookup};

use crate::device::{ConsoleOf, Device};
use crate::error::{Error, Result};
use crate::monitor::{ApiCall, Detach, DetachFuture, MonitorSession};
use crate::registry::Registry;

impl<M: DeviceManager, S: SymbolLookup> Device<M, S> {
    /// Monitors the calls of the function with the given symbol name.
    ///
    /// The function is looked up in every loaded module, and in every module
    /// loaded later on. `callback` is called each time one of its breakpoints
    /// is hit, until the returned session is disposed.
    ///
    /// Requires this device to be the console's debugger.
    #[tracing::instrument(name = "MonitorApi", skip(self, callback), fields(console = %self.inner.connect_to))]
    pub async fn monitor_api(
        &self,
        symbol: &str,
        callback: impl Fn(&ApiCall) + Send + Sync + 'static,
    ) -> Result<MonitorSession> {
        if symbol.is_empty() {
            return Err(Error::EmptySymbolName);
        }

        let mut registry = self.inner.registry.lock().await;

        if !self.is_debugger_attached().await {
            return Err(Error::DebuggerNotAttached);
        }

        let (session, created) = registry.add_session(symbol, Arc::new(callback));

        if created {
            tracing::debug!("new monitored symbol");

            if let Some(internal) = self.internal() {
                if let Err(e) = internal.stop_on_module_load(true).await {
                    self.note_failure(&e);
                    tracing::warn!(error = %e, "failed to stop on module loads");
                }

                self.resolve_symbol(&mut registry, &internal, symbol).await;
            }
        }

        drop(registry);

        let device = Arc::downgrade(&self.inner);
        let name = symbol.to_owned();
        let id = session.id;

        let detach: Detach = Box::new(move || {
            let detach: DetachFuture = Box::pin(async move {
                if let Some(inner) = device.upgrade() {
                    Device { inner }.stop_monitoring(&name, id).await;
                }
            });
            detach
        });

        Ok(MonitorSession::new(session, detach))
    }

    async fn stop_monitoring(&self, symbol: &str, session_id: u64) {
        let mut registry = self.inner.registry.lock().await;

        let Some(addrs) = registry.remove_session(symbol, session_id) else {
            return;
        };

        tracing::debug!(console = %self.inner.connect_to, symbol, "symbol not monitored anymore");

        let Some(internal) = self.internal() else {
            return;
        };

        for addr in addrs {
            if let Err(e) = internal.remove_breakpoint(addr).await {
                self.note_failure(&e);
                tracing::debug!(addr, error = %e, "failed to remove breakpoint");
            }
        }

        if registry.symbol_names().is_empty() && self.is_debugger_attached().await {
            if let Err(e) = internal.stop_on_module_load(false).await {
                self.note_failure(&e);
            }
        }
    }

    /// Resolves every monitored symbol again, from scratch.
    ///
    /// This is needed when the symbol files of the title changed.
    #[tracing::instrument(name = "RefreshSymbols", skip(self), fields(console = %self.inner.connect_to))]
    pub async fn refresh_symbols(&self) {
        let mut registry = self.inner.registry.lock().await;

        if !self.is_debugger_attached().await {
            return;
        }

        let Some(internal) = self.internal() else {
            return;
        };

        if let Err(e) = internal.remove_all_breakpoints().await {
            self.note_failure(&e);
            tracing::warn!(error = %e, "failed to clear breakpoints");
        }

        registry.reset();

        let symbols = registry.symbol_names();
        if symbols.is_empty() {
            return;
        }

        if let Err(e) = internal.stop_on_module_load(true).await {
            self.note_failure(&e);
        }

        for symbol in symbols {
            self.resolve_symbol(&mut registry, &internal, &symbol).await;
        }
    }

    /// Resolves a monitored symbol in every loaded module.
    ///
    /// Breakpoints already installed for this symbol are kept.
    pub async fn refresh_symbol(&self, symbol: &str) {
        let mut registry = self.inner.registry.lock().await;

        if !registry.is_monitored(symbol) || !self.is_debugger_attached().await {
            return;
        }

        if let Some(internal) = self.internal() {
            self.resolve_symbol(&mut registry, &internal, symbol).await;
        }
    }

    /// Looks up the address of a function within the module loaded at the
    /// given base address.
    pub async fn lookup_symbol_in_module(&self, symbol: &str, module_base: u32) -> Option<u32> {
        let internal = self.internal()?;

        let modules = match internal.running_modules().await {
            Ok(modules) => modules,
            Err(e) => {
                self.note_failure(&e);
                return None;
            }
        };

        let module = modules
            .into_iter()
            .find(|module| module.base_addr == module_base)?;

        self.lookup(&internal, symbol, &module).await
    }

    /// Installs the breakpoints of every monitored symbol found in a newly
    /// loaded module.
    pub(crate) async fn install_breakpoints(&self, module: &ModuleInfo) {
        let mut registry = self.inner.registry.lock().await;

        let Some(internal) = self.internal() else {
            return;
        };

        for symbol in registry.symbol_names() {
            if let Some(addr) = self.lookup(&internal, &symbol, module).await {
                self.install_breakpoint(&mut registry, &internal, addr, module, &symbol)
                    .await;
            }
        }
    }

    async fn resolve_symbol(&self, registry: &mut Registry, internal: &ConsoleOf<M>, symbol: &str) {
        let modules = match internal.running_modules().await {
            Ok(modules) => modules,
            Err(e) => {
                self.note_failure(&e);
                tracing::debug!(error = %e, "failed to list modules");
                return;
            }
        };

        for module in &modules {
            if let Some(addr) = self.lookup(internal, symbol, module).await {
                self.install_breakpoint(registry, internal, addr, module, symbol)
                    .await;
            }
        }
    }

    async fn install_breakpoint(
        &self,
        registry: &mut Registry,
        internal: &ConsoleOf<M>,
        addr: u32,
        module: &ModuleInfo,
        symbol: &str,
    ) {
        if !registry.register_breakpoint(addr, module.base_addr, symbol) {
            return;
        }

        tracing::debug!(
            symbol,
            module = %module.name,
            addr = format_args!("{addr:#010x}"),
            "breakpoint installed"
        );

        if let Err(e) = internal.set_breakpoint(addr).await {
            self.note_failure(&e);
            tracing::warn!(symbol, error = %e, "failed to set breakpoint");
        }
    }

    async fn lookup(&self, internal: &ConsoleOf<M>, symbol: &str, module: &ModuleInfo) -> Option<u32> {
        let signature = match internal.pdb_signature(module.base_addr).await {
            Ok(Some(signature)) => signature,
            Ok(None) => return None,
            Err(e) => {
                self.note_failure(&e);
                tracing::debug!(module = %module.name, error = %e, "failed to read PDB signature");
                return None;
            }
        };

        self.inner.symbols.lookup(symbol, module, &signature).await
    }
}
