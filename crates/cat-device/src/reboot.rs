use std::future::Future;
use std::sync::Arc;

use cat_devkit::{Console, DebugTarget, DeviceManager, RebootKind, SymbolLookup};
use tokio::time::Instant;

use crate::config::RebootTimeoutPolicy;
use crate::device::Device;
use crate::error::{Error, Result};
use crate::state::ConnectionState;

impl<M: DeviceManager, S: SymbolLookup> Device<M, S> {
    /// Reboots the console (cold or warm).
    ///
    /// Nothing is done unless the console is connected and responding. It is
    /// marked as not responding as soon as this is called. If `wait` is set,
    /// the returned future also [waits for the console to come
    /// back](Self::wait_for_reboot_to_complete).
    pub fn reboot(&self, cold: bool, wait: bool) -> impl Future<Output = Result<()>> + Send + 'static {
        let kind = if cold { RebootKind::Cold } else { RebootKind::Warm };
        let accepted = self.begin_reboot();
        let this = self.clone();

        async move {
            if !accepted {
                return Ok(());
            }

            this.send_reboot(kind).await?;

            if wait {
                this.wait_for_reboot_to_complete().await?;
            }

            Ok(())
        }
    }

    /// Reboots the console into the development dashboard.
    ///
    /// The tracked disc emulation session, if any, is stopped beforehand.
    pub fn launch_dev_dashboard(&self) -> impl Future<Output = Result<()>> + Send + 'static {
        let accepted = self.begin_reboot();
        let this = self.clone();

        async move {
            if !accepted {
                return Ok(());
            }

            this.stop_disc_emulation().await?;
            this.send_reboot(RebootKind::Title(None)).await
        }
    }

    fn begin_reboot(&self) -> bool {
        self.status().is_responding() && self.inner.status.set_responding(false)
    }

    #[tracing::instrument(name = "Reboot", skip(self), fields(console = %self.inner.connect_to))]
    async fn send_reboot(&self, kind: RebootKind) -> Result<()> {
        let Some(internal) = self.internal() else {
            return Ok(());
        };

        if let Err(e) = internal.reboot(kind).await {
            self.note_failure(&e);
            return Err(e.into());
        }

        tracing::info!("console rebooting");
        Ok(())
    }

    /// Waits for the console to come back from a reboot, then restores the
    /// session (notifications, debugger, breakpoints).
    ///
    /// The connection callback is called with `true` once the console is
    /// back. If it does not come back in time, the configured
    /// [RebootTimeoutPolicy] applies.
    ///
    /// Fails with [Error::InvalidState] if the device disconnects meanwhile.
    #[tracing::instrument(name = "RebootWait", skip(self), fields(console = %self.inner.connect_to))]
    pub async fn wait_for_reboot_to_complete(&self) -> Result<()> {
        let config = &self.inner.config;
        let deadline = Instant::now() + config.reboot_timeout;

        tokio::time::sleep(config.reboot_settle_delay).await;
        self.ensure_connected()?;
        self.inner.status.set_responding(false);

        let back = self.probe().await || self.wait_until_back(deadline).await;
        self.ensure_connected()?;

        if !back {
            match config.reboot_timeout_policy {
                RebootTimeoutPolicy::Strict => {
                    return Err(Error::RebootTimedOut(config.reboot_timeout));
                }
                RebootTimeoutPolicy::BestEffort => {
                    tracing::warn!(timeout = ?config.reboot_timeout, "console did not come back in time");
                }
            }
        }

        self.inner.status.set_responding(true);

        match self.reconfigure().await {
            Ok(()) => (),
            Err(e @ Error::InvalidState(_)) => return Err(e),
            Err(e) => tracing::warn!(error = %e, "failed to restore the session"),
        }

        self.ensure_connected()?;

        tracing::info!("console back from reboot");
        self.notify_connect_complete(true);

        self.refresh_symbols().await;

        Ok(())
    }

    /// Polls the console until it is reachable and done booting.
    ///
    /// Returns `false` if the deadline elapsed, or if the device got
    /// disconnected.
    async fn wait_until_back(&self, deadline: Instant) -> bool {
        let config = &self.inner.config;

        if !self.poll_probe(deadline).await {
            return false;
        }

        tokio::time::sleep(config.reappear_delay).await;

        // it may go away again while booting
        if !self.poll_probe(deadline).await {
            return false;
        }

        // the boot animation may still be running
        loop {
            if Instant::now() >= deadline || !self.is_connected() {
                return false;
            }

            match self.running_processes().await {
                Ok(processes) if config.is_boot_complete(processes.iter().map(String::as_str)) => {
                    return true;
                }
                Ok(_) => (),
                Err(e) => tracing::debug!(error = %e, "failed to list processes"),
            }

            tokio::time::sleep(config.process_poll_interval).await;
        }
    }

    /// Probes the console until it answers.
    ///
    /// Returns `false` if the deadline elapsed, or if the device got
    /// disconnected.
    async fn poll_probe(&self, deadline: Instant) -> bool {
        loop {
            if Instant::now() >= deadline || !self.is_connected() {
                return false;
            }
            if self.probe().await {
                return true;
            }
            tokio::time::sleep(self.inner.config.probe_interval).await;
        }
    }

    fn ensure_connected(&self) -> Result<()> {
        match self.status() {
            ConnectionState::Connected { .. } => Ok(()),
            state => Err(Error::InvalidState(state)),
        }
    }

    async fn probe(&self) -> bool {
        match self.internal() {
            Some(internal) => internal.find_console().await.is_ok(),
            None => false,
        }
    }

    /// Reopens the debugging handle and restores its configuration.
    async fn reconfigure(&self) -> Result<()> {
        let _lifecycle = self.inner.lifecycle.lock().await;
        let debugger = self.inner.debugger.lock().await;

        // disconnected meanwhile
        if self.read_handles(|_| ()).is_none() {
            return Err(Error::InvalidState(self.status()));
        }

        let internal = Arc::new(self.inner.manager.open_console(&self.inner.connect_to).await?);

        let previous = self
            .write_handles()
            .as_mut()
            .map(|handles| std::mem::replace(&mut handles.internal, internal.clone()));

        let Some(previous) = previous else {
            internal.close().await;
            return Err(Error::InvalidState(self.status()));
        };

        if let Err(e) = previous.unsubscribe().await {
            tracing::debug!(error = %e, "failed to unsubscribe the previous handle");
        }
        previous.close().await;

        if debugger.attached {
            if let Err(e) = internal.disconnect_as_debugger().await {
                tracing::debug!(error = %e, "no stale debugger to clear");
            }

            internal
                .connect_as_debugger(&self.inner.config.debugger_name, true)
                .await?;
            internal.remove_all_breakpoints().await?;
            internal.stop_on_module_load(false).await?;
        }

        let events = internal.subscribe().await?;
        self.start_dispatch(events);

        Ok(())
    }
}
