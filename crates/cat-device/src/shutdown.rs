use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::Notify;

/// Process-wide deferred shutdown counter.
///
/// Background workers defer the shutdown while they run, so that the process
/// does not exit in the middle of an operation. A shutdown request is honored
/// once no deferral remains (see [wait_idle](Self::wait_idle)).
///
/// This is a cheaply cloneable handle: every clone refers to the same counter.
#[derive(Clone, Default)]
pub struct ShutdownSync {
    inner: Arc<ShutdownInner>,
}

#[derive(Default)]
struct ShutdownInner {
    state: Mutex<ShutdownState>,
    idle: Notify,
}

#[derive(Default)]
struct ShutdownState {
    deferrals: usize,
    requested: bool,
}

impl ShutdownSync {
    /// Creates a new counter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Defers the shutdown until a matching call to [allow](Self::allow).
    pub fn defer(&self) {
        self.state().deferrals += 1;
    }

    /// Removes a deferral.
    pub fn allow(&self) {
        let mut state = self.state();
        state.deferrals = state.deferrals.saturating_sub(1);

        if state.deferrals == 0 {
            if state.requested {
                tracing::debug!("no more shutdown deferral");
            }
            self.inner.idle.notify_waiters();
        }
    }

    /// Defers the shutdown until the returned guard is dropped.
    pub fn guard(&self) -> ShutdownGuard {
        self.defer();
        ShutdownGuard(self.clone())
    }

    /// Requests the shutdown of the process.
    ///
    /// Returns whether the shutdown can happen right away.
    pub fn request_shutdown(&self) -> bool {
        let mut state = self.state();
        state.requested = true;
        state.deferrals == 0
    }

    /// Returns whether a shutdown was requested.
    pub fn is_shutdown_requested(&self) -> bool {
        self.state().requested
    }

    /// Returns the number of outstanding deferrals.
    pub fn pending(&self) -> usize {
        self.state().deferrals
    }

    /// Waits until no deferral remains.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.inner.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.pending() == 0 {
                return;
            }

            notified.await;
        }
    }

    fn state(&self) -> MutexGuard<'_, ShutdownState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// Shutdown deferral, removed when dropped.
#[must_use = "the deferral is removed when the guard is dropped"]
pub struct ShutdownGuard(ShutdownSync);

impl Drop for ShutdownGuard {
    fn drop(&mut self) {
        self.0.allow();
    }
}
