use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::Ordering;

use crate::registry::SessionState;

/// Call of a monitored function, detected by one of its breakpoints.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiCall {
    /// Name of the monitored symbol.
    pub symbol: String,

    /// Address of the breakpoint that was hit.
    pub address: u32,
}

/// Callback invoked when a monitored function is called.
pub type ApiCallback = Arc<dyn Fn(&ApiCall) + Send + Sync>;

pub(crate) type DetachFuture = Pin<Box<dyn Future<Output = ()> + Send>>;
pub(crate) type Detach = Box<dyn FnOnce() -> DetachFuture + Send + Sync>;

/// Subscription to the calls of a monitored function.
///
/// Many sessions may monitor the same symbol. The symbol (and its
/// breakpoints) stays monitored until its last session is disposed.
///
/// Dropping a session disposes it in the background, which requires a Tokio
/// runtime. Prefer [dispose](Self::dispose) when possible.
pub struct MonitorSession {
    state: Arc<SessionState>,
    detach: Option<Detach>,
}

impl MonitorSession {
    pub(crate) fn new(state: Arc<SessionState>, detach: Detach) -> Self {
        Self {
            state,
            detach: Some(detach),
        }
    }

    /// Name of the monitored symbol.
    pub fn symbol_name(&self) -> &str {
        &self.state.symbol.name
    }

    /// Returns whether the symbol was found in at least one loaded module.
    pub fn is_symbol_found(&self) -> bool {
        self.state.symbol.load_count() > 0
    }

    /// Returns whether the monitored function was called since this session
    /// was created (or since the last [clear_was_called](Self::clear_was_called)).
    pub fn was_called(&self) -> bool {
        self.state.was_called.load(Ordering::Acquire)
    }

    /// Resets the [was_called](Self::was_called) flag.
    pub fn clear_was_called(&self) {
        self.state.was_called.store(false, Ordering::Release);
    }

    /// Stops this session.
    ///
    /// If it was the last session of its symbol, the symbol's breakpoints are
    /// removed from the console.
    pub async fn dispose(mut self) {
        if let Some(detach) = self.detach.take() {
            detach().await;
        }
    }
}

impl Drop for MonitorSession {
    fn drop(&mut self) {
        let Some(detach) = self.detach.take() else {
            return;
        };

        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(detach());
            }
            Err(_) => tracing::warn!(
                symbol = %self.state.symbol.name,
                "monitor session dropped outside of a runtime"
            ),
        }
    }
}

impl fmt::Debug for MonitorSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MonitorSession")
            .field("symbol", &self.symbol_name())
            .field("found", &self.is_symbol_found())
            .field("was_called", &self.was_called())
            .finish()
    }
}
