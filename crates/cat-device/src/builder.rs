use std::sync::Arc;

use cat_devkit::{DeviceManager, SymbolLookup};

use crate::config::DeviceConfig;
use crate::device::{Device, Inner};
use crate::shutdown::ShutdownSync;

/// Builder for [Device].
///
/// It allows to specify the transport used to reach the console, and the
/// symbol store used to resolve monitored functions.
///
/// ```no_run
/// # use cat_devkit::{DeviceManager, SymbolLookup};
/// # fn build<M: DeviceManager, S: SymbolLookup>(manager: M, symbols: S) {
/// use cat_device::{DeviceBuilder, DeviceConfig};
///
/// let device = DeviceBuilder::new()
///     .with_manager(manager)
///     .with_symbols(symbols)
///     .config(DeviceConfig::default())
///     .build("192.168.1.20");
/// # }
/// ```
pub struct Builder<S> {
    state: S,
}

impl Builder<NeedsManager> {
    /// Creates a device builder.
    pub const fn new() -> Self {
        Self {
            state: NeedsManager,
        }
    }

    /// Specifies the transport used to open handles to the console.
    pub fn with_manager<M: DeviceManager>(self, manager: M) -> Builder<NeedsSymbols<M>> {
        Builder {
            state: NeedsSymbols { manager },
        }
    }
}

impl Default for Builder<NeedsManager> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M: DeviceManager> Builder<NeedsSymbols<M>> {
    /// Specifies the symbol store used to resolve monitored functions.
    pub fn with_symbols<S: SymbolLookup>(self, symbols: S) -> Builder<Ready<M, S>> {
        Builder {
            state: Ready {
                manager: self.state.manager,
                symbols,
                config: DeviceConfig::default(),
                shutdown: ShutdownSync::new(),
            },
        }
    }
}

impl<M: DeviceManager, S: SymbolLookup> Builder<Ready<M, S>> {
    /// Overrides the default configuration.
    pub fn config(mut self, config: DeviceConfig) -> Self {
        self.state.config = config;
        self
    }

    /// Specifies the shutdown counter deferred by the device's background
    /// workers.
    ///
    /// By default, each device gets its own counter.
    pub fn shutdown(mut self, shutdown: ShutdownSync) -> Self {
        self.state.shutdown = shutdown;
        self
    }

    /// Builds the device, reachable at the given name or address.
    pub fn build(self, connect_to: impl Into<String>) -> Device<M, S> {
        let Ready {
            manager,
            symbols,
            config,
            shutdown,
        } = self.state;

        Device {
            inner: Arc::new(Inner::new(
                connect_to.into(),
                manager,
                symbols,
                config,
                shutdown,
            )),
        }
    }
}

/// Builder state: the transport must be specified.
pub struct NeedsManager;

/// Builder state: the symbol store must be specified.
pub struct NeedsSymbols<M> {
    manager: M,
}

/// Builder state: the device can be built.
pub struct Ready<M, S> {
    manager: M,
    symbols: S,
    config: DeviceConfig,
    shutdown: ShutdownSync,
}
