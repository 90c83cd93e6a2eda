//! This crate implements the debug session of CAT with a development console.
//!
//! A [Device] drives the whole life cycle of a session:
//! - Connecting and disconnecting in the background, observable through a
//!   [ConnectionState] watch channel.
//! - Registering as the console's debugger, and processing the console's
//!   notifications one at a time (debug output, title failures, module
//!   loads, breakpoints).
//! - Monitoring the calls of title functions by symbol name, with
//!   [MonitorSession]s sharing the breakpoints of a symbol.
//! - Recovering the session after a reboot of the console.
//!
//! The console itself is reached through the transport traits of
//! `cat-devkit`, and monitored functions are resolved through its
//! [SymbolLookup](cat_devkit::SymbolLookup) trait.
//!
//! # Example
//!
//! ```no_run
//! # use cat_devkit::{DeviceManager, SymbolLookup};
//! # async fn run<M: DeviceManager, S: SymbolLookup>(manager: M, symbols: S) -> cat_device::Result<()> {
//! use cat_device::DeviceBuilder;
//!
//! let device = DeviceBuilder::new()
//!     .with_manager(manager)
//!     .with_symbols(symbols)
//!     .build("192.168.1.20");
//!
//! device.connect(|_, success| println!("connected: {success}"))?;
//! device.start_monitoring_debug_output(|line| println!("{line}"));
//!
//! let mut status = device.subscribe_status();
//! status.wait_for(|state| state.is_connected()).await.ok();
//!
//! if device.connect_debugger(false).await {
//!     let session = device
//!         .monitor_api("XamShowMessageBoxUI", |call| {
//!             println!("{} called", call.symbol);
//!         })
//!         .await?;
//!
//!     // ...
//!
//!     session.dispose().await;
//!     device.disconnect_debugger().await;
//! }
//!
//! device.disconnect()?;
//! # Ok(())
//! # }
//! ```

mod builder;
mod config;
mod deferral;
mod device;
mod dispatch;
mod emulation;
mod error;
mod monitor;
mod reboot;
mod registry;
mod shutdown;
mod state;
mod symbols;

pub use self::builder::{Builder as DeviceBuilder, NeedsManager, NeedsSymbols, Ready};
pub use self::config::{DeviceConfig, RebootTimeoutPolicy};
pub use self::deferral::DisconnectDeferral;
pub use self::device::Device;
pub use self::dispatch::SuspendedEvent;
pub use self::emulation::{DiscEmulation, XDK_ENV_VAR};
pub use self::error::{Error, Result};
pub use self::monitor::{ApiCall, ApiCallback, MonitorSession};
pub use self::shutdown::{ShutdownGuard, ShutdownSync};
pub use self::state::ConnectionState;
