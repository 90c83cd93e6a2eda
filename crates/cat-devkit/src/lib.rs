//! This crate describes the native devkit transport that CAT drives, as a set
//! of traits.
//!
//! Three capabilities are consumed by the device core (`cat-device`):
//! - A [DeviceManager](self::console::DeviceManager), able to open handles to
//!   a console given its name or address.
//! - A [Console](self::console::Console) handle, which exposes connection-level
//!   operations (probing, rebooting, notifications) as well as the
//!   [DebugTarget](self::console::DebugTarget) operations of the console.
//! - A [SymbolLookup](self::symbol::SymbolLookup) store, resolving function
//!   symbols to runtime addresses within loaded modules.
//!
//! Every native call returns a [DeviceResult]. Errors for which
//! [DeviceError::is_unreachable] holds are **transient**: the console is
//! expected to come back, and callers are expected to treat them as
//! "not responding" rather than as a broken session.
//!
//! # Implementing a transport
//!
//! `cat-xbdm` implements these traits on top of the Xbox Debug Monitor TCP
//! protocol. Test doubles implement them in-memory.

/// Module containing the console and debug target traits.
pub mod console;

/// Module containing hardware notification types.
pub mod event;

/// Module containing the symbol store trait.
pub mod symbol;

mod error;

pub use self::console::{Console, DebugTarget, DebuggerOwner, DeviceManager, RebootKind};
pub use self::error::{DeviceError, DeviceResult};
pub use self::event::{EventInfo, EventKind, ExceptionInfo, ExecState, ModuleInfo};
pub use self::event::{Notification, NotificationReceiver, NotificationSender};
pub use self::symbol::{PdbSignature, SymbolLookup};
