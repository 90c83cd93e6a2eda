//! This crate implements the devkit transport traits of `cat-devkit` on top
//! of the Xbox Debug Monitor (XBDM) protocol.
//!
//! XBDM is a line-oriented text protocol served by development consoles on
//! TCP port 730. Each command is answered by a status line (e.g., `200- OK`),
//! possibly followed by a multiline body terminated by a single `.` line.
//!
//! A [XbdmConsole] handle holds two connections to the console:
//! - A **control** connection, over which commands are sent one at a time.
//! - A **notification** connection, turned into a dedicated channel with the
//!   `notify` command, over which the console pushes its debug events.
//!
//! # Example
//!
//! ```no_run
//! use cat_devkit::{Console, DeviceManager};
//! use cat_xbdm::XbdmManager;
//!
//! # async fn run() -> cat_devkit::DeviceResult<()> {
//! let manager = XbdmManager::new();
//! let console = manager.open_console("192.168.1.20").await?;
//!
//! for module in console.running_modules().await? {
//!     println!("{} @ {:#010x}", module.name, module.base_addr);
//! }
//! # Ok(())
//! # }
//! ```

mod codec;
mod connection;
mod console;
mod error;
mod notification;
mod params;
mod pdb;

pub use self::codec::{StatusLine, XbdmDecoder};
pub use self::connection::{Connection, Response, XBDM_PORT};
pub use self::console::{XbdmConsole, XbdmManager};
pub use self::error::{Error, Result};
pub use self::notification::{parse_notification, XbdmEvent};
pub use self::params::Params;
