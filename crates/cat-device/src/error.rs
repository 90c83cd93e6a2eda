use std::path::PathBuf;
use std::time::Duration;

use cat_devkit::DeviceError;

use crate::state::ConnectionState;

/// Error type of this crate.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// The operation is not valid in the current connection state.
    #[error("operation not valid while {0}")]
    InvalidState(ConnectionState),

    /// The operation requires an attached debugger.
    #[error("no debugger attached")]
    DebuggerNotAttached,

    /// Symbol names must not be empty.
    #[error("empty symbol name")]
    EmptySymbolName,

    /// The console did not come back after a reboot.
    #[error("console did not come back within {0:?}")]
    RebootTimedOut(Duration),

    /// The XDK is not installed on this host.
    #[error("XEDK is missing from environment variables")]
    XdkNotFound,

    /// A required XDK tool is missing.
    #[error("{0}: tool not found")]
    MissingTool(PathBuf),

    /// An XDK tool could not be run.
    #[error("{0}: {1}")]
    Tool(PathBuf, std::io::Error),

    /// An XDK tool reported a failure.
    #[error("{0}: {1}")]
    ToolFailed(PathBuf, std::process::ExitStatus),

    /// Error from the devkit transport.
    #[error(transparent)]
    Device(#[from] DeviceError),
}

/// Result type of this crate.
pub type Result<T> = core::result::Result<T, Error>;
