use cat_devkit::DeviceError;

/// Error type of this crate.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// I/O error on an established connection.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Connection to the console could not be established.
    #[error("{0}: {1}")]
    Connect(String, std::io::Error),

    /// The console did not answer in time.
    #[error("no response from console after {0:?}")]
    Timeout(std::time::Duration),

    /// The connection was closed by the console.
    #[error("connection closed by console")]
    ConnectionClosed,

    /// The handle was closed by the caller.
    #[error("console handle closed")]
    HandleClosed,

    /// Error status returned by the console.
    #[error("status {0}: {1}")]
    Status(u16, String),

    /// The console sent something that does not follow the protocol.
    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),

    /// The console sent an overly long line.
    #[error("line exceeds {0} bytes")]
    LineTooLong(usize),

    /// Malformed binary data read from the console's memory.
    #[error(transparent)]
    Scroll(#[from] scroll::Error),
}

impl From<Error> for DeviceError {
    fn from(e: Error) -> Self {
        match e {
            Error::Io(_) | Error::Connect(..) | Error::Timeout(_) | Error::ConnectionClosed => {
                Self::Unreachable(e.to_string())
            }
            Error::HandleClosed => Self::Closed,
            Error::Status(code, message) => Self::Rejected { code, message },
            Error::UnexpectedResponse(_) | Error::LineTooLong(_) | Error::Scroll(_) => {
                Self::Protocol(e.to_string())
            }
        }
    }
}

/// Result type of this crate.
pub type Result<T> = core::result::Result<T, Error>;
