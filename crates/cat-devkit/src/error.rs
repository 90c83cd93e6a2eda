/// Error returned by native devkit calls.
#[derive(thiserror::Error, Debug)]
pub enum DeviceError {
    /// The console could not be reached (network failure, reboot, power off).
    #[error("console unreachable: {0}")]
    Unreachable(String),

    /// The console handle was closed by the caller.
    #[error("console handle closed")]
    Closed,

    /// The console understood the request but refused it.
    #[error("console rejected request ({code}): {message}")]
    Rejected {
        /// Status code returned by the console.
        code: u16,

        /// Status message returned by the console.
        message: String,
    },

    /// The console answered with something the transport could not parse.
    #[error("protocol error: {0}")]
    Protocol(String),
}

impl DeviceError {
    /// Returns whether this error means the console is currently unreachable.
    ///
    /// Such errors are recoverable: the console is marked as not responding
    /// and the caller may retry or wait for it to come back.
    pub const fn is_unreachable(&self) -> bool {
        matches!(self, Self::Unreachable(_) | Self::Closed)
    }
}

/// Result type of native devkit calls.
pub type DeviceResult<T> = core::result::Result<T, DeviceError>;

#[cfg(test)]
mod tests {
    use super::DeviceError;

    #[test]
    fn unreachable_classification() {
        assert!(DeviceError::Unreachable("timed out".to_owned()).is_unreachable());
        assert!(DeviceError::Closed.is_unreachable());

        assert!(
            !DeviceError::Rejected {
                code: 402,
                message: "file not found".to_owned()
            }
            .is_unreachable()
        );
        assert!(!DeviceError::Protocol("garbage".to_owned()).is_unreachable());
    }
}
