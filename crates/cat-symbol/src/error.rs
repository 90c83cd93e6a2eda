/// Error type of this crate.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Error from the [wholesym] crate.
    #[error(transparent)]
    Wholesym(#[from] wholesym::Error),

    /// File or directory access error.
    #[error("{0}: {1}")]
    File(std::path::PathBuf, std::io::Error),
}

/// Result type of this crate.
pub type Result<T> = core::result::Result<T, Error>;
