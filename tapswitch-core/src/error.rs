//! Error types for tapswitch

use thiserror::Error;

/// Result type alias for tapswitch operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for tapswitch
#[derive(Error, Debug)]
pub enum Error {
    /// Network I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// TLS configuration or handshake error
    #[error("TLS error: {0}")]
    Tls(String),

    /// Invalid upload bandwidth specification
    #[error("invalid upload bandwidth: {0}")]
    UploadBandwidth(String),

    /// Invalid download bandwidth specification
    #[error("invalid download bandwidth: {0}")]
    DownloadBandwidth(String),

    /// TAP interface creation or configuration error
    #[error("TAP interface error: {0}")]
    Tap(String),

    /// Transport error on a peer socket or the acceptor
    #[error("transport error: {0}")]
    Transport(String),

    /// Protocol violation by a peer
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Invalid configuration
    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Create a TAP error with a custom message
    pub fn tap<S: Into<String>>(msg: S) -> Self {
        Error::Tap(msg.into())
    }

    /// Create a transport error with a custom message
    pub fn transport<S: Into<String>>(msg: S) -> Self {
        Error::Transport(msg.into())
    }

    /// Create a protocol error with a custom message
    pub fn protocol<S: Into<String>>(msg: S) -> Self {
        Error::Protocol(msg.into())
    }

    /// Process exit code associated with this error.
    ///
    /// Startup failures carry their own codes; anything that surfaces while
    /// the bridge is running maps to the generic runtime code.
    pub fn exit_code(&self) -> u8 {
        match self {
            Error::Tls(_) => 2,
            Error::UploadBandwidth(_) => 3,
            Error::DownloadBandwidth(_) => 4,
            Error::Tap(_) => 5,
            _ => 7,
        }
    }
}
