//! Error types for the terminal gateway

use thiserror::Error;

/// Boxed error used to chain causes coming from the remote exec transport
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Main error type for terminal gateway operations
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Session parameters were rejected before any remote resource was allocated
    #[error("bad argument: {0}")]
    BadArgument(String),

    /// The remote exec handshake failed; the session never started
    #[error("failed to open exec stream to {target}: {source}")]
    TransportSetupFailed {
        /// Human readable target (namespace/pod/container)
        target: String,
        /// Underlying transport error
        #[source]
        source: BoxError,
    },

    /// The remote execution ended abnormally (non-success status)
    #[error("exec stream failed: {0}")]
    StreamFailed(String),

    /// The remote side or one of the local pipes went away mid-stream
    #[error("exec stream closed by peer: {0}")]
    StreamClosedByPeer(String),

    /// A client frame could not be parsed
    #[error("malformed frame: {0}")]
    MalformedFrame(String),

    /// The remote process did not confirm exit within the nudge budget
    #[error("remote process did not exit after {attempts} exit attempts")]
    ResourceTeardownAnomaly {
        /// Number of nudges that were attempted
        attempts: u32,
    },

    /// The client connection has already been closed
    #[error("connection closed")]
    ConnectionClosed,

    /// A write to the client connection did not finish before its deadline
    #[error("write to connection timed out")]
    WriteTimeout,

    /// Sending on the client connection failed
    #[error("connection error: {0}")]
    Connection(String),

    /// Configuration or cluster credential setup error
    #[error("configuration error: {0}")]
    Config(String),

    /// HTTP server failure
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a bad argument error with the given message
    pub fn bad_argument(msg: impl Into<String>) -> Self {
        Self::BadArgument(msg.into())
    }

    /// Create a transport setup error for the given target
    pub fn transport_setup(target: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::TransportSetupFailed {
            target: target.into(),
            source: source.into(),
        }
    }

    /// Create a stream failure with the given message
    pub fn stream_failed(msg: impl Into<String>) -> Self {
        Self::StreamFailed(msg.into())
    }

    /// Create a closed-by-peer error with the given message
    pub fn closed_by_peer(msg: impl Into<String>) -> Self {
        Self::StreamClosedByPeer(msg.into())
    }

    /// Create a malformed frame error with the given message
    pub fn malformed_frame(msg: impl Into<String>) -> Self {
        Self::MalformedFrame(msg.into())
    }

    /// Create a configuration error with the given message
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an internal error with the given message
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Whether the error was raised before any remote resource was touched
    pub fn is_rejection(&self) -> bool {
        matches!(self, Error::BadArgument(_) | Error::TransportSetupFailed { .. })
    }
}
