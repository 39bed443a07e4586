use std::net::SocketAddr;

/// Errors that can occur in datagram transport operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The peer host name could not be resolved.
    #[error("failed to resolve {host}: {source}")]
    Resolve {
        host: String,
        source: std::io::Error,
    },

    /// The endpoint is unusable as configured.
    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),

    /// Failed to bind a local socket.
    #[error("failed to bind to {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        source: std::io::Error,
    },

    /// Hard fault while sending a motor datagram.
    #[error("motor send failed: {0}")]
    Send(std::io::Error),

    /// Hard fault while waiting for a telemetry datagram.
    #[error("telemetry receive failed: {0}")]
    Receive(std::io::Error),

    /// A received datagram was not a whole number of values.
    #[error(transparent)]
    Framing(#[from] copterlink_wire::WireError),

    /// Receive timeouts must be non-zero.
    #[error("receive timeout must be greater than zero")]
    InvalidTimeout,

    /// The channel has been closed.
    #[error("channel closed")]
    Closed,
}

impl TransportError {
    /// Whether the error ends the link session.
    ///
    /// Malformed datagrams are dropped and the session carries on; everything
    /// else means the sockets are gone or were never usable.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, TransportError::Framing(_))
    }
}

pub type Result<T> = std::result::Result<T, TransportError>;
