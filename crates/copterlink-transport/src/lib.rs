//! Datagram transport for the multicopter control link.
//!
//! Owns the two unreliable sockets the link runs on:
//! - an ephemeral motor socket that sends actuation datagrams to the peer
//! - a telemetry socket bound to a fixed local port that the peer sends to
//!
//! Payloads are framed with [`copterlink_wire`]. Everything above this layer
//! deals in `f64` vectors only.

pub mod channel;
pub mod endpoint;
pub mod error;
mod socket;

pub use channel::{DatagramChannel, DEFAULT_RECEIVE_TIMEOUT};
pub use endpoint::Endpoint;
pub use error::{Result, TransportError};
