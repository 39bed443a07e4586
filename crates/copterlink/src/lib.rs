//! UDP link between flight-control code and a simulated multicopter.
//!
//! Each tick a background thread sends the current motor command to the
//! simulator and waits a bounded time for one telemetry datagram.
//!
//! # Crate Structure
//!
//! - [`wire`]: little-endian `f64` datagram codec
//! - [`transport`]: peer endpoint and the motor/telemetry socket pair
//! - [`control`]: the [`Multicopter`] control loop, config and telemetry sinks

/// Re-export wire codec.
pub mod wire {
    pub use copterlink_wire::*;
}

/// Re-export transport types.
pub mod transport {
    pub use copterlink_transport::*;
}

/// Re-export control loop types.
pub mod control {
    pub use copterlink_control::*;
}

pub use copterlink_control::{
    LatestTelemetry, LinkConfig, LinkError, LinkState, LinkStats, Multicopter, TelemetryFrame,
};
