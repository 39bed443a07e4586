//! Control loop for a simulated multicopter.
//!
//! This is the layer flight-control code talks to. A [`Multicopter`] owns one
//! background thread that, every tick, sends the current motor command and
//! waits a bounded time for one telemetry frame.
//!
//! ```no_run
//! use std::time::Duration;
//!
//! use copterlink_control::{LatestTelemetry, LinkConfig, Multicopter};
//!
//! # fn main() -> copterlink_control::Result<()> {
//! let telemetry = LatestTelemetry::new();
//! let copter = Multicopter::new(LinkConfig::default())?
//!     .with_telemetry_sink(telemetry.clone())?;
//!
//! copter.start()?;
//! copter.set_motors(&[0.6; 4])?;
//! std::thread::sleep(Duration::from_secs(1));
//! copter.halt();
//! copter.join()?;
//! # Ok(())
//! # }
//! ```

pub mod config;
mod control_loop;
pub mod error;
pub mod multicopter;
pub mod state;
pub mod stats;
pub mod telemetry;

pub use config::{
    LinkConfig, DEFAULT_HOST, DEFAULT_MOTOR_COUNT, DEFAULT_MOTOR_PORT,
    DEFAULT_RECEIVE_TIMEOUT_MS, DEFAULT_TELEMETRY_PORT,
};
pub use error::{LinkError, Result};
pub use multicopter::Multicopter;
pub use state::LinkState;
pub use stats::LinkStats;
pub use telemetry::{ChannelSink, LatestTelemetry, NoopSink, TelemetryFrame, TelemetrySink};
