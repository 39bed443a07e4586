use std::ffi::c_void;

use copterlink_control::{LatestTelemetry, LinkState, Multicopter};

#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopterResult {
    Ok = 0,
    InvalidArgument = 1,
    TransportError = 2,
    InvalidConfig = 3,
    MotorCountMismatch = 4,
    AlreadyRunning = 5,
    NoData = 6,
    BufferTooSmall = 7,
    NotStopped = 8,
    Internal = 99,
}

#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopterLinkState {
    Invalid = -1,
    Stopped = 0,
    Running = 1,
    Halting = 2,
}

impl From<LinkState> for CopterLinkState {
    fn from(state: LinkState) -> Self {
        match state {
            LinkState::Stopped => CopterLinkState::Stopped,
            LinkState::Running => CopterLinkState::Running,
            LinkState::Halting => CopterLinkState::Halting,
        }
    }
}

pub type CopterLinkHandle = *mut c_void;

pub(crate) struct LinkHandle {
    pub(crate) copter: Multicopter,
    pub(crate) telemetry: LatestTelemetry,
}
