use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Counters for one link session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LinkStats {
    /// Motor datagrams handed to the OS.
    pub motor_datagrams_sent: u64,
    /// Motor datagrams the OS refused to queue; the next tick resends.
    pub motor_datagrams_dropped: u64,
    /// Telemetry frames delivered to the sink.
    pub telemetry_frames_received: u64,
    /// Ticks that saw no telemetry within the receive timeout.
    pub receive_timeouts: u64,
    /// Datagrams dropped for not being a whole number of values.
    pub framing_errors: u64,
    /// Well-formed frames dropped for having the wrong length.
    pub rejected_frames: u64,
}

#[derive(Debug, Default)]
pub(crate) struct StatsCounters {
    motor_datagrams_sent: AtomicU64,
    motor_datagrams_dropped: AtomicU64,
    telemetry_frames_received: AtomicU64,
    receive_timeouts: AtomicU64,
    framing_errors: AtomicU64,
    rejected_frames: AtomicU64,
}

impl StatsCounters {
    pub(crate) fn reset(&self) {
        for counter in self.all() {
            counter.store(0, Ordering::Relaxed);
        }
    }

    pub(crate) fn snapshot(&self) -> LinkStats {
        LinkStats {
            motor_datagrams_sent: self.motor_datagrams_sent.load(Ordering::Relaxed),
            motor_datagrams_dropped: self.motor_datagrams_dropped.load(Ordering::Relaxed),
            telemetry_frames_received: self.telemetry_frames_received.load(Ordering::Relaxed),
            receive_timeouts: self.receive_timeouts.load(Ordering::Relaxed),
            framing_errors: self.framing_errors.load(Ordering::Relaxed),
            rejected_frames: self.rejected_frames.load(Ordering::Relaxed),
        }
    }

    pub(crate) fn motor_sent(&self) {
        self.motor_datagrams_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn motor_dropped(&self) {
        self.motor_datagrams_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn frame_received(&self) {
        self.telemetry_frames_received.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn receive_timeout(&self) {
        self.receive_timeouts.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns the running total, including this one.
    pub(crate) fn framing_error(&self) -> u64 {
        self.framing_errors.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub(crate) fn frame_rejected(&self) {
        self.rejected_frames.fetch_add(1, Ordering::Relaxed);
    }

    fn all(&self) -> [&AtomicU64; 6] {
        [
            &self.motor_datagrams_sent,
            &self.motor_datagrams_dropped,
            &self.telemetry_frames_received,
            &self.receive_timeouts,
            &self.framing_errors,
            &self.rejected_frames,
        ]
    }
}
