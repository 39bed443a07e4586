//! Telemetry frames and the hooks that receive them.
//!
//! The loop hands each decoded frame to exactly one [`TelemetrySink`], in
//! arrival order, with nothing queued in between. What the values mean is
//! agreed with the simulator out of band.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{SyncSender, TrySendError};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use serde::Serialize;

/// One telemetry datagram, decoded.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TelemetryFrame {
    /// Increases by one per delivered frame over the life of a link.
    pub sequence: u64,
    /// Vehicle state as sent by the peer.
    pub values: Vec<f64>,
}

impl TelemetryFrame {
    pub fn new(sequence: u64, values: Vec<f64>) -> Self {
        Self { sequence, values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Receives telemetry frames on the control loop thread.
///
/// `deliver` runs inline in the loop, so a slow sink delays the next motor
/// datagram. Hand off to another thread for anything heavy.
pub trait TelemetrySink: Send + 'static {
    fn deliver(&mut self, frame: TelemetryFrame);
}

impl<F> TelemetrySink for F
where
    F: FnMut(TelemetryFrame) + Send + 'static,
{
    fn deliver(&mut self, frame: TelemetryFrame) {
        self(frame)
    }
}

/// Discards every frame.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

impl TelemetrySink for NoopSink {
    fn deliver(&mut self, _frame: TelemetryFrame) {}
}

/// Forwards frames over a bounded channel without ever blocking the loop.
///
/// A frame that finds the channel full is dropped, so a consumer that falls
/// behind skips frames instead of stalling actuation. Use
/// `std::sync::mpsc::sync_channel(1)` to hold at most one pending frame.
///
/// Clones share the drop counter: keep one to read [`dropped`](Self::dropped)
/// after registering the other.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    sender: SyncSender<TelemetryFrame>,
    dropped: Arc<AtomicU64>,
}

impl ChannelSink {
    pub fn new(sender: SyncSender<TelemetryFrame>) -> Self {
        Self {
            sender,
            dropped: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Frames discarded because the consumer was behind.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl TelemetrySink for ChannelSink {
    fn deliver(&mut self, frame: TelemetryFrame) {
        match self.sender.try_send(frame) {
            Ok(()) => {}
            Err(TrySendError::Full(frame)) => {
                let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                tracing::trace!(
                    sequence = frame.sequence,
                    dropped,
                    "telemetry consumer behind; frame dropped"
                );
            }
            Err(TrySendError::Disconnected(_)) => {}
        }
    }
}

/// Pollable slot holding the most recent frame.
///
/// Clones share the slot: register one clone as the sink and read from
/// another.
#[derive(Debug, Clone, Default)]
pub struct LatestTelemetry {
    inner: Arc<(Mutex<Option<TelemetryFrame>>, Condvar)>,
}

impl LatestTelemetry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the newest frame, if any arrived yet.
    pub fn latest(&self) -> Option<TelemetryFrame> {
        self.slot().clone()
    }

    /// Take the newest frame, leaving the slot empty.
    pub fn take(&self) -> Option<TelemetryFrame> {
        self.slot().take()
    }

    /// Sequence number of the frame in the slot, or 0 when empty.
    pub fn sequence(&self) -> u64 {
        self.slot().as_ref().map_or(0, |frame| frame.sequence)
    }

    /// Block until a frame with sequence greater than `after` is available,
    /// or `timeout` elapses.
    pub fn wait_newer(&self, after: u64, timeout: Duration) -> Option<TelemetryFrame> {
        let deadline = Instant::now() + timeout;
        let (lock, cvar) = &*self.inner;
        let mut slot = lock.lock().unwrap_or_else(PoisonError::into_inner);

        loop {
            if let Some(frame) = slot.as_ref().filter(|frame| frame.sequence > after) {
                return Some(frame.clone());
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return None;
            }
            slot = cvar
                .wait_timeout(slot, remaining)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }

    fn slot(&self) -> MutexGuard<'_, Option<TelemetryFrame>> {
        self.inner.0.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl TelemetrySink for LatestTelemetry {
    fn deliver(&mut self, frame: TelemetryFrame) {
        *self.slot() = Some(frame);
        self.inner.1.notify_all();
    }
}
