use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use copterlink_transport::{DatagramChannel, TransportError};
use tracing::{debug, error, info, trace, warn};

use crate::error::LinkError;
use crate::state::{LinkState, StateCell};
use crate::stats::StatsCounters;
use crate::telemetry::{TelemetryFrame, TelemetrySink};

// Log the first malformed datagram and then every Nth.
const FRAMING_LOG_EVERY: u64 = 100;

/// State shared between the owning [`Multicopter`](crate::Multicopter) and
/// its loop thread.
pub(crate) struct Shared {
    motors: Mutex<Vec<f64>>,
    halt: AtomicBool,
    pub(crate) state: StateCell,
    pub(crate) stats: StatsCounters,
    fault: Mutex<Option<LinkError>>,
    sink: Mutex<Box<dyn TelemetrySink>>,
    // Weak so that dropping the loop's handle really releases the sockets.
    channel: Mutex<Weak<DatagramChannel>>,
    next_sequence: AtomicU64,
}

impl Shared {
    pub(crate) fn new(motor_count: usize, sink: Box<dyn TelemetrySink>) -> Self {
        Self {
            motors: Mutex::new(vec![0.0; motor_count]),
            halt: AtomicBool::new(false),
            state: StateCell::new(LinkState::Stopped),
            stats: StatsCounters::default(),
            fault: Mutex::new(None),
            sink: Mutex::new(sink),
            channel: Mutex::new(Weak::new()),
            next_sequence: AtomicU64::new(1),
        }
    }

    /// Replace the motor command in one step; readers never see a mix.
    pub(crate) fn store_motors(&self, values: &[f64]) {
        lock(&self.motors).copy_from_slice(values);
    }

    pub(crate) fn snapshot_motors(&self, dst: &mut Vec<f64>) {
        dst.clone_from(&lock(&self.motors));
    }

    pub(crate) fn request_halt(&self) {
        self.halt.store(true, Ordering::SeqCst);
    }

    pub(crate) fn clear_halt(&self) {
        self.halt.store(false, Ordering::SeqCst);
    }

    pub(crate) fn halt_requested(&self) -> bool {
        self.halt.load(Ordering::SeqCst)
    }

    pub(crate) fn record_fault(&self, err: LinkError) {
        *lock(&self.fault) = Some(err);
    }

    pub(crate) fn take_fault(&self) -> Option<LinkError> {
        lock(&self.fault).take()
    }

    pub(crate) fn replace_sink(&self, sink: Box<dyn TelemetrySink>) {
        *lock(&self.sink) = sink;
    }

    pub(crate) fn attach_channel(&self, channel: &Arc<DatagramChannel>) {
        *lock(&self.channel) = Arc::downgrade(channel);
    }

    /// Close the live channel, if any, from outside the loop thread.
    pub(crate) fn close_channel(&self) {
        let channel = lock(&self.channel).upgrade();
        if let Some(channel) = channel {
            channel.close();
        }
    }

    fn deliver(&self, values: Vec<f64>) {
        let sequence = self.next_sequence.fetch_add(1, Ordering::Relaxed);
        lock(&self.sink).deliver(TelemetryFrame::new(sequence, values));
    }
}

/// What to do with a failed receive.
#[derive(Debug)]
pub(crate) enum RecvDisposition {
    /// Drop the datagram and keep ticking.
    Discard(TransportError),
    /// End the session.
    Stop(TransportError),
}

pub(crate) fn classify_recv_error(err: TransportError) -> RecvDisposition {
    if err.is_fatal() {
        RecvDisposition::Stop(err)
    } else {
        RecvDisposition::Discard(err)
    }
}

/// The body of the loop thread for one session.
pub(crate) struct ControlLoop {
    shared: Arc<Shared>,
    channel: Arc<DatagramChannel>,
    receive_timeout: Duration,
    expected_telemetry_len: Option<usize>,
}

impl ControlLoop {
    pub(crate) fn new(
        shared: Arc<Shared>,
        channel: Arc<DatagramChannel>,
        receive_timeout: Duration,
        expected_telemetry_len: Option<usize>,
    ) -> Self {
        Self {
            shared,
            channel,
            receive_timeout,
            expected_telemetry_len,
        }
    }

    /// Tick until halted or faulted, then release the sockets.
    ///
    /// The bounded receive is the only place the thread blocks, so it also
    /// paces the loop.
    pub(crate) fn run(self) {
        let ControlLoop {
            shared,
            channel,
            receive_timeout,
            expected_telemetry_len,
        } = self;

        info!(motor_addr = %channel.motor_addr(), "control loop running");
        let mut motors = Vec::with_capacity(channel.motor_count());

        let outcome = loop {
            if shared.halt_requested() {
                break Ok(());
            }

            // Actuation goes out every tick, telemetry or not.
            shared.snapshot_motors(&mut motors);
            match channel.send_motors(&motors) {
                Ok(true) => shared.stats.motor_sent(),
                Ok(false) => shared.stats.motor_dropped(),
                Err(err) => break Err(err),
            }

            match channel.receive_telemetry(receive_timeout) {
                Ok(Some(values)) => {
                    if let Some(expected) = expected_telemetry_len {
                        if values.len() != expected {
                            shared.stats.frame_rejected();
                            debug!(
                                expected,
                                actual = values.len(),
                                "dropping telemetry frame of unexpected length"
                            );
                            continue;
                        }
                    }
                    shared.stats.frame_received();
                    shared.deliver(values);
                }
                Ok(None) => {
                    shared.stats.receive_timeout();
                    trace!("no telemetry within timeout");
                }
                Err(err) => match classify_recv_error(err) {
                    RecvDisposition::Discard(err) => {
                        let count = shared.stats.framing_error();
                        if count == 1 || count % FRAMING_LOG_EVERY == 0 {
                            warn!(%err, count, "discarding malformed telemetry datagram");
                        }
                    }
                    RecvDisposition::Stop(err) => break Err(err),
                },
            }
        };

        shared.state.set(LinkState::Halting);
        channel.close();
        drop(channel);

        match outcome {
            Ok(()) | Err(TransportError::Closed) if shared.halt_requested() => {
                info!(stats = ?shared.stats.snapshot(), "control loop stopped");
            }
            Ok(()) => info!("control loop stopped"),
            Err(err) => {
                error!(%err, "control loop fault; link halted");
                shared.record_fault(LinkError::Transport(err));
            }
        }

        shared.state.set(LinkState::Stopped);
    }
}

fn lock<T: ?Sized>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
