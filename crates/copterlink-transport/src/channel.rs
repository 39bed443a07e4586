use std::io::ErrorKind;
use std::net::{SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use bytes::BytesMut;
use copterlink_wire::{decode, encode_into, encoded_len};
use tracing::{debug, info, trace};

use crate::endpoint::Endpoint;
use crate::error::{Result, TransportError};
use crate::socket::{bind_reusable, shutdown_read};

/// Read timeout used by the reference peer setup.
pub const DEFAULT_RECEIVE_TIMEOUT: Duration = Duration::from_millis(1000);

// Large enough for any UDP payload, so nothing is silently truncated.
const RECV_BUFFER_SIZE: usize = 64 * 1024;

/// The motor and telemetry sockets for one link session.
///
/// All operations take `&self` so the channel can be shared behind an `Arc`:
/// the control loop sends and receives while another thread may [`close`]
/// it to cut a blocked receive short.
///
/// [`close`]: DatagramChannel::close
pub struct DatagramChannel {
    motor: UdpSocket,
    telemetry: UdpSocket,
    motor_addr: SocketAddr,
    motor_count: usize,
    send_buf: Mutex<BytesMut>,
    recv_buf: Mutex<Vec<u8>>,
    read_timeout: Mutex<Duration>,
    closed: AtomicBool,
}

impl DatagramChannel {
    /// Bind both sockets for `endpoint`.
    ///
    /// The motor socket takes an ephemeral port; the telemetry socket binds
    /// the endpoint's telemetry address. Both set `SO_REUSEADDR`.
    pub fn open(
        endpoint: &Endpoint,
        motor_count: usize,
        receive_timeout: Duration,
    ) -> Result<Self> {
        if receive_timeout.is_zero() {
            return Err(TransportError::InvalidTimeout);
        }

        let motor = bind_reusable(endpoint.motor_bind_addr())?;
        let telemetry_addr = endpoint.telemetry_bind_addr();
        let telemetry = bind_reusable(telemetry_addr)?;
        telemetry
            .set_read_timeout(Some(receive_timeout))
            .map_err(|e| TransportError::Bind {
                addr: telemetry_addr,
                source: e,
            })?;

        info!(
            %endpoint,
            telemetry_local = ?telemetry.local_addr().ok(),
            motor_count,
            timeout_ms = receive_timeout.as_millis() as u64,
            "datagram channel open"
        );

        Ok(Self {
            motor,
            telemetry,
            motor_addr: endpoint.motor_addr(),
            motor_count,
            send_buf: Mutex::new(BytesMut::with_capacity(encoded_len(motor_count))),
            recv_buf: Mutex::new(vec![0u8; RECV_BUFFER_SIZE]),
            read_timeout: Mutex::new(receive_timeout),
            closed: AtomicBool::new(false),
        })
    }

    /// Send one motor datagram.
    ///
    /// Fire-and-forget: a datagram the OS refuses to queue right now is
    /// dropped, since the next tick carries a fresher command anyway.
    /// Returns `Ok(true)` when the datagram was handed to the OS and
    /// `Ok(false)` when it was dropped. The caller is responsible for
    /// passing exactly `motor_count` values.
    pub fn send_motors(&self, values: &[f64]) -> Result<bool> {
        if self.is_closed() {
            return Err(TransportError::Closed);
        }

        let mut buf = lock(&self.send_buf);
        buf.clear();
        encode_into(values, &mut buf);

        loop {
            match self.motor.send_to(&buf, self.motor_addr) {
                Ok(_) => {
                    trace!(values = values.len(), to = %self.motor_addr, "motor datagram sent");
                    return Ok(true);
                }
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err)
                    if matches!(
                        err.kind(),
                        ErrorKind::WouldBlock | ErrorKind::ConnectionRefused
                    ) =>
                {
                    debug!(%err, "motor datagram dropped");
                    return Ok(false);
                }
                Err(err) => return Err(self.fault_or_closed(err, TransportError::Send)),
            }
        }
    }

    /// Wait up to `timeout` for one telemetry datagram.
    ///
    /// Returns `Ok(None)` when nothing arrived in time. A malformed datagram
    /// yields [`TransportError::Framing`] and leaves the channel usable.
    pub fn receive_telemetry(&self, timeout: Duration) -> Result<Option<Vec<f64>>> {
        if self.is_closed() {
            return Err(TransportError::Closed);
        }
        self.apply_read_timeout(timeout)?;

        let mut buf = lock(&self.recv_buf);
        loop {
            match self.telemetry.recv_from(&mut buf) {
                Ok((len, from)) => {
                    // A shutdown wake-up surfaces as an empty read.
                    if self.is_closed() {
                        return Err(TransportError::Closed);
                    }
                    trace!(len, %from, "telemetry datagram");
                    return Ok(Some(decode(&buf[..len])?));
                }
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if is_no_data(err.kind()) => {
                    if self.is_closed() {
                        return Err(TransportError::Closed);
                    }
                    if !matches!(err.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) {
                        debug!(%err, "ignoring transient receive error");
                    }
                    return Ok(None);
                }
                Err(err) => return Err(self.fault_or_closed(err, TransportError::Receive)),
            }
        }
    }

    /// Close the channel. Idempotent and callable from any thread.
    ///
    /// A receive blocked on another thread returns [`TransportError::Closed`]
    /// right away where the OS supports waking it, otherwise at its read
    /// timeout. The sockets themselves are released when the channel drops.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        shutdown_read(&self.telemetry);
        info!(motor_addr = %self.motor_addr, "datagram channel closed");
    }

    /// Whether [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Peer address motor datagrams go to.
    pub fn motor_addr(&self) -> SocketAddr {
        self.motor_addr
    }

    /// Number of motor values this channel was opened for.
    pub fn motor_count(&self) -> usize {
        self.motor_count
    }

    /// Local address of the motor socket.
    pub fn motor_local_addr(&self) -> Result<SocketAddr> {
        self.motor.local_addr().map_err(TransportError::Send)
    }

    /// Local address of the telemetry socket; useful when bound to port 0.
    pub fn telemetry_local_addr(&self) -> Result<SocketAddr> {
        self.telemetry.local_addr().map_err(TransportError::Receive)
    }

    fn apply_read_timeout(&self, timeout: Duration) -> Result<()> {
        if timeout.is_zero() {
            return Err(TransportError::InvalidTimeout);
        }
        let mut current = lock(&self.read_timeout);
        if *current != timeout {
            self.telemetry
                .set_read_timeout(Some(timeout))
                .map_err(TransportError::Receive)?;
            *current = timeout;
        }
        Ok(())
    }

    fn fault_or_closed(
        &self,
        err: std::io::Error,
        wrap: fn(std::io::Error) -> TransportError,
    ) -> TransportError {
        if self.is_closed() {
            TransportError::Closed
        } else {
            wrap(err)
        }
    }
}

impl std::fmt::Debug for DatagramChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatagramChannel")
            .field("motor_addr", &self.motor_addr)
            .field("telemetry", &self.telemetry.local_addr().ok())
            .field("motor_count", &self.motor_count)
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Kinds that mean "no telemetry this time" rather than a broken socket.
///
/// Some stacks report an ICMP port-unreachable for an earlier send as a
/// reset or refusal on the next receive.
fn is_no_data(kind: ErrorKind) -> bool {
    matches!(
        kind,
        ErrorKind::WouldBlock
            | ErrorKind::TimedOut
            | ErrorKind::ConnectionReset
            | ErrorKind::ConnectionRefused
    )
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
