use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;

use copterlink_transport::{DatagramChannel, Endpoint};
use tracing::{debug, info, warn};

use crate::config::LinkConfig;
use crate::control_loop::{ControlLoop, Shared};
use crate::error::{LinkError, Result};
use crate::state::LinkState;
use crate::stats::LinkStats;
use crate::telemetry::{NoopSink, TelemetrySink};

const LOOP_THREAD_NAME: &str = "copterlink-loop";

/// Link to one simulated multicopter.
///
/// Owns the motor command and the background loop thread. The owning code
/// only ever talks to the loop through [`set_motors`](Self::set_motors),
/// [`halt`](Self::halt) and the telemetry sink registered before
/// [`start`](Self::start).
///
/// Every method takes `&self`, so a `Multicopter` can be shared between the
/// thread that commands motors and one that waits in [`join`](Self::join).
pub struct Multicopter {
    config: LinkConfig,
    endpoint: Endpoint,
    shared: Arc<Shared>,
    // Held across start and join so sessions never overlap.
    worker: Mutex<Option<JoinHandle<()>>>,
    telemetry_local: Mutex<Option<SocketAddr>>,
}

impl Multicopter {
    /// Validate `config` and resolve the peer. No sockets are opened yet.
    pub fn new(config: LinkConfig) -> Result<Self> {
        config.validate()?;
        let endpoint = config.endpoint()?;
        debug!(%endpoint, motor_count = config.motor_count, "link configured");

        Ok(Self {
            shared: Arc::new(Shared::new(config.motor_count, Box::new(NoopSink))),
            config,
            endpoint,
            worker: Mutex::new(None),
            telemetry_local: Mutex::new(None),
        })
    }

    /// Register the telemetry sink (builder form).
    pub fn with_telemetry_sink(self, sink: impl TelemetrySink) -> Result<Self> {
        self.set_telemetry_sink(sink)?;
        Ok(self)
    }

    /// Register the telemetry sink. Only allowed while stopped.
    pub fn set_telemetry_sink(&self, sink: impl TelemetrySink) -> Result<()> {
        let _worker = lock(&self.worker);
        self.ensure_stopped()?;
        self.shared.replace_sink(Box::new(sink));
        Ok(())
    }

    /// Open the sockets and launch the loop thread. Returns immediately.
    ///
    /// Bind failures are reported here and leave the link stopped. A link
    /// that stopped, for whatever reason, can be started again.
    pub fn start(&self) -> Result<()> {
        let mut worker = lock(&self.worker);
        self.ensure_stopped()?;
        if let Some(err) = reap(&mut worker, &self.shared) {
            warn!(%err, "discarding unobserved fault from previous session");
        }

        let channel = Arc::new(DatagramChannel::open(
            &self.endpoint,
            self.config.motor_count,
            self.config.receive_timeout(),
        )?);
        *lock(&self.telemetry_local) = channel.telemetry_local_addr().ok();

        self.shared.clear_halt();
        self.shared.stats.reset();
        self.shared.attach_channel(&channel);
        self.shared.state.set(LinkState::Running);

        let control_loop = ControlLoop::new(
            Arc::clone(&self.shared),
            Arc::clone(&channel),
            self.config.receive_timeout(),
            self.config.expected_telemetry_len,
        );
        drop(channel);

        let spawned = std::thread::Builder::new()
            .name(LOOP_THREAD_NAME.to_string())
            .spawn(move || control_loop.run());

        match spawned {
            Ok(handle) => {
                *worker = Some(handle);
                info!(endpoint = %self.endpoint, "link started");
                Ok(())
            }
            Err(err) => {
                // The closure, and with it the channel, was dropped by spawn.
                self.shared.state.set(LinkState::Stopped);
                Err(LinkError::Spawn(err))
            }
        }
    }

    /// Replace the motor command; the next tick sends it.
    ///
    /// Calls between two ticks coalesce: only the newest command goes out.
    pub fn set_motors(&self, values: &[f64]) -> Result<()> {
        if values.len() != self.config.motor_count {
            return Err(LinkError::MotorCountMismatch {
                expected: self.config.motor_count,
                actual: values.len(),
            });
        }
        self.shared.store_motors(values);
        Ok(())
    }

    /// Current motor command.
    pub fn motors(&self) -> Vec<f64> {
        let mut values = Vec::with_capacity(self.config.motor_count);
        self.shared.snapshot_motors(&mut values);
        values
    }

    /// Ask the loop to stop. Idempotent, never fails, fine before `start`.
    ///
    /// The loop notices at the top of its next tick, so this can take up to
    /// one receive timeout. Use [`halt_now`](Self::halt_now) to cut a blocked
    /// receive short.
    pub fn halt(&self) {
        self.shared.request_halt();
        if self.shared.state.transition(LinkState::Running, LinkState::Halting) {
            debug!("halt requested");
        }
    }

    /// Halt and close the channel from this thread, waking a blocked receive.
    pub fn halt_now(&self) {
        self.halt();
        self.shared.close_channel();
    }

    /// Wait for the loop thread to finish and report how the session ended.
    ///
    /// Returns the fatal fault that ended the session, if any. Blocks until
    /// the link stops, so call it after [`halt`](Self::halt) or to wait for
    /// a fault. Returns `Ok` right away if the link never started.
    pub fn join(&self) -> Result<()> {
        match reap(&mut lock(&self.worker), &self.shared) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> LinkState {
        self.shared.state.get()
    }

    pub fn is_running(&self) -> bool {
        self.state() == LinkState::Running
    }

    /// Counters for the current (or last) session.
    pub fn stats(&self) -> LinkStats {
        self.shared.stats.snapshot()
    }

    /// Take the fault that ended the last session without joining.
    pub fn take_fault(&self) -> Option<LinkError> {
        self.shared.take_fault()
    }

    /// Telemetry socket address of the latest session.
    pub fn telemetry_local_addr(&self) -> Option<SocketAddr> {
        *lock(&self.telemetry_local)
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn config(&self) -> &LinkConfig {
        &self.config
    }

    fn ensure_stopped(&self) -> Result<()> {
        match self.state() {
            LinkState::Stopped => Ok(()),
            LinkState::Running => Err(LinkError::AlreadyRunning),
            state => Err(LinkError::NotStopped(state)),
        }
    }
}

/// Join the previous loop thread, if any, and take its fault.
fn reap(worker: &mut Option<JoinHandle<()>>, shared: &Shared) -> Option<LinkError> {
    if let Some(handle) = worker.take() {
        if handle.join().is_err() {
            shared.state.set(LinkState::Stopped);
            shared.record_fault(LinkError::LoopPanicked);
        }
    }
    shared.take_fault()
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Drop for Multicopter {
    fn drop(&mut self) {
        let running = self
            .worker
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some();
        if running {
            self.halt_now();
            if let Err(err) = self.join() {
                warn!(%err, "link ended with a fault");
            }
        }
    }
}

impl std::fmt::Debug for Multicopter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Multicopter")
            .field("endpoint", &self.endpoint)
            .field("motor_count", &self.config.motor_count)
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::net::{IpAddr, Ipv4Addr, UdpSocket};
    use std::time::{Duration, Instant};

    use copterlink_wire::{decode, encode};

    use super::*;
    use crate::telemetry::LatestTelemetry;

    struct FakePeer {
        socket: UdpSocket,
    }

    impl FakePeer {
        fn bind() -> Self {
            let socket = UdpSocket::bind("127.0.0.1:0").expect("peer should bind");
            socket
                .set_read_timeout(Some(Duration::from_secs(2)))
                .expect("peer timeout should apply");
            Self { socket }
        }

        fn config(&self, timeout: Duration) -> LinkConfig {
            LinkConfig::default()
                .with_ports(self.socket.local_addr().unwrap().port(), 0)
                .with_telemetry_bind(IpAddr::V4(Ipv4Addr::LOCALHOST))
                .with_receive_timeout(timeout)
        }

        fn recv_motors(&self) -> (Vec<f64>, SocketAddr) {
            let mut buf = [0u8; 1024];
            let (len, from) = self
                .socket
                .recv_from(&mut buf)
                .expect("motor datagram should arrive");
            (decode(&buf[..len]).expect("motor datagram should decode"), from)
        }
    }

    fn wait_for_state(copter: &Multicopter, state: LinkState, within: Duration) -> bool {
        let deadline = Instant::now() + within;
        while Instant::now() < deadline {
            if copter.state() == state {
                return true;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        copter.state() == state
    }

    #[test]
    fn halt_before_start_is_harmless() {
        let copter = Multicopter::new(LinkConfig::default()).expect("link should build");
        copter.halt();
        copter.halt();
        assert_eq!(copter.state(), LinkState::Stopped);
    }

    #[test]
    fn join_without_start_is_ok() {
        let copter = Multicopter::new(LinkConfig::default()).unwrap();
        assert!(copter.join().is_ok());
    }

    #[test]
    fn rejects_wrong_motor_count() {
        let copter = Multicopter::new(LinkConfig::default()).unwrap();
        let err = copter.set_motors(&[0.5; 3]).unwrap_err();
        assert!(matches!(
            err,
            LinkError::MotorCountMismatch {
                expected: 4,
                actual: 3
            }
        ));
        assert_eq!(copter.motors(), vec![0.0; 4]);
    }

    #[test]
    fn invalid_config_rejected_at_construction() {
        let result = Multicopter::new(LinkConfig::default().with_motor_count(0));
        assert!(matches!(result, Err(LinkError::InvalidConfig(_))));
    }

    #[test]
    fn sends_zeros_before_any_command() {
        let peer = FakePeer::bind();
        let copter = Multicopter::new(peer.config(Duration::from_millis(50))).unwrap();
        copter.start().expect("link should start");

        let (motors, _) = peer.recv_motors();
        assert_eq!(motors, vec![0.0; 4]);

        copter.halt();
        copter.join().expect("session should end cleanly");
    }

    #[test]
    fn latest_motor_command_wins() {
        let peer = FakePeer::bind();
        let copter = Multicopter::new(peer.config(Duration::from_millis(50))).unwrap();

        copter.set_motors(&[1.0, 0.0, 0.0, 0.0]).unwrap();
        copter.set_motors(&[0.0, 1.0, 0.0, 0.0]).unwrap();
        copter.start().unwrap();

        let (motors, _) = peer.recv_motors();
        assert_eq!(motors, vec![0.0, 1.0, 0.0, 0.0]);

        copter.halt();
        copter.join().unwrap();
    }

    #[test]
    fn delivers_echoed_telemetry() {
        let peer = FakePeer::bind();
        let telemetry = LatestTelemetry::new();
        let copter = Multicopter::new(peer.config(Duration::from_millis(500)))
            .unwrap()
            .with_telemetry_sink(telemetry.clone())
            .unwrap();
        copter.start().unwrap();

        peer.recv_motors();
        let target = copter.telemetry_local_addr().expect("telemetry addr known");
        let frame = [0.0, 1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0, 10.0, 11.0];
        peer.socket.send_to(&encode(&frame), target).unwrap();

        let received = telemetry
            .wait_newer(0, Duration::from_secs(2))
            .expect("frame should be delivered");
        assert_eq!(received.values, frame.to_vec());
        assert_eq!(copter.stats().telemetry_frames_received, 1);

        copter.halt();
        copter.join().unwrap();
    }

    #[test]
    fn drops_frames_of_unexpected_length() {
        let peer = FakePeer::bind();
        let telemetry = LatestTelemetry::new();
        let config = peer
            .config(Duration::from_millis(500))
            .with_expected_telemetry_len(2);
        let copter = Multicopter::new(config)
            .unwrap()
            .with_telemetry_sink(telemetry.clone())
            .unwrap();
        copter.start().unwrap();
        peer.recv_motors();

        let target = copter.telemetry_local_addr().unwrap();
        peer.socket.send_to(&encode(&[1.0, 2.0, 3.0]), target).unwrap();
        peer.socket.send_to(&encode(&[4.0, 5.0]), target).unwrap();

        let received = telemetry.wait_newer(0, Duration::from_secs(2)).unwrap();
        assert_eq!(received.values, vec![4.0, 5.0]);
        assert_eq!(copter.stats().rejected_frames, 1);

        copter.halt();
        copter.join().unwrap();
    }

    #[test]
    fn malformed_datagrams_do_not_end_session() {
        let peer = FakePeer::bind();
        let telemetry = LatestTelemetry::new();
        let copter = Multicopter::new(peer.config(Duration::from_millis(500)))
            .unwrap()
            .with_telemetry_sink(telemetry.clone())
            .unwrap();
        copter.start().unwrap();
        peer.recv_motors();

        let target = copter.telemetry_local_addr().unwrap();
        peer.socket.send_to(&[0u8; 7], target).unwrap();
        peer.socket.send_to(&[0u8; 9], target).unwrap();
        peer.socket.send_to(&encode(&[3.0, 4.0]), target).unwrap();

        let received = telemetry
            .wait_newer(0, Duration::from_secs(2))
            .expect("valid frame should follow the malformed ones");
        assert_eq!(received.values, vec![3.0, 4.0]);
        assert_eq!(copter.stats().framing_errors, 2);
        assert_eq!(copter.state(), LinkState::Running);
        assert!(copter.take_fault().is_none());

        copter.halt_now();
        copter.join().unwrap();
    }

    #[test]
    fn start_while_halting_reports_state() {
        let peer = FakePeer::bind();
        let copter = Multicopter::new(peer.config(Duration::from_secs(2))).unwrap();
        copter.start().unwrap();
        peer.recv_motors();

        // The loop sits in its receive until the timeout, so it stays Halting.
        copter.halt();
        assert_eq!(copter.state(), LinkState::Halting);
        assert!(matches!(
            copter.start(),
            Err(LinkError::NotStopped(LinkState::Halting))
        ));

        copter.halt_now();
        copter.join().unwrap();
        copter.start().expect("stopped link should restart");
        copter.halt_now();
        copter.join().unwrap();
    }

    #[test]
    fn join_from_another_thread_while_halting() {
        let peer = FakePeer::bind();
        let copter = Multicopter::new(peer.config(Duration::from_millis(50))).unwrap();
        let copter = Arc::new(copter);
        copter.start().unwrap();
        peer.recv_motors();

        let waiter = {
            let copter = Arc::clone(&copter);
            std::thread::spawn(move || copter.join())
        };
        copter.set_motors(&[0.5; 4]).unwrap();
        copter.halt();

        waiter
            .join()
            .expect("join thread should not panic")
            .expect("session should end cleanly");
        assert_eq!(copter.state(), LinkState::Stopped);
    }

    #[test]
    fn silent_peer_keeps_loop_running() {
        let peer = FakePeer::bind();
        let copter = Multicopter::new(peer.config(Duration::from_millis(50))).unwrap();
        copter.start().unwrap();

        std::thread::sleep(Duration::from_millis(300));
        assert_eq!(copter.state(), LinkState::Running);
        assert!(copter.stats().receive_timeouts >= 2);
        assert!(copter.take_fault().is_none());

        copter.halt();
        copter.join().unwrap();
    }

    #[test]
    fn halt_stops_within_one_timeout() {
        let peer = FakePeer::bind();
        let timeout = Duration::from_millis(200);
        let copter = Multicopter::new(peer.config(timeout)).unwrap();
        copter.start().unwrap();
        peer.recv_motors();

        copter.halt();
        assert!(wait_for_state(
            &copter,
            LinkState::Stopped,
            timeout + Duration::from_millis(300)
        ));
        copter.join().unwrap();
    }

    #[test]
    fn halt_now_unblocks_long_receive() {
        let peer = FakePeer::bind();
        let copter = Multicopter::new(peer.config(Duration::from_secs(5))).unwrap();
        copter.start().unwrap();
        peer.recv_motors();

        let started = Instant::now();
        copter.halt_now();
        copter.join().expect("halt_now is not a fault");
        assert_eq!(copter.state(), LinkState::Stopped);
        // Linux wakes the receive on close; elsewhere it runs to the timeout.
        let bound = if cfg!(target_os = "linux") {
            Duration::from_secs(2)
        } else {
            Duration::from_secs(7)
        };
        assert!(started.elapsed() < bound);
    }

    #[test]
    fn start_twice_is_rejected_then_restart_works() {
        let peer = FakePeer::bind();
        let copter = Multicopter::new(peer.config(Duration::from_millis(50))).unwrap();
        copter.start().unwrap();
        assert!(matches!(copter.start(), Err(LinkError::AlreadyRunning)));
        assert!(matches!(
            copter.set_telemetry_sink(NoopSink),
            Err(LinkError::AlreadyRunning)
        ));

        copter.halt();
        copter.join().unwrap();

        copter.set_motors(&[0.25; 4]).unwrap();
        copter.start().expect("stopped link should restart");
        let (motors, _) = peer.recv_motors();
        // Datagrams from the first session may still be queued at the peer.
        let motors = if motors == vec![0.25; 4] {
            motors
        } else {
            loop {
                let (next, _) = peer.recv_motors();
                if next == vec![0.25; 4] {
                    break next;
                }
            }
        };
        assert_eq!(motors, vec![0.25; 4]);

        copter.halt();
        copter.join().unwrap();
    }

    #[test]
    fn ports_released_after_stop() {
        let peer = FakePeer::bind();
        let copter = Multicopter::new(peer.config(Duration::from_millis(50))).unwrap();
        copter.start().unwrap();
        let telemetry = copter.telemetry_local_addr().unwrap();

        copter.halt();
        copter.join().unwrap();

        UdpSocket::bind(telemetry).expect("telemetry port should be free");
    }
}
