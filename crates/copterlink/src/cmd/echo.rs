use std::io;
use std::net::{SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::cmd::{install_ctrlc_handler, EchoArgs};
use crate::exit::{io_error, link_error, CliError, CliResult, SUCCESS, USAGE};
use crate::output::OutputFormat;

// Read timeout so Ctrl-C is noticed while the link is quiet.
const POLL_INTERVAL: Duration = Duration::from_millis(200);

enum RecvDisposition {
    Idle,
    Fatal(CliError),
}

pub fn run(args: EchoArgs, _format: OutputFormat) -> CliResult<i32> {
    let config = args.link.to_config()?;
    let endpoint = config
        .endpoint()
        .map_err(|err| link_error("resolve failed", err))?;
    if endpoint.telemetry_port() == 0 {
        return Err(CliError::new(
            USAGE,
            "echo needs a fixed --telemetry-port to reply to",
        ));
    }
    let telemetry_len = args.telemetry_len.unwrap_or(config.motor_count);

    let socket = UdpSocket::bind(endpoint.motor_addr())
        .map_err(|err| io_error(&format!("bind {} failed", endpoint.motor_addr()), err))?;
    socket
        .set_read_timeout(Some(POLL_INTERVAL))
        .map_err(|err| io_error("socket setup failed", err))?;
    tracing::info!(
        motor_addr = %endpoint.motor_addr(),
        telemetry_port = endpoint.telemetry_port(),
        telemetry_len,
        "echo peer ready"
    );

    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone())?;

    let mut buf = vec![0u8; copterlink_wire::MAX_DATAGRAM_SIZE];
    let mut answered = 0usize;

    while running.load(Ordering::SeqCst) {
        let (len, from) = match socket.recv_from(&mut buf) {
            Ok(received) => received,
            Err(err) => match classify_recv_error(err) {
                RecvDisposition::Idle => continue,
                RecvDisposition::Fatal(cli_err) => return Err(cli_err),
            },
        };

        let motors = match copterlink_wire::decode(&buf[..len]) {
            Ok(values) => values,
            Err(err) => {
                tracing::warn!(%err, %from, "skipping malformed motor datagram");
                continue;
            }
        };
        tracing::debug!(%from, ?motors, "motor datagram");

        let reply_to = SocketAddr::new(from.ip(), endpoint.telemetry_port());
        let reply = copterlink_wire::encode(&reply_values(&motors, telemetry_len));
        if let Err(err) = socket.send_to(&reply, reply_to) {
            tracing::warn!(error = %err, %reply_to, "telemetry reply failed");
            continue;
        }

        answered = answered.saturating_add(1);
        if let Some(count) = args.count {
            if answered >= count {
                break;
            }
        }
    }

    Ok(SUCCESS)
}

fn classify_recv_error(err: io::Error) -> RecvDisposition {
    match err.kind() {
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut | io::ErrorKind::Interrupted => {
            RecvDisposition::Idle
        }
        // ICMP port-unreachable from an earlier reply surfaces here on some stacks.
        io::ErrorKind::ConnectionReset | io::ErrorKind::ConnectionRefused => {
            RecvDisposition::Idle
        }
        _ => RecvDisposition::Fatal(io_error("receive failed", err)),
    }
}

/// Motor values padded with zeros or truncated to `len`.
fn reply_values(motors: &[f64], len: usize) -> Vec<f64> {
    let mut values: Vec<f64> = motors.iter().copied().take(len).collect();
    values.resize(len, 0.0);
    values
}
