use std::net::{SocketAddr, UdpSocket};

use tracing::debug;

use crate::error::{Result, TransportError};

/// Bind a UDP socket with `SO_REUSEADDR` set before the bind.
///
/// A process restarted without a clean shutdown can then take its ports back
/// immediately.
pub(crate) fn bind_reusable(addr: SocketAddr) -> Result<UdpSocket> {
    let socket = bind_inner(addr).map_err(|e| TransportError::Bind { addr, source: e })?;
    debug!(requested = %addr, local = ?socket.local_addr().ok(), "bound udp socket");
    Ok(socket)
}

#[cfg(unix)]
fn bind_inner(addr: SocketAddr) -> std::io::Result<UdpSocket> {
    use rustix::net::{sockopt, AddressFamily, SocketType};

    let family = match addr {
        SocketAddr::V4(_) => AddressFamily::INET,
        SocketAddr::V6(_) => AddressFamily::INET6,
    };
    let fd = rustix::net::socket(family, SocketType::DGRAM, None)?;
    sockopt::set_socket_reuseaddr(&fd, true)?;
    rustix::net::bind(&fd, &addr)?;
    Ok(UdpSocket::from(fd))
}

#[cfg(not(unix))]
fn bind_inner(addr: SocketAddr) -> std::io::Result<UdpSocket> {
    UdpSocket::bind(addr)
}

/// Wake a thread blocked in `recv_from` on `socket`.
///
/// Linux wakes readers of an unconnected UDP socket on `shutdown` even though
/// the call reports `ENOTCONN`, so the error is ignored. Elsewhere the reader
/// returns at its read timeout.
#[cfg(unix)]
pub(crate) fn shutdown_read(socket: &UdpSocket) {
    if let Err(err) = rustix::net::shutdown(socket, rustix::net::Shutdown::Read) {
        debug!(%err, "shutdown on telemetry socket");
    }
}

#[cfg(not(unix))]
pub(crate) fn shutdown_read(_socket: &UdpSocket) {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bind_ephemeral() {
        let socket = bind_reusable("127.0.0.1:0".parse().unwrap()).unwrap();
        let local = socket.local_addr().unwrap();
        assert!(local.ip().is_loopback());
        assert_ne!(local.port(), 0);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_rebind_while_first_socket_open() {
        let first = bind_reusable("127.0.0.1:0".parse().unwrap()).unwrap();
        let addr = first.local_addr().unwrap();

        // Linux lets two UDP sockets share a port when both set SO_REUSEADDR.
        let second = bind_reusable(addr).unwrap();
        assert_eq!(second.local_addr().unwrap(), addr);
    }

    #[test]
    fn test_rebind_after_drop() {
        let first = bind_reusable("127.0.0.1:0".parse().unwrap()).unwrap();
        let addr = first.local_addr().unwrap();
        drop(first);

        let plain = UdpSocket::bind(addr).unwrap();
        assert_eq!(plain.local_addr().unwrap(), addr);
    }
}
