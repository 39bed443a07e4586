use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, ToSocketAddrs};

use tracing::debug;

use crate::error::{Result, TransportError};

/// Where motor datagrams go and where telemetry datagrams arrive.
///
/// Resolved once; immutable afterwards. Motor and telemetry ports are kept
/// distinct so both directions can run on one host without demultiplexing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    host: String,
    motor_addr: SocketAddr,
    telemetry_bind: SocketAddr,
}

impl Endpoint {
    /// Resolve `host` and build an endpoint.
    ///
    /// IPv4 addresses are preferred when a name resolves to both families.
    /// A `telemetry_port` of 0 lets the OS pick the local port.
    pub fn resolve(host: &str, motor_port: u16, telemetry_port: u16) -> Result<Self> {
        let addrs: Vec<SocketAddr> = (host, motor_port)
            .to_socket_addrs()
            .map_err(|e| TransportError::Resolve {
                host: host.to_string(),
                source: e,
            })?
            .collect();

        let motor_addr = addrs
            .iter()
            .copied()
            .find(SocketAddr::is_ipv4)
            .or_else(|| addrs.first().copied())
            .ok_or_else(|| TransportError::Resolve {
                host: host.to_string(),
                source: std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "host resolved to no addresses",
                ),
            })?;

        debug!(host, %motor_addr, "resolved peer");
        Self::build(host.to_string(), motor_addr, telemetry_port)
    }

    /// Build an endpoint from an already-resolved peer address.
    pub fn from_addr(motor_addr: SocketAddr, telemetry_port: u16) -> Result<Self> {
        Self::build(motor_addr.ip().to_string(), motor_addr, telemetry_port)
    }

    fn build(host: String, motor_addr: SocketAddr, telemetry_port: u16) -> Result<Self> {
        if motor_addr.port() == 0 {
            return Err(TransportError::InvalidEndpoint(
                "motor port must be non-zero".to_string(),
            ));
        }
        if telemetry_port == motor_addr.port() {
            return Err(TransportError::InvalidEndpoint(format!(
                "motor and telemetry ports must differ (both {telemetry_port})"
            )));
        }

        let telemetry_bind = SocketAddr::new(unspecified_like(&motor_addr), telemetry_port);
        Ok(Self {
            host,
            motor_addr,
            telemetry_bind,
        })
    }

    /// Bind the telemetry socket to a specific local address instead of the
    /// wildcard.
    pub fn with_telemetry_bind(mut self, ip: IpAddr) -> Self {
        self.telemetry_bind.set_ip(ip);
        self
    }

    /// Host as given by the caller.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Peer address motor datagrams are sent to.
    pub fn motor_addr(&self) -> SocketAddr {
        self.motor_addr
    }

    /// Configured telemetry port (0 if OS-assigned).
    pub fn telemetry_port(&self) -> u16 {
        self.telemetry_bind.port()
    }

    /// Local address the telemetry socket binds.
    pub fn telemetry_bind_addr(&self) -> SocketAddr {
        self.telemetry_bind
    }

    /// Local address the motor socket binds: wildcard, ephemeral port.
    pub fn motor_bind_addr(&self) -> SocketAddr {
        SocketAddr::new(unspecified_like(&self.motor_addr), 0)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "motors->{} telemetry<-{}",
            self.motor_addr, self.telemetry_bind
        )
    }
}

fn unspecified_like(addr: &SocketAddr) -> IpAddr {
    match addr {
        SocketAddr::V4(_) => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
        SocketAddr::V6(_) => IpAddr::V6(Ipv6Addr::UNSPECIFIED),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_loopback() {
        let endpoint = Endpoint::resolve("127.0.0.1", 5000, 5001).unwrap();
        assert_eq!(endpoint.motor_addr(), "127.0.0.1:5000".parse().unwrap());
        assert_eq!(endpoint.telemetry_port(), 5001);
        assert_eq!(
            endpoint.telemetry_bind_addr(),
            "0.0.0.0:5001".parse().unwrap()
        );
        assert_eq!(endpoint.motor_bind_addr(), "0.0.0.0:0".parse().unwrap());
        assert_eq!(endpoint.host(), "127.0.0.1");
    }

    #[test]
    fn test_resolve_localhost_name() {
        let endpoint = Endpoint::resolve("localhost", 5000, 5001).unwrap();
        assert!(endpoint.motor_addr().ip().is_loopback());
        assert_eq!(endpoint.host(), "localhost");
    }

    #[test]
    fn test_resolve_failure() {
        let result = Endpoint::resolve("no-such-host.invalid", 5000, 5001);
        assert!(matches!(result, Err(TransportError::Resolve { .. })));
    }

    #[test]
    fn test_rejects_shared_port() {
        let result = Endpoint::resolve("127.0.0.1", 5000, 5000);
        assert!(matches!(result, Err(TransportError::InvalidEndpoint(_))));
    }

    #[test]
    fn test_rejects_zero_motor_port() {
        let result = Endpoint::from_addr("127.0.0.1:0".parse().unwrap(), 5001);
        assert!(matches!(result, Err(TransportError::InvalidEndpoint(_))));
    }

    #[test]
    fn test_ipv6_peer_binds_ipv6_wildcard() {
        let endpoint = Endpoint::from_addr("[::1]:5000".parse().unwrap(), 5001).unwrap();
        assert_eq!(endpoint.telemetry_bind_addr(), "[::]:5001".parse().unwrap());
    }

    #[test]
    fn test_with_telemetry_bind() {
        let endpoint = Endpoint::resolve("127.0.0.1", 5000, 0)
            .unwrap()
            .with_telemetry_bind(IpAddr::V4(Ipv4Addr::LOCALHOST));
        assert_eq!(
            endpoint.telemetry_bind_addr(),
            "127.0.0.1:0".parse().unwrap()
        );
    }
}
