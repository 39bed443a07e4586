use std::net::IpAddr;
use std::path::Path;
use std::time::Duration;

use copterlink_transport::Endpoint;
use serde::{Deserialize, Serialize};

use crate::error::{LinkError, Result};

/// Peer host used by the reference simulator setup.
pub const DEFAULT_HOST: &str = "127.0.0.1";
/// Port the simulator listens on for motor datagrams.
pub const DEFAULT_MOTOR_PORT: u16 = 5000;
/// Port the simulator sends telemetry datagrams to.
pub const DEFAULT_TELEMETRY_PORT: u16 = 5001;
/// Rotors on the reference quadcopter.
pub const DEFAULT_MOTOR_COUNT: usize = 4;
/// Bound on how long one tick waits for telemetry.
pub const DEFAULT_RECEIVE_TIMEOUT_MS: u64 = 1000;

/// Everything needed to bring a link up.
///
/// Deserializes from JSON with every field optional:
///
/// ```json
/// { "host": "10.0.0.7", "motor_count": 6, "receive_timeout_ms": 250 }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LinkConfig {
    /// Peer host name or address.
    pub host: String,
    /// Peer port for motor datagrams.
    pub motor_port: u16,
    /// Local port for telemetry datagrams. 0 lets the OS choose.
    pub telemetry_port: u16,
    /// Values per motor datagram.
    pub motor_count: usize,
    /// Receive timeout per tick, in milliseconds.
    pub receive_timeout_ms: u64,
    /// Local address for the telemetry socket. Defaults to the wildcard.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub telemetry_bind: Option<IpAddr>,
    /// Drop telemetry frames that do not carry exactly this many values.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected_telemetry_len: Option<usize>,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            motor_port: DEFAULT_MOTOR_PORT,
            telemetry_port: DEFAULT_TELEMETRY_PORT,
            motor_count: DEFAULT_MOTOR_COUNT,
            receive_timeout_ms: DEFAULT_RECEIVE_TIMEOUT_MS,
            telemetry_bind: None,
            expected_telemetry_len: None,
        }
    }
}

impl LinkConfig {
    /// Parse and validate a JSON config.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a JSON config file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| LinkError::ConfigRead {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::from_json_str(&text)
    }

    /// Override the peer host.
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Override motor and telemetry ports.
    pub fn with_ports(mut self, motor_port: u16, telemetry_port: u16) -> Self {
        self.motor_port = motor_port;
        self.telemetry_port = telemetry_port;
        self
    }

    /// Override the number of motors.
    pub fn with_motor_count(mut self, motor_count: usize) -> Self {
        self.motor_count = motor_count;
        self
    }

    /// Override the receive timeout. Sub-millisecond precision is dropped.
    pub fn with_receive_timeout(mut self, timeout: Duration) -> Self {
        self.receive_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Bind the telemetry socket to a specific local address.
    pub fn with_telemetry_bind(mut self, ip: IpAddr) -> Self {
        self.telemetry_bind = Some(ip);
        self
    }

    /// Enforce a fixed telemetry frame length.
    pub fn with_expected_telemetry_len(mut self, len: usize) -> Self {
        self.expected_telemetry_len = Some(len);
        self
    }

    /// Receive timeout as a `Duration`.
    pub fn receive_timeout(&self) -> Duration {
        Duration::from_millis(self.receive_timeout_ms)
    }

    /// Check the config without touching the network.
    pub fn validate(&self) -> Result<()> {
        let max = copterlink_wire::max_values();

        if self.host.trim().is_empty() {
            return Err(invalid("host must not be empty"));
        }
        if self.motor_port == 0 {
            return Err(invalid("motor_port must be non-zero"));
        }
        if self.motor_port == self.telemetry_port {
            return Err(invalid(format!(
                "motor_port and telemetry_port must differ (both {})",
                self.motor_port
            )));
        }
        if self.motor_count == 0 || self.motor_count > max {
            return Err(invalid(format!(
                "motor_count must be between 1 and {max}, got {}",
                self.motor_count
            )));
        }
        if self.receive_timeout_ms == 0 {
            return Err(invalid("receive_timeout_ms must be greater than zero"));
        }
        if let Some(len) = self.expected_telemetry_len {
            if len > max {
                return Err(invalid(format!(
                    "expected_telemetry_len must be at most {max}, got {len}"
                )));
            }
        }
        Ok(())
    }

    /// Resolve the peer into an [`Endpoint`].
    pub fn endpoint(&self) -> Result<Endpoint> {
        let endpoint = Endpoint::resolve(&self.host, self.motor_port, self.telemetry_port)?;
        Ok(match self.telemetry_bind {
            Some(ip) => endpoint.with_telemetry_bind(ip),
            None => endpoint,
        })
    }
}

fn invalid(message: impl Into<String>) -> LinkError {
    LinkError::InvalidConfig(message.into())
}
