use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Subcommand};
use copterlink_control::LinkConfig;

use crate::exit::{link_error, CliError, CliResult, INTERNAL, USAGE};
use crate::output::OutputFormat;

pub mod echo;
pub mod hover;
pub mod listen;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Spin all motors at a fixed throttle for a while, then halt.
    Hover(HoverArgs),
    /// Run the link and print telemetry frames.
    Listen(ListenArgs),
    /// Stand in for the simulator: answer motor datagrams with telemetry.
    Echo(EchoArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Hover(args) => hover::run(args, format),
        Command::Listen(args) => listen::run(args, format),
        Command::Echo(args) => echo::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

/// Link settings shared by every command that talks UDP.
///
/// Precedence: defaults, then `--config`, then flags or their env vars.
#[derive(Args, Debug, Default)]
pub struct LinkArgs {
    /// JSON link config file.
    #[arg(long, value_name = "FILE", env = "COPTERLINK_CONFIG")]
    pub config: Option<PathBuf>,
    /// Simulator host.
    #[arg(long, env = "COPTERLINK_HOST")]
    pub host: Option<String>,
    /// Simulator port for motor datagrams.
    #[arg(long, env = "COPTERLINK_MOTOR_PORT")]
    pub motor_port: Option<u16>,
    /// Local port for telemetry datagrams.
    #[arg(long, env = "COPTERLINK_TELEMETRY_PORT")]
    pub telemetry_port: Option<u16>,
    /// Number of motors.
    #[arg(long, env = "COPTERLINK_MOTOR_COUNT")]
    pub motor_count: Option<usize>,
    /// Per-tick telemetry wait (e.g. 1s, 250ms).
    #[arg(long, env = "COPTERLINK_RECEIVE_TIMEOUT")]
    pub receive_timeout: Option<String>,
    /// Local address for the telemetry socket.
    #[arg(long, value_name = "IP")]
    pub telemetry_bind: Option<IpAddr>,
    /// Drop telemetry frames that do not carry exactly this many values.
    #[arg(long, value_name = "N")]
    pub expect_len: Option<usize>,
}

impl LinkArgs {
    pub fn to_config(&self) -> CliResult<LinkConfig> {
        let mut config = match &self.config {
            Some(path) => LinkConfig::from_json_file(path)
                .map_err(|err| link_error("config load failed", err))?,
            None => LinkConfig::default(),
        };

        if let Some(host) = &self.host {
            config = config.with_host(host.clone());
        }
        if let Some(port) = self.motor_port {
            config.motor_port = port;
        }
        if let Some(port) = self.telemetry_port {
            config.telemetry_port = port;
        }
        if let Some(count) = self.motor_count {
            config = config.with_motor_count(count);
        }
        if let Some(timeout) = &self.receive_timeout {
            config = config.with_receive_timeout(parse_duration(timeout)?);
        }
        if let Some(ip) = self.telemetry_bind {
            config = config.with_telemetry_bind(ip);
        }
        if let Some(len) = self.expect_len {
            config = config.with_expected_telemetry_len(len);
        }

        config
            .validate()
            .map_err(|err| link_error("invalid link config", err))?;
        Ok(config)
    }
}

#[derive(Args, Debug)]
pub struct HoverArgs {
    #[command(flatten)]
    pub link: LinkArgs,
    /// Value sent to every motor.
    #[arg(long, default_value = "0.6")]
    pub throttle: f64,
    /// How long to hold the throttle (e.g. 1s, 500ms).
    #[arg(long, default_value = "1s")]
    pub duration: String,
}

#[derive(Args, Debug)]
pub struct ListenArgs {
    #[command(flatten)]
    pub link: LinkArgs,
    /// Constant motor command (comma-separated). Default: all zeros.
    #[arg(long, value_delimiter = ',')]
    pub motors: Option<Vec<f64>>,
    /// Exit after receiving N frames.
    #[arg(long)]
    pub count: Option<usize>,
}

#[derive(Args, Debug)]
pub struct EchoArgs {
    #[command(flatten)]
    pub link: LinkArgs,
    /// Values per telemetry reply. Default: the motor count.
    #[arg(long, value_name = "K")]
    pub telemetry_len: Option<usize>,
    /// Exit after answering N motor datagrams.
    #[arg(long)]
    pub count: Option<usize>,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

pub(crate) fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, unit) = if let Some(num) = input.strip_suffix("ms") {
        (num, "ms")
    } else if let Some(num) = input.strip_suffix('s') {
        (num, "s")
    } else {
        (input, "s")
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    match unit {
        "ms" => Ok(Duration::from_millis(value)),
        _ => Ok(Duration::from_secs(value)),
    }
}

pub(crate) fn install_ctrlc_handler(running: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_durations() {
        assert_eq!(parse_duration("5s").unwrap(), Duration::from_secs(5));
        assert_eq!(parse_duration("250ms").unwrap(), Duration::from_millis(250));
        assert_eq!(parse_duration(" 2 ").unwrap(), Duration::from_secs(2));
    }

    #[test]
    fn rejects_bad_durations() {
        assert_eq!(parse_duration("").unwrap_err().code, USAGE);
        assert_eq!(parse_duration("0ms").unwrap_err().code, USAGE);
        assert_eq!(parse_duration("fast").unwrap_err().code, USAGE);
    }

    #[test]
    fn flags_override_defaults() {
        let args = LinkArgs {
            host: Some("localhost".to_string()),
            motor_port: Some(6000),
            telemetry_port: Some(6001),
            motor_count: Some(6),
            receive_timeout: Some("250ms".to_string()),
            ..LinkArgs::default()
        };
        let config = args.to_config().unwrap();
        assert_eq!(config.host, "localhost");
        assert_eq!(config.motor_port, 6000);
        assert_eq!(config.telemetry_port, 6001);
        assert_eq!(config.motor_count, 6);
        assert_eq!(config.receive_timeout_ms, 250);
    }

    #[test]
    fn flags_override_config_file() {
        let path = std::env::temp_dir().join(format!(
            "copterlink-cfg-{}-{}.json",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .expect("time should be after epoch")
                .as_nanos()
        ));
        std::fs::write(&path, r#"{"motor_count": 8, "motor_port": 7000}"#).unwrap();

        let args = LinkArgs {
            config: Some(path.clone()),
            motor_port: Some(7100),
            ..LinkArgs::default()
        };
        let config = args.to_config().unwrap();
        assert_eq!(config.motor_count, 8);
        assert_eq!(config.motor_port, 7100);
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn colliding_ports_are_usage_errors() {
        let args = LinkArgs {
            motor_port: Some(5001),
            ..LinkArgs::default()
        };
        assert_eq!(args.to_config().unwrap_err().code, USAGE);
    }
}
