#![cfg(all(unix, feature = "cli"))]

use std::net::UdpSocket;
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};

const LINK_ENV: [&str; 8] = [
    "COPTERLINK_LOG",
    "COPTERLINK_LOG_FORMAT",
    "COPTERLINK_CONFIG",
    "COPTERLINK_HOST",
    "COPTERLINK_MOTOR_PORT",
    "COPTERLINK_TELEMETRY_PORT",
    "COPTERLINK_MOTOR_COUNT",
    "COPTERLINK_RECEIVE_TIMEOUT",
];

fn copterlink() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_copterlink"));
    for var in LINK_ENV {
        cmd.env_remove(var);
    }
    cmd.arg("--log-level").arg("error");
    cmd
}

fn free_port() -> u16 {
    UdpSocket::bind("127.0.0.1:0")
        .expect("ephemeral bind should work")
        .local_addr()
        .expect("local addr")
        .port()
}

fn wait_with_timeout(child: &mut Child, timeout: Duration) -> Option<std::process::ExitStatus> {
    let start = Instant::now();
    loop {
        if let Some(status) = child.try_wait().expect("try_wait should work") {
            return Some(status);
        }
        if start.elapsed() >= timeout {
            let _ = child.kill();
            let _ = child.wait();
            return None;
        }
        std::thread::sleep(Duration::from_millis(25));
    }
}

#[test]
fn version_prints_name() {
    let output = copterlink().arg("version").output().expect("version should run");
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.starts_with("copterlink "));
}

#[test]
fn colliding_ports_exit_64() {
    let output = copterlink()
        .args(["hover", "--motor-port", "5100", "--telemetry-port", "5100"])
        .output()
        .expect("hover should run");

    assert_eq!(output.status.code(), Some(64));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("must differ"));
}

#[test]
fn hover_against_silent_peer_reports_stats() {
    let peer = UdpSocket::bind("127.0.0.1:0").expect("peer should bind");
    let motor_port = peer.local_addr().expect("peer addr").port();

    let output = copterlink()
        .arg("--format")
        .arg("json")
        .arg("hover")
        .arg("--motor-port")
        .arg(motor_port.to_string())
        .arg("--telemetry-port")
        .arg("0")
        .arg("--receive-timeout")
        .arg("50ms")
        .arg("--duration")
        .arg("200ms")
        .output()
        .expect("hover should run");

    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stats: serde_json::Value =
        serde_json::from_str(stdout.trim()).expect("stats should be json");
    assert_eq!(stats["kind"], "link-stats");
    assert!(stats["motor_datagrams_sent"].as_u64().unwrap_or(0) >= 1);
    assert_eq!(stats["telemetry_frames_received"], 0);

    let mut buf = [0u8; 64];
    peer.set_read_timeout(Some(Duration::from_secs(1)))
        .expect("read timeout should apply");
    let (len, _) = peer.recv_from(&mut buf).expect("motor datagram should be queued");
    let first = copterlink::wire::decode(&buf[..len]).expect("motor datagram should decode");
    assert_eq!(first, vec![0.6; 4], "throttle should be set before the first tick");
}

#[test]
fn listen_prints_frames_from_echo_peer() {
    let motor_port = free_port();
    let telemetry_port = free_port();
    let ports = [
        "--motor-port".to_string(),
        motor_port.to_string(),
        "--telemetry-port".to_string(),
        telemetry_port.to_string(),
    ];

    let mut echo = copterlink()
        .arg("echo")
        .args(&ports)
        .args(["--telemetry-len", "6"])
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .spawn()
        .expect("echo should start");

    let listen = copterlink()
        .arg("--format")
        .arg("json")
        .arg("listen")
        .args(&ports)
        .args(["--motors", "0.25,0.5,0.75,1", "--count", "2", "--receive-timeout", "100ms"])
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("listen should start");

    let output = {
        let mut listen = listen;
        let status = wait_with_timeout(&mut listen, Duration::from_secs(10));
        let output = listen.wait_with_output().expect("listen output");
        assert!(status.is_some(), "listen should exit after two frames");
        output
    };

    let _ = echo.kill();
    let _ = echo.wait();

    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    let stdout = String::from_utf8_lossy(&output.stdout);
    let frames: Vec<serde_json::Value> = stdout
        .lines()
        .map(|line| serde_json::from_str(line).expect("frame line should be json"))
        .collect();

    assert_eq!(frames.len(), 2);
    assert_eq!(frames[0]["sequence"], 1);
    assert_eq!(frames[1]["sequence"], 2);
    assert_eq!(
        frames[0]["values"],
        serde_json::json!([0.25, 0.5, 0.75, 1.0, 0.0, 0.0])
    );
}
