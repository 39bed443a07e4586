use std::io::IsTerminal;
use std::time::{SystemTime, UNIX_EPOCH};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use copterlink_control::{LinkStats, TelemetryFrame};
use serde::Serialize;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

#[derive(Serialize)]
struct FrameOutput<'a> {
    kind: &'static str,
    sequence: u64,
    len: usize,
    values: &'a [f64],
    timestamp: String,
}

#[derive(Serialize)]
struct StatsOutput<'a> {
    kind: &'static str,
    peer: String,
    #[serde(flatten)]
    stats: &'a LinkStats,
}

pub fn print_frame(frame: &TelemetryFrame, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let out = FrameOutput {
                kind: "telemetry",
                sequence: frame.sequence,
                len: frame.len(),
                values: &frame.values,
                timestamp: now_unix_seconds(),
            };
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["SEQ", "LEN", "VALUES"])
                .add_row(vec![
                    frame.sequence.to_string(),
                    frame.len().to_string(),
                    values_preview(&frame.values),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "seq={} len={} values={}",
                frame.sequence,
                frame.len(),
                values_preview(&frame.values)
            );
        }
    }
}

pub fn print_stats(stats: &LinkStats, peer: &str, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let out = StatsOutput {
                kind: "link-stats",
                peer: peer.to_string(),
                stats,
            };
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["COUNTER", "VALUE"]);
            for (name, value) in stat_rows(stats) {
                table.add_row(vec![name.to_string(), value.to_string()]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            let fields: Vec<String> = stat_rows(stats)
                .iter()
                .map(|(name, value)| format!("{name}={value}"))
                .collect();
            println!("peer={peer} {}", fields.join(" "));
        }
    }
}

fn stat_rows(stats: &LinkStats) -> [(&'static str, u64); 6] {
    [
        ("motor_datagrams_sent", stats.motor_datagrams_sent),
        ("motor_datagrams_dropped", stats.motor_datagrams_dropped),
        ("telemetry_frames_received", stats.telemetry_frames_received),
        ("receive_timeouts", stats.receive_timeouts),
        ("framing_errors", stats.framing_errors),
        ("rejected_frames", stats.rejected_frames),
    ]
}

fn values_preview(values: &[f64]) -> String {
    let parts: Vec<String> = values.iter().map(|v| format!("{v:.4}")).collect();
    format!("[{}]", parts.join(", "))
}

fn now_unix_seconds() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preview_rounds_values() {
        assert_eq!(values_preview(&[0.5, -1.0 / 3.0]), "[0.5000, -0.3333]");
        assert_eq!(values_preview(&[]), "[]");
    }

    #[test]
    fn stats_json_is_flat() {
        let stats = LinkStats {
            motor_datagrams_sent: 3,
            ..LinkStats::default()
        };
        let out = StatsOutput {
            kind: "link-stats",
            peer: "127.0.0.1:5000".to_string(),
            stats: &stats,
        };
        let value = serde_json::to_value(&out).unwrap();
        assert_eq!(value["motor_datagrams_sent"], 3);
        assert_eq!(value["peer"], "127.0.0.1:5000");
    }
}
