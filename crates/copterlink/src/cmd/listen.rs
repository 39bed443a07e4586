use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::time::Duration;

use copterlink_control::{ChannelSink, Multicopter};

use crate::cmd::{install_ctrlc_handler, ListenArgs};
use crate::exit::{link_error, CliResult, SUCCESS};
use crate::output::{print_frame, OutputFormat};

// How often the main thread rechecks Ctrl-C and loop health.
const POLL_INTERVAL: Duration = Duration::from_millis(100);
// Frames buffered for the printer before the loop starts dropping them.
const FRAME_BACKLOG: usize = 64;

pub fn run(args: ListenArgs, format: OutputFormat) -> CliResult<i32> {
    let config = args.link.to_config()?;
    let (tx, rx) = mpsc::sync_channel(FRAME_BACKLOG);
    let sink = ChannelSink::new(tx);

    let copter = Multicopter::new(config)
        .and_then(|copter| copter.with_telemetry_sink(sink.clone()))
        .map_err(|err| link_error("link setup failed", err))?;

    if let Some(motors) = &args.motors {
        copter
            .set_motors(motors)
            .map_err(|err| link_error("invalid --motors", err))?;
    }

    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone())?;

    copter
        .start()
        .map_err(|err| link_error("link start failed", err))?;
    tracing::info!(peer = %copter.endpoint(), "listening for telemetry");

    let mut printed = 0usize;

    while running.load(Ordering::SeqCst) {
        match rx.recv_timeout(POLL_INTERVAL) {
            Ok(frame) => {
                print_frame(&frame, format);
                printed = printed.saturating_add(1);

                if let Some(count) = args.count {
                    if printed >= count {
                        break;
                    }
                }
            }
            Err(RecvTimeoutError::Timeout) => {
                if !copter.is_running() {
                    break;
                }
            }
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    copter.halt_now();
    copter
        .join()
        .map_err(|err| link_error("link fault", err))?;

    if sink.dropped() > 0 {
        tracing::warn!(dropped = sink.dropped(), "printer fell behind; frames skipped");
    }

    Ok(SUCCESS)
}
