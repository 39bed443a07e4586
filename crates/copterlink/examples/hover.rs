//! Spin all four motors at 60% for one second against a simulator on
//! localhost, printing telemetry as it arrives.
//!
//! ```sh
//! cargo run --example hover -p copterlink
//! ```

use std::time::Duration;

use copterlink::{LinkConfig, Multicopter, TelemetryFrame};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let copter = Multicopter::new(LinkConfig::default())?.with_telemetry_sink(
        |frame: TelemetryFrame| println!("telemetry #{}: {:?}", frame.sequence, frame.values),
    )?;

    copter.start()?;
    copter.set_motors(&[0.6; 4])?;
    std::thread::sleep(Duration::from_secs(1));

    copter.halt();
    copter.join()?;

    let stats = copter.stats();
    println!(
        "sent {} motor datagrams, received {} telemetry frames",
        stats.motor_datagrams_sent, stats.telemetry_frames_received
    );
    Ok(())
}
