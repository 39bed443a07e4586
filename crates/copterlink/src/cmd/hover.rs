use copterlink_control::Multicopter;

use crate::cmd::{parse_duration, HoverArgs};
use crate::exit::{link_error, CliResult, SUCCESS};
use crate::output::{print_stats, OutputFormat};

pub fn run(args: HoverArgs, format: OutputFormat) -> CliResult<i32> {
    let config = args.link.to_config()?;
    let duration = parse_duration(&args.duration)?;
    let throttle = vec![args.throttle; config.motor_count];

    let copter = Multicopter::new(config).map_err(|err| link_error("link setup failed", err))?;
    let peer = copter.endpoint().to_string();

    // Queue the throttle first so the very first datagram carries it.
    copter
        .set_motors(&throttle)
        .map_err(|err| link_error("set motors failed", err))?;
    copter
        .start()
        .map_err(|err| link_error("link start failed", err))?;
    tracing::info!(throttle = args.throttle, ?duration, %peer, "hovering");

    std::thread::sleep(duration);

    copter.halt();
    copter
        .join()
        .map_err(|err| link_error("link fault", err))?;

    print_stats(&copter.stats(), &peer, format);
    Ok(SUCCESS)
}
