use crate::cmd::VersionArgs;
use crate::exit::{CliResult, SUCCESS};

pub fn run(args: VersionArgs) -> CliResult<i32> {
    println!("framemux {}", env!("CARGO_PKG_VERSION"));
    if !args.extended {
        return Ok(SUCCESS);
    }

    println!(
        "target: {}",
        option_env!("FRAMEMUX_BUILD_TARGET").unwrap_or("unknown")
    );
    println!("os: {}", std::env::consts::OS);
    println!("arch: {}", std::env::consts::ARCH);
    println!("git_hash: {}", option_env!("GIT_HASH").unwrap_or("unknown"));
    println!(
        "frame markers: start={:02X?} end={:02X?}",
        framemux_frame::START_MARKER,
        framemux_frame::END_MARKER
    );
    println!("max channels: {}", framemux_core::MAX_CHANNELS);

    Ok(SUCCESS)
}
