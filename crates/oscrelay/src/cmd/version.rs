use crate::cmd::VersionArgs;
use crate::exit::{CliResult, SUCCESS};

pub fn run(args: VersionArgs) -> CliResult<i32> {
    println!("oscrelay {}", env!("CARGO_PKG_VERSION"));
    if !args.extended {
        return Ok(SUCCESS);
    }

    println!("target: {}", option_env!("OSCRELAY_BUILD_TARGET").unwrap_or("unknown"));
    println!("profile: {}", option_env!("OSCRELAY_BUILD_PROFILE").unwrap_or("unknown"));
    println!("os: {}", std::env::consts::OS);
    println!("arch: {}", std::env::consts::ARCH);
    println!("git_hash: {}", option_env!("GIT_HASH").unwrap_or("unknown"));
    println!(
        "defaults: max_package_size={} retry_interval={}ms",
        oscrelay_reliable::DEFAULT_MAX_PACKAGE_SIZE,
        oscrelay_reliable::DEFAULT_RETRY_INTERVAL.as_millis()
    );

    Ok(SUCCESS)
}
